//! AWS Signature Version 4 computation.
//!
//! 1. Build the canonical request from method, path, query, headers and the
//!    payload digest.
//! 2. Build the string to sign from the timestamp, credential scope and the
//!    canonical request digest.
//! 3. Derive the signing key with the HMAC-SHA256 chain
//!    `"AWS4" + secret → date → region → service → "aws4_request"`.
//! 4. Sign, and assemble the `Authorization` header.
//!
//! [`compute_signature`] is pure: the same inputs, timestamp included, always
//! yield the same headers.

use axum::http::header::{InvalidHeaderValue, AUTHORIZATION, HOST};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::credentials::{CredentialError, Credentials};
use crate::signing::canonical::{canonical_request, hash_hex};

/// Signing algorithm identifier.
pub const ALGORITHM: &str = "AWS4-HMAC-SHA256";

/// Final element of every credential scope.
pub const SCOPE_TERMINATOR: &str = "aws4_request";

pub const X_AMZ_DATE: HeaderName = HeaderName::from_static("x-amz-date");
pub const X_AMZ_SECURITY_TOKEN: HeaderName = HeaderName::from_static("x-amz-security-token");

type HmacSha256 = Hmac<Sha256>;

/// Errors raised while signing a request.
#[derive(Debug, thiserror::Error)]
pub enum SigningError {
    #[error("request has no Host header to sign")]
    MissingHost,

    #[error("credentials are missing an access key id or secret")]
    IncompleteCredentials,

    #[error("signed header value is not valid: {0}")]
    InvalidHeaderValue(#[from] InvalidHeaderValue),

    #[error("could not obtain credentials: {0}")]
    Credentials(#[from] CredentialError),
}

/// Scope and key material for one signing operation.
#[derive(Debug, Clone, Copy)]
pub struct SigningParams<'a> {
    pub credentials: &'a Credentials,
    pub region: &'a str,
    pub service: &'a str,
    pub time: DateTime<Utc>,
}

impl SigningParams<'_> {
    /// `YYYYMMDD` date stamp.
    pub fn date(&self) -> String {
        self.time.format("%Y%m%d").to_string()
    }

    /// `YYYYMMDDTHHMMSSZ` timestamp.
    pub fn timestamp(&self) -> String {
        self.time.format("%Y%m%dT%H%M%SZ").to_string()
    }

    /// `date/region/service/aws4_request`.
    pub fn credential_scope(&self) -> String {
        format!(
            "{}/{}/{}/{SCOPE_TERMINATOR}",
            self.date(),
            self.region,
            self.service
        )
    }
}

/// The headers produced by signing: `Authorization`, `X-Amz-Date` and, for
/// temporary credentials, `X-Amz-Security-Token`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedHeaderSet {
    headers: HeaderMap,
}

impl SignedHeaderSet {
    pub fn authorization(&self) -> Option<&HeaderValue> {
        self.headers.get(AUTHORIZATION)
    }

    pub fn get(&self, name: &HeaderName) -> Option<&HeaderValue> {
        self.headers.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&HeaderName, &HeaderValue)> {
        self.headers.iter()
    }
}

/// Sign a request.
///
/// `headers` must already carry the `Host` of the destination. The date and
/// session-token headers are added to the signed set before canonicalizing.
pub fn compute_signature(
    method: &Method,
    path: &str,
    query: &str,
    headers: &HeaderMap,
    payload: &[u8],
    params: &SigningParams<'_>,
) -> Result<SignedHeaderSet, SigningError> {
    let creds = params.credentials;
    if creds.access_key_id.is_empty() || creds.secret_access_key.is_empty() {
        return Err(SigningError::IncompleteCredentials);
    }
    if !headers.contains_key(HOST) {
        return Err(SigningError::MissingHost);
    }

    let timestamp = params.timestamp();
    let mut signed = HeaderMap::new();
    signed.insert(X_AMZ_DATE, HeaderValue::from_str(&timestamp)?);
    if let Some(token) = creds.session_token.as_deref() {
        signed.insert(X_AMZ_SECURITY_TOKEN, HeaderValue::from_str(token)?);
    }

    let mut to_canonicalize = headers.clone();
    for (name, value) in &signed {
        to_canonicalize.insert(name.clone(), value.clone());
    }

    let (canonical, signed_headers) = canonical_request(
        method.as_str(),
        path,
        query,
        &to_canonicalize,
        &hash_hex(payload),
    );
    tracing::trace!(canonical_request = %canonical, "Built canonical request");

    let scope = params.credential_scope();
    let string_to_sign = build_string_to_sign(&timestamp, &scope, &hash_hex(&canonical));
    let signing_key = derive_signing_key(
        &creds.secret_access_key,
        &params.date(),
        params.region,
        params.service,
    );
    let signature = hex::encode(hmac_sha256(&signing_key, string_to_sign.as_bytes()));

    let authorization = format!(
        "{ALGORITHM} Credential={}/{scope}, SignedHeaders={signed_headers}, Signature={signature}",
        creds.access_key_id
    );
    signed.insert(AUTHORIZATION, HeaderValue::from_str(&authorization)?);

    Ok(SignedHeaderSet { headers: signed })
}

/// `ALGORITHM\ntimestamp\nscope\nhex(sha256(canonical request))`.
pub fn build_string_to_sign(timestamp: &str, scope: &str, canonical_request_hash: &str) -> String {
    format!("{ALGORITHM}\n{timestamp}\n{scope}\n{canonical_request_hash}")
}

/// Derive the scoped signing key.
pub fn derive_signing_key(secret_key: &str, date: &str, region: &str, service: &str) -> Vec<u8> {
    let date_key = hmac_sha256(format!("AWS4{secret_key}").as_bytes(), date.as_bytes());
    let date_region_key = hmac_sha256(&date_key, region.as_bytes());
    let date_region_service_key = hmac_sha256(&date_region_key, service.as_bytes());
    hmac_sha256(&date_region_service_key, SCOPE_TERMINATOR.as_bytes())
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts keys of any length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    const ACCESS_KEY: &str = "AKIDEXAMPLE";
    const SECRET_KEY: &str = "wJalrXUtnFEMI/K7MDENG/bPxRfiCYEXAMPLEKEY";

    fn fixed_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2015, 8, 30, 12, 36, 0).unwrap()
    }

    fn host_only(host: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(HOST, HeaderValue::from_static(host));
        headers
    }

    fn sign(
        method: Method,
        path: &str,
        query: &str,
        headers: &HeaderMap,
        payload: &[u8],
        creds: &Credentials,
        service: &str,
        time: DateTime<Utc>,
    ) -> SignedHeaderSet {
        let params = SigningParams {
            credentials: creds,
            region: "us-east-1",
            service,
            time,
        };
        compute_signature(&method, path, query, headers, payload, &params).unwrap()
    }

    #[test]
    fn matches_published_get_vanilla_vector() {
        let creds = Credentials::new(ACCESS_KEY, "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY");
        let signed = sign(
            Method::GET,
            "/",
            "",
            &host_only("example.amazonaws.com"),
            b"",
            &creds,
            "service",
            fixed_time(),
        );
        assert_eq!(
            signed.authorization().unwrap(),
            "AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/20150830/us-east-1/service/aws4_request, \
             SignedHeaders=host;x-amz-date, \
             Signature=5fa00fa31553b73ebf1942676e86291e8372ff2a2260956d9b8aae1d763fbf31"
        );
        assert_eq!(signed.get(&X_AMZ_DATE).unwrap(), "20150830T123600Z");
    }

    #[test]
    fn signs_search_request() {
        let creds = Credentials::new(ACCESS_KEY, SECRET_KEY);
        let signed = sign(
            Method::GET,
            "/_search",
            "q=test",
            &host_only("search.example.com"),
            b"",
            &creds,
            "es",
            fixed_time(),
        );
        assert_eq!(
            signed.authorization().unwrap(),
            "AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/20150830/us-east-1/es/aws4_request, \
             SignedHeaders=host;x-amz-date, \
             Signature=36c6cde8f62d80c44d166ad1ab65908974dd9c63515155d9fb07ab50b36e30c5"
        );
        assert_eq!(signed.iter().count(), 2);
        assert!(signed.get(&X_AMZ_SECURITY_TOKEN).is_none());
    }

    #[test]
    fn signs_payload_and_extra_headers() {
        let creds = Credentials::new(ACCESS_KEY, SECRET_KEY);
        let mut headers = host_only("search.example.com");
        headers.insert("content-type", HeaderValue::from_static("application/json"));
        headers.insert("user-agent", HeaderValue::from_static("curl/8.0"));

        let signed = sign(
            Method::POST,
            "/my-index/_doc",
            "",
            &headers,
            br#"{"title":"hello"}"#,
            &creds,
            "es",
            fixed_time(),
        );
        assert_eq!(
            signed.authorization().unwrap(),
            "AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/20150830/us-east-1/es/aws4_request, \
             SignedHeaders=content-type;host;x-amz-date, \
             Signature=f4b69b97872883a2ae92346ce570b323ea2cca7d3079043ea709919b8ecb99dc"
        );
    }

    #[test]
    fn session_token_is_emitted_and_signed() {
        let creds =
            Credentials::new(ACCESS_KEY, SECRET_KEY).with_session_token("session-token-example");
        let signed = sign(
            Method::GET,
            "/_search",
            "q=test",
            &host_only("search.example.com"),
            b"",
            &creds,
            "es",
            fixed_time(),
        );
        assert_eq!(signed.iter().count(), 3);
        assert_eq!(
            signed.get(&X_AMZ_SECURITY_TOKEN).unwrap(),
            "session-token-example"
        );
        assert_eq!(
            signed.authorization().unwrap(),
            "AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/20150830/us-east-1/es/aws4_request, \
             SignedHeaders=host;x-amz-date;x-amz-security-token, \
             Signature=6898542a744e163dc9fa5c02a17ad783a2ce7ae861205b8a2281199f3e3079cf"
        );
    }

    #[test]
    fn signing_is_deterministic() {
        let creds = Credentials::new(ACCESS_KEY, SECRET_KEY);
        let headers = host_only("search.example.com");
        let first = sign(Method::PUT, "/idx", "a=1", &headers, b"body", &creds, "es", fixed_time());
        for _ in 0..5 {
            let again = sign(Method::PUT, "/idx", "a=1", &headers, b"body", &creds, "es", fixed_time());
            assert_eq!(first, again);
        }
    }

    #[test]
    fn different_timestamps_give_different_signatures() {
        let creds = Credentials::new(ACCESS_KEY, SECRET_KEY);
        let headers = host_only("search.example.com");
        let earlier = sign(Method::GET, "/", "", &headers, b"", &creds, "es", fixed_time());
        let later = sign(
            Method::GET,
            "/",
            "",
            &headers,
            b"",
            &creds,
            "es",
            fixed_time() + chrono::Duration::seconds(1),
        );
        assert_ne!(earlier.authorization(), later.authorization());
    }

    #[test]
    fn host_header_is_required() {
        let creds = Credentials::new(ACCESS_KEY, SECRET_KEY);
        let params = SigningParams {
            credentials: &creds,
            region: "us-east-1",
            service: "es",
            time: fixed_time(),
        };
        let err =
            compute_signature(&Method::GET, "/", "", &HeaderMap::new(), b"", &params).unwrap_err();
        assert!(matches!(err, SigningError::MissingHost));
    }

    #[test]
    fn empty_secret_is_rejected() {
        let creds = Credentials::new(ACCESS_KEY, "");
        let params = SigningParams {
            credentials: &creds,
            region: "us-east-1",
            service: "es",
            time: fixed_time(),
        };
        let err = compute_signature(
            &Method::GET,
            "/",
            "",
            &host_only("search.example.com"),
            b"",
            &params,
        )
        .unwrap_err();
        assert!(matches!(err, SigningError::IncompleteCredentials));
    }

    #[test]
    fn signing_key_is_scoped() {
        let key = derive_signing_key(SECRET_KEY, "20150830", "us-east-1", "es");
        assert_eq!(key.len(), 32);
        assert_ne!(key, derive_signing_key(SECRET_KEY, "20150830", "us-west-2", "es"));
    }
}
