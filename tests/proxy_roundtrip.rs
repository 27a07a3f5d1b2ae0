//! End-to-end tests: client → proxy → mock backend over loopback.

use std::time::Duration;

use async_trait::async_trait;
use aws_signing_proxy::credentials::{CredentialError, CredentialProvider, Credentials};
use aws_signing_proxy::signing::{compute_signature, SigningParams};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method};
use chrono::{NaiveDateTime, TimeZone, Utc};

mod common;

use common::{RecordedRequest, ACCESS_KEY, SECRET_KEY};

fn credentials() -> Credentials {
    Credentials::new(ACCESS_KEY, SECRET_KEY)
}

struct NoCredentials;

#[async_trait]
impl CredentialProvider for NoCredentials {
    fn name(&self) -> &'static str {
        "none"
    }

    async fn credentials(&self) -> Result<Credentials, CredentialError> {
        Err(CredentialError::Exhausted(vec!["nothing configured".into()]))
    }
}

/// Recompute the signature from every header that arrived on the wire, the
/// way the target service would.
fn assert_signature_verifies(request: &RecordedRequest, creds: &Credentials) {
    let date = request.header("x-amz-date").expect("x-amz-date missing");
    let time = Utc.from_utc_datetime(&NaiveDateTime::parse_from_str(date, "%Y%m%dT%H%M%SZ").unwrap());

    let mut headers = HeaderMap::new();
    for (name, value) in &request.headers {
        headers.append(
            HeaderName::from_bytes(name.as_bytes()).unwrap(),
            HeaderValue::from_str(value).unwrap(),
        );
    }

    let params = SigningParams {
        credentials: creds,
        region: "us-east-1",
        service: "es",
        time,
    };
    let method = Method::from_bytes(request.method.as_bytes()).unwrap();
    let expected = compute_signature(
        &method,
        request.path(),
        request.query(),
        &headers,
        &request.body,
        &params,
    )
    .unwrap();

    assert_eq!(
        request.header("authorization"),
        expected.authorization().map(|v| v.to_str().unwrap()),
    );
}

async fn next_request(
    rx: &mut tokio::sync::mpsc::UnboundedReceiver<RecordedRequest>,
) -> RecordedRequest {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("backend saw no request")
        .expect("backend stopped")
}

#[tokio::test]
async fn forwards_signed_search_request() {
    let (backend, mut rx) = common::start_recording_backend(br#"{"hits":[]}"#.to_vec()).await;
    let (proxy, shutdown) = common::start_proxy(common::config_for(backend), credentials()).await;

    let res = common::client()
        .get(format!("http://{proxy}/_search?q=test"))
        .send()
        .await
        .expect("proxy unreachable");

    assert_eq!(res.status(), 200);
    assert!(res.headers().contains_key("x-request-id"));
    assert_eq!(res.bytes().await.unwrap(), br#"{"hits":[]}"#.as_slice());

    let seen = next_request(&mut rx).await;
    assert_eq!(seen.method, "GET");
    assert_eq!(seen.target, "/_search?q=test");
    assert_eq!(seen.header("host"), Some(backend.to_string().as_str()));
    assert_eq!(seen.header_count("authorization"), 1);
    assert_eq!(seen.header("x-amz-security-token"), None);
    assert_eq!(seen.header("x-forwarded-for"), Some("127.0.0.1"));

    let authorization = seen.header("authorization").unwrap();
    assert!(authorization.starts_with("AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/"));
    assert!(authorization.contains("/us-east-1/es/aws4_request, SignedHeaders="));
    assert!(!authorization.contains("x-forwarded-for"));
    assert_signature_verifies(&seen, &credentials());

    shutdown.trigger();
}

#[tokio::test]
async fn client_forwarded_for_keeps_signature_valid() {
    let (backend, mut rx) = common::start_recording_backend(b"{}".to_vec()).await;
    let (proxy, shutdown) = common::start_proxy(common::config_for(backend), credentials()).await;

    let res = common::client()
        .get(format!("http://{proxy}/_search"))
        .header("x-forwarded-for", "10.0.0.5")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);

    let seen = next_request(&mut rx).await;
    assert_eq!(seen.header("x-forwarded-for"), Some("10.0.0.5, 127.0.0.1"));
    assert!(!seen
        .header("authorization")
        .unwrap()
        .contains("x-forwarded-for"));
    assert_signature_verifies(&seen, &credentials());

    shutdown.trigger();
}

#[tokio::test]
async fn query_with_semicolon_arrives_encoded() {
    let (backend, mut rx) = common::start_recording_backend(b"{}".to_vec()).await;
    let (proxy, shutdown) = common::start_proxy(common::config_for(backend), credentials()).await;

    common::client()
        .get(format!("http://{proxy}/idx/_search?q=title:a;b&size=1"))
        .send()
        .await
        .unwrap();

    let seen = next_request(&mut rx).await;
    assert_eq!(seen.target, "/idx/_search?q=title%3Aa%3Bb&size=1");
    assert_signature_verifies(&seen, &credentials());

    shutdown.trigger();
}

#[tokio::test]
async fn request_body_arrives_byte_identical() {
    let (backend, mut rx) = common::start_recording_backend(b"ok".to_vec()).await;
    let (proxy, shutdown) = common::start_proxy(common::config_for(backend), credentials()).await;

    let payload: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
    let res = common::client()
        .post(format!("http://{proxy}/my-index/_bulk"))
        .header("content-type", "application/x-ndjson")
        .body(payload.clone())
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);

    let seen = next_request(&mut rx).await;
    assert_eq!(seen.method, "POST");
    assert_eq!(seen.body, payload);
    assert_signature_verifies(&seen, &credentials());

    shutdown.trigger();
}

#[tokio::test]
async fn session_token_is_sent_and_signed() {
    let (backend, mut rx) = common::start_recording_backend(b"{}".to_vec()).await;
    let creds = credentials().with_session_token("session-token-example");
    let (proxy, shutdown) = common::start_proxy(common::config_for(backend), creds.clone()).await;

    common::client()
        .get(format!("http://{proxy}/_cluster/health"))
        .send()
        .await
        .unwrap();

    let seen = next_request(&mut rx).await;
    assert_eq!(seen.header("x-amz-security-token"), Some("session-token-example"));
    assert!(seen
        .header("authorization")
        .unwrap()
        .contains("x-amz-security-token"));
    assert_signature_verifies(&seen, &creds);

    shutdown.trigger();
}

#[tokio::test]
async fn query_is_forwarded_in_canonical_order() {
    let (backend, mut rx) = common::start_recording_backend(b"{}".to_vec()).await;
    let (proxy, shutdown) = common::start_proxy(common::config_for(backend), credentials()).await;

    common::client()
        .get(format!("http://{proxy}/idx/_search?size=5&q=hello+world"))
        .send()
        .await
        .unwrap();

    let seen = next_request(&mut rx).await;
    assert_eq!(seen.target, "/idx/_search?q=hello%20world&size=5");
    assert_signature_verifies(&seen, &credentials());

    shutdown.trigger();
}

#[tokio::test]
async fn large_response_streams_intact_without_flush_interval() {
    let body: Vec<u8> = (0..3_000_000u32).map(|i| (i % 253) as u8).collect();
    let (backend, _rx) = common::start_recording_backend(body.clone()).await;
    let (proxy, shutdown) = common::start_proxy(common::config_for(backend), credentials()).await;

    let res = common::client()
        .get(format!("http://{proxy}/idx/_doc/1"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(res.bytes().await.unwrap().as_ref(), body.as_slice());

    shutdown.trigger();
}

#[tokio::test]
async fn large_response_streams_intact_with_flush_interval() {
    let body: Vec<u8> = (0..500_000u32).map(|i| (i % 241) as u8).collect();
    let (backend, _rx) = common::start_recording_backend(body.clone()).await;
    let mut config = common::config_for(backend);
    config.flush_interval = Duration::from_secs(1);
    let (proxy, shutdown) = common::start_proxy(config, credentials()).await;

    let res = common::client()
        .get(format!("http://{proxy}/idx/_doc/1"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.bytes().await.unwrap().as_ref(), body.as_slice());

    shutdown.trigger();
}

#[tokio::test]
async fn unreachable_upstream_is_bad_gateway() {
    let dead = common::unused_address().await;
    let (proxy, shutdown) = common::start_proxy(common::config_for(dead), credentials()).await;

    let res = common::client()
        .get(format!("http://{proxy}/_search"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 502);

    shutdown.trigger();
}

#[tokio::test]
async fn strict_signing_rejects_when_credentials_fail() {
    let (backend, mut rx) = common::start_recording_backend(b"{}".to_vec()).await;
    let (proxy, shutdown) = common::start_proxy(common::config_for(backend), NoCredentials).await;

    let res = common::client()
        .get(format!("http://{proxy}/_search"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 500);

    let nothing = tokio::time::timeout(Duration::from_millis(200), rx.recv()).await;
    assert!(nothing.is_err(), "request must not reach the backend");

    shutdown.trigger();
}

#[tokio::test]
async fn lenient_signing_forwards_unsigned_request() {
    let (backend, mut rx) = common::start_recording_backend(b"{}".to_vec()).await;
    let mut config = common::config_for(backend);
    config.strict_signing = false;
    let (proxy, shutdown) = common::start_proxy(config, NoCredentials).await;

    let res = common::client()
        .get(format!("http://{proxy}/_search"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);

    let seen = next_request(&mut rx).await;
    assert_eq!(seen.header("authorization"), None);
    assert_eq!(seen.header("host"), Some(backend.to_string().as_str()));

    shutdown.trigger();
}
