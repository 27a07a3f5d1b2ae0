//! Canonical request construction for AWS Signature Version 4.
//!
//! ```text
//! HTTPRequestMethod\n
//! CanonicalURI\n
//! CanonicalQueryString\n
//! CanonicalHeaders\n\n
//! SignedHeaders\n
//! HashedPayload
//! ```

use std::collections::BTreeMap;

use axum::http::HeaderMap;
use percent_encoding::{percent_decode, percent_encode, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use sha2::{Digest, Sha256};

/// Everything except the RFC 3986 unreserved characters is encoded.
const URI_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Headers never included in a signature: they are rewritten by
/// intermediaries (this proxy appends to `x-forwarded-for` after signing)
/// or carry the signature itself.
pub const UNSIGNED_HEADERS: [&str; 4] = [
    "authorization",
    "user-agent",
    "x-amzn-trace-id",
    "x-forwarded-for",
];

/// Canonical headers block and the matching signed-headers list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalHeaders {
    /// `name:value` lines, sorted by name, newline-joined.
    pub block: String,
    /// Sorted, semicolon-joined header names.
    pub signed: String,
}

/// Build the full canonical request. Returns the request string and the
/// signed-headers list that goes into the `Authorization` header.
pub fn canonical_request(
    method: &str,
    path: &str,
    query: &str,
    headers: &HeaderMap,
    payload_hash: &str,
) -> (String, String) {
    let canonical_uri = canonical_uri(path);
    let canonical_query = canonical_query_string(query);
    let CanonicalHeaders { block, signed } = canonical_headers(headers);

    let request = format!(
        "{method}\n{canonical_uri}\n{canonical_query}\n{block}\n\n{signed}\n{payload_hash}"
    );
    (request, signed)
}

/// Encode each segment of the path as it appears on the wire. Segments that
/// are already percent-encoded get encoded a second time, which is what
/// every service except S3 expects. An empty path becomes `/`.
pub fn canonical_uri(path: &str) -> String {
    if path.is_empty() {
        return "/".to_owned();
    }
    path.split('/').map(uri_encode).collect::<Vec<_>>().join("/")
}

/// Normalize a raw query string: blank pairs are dropped, keys and values
/// are decoded to bytes (`+` is a space) and re-encoded with the unreserved
/// set, then pairs are sorted by key and value.
///
/// Nothing else is lost: `;` becomes `%3B` and bytes that are not UTF-8
/// keep their original escapes.
pub fn canonical_query_string(query: &str) -> String {
    let mut params: Vec<(String, String)> = query
        .trim()
        .split('&')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            (reencode(key), reencode(value))
        })
        .collect();

    params.sort_unstable();

    params
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&")
}

/// Build the canonical headers block from every signable header.
///
/// Names are lowercase; repeated headers are comma-joined in arrival order;
/// values are trimmed with inner whitespace runs collapsed to one space.
pub fn canonical_headers(headers: &HeaderMap) -> CanonicalHeaders {
    let mut map: BTreeMap<&str, String> = BTreeMap::new();
    for (name, value) in headers {
        let name = name.as_str();
        if UNSIGNED_HEADERS.contains(&name) {
            continue;
        }
        let value = collapse_whitespace(String::from_utf8_lossy(value.as_bytes()).trim());
        map.entry(name)
            .and_modify(|existing| {
                existing.push(',');
                existing.push_str(&value);
            })
            .or_insert(value);
    }

    let block = map
        .iter()
        .map(|(name, value)| format!("{name}:{value}"))
        .collect::<Vec<_>>()
        .join("\n");
    let signed = map.keys().copied().collect::<Vec<_>>().join(";");

    CanonicalHeaders { block, signed }
}

/// Lowercase hex SHA-256 of `data`.
pub fn hash_hex(data: impl AsRef<[u8]>) -> String {
    hex::encode(Sha256::digest(data.as_ref()))
}

fn uri_encode(input: &str) -> String {
    utf8_percent_encode(input, URI_ENCODE_SET).to_string()
}

fn reencode(component: &str) -> String {
    let spaced = component.replace('+', " ");
    let raw: Vec<u8> = percent_decode(spaced.as_bytes()).collect();
    percent_encode(&raw, URI_ENCODE_SET).to_string()
}

fn collapse_whitespace(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut prev_was_space = false;
    for ch in s.chars() {
        if ch.is_whitespace() {
            if !prev_was_space {
                result.push(' ');
                prev_was_space = true;
            }
        } else {
            result.push(ch);
            prev_was_space = false;
        }
    }
    result
}
