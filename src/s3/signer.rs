//! AWS Signature Version 4 request signing.
//!
//! Signing is a pure function of its inputs, including the timestamp, so the
//! same request signed at the same instant always yields identical output.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use sha2::{Digest, Sha256};
use url::Url;

type HmacSha256 = Hmac<Sha256>;

pub const ALGORITHM: &str = "AWS4-HMAC-SHA256";
pub const UNSIGNED_PAYLOAD: &str = "UNSIGNED-PAYLOAD";

/// Everything except the RFC 3986 unreserved characters.
const URI_ENCODE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

#[derive(Clone)]
pub struct Credentials {
    pub access_key: String,
    pub secret_key: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningScope {
    pub region: String,
    pub service: String,
}

impl SigningScope {
    pub fn s3(region: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            service: "s3".to_string(),
        }
    }

    fn credential_scope(&self, date_stamp: &str) -> String {
        format!("{}/{}/{}/aws4_request", date_stamp, self.region, self.service)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SigningMode {
    /// `Authorization` + `X-Amz-Date` headers.
    Headers,
    /// Presigned query parameters valid for `expires_secs`.
    Query { expires_secs: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadHash {
    /// Hex SHA-256 of the body, known before sending.
    Sha256Hex(String),
    Unsigned,
}

impl PayloadHash {
    pub fn of(body: &[u8]) -> Self {
        PayloadHash::Sha256Hex(hex::encode(Sha256::digest(body)))
    }

    fn as_str(&self) -> &str {
        match self {
            PayloadHash::Sha256Hex(hex) => hex,
            PayloadHash::Unsigned => UNSIGNED_PAYLOAD,
        }
    }
}

/// A request before signing.
#[derive(Debug, Clone)]
pub struct UnsignedRequest {
    pub method: String,
    pub url: Url,
    pub headers: Vec<(String, String)>,
    pub payload: PayloadHash,
}

impl UnsignedRequest {
    pub fn new(method: &str, url: Url, payload: PayloadHash) -> Self {
        Self {
            method: method.to_ascii_uppercase(),
            url,
            headers: Vec::new(),
            payload,
        }
    }

    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }
}

/// A request ready to send. Signatures are time-scoped; sign again for every call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedRequest {
    pub method: String,
    pub url: Url,
    /// Lower-cased header names, including `host` and `authorization`.
    pub headers: BTreeMap<String, String>,
    pub body_hash_hex: String,
    pub canonical_request: String,
    pub string_to_sign: String,
    pub signature: String,
}

/// Credentials bound to a scope, signing with the current time.
#[derive(Debug, Clone)]
pub struct Signer {
    credentials: Credentials,
    scope: SigningScope,
}

impl Signer {
    pub fn new(credentials: Credentials, scope: SigningScope) -> Self {
        Self { credentials, scope }
    }

    pub fn sign(&self, request: &UnsignedRequest, mode: SigningMode) -> SignedRequest {
        sign(request, &self.credentials, &self.scope, mode, Utc::now())
    }
}

pub fn sign(
    request: &UnsignedRequest,
    credentials: &Credentials,
    scope: &SigningScope,
    mode: SigningMode,
    now: DateTime<Utc>,
) -> SignedRequest {
    let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
    let date_stamp = now.format("%Y%m%d").to_string();
    let credential_scope = scope.credential_scope(&date_stamp);

    let mut headers: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in &request.headers {
        headers.insert(name.to_ascii_lowercase(), canonical_header_value(value));
    }
    headers.insert("host".to_string(), host_header(&request.url));

    let payload = match mode {
        SigningMode::Headers => request.payload.clone(),
        SigningMode::Query { .. } => PayloadHash::Unsigned,
    };

    let mut query: Vec<(String, String)> = request
        .url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    match mode {
        SigningMode::Headers => {
            headers.insert("x-amz-date".to_string(), amz_date.clone());
            headers.insert(
                "x-amz-content-sha256".to_string(),
                payload.as_str().to_string(),
            );
        }
        SigningMode::Query { expires_secs } => {
            let signed_headers = signed_header_names(&headers);
            query.push(("X-Amz-Algorithm".into(), ALGORITHM.into()));
            query.push((
                "X-Amz-Credential".into(),
                format!("{}/{}", credentials.access_key, credential_scope),
            ));
            query.push(("X-Amz-Date".into(), amz_date.clone()));
            query.push(("X-Amz-Expires".into(), expires_secs.to_string()));
            query.push(("X-Amz-SignedHeaders".into(), signed_headers));
        }
    }

    let signed_headers = signed_header_names(&headers);
    let canonical_query = canonical_query_string(&query);
    let canonical_request = format!(
        "{}\n{}\n{}\n{}\n{}\n{}",
        request.method,
        canonical_uri(&request.url),
        canonical_query,
        canonical_headers(&headers),
        signed_headers,
        payload.as_str()
    );

    let string_to_sign = format!(
        "{}\n{}\n{}\n{}",
        ALGORITHM,
        amz_date,
        credential_scope,
        hex::encode(Sha256::digest(canonical_request.as_bytes()))
    );

    let key = signing_key(&credentials.secret_key, &date_stamp, scope);
    let signature = hex::encode(hmac_sha256(&key, string_to_sign.as_bytes()));

    let mut url = request.url.clone();
    match mode {
        SigningMode::Headers => {
            headers.insert(
                "authorization".to_string(),
                format!(
                    "{} Credential={}/{}, SignedHeaders={}, Signature={}",
                    ALGORITHM, credentials.access_key, credential_scope, signed_headers, signature
                ),
            );
        }
        SigningMode::Query { .. } => {
            url.set_query(Some(&format!(
                "{}&X-Amz-Signature={}",
                canonical_query, signature
            )));
        }
    }

    SignedRequest {
        method: request.method.clone(),
        url,
        headers,
        body_hash_hex: payload.as_str().to_string(),
        canonical_request,
        string_to_sign,
        signature,
    }
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// date -> region -> service -> "aws4_request"
pub fn signing_key(secret_key: &str, date_stamp: &str, scope: &SigningScope) -> Vec<u8> {
    let k_date = hmac_sha256(
        format!("AWS4{}", secret_key).as_bytes(),
        date_stamp.as_bytes(),
    );
    let k_region = hmac_sha256(&k_date, scope.region.as_bytes());
    let k_service = hmac_sha256(&k_region, scope.service.as_bytes());
    hmac_sha256(&k_service, b"aws4_request")
}

fn uri_encode(value: &str) -> String {
    utf8_percent_encode(value, URI_ENCODE).to_string()
}

/// Each path segment is decoded then re-encoded once; S3 does not normalize paths.
fn canonical_uri(url: &Url) -> String {
    let path = url.path();
    if path.is_empty() {
        return "/".to_string();
    }
    path.split('/')
        .map(|segment| {
            let decoded = percent_encoding::percent_decode_str(segment).decode_utf8_lossy();
            uri_encode(&decoded)
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn canonical_query_string(pairs: &[(String, String)]) -> String {
    let mut encoded: Vec<(String, String)> = pairs
        .iter()
        .map(|(k, v)| (uri_encode(k), uri_encode(v)))
        .collect();
    encoded.sort();
    encoded
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}

fn canonical_header_value(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn canonical_headers(headers: &BTreeMap<String, String>) -> String {
    headers
        .iter()
        .map(|(name, value)| format!("{}:{}\n", name, value))
        .collect()
}

fn signed_header_names(headers: &BTreeMap<String, String>) -> String {
    headers.keys().map(String::as_str).collect::<Vec<_>>().join(";")
}

fn host_header(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    }
}
