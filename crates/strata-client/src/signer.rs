//! AWS Signature Version 4 signing for header-authenticated requests and presigned URLs
//!
//! The canonical request is
//!
//! ```text
//! Method\n
//! CanonicalURI\n
//! CanonicalQueryString\n
//! CanonicalHeaders\n
//! SignedHeaders\n
//! HashedPayload
//! ```
//!
//! and the signing key is derived once per date stamp and cached.

use crate::endpoint::encode_query_component;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::Mutex;

type HmacSha256 = Hmac<Sha256>;

/// Signing algorithm identifier
pub const ALGORITHM: &str = "AWS4-HMAC-SHA256";

/// Payload hash sentinel used by presigned URLs
pub const UNSIGNED_PAYLOAD: &str = "UNSIGNED-PAYLOAD";

/// SHA-256 of the empty string
pub const EMPTY_SHA256: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

/// Longest validity a presigned URL may carry (7 days)
pub const MAX_PRESIGN_EXPIRY_SECS: u64 = 7 * 24 * 60 * 60;

const SERVICE: &str = "s3";
const TERMINATOR: &str = "aws4_request";
const AMZ_PREFIX: &str = "x-amz-";

/// Hex SHA-256 of the exact bytes transmitted
pub fn payload_hash(payload: &[u8]) -> String {
    if payload.is_empty() {
        EMPTY_SHA256.to_string()
    } else {
        hex::encode(Sha256::digest(payload))
    }
}

/// Everything the signer needs to know about one request
#[derive(Debug)]
pub struct SigningRequest<'a> {
    /// HTTP method
    pub method: &'a str,
    /// Host header value
    pub host: &'a str,
    /// Path as the HTTP library will send it
    pub path: &'a str,
    /// Path as resolved before URL parsing; its trailing slash wins
    pub original_path: &'a str,
    /// Decoded query parameters; a flag parameter has an empty value
    pub query: &'a [(String, String)],
    /// Request headers (any case)
    pub headers: &'a [(String, String)],
    /// Hex payload hash, see [`payload_hash`]
    pub payload_hash: &'a str,
}

/// Output of header-based signing
#[derive(Clone, Debug)]
pub struct SignedRequest {
    /// Headers to send: caller headers plus date, payload hash and authorization
    pub headers: Vec<(String, String)>,
    /// Canonical query string, also used verbatim on the wire
    pub canonical_query: String,
    /// Hex signature
    pub signature: String,
}

/// AWS Signature Version 4 signer
pub struct Signer {
    access_key: String,
    region: String,
    /// "AWS4" + secret key
    aws4_key: Vec<u8>,
    /// Signing key for the last date stamp used
    cached_signing_key: Mutex<Option<(String, [u8; 32])>>,
}

impl Clone for Signer {
    fn clone(&self) -> Self {
        Self {
            access_key: self.access_key.clone(),
            region: self.region.clone(),
            aws4_key: self.aws4_key.clone(),
            cached_signing_key: Mutex::new(None),
        }
    }
}

impl std::fmt::Debug for Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signer")
            .field("access_key", &self.access_key)
            .field("region", &self.region)
            .finish_non_exhaustive()
    }
}

impl Signer {
    /// Create a signer for one credential set and region
    pub fn new(access_key: impl Into<String>, secret_key: &str, region: impl Into<String>) -> Self {
        Self {
            access_key: access_key.into(),
            region: region.into(),
            aws4_key: format!("AWS4{}", secret_key).into_bytes(),
            cached_signing_key: Mutex::new(None),
        }
    }

    /// Signing region
    pub fn region(&self) -> &str {
        &self.region
    }

    /// Sign a request for header-based authentication
    pub fn sign(&self, request: &SigningRequest<'_>, now: DateTime<Utc>) -> SignedRequest {
        debug_assert!(!request.host.is_empty(), "signing a request without a host");

        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let date_stamp = now.format("%Y%m%d").to_string();

        let mut signed: BTreeMap<String, String> = BTreeMap::new();
        for (name, value) in request.headers {
            let name = name.to_ascii_lowercase();
            if name.starts_with(AMZ_PREFIX) || name == "content-type" {
                let value = normalize_header_value(value);
                signed
                    .entry(name)
                    .and_modify(|v| {
                        v.push(',');
                        v.push_str(&value);
                    })
                    .or_insert(value);
            }
        }
        signed.insert("host".to_string(), request.host.to_string());
        signed.insert("x-amz-date".to_string(), amz_date.clone());
        signed.insert("x-amz-content-sha256".to_string(), request.payload_hash.to_string());

        let canonical_query = canonical_query_string(request.query);
        let signed_headers = signed_header_names(&signed);
        let canonical_request = canonical_request(
            request.method,
            &canonical_uri(request.path, request.original_path),
            &canonical_query,
            &canonical_headers(&signed),
            &signed_headers,
            request.payload_hash,
        );
        let scope = self.scope(&date_stamp);
        let signature = self.signature(
            &date_stamp,
            &string_to_sign(&amz_date, &scope, &canonical_request),
        );

        let authorization = format!(
            "{} Credential={}/{}, SignedHeaders={}, Signature={}",
            ALGORITHM, self.access_key, scope, signed_headers, signature
        );

        let mut headers: Vec<(String, String)> = request
            .headers
            .iter()
            .filter(|(name, _)| !name.eq_ignore_ascii_case("host"))
            .cloned()
            .collect();
        headers.push(("x-amz-date".to_string(), amz_date));
        headers.push(("x-amz-content-sha256".to_string(), request.payload_hash.to_string()));
        headers.push(("authorization".to_string(), authorization));

        SignedRequest {
            headers,
            canonical_query,
            signature,
        }
    }

    /// Build the query string of a presigned URL, signature included.
    ///
    /// Only `host` is signed and the payload is `UNSIGNED-PAYLOAD`.
    #[allow(clippy::too_many_arguments)]
    pub fn presign_query(
        &self,
        method: &str,
        host: &str,
        path: &str,
        original_path: &str,
        extra_query: &[(String, String)],
        expires_secs: u64,
        now: DateTime<Utc>,
    ) -> String {
        debug_assert!(!host.is_empty(), "presigning a request without a host");

        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let date_stamp = now.format("%Y%m%d").to_string();
        let scope = self.scope(&date_stamp);
        let expires = expires_secs.clamp(1, MAX_PRESIGN_EXPIRY_SECS);

        let mut query: Vec<(String, String)> = extra_query.to_vec();
        query.push(("X-Amz-Algorithm".to_string(), ALGORITHM.to_string()));
        query.push(("X-Amz-Credential".to_string(), format!("{}/{}", self.access_key, scope)));
        query.push(("X-Amz-Date".to_string(), amz_date.clone()));
        query.push(("X-Amz-Expires".to_string(), expires.to_string()));
        query.push(("X-Amz-SignedHeaders".to_string(), "host".to_string()));

        let mut signed = BTreeMap::new();
        signed.insert("host".to_string(), host.to_string());

        let canonical_query = canonical_query_string(&query);
        let canonical_request = canonical_request(
            method,
            &canonical_uri(path, original_path),
            &canonical_query,
            &canonical_headers(&signed),
            "host",
            UNSIGNED_PAYLOAD,
        );
        let signature = self.signature(
            &date_stamp,
            &string_to_sign(&amz_date, &scope, &canonical_request),
        );

        format!("{}&X-Amz-Signature={}", canonical_query, signature)
    }

    fn scope(&self, date_stamp: &str) -> String {
        format!("{}/{}/{}/{}", date_stamp, self.region, SERVICE, TERMINATOR)
    }

    /// HMAC of the string to sign with the (cached) daily signing key
    fn signature(&self, date_stamp: &str, string_to_sign: &str) -> String {
        let signing_key = {
            let mut cache = self
                .cached_signing_key
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            match cache.as_ref() {
                Some((cached_date, key)) if cached_date == date_stamp => *key,
                _ => {
                    let key = self.derive_signing_key(date_stamp);
                    *cache = Some((date_stamp.to_string(), key));
                    key
                }
            }
        };

        hex::encode(hmac_sha256(&signing_key, string_to_sign.as_bytes()))
    }

    /// secret -> date -> region -> service -> terminator
    fn derive_signing_key(&self, date_stamp: &str) -> [u8; 32] {
        let k_date = hmac_sha256(&self.aws4_key, date_stamp.as_bytes());
        let k_region = hmac_sha256(&k_date, self.region.as_bytes());
        let k_service = hmac_sha256(&k_region, SERVICE.as_bytes());
        hmac_sha256(&k_service, TERMINATOR.as_bytes())
    }
}

fn hmac_sha256(key: &[u8], msg: &[u8]) -> [u8; 32] {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(msg);
    let mut output = [0u8; 32];
    output.copy_from_slice(&mac.finalize().into_bytes());
    output
}

/// Canonical URI from the path the HTTP library will send.
///
/// URL normalization can drop a trailing slash; it is restored from the
/// originally resolved path so `folder/` and `folder` never sign alike.
pub fn canonical_uri(wire_path: &str, original_path: &str) -> String {
    let mut uri = if wire_path.is_empty() {
        "/".to_string()
    } else {
        wire_path.to_string()
    };
    if original_path.ends_with('/') && !uri.ends_with('/') {
        uri.push('/');
    }
    uri
}

/// Encode every name and value, then sort by name and value
pub fn canonical_query_string(query: &[(String, String)]) -> String {
    let mut params: Vec<(String, String)> = query
        .iter()
        .map(|(k, v)| (encode_query_component(k), encode_query_component(v)))
        .collect();
    params.sort_unstable();

    params
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}

/// `name:value\n` per header; names are already lower-case and sorted by the map
fn canonical_headers(headers: &BTreeMap<String, String>) -> String {
    let mut result = String::with_capacity(headers.len() * 64);
    for (k, v) in headers {
        result.push_str(k);
        result.push(':');
        result.push_str(v);
        result.push('\n');
    }
    result
}

fn signed_header_names(headers: &BTreeMap<String, String>) -> String {
    headers.keys().map(String::as_str).collect::<Vec<_>>().join(";")
}

fn canonical_request(
    method: &str,
    uri: &str,
    query: &str,
    headers: &str,
    signed_headers: &str,
    payload_hash: &str,
) -> String {
    // `headers` already ends with '\n', which yields the blank line of the format.
    format!(
        "{}\n{}\n{}\n{}\n{}\n{}",
        method, uri, query, headers, signed_headers, payload_hash
    )
}

fn string_to_sign(amz_date: &str, scope: &str, canonical_request: &str) -> String {
    format!(
        "{}\n{}\n{}\n{}",
        ALGORITHM,
        amz_date,
        scope,
        hex::encode(Sha256::digest(canonical_request.as_bytes()))
    )
}

/// Trim and collapse runs of spaces
fn normalize_header_value(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}
