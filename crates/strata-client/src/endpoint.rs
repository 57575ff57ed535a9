//! Host and path resolution for path-style and virtual-hosted addressing

use crate::config::{Credentials, ProviderQuirks};
use crate::{ClientError, Result};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use url::Url;

/// Characters escaped in object keys: everything but RFC 3986 unreserved and `/`.
const KEY_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b'/');

/// Characters escaped in query names and values: everything but RFC 3986 unreserved.
pub(crate) const QUERY_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Percent-encode an object key, leaving `/` intact
pub fn encode_key(key: &str) -> String {
    utf8_percent_encode(key, KEY_ENCODE_SET).to_string()
}

/// Reject keys with a `.` or `..` segment.
///
/// URL parsing removes dot segments even when percent-encoded, so such a key
/// would be sent and signed as a different path.
pub fn check_key(key: &str) -> Result<()> {
    if key.split('/').any(|segment| segment == "." || segment == "..") {
        return Err(ClientError::InvalidArgument(format!(
            "object key '{}' has a '.' or '..' path segment",
            key
        )));
    }
    Ok(())
}

/// Percent-encode a query parameter name or value, `/` included
pub fn encode_query_component(value: &str) -> String {
    utf8_percent_encode(value, QUERY_ENCODE_SET).to_string()
}

/// A parsed base endpoint with provider quirks applied
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoint {
    scheme: String,
    /// Host including a non-default port
    authority: String,
    path_style: bool,
    region: String,
}

impl Endpoint {
    /// Parse the configured endpoint. Fails before any network call.
    pub fn from_credentials(credentials: &Credentials, quirks: &ProviderQuirks) -> Result<Self> {
        let raw = credentials.endpoint.trim();
        let raw = if raw.is_empty() {
            if credentials.region.is_empty() {
                return Err(ClientError::Config(
                    "either an endpoint or a region is required".to_string(),
                ));
            }
            format!("https://s3.{}.amazonaws.com", credentials.region)
        } else if raw.contains("://") {
            raw.to_string()
        } else {
            format!("https://{}", raw)
        };

        let url = Url::parse(&raw)
            .map_err(|e| ClientError::Config(format!("invalid endpoint '{}': {}", raw, e)))?;

        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ClientError::Config(format!(
                "unsupported endpoint scheme '{}'",
                url.scheme()
            )));
        }
        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| ClientError::Config(format!("endpoint '{}' has no host", raw)))?;
        if url.path() != "/" && !url.path().is_empty() {
            return Err(ClientError::Config(format!(
                "endpoint '{}' must not contain a path",
                raw
            )));
        }

        let overrides = quirks.lookup(host);
        let authority = match url.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        };

        Ok(Self {
            scheme: url.scheme().to_string(),
            authority,
            path_style: credentials.path_style || overrides.force_path_style,
            region: overrides.region.unwrap_or_else(|| credentials.region.clone()),
        })
    }

    /// Region to sign with, after quirk overrides
    pub fn region(&self) -> &str {
        &self.region
    }

    /// Whether requests use path-style addressing
    pub fn is_path_style(&self) -> bool {
        self.path_style
    }

    /// Compute host and encoded path for a bucket/key pair.
    ///
    /// An empty bucket addresses the service root (bucket listing).
    pub fn resolve(&self, bucket: &str, key: &str) -> Target {
        let encoded_key = encode_key(key);

        let (host, path) = if bucket.is_empty() {
            (self.authority.clone(), "/".to_string())
        } else if self.path_style {
            let path = if key.is_empty() {
                format!("/{}", encode_key(bucket))
            } else {
                format!("/{}/{}", encode_key(bucket), encoded_key)
            };
            (self.authority.clone(), path)
        } else {
            (format!("{}.{}", bucket, self.authority), format!("/{}", encoded_key))
        };

        Target {
            scheme: self.scheme.clone(),
            host,
            path,
        }
    }
}

/// The resolved destination of one request
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Target {
    /// `http` or `https`
    pub scheme: String,
    /// Host header value, with port when non-default
    pub host: String,
    /// Percent-encoded path, starting with `/`
    pub path: String,
}

impl Target {
    /// Render the wire URL with an already canonical query string
    pub fn url(&self, canonical_query: &str) -> String {
        if canonical_query.is_empty() {
            format!("{}://{}{}", self.scheme, self.host, self.path)
        } else {
            format!("{}://{}{}?{}", self.scheme, self.host, self.path, canonical_query)
        }
    }
}

/// One-shot resolution from credentials, for callers that do not keep an [`Endpoint`]
pub fn resolve(
    credentials: &Credentials,
    quirks: &ProviderQuirks,
    bucket: &str,
    key: &str,
) -> Result<Target> {
    Ok(Endpoint::from_credentials(credentials, quirks)?.resolve(bucket, key))
}
