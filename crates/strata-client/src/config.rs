//! Client configuration

use std::fmt;
use std::time::Duration;

/// Long-term credentials and the target of one client instance.
///
/// Immutable for the lifetime of an [`S3Client`](crate::S3Client).
#[derive(Clone)]
pub struct Credentials {
    /// Access key ID
    pub access_key: String,
    /// Secret access key
    pub secret_key: String,
    /// Signing region
    pub region: String,
    /// Target bucket
    pub bucket: String,
    /// Base endpoint URL; empty means the default AWS host for `region`
    pub endpoint: String,
    /// Use path-style addressing instead of virtual-hosted
    pub path_style: bool,
}

impl Credentials {
    /// Create credentials for the default AWS endpoint
    pub fn new(
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
        region: impl Into<String>,
        bucket: impl Into<String>,
    ) -> Self {
        Self {
            access_key: access_key.into(),
            secret_key: secret_key.into(),
            region: region.into(),
            bucket: bucket.into(),
            endpoint: String::new(),
            path_style: false,
        }
    }

    /// Set a custom endpoint
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Use path-style addressing
    pub fn with_path_style(mut self, path_style: bool) -> Self {
        self.path_style = path_style;
        self
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .field("region", &self.region)
            .field("bucket", &self.bucket)
            .field("endpoint", &self.endpoint)
            .field("path_style", &self.path_style)
            .finish()
    }
}

/// How a quirk rule matches an endpoint host
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HostPattern {
    /// Host equals the value (case-insensitive)
    Exact(String),
    /// Host ends with the value (case-insensitive)
    Suffix(String),
}

impl HostPattern {
    fn matches(&self, host: &str) -> bool {
        let host = host.to_ascii_lowercase();
        match self {
            Self::Exact(h) => host == h.to_ascii_lowercase(),
            Self::Suffix(s) => host.ends_with(&s.to_ascii_lowercase()),
        }
    }
}

/// Overrides applied to providers whose hosts match `pattern`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QuirkRule {
    /// Host pattern
    pub pattern: HostPattern,
    /// Force path-style addressing
    pub force_path_style: bool,
    /// Region to sign with instead of the configured one
    pub region: Option<String>,
}

/// Effective overrides for one endpoint host
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct QuirkOverrides {
    /// Path-style addressing is mandatory
    pub force_path_style: bool,
    /// Signing region override
    pub region: Option<String>,
}

/// Table of provider-specific overrides keyed by endpoint host
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProviderQuirks {
    rules: Vec<QuirkRule>,
}

impl ProviderQuirks {
    /// A table with no rules
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    /// Append a rule; later rules win for the region override
    pub fn with_rule(mut self, rule: QuirkRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Rules in evaluation order
    pub fn rules(&self) -> &[QuirkRule] {
        &self.rules
    }

    /// Combine every rule matching `host`
    pub fn lookup(&self, host: &str) -> QuirkOverrides {
        let mut overrides = QuirkOverrides::default();
        for rule in self.rules.iter().filter(|r| r.pattern.matches(host)) {
            overrides.force_path_style |= rule.force_path_style;
            if let Some(region) = &rule.region {
                overrides.region = Some(region.clone());
            }
        }
        overrides
    }
}

impl Default for ProviderQuirks {
    fn default() -> Self {
        Self::empty()
            .with_rule(QuirkRule {
                pattern: HostPattern::Suffix(".r2.cloudflarestorage.com".to_string()),
                force_path_style: false,
                region: Some("auto".to_string()),
            })
            .with_rule(QuirkRule {
                pattern: HostPattern::Exact("localhost".to_string()),
                force_path_style: true,
                region: None,
            })
            .with_rule(QuirkRule {
                pattern: HostPattern::Exact("127.0.0.1".to_string()),
                force_path_style: true,
                region: None,
            })
    }
}

/// Client configuration
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Request timeout, enforced by the HTTP transport
    pub timeout: Duration,
    /// User agent string
    pub user_agent: String,
    /// Multipart chunk size (bytes)
    pub multipart_chunk_size: usize,
    /// Maximum concurrent part uploads
    pub part_concurrency: usize,
    /// Page size requested from listing endpoints
    pub page_size: usize,
    /// Provider quirks table
    pub quirks: ProviderQuirks,
}

/// Smallest part size S3 accepts for every part but the last
pub const MIN_PART_SIZE: usize = 5 * 1024 * 1024;

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            user_agent: format!("strata-client/{}", env!("CARGO_PKG_VERSION")),
            multipart_chunk_size: 8 * 1024 * 1024, // 8 MB
            part_concurrency: 4,
            page_size: 1000,
            quirks: ProviderQuirks::default(),
        }
    }
}

impl ClientConfig {
    /// Set timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the multipart chunk size
    pub fn with_chunk_size(mut self, bytes: usize) -> Self {
        self.multipart_chunk_size = bytes;
        self
    }

    /// Set the number of parts uploaded at once
    pub fn with_part_concurrency(mut self, parts: usize) -> Self {
        self.part_concurrency = parts.max(1);
        self
    }

    /// Set the listing page size
    pub fn with_page_size(mut self, keys: usize) -> Self {
        self.page_size = keys.clamp(1, 1000);
        self
    }

    /// Replace the provider quirks table
    pub fn with_quirks(mut self, quirks: ProviderQuirks) -> Self {
        self.quirks = quirks;
        self
    }
}
