//! Connection settings resolved from flags, environment and `.env`

use clap::Args;
use std::fmt;
use std::time::Duration;
use strata_client::{ClientConfig, Credentials, S3Client};

/// Connection settings shared by every command
#[derive(Clone, Args)]
pub struct CliConfig {
    /// Base endpoint URL; empty means AWS for the region
    #[arg(long, default_value = "", env = "STRATA_ENDPOINT")]
    pub endpoint: String,

    /// Signing region
    #[arg(long, default_value = "us-east-1", env = "STRATA_REGION")]
    pub region: String,

    /// Bucket to operate on
    #[arg(short, long, env = "STRATA_BUCKET")]
    pub bucket: String,

    /// Access key ID
    #[arg(long, env = "STRATA_ACCESS_KEY")]
    pub access_key: String,

    /// Secret access key
    #[arg(long, env = "STRATA_SECRET_KEY", hide_env_values = true)]
    pub secret_key: String,

    /// Force path-style addressing
    #[arg(long, env = "STRATA_PATH_STYLE")]
    pub path_style: bool,

    /// Request timeout in seconds
    #[arg(long, default_value = "30", env = "STRATA_TIMEOUT_SECS")]
    pub timeout_secs: u64,

    /// Multipart chunk size in MiB
    #[arg(long, default_value = "8", env = "STRATA_CHUNK_MIB")]
    pub chunk_mib: usize,

    /// Parts uploaded at once
    #[arg(long, default_value = "4", env = "STRATA_PART_CONCURRENCY")]
    pub part_concurrency: usize,
}

impl fmt::Debug for CliConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CliConfig")
            .field("endpoint", &self.endpoint)
            .field("region", &self.region)
            .field("bucket", &self.bucket)
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .field("path_style", &self.path_style)
            .field("timeout_secs", &self.timeout_secs)
            .field("chunk_mib", &self.chunk_mib)
            .field("part_concurrency", &self.part_concurrency)
            .finish()
    }
}

impl CliConfig {
    /// Credentials for the configured bucket
    pub fn credentials(&self) -> Credentials {
        Credentials::new(
            self.access_key.clone(),
            self.secret_key.clone(),
            self.region.clone(),
            self.bucket.clone(),
        )
        .with_endpoint(self.endpoint.clone())
        .with_path_style(self.path_style)
    }

    /// Library configuration derived from the flags
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig::default()
            .with_timeout(Duration::from_secs(self.timeout_secs))
            .with_chunk_size(self.chunk_mib.max(1) * 1024 * 1024)
            .with_part_concurrency(self.part_concurrency)
    }

    /// Build a client, failing early on an invalid endpoint or empty credentials
    pub fn build_client(&self) -> strata_client::Result<S3Client> {
        S3Client::new(self.credentials(), self.client_config())
    }
}
