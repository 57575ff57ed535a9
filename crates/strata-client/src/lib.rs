//! # Strata Client
//!
//! Client engine for S3-compatible object storage.
//!
//! ## Features
//!
//! - **SigV4**: header signing and presigned URLs, signing keys cached per day
//! - **Addressing**: path-style and virtual-hosted, with a data-driven provider quirks table
//! - **Listing**: cursor pagination over objects, versions, multipart uploads and parts
//! - **Multipart**: bounded-concurrency part uploads, resumable handles, sorted completion
//! - **Recursive operations**: prefix delete and copy-then-delete rename
//! - **Snapshots**: capture a prefix and diff two captures
//!
//! Long-running operations take a [`TaskContext`] carrying a cancellation
//! token and an optional progress channel.
//!
//! ## Example
//!
//! ```rust,ignore
//! use strata_client::{ClientConfig, Credentials, ListOptions, S3Client, TaskContext};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let creds = Credentials::new("AKID", "secret", "us-east-1", "my-bucket")
//!         .with_endpoint("http://localhost:9000");
//!     let client = S3Client::new(creds, ClientConfig::default())?;
//!
//!     client.put_object("hello.txt", &b"Hello, World!"[..]).await?;
//!
//!     let ctx = TaskContext::new();
//!     let listing = client.list_directory("", &ListOptions::default(), &ctx).await?;
//!     for entry in listing.entries {
//!         println!("{} {}", entry.size, entry.key);
//!     }
//!
//!     client.delete_prefix("tmp/", &ctx).await?;
//!     Ok(())
//! }
//! ```

mod client;
pub mod config;
pub mod endpoint;
mod error;
pub mod listing;
pub mod multipart;
pub mod recursive;
pub mod signer;
pub mod snapshot;
pub mod task;
pub mod transform;
mod types;
pub mod xml;

pub use client::S3Client;
pub use config::{ClientConfig, Credentials, HostPattern, ProviderQuirks, QuirkRule};
pub use endpoint::{Endpoint, Target};
pub use error::{ClientError, Result};
pub use listing::{paginate, ListOptions, Listing, Page};
pub use multipart::{completion_body, MultipartUpload, UploadState};
pub use recursive::{deletion_order, RecursiveReport};
pub use snapshot::{diff, BucketSnapshot, SnapshotDiff, SnapshotEntry};
pub use task::{Progress, Stage, TaskContext};
pub use transform::{Identity, PayloadTransform};
pub use types::*;
