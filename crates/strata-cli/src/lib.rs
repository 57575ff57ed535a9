//! # Strata CLI
//!
//! Command-line surface over [`strata_client`]:
//!
//! - **ls**: directory or recursive listing
//! - **put**: upload with automatic multipart splitting
//! - **rm / mv**: single-object or recursive delete and rename
//! - **presign**: presigned GET/PUT URLs
//! - **snapshot**: capture a prefix to JSON and diff two captures
//! - **uploads**: list and abort orphaned multipart uploads
//!
//! Connection settings come from flags, `STRATA_*` environment variables or a
//! `.env` file.

pub mod commands;
pub mod config;
pub mod snapshot_file;

pub use commands::{interactive_context, run, Command};
pub use config::CliConfig;
