//! JSON persistence for bucket snapshots

use anyhow::{Context, Result};
use std::path::Path;
use strata_client::BucketSnapshot;

/// Write `snapshot` to `path` as pretty-printed JSON
pub fn save(path: &Path, snapshot: &BucketSnapshot) -> Result<()> {
    let json = serde_json::to_string_pretty(snapshot).context("Failed to serialize snapshot")?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write snapshot to {}", path.display()))
}

/// Read a snapshot written by [`save`]
pub fn load(path: &Path) -> Result<BucketSnapshot> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read snapshot from {}", path.display()))?;
    serde_json::from_str(&json)
        .with_context(|| format!("{} is not a snapshot file", path.display()))
}
