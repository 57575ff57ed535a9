//! Bucket snapshots and their diff

use crate::task::TaskContext;
use crate::types::ObjectSummary;
use crate::{Result, S3Client};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{info, instrument};

/// Metadata of one key at capture time
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    pub size: i64,
    pub last_modified: DateTime<Utc>,
    pub etag: Option<String>,
    pub is_folder: bool,
}

impl From<&ObjectSummary> for SnapshotEntry {
    fn from(summary: &ObjectSummary) -> Self {
        Self {
            size: summary.size,
            last_modified: summary.last_modified,
            etag: summary.etag.clone(),
            is_folder: summary.is_folder,
        }
    }
}

/// Point-in-time view of a bucket (or a prefix of it), keyed for O(1) lookup
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketSnapshot {
    /// Bucket name
    pub bucket: String,
    /// Capture time
    pub captured_at: DateTime<Utc>,
    /// Entries by key
    pub entries: HashMap<String, SnapshotEntry>,
}

impl BucketSnapshot {
    /// Build a snapshot from listing entries; a repeated key keeps its last entry
    pub fn from_listing(
        bucket: impl Into<String>,
        captured_at: DateTime<Utc>,
        entries: &[ObjectSummary],
    ) -> Self {
        Self {
            bucket: bucket.into(),
            captured_at,
            entries: entries
                .iter()
                .map(|summary| (summary.key.clone(), SnapshotEntry::from(summary)))
                .collect(),
        }
    }

    /// Number of keys
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the snapshot holds no keys
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A key with the metadata reported for it
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyedEntry {
    pub key: String,
    pub entry: SnapshotEntry,
}

/// A key whose size or ETag changed
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Modification {
    pub key: String,
    /// Metadata in the base snapshot
    pub before: SnapshotEntry,
    /// Metadata in the target snapshot
    pub after: SnapshotEntry,
}

/// Differences between two snapshots; the three lists are disjoint and sorted by key
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotDiff {
    /// Keys only in the target, with target metadata
    pub added: Vec<KeyedEntry>,
    /// Keys only in the base, with base metadata
    pub removed: Vec<KeyedEntry>,
    /// Keys in both whose size or ETag differ
    pub modified: Vec<Modification>,
}

impl SnapshotDiff {
    /// Whether the snapshots are equivalent
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.modified.is_empty()
    }
}

/// Compare `base` with `target` in O(|base| + |target|)
pub fn diff(base: &BucketSnapshot, target: &BucketSnapshot) -> SnapshotDiff {
    let mut result = SnapshotDiff::default();

    for (key, after) in &target.entries {
        match base.entries.get(key) {
            None => result.added.push(KeyedEntry {
                key: key.clone(),
                entry: after.clone(),
            }),
            Some(before) if before.size != after.size || before.etag != after.etag => {
                result.modified.push(Modification {
                    key: key.clone(),
                    before: before.clone(),
                    after: after.clone(),
                })
            }
            Some(_) => {}
        }
    }

    for (key, before) in &base.entries {
        if !target.entries.contains_key(key) {
            result.removed.push(KeyedEntry {
                key: key.clone(),
                entry: before.clone(),
            });
        }
    }

    result.added.sort_by(|a, b| a.key.cmp(&b.key));
    result.removed.sort_by(|a, b| a.key.cmp(&b.key));
    result.modified.sort_by(|a, b| a.key.cmp(&b.key));
    result
}

impl S3Client {
    /// Capture every object under `prefix`
    #[instrument(skip(self, ctx))]
    pub async fn capture_snapshot(
        &self,
        prefix: &str,
        ctx: &TaskContext,
    ) -> Result<BucketSnapshot> {
        let captured_at = Utc::now();
        let listing = self.list_all(prefix, ctx).await?;
        let snapshot = BucketSnapshot::from_listing(self.bucket(), captured_at, &listing.entries);
        info!(keys = snapshot.len(), inconsistent = listing.inconsistent, "Captured snapshot");
        Ok(snapshot)
    }
}
