//! Recursive delete and rename over a key prefix
//!
//! Both operations take one flat listing up front, order it children first
//! and then process entries one at a time, checking for cancellation before
//! each entry. Nothing is rolled back: a failure or cancellation leaves every
//! entry processed so far in its new state. Running the same operation again
//! converges, since it only acts on what is still listed.
//!
//! Rename is copy-then-delete per object, so an interrupted rename can leave
//! both the old and the new copy of the last entry it touched.

use crate::task::{Stage, TaskContext};
use crate::types::ObjectSummary;
use crate::{ClientError, Result, S3Client};
use tracing::{debug, info, instrument};

/// Outcome of a recursive operation
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RecursiveReport {
    /// Entries handled
    pub processed: u64,
    /// Entries found by the listing
    pub total: u64,
    /// The listing may have been cut short by the service
    pub inconsistent: bool,
}

/// Order entries so that deeper keys come before their parents.
///
/// Longer keys first; the sort is stable, so keys of equal length keep their
/// listing order.
pub fn deletion_order(mut entries: Vec<ObjectSummary>) -> Vec<ObjectSummary> {
    entries.sort_by(|a, b| b.key.len().cmp(&a.key.len()));
    entries
}

impl S3Client {
    /// Delete every object under `prefix`, children before parents.
    ///
    /// A `prefix` ending in `/` that was not itself listed is deleted last as
    /// a folder marker; failure of that final delete is ignored.
    #[instrument(skip(self, ctx))]
    pub async fn delete_prefix(&self, prefix: &str, ctx: &TaskContext) -> Result<RecursiveReport> {
        let listing = self.list_all(prefix, ctx).await?;
        let marker_listed = listing.entries.iter().any(|e| e.key == prefix);
        let entries = deletion_order(listing.entries);

        let mut report = RecursiveReport {
            processed: 0,
            total: entries.len() as u64,
            inconsistent: listing.inconsistent,
        };

        for entry in &entries {
            ctx.checkpoint()?;
            self.delete_object(&entry.key).await?;
            report.processed += 1;
            ctx.report(Stage::Deleting, report.processed, Some(report.total));
        }

        if prefix.ends_with('/') && !marker_listed {
            ctx.checkpoint()?;
            if let Err(e) = self.delete_object(prefix).await {
                debug!(prefix = %prefix, error = %e, "Folder marker delete failed; ignoring");
            }
        }

        info!(prefix = %prefix, deleted = report.processed, "Recursive delete finished");
        Ok(report)
    }

    /// Move every object under `old` to `new`, keeping the remainder of each key.
    ///
    /// Fails with [`ClientError::Config`] when `new` lies inside `old`, since the
    /// copies would land in the prefix being renamed.
    #[instrument(skip(self, ctx))]
    pub async fn rename_prefix(
        &self,
        old: &str,
        new: &str,
        ctx: &TaskContext,
    ) -> Result<RecursiveReport> {
        if new.starts_with(old) {
            return Err(ClientError::Config(format!(
                "cannot rename '{}' into itself ('{}')",
                old, new
            )));
        }

        let listing = self.list_all(old, ctx).await?;
        let entries = deletion_order(listing.entries);
        let mut report = RecursiveReport {
            processed: 0,
            total: entries.len() as u64,
            inconsistent: listing.inconsistent,
        };

        for entry in &entries {
            ctx.checkpoint()?;
            if let Some(remainder) = entry.key.strip_prefix(old) {
                let dest = format!("{}{}", new, remainder);
                self.rename_object(&entry.key, &dest).await?;
            }
            report.processed += 1;
            ctx.report(Stage::Renaming, report.processed, Some(report.total));
        }

        info!(from = %old, to = %new, renamed = report.processed, "Recursive rename finished");
        Ok(report)
    }

    /// Copy `old` to `new`, then delete `old`
    #[instrument(skip(self))]
    pub async fn rename_object(&self, old: &str, new: &str) -> Result<()> {
        self.copy_object(old, new).await?;
        self.delete_object(old).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(entries: &[ObjectSummary]) -> Vec<&str> {
        entries.iter().map(|e| e.key.as_str()).collect()
    }

    #[test]
    fn test_children_before_parents() {
        let entries = vec![
            ObjectSummary::folder("a/"),
            ObjectSummary::folder("a/b/"),
            ObjectSummary::folder("a/b/c.txt"),
        ];
        assert_eq!(keys(&deletion_order(entries)), vec!["a/b/c.txt", "a/b/", "a/"]);
    }

    #[test]
    fn test_equal_lengths_keep_listing_order() {
        let entries = vec![
            ObjectSummary::folder("a/x"),
            ObjectSummary::folder("a/y"),
            ObjectSummary::folder("a/"),
            ObjectSummary::folder("a/z"),
        ];
        assert_eq!(keys(&deletion_order(entries)), vec!["a/x", "a/y", "a/z", "a/"]);
    }
}
