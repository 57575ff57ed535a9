//! Paginated listing
//!
//! Every list call in S3 is cursor-paged. [`paginate`] drives one page at a
//! time: it checks for cancellation before each request, replays the cursor
//! the service handed back verbatim, and stops at the first page that is not
//! truncated. A truncated page without a cursor cannot be continued; the loop
//! logs a warning, marks the listing inconsistent and returns what it has.

use crate::task::{Stage, TaskContext};
use crate::types::*;
use crate::{Result, S3Client};
use std::future::Future;
use tracing::{instrument, warn};

/// One page as seen by the pagination loop
#[derive(Clone, Debug)]
pub struct Page<T, C> {
    /// Entries in service order
    pub items: Vec<T>,
    /// The service reported more results
    pub is_truncated: bool,
    /// Cursor for the following page
    pub next: Option<C>,
}

/// Entries accumulated over all pages
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Listing<T> {
    /// Entries in page order
    pub entries: Vec<T>,
    /// Number of pages fetched
    pub pages: u64,
    /// A truncated page arrived without a cursor, so the listing may be incomplete
    pub inconsistent: bool,
}

impl<T> Default for Listing<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            pages: 0,
            inconsistent: false,
        }
    }
}

/// Listing options
#[derive(Clone, Debug, Default)]
pub struct ListOptions {
    /// Keep the zero-byte marker object whose key equals the listed prefix
    pub include_prefix_itself: bool,
}

/// Cursor of ListObjectVersions
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VersionCursor {
    pub key_marker: String,
    pub version_id_marker: Option<String>,
}

/// Cursor of ListMultipartUploads
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadCursor {
    pub key_marker: String,
    pub upload_id_marker: Option<String>,
}

/// Fetch pages sequentially until the listing is complete.
///
/// `fetch` receives `None` for the first page and afterwards the cursor of
/// the previous page.
pub async fn paginate<T, C, F, Fut>(ctx: &TaskContext, mut fetch: F) -> Result<Listing<T>>
where
    F: FnMut(Option<C>) -> Fut,
    Fut: Future<Output = Result<Page<T, C>>>,
{
    let mut listing = Listing::default();
    let mut cursor: Option<C> = None;

    loop {
        ctx.checkpoint()?;

        let page = fetch(cursor.take()).await?;
        listing.pages += 1;
        listing.entries.extend(page.items);
        ctx.report(Stage::Listing, listing.pages, None);

        if !page.is_truncated {
            break;
        }
        match page.next {
            Some(next) => cursor = Some(next),
            None => {
                warn!(
                    pages = listing.pages,
                    entries = listing.entries.len(),
                    "Truncated listing page without a continuation cursor; stopping early"
                );
                listing.inconsistent = true;
                break;
            }
        }
    }

    Ok(listing)
}

/// Directory prefixes always end with `/`; the bucket root is the empty prefix
fn directory_prefix(prefix: &str) -> String {
    if prefix.is_empty() || prefix.ends_with('/') {
        prefix.to_string()
    } else {
        format!("{}/", prefix)
    }
}

impl S3Client {
    /// Immediate children of `prefix`: objects plus one folder entry per common prefix
    #[instrument(skip(self, ctx))]
    pub async fn list_directory(
        &self,
        prefix: &str,
        options: &ListOptions,
        ctx: &TaskContext,
    ) -> Result<Listing<ObjectSummary>> {
        let prefix = directory_prefix(prefix);
        let mut listing = self.list_objects(&prefix, Some("/"), ctx).await?;
        if !options.include_prefix_itself && !prefix.is_empty() {
            listing.entries.retain(|entry| entry.key != prefix);
        }
        Ok(listing)
    }

    /// Every object under `prefix`, flat
    #[instrument(skip(self, ctx))]
    pub async fn list_all(
        &self,
        prefix: &str,
        ctx: &TaskContext,
    ) -> Result<Listing<ObjectSummary>> {
        self.list_objects(prefix, None, ctx).await
    }

    async fn list_objects(
        &self,
        prefix: &str,
        delimiter: Option<&str>,
        ctx: &TaskContext,
    ) -> Result<Listing<ObjectSummary>> {
        paginate(ctx, move |token: Option<String>| {
            let options = ListObjectsOptions {
                prefix: (!prefix.is_empty()).then(|| prefix.to_string()),
                delimiter: delimiter.map(str::to_string),
                continuation_token: token,
                ..Default::default()
            };
            async move {
                let page = self.list_objects_page(&options).await?;
                Ok(Page {
                    items: page.entries,
                    is_truncated: page.is_truncated,
                    next: page.next_continuation_token,
                })
            }
        })
        .await
    }

    /// Every version and delete marker under `prefix`
    #[instrument(skip(self, ctx))]
    pub async fn list_all_versions(
        &self,
        prefix: &str,
        ctx: &TaskContext,
    ) -> Result<Listing<ObjectVersion>> {
        paginate(ctx, move |cursor: Option<VersionCursor>| async move {
            let (key_marker, version_id_marker) = match &cursor {
                Some(c) => (Some(c.key_marker.as_str()), c.version_id_marker.as_deref()),
                None => (None, None),
            };
            let page = self
                .list_object_versions_page(prefix, key_marker, version_id_marker)
                .await?;
            Ok(Page {
                items: page.versions,
                is_truncated: page.is_truncated,
                next: page.next_key_marker.map(|key_marker| VersionCursor {
                    key_marker,
                    version_id_marker: page.next_version_id_marker,
                }),
            })
        })
        .await
    }

    /// Multipart uploads that were started and neither completed nor aborted
    #[instrument(skip(self, ctx))]
    pub async fn list_multipart_uploads(
        &self,
        prefix: &str,
        ctx: &TaskContext,
    ) -> Result<Listing<MultipartUploadSummary>> {
        paginate(ctx, move |cursor: Option<UploadCursor>| async move {
            let (key_marker, upload_id_marker) = match &cursor {
                Some(c) => (Some(c.key_marker.as_str()), c.upload_id_marker.as_deref()),
                None => (None, None),
            };
            let page = self
                .list_multipart_uploads_page(prefix, key_marker, upload_id_marker)
                .await?;
            Ok(Page {
                items: page.uploads,
                is_truncated: page.is_truncated,
                next: page.next_key_marker.map(|key_marker| UploadCursor {
                    key_marker,
                    upload_id_marker: page.next_upload_id_marker,
                }),
            })
        })
        .await
    }

    /// Parts uploaded so far for one multipart upload
    #[instrument(skip(self, ctx))]
    pub async fn list_parts(
        &self,
        key: &str,
        upload_id: &str,
        ctx: &TaskContext,
    ) -> Result<Listing<UploadPart>> {
        paginate(ctx, move |marker: Option<u32>| async move {
            let page = self.list_parts_page(key, upload_id, marker).await?;
            Ok(Page {
                items: page.parts,
                is_truncated: page.is_truncated,
                next: page.next_part_number_marker,
            })
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ClientError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn page(items: &[u32], next: Option<&str>, truncated: bool) -> Page<u32, String> {
        Page {
            items: items.to_vec(),
            is_truncated: truncated,
            next: next.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn test_pages_accumulate_in_order() {
        let calls = AtomicUsize::new(0);
        let listing = paginate(&TaskContext::new(), |cursor: Option<String>| {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                Ok(match (n, cursor.as_deref()) {
                    (0, None) => page(&[1, 2], Some("t1"), true),
                    (1, Some("t1")) => page(&[3, 4], Some("t2"), true),
                    (2, Some("t2")) => page(&[5, 6], None, false),
                    other => panic!("unexpected request {:?}", other),
                })
            }
        })
        .await
        .unwrap();

        assert_eq!(listing.entries, vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(listing.pages, 3);
        assert!(!listing.inconsistent);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_truncated_without_cursor_stops() {
        let listing = paginate(&TaskContext::new(), |_cursor: Option<String>| async {
            Ok(page(&[1], None, true))
        })
        .await
        .unwrap();

        assert_eq!(listing.entries, vec![1]);
        assert_eq!(listing.pages, 1);
        assert!(listing.inconsistent);
    }

    #[tokio::test]
    async fn test_cancelled_before_first_page() {
        let ctx = TaskContext::new();
        ctx.cancel.cancel();
        let calls = AtomicUsize::new(0);
        let result = paginate(&ctx, |_cursor: Option<String>| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(page(&[1], None, false)) }
        })
        .await;

        assert!(matches!(result, Err(ClientError::Cancelled)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cancelled_between_pages() {
        let ctx = TaskContext::new();
        let token = ctx.cancel.clone();
        let result = paginate(&ctx, |_cursor: Option<String>| {
            token.cancel();
            async { Ok(page(&[1], Some("next"), true)) }
        })
        .await;

        assert!(matches!(result, Err(ClientError::Cancelled)));
    }

    #[tokio::test]
    async fn test_progress_counts_pages() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let ctx = TaskContext::new().with_progress(tx);
        let calls = AtomicUsize::new(0);
        paginate(&ctx, |_cursor: Option<String>| {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move { Ok(page(&[1], Some("t"), n == 0)) }
        })
        .await
        .unwrap();
        drop(ctx);

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].completed, 2);
        assert_eq!(events[1].stage, Stage::Listing);
        assert_eq!(events[1].total, None);
    }

    #[test]
    fn test_directory_prefix() {
        assert_eq!(directory_prefix(""), "");
        assert_eq!(directory_prefix("a"), "a/");
        assert_eq!(directory_prefix("a/"), "a/");
    }
}
