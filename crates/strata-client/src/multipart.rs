//! Multipart upload support for large files

use crate::task::{Stage, TaskContext};
use crate::types::*;
use crate::{client::S3Request, config::MIN_PART_SIZE, xml, ClientError, Result, S3Client};
use bytes::Bytes;
use futures::stream::{self, StreamExt};
use reqwest::Method;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, instrument, warn};

/// Highest part number S3 accepts
pub const MAX_PART_NUMBER: u32 = 10_000;

/// Lifecycle of a [`MultipartUpload`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UploadState {
    /// Initiated, no part uploaded yet
    Created,
    /// At least one part uploaded
    PartsUploading,
    /// Completion accepted by the service
    Completed,
    /// Upload aborted; its parts are gone
    Aborted,
}

/// Multipart upload handle.
///
/// A failed part never aborts the upload on its own. Callers either retry the
/// part, abort explicitly, or leave the upload to be found later with
/// [`S3Client::list_multipart_uploads`].
#[derive(Debug)]
pub struct MultipartUpload {
    client: S3Client,
    key: String,
    upload_id: String,
    parts: BTreeMap<u32, UploadPart>,
    state: UploadState,
}

impl MultipartUpload {
    /// Start a new multipart upload
    pub async fn start(client: &S3Client, key: &str, content_type: Option<&str>) -> Result<Self> {
        let upload_id = client.create_multipart_upload(key, content_type).await?;

        Ok(Self {
            client: client.clone(),
            key: key.to_string(),
            upload_id,
            parts: BTreeMap::new(),
            state: UploadState::Created,
        })
    }

    /// Rebuild a handle for an upload started earlier, from the parts the service holds
    pub async fn resume(
        client: &S3Client,
        key: &str,
        upload_id: &str,
        ctx: &TaskContext,
    ) -> Result<Self> {
        let listing = client.list_parts(key, upload_id, ctx).await?;
        let parts: BTreeMap<u32, UploadPart> = listing
            .entries
            .into_iter()
            .map(|part| (part.part_number, part))
            .collect();
        let state = if parts.is_empty() {
            UploadState::Created
        } else {
            UploadState::PartsUploading
        };

        Ok(Self {
            client: client.clone(),
            key: key.to_string(),
            upload_id: upload_id.to_string(),
            parts,
            state,
        })
    }

    /// Upload a part. Uploading the same number again replaces the earlier record.
    pub async fn upload_part(&mut self, part_number: u32, data: Bytes) -> Result<UploadPart> {
        self.ensure_open()?;
        validate_part_number(part_number)?;

        let size = data.len() as i64;
        let etag = self
            .client
            .upload_part(&self.key, &self.upload_id, part_number, data)
            .await?;

        let part = UploadPart {
            part_number,
            etag,
            size,
            last_modified: None,
        };
        self.record(part.clone());
        Ok(part)
    }

    /// Upload several parts, at most `part_concurrency` at a time.
    ///
    /// Part numbers must be distinct within one batch. Parts that finished
    /// before a failure or cancellation stay recorded.
    pub async fn upload_parts(
        &mut self,
        parts: Vec<(u32, Bytes)>,
        ctx: &TaskContext,
    ) -> Result<()> {
        self.ensure_open()?;
        let mut seen = BTreeSet::new();
        for (part_number, _) in &parts {
            validate_part_number(*part_number)?;
            if !seen.insert(*part_number) {
                return Err(ClientError::InvalidArgument(format!(
                    "part {} appears more than once in one batch",
                    part_number
                )));
            }
        }

        let total = parts.len() as u64;
        let concurrency = self.client.config().part_concurrency.max(1);
        let client = self.client.clone();
        let key = self.key.clone();
        let upload_id = self.upload_id.clone();

        let mut uploads = stream::iter(parts)
            .map(|(part_number, data)| {
                let (client, key, upload_id) = (&client, &key, &upload_id);
                async move {
                    ctx.checkpoint()?;
                    let size = data.len() as i64;
                    let etag = client.upload_part(key, upload_id, part_number, data).await?;
                    Ok::<_, ClientError>(UploadPart {
                        part_number,
                        etag,
                        size,
                        last_modified: None,
                    })
                }
            })
            .buffer_unordered(concurrency);

        let mut completed = 0u64;
        while let Some(result) = uploads.next().await {
            let part = result?;
            self.record(part);
            completed += 1;
            ctx.report(Stage::Uploading, completed, Some(total));
        }

        Ok(())
    }

    /// Complete the upload with every recorded part, in ascending part order
    pub async fn complete(&mut self) -> Result<CompleteMultipartUploadResult> {
        self.ensure_open()?;
        if self.parts.is_empty() {
            return Err(ClientError::InvalidArgument(
                "cannot complete a multipart upload without parts".to_string(),
            ));
        }

        let parts: Vec<UploadPart> = self.parts.values().cloned().collect();
        let result = self
            .client
            .complete_multipart_upload(&self.key, &self.upload_id, &parts)
            .await?;
        self.state = UploadState::Completed;
        Ok(result)
    }

    /// Abort the upload
    pub async fn abort(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.client
            .abort_multipart_upload(&self.key, &self.upload_id)
            .await?;
        self.state = UploadState::Aborted;
        Ok(())
    }

    /// Get the upload ID
    pub fn upload_id(&self) -> &str {
        &self.upload_id
    }

    /// Object key
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Current state
    pub fn state(&self) -> UploadState {
        self.state
    }

    /// Recorded parts in ascending part order
    pub fn parts(&self) -> impl Iterator<Item = &UploadPart> {
        self.parts.values()
    }

    /// Get the number of completed parts
    pub fn completed_parts(&self) -> usize {
        self.parts.len()
    }

    fn record(&mut self, part: UploadPart) {
        self.parts.insert(part.part_number, part);
        self.state = UploadState::PartsUploading;
    }

    fn ensure_open(&self) -> Result<()> {
        match self.state {
            UploadState::Created | UploadState::PartsUploading => Ok(()),
            state => Err(ClientError::InvalidArgument(format!(
                "multipart upload {} is already {:?}",
                self.upload_id, state
            ))),
        }
    }
}

fn validate_part_number(part_number: u32) -> Result<()> {
    if (1..=MAX_PART_NUMBER).contains(&part_number) {
        Ok(())
    } else {
        Err(ClientError::InvalidArgument(format!(
            "part number {} outside 1..={}",
            part_number, MAX_PART_NUMBER
        )))
    }
}

/// CompleteMultipartUpload body listing `parts` in ascending part order
pub fn completion_body(parts: &[UploadPart]) -> String {
    let mut sorted = parts.to_vec();
    sorted.sort_by_key(|part| part.part_number);
    xml::complete_multipart_body(&sorted)
}

impl S3Client {
    /// Initiate a multipart upload and return its upload ID
    #[instrument(skip(self))]
    pub async fn create_multipart_upload(
        &self,
        key: &str,
        content_type: Option<&str>,
    ) -> Result<String> {
        let mut request = S3Request::new(Method::POST, self.bucket(), key).flag("uploads");
        if let Some(ct) = content_type {
            request = request.header("content-type", ct);
        }
        let body = self.send_bytes(request).await?;
        let upload_id = xml::parse_initiate_upload(&body)?;
        debug!(upload_id = %upload_id, "Initiated multipart upload");
        Ok(upload_id)
    }

    /// Upload one part and return its ETag
    #[instrument(skip(self, data), fields(size = data.len()))]
    pub async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: u32,
        data: Bytes,
    ) -> Result<String> {
        validate_part_number(part_number)?;
        let response = self
            .send(
                S3Request::new(Method::PUT, self.bucket(), key)
                    .query("partNumber", part_number.to_string())
                    .query("uploadId", upload_id)
                    .body(data),
            )
            .await?;

        response
            .headers()
            .get(reqwest::header::ETAG)
            .and_then(|v| v.to_str().ok())
            .map(xml::strip_etag)
            .ok_or_else(|| {
                ClientError::Decode(format!("part {} response without ETag", part_number))
            })
    }

    /// Complete a multipart upload; `parts` are sorted before sending
    #[instrument(skip(self, parts), fields(parts = parts.len()))]
    pub async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[UploadPart],
    ) -> Result<CompleteMultipartUploadResult> {
        if parts.is_empty() {
            return Err(ClientError::InvalidArgument(
                "cannot complete a multipart upload without parts".to_string(),
            ));
        }
        let body = self
            .send_bytes(
                S3Request::new(Method::POST, self.bucket(), key)
                    .query("uploadId", upload_id)
                    .header("content-type", "application/xml")
                    .body(completion_body(parts)),
            )
            .await?;
        let result = xml::parse_complete_upload(&body)?;
        info!(key = %key, parts = parts.len(), etag = %result.etag, "Completed multipart upload");
        Ok(result)
    }

    /// Abort a multipart upload, e.g. an orphan found by
    /// [`list_multipart_uploads`](Self::list_multipart_uploads)
    #[instrument(skip(self))]
    pub async fn abort_multipart_upload(&self, key: &str, upload_id: &str) -> Result<()> {
        self.send(S3Request::new(Method::DELETE, self.bucket(), key).query("uploadId", upload_id))
            .await?;
        Ok(())
    }

    /// Upload `data`, split into `multipart_chunk_size` parts when it is larger than one chunk.
    ///
    /// The payload transform runs once over the whole payload before splitting.
    /// On failure the multipart upload is left in place for resumption or abort.
    #[instrument(skip(self, data, ctx), fields(size = data.len()))]
    pub async fn upload_large(
        &self,
        key: &str,
        data: Bytes,
        content_type: Option<&str>,
        ctx: &TaskContext,
    ) -> Result<PutObjectResult> {
        ctx.checkpoint()?;
        let stored = self.transform().encode(key, data)?;
        let chunk_size = self.config().multipart_chunk_size.max(1);

        if stored.len() <= chunk_size {
            let result = self.put_stored(key, stored, content_type).await?;
            ctx.report(Stage::Uploading, 1, Some(1));
            return Ok(result);
        }
        if chunk_size < MIN_PART_SIZE {
            warn!(chunk_size, "Multipart chunk size is below the 5 MiB minimum of S3");
        }

        let parts: Vec<(u32, Bytes)> = (0..stored.len())
            .step_by(chunk_size)
            .enumerate()
            .map(|(i, start)| {
                let end = (start + chunk_size).min(stored.len());
                ((i + 1) as u32, stored.slice(start..end))
            })
            .collect();
        if parts.len() > MAX_PART_NUMBER as usize {
            return Err(ClientError::InvalidArgument(format!(
                "{} bytes need {} parts of {} bytes, more than {}",
                stored.len(),
                parts.len(),
                chunk_size,
                MAX_PART_NUMBER
            )));
        }

        let mut upload = MultipartUpload::start(self, key, content_type).await?;
        upload.upload_parts(parts, ctx).await?;
        let result = upload.complete().await?;

        Ok(PutObjectResult {
            etag: Some(result.etag),
            version_id: None,
        })
    }
}
