//! Common types for the client engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A bucket
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bucket {
    /// Bucket name
    pub name: String,
    /// Creation date
    pub creation_date: Option<DateTime<Utc>>,
}

/// Result of listing buckets
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ListBucketsResult {
    /// Owner ID
    pub owner_id: Option<String>,
    /// Owner display name
    pub owner_display_name: Option<String>,
    /// List of buckets
    pub buckets: Vec<Bucket>,
}

/// One entry of an object listing.
///
/// `is_folder` is synthetic: it is set for common-prefix groupings and for
/// real zero-byte objects whose key ends in `/`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectSummary {
    /// Object key
    pub key: String,
    /// Size in bytes
    pub size: i64,
    /// Last modified time
    pub last_modified: DateTime<Utc>,
    /// ETag with quotes stripped
    pub etag: Option<String>,
    /// Folder flag
    pub is_folder: bool,
}

impl ObjectSummary {
    /// Build a folder entry for a common prefix
    pub fn folder(prefix: impl Into<String>) -> Self {
        Self {
            key: prefix.into(),
            size: 0,
            last_modified: DateTime::<Utc>::UNIX_EPOCH,
            etag: None,
            is_folder: true,
        }
    }

    /// Last path segment, without the trailing slash of a folder
    pub fn name(&self) -> &str {
        let trimmed = self.key.trim_end_matches('/');
        trimmed.rsplit('/').next().unwrap_or(trimmed)
    }
}

/// One version of an object, or a delete marker
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectVersion {
    /// Object key
    pub key: String,
    /// Version ID (`null` for objects written before versioning was enabled)
    pub version_id: String,
    /// Whether this is the current version
    pub is_latest: bool,
    /// Last modified time
    pub last_modified: DateTime<Utc>,
    /// Size in bytes (0 for delete markers)
    pub size: i64,
    /// ETag with quotes stripped
    pub etag: Option<String>,
    /// Whether this entry is a delete marker
    pub is_delete_marker: bool,
}

/// A multipart upload that was initiated but not yet completed or aborted
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultipartUploadSummary {
    /// Object key
    pub key: String,
    /// Upload ID
    pub upload_id: String,
    /// Initiation time
    pub initiated: Option<DateTime<Utc>>,
}

/// An uploaded part
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadPart {
    /// Part number (1-10000)
    pub part_number: u32,
    /// ETag with quotes stripped
    pub etag: String,
    /// Part size in bytes
    pub size: i64,
    /// Upload timestamp, when reported by the service
    pub last_modified: Option<DateTime<Utc>>,
}

/// Object metadata returned by HEAD
#[derive(Clone, Debug, Default)]
pub struct HeadObjectResult {
    /// ETag
    pub etag: Option<String>,
    /// Content type
    pub content_type: Option<String>,
    /// Content length
    pub content_length: u64,
    /// Last modified
    pub last_modified: Option<DateTime<Utc>>,
    /// Version ID
    pub version_id: Option<String>,
    /// User metadata (`x-amz-meta-*` without the prefix)
    pub metadata: HashMap<String, String>,
}

/// Get object result
#[derive(Clone, Debug)]
pub struct GetObjectResult {
    /// Object data, after the payload transform
    pub data: bytes::Bytes,
    /// ETag
    pub etag: Option<String>,
    /// Content type
    pub content_type: Option<String>,
    /// Content-Range header of a partial response
    pub content_range: Option<String>,
    /// Last modified
    pub last_modified: Option<DateTime<Utc>>,
    /// User metadata
    pub metadata: HashMap<String, String>,
}

/// Put object result
#[derive(Clone, Debug)]
pub struct PutObjectResult {
    /// ETag of the uploaded object
    pub etag: Option<String>,
    /// Version ID (if versioning enabled)
    pub version_id: Option<String>,
}

/// Copy object result
#[derive(Clone, Debug)]
pub struct CopyObjectResult {
    /// ETag of the copied object
    pub etag: Option<String>,
    /// Last modified
    pub last_modified: Option<DateTime<Utc>>,
}

/// Result of completing a multipart upload
#[derive(Clone, Debug)]
pub struct CompleteMultipartUploadResult {
    /// Final object location, when reported
    pub location: Option<String>,
    /// Object key
    pub key: String,
    /// ETag of the assembled object
    pub etag: String,
}

/// Canned ACLs accepted by `x-amz-acl`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CannedAcl {
    Private,
    PublicRead,
    PublicReadWrite,
    AuthenticatedRead,
    BucketOwnerRead,
    BucketOwnerFullControl,
}

impl CannedAcl {
    /// Header value
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Private => "private",
            Self::PublicRead => "public-read",
            Self::PublicReadWrite => "public-read-write",
            Self::AuthenticatedRead => "authenticated-read",
            Self::BucketOwnerRead => "bucket-owner-read",
            Self::BucketOwnerFullControl => "bucket-owner-full-control",
        }
    }
}

/// Grantee of an ACL grant
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Grantee {
    /// Canonical user
    User { id: String, display_name: Option<String> },
    /// Predefined group, e.g. AllUsers
    Group { uri: String },
    /// Grantee identified by e-mail
    Email { address: String },
}

/// One ACL grant
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grant {
    /// Who receives the permission
    pub grantee: Grantee,
    /// READ, WRITE, READ_ACP, WRITE_ACP or FULL_CONTROL
    pub permission: String,
}

/// Access control policy of an object
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessControlPolicy {
    /// Owner ID
    pub owner_id: Option<String>,
    /// Owner display name
    pub owner_display_name: Option<String>,
    /// Grants
    pub grants: Vec<Grant>,
}

impl AccessControlPolicy {
    /// Whether anonymous users may read the object
    pub fn is_public_read(&self) -> bool {
        self.grants.iter().any(|g| {
            matches!(&g.grantee, Grantee::Group { uri } if uri.ends_with("/global/AllUsers"))
                && (g.permission == "READ" || g.permission == "FULL_CONTROL")
        })
    }
}

/// Object lock retention mode
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RetentionMode {
    Governance,
    Compliance,
}

impl RetentionMode {
    /// Wire value
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Governance => "GOVERNANCE",
            Self::Compliance => "COMPLIANCE",
        }
    }

    /// Parse the wire value
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "GOVERNANCE" => Some(Self::Governance),
            "COMPLIANCE" => Some(Self::Compliance),
            _ => None,
        }
    }
}

/// Retention settings of an object version
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionPolicy {
    /// Mode
    pub mode: RetentionMode,
    /// Date until which the object is protected
    pub retain_until: DateTime<Utc>,
}

/// Legal hold status of an object version
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegalHold {
    /// ON when true
    pub enabled: bool,
}

/// Bucket-level object lock configuration
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectLockConfiguration {
    /// Whether object lock is enabled on the bucket
    pub enabled: bool,
    /// Default retention mode for new objects
    pub default_mode: Option<RetentionMode>,
    /// Default retention in days
    pub default_days: Option<u32>,
    /// Default retention in years
    pub default_years: Option<u32>,
}

/// Bucket versioning state
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum VersioningStatus {
    /// Versioning was never configured on the bucket
    Unversioned,
    Enabled,
    Suspended,
}

impl VersioningStatus {
    /// Wire value; `Unversioned` has none
    pub fn as_str(&self) -> Option<&'static str> {
        match self {
            Self::Unversioned => None,
            Self::Enabled => Some("Enabled"),
            Self::Suspended => Some("Suspended"),
        }
    }
}

/// A storage class transition of a lifecycle rule
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    /// Days after creation
    pub days: Option<u32>,
    /// Target storage class
    pub storage_class: String,
}

/// A bucket lifecycle rule
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleRule {
    /// Rule ID
    pub id: String,
    /// Enabled or Disabled status
    pub enabled: bool,
    /// Key prefix the rule applies to
    pub prefix: String,
    /// Transitions in document order
    pub transitions: Vec<Transition>,
    /// Expiration in days
    pub expiration_days: Option<u32>,
    /// Abort incomplete multipart uploads after this many days
    pub abort_incomplete_upload_days: Option<u32>,
}

/// Options for a single page of ListObjectsV2
#[derive(Clone, Debug, Default)]
pub struct ListObjectsOptions {
    /// Filter by prefix
    pub prefix: Option<String>,
    /// Delimiter for grouping
    pub delimiter: Option<String>,
    /// Maximum keys to return
    pub max_keys: Option<usize>,
    /// Continuation token from previous request
    pub continuation_token: Option<String>,
    /// Start listing after this key
    pub start_after: Option<String>,
}

/// One decoded page of ListObjectsV2
#[derive(Clone, Debug, Default)]
pub struct ListObjectsPage {
    /// Prefix echoed by the service
    pub prefix: String,
    /// Objects and, when a delimiter was used, folder entries for common prefixes
    pub entries: Vec<ObjectSummary>,
    /// Whether there are more results
    pub is_truncated: bool,
    /// Token for fetching next page
    pub next_continuation_token: Option<String>,
}

/// One decoded page of ListObjectVersions
#[derive(Clone, Debug, Default)]
pub struct ListVersionsPage {
    /// Versions and delete markers, in document order
    pub versions: Vec<ObjectVersion>,
    /// Whether there are more results
    pub is_truncated: bool,
    /// Key marker for the next page
    pub next_key_marker: Option<String>,
    /// Version ID marker for the next page
    pub next_version_id_marker: Option<String>,
}

/// One decoded page of ListMultipartUploads
#[derive(Clone, Debug, Default)]
pub struct ListUploadsPage {
    /// In-progress uploads
    pub uploads: Vec<MultipartUploadSummary>,
    /// Whether there are more results
    pub is_truncated: bool,
    /// Key marker for the next page
    pub next_key_marker: Option<String>,
    /// Upload ID marker for the next page
    pub next_upload_id_marker: Option<String>,
}

/// One decoded page of ListParts
#[derive(Clone, Debug, Default)]
pub struct ListPartsPage {
    /// Parts uploaded so far
    pub parts: Vec<UploadPart>,
    /// Whether there are more results
    pub is_truncated: bool,
    /// Part number marker for the next page
    pub next_part_number_marker: Option<u32>,
}
