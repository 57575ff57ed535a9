//! XML response decoders and request body encoders
//!
//! Every decoder drives the same pull loop over `quick-xml` events. The loop
//! tracks the current element path and hands each closed element to a
//! shape-specific accumulator together with all of its text. Text and CDATA
//! events for one element are concatenated, never overwritten.

use crate::types::*;
use crate::{ClientError, Result};
use chrono::{DateTime, Utc};
use quick_xml::escape::escape;
use quick_xml::events::Event;
use quick_xml::Reader;

/// Namespace of S3 request documents
pub const S3_XMLNS: &str = "http://s3.amazonaws.com/doc/2006-03-01/";

/// Walk a document whose root must be `root`, calling `on_close` for every
/// element with its path (root first) and accumulated text.
///
/// An `<Error>` root is turned into a service error, since some calls report
/// failures inside a 200 response.
fn walk<F>(xml: &[u8], root: &str, mut on_close: F) -> Result<()>
where
    F: FnMut(&[String], String) -> Result<()>,
{
    let mut reader = Reader::from_reader(xml);
    let mut path: Vec<String> = Vec::with_capacity(8);
    let mut text = String::with_capacity(256);
    let mut seen_root = false;

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                if path.is_empty() {
                    enter_root(xml, &name, root, &mut seen_root)?;
                }
                path.push(name);
                text.clear();
            }
            Event::Empty(e) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                if path.is_empty() {
                    enter_root(xml, &name, root, &mut seen_root)?;
                }
                path.push(name);
                on_close(&path, String::new())?;
                path.pop();
                text.clear();
            }
            Event::Text(e) => {
                if !path.is_empty() {
                    text.push_str(&e.unescape()?);
                }
            }
            Event::CData(e) => {
                let chunk = std::str::from_utf8(&e).map_err(|err| {
                    ClientError::Decode(format!("invalid UTF-8 in CDATA: {}", err))
                })?;
                text.push_str(chunk);
            }
            Event::End(_) => {
                on_close(&path, std::mem::take(&mut text))?;
                path.pop();
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !path.is_empty() {
        return Err(ClientError::Decode(format!(
            "document ended inside <{}>",
            path.join("/")
        )));
    }
    if !seen_root {
        return Err(ClientError::Decode(format!("expected a <{}> document", root)));
    }
    Ok(())
}

fn enter_root(xml: &[u8], name: &str, root: &str, seen_root: &mut bool) -> Result<()> {
    if *seen_root {
        return Err(ClientError::Decode("more than one root element".to_string()));
    }
    if name == root {
        *seen_root = true;
        return Ok(());
    }
    if name == "Error" {
        return Err(ClientError::from_response(
            200,
            String::from_utf8_lossy(xml).into_owned(),
        ));
    }
    Err(ClientError::Decode(format!(
        "expected a <{}> document, found <{}>",
        root, name
    )))
}

/// Whether the element path ends with `suffix`
fn at(path: &[String], suffix: &[&str]) -> bool {
    path.len() >= suffix.len()
        && path[path.len() - suffix.len()..]
            .iter()
            .zip(suffix)
            .all(|(a, b)| a == b)
}

fn required<T>(value: Option<T>, element: &str, parent: &str) -> Result<T> {
    value.ok_or_else(|| ClientError::Decode(format!("<{}> without <{}>", parent, element)))
}

fn parse_bool(text: &str) -> bool {
    text.trim().eq_ignore_ascii_case("true")
}

fn parse_num<T: std::str::FromStr>(text: &str, element: &str) -> Result<T> {
    text.trim()
        .parse()
        .map_err(|_| ClientError::Decode(format!("invalid <{}> value '{}'", element, text)))
}

/// Parse an ISO 8601 timestamp as used in XML bodies
pub fn parse_timestamp(text: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text.trim())
        .map(|d| d.with_timezone(&Utc))
        .map_err(|_| ClientError::Decode(format!("invalid timestamp '{}'", text)))
}

/// Strip the quotes S3 puts around entity tags
pub fn strip_etag(etag: &str) -> String {
    etag.trim().trim_matches('"').to_string()
}

/// Some providers return keys relative to the requested prefix
fn reprefix(key: String, prefix: &str) -> String {
    if prefix.is_empty() || key.starts_with(prefix) {
        key
    } else {
        format!("{}{}", prefix, key)
    }
}

/// Fields of the standard S3 `<Error>` document
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ErrorDocument {
    pub code: Option<String>,
    pub message: Option<String>,
    pub request_id: Option<String>,
}

/// Parse an error body; anything that is not an `<Error>` document yields empty fields
pub fn parse_error_document(body: &str) -> ErrorDocument {
    let mut doc = ErrorDocument::default();
    let parsed = walk(body.as_bytes(), "Error", |path, text| {
        match path {
            [_, name] if name == "Code" => doc.code = Some(text),
            [_, name] if name == "Message" => doc.message = Some(text),
            [_, name] if name == "RequestId" => doc.request_id = Some(text),
            _ => {}
        }
        Ok(())
    });
    match parsed {
        Ok(()) => doc,
        Err(_) => ErrorDocument::default(),
    }
}

// ==================== Decoders ====================

/// ListAllMyBucketsResult
pub fn parse_list_buckets(xml: &[u8]) -> Result<ListBucketsResult> {
    let mut result = ListBucketsResult::default();
    let mut name: Option<String> = None;
    let mut created: Option<DateTime<Utc>> = None;

    walk(xml, "ListAllMyBucketsResult", |path, text| {
        if at(path, &["Owner", "ID"]) {
            result.owner_id = Some(text);
        } else if at(path, &["Owner", "DisplayName"]) {
            result.owner_display_name = Some(text);
        } else if at(path, &["Bucket", "Name"]) {
            name = Some(text);
        } else if at(path, &["Bucket", "CreationDate"]) {
            created = Some(parse_timestamp(&text)?);
        } else if at(path, &["Buckets", "Bucket"]) {
            result.buckets.push(Bucket {
                name: required(name.take(), "Name", "Bucket")?,
                creation_date: created.take(),
            });
        }
        Ok(())
    })?;

    Ok(result)
}

#[derive(Default)]
struct ObjectFields {
    key: Option<String>,
    size: i64,
    last_modified: Option<DateTime<Utc>>,
    etag: Option<String>,
}

/// ListBucketResult (ListObjectsV2). `requested_prefix` re-prefixes relative keys.
pub fn parse_list_objects(xml: &[u8], requested_prefix: &str) -> Result<ListObjectsPage> {
    let mut page = ListObjectsPage::default();
    let mut current = ObjectFields::default();

    walk(xml, "ListBucketResult", |path, text| {
        match path {
            [_, name] if name == "Prefix" => page.prefix = text,
            [_, name] if name == "IsTruncated" => page.is_truncated = parse_bool(&text),
            [_, name] if name == "NextContinuationToken" => {
                if !text.is_empty() {
                    page.next_continuation_token = Some(text);
                }
            }
            [_, parent, name] if parent == "Contents" => match name.as_str() {
                "Key" => current.key = Some(text),
                "Size" => current.size = parse_num(&text, "Size")?,
                "LastModified" => current.last_modified = Some(parse_timestamp(&text)?),
                "ETag" => current.etag = Some(strip_etag(&text)),
                _ => {}
            },
            [_, name] if name == "Contents" => {
                let fields = std::mem::take(&mut current);
                let key = reprefix(required(fields.key, "Key", "Contents")?, requested_prefix);
                page.entries.push(ObjectSummary {
                    is_folder: key.ends_with('/'),
                    key,
                    size: fields.size,
                    last_modified: fields.last_modified.unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
                    etag: fields.etag,
                });
            }
            [_, parent, name] if parent == "CommonPrefixes" && name == "Prefix" => {
                page.entries.push(ObjectSummary::folder(reprefix(text, requested_prefix)));
            }
            _ => {}
        }
        Ok(())
    })?;

    Ok(page)
}

#[derive(Default)]
struct VersionFields {
    key: Option<String>,
    version_id: Option<String>,
    is_latest: bool,
    last_modified: Option<DateTime<Utc>>,
    size: i64,
    etag: Option<String>,
}

/// ListVersionsResult
pub fn parse_list_versions(xml: &[u8], requested_prefix: &str) -> Result<ListVersionsPage> {
    let mut page = ListVersionsPage::default();
    let mut current = VersionFields::default();

    walk(xml, "ListVersionsResult", |path, text| {
        match path {
            [_, name] if name == "IsTruncated" => page.is_truncated = parse_bool(&text),
            [_, name] if name == "NextKeyMarker" => {
                if !text.is_empty() {
                    page.next_key_marker = Some(text);
                }
            }
            [_, name] if name == "NextVersionIdMarker" => {
                if !text.is_empty() {
                    page.next_version_id_marker = Some(text);
                }
            }
            [_, parent, name] if parent == "Version" || parent == "DeleteMarker" => {
                match name.as_str() {
                    "Key" => current.key = Some(text),
                    "VersionId" => current.version_id = Some(text),
                    "IsLatest" => current.is_latest = parse_bool(&text),
                    "LastModified" => current.last_modified = Some(parse_timestamp(&text)?),
                    "Size" => current.size = parse_num(&text, "Size")?,
                    "ETag" => current.etag = Some(strip_etag(&text)),
                    _ => {}
                }
            }
            [_, name] if name == "Version" || name == "DeleteMarker" => {
                let fields = std::mem::take(&mut current);
                page.versions.push(ObjectVersion {
                    key: reprefix(required(fields.key, "Key", name)?, requested_prefix),
                    version_id: required(fields.version_id, "VersionId", name)?,
                    is_latest: fields.is_latest,
                    last_modified: fields.last_modified.unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
                    size: fields.size,
                    etag: fields.etag,
                    is_delete_marker: name == "DeleteMarker",
                });
            }
            _ => {}
        }
        Ok(())
    })?;

    Ok(page)
}

/// ListMultipartUploadsResult; keys missing `requested_prefix` get it prepended
pub fn parse_list_uploads(xml: &[u8], requested_prefix: &str) -> Result<ListUploadsPage> {
    let mut page = ListUploadsPage::default();
    let mut key: Option<String> = None;
    let mut upload_id: Option<String> = None;
    let mut initiated: Option<DateTime<Utc>> = None;

    walk(xml, "ListMultipartUploadsResult", |path, text| {
        match path {
            [_, name] if name == "IsTruncated" => page.is_truncated = parse_bool(&text),
            [_, name] if name == "NextKeyMarker" => {
                if !text.is_empty() {
                    page.next_key_marker = Some(text);
                }
            }
            [_, name] if name == "NextUploadIdMarker" => {
                if !text.is_empty() {
                    page.next_upload_id_marker = Some(text);
                }
            }
            [_, parent, name] if parent == "Upload" => match name.as_str() {
                "Key" => key = Some(text),
                "UploadId" => upload_id = Some(text),
                "Initiated" => initiated = Some(parse_timestamp(&text)?),
                _ => {}
            },
            [_, name] if name == "Upload" => {
                page.uploads.push(MultipartUploadSummary {
                    key: reprefix(required(key.take(), "Key", "Upload")?, requested_prefix),
                    upload_id: required(upload_id.take(), "UploadId", "Upload")?,
                    initiated: initiated.take(),
                });
            }
            _ => {}
        }
        Ok(())
    })?;

    Ok(page)
}

/// ListPartsResult
pub fn parse_list_parts(xml: &[u8]) -> Result<ListPartsPage> {
    let mut page = ListPartsPage::default();
    let mut number: Option<u32> = None;
    let mut etag: Option<String> = None;
    let mut size: i64 = 0;
    let mut last_modified: Option<DateTime<Utc>> = None;

    walk(xml, "ListPartsResult", |path, text| {
        match path {
            [_, name] if name == "IsTruncated" => page.is_truncated = parse_bool(&text),
            [_, name] if name == "NextPartNumberMarker" => {
                if !text.trim().is_empty() {
                    page.next_part_number_marker = Some(parse_num(&text, "NextPartNumberMarker")?);
                }
            }
            [_, parent, name] if parent == "Part" => match name.as_str() {
                "PartNumber" => number = Some(parse_num(&text, "PartNumber")?),
                "ETag" => etag = Some(strip_etag(&text)),
                "Size" => size = parse_num(&text, "Size")?,
                "LastModified" => last_modified = Some(parse_timestamp(&text)?),
                _ => {}
            },
            [_, name] if name == "Part" => {
                page.parts.push(UploadPart {
                    part_number: required(number.take(), "PartNumber", "Part")?,
                    etag: required(etag.take(), "ETag", "Part")?,
                    size: std::mem::take(&mut size),
                    last_modified: last_modified.take(),
                });
            }
            _ => {}
        }
        Ok(())
    })?;

    Ok(page)
}

/// InitiateMultipartUploadResult, returning the upload ID
pub fn parse_initiate_upload(xml: &[u8]) -> Result<String> {
    let mut upload_id = None;
    walk(xml, "InitiateMultipartUploadResult", |path, text| {
        if path.len() == 2 && path[1] == "UploadId" {
            upload_id = Some(text);
        }
        Ok(())
    })?;
    required(upload_id.filter(|id| !id.is_empty()), "UploadId", "InitiateMultipartUploadResult")
}

/// CompleteMultipartUploadResult
pub fn parse_complete_upload(xml: &[u8]) -> Result<CompleteMultipartUploadResult> {
    let (mut location, mut key, mut etag) = (None, None, None);
    walk(xml, "CompleteMultipartUploadResult", |path, text| {
        match path {
            [_, name] if name == "Location" => location = Some(text),
            [_, name] if name == "Key" => key = Some(text),
            [_, name] if name == "ETag" => etag = Some(strip_etag(&text)),
            _ => {}
        }
        Ok(())
    })?;
    Ok(CompleteMultipartUploadResult {
        location,
        key: key.unwrap_or_default(),
        etag: required(etag, "ETag", "CompleteMultipartUploadResult")?,
    })
}

/// CopyObjectResult
pub fn parse_copy_result(xml: &[u8]) -> Result<CopyObjectResult> {
    let mut result = CopyObjectResult {
        etag: None,
        last_modified: None,
    };
    walk(xml, "CopyObjectResult", |path, text| {
        match path {
            [_, name] if name == "ETag" => result.etag = Some(strip_etag(&text)),
            [_, name] if name == "LastModified" => {
                result.last_modified = Some(parse_timestamp(&text)?)
            }
            _ => {}
        }
        Ok(())
    })?;
    Ok(result)
}

/// LifecycleConfiguration
pub fn parse_lifecycle(xml: &[u8]) -> Result<Vec<LifecycleRule>> {
    let mut rules = Vec::new();
    let mut rule = LifecycleRule::default();
    let mut transition_days: Option<u32> = None;
    let mut transition_class: Option<String> = None;

    walk(xml, "LifecycleConfiguration", |path, text| {
        if path.len() < 2 || path[1] != "Rule" {
            return Ok(());
        }
        let inner: Vec<&str> = path[2..].iter().map(String::as_str).collect();
        match inner.as_slice() {
            ["ID"] => rule.id = text,
            ["Status"] => rule.enabled = text.trim() == "Enabled",
            ["Prefix"] | ["Filter", "Prefix"] | ["Filter", "And", "Prefix"] => rule.prefix = text,
            ["Transition", "Days"] => transition_days = Some(parse_num(&text, "Days")?),
            ["Transition", "StorageClass"] => transition_class = Some(text),
            ["Transition"] => rule.transitions.push(Transition {
                days: transition_days.take(),
                storage_class: required(transition_class.take(), "StorageClass", "Transition")?,
            }),
            ["Expiration", "Days"] => rule.expiration_days = Some(parse_num(&text, "Days")?),
            ["AbortIncompleteMultipartUpload", "DaysAfterInitiation"] => {
                rule.abort_incomplete_upload_days = Some(parse_num(&text, "DaysAfterInitiation")?)
            }
            [] => rules.push(std::mem::take(&mut rule)),
            _ => {}
        }
        Ok(())
    })?;

    Ok(rules)
}

/// Retention
pub fn parse_retention(xml: &[u8]) -> Result<RetentionPolicy> {
    let (mut mode, mut until) = (None, None);
    walk(xml, "Retention", |path, text| {
        match path {
            [_, name] if name == "Mode" => {
                mode = Some(RetentionMode::parse(text.trim()).ok_or_else(|| {
                    ClientError::Decode(format!("unknown retention mode '{}'", text))
                })?)
            }
            [_, name] if name == "RetainUntilDate" => until = Some(parse_timestamp(&text)?),
            _ => {}
        }
        Ok(())
    })?;
    Ok(RetentionPolicy {
        mode: required(mode, "Mode", "Retention")?,
        retain_until: required(until, "RetainUntilDate", "Retention")?,
    })
}

/// LegalHold
pub fn parse_legal_hold(xml: &[u8]) -> Result<LegalHold> {
    let mut status = None;
    walk(xml, "LegalHold", |path, text| {
        if path.len() == 2 && path[1] == "Status" {
            status = Some(text.trim() == "ON");
        }
        Ok(())
    })?;
    Ok(LegalHold {
        enabled: required(status, "Status", "LegalHold")?,
    })
}

/// VersioningConfiguration
pub fn parse_versioning(xml: &[u8]) -> Result<VersioningStatus> {
    let mut status = VersioningStatus::Unversioned;
    walk(xml, "VersioningConfiguration", |path, text| {
        if path.len() == 2 && path[1] == "Status" {
            status = match text.trim() {
                "Enabled" => VersioningStatus::Enabled,
                "Suspended" => VersioningStatus::Suspended,
                other => {
                    return Err(ClientError::Decode(format!(
                        "unknown versioning status '{}'",
                        other
                    )))
                }
            };
        }
        Ok(())
    })?;
    Ok(status)
}

/// ObjectLockConfiguration
pub fn parse_object_lock(xml: &[u8]) -> Result<ObjectLockConfiguration> {
    let mut config = ObjectLockConfiguration::default();
    walk(xml, "ObjectLockConfiguration", |path, text| {
        if at(path, &["ObjectLockConfiguration", "ObjectLockEnabled"]) {
            config.enabled = text.trim() == "Enabled";
        } else if at(path, &["DefaultRetention", "Mode"]) {
            config.default_mode = RetentionMode::parse(text.trim());
        } else if at(path, &["DefaultRetention", "Days"]) {
            config.default_days = Some(parse_num(&text, "Days")?);
        } else if at(path, &["DefaultRetention", "Years"]) {
            config.default_years = Some(parse_num(&text, "Years")?);
        }
        Ok(())
    })?;
    Ok(config)
}

/// AccessControlPolicy
pub fn parse_acl(xml: &[u8]) -> Result<AccessControlPolicy> {
    let mut policy = AccessControlPolicy::default();
    let (mut id, mut display, mut uri, mut email, mut permission) = (None, None, None, None, None);

    walk(xml, "AccessControlPolicy", |path, text| {
        if at(path, &["AccessControlPolicy", "Owner", "ID"]) {
            policy.owner_id = Some(text);
        } else if at(path, &["AccessControlPolicy", "Owner", "DisplayName"]) {
            policy.owner_display_name = Some(text);
        } else if at(path, &["Grantee", "ID"]) {
            id = Some(text);
        } else if at(path, &["Grantee", "DisplayName"]) {
            display = Some(text);
        } else if at(path, &["Grantee", "URI"]) {
            uri = Some(text);
        } else if at(path, &["Grantee", "EmailAddress"]) {
            email = Some(text);
        } else if at(path, &["Grant", "Permission"]) {
            permission = Some(text);
        } else if at(path, &["AccessControlList", "Grant"]) {
            let grantee = match (id.take(), uri.take(), email.take()) {
                (Some(id), _, _) => Grantee::User {
                    id,
                    display_name: display.take(),
                },
                (None, Some(uri), _) => Grantee::Group { uri },
                (None, None, Some(address)) => Grantee::Email { address },
                (None, None, None) => {
                    return Err(ClientError::Decode("<Grant> without a grantee".to_string()))
                }
            };
            display = None;
            policy.grants.push(Grant {
                grantee,
                permission: required(permission.take(), "Permission", "Grant")?,
            });
        }
        Ok(())
    })?;

    Ok(policy)
}

// ==================== Encoders ====================

/// CompleteMultipartUpload body; `parts` must already be sorted by part number
pub fn complete_multipart_body(parts: &[UploadPart]) -> String {
    let mut xml = String::with_capacity(64 + parts.len() * 96);
    xml.push_str("<CompleteMultipartUpload xmlns=\"");
    xml.push_str(S3_XMLNS);
    xml.push_str("\">");
    for part in parts {
        xml.push_str(&format!(
            "<Part><PartNumber>{}</PartNumber><ETag>\"{}\"</ETag></Part>",
            part.part_number,
            escape(part.etag.as_str())
        ));
    }
    xml.push_str("</CompleteMultipartUpload>");
    xml
}

/// CreateBucketConfiguration body; none is needed for us-east-1
pub fn create_bucket_body(region: &str) -> Option<String> {
    if region.is_empty() || region == "us-east-1" {
        return None;
    }
    Some(format!(
        "<CreateBucketConfiguration xmlns=\"{}\"><LocationConstraint>{}</LocationConstraint></CreateBucketConfiguration>",
        S3_XMLNS,
        escape(region)
    ))
}

/// LifecycleConfiguration body
pub fn lifecycle_body(rules: &[LifecycleRule]) -> String {
    let mut xml = format!("<LifecycleConfiguration xmlns=\"{}\">", S3_XMLNS);
    for rule in rules {
        xml.push_str("<Rule>");
        xml.push_str(&format!("<ID>{}</ID>", escape(rule.id.as_str())));
        xml.push_str(&format!(
            "<Filter><Prefix>{}</Prefix></Filter>",
            escape(rule.prefix.as_str())
        ));
        xml.push_str(if rule.enabled {
            "<Status>Enabled</Status>"
        } else {
            "<Status>Disabled</Status>"
        });
        for transition in &rule.transitions {
            xml.push_str("<Transition>");
            if let Some(days) = transition.days {
                xml.push_str(&format!("<Days>{}</Days>", days));
            }
            xml.push_str(&format!(
                "<StorageClass>{}</StorageClass>",
                escape(transition.storage_class.as_str())
            ));
            xml.push_str("</Transition>");
        }
        if let Some(days) = rule.expiration_days {
            xml.push_str(&format!("<Expiration><Days>{}</Days></Expiration>", days));
        }
        if let Some(days) = rule.abort_incomplete_upload_days {
            xml.push_str(&format!(
                "<AbortIncompleteMultipartUpload><DaysAfterInitiation>{}</DaysAfterInitiation></AbortIncompleteMultipartUpload>",
                days
            ));
        }
        xml.push_str("</Rule>");
    }
    xml.push_str("</LifecycleConfiguration>");
    xml
}

/// Retention body
pub fn retention_body(policy: &RetentionPolicy) -> String {
    format!(
        "<Retention xmlns=\"{}\"><Mode>{}</Mode><RetainUntilDate>{}</RetainUntilDate></Retention>",
        S3_XMLNS,
        policy.mode.as_str(),
        policy
            .retain_until
            .to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
    )
}

/// LegalHold body
pub fn legal_hold_body(hold: LegalHold) -> String {
    format!(
        "<LegalHold xmlns=\"{}\"><Status>{}</Status></LegalHold>",
        S3_XMLNS,
        if hold.enabled { "ON" } else { "OFF" }
    )
}

/// VersioningConfiguration body
pub fn versioning_body(status: &str) -> String {
    format!(
        "<VersioningConfiguration xmlns=\"{}\"><Status>{}</Status></VersioningConfiguration>",
        S3_XMLNS, status
    )
}
