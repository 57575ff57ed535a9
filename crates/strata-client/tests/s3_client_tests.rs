//! Integration tests for the client engine against a fake S3 service.
//!
//! The mock server listens on 127.0.0.1, which the default provider quirks
//! map to path-style addressing, so every object lives under `/test-bucket/`.

use bytes::Bytes;
use std::time::Duration;
use strata_client::{
    ClientConfig, ClientError, Credentials, LegalHold, ListOptions, MultipartUpload,
    PayloadTransform, S3Client, Stage, TaskContext, UploadState,
};
use wiremock::matchers::{header, method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

const BUCKET_PATH: &str = "/test-bucket";
const COPY_RESULT: &str = "<CopyObjectResult><ETag>\"c\"</ETag>\
<LastModified>2024-06-01T00:00:00Z</LastModified></CopyObjectResult>";

fn client_with(server: &MockServer, config: ClientConfig) -> S3Client {
    let creds = Credentials::new("AKIDEXAMPLE", "SECRETEXAMPLE", "us-east-1", "test-bucket")
        .with_endpoint(server.uri());
    S3Client::new(creds, config).unwrap()
}

fn client_for(server: &MockServer) -> S3Client {
    client_with(server, ClientConfig::default())
}

/// A ListObjectsV2 page with one `<Contents>` per key
fn list_page(keys: &[&str], next_token: Option<&str>, truncated: bool) -> String {
    let mut xml = String::from(
        r#"<?xml version="1.0" encoding="UTF-8"?><ListBucketResult xmlns="http://s3.amazonaws.com/doc/2006-03-01/"><Name>test-bucket</Name>"#,
    );
    xml.push_str(&format!("<IsTruncated>{}</IsTruncated>", truncated));
    if let Some(token) = next_token {
        xml.push_str(&format!("<NextContinuationToken>{}</NextContinuationToken>", token));
    }
    for key in keys {
        xml.push_str(&format!(
            "<Contents><Key>{}</Key><LastModified>2024-06-01T12:00:00.000Z</LastModified><ETag>&quot;{}&quot;</ETag><Size>{}</Size></Contents>",
            key,
            key.len(),
            key.len()
        ));
    }
    xml.push_str("</ListBucketResult>");
    xml
}

fn error_body(code: &str, message: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?><Error><Code>{}</Code><Message>{}</Message><RequestId>REQ1</RequestId></Error>",
        code, message
    )
}

async fn requests_with_method(server: &MockServer, verb: &str) -> Vec<Request> {
    server
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .filter(|r| r.method.as_str() == verb)
        .collect()
}

async fn mount_single_listing(server: &MockServer, keys: &[&str]) {
    Mock::given(method("GET"))
        .and(path(BUCKET_PATH))
        .and(query_param("list-type", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_string(list_page(keys, None, false)))
        .mount(server)
        .await;
}

// ═══════════════════════════════════════════════════════════════════════════════
// Pagination
// ═══════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_three_pages_in_order_with_three_requests() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(BUCKET_PATH))
        .and(query_param("list-type", "2"))
        .and(query_param_is_missing("continuation-token"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(list_page(&["k1", "k2"], Some("tok/1+a="), true)),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(BUCKET_PATH))
        .and(query_param("continuation-token", "tok/1+a="))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(list_page(&["k3", "k4"], Some("tok2"), true)),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(BUCKET_PATH))
        .and(query_param("continuation-token", "tok2"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(list_page(&["k5", "k6"], None, false)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let listing = client.list_all("", &TaskContext::new()).await.unwrap();

    let keys: Vec<_> = listing.entries.iter().map(|e| e.key.as_str()).collect();
    assert_eq!(keys, vec!["k1", "k2", "k3", "k4", "k5", "k6"]);
    assert_eq!(listing.pages, 3);
    assert!(!listing.inconsistent);
    assert_eq!(server.received_requests().await.unwrap().len(), 3);
}

#[test_log::test(tokio::test)]
async fn test_truncated_page_without_token_stops() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(BUCKET_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(list_page(&["a", "b"], None, true)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let listing = client_for(&server).list_all("", &TaskContext::new()).await.unwrap();
    assert_eq!(listing.entries.len(), 2);
    assert!(listing.inconsistent);
}

#[tokio::test]
async fn test_list_directory_folders_and_prefix_marker() {
    let server = MockServer::start().await;
    let body = r#"<ListBucketResult><Prefix>docs/</Prefix><IsTruncated>false</IsTruncated>
<Contents><Key>docs/</Key><Size>0</Size></Contents>
<Contents><Key>docs/readme.md</Key><Size>12</Size><LastModified>2024-06-01T12:00:00Z</LastModified></Contents>
<CommonPrefixes><Prefix>docs/img/</Prefix></CommonPrefixes>
</ListBucketResult>"#;

    Mock::given(method("GET"))
        .and(path(BUCKET_PATH))
        .and(query_param("prefix", "docs/"))
        .and(query_param("delimiter", "/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let ctx = TaskContext::new();

    let listing = client.list_directory("docs", &ListOptions::default(), &ctx).await.unwrap();
    let keys: Vec<_> = listing.entries.iter().map(|e| e.key.as_str()).collect();
    assert_eq!(keys, vec!["docs/readme.md", "docs/img/"]);
    assert!(listing.entries[1].is_folder);
    assert_eq!(listing.entries[1].name(), "img");

    let with_marker = client
        .list_directory("docs/", &ListOptions { include_prefix_itself: true }, &ctx)
        .await
        .unwrap();
    assert_eq!(with_marker.entries.len(), 3);
}

#[tokio::test]
async fn test_versions_replay_both_markers() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(BUCKET_PATH))
        .and(query_param("versions", ""))
        .and(query_param_is_missing("key-marker"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "<ListVersionsResult><IsTruncated>true</IsTruncated><NextKeyMarker>a.txt</NextKeyMarker>\
<NextVersionIdMarker>v1</NextVersionIdMarker>\
<Version><Key>a.txt</Key><VersionId>v1</VersionId><IsLatest>true</IsLatest><Size>1</Size></Version>\
</ListVersionsResult>",
        ))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(BUCKET_PATH))
        .and(query_param("key-marker", "a.txt"))
        .and(query_param("version-id-marker", "v1"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "<ListVersionsResult><IsTruncated>false</IsTruncated>\
<DeleteMarker><Key>b.txt</Key><VersionId>v2</VersionId><IsLatest>true</IsLatest></DeleteMarker>\
</ListVersionsResult>",
        ))
        .expect(1)
        .mount(&server)
        .await;

    let listing = client_for(&server)
        .list_all_versions("", &TaskContext::new())
        .await
        .unwrap();
    assert_eq!(listing.entries.len(), 2);
    assert!(listing.entries[1].is_delete_marker);
}

#[tokio::test]
async fn test_cancelled_listing_sends_nothing() {
    let server = MockServer::start().await;
    mount_single_listing(&server, &["a"]).await;

    let ctx = TaskContext::new();
    ctx.cancel.cancel();
    let err = client_for(&server).list_all("", &ctx).await.unwrap_err();

    assert!(err.is_cancelled());
    assert!(server.received_requests().await.unwrap().is_empty());
}

// ═══════════════════════════════════════════════════════════════════════════════
// Signed exchange and errors
// ═══════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_requests_carry_sigv4_headers() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/test-bucket/notes/hello%20world.txt"))
        .respond_with(ResponseTemplate::new(200).insert_header("ETag", "\"abc\""))
        .mount(&server)
        .await;

    let result = client_for(&server)
        .put_object_with_content_type("notes/hello world.txt", &b"hi"[..], Some("text/plain"))
        .await
        .unwrap();
    assert_eq!(result.etag.as_deref(), Some("abc"));

    let request = &server.received_requests().await.unwrap()[0];
    assert_eq!(request.url.path(), "/test-bucket/notes/hello%20world.txt");
    let auth = request.headers.get("authorization").unwrap().to_str().unwrap();
    assert!(auth.starts_with("AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/"));
    assert!(auth.contains("/us-east-1/s3/aws4_request"));
    assert!(auth.contains("SignedHeaders=content-type;host;x-amz-content-sha256;x-amz-date"));
    assert_eq!(
        request.headers.get("x-amz-content-sha256").unwrap().to_str().unwrap(),
        "8f434346648f6b96df89dda901c5176b10a6d83961dd3c1ac88b59b2dc327aa4"
    );
    assert_eq!(request.body, b"hi");
}

#[tokio::test]
async fn test_non_success_is_service_error_with_body() {
    let server = MockServer::start().await;
    let body = error_body("AccessDenied", "Access Denied");
    Mock::given(method("GET"))
        .and(path("/test-bucket/secret.txt"))
        .respond_with(ResponseTemplate::new(403).set_body_string(body.clone()))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path(BUCKET_PATH))
        .respond_with(
            ResponseTemplate::new(409)
                .set_body_string(error_body("BucketNotEmpty", "not empty")),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/test-bucket/flaky.txt"))
        .respond_with(ResponseTemplate::new(502).set_body_string("Bad Gateway"))
        .mount(&server)
        .await;

    let client = client_for(&server);

    match client.get_object("secret.txt").await.unwrap_err() {
        ClientError::Service { status, code, request_id, body: text, .. } => {
            assert_eq!(status, 403);
            assert_eq!(code.as_deref(), Some("AccessDenied"));
            assert_eq!(request_id.as_deref(), Some("REQ1"));
            assert_eq!(text, body);
        }
        other => panic!("expected service error, got {:?}", other),
    }

    let err = client.delete_bucket("test-bucket").await.unwrap_err();
    assert_eq!(err.status(), Some(409));
    assert_eq!(err.service_code(), Some("BucketNotEmpty"));

    let err = client.get_object("flaky.txt").await.unwrap_err();
    assert_eq!(err.status(), Some(502));
    assert!(err.to_string().contains("Bad Gateway"));
}

#[tokio::test]
async fn test_unset_object_lock_settings_are_none() {
    let server = MockServer::start().await;
    for sub in ["retention", "legal-hold"] {
        Mock::given(method("GET"))
            .and(path("/test-bucket/doc.txt"))
            .and(query_param(sub, ""))
            .respond_with(
                ResponseTemplate::new(404)
                    .set_body_string(error_body("NoSuchObjectLockConfiguration", "none")),
            )
            .mount(&server)
            .await;
    }
    for sub in ["lifecycle", "object-lock"] {
        Mock::given(method("GET"))
            .and(path(BUCKET_PATH))
            .and(query_param(sub, ""))
            .respond_with(
                ResponseTemplate::new(404)
                    .set_body_string(error_body("NoSuchLifecycleConfiguration", "none")),
            )
            .mount(&server)
            .await;
    }

    let client = client_for(&server);
    assert_eq!(client.get_object_retention("doc.txt").await.unwrap(), None);
    assert_eq!(client.get_object_legal_hold("doc.txt").await.unwrap(), None);
    assert!(client.get_bucket_lifecycle().await.unwrap().is_empty());
    assert_eq!(client.get_object_lock_configuration().await.unwrap(), None);
}

#[tokio::test]
async fn test_legal_hold_roundtrip_sends_content_md5() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/test-bucket/doc.txt"))
        .and(query_param("legal-hold", ""))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/test-bucket/doc.txt"))
        .and(query_param("legal-hold", ""))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("<LegalHold><Status>ON</Status></LegalHold>"),
        )
        .mount(&server)
        .await;

    let client = client_for(&server);
    client.put_object_legal_hold("doc.txt", LegalHold { enabled: true }).await.unwrap();
    assert_eq!(
        client.get_object_legal_hold("doc.txt").await.unwrap(),
        Some(LegalHold { enabled: true })
    );

    let put = &requests_with_method(&server, "PUT").await[0];
    assert!(put.headers.get("content-md5").is_some());
    assert!(String::from_utf8_lossy(&put.body).contains("<Status>ON</Status>"));
}

#[tokio::test]
async fn test_copy_error_inside_200_is_service_error() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/test-bucket/dst.txt"))
        .and(header("x-amz-copy-source", "/test-bucket/src.txt"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(error_body("InternalError", "retry")),
        )
        .mount(&server)
        .await;

    let err = client_for(&server).copy_object("src.txt", "dst.txt").await.unwrap_err();
    assert_eq!(err.status(), Some(200));
    assert_eq!(err.service_code(), Some("InternalError"));
}

#[tokio::test]
async fn test_bucket_exists_and_head_metadata() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/missing-bucket"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("HEAD"))
        .and(path("/test-bucket/photo.jpg"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("ETag", "\"e1\"")
                .insert_header("Content-Type", "image/jpeg")
                .insert_header("Last-Modified", "Wed, 12 Oct 2022 17:50:00 GMT")
                .insert_header("x-amz-meta-camera", "x100"),
        )
        .mount(&server)
        .await;

    let client = client_for(&server);
    assert!(!client.bucket_exists("missing-bucket").await.unwrap());

    let head = client.head_object("photo.jpg").await.unwrap();
    assert_eq!(head.etag.as_deref(), Some("e1"));
    assert_eq!(head.content_type.as_deref(), Some("image/jpeg"));
    assert!(head.last_modified.is_some());
    assert_eq!(head.metadata.get("camera").map(String::as_str), Some("x100"));
}

// ═══════════════════════════════════════════════════════════════════════════════
// Payload transform and range reads
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug)]
struct Xor(u8);

impl PayloadTransform for Xor {
    fn encode(&self, _key: &str, data: Bytes) -> strata_client::Result<Bytes> {
        Ok(data.iter().map(|b| b ^ self.0).collect::<Vec<u8>>().into())
    }

    fn decode(&self, key: &str, data: Bytes) -> strata_client::Result<Bytes> {
        self.encode(key, data)
    }
}

#[tokio::test]
async fn test_transform_applies_to_put_and_get_but_not_range() {
    let server = MockServer::start().await;
    let stored: Vec<u8> = b"secret".iter().map(|b| b ^ 0x5a).collect();

    Mock::given(method("PUT"))
        .and(path("/test-bucket/enc.bin"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/test-bucket/enc.bin"))
        .and(header("range", "bytes=0-2"))
        .respond_with(
            ResponseTemplate::new(206)
                .insert_header("Content-Range", "bytes 0-2/6")
                .set_body_bytes(stored[..3].to_vec()),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/test-bucket/enc.bin"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(stored.clone()))
        .mount(&server)
        .await;

    let creds = Credentials::new("AKIDEXAMPLE", "SECRETEXAMPLE", "us-east-1", "test-bucket")
        .with_endpoint(server.uri());
    let client = S3Client::with_transform(creds, ClientConfig::default(), Xor(0x5a)).unwrap();

    client.put_object("enc.bin", &b"secret"[..]).await.unwrap();
    assert_eq!(requests_with_method(&server, "PUT").await[0].body, stored);

    let partial = client.get_object_range("enc.bin", 0, Some(2)).await.unwrap();
    assert_eq!(partial.data.as_ref(), &stored[..3]);
    assert_eq!(partial.content_range.as_deref(), Some("bytes 0-2/6"));

    let full = client.get_object("enc.bin").await.unwrap();
    assert_eq!(full.data.as_ref(), b"secret");

    assert!(matches!(
        client.get_object_range("enc.bin", 5, Some(1)).await,
        Err(ClientError::InvalidArgument(_))
    ));
}

// ═══════════════════════════════════════════════════════════════════════════════
// Multipart
// ═══════════════════════════════════════════════════════════════════════════════

async fn mount_multipart(server: &MockServer, key_path: &str) {
    Mock::given(method("POST"))
        .and(path(key_path))
        .and(query_param("uploads", ""))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "<InitiateMultipartUploadResult><Bucket>test-bucket</Bucket><Key>big.bin</Key>\
<UploadId>upload-1</UploadId></InitiateMultipartUploadResult>",
        ))
        .mount(server)
        .await;
    for (number, etag) in [("1", "a"), ("2", "b"), ("3", "c")] {
        Mock::given(method("PUT"))
            .and(path(key_path))
            .and(query_param("partNumber", number))
            .and(query_param("uploadId", "upload-1"))
            .respond_with(ResponseTemplate::new(200).insert_header("ETag", format!("\"{}\"", etag)))
            .mount(server)
            .await;
    }
    Mock::given(method("POST"))
        .and(path(key_path))
        .and(query_param("uploadId", "upload-1"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "<CompleteMultipartUploadResult><Location>http://x/big.bin</Location><Key>big.bin</Key>\
<ETag>\"final-3\"</ETag></CompleteMultipartUploadResult>",
        ))
        .mount(server)
        .await;
}

fn completion_request(requests: &[Request]) -> String {
    let complete = requests
        .iter()
        .find(|r| r.method.as_str() == "POST" && r.url.query().unwrap_or("").contains("uploadId"))
        .expect("completion request");
    String::from_utf8(complete.body.clone()).unwrap()
}

#[tokio::test]
async fn test_completion_lists_parts_ascending() {
    let server = MockServer::start().await;
    mount_multipart(&server, "/test-bucket/big.bin").await;

    let client = client_for(&server);
    let mut upload = MultipartUpload::start(&client, "big.bin", None).await.unwrap();
    assert_eq!(upload.state(), UploadState::Created);

    upload.upload_part(2, Bytes::from_static(b"22")).await.unwrap();
    upload.upload_part(1, Bytes::from_static(b"1")).await.unwrap();
    upload.upload_part(3, Bytes::from_static(b"333")).await.unwrap();
    assert_eq!(upload.state(), UploadState::PartsUploading);

    let result = upload.complete().await.unwrap();
    assert_eq!(result.etag, "final-3");
    assert_eq!(upload.state(), UploadState::Completed);

    let body = completion_request(&server.received_requests().await.unwrap());
    let a = body.find("<PartNumber>1</PartNumber><ETag>\"a\"</ETag>").unwrap();
    let b = body.find("<PartNumber>2</PartNumber><ETag>\"b\"</ETag>").unwrap();
    let c = body.find("<PartNumber>3</PartNumber><ETag>\"c\"</ETag>").unwrap();
    assert!(a < b && b < c);

    assert!(matches!(
        upload.upload_part(4, Bytes::from_static(b"4")).await,
        Err(ClientError::InvalidArgument(_))
    ));
}

#[tokio::test]
async fn test_complete_without_parts_is_rejected_locally() {
    let server = MockServer::start().await;
    mount_multipart(&server, "/test-bucket/big.bin").await;

    let client = client_for(&server);
    let mut upload = MultipartUpload::start(&client, "big.bin", None).await.unwrap();
    assert!(matches!(upload.complete().await, Err(ClientError::InvalidArgument(_))));
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_repeated_part_number_in_batch_is_rejected() {
    let server = MockServer::start().await;
    mount_multipart(&server, "/test-bucket/big.bin").await;

    let client = client_for(&server);
    let mut upload = MultipartUpload::start(&client, "big.bin", None).await.unwrap();
    let batch = vec![
        (1, Bytes::from_static(b"first")),
        (1, Bytes::from_static(b"second")),
    ];
    let err = upload.upload_parts(batch, &TaskContext::new()).await.unwrap_err();
    assert!(matches!(err, ClientError::InvalidArgument(_)));

    // Only the initiate request went out
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
    assert_eq!(upload.parts().count(), 0);
}

#[tokio::test]
async fn test_upload_large_splits_into_parts() {
    let server = MockServer::start().await;
    mount_multipart(&server, "/test-bucket/big.bin").await;

    let config = ClientConfig::default()
        .with_chunk_size(4)
        .with_part_concurrency(2);
    let client = client_with(&server, config);
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let ctx = TaskContext::new().with_progress(tx);

    let result = client
        .upload_large("big.bin", Bytes::from_static(b"0123456789"), None, &ctx)
        .await
        .unwrap();
    assert_eq!(result.etag.as_deref(), Some("final-3"));
    drop(ctx);

    let requests = server.received_requests().await.unwrap();
    let mut part_bodies: Vec<(String, Vec<u8>)> = requests
        .iter()
        .filter(|r| r.method.as_str() == "PUT")
        .map(|r| {
            let number = r
                .url
                .query_pairs()
                .find(|(k, _)| k == "partNumber")
                .map(|(_, v)| v.into_owned())
                .unwrap();
            (number, r.body.clone())
        })
        .collect();
    part_bodies.sort();
    assert_eq!(
        part_bodies,
        vec![
            ("1".to_string(), b"0123".to_vec()),
            ("2".to_string(), b"4567".to_vec()),
            ("3".to_string(), b"89".to_vec()),
        ]
    );

    let mut uploaded = Vec::new();
    while let Some(event) = rx.recv().await {
        assert_eq!(event.stage, Stage::Uploading);
        assert_eq!(event.total, Some(3));
        uploaded.push(event.completed);
    }
    assert_eq!(uploaded, vec![1, 2, 3]);
}

#[tokio::test]
async fn test_upload_large_small_payload_is_single_put() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/test-bucket/small.txt"))
        .respond_with(ResponseTemplate::new(200).insert_header("ETag", "\"s1\""))
        .expect(1)
        .mount(&server)
        .await;

    let result = client_for(&server)
        .upload_large(
            "small.txt",
            Bytes::from_static(b"tiny"),
            Some("text/plain"),
            &TaskContext::new(),
        )
        .await
        .unwrap();
    assert_eq!(result.etag.as_deref(), Some("s1"));
}

#[tokio::test]
async fn test_resume_and_abort_orphan() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(BUCKET_PATH))
        .and(query_param("uploads", ""))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "<ListMultipartUploadsResult><IsTruncated>false</IsTruncated>\
<Upload><Key>big.bin</Key><UploadId>orphan-1</UploadId><Initiated>2024-06-01T00:00:00Z</Initiated></Upload>\
</ListMultipartUploadsResult>",
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/test-bucket/big.bin"))
        .and(query_param("uploadId", "orphan-1"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "<ListPartsResult><IsTruncated>false</IsTruncated>\
<Part><PartNumber>2</PartNumber><ETag>\"p2\"</ETag><Size>5</Size></Part>\
<Part><PartNumber>1</PartNumber><ETag>\"p1\"</ETag><Size>5</Size></Part>\
</ListPartsResult>",
        ))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/test-bucket/big.bin"))
        .and(query_param("uploadId", "orphan-1"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let ctx = TaskContext::new();

    let orphans = client.list_multipart_uploads("", &ctx).await.unwrap();
    assert_eq!(orphans.entries.len(), 1);
    let orphan = &orphans.entries[0];

    let mut upload = MultipartUpload::resume(&client, &orphan.key, &orphan.upload_id, &ctx)
        .await
        .unwrap();
    assert_eq!(upload.state(), UploadState::PartsUploading);
    let numbers: Vec<u32> = upload.parts().map(|p| p.part_number).collect();
    assert_eq!(numbers, vec![1, 2]);

    upload.abort().await.unwrap();
    assert_eq!(upload.state(), UploadState::Aborted);
}

// ═══════════════════════════════════════════════════════════════════════════════
// Recursive operations
// ═══════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_delete_prefix_children_first() {
    let server = MockServer::start().await;
    mount_single_listing(&server, &["a/", "a/b/", "a/b/c.txt"]).await;
    Mock::given(method("DELETE"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let report = client_for(&server)
        .delete_prefix("a/", &TaskContext::new())
        .await
        .unwrap();
    assert_eq!(report.processed, 3);
    assert_eq!(report.total, 3);

    let deleted: Vec<String> = requests_with_method(&server, "DELETE")
        .await
        .iter()
        .map(|r| r.url.path().to_string())
        .collect();
    assert_eq!(
        deleted,
        vec!["/test-bucket/a/b/c.txt", "/test-bucket/a/b/", "/test-bucket/a/"]
    );
}

#[tokio::test]
async fn test_dot_segment_keys_never_reach_the_service() {
    let server = MockServer::start().await;
    mount_single_listing(&server, &["a/keep.txt", "a/../victim.txt"]).await;
    Mock::given(method("DELETE"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let err = client
        .delete_prefix("a/", &TaskContext::new())
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::InvalidArgument(_)));

    let deleted: Vec<String> = requests_with_method(&server, "DELETE")
        .await
        .iter()
        .map(|r| r.url.path().to_string())
        .collect();
    assert!(!deleted.contains(&"/test-bucket/victim.txt".to_string()));
    assert!(deleted.is_empty(), "unexpected deletes: {:?}", deleted);

    server.reset().await;
    assert!(matches!(
        client.get_object("a/../victim.txt").await,
        Err(ClientError::InvalidArgument(_))
    ));
    assert!(matches!(
        client.rename_object("a/./x", "b/x").await,
        Err(ClientError::InvalidArgument(_))
    ));
    assert!(matches!(
        client.presign_get("../victim.txt", Duration::from_secs(60)),
        Err(ClientError::InvalidArgument(_))
    ));
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_delete_prefix_tries_unlisted_marker_and_ignores_failure() {
    let server = MockServer::start().await;
    mount_single_listing(&server, &["logs/1.txt"]).await;
    Mock::given(method("DELETE"))
        .and(path("/test-bucket/logs/"))
        .respond_with(ResponseTemplate::new(404).set_body_string(error_body("NoSuchKey", "gone")))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/test-bucket/logs/1.txt"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let report = client_for(&server)
        .delete_prefix("logs/", &TaskContext::new())
        .await
        .unwrap();
    assert_eq!(report.processed, 1);
}

#[tokio::test]
async fn test_delete_prefix_stops_when_cancelled() {
    let server = MockServer::start().await;
    mount_single_listing(&server, &["p/1", "p/2", "p/3", "p/4", "p/5"]).await;
    Mock::given(method("DELETE"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let ctx = TaskContext::new().with_progress(tx);
    let token = ctx.cancel.clone();

    let task = tokio::spawn(async move { client.delete_prefix("p/", &ctx).await });
    while let Some(event) = rx.recv().await {
        if event.stage == Stage::Deleting {
            token.cancel();
            break;
        }
    }

    let result = task.await.unwrap();
    assert!(matches!(result, Err(ClientError::Cancelled)));
    let deletes = requests_with_method(&server, "DELETE").await.len();
    assert!(deletes >= 1 && deletes < 5, "deleted {} of 5", deletes);
}

#[tokio::test]
async fn test_rename_prefix_copies_then_deletes() {
    let server = MockServer::start().await;
    mount_single_listing(&server, &["old/a.txt", "old/sub/b.txt"]).await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(200).set_body_string(COPY_RESULT))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let report = client.rename_prefix("old/", "new/", &TaskContext::new()).await.unwrap();
    assert_eq!(report.processed, 2);

    let requests = server.received_requests().await.unwrap();
    let sequence: Vec<(String, String)> = requests
        .iter()
        .filter(|r| r.method.as_str() != "GET")
        .map(|r| (r.method.as_str().to_string(), r.url.path().to_string()))
        .collect();
    assert_eq!(
        sequence,
        vec![
            ("PUT".to_string(), "/test-bucket/new/sub/b.txt".to_string()),
            ("DELETE".to_string(), "/test-bucket/old/sub/b.txt".to_string()),
            ("PUT".to_string(), "/test-bucket/new/a.txt".to_string()),
            ("DELETE".to_string(), "/test-bucket/old/a.txt".to_string()),
        ]
    );
    let first_copy = requests.iter().find(|r| r.method.as_str() == "PUT").unwrap();
    assert_eq!(
        first_copy.headers.get("x-amz-copy-source").unwrap().to_str().unwrap(),
        "/test-bucket/old/sub/b.txt"
    );

    let err = client
        .rename_prefix("old/", "old/nested/", &TaskContext::new())
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Config(_)));
}

#[tokio::test]
async fn test_delete_prefix_stops_at_first_failed_entry() {
    let server = MockServer::start().await;
    mount_single_listing(&server, &["p/1", "p/22", "p/333"]).await;
    Mock::given(method("DELETE"))
        .and(path("/test-bucket/p/22"))
        .respond_with(
            ResponseTemplate::new(500)
                .set_body_string(error_body("InternalError", "try again")),
        )
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let err = client_for(&server)
        .delete_prefix("p/", &TaskContext::new())
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Service { status: 500, .. }));
    assert_eq!(err.service_code(), Some("InternalError"));

    let deleted: Vec<String> = requests_with_method(&server, "DELETE")
        .await
        .iter()
        .map(|r| r.url.path().to_string())
        .collect();
    assert_eq!(deleted, vec!["/test-bucket/p/333", "/test-bucket/p/22"]);
}

#[tokio::test]
async fn test_rename_prefix_failure_leaves_entry_under_both_keys() {
    let server = MockServer::start().await;
    mount_single_listing(&server, &["old/a", "old/bb"]).await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(200).set_body_string(COPY_RESULT))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/test-bucket/old/bb"))
        .respond_with(
            ResponseTemplate::new(500)
                .set_body_string(error_body("InternalError", "try again")),
        )
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let err = client
        .rename_prefix("old/", "new/", &TaskContext::new())
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Service { status: 500, .. }));

    // old/bb was copied and never removed; old/a was never touched
    let sequence: Vec<(String, String)> = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.method.as_str() != "GET")
        .map(|r| (r.method.as_str().to_string(), r.url.path().to_string()))
        .collect();
    assert_eq!(
        sequence,
        vec![
            ("PUT".to_string(), "/test-bucket/new/bb".to_string()),
            ("DELETE".to_string(), "/test-bucket/old/bb".to_string()),
        ]
    );

    // Running it again once the service recovers finishes the job
    server.reset().await;
    mount_single_listing(&server, &["old/a", "old/bb"]).await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(200).set_body_string(COPY_RESULT))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;
    let report = client
        .rename_prefix("old/", "new/", &TaskContext::new())
        .await
        .unwrap();
    assert_eq!(report.processed, 2);
}

// ═══════════════════════════════════════════════════════════════════════════════
// Snapshots and presigning
// ═══════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_capture_snapshot_and_diff() {
    let server = MockServer::start().await;
    mount_single_listing(&server, &["x", "yy"]).await;

    let client = client_for(&server);
    let before = client.capture_snapshot("", &TaskContext::new()).await.unwrap();
    assert_eq!(before.len(), 2);
    assert_eq!(before.bucket, "test-bucket");

    let mut after = before.clone();
    after.entries.remove("x");
    if let Some(entry) = after.entries.get_mut("yy") {
        entry.etag = Some("changed".to_string());
    }

    let diff = strata_client::diff(&before, &after);
    assert_eq!(diff.removed.len(), 1);
    assert_eq!(diff.removed[0].key, "x");
    assert_eq!(diff.modified[0].key, "yy");
    assert!(diff.added.is_empty());
}

#[tokio::test]
async fn test_presigned_get_is_accepted_without_headers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/test-bucket/shared.txt"))
        .and(query_param("X-Amz-Algorithm", "AWS4-HMAC-SHA256"))
        .and(query_param("X-Amz-Expires", "3600"))
        .respond_with(ResponseTemplate::new(200).set_body_string("shared"))
        .expect(1)
        .mount(&server)
        .await;

    let url = client_for(&server)
        .presign_get("shared.txt", Duration::from_secs(3600))
        .unwrap();
    let body = reqwest::get(&url).await.unwrap().text().await.unwrap();
    assert_eq!(body, "shared");
}
