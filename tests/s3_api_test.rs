//! S3 API compliance tests over plain HTTP against a spawned server.

mod common;

use common::{xml_tag, TestServer};

// ============================================================================
// Object lifecycle
// ============================================================================

#[tokio::test]
async fn test_object_lifecycle() {
    let server = TestServer::spawn().await;
    let client = server.client();

    // Create bucket
    let resp = client.put(server.url("/b")).send().await.unwrap();
    assert_eq!(resp.status(), 200);

    // Put with explicit content type
    let resp = client
        .put(server.url("/b/f.txt"))
        .header("content-type", "text/plain")
        .body("Hello")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(
        resp.headers().get("etag").unwrap(),
        "\"8b1a9953c4611296a827abf8c47804d7\""
    );

    // Head echoes the stored attributes
    let resp = client.head(server.url("/b/f.txt")).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers().get("content-length").unwrap(), "5");
    assert_eq!(resp.headers().get("content-type").unwrap(), "text/plain");
    assert_eq!(resp.headers().get("accept-ranges").unwrap(), "bytes");
    assert!(resp.headers().contains_key("last-modified"));

    // Get returns the body
    let resp = client.get(server.url("/b/f.txt")).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.unwrap(), "Hello");

    // Delete, then the key is gone
    let resp = client.delete(server.url("/b/f.txt")).send().await.unwrap();
    assert_eq!(resp.status(), 204);

    let resp = client.get(server.url("/b/f.txt")).send().await.unwrap();
    assert_eq!(resp.status(), 404);
    let body = resp.text().await.unwrap();
    assert_eq!(xml_tag(&body, "Code").as_deref(), Some("NoSuchKey"));
}

#[tokio::test]
async fn test_put_overwrites_last_writer_wins() {
    let server = TestServer::spawn().await;
    let client = server.client();
    client.put(server.url("/b")).send().await.unwrap();

    client
        .put(server.url("/b/k"))
        .body("first")
        .send()
        .await
        .unwrap();
    client
        .put(server.url("/b/k"))
        .body("second body")
        .send()
        .await
        .unwrap();

    let resp = client.get(server.url("/b/k")).send().await.unwrap();
    assert_eq!(resp.text().await.unwrap(), "second body");
}

#[tokio::test]
async fn test_custom_metadata_roundtrip() {
    let server = TestServer::spawn().await;
    let client = server.client();
    client.put(server.url("/b")).send().await.unwrap();

    client
        .put(server.url("/b/meta.bin"))
        .header("x-amz-meta-owner", "ops")
        .header("x-amz-meta-Pipeline-Stage", "nightly")
        .header("cache-control", "max-age=60")
        .header("content-disposition", "attachment")
        .body("x")
        .send()
        .await
        .unwrap();

    let resp = client.head(server.url("/b/meta.bin")).send().await.unwrap();
    assert_eq!(resp.headers().get("x-amz-meta-owner").unwrap(), "ops");
    assert_eq!(
        resp.headers().get("x-amz-meta-pipeline-stage").unwrap(),
        "nightly"
    );
    assert_eq!(resp.headers().get("cache-control").unwrap(), "max-age=60");
    assert_eq!(
        resp.headers().get("content-disposition").unwrap(),
        "attachment"
    );
    // No content type provided: default applies.
    assert_eq!(
        resp.headers().get("content-type").unwrap(),
        "application/octet-stream"
    );
}

#[tokio::test]
async fn test_nested_keys_create_directories() {
    let server = TestServer::spawn().await;
    let client = server.client();
    client.put(server.url("/b")).send().await.unwrap();

    client
        .put(server.url("/b/photos/2024/jan/a.jpg"))
        .body("jpeg")
        .send()
        .await
        .unwrap();

    assert!(server.data_path().join("b/photos/2024/jan/a.jpg").exists());
    assert!(server
        .data_path()
        .join("b/photos/2024/jan/a.jpg.metadata.json")
        .exists());

    let resp = client
        .get(server.url("/b/photos/2024/jan/a.jpg"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.text().await.unwrap(), "jpeg");
}

// ============================================================================
// Digest enforcement
// ============================================================================

#[tokio::test]
async fn test_bad_digest_preserves_existing_object() {
    let server = TestServer::spawn().await;
    let client = server.client();
    client.put(server.url("/b")).send().await.unwrap();

    client
        .put(server.url("/b/keep.txt"))
        .body("original")
        .send()
        .await
        .unwrap();

    // sha256 of the empty string cannot match "bad payload"
    let resp = client
        .put(server.url("/b/keep.txt"))
        .header(
            "x-amz-content-sha256",
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855",
        )
        .body("bad payload")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body = resp.text().await.unwrap();
    assert_eq!(xml_tag(&body, "Code").as_deref(), Some("BadDigest"));

    let resp = client.get(server.url("/b/keep.txt")).send().await.unwrap();
    assert_eq!(resp.text().await.unwrap(), "original");
}

#[tokio::test]
async fn test_unsigned_payload_sentinel_is_not_a_digest() {
    let server = TestServer::spawn().await;
    let client = server.client();
    client.put(server.url("/b")).send().await.unwrap();

    let resp = client
        .put(server.url("/b/f"))
        .header("x-amz-content-sha256", "UNSIGNED-PAYLOAD")
        .body("anything at all")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
}

// ============================================================================
// AWS chunked transfer decoding
// ============================================================================

#[tokio::test]
async fn test_aws_chunked_body_is_decoded() {
    let server = TestServer::spawn().await;
    let client = server.client();
    client.put(server.url("/b")).send().await.unwrap();

    let framed = "5;chunk-signature=deadbeef\r\nHello\r\n0;chunk-signature=cafe\r\n\r\n";
    let resp = client
        .put(server.url("/b/chunked.txt"))
        .header("x-amz-content-sha256", "STREAMING-AWS4-HMAC-SHA256-PAYLOAD")
        .header("x-amz-decoded-content-length", "5")
        .body(framed)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    // ETag is the MD5 of the decoded payload, not the framing.
    assert_eq!(
        resp.headers().get("etag").unwrap(),
        "\"8b1a9953c4611296a827abf8c47804d7\""
    );

    let resp = client
        .get(server.url("/b/chunked.txt"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.text().await.unwrap(), "Hello");
}

// ============================================================================
// Range requests
// ============================================================================

#[tokio::test]
async fn test_range_get() {
    let server = TestServer::spawn().await;
    let client = server.client();
    client.put(server.url("/b")).send().await.unwrap();
    client
        .put(server.url("/b/r"))
        .body("0123456789")
        .send()
        .await
        .unwrap();

    let resp = client
        .get(server.url("/b/r"))
        .header("range", "bytes=2-6")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 206);
    assert_eq!(resp.headers().get("content-range").unwrap(), "bytes 2-6/10");
    assert_eq!(resp.text().await.unwrap(), "23456");

    let resp = client
        .get(server.url("/b/r"))
        .header("range", "bytes=-4")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 206);
    assert_eq!(resp.text().await.unwrap(), "6789");

    let resp = client
        .get(server.url("/b/r"))
        .header("range", "bytes=99-")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 416);
    assert_eq!(resp.headers().get("content-range").unwrap(), "bytes */10");
}

// ============================================================================
// Copy
// ============================================================================

#[tokio::test]
async fn test_copy_object_preserves_metadata() {
    let server = TestServer::spawn().await;
    let client = server.client();
    client.put(server.url("/src")).send().await.unwrap();
    client.put(server.url("/dst")).send().await.unwrap();

    client
        .put(server.url("/src/a.txt"))
        .header("content-type", "text/plain")
        .header("x-amz-meta-team", "storage")
        .body("copy me")
        .send()
        .await
        .unwrap();

    let resp = client
        .put(server.url("/dst/b.txt"))
        .header("x-amz-copy-source", "/src/a.txt")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body = resp.text().await.unwrap();
    assert!(body.contains("<CopyObjectResult"));
    assert!(xml_tag(&body, "ETag").is_some());

    let resp = client.head(server.url("/dst/b.txt")).send().await.unwrap();
    assert_eq!(resp.headers().get("content-type").unwrap(), "text/plain");
    assert_eq!(resp.headers().get("x-amz-meta-team").unwrap(), "storage");

    let resp = client.get(server.url("/dst/b.txt")).send().await.unwrap();
    assert_eq!(resp.text().await.unwrap(), "copy me");
}

#[tokio::test]
async fn test_copy_object_replace_directive() {
    let server = TestServer::spawn().await;
    let client = server.client();
    client.put(server.url("/b")).send().await.unwrap();

    client
        .put(server.url("/b/a"))
        .header("content-type", "text/plain")
        .header("x-amz-meta-keep", "no")
        .body("data")
        .send()
        .await
        .unwrap();

    client
        .put(server.url("/b/c"))
        .header("x-amz-copy-source", "b/a")
        .header("x-amz-metadata-directive", "REPLACE")
        .header("x-amz-meta-fresh", "yes")
        .send()
        .await
        .unwrap();

    let resp = client.head(server.url("/b/c")).send().await.unwrap();
    assert_eq!(
        resp.headers().get("content-type").unwrap(),
        "application/octet-stream"
    );
    assert!(resp.headers().get("x-amz-meta-keep").is_none());
    assert_eq!(resp.headers().get("x-amz-meta-fresh").unwrap(), "yes");
}

#[tokio::test]
async fn test_copy_missing_source_is_404() {
    let server = TestServer::spawn().await;
    let client = server.client();
    client.put(server.url("/b")).send().await.unwrap();

    let resp = client
        .put(server.url("/b/dst"))
        .header("x-amz-copy-source", "/b/never-existed")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

// ============================================================================
// Buckets
// ============================================================================

#[tokio::test]
async fn test_bucket_rules_and_conflicts() {
    let server = TestServer::spawn().await;
    let client = server.client();

    // Invalid names are rejected with InvalidBucketName.
    for bad in ["ab", "-bad", "bad-", "Upper", "has..dots"] {
        let resp = client
            .put(server.url(&format!("/{bad}")))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400, "{bad} should be rejected");
        let body = resp.text().await.unwrap();
        assert_eq!(
            xml_tag(&body, "Code").as_deref(),
            Some("InvalidBucketName"),
            "{bad}"
        );
    }

    // Create twice: idempotent.
    assert_eq!(client.put(server.url("/ok")).send().await.unwrap().status(), 200);
    assert_eq!(client.put(server.url("/ok")).send().await.unwrap().status(), 200);

    // Head exists / missing.
    assert_eq!(client.head(server.url("/ok")).send().await.unwrap().status(), 200);
    assert_eq!(
        client.head(server.url("/nope")).send().await.unwrap().status(),
        404
    );

    // Deleting a non-empty bucket conflicts.
    client
        .put(server.url("/ok/obj"))
        .body("x")
        .send()
        .await
        .unwrap();
    let resp = client.delete(server.url("/ok")).send().await.unwrap();
    assert_eq!(resp.status(), 409);
    let body = resp.text().await.unwrap();
    assert_eq!(xml_tag(&body, "Code").as_deref(), Some("BucketNotEmpty"));

    // Empty it and retry.
    client.delete(server.url("/ok/obj")).send().await.unwrap();
    assert_eq!(
        client.delete(server.url("/ok")).send().await.unwrap().status(),
        204
    );
}

#[tokio::test]
async fn test_list_buckets() {
    let server = TestServer::spawn().await;
    let client = server.client();
    client.put(server.url("/zeta")).send().await.unwrap();
    client.put(server.url("/alpha")).send().await.unwrap();

    let resp = client.get(server.url("/")).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    let body = resp.text().await.unwrap();
    assert!(body.contains("<ListAllMyBucketsResult"));
    let alpha = body.find("<Name>alpha</Name>").unwrap();
    let zeta = body.find("<Name>zeta</Name>").unwrap();
    assert!(alpha < zeta, "buckets sorted by name");
}

#[tokio::test]
async fn test_operations_on_missing_bucket() {
    let server = TestServer::spawn().await;
    let client = server.client();

    let resp = client
        .put(server.url("/ghost/key"))
        .body("x")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
    let body = resp.text().await.unwrap();
    assert_eq!(xml_tag(&body, "Code").as_deref(), Some("NoSuchBucket"));

    let resp = client.get(server.url("/ghost/key")).send().await.unwrap();
    assert_eq!(resp.status(), 404);
}

// ============================================================================
// Batch delete
// ============================================================================

#[tokio::test]
async fn test_delete_objects_batch() {
    let server = TestServer::spawn().await;
    let client = server.client();
    client.put(server.url("/b")).send().await.unwrap();
    for key in ["a.txt", "b.txt"] {
        client
            .put(server.url(&format!("/b/{key}")))
            .body("x")
            .send()
            .await
            .unwrap();
    }

    let body = r#"<Delete>
  <Object><Key>a.txt</Key></Object>
  <Object><Key>b.txt</Key></Object>
  <Object><Key>never-existed.txt</Key></Object>
</Delete>"#;
    let resp = client
        .post(server.url("/b?delete"))
        .body(body)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let text = resp.text().await.unwrap();
    // Missing keys report as deleted, per S3 convention.
    assert_eq!(text.matches("<Deleted>").count(), 3);
    assert!(!text.contains("<Error>"));

    assert_eq!(
        client.get(server.url("/b/a.txt")).send().await.unwrap().status(),
        404
    );
}

#[tokio::test]
async fn test_delete_objects_quiet_and_malformed() {
    let server = TestServer::spawn().await;
    let client = server.client();
    client.put(server.url("/b")).send().await.unwrap();
    client
        .put(server.url("/b/q.txt"))
        .body("x")
        .send()
        .await
        .unwrap();

    let body = r#"<Delete>
  <Quiet>true</Quiet>
  <Object><Key>q.txt</Key></Object>
</Delete>"#;
    let resp = client
        .post(server.url("/b?delete"))
        .body(body)
        .send()
        .await
        .unwrap();
    let text = resp.text().await.unwrap();
    assert!(!text.contains("<Deleted>"), "quiet mode omits Deleted list");

    let resp = client
        .post(server.url("/b?delete"))
        .body("definitely <<not>> xml")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let text = resp.text().await.unwrap();
    assert_eq!(xml_tag(&text, "Code").as_deref(), Some("MalformedXML"));
}

// ============================================================================
// Surface behavior
// ============================================================================

#[tokio::test]
async fn test_health_and_probes() {
    let server = TestServer::spawn().await;
    let client = server.client();

    let resp = client.get(server.url("/health")).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.unwrap(), "OK");

    assert_eq!(client.head(server.url("/")).send().await.unwrap().status(), 200);

    // Service-level non-GET is not implemented.
    let resp = client.post(server.url("/")).send().await.unwrap();
    assert_eq!(resp.status(), 501);

    // Unsupported verbs on real resources render the S3 error body.
    let resp = client.patch(server.url("/b/k")).send().await.unwrap();
    assert_eq!(resp.status(), 405);
    let body = resp.text().await.unwrap();
    assert_eq!(xml_tag(&body, "Code").as_deref(), Some("MethodNotAllowed"));
}

#[tokio::test]
async fn test_request_id_header_is_monotonic_prefix() {
    let server = TestServer::spawn().await;
    let client = server.client();

    let resp = client.get(server.url("/health")).send().await.unwrap();
    let id = resp
        .headers()
        .get("x-amz-request-id")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(id.starts_with("geckos3-"), "{id}");

    // Error responses carry one too.
    let resp = client.get(server.url("/ghost/k")).send().await.unwrap();
    assert!(resp.headers().contains_key("x-amz-request-id"));
}

#[tokio::test]
async fn test_hidden_staging_never_listed() {
    let server = TestServer::spawn().await;
    let client = server.client();
    client.put(server.url("/b")).send().await.unwrap();
    client
        .put(server.url("/b/visible.txt"))
        .body("x")
        .send()
        .await
        .unwrap();

    // Start a multipart upload so .geckos3-multipart exists with content.
    client
        .post(server.url("/b/staged.bin?uploads"))
        .send()
        .await
        .unwrap();

    let resp = client
        .get(server.url("/b?list-type=2"))
        .send()
        .await
        .unwrap();
    let body = resp.text().await.unwrap();
    assert!(body.contains("<Key>visible.txt</Key>"));
    assert!(!body.contains("geckos3-multipart"));
    assert!(!body.contains("metadata.json"));
}
