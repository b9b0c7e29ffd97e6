//! S3 XML response builders and request parsers
//!
//! Responses are built by hand (the shapes are small and fixed); request
//! bodies (`Delete`, `CompleteMultipartUpload`) are parsed with quick-xml.
//! Everything lives in the `http://s3.amazonaws.com/doc/2006-03-01/`
//! namespace and is prefixed with the standard XML declaration.

use chrono::{DateTime, Utc};
use serde::Deserialize;

const XML_DECL: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;
const S3_XMLNS: &str = "http://s3.amazonaws.com/doc/2006-03-01/";
const TIMESTAMP_FMT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

/// Escape special XML characters
pub fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

/// S3 object in list response
#[derive(Debug, Clone)]
pub struct S3Object {
    pub key: String,
    pub size: u64,
    pub last_modified: DateTime<Utc>,
    pub etag: String,
    pub storage_class: String,
}

impl S3Object {
    pub fn new(key: String, size: u64, last_modified: DateTime<Utc>, etag: String) -> Self {
        Self {
            key,
            size,
            last_modified,
            etag,
            storage_class: "STANDARD".to_string(),
        }
    }
}

/// ListObjects v1/v2 response
#[derive(Debug, Clone)]
pub struct ListBucketResult {
    pub name: String,
    pub prefix: String,
    pub delimiter: Option<String>,
    pub max_keys: u32,
    pub key_count: u32,
    pub is_truncated: bool,
    pub contents: Vec<S3Object>,
    pub common_prefixes: Vec<String>,
    /// v2 pagination
    pub continuation_token: Option<String>,
    pub next_continuation_token: Option<String>,
    pub start_after: Option<String>,
    /// v1 pagination
    pub marker: Option<String>,
    pub next_marker: Option<String>,
    /// Whether to URL-encode keys/prefixes in the XML response
    pub encoding_type: Option<String>,
    /// v1 vs v2 flag
    pub is_v1: bool,
}

impl ListBucketResult {
    /// Encode a key/prefix value: URL-encode if encoding_type is "url", otherwise XML-escape.
    fn encode_value(&self, s: &str) -> String {
        if self.encoding_type.as_deref() == Some("url") {
            urlencoding::encode(s).into_owned()
        } else {
            escape_xml(s)
        }
    }

    /// Convert to S3 XML format (v1 or v2 depending on construction)
    pub fn to_xml(&self) -> String {
        let mut xml = String::new();
        xml.push_str(XML_DECL);
        xml.push('\n');
        xml.push_str(&format!(r#"<ListBucketResult xmlns="{S3_XMLNS}">"#));
        xml.push('\n');

        xml.push_str(&format!("  <Name>{}</Name>\n", escape_xml(&self.name)));
        xml.push_str(&format!(
            "  <Prefix>{}</Prefix>\n",
            self.encode_value(&self.prefix)
        ));
        if let Some(ref delim) = self.delimiter {
            xml.push_str(&format!("  <Delimiter>{}</Delimiter>\n", escape_xml(delim)));
        }
        if let Some(ref enc) = self.encoding_type {
            xml.push_str(&format!(
                "  <EncodingType>{}</EncodingType>\n",
                escape_xml(enc)
            ));
        }
        xml.push_str(&format!("  <MaxKeys>{}</MaxKeys>\n", self.max_keys));

        if self.is_v1 {
            // v1: <Marker>, <NextMarker>, no <KeyCount>
            xml.push_str(&format!(
                "  <Marker>{}</Marker>\n",
                self.encode_value(self.marker.as_deref().unwrap_or(""))
            ));
            xml.push_str(&format!(
                "  <IsTruncated>{}</IsTruncated>\n",
                self.is_truncated
            ));
            if self.is_truncated {
                if let Some(ref next_marker) = self.next_marker {
                    xml.push_str(&format!(
                        "  <NextMarker>{}</NextMarker>\n",
                        self.encode_value(next_marker)
                    ));
                }
            }
        } else {
            // v2: <KeyCount>, <ContinuationToken>, <NextContinuationToken>
            xml.push_str(&format!("  <KeyCount>{}</KeyCount>\n", self.key_count));
            xml.push_str(&format!(
                "  <IsTruncated>{}</IsTruncated>\n",
                self.is_truncated
            ));

            if let Some(ref token) = self.continuation_token {
                xml.push_str(&format!(
                    "  <ContinuationToken>{}</ContinuationToken>\n",
                    escape_xml(token)
                ));
            }
            if let Some(ref token) = self.next_continuation_token {
                xml.push_str(&format!(
                    "  <NextContinuationToken>{}</NextContinuationToken>\n",
                    escape_xml(token)
                ));
            }
            if let Some(ref start_after) = self.start_after {
                xml.push_str(&format!(
                    "  <StartAfter>{}</StartAfter>\n",
                    self.encode_value(start_after)
                ));
            }
        }

        for obj in &self.contents {
            xml.push_str("  <Contents>\n");
            xml.push_str(&format!("    <Key>{}</Key>\n", self.encode_value(&obj.key)));
            xml.push_str(&format!(
                "    <LastModified>{}</LastModified>\n",
                obj.last_modified.format(TIMESTAMP_FMT)
            ));
            xml.push_str(&format!("    <ETag>{}</ETag>\n", escape_xml(&obj.etag)));
            xml.push_str(&format!("    <Size>{}</Size>\n", obj.size));
            xml.push_str(&format!(
                "    <StorageClass>{}</StorageClass>\n",
                obj.storage_class
            ));
            xml.push_str("  </Contents>\n");
        }

        for cp in &self.common_prefixes {
            xml.push_str("  <CommonPrefixes>\n");
            xml.push_str(&format!("    <Prefix>{}</Prefix>\n", self.encode_value(cp)));
            xml.push_str("  </CommonPrefixes>\n");
        }

        xml.push_str("</ListBucketResult>");
        xml
    }
}

// ============================================================================
// ListBuckets Response
// ============================================================================

/// Bucket info for ListBuckets
#[derive(Debug, Clone)]
pub struct BucketInfo {
    pub name: String,
    pub creation_date: DateTime<Utc>,
}

/// ListBuckets response
#[derive(Debug, Clone)]
pub struct ListBucketsResult {
    pub owner_id: String,
    pub owner_display_name: String,
    pub buckets: Vec<BucketInfo>,
}

impl ListBucketsResult {
    pub fn to_xml(&self) -> String {
        let mut xml = String::new();
        xml.push_str(XML_DECL);
        xml.push('\n');
        xml.push_str(&format!(r#"<ListAllMyBucketsResult xmlns="{S3_XMLNS}">"#));
        xml.push('\n');

        xml.push_str("  <Owner>\n");
        xml.push_str(&format!("    <ID>{}</ID>\n", escape_xml(&self.owner_id)));
        xml.push_str(&format!(
            "    <DisplayName>{}</DisplayName>\n",
            escape_xml(&self.owner_display_name)
        ));
        xml.push_str("  </Owner>\n");

        xml.push_str("  <Buckets>\n");
        for bucket in &self.buckets {
            xml.push_str("    <Bucket>\n");
            xml.push_str(&format!(
                "      <Name>{}</Name>\n",
                escape_xml(&bucket.name)
            ));
            xml.push_str(&format!(
                "      <CreationDate>{}</CreationDate>\n",
                bucket.creation_date.format(TIMESTAMP_FMT)
            ));
            xml.push_str("    </Bucket>\n");
        }
        xml.push_str("  </Buckets>\n");

        xml.push_str("</ListAllMyBucketsResult>");
        xml
    }
}

// ============================================================================
// DeleteObjects Request/Response
// ============================================================================

/// Delete request object
#[derive(Debug, Clone, Deserialize)]
pub struct DeleteObjectIdentifier {
    #[serde(rename = "Key")]
    pub key: String,
}

/// Delete request body
#[derive(Debug, Clone, Deserialize)]
pub struct DeleteRequest {
    #[serde(rename = "Quiet")]
    pub quiet: Option<bool>,
    #[serde(rename = "Object", default)]
    pub objects: Vec<DeleteObjectIdentifier>,
}

impl DeleteRequest {
    /// Parse from XML body
    pub fn from_xml(xml: &str) -> Result<Self, quick_xml::DeError> {
        quick_xml::de::from_str(xml)
    }
}

/// Error deleting a single object
#[derive(Debug, Clone)]
pub struct DeleteError {
    pub key: String,
    pub code: String,
    pub message: String,
}

/// DeleteObjects response
#[derive(Debug, Clone, Default)]
pub struct DeleteResult {
    pub deleted: Vec<String>,
    pub errors: Vec<DeleteError>,
}

impl DeleteResult {
    pub fn to_xml(&self, quiet: bool) -> String {
        let mut xml = String::new();
        xml.push_str(XML_DECL);
        xml.push('\n');
        xml.push_str(&format!(r#"<DeleteResult xmlns="{S3_XMLNS}">"#));
        xml.push('\n');

        // Only include Deleted elements if not quiet
        if !quiet {
            for key in &self.deleted {
                xml.push_str("  <Deleted>\n");
                xml.push_str(&format!("    <Key>{}</Key>\n", escape_xml(key)));
                xml.push_str("  </Deleted>\n");
            }
        }

        // Always include errors
        for error in &self.errors {
            xml.push_str("  <Error>\n");
            xml.push_str(&format!("    <Key>{}</Key>\n", escape_xml(&error.key)));
            xml.push_str(&format!("    <Code>{}</Code>\n", escape_xml(&error.code)));
            xml.push_str(&format!(
                "    <Message>{}</Message>\n",
                escape_xml(&error.message)
            ));
            xml.push_str("  </Error>\n");
        }

        xml.push_str("</DeleteResult>");
        xml
    }
}

// ============================================================================
// CopyObject Response
// ============================================================================

/// CopyObject response
#[derive(Debug, Clone)]
pub struct CopyObjectResult {
    pub etag: String,
    pub last_modified: DateTime<Utc>,
}

impl CopyObjectResult {
    pub fn to_xml(&self) -> String {
        format!(
            r#"{XML_DECL}
<CopyObjectResult xmlns="{S3_XMLNS}">
  <ETag>{}</ETag>
  <LastModified>{}</LastModified>
</CopyObjectResult>"#,
            escape_xml(&self.etag),
            self.last_modified.format(TIMESTAMP_FMT)
        )
    }
}

// ============================================================================
// Multipart Upload Request/Response
// ============================================================================

/// Part in a CompleteMultipartUpload request
#[derive(Debug, Clone, Deserialize)]
pub struct CompletePart {
    #[serde(rename = "PartNumber")]
    pub part_number: u32,
    #[serde(rename = "ETag")]
    pub etag: Option<String>,
}

/// CompleteMultipartUpload request body. The part order given here is the
/// assembly order.
#[derive(Debug, Clone, Deserialize)]
pub struct CompleteMultipartUploadRequest {
    #[serde(rename = "Part", default)]
    pub parts: Vec<CompletePart>,
}

impl CompleteMultipartUploadRequest {
    /// Parse from XML body
    pub fn from_xml(xml: &str) -> Result<Self, quick_xml::DeError> {
        quick_xml::de::from_str(xml)
    }
}

/// InitiateMultipartUpload response
#[derive(Debug, Clone)]
pub struct InitiateMultipartUploadResult {
    pub bucket: String,
    pub key: String,
    pub upload_id: String,
}

impl InitiateMultipartUploadResult {
    pub fn to_xml(&self) -> String {
        format!(
            r#"{XML_DECL}
<InitiateMultipartUploadResult xmlns="{S3_XMLNS}">
  <Bucket>{}</Bucket>
  <Key>{}</Key>
  <UploadId>{}</UploadId>
</InitiateMultipartUploadResult>"#,
            escape_xml(&self.bucket),
            escape_xml(&self.key),
            escape_xml(&self.upload_id),
        )
    }
}

/// CompleteMultipartUpload response
#[derive(Debug, Clone)]
pub struct CompleteMultipartUploadResult {
    pub location: String,
    pub bucket: String,
    pub key: String,
    pub etag: String,
}

impl CompleteMultipartUploadResult {
    pub fn to_xml(&self) -> String {
        format!(
            r#"{XML_DECL}
<CompleteMultipartUploadResult xmlns="{S3_XMLNS}">
  <Location>{}</Location>
  <Bucket>{}</Bucket>
  <Key>{}</Key>
  <ETag>{}</ETag>
</CompleteMultipartUploadResult>"#,
            escape_xml(&self.location),
            escape_xml(&self.bucket),
            escape_xml(&self.key),
            escape_xml(&self.etag),
        )
    }
}
