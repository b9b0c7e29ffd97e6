//! AWS chunked transfer encoding decoder
//!
//! When an AWS SDK signs with STREAMING-AWS4-HMAC-SHA256-PAYLOAD, the body
//! is framed in AWS's own chunked format (distinct from HTTP/1.1 chunked):
//!
//! ```text
//! <hex-chunk-size>;chunk-signature=<signature>\r\n
//! <chunk-data>\r\n
//! ...
//! 0;chunk-signature=<signature>\r\n
//! ```
//!
//! The decoder wraps the request body stream and yields only the raw
//! payload bytes, so the storage engine never sees framing. Chunk
//! signatures are parsed but not re-verified; the SigV4 seed signature
//! authenticates the stream.

use crate::storage::BodyStream;
use axum::http::HeaderMap;
use bytes::{Buf, Bytes, BytesMut};
use futures::stream;
use futures::StreamExt;

/// A frame header past this length cannot be legitimate.
const MAX_CHUNK_HEADER_LEN: usize = 8 * 1024;

/// Check if the request body uses AWS chunked encoding.
pub fn is_aws_chunked(headers: &HeaderMap) -> bool {
    let streaming_sha = headers
        .get("x-amz-content-sha256")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.starts_with("STREAMING-"))
        .unwrap_or(false);
    let chunked_encoding = headers
        .get("content-encoding")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(',').any(|enc| enc.trim() == "aws-chunked"))
        .unwrap_or(false);
    streaming_sha || chunked_encoding
}

/// The decoded payload length the client claims, if any.
pub fn decoded_content_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get("x-amz-decoded-content-length")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
}

/// Wrap `inner` so that only de-framed payload bytes come out. Malformed
/// framing surfaces as an `InvalidData` I/O error, which aborts the write
/// downstream without committing anything.
pub fn decode_stream(inner: BodyStream) -> BodyStream {
    let decoder = Decoder {
        inner,
        buf: BytesMut::new(),
        finished: false,
        failed: false,
    };
    Box::pin(stream::unfold(decoder, |mut decoder| async move {
        if decoder.failed {
            return None;
        }
        match decoder.next_payload().await {
            Ok(Some(data)) => Some((Ok(data), decoder)),
            Ok(None) => None,
            Err(err) => {
                decoder.failed = true;
                Some((Err(err), decoder))
            }
        }
    }))
}

struct Decoder {
    inner: BodyStream,
    buf: BytesMut,
    finished: bool,
    failed: bool,
}

impl Decoder {
    /// Pull one chunk from the inner stream into the buffer.
    /// Returns false at EOF.
    async fn fill(&mut self) -> std::io::Result<bool> {
        match self.inner.next().await {
            Some(chunk) => {
                self.buf.extend_from_slice(&chunk?);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Read up to and including a CRLF; returns the line without it.
    async fn read_header_line(&mut self) -> std::io::Result<String> {
        loop {
            if let Some(pos) = find_crlf(&self.buf) {
                let line = self.buf.split_to(pos);
                self.buf.advance(2);
                return Ok(String::from_utf8_lossy(&line).into_owned());
            }
            if self.buf.len() > MAX_CHUNK_HEADER_LEN {
                return Err(malformed("chunk header too long"));
            }
            if !self.fill().await? {
                return Err(malformed("unexpected end of chunked body"));
            }
        }
    }

    async fn read_exact(&mut self, len: usize) -> std::io::Result<Bytes> {
        while self.buf.len() < len {
            if !self.fill().await? {
                return Err(malformed("chunk shorter than its declared size"));
            }
        }
        Ok(self.buf.split_to(len).freeze())
    }

    async fn consume_crlf(&mut self) -> std::io::Result<()> {
        while self.buf.len() < 2 {
            if !self.fill().await? {
                return Err(malformed("missing chunk trailer"));
            }
        }
        if &self.buf[..2] != b"\r\n" {
            return Err(malformed("chunk data not followed by CRLF"));
        }
        self.buf.advance(2);
        Ok(())
    }

    /// The next decoded payload chunk, or None once the zero-size chunk
    /// has been seen.
    async fn next_payload(&mut self) -> std::io::Result<Option<Bytes>> {
        if self.finished {
            return Ok(None);
        }
        let header = self.read_header_line().await?;
        let size_hex = header.split(';').next().unwrap_or("").trim();
        let size =
            usize::from_str_radix(size_hex, 16).map_err(|_| malformed("invalid chunk size"))?;
        if size == 0 {
            // Trailing checksum headers, if any, are ignored.
            self.finished = true;
            return Ok(None);
        }
        let data = self.read_exact(size).await?;
        self.consume_crlf().await?;
        Ok(Some(data))
    }
}

/// Find the position of \r\n in a byte slice
fn find_crlf(data: &[u8]) -> Option<usize> {
    data.windows(2).position(|w| w == b"\r\n")
}

fn malformed(msg: &str) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::InvalidData, format!("aws-chunked: {msg}"))
}
