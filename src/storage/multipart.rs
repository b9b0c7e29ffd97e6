//! Disk-staged multipart uploads.
//!
//! Each upload lives in `<bucket>/.geckos3-multipart/<uploadId>/` with a
//! `manifest.json` pinning the target key and content type, and one
//! `part-<NNNNN>.tmp` file per uploaded part. Parts arrive in any order;
//! only the part list passed to Complete defines assembly order.

use super::fs::{is_dir, scratch_file_name, FsStore};
use super::traits::{BodyStream, StorageError};
use crate::types::{ObjectMetadata, PutObjectInput};
use md5::{Digest, Md5};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, warn};

const MANIFEST_FILE: &str = "manifest.json";

/// Pins what a staged upload will become on Complete.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadManifest {
    key: String,
    #[serde(default)]
    content_type: String,
}

/// `part-00001.tmp` style staged part name.
fn part_file_name(part_number: u32) -> String {
    format!("part-{part_number:05}.tmp")
}

/// A fresh `.part-tmp-*` spool name inside an upload's staging dir.
fn part_tmp_name() -> String {
    let mut raw = [0u8; 8];
    rand::rngs::OsRng.fill_bytes(&mut raw);
    format!(".part-tmp-{}", hex::encode(raw))
}

/// 16 bytes from the OS CSPRNG, hex-encoded to the 32-char wire form.
fn new_upload_id() -> String {
    let mut raw = [0u8; 16];
    rand::rngs::OsRng.fill_bytes(&mut raw);
    hex::encode(raw)
}

fn valid_part_number(part_number: u32) -> Result<(), StorageError> {
    if !(1..=10_000).contains(&part_number) {
        return Err(StorageError::InvalidArgument(format!(
            "part number must be between 1 and 10000, got {part_number}"
        )));
    }
    Ok(())
}

impl FsStore {
    pub(super) async fn mp_create(
        &self,
        bucket: &str,
        key: &str,
        content_type: Option<String>,
    ) -> Result<String, StorageError> {
        self.require_bucket(bucket).await?;
        // Resolve the key now so a Complete later can never be aimed
        // outside the bucket.
        self.paths.object_path(bucket, key)?;

        let upload_id = new_upload_id();
        let dir = self.paths.upload_dir(bucket, &upload_id)?;
        fs::create_dir_all(&dir).await?;

        let manifest = UploadManifest {
            key: key.to_string(),
            content_type: content_type.unwrap_or_default(),
        };
        let data = serde_json::to_vec_pretty(&manifest)?;
        let manifest_path = dir.join(MANIFEST_FILE);
        let staging = dir.clone();
        tokio::task::spawn_blocking(move || -> Result<(), StorageError> {
            let mut tmp = NamedTempFile::new_in(&staging)?;
            tmp.write_all(&data)?;
            tmp.persist(&manifest_path)
                .map_err(|e| StorageError::Io(e.error))?;
            Ok(())
        })
        .await
        .map_err(|e| StorageError::Other(format!("spawn_blocking join failed: {e}")))??;

        debug!("Created multipart upload {} for {}/{}", upload_id, bucket, key);
        Ok(upload_id)
    }

    /// Load the staging dir and manifest for an upload, checking that the
    /// request's key matches what the upload was initiated for.
    async fn mp_open(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
    ) -> Result<(PathBuf, UploadManifest), StorageError> {
        let dir = self.paths.upload_dir(bucket, upload_id)?;
        if !is_dir(&dir).await {
            return Err(StorageError::UploadNotFound(upload_id.to_string()));
        }
        let data = match fs::read(dir.join(MANIFEST_FILE)).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::UploadNotFound(upload_id.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        let manifest: UploadManifest = serde_json::from_slice(&data)?;
        if manifest.key != key {
            return Err(StorageError::UploadNotFound(upload_id.to_string()));
        }
        Ok((dir, manifest))
    }

    pub(super) async fn mp_upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: u32,
        body: BodyStream,
        expected_sha256: Option<String>,
    ) -> Result<String, StorageError> {
        valid_part_number(part_number)?;
        let (dir, _manifest) = self.mp_open(bucket, key, upload_id).await?;

        // Spool and verify before renaming into place, so a part that
        // fails its digest never replaces a previously good one.
        let tmp = dir.join(part_tmp_name());
        let spooled = self
            .spool(&tmp, body, expected_sha256.as_deref(), None)
            .await?;

        let part_path = dir.join(part_file_name(part_number));
        if let Err(err) = fs::rename(&tmp, &part_path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(err.into());
        }

        debug!(
            "Staged part {} ({} bytes) for upload {}",
            part_number, spooled.size, upload_id
        );
        Ok(format!("\"{}\"", spooled.md5_hex))
    }

    pub(super) async fn mp_complete(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_numbers: &[u32],
    ) -> Result<ObjectMetadata, StorageError> {
        if part_numbers.is_empty() {
            return Err(StorageError::InvalidArgument(
                "you must specify at least one part".to_string(),
            ));
        }
        for &n in part_numbers {
            valid_part_number(n)?;
        }

        let (dir, manifest) = self.mp_open(bucket, key, upload_id).await?;
        let target = self.paths.object_path(bucket, key)?;
        let scratch = self.paths.scratch_dir(bucket)?;
        fs::create_dir_all(&scratch).await?;
        let tmp = scratch.join(scratch_file_name());

        let (size, md5_hex) = match self.mp_assemble(&tmp, &dir, part_numbers).await {
            Ok(result) => result,
            Err(err) => {
                let _ = fs::remove_file(&tmp).await;
                return Err(err);
            }
        };
        self.commit(&tmp, &target).await?;

        let input = PutObjectInput {
            content_type: Some(manifest.content_type).filter(|ct| !ct.is_empty()),
            ..Default::default()
        };
        let etag = format!("\"{}-{}\"", md5_hex, part_numbers.len());
        let metadata = Self::build_metadata(size, etag, &input);
        self.store_sidecar(bucket, key, &metadata).await;

        if let Err(err) = fs::remove_dir_all(&dir).await {
            // The object is committed; the GC will reap the leftovers.
            warn!("Failed to remove staging dir for {}: {}", upload_id, err);
        }

        debug!(
            "Completed multipart upload {} -> {}/{} ({} parts, {} bytes)",
            upload_id,
            bucket,
            key,
            part_numbers.len(),
            size
        );
        Ok(metadata)
    }

    /// Concatenate the named parts into `tmp` in the order given, with a
    /// running MD5 over the assembled content.
    async fn mp_assemble(
        &self,
        tmp: &Path,
        upload_dir: &Path,
        part_numbers: &[u32],
    ) -> Result<(u64, String), StorageError> {
        let mut out = fs::File::create(tmp).await?;
        let mut md5 = Md5::new();
        let mut size: u64 = 0;
        let mut buf = vec![0u8; 64 * 1024];

        for &n in part_numbers {
            let part_path = upload_dir.join(part_file_name(n));
            let mut part = match fs::File::open(&part_path).await {
                Ok(file) => file,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    return Err(StorageError::PartNotFound(n))
                }
                Err(e) => return Err(e.into()),
            };
            loop {
                let read = part.read(&mut buf).await?;
                if read == 0 {
                    break;
                }
                md5.update(&buf[..read]);
                out.write_all(&buf[..read]).await?;
                size += read as u64;
            }
        }
        out.flush().await?;
        if self.fsync {
            out.sync_all().await?;
        }
        Ok((size, hex::encode(md5.finalize())))
    }

    pub(super) async fn mp_abort(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
    ) -> Result<(), StorageError> {
        let (dir, _manifest) = self.mp_open(bucket, key, upload_id).await?;
        fs::remove_dir_all(&dir).await?;
        debug!("Aborted multipart upload {} for {}/{}", upload_id, bucket, key);
        Ok(())
    }
}
