//! Uploaded-file storage and the upload size/type policy.
//!
//! Every check here runs before any bytes reach the blob store.

use crate::error::{AppError, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

pub const MAX_PAPER_BYTES: usize = 10 * 1024 * 1024;
pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

const DOCUMENT_EXTENSIONS: &[&str] = &["pdf", "doc", "docx"];

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Stores `bytes` under `folder` and returns the public URL.
    async fn put(&self, folder: &str, filename: &str, bytes: Vec<u8>) -> Result<String>;

    /// Removes a blob previously returned by `put`. Missing blobs are not an
    /// error.
    async fn delete(&self, url: &str) -> Result<()>;
}

pub type BlobStoreRef = Arc<dyn BlobStore>;

pub fn generate_object_id() -> String {
    format!(
        "{}_{}",
        Utc::now().format("%Y%m%d"),
        &Uuid::new_v4().simple().to_string()[..8]
    )
}

pub fn ensure_dirs(upload_folder: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(upload_folder)
}

fn check_size(len: usize, limit: usize) -> Result<()> {
    if len == 0 {
        return Err(AppError::validation("uploaded file is empty"));
    }
    if len >= limit {
        return Err(AppError::PayloadTooLarge { size: len, limit });
    }
    Ok(())
}

fn extension(filename: &str) -> Option<String> {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

/// Full papers and revisions: PDF under 10 MB.
pub fn check_paper_upload(filename: &str, len: usize) -> Result<()> {
    check_size(len, MAX_PAPER_BYTES)?;
    if extension(filename).as_deref() != Some("pdf") {
        return Err(AppError::validation("paper must be a PDF file"));
    }
    Ok(())
}

/// Abstract documents: PDF or Word under 10 MB.
pub fn check_document_upload(filename: &str, len: usize) -> Result<()> {
    check_size(len, MAX_PAPER_BYTES)?;
    match extension(filename) {
        Some(ext) if DOCUMENT_EXTENSIONS.contains(&ext.as_str()) => Ok(()),
        _ => Err(AppError::validation(
            "abstract must be a PDF, DOC or DOCX file",
        )),
    }
}

/// Identity documents and receipt photos: images under 5 MB.
pub fn check_image_upload(filename: &str, len: usize) -> Result<()> {
    check_size(len, MAX_IMAGE_BYTES)?;
    let is_image = mime_guess::from_path(filename)
        .first()
        .map(|m| m.type_() == mime_guess::mime::IMAGE)
        .unwrap_or(false);
    if !is_image {
        return Err(AppError::validation("document must be an image file"));
    }
    Ok(())
}

fn sanitize_filename(filename: &str) -> String {
    let base = Path::new(filename)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("upload");
    base.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Files on local disk under the upload folder, served back at
/// `{public_base_url}/files/...`.
pub struct LocalBlobStore {
    root: PathBuf,
    public_base_url: String,
}

impl LocalBlobStore {
    pub fn new(root: PathBuf, public_base_url: impl Into<String>) -> Self {
        Self {
            root,
            public_base_url: public_base_url.into(),
        }
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn put(&self, folder: &str, filename: &str, bytes: Vec<u8>) -> Result<String> {
        let name = format!("{}_{}", generate_object_id(), sanitize_filename(filename));
        let dir = self.root.join(folder);
        tokio::fs::create_dir_all(&dir).await?;
        tokio::fs::write(dir.join(&name), &bytes).await?;

        tracing::debug!(folder, name = %name, size = bytes.len(), "Stored upload");
        Ok(format!("{}/files/{}/{}", self.public_base_url, folder, name))
    }

    async fn delete(&self, url: &str) -> Result<()> {
        let prefix = format!("{}/files/", self.public_base_url);
        let relative = url
            .strip_prefix(&prefix)
            .map(Path::new)
            .filter(|p| p.components().all(|c| matches!(c, Component::Normal(_))))
            .ok_or_else(|| AppError::validation(format!("{} is not a stored file", url)))?;

        match tokio::fs::remove_file(self.root.join(relative)).await {
            Ok(()) => {
                tracing::debug!(url, "Removed upload");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
