use async_trait::async_trait;
use log::{error, info};
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use thiserror::Error;

/// Directory (under the media root) post images are written to.
pub const POST_IMAGE_DIR: &str = "posts";

#[derive(Debug, Error)]
pub enum ImageStoreError {
    #[error("duplicate")]
    Duplicate,
    #[error("not_found")]
    NotFound,
    #[error("invalid name")]
    InvalidName,
    #[error("other: {0}")]
    Other(String),
}

#[async_trait]
pub trait ImageStore: Send + Sync {
    /// Writes `bytes` under `name`; `Duplicate` when the name is taken.
    async fn save(&self, name: &str, bytes: &[u8]) -> Result<(), ImageStoreError>;
    /// Returns the bytes and their sniffed MIME type.
    async fn load(&self, name: &str) -> Result<(Vec<u8>, String), ImageStoreError>;
    async fn delete(&self, name: &str) -> Result<(), ImageStoreError>;
}

/// Content-addressed name for a post image: `posts/<sha256>.<ext>`.
pub fn image_name(bytes: &[u8], extension: &str) -> String {
    let hash = Sha256::digest(bytes);
    format!("{POST_IMAGE_DIR}/{hash:x}.{extension}")
}

/// Rejects anything that could step outside the media root.
fn valid_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('/')
        && name.split('/').all(|seg| !seg.is_empty() && seg != "." && seg != "..")
        && name.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '/' | '.' | '_' | '-'))
}

// ---------------- Filesystem implementation (MEDIA_ROOT) ----------------
pub struct FsImageStore {
    root: PathBuf,
}

impl FsImageStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        info!("image store rooted at '{}'", root.display());
        Self { root }
    }

    fn path_for(&self, name: &str) -> Result<PathBuf, ImageStoreError> {
        if !valid_name(name) {
            return Err(ImageStoreError::InvalidName);
        }
        Ok(self.root.join(name))
    }
}

#[async_trait]
impl ImageStore for FsImageStore {
    async fn save(&self, name: &str, bytes: &[u8]) -> Result<(), ImageStoreError> {
        let path = self.path_for(name)?;
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Err(ImageStoreError::Duplicate);
        }
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir).await.map_err(|e| {
                error!("create_dir_all failed for '{}': {e}", dir.display());
                ImageStoreError::Other(e.to_string())
            })?;
        }
        tokio::fs::write(&path, bytes).await.map_err(|e| {
            error!("write failed for '{}': {e}", path.display());
            ImageStoreError::Other(e.to_string())
        })
    }

    async fn load(&self, name: &str) -> Result<(Vec<u8>, String), ImageStoreError> {
        let path = self.path_for(name)?;
        let bytes = match tokio::fs::read(&path).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(ImageStoreError::NotFound),
            Err(e) => return Err(ImageStoreError::Other(e.to_string())),
        };
        let mime = infer::get(&bytes)
            .map(|t| t.mime_type().to_string())
            .unwrap_or_else(|| "application/octet-stream".into());
        Ok((bytes, mime))
    }

    async fn delete(&self, name: &str) -> Result<(), ImageStoreError> {
        let path = self.path_for(name)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(ImageStoreError::NotFound),
            Err(e) => {
                error!("remove failed for '{}': {e}", path.display());
                Err(ImageStoreError::Other(e.to_string()))
            }
        }
    }
}
