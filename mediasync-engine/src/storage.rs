use crate::config::Config;
use crate::error::{AppError, Result};
use crate::s3::S3Storage;
use async_trait::async_trait;
use mediasync_core::BackendTag;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tokio::fs;

/// A storage backend a record's file field can resolve through.
///
/// `save` stores bytes under a relative name and returns the name the
/// backend actually stored, which becomes the record's new file
/// reference.
#[async_trait]
pub trait MediaStorage: Send + Sync {
    /// Identity tag used for the default-backend precondition check.
    fn tag(&self) -> BackendTag;

    async fn save(&self, name: &str, content_type: Option<&str>, data: Vec<u8>) -> Result<String>;

    async fn delete(&self, name: &str) -> Result<()>;

    async fn exists(&self, name: &str) -> Result<bool>;

    /// Public URL for a stored name.
    fn url(&self, name: &str) -> String;
}

/// Build the configured destination backend.
pub async fn from_config(config: &Config) -> Result<Arc<dyn MediaStorage>> {
    match config.storage_backend {
        BackendTag::Local => Ok(Arc::new(LocalStorage::new(
            &config.media_root,
            &config.media_url,
        ))),
        BackendTag::S3 => {
            let storage = S3Storage::new(
                config.s3_bucket.clone(),
                config.s3_region.clone(),
                config.s3_endpoint_url.clone(),
                config.s3_key_prefix.clone(),
            )
            .await?;
            Ok(Arc::new(storage))
        }
    }
}

/// Local filesystem storage rooted at the media directory
#[derive(Clone)]
pub struct LocalStorage {
    media_root: PathBuf,
    base_url: String,
}

impl LocalStorage {
    /// Create a new local storage instance
    pub fn new(media_root: impl AsRef<Path>, base_url: &str) -> Self {
        Self {
            media_root: media_root.as_ref().to_path_buf(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Initialize the media directory
    pub async fn init(&self) -> Result<()> {
        if !self.media_root.exists() {
            fs::create_dir_all(&self.media_root).await.map_err(|e| {
                AppError::StorageError(format!("Failed to create media directory: {}", e))
            })?;
            tracing::info!("📁 Created media directory: {}", self.media_root.display());
        }
        Ok(())
    }

    /// Resolve a relative file name against the media root.
    ///
    /// File names come from database rows; absolute names and names
    /// that escape the root are rejected.
    pub fn path(&self, name: &str) -> Result<PathBuf> {
        let relative = Path::new(name);
        if relative.is_absolute()
            || relative
                .components()
                .any(|c| matches!(c, Component::ParentDir))
        {
            return Err(AppError::StorageError(format!(
                "Refusing to resolve file name outside media root: {}",
                name
            )));
        }
        Ok(self.media_root.join(relative))
    }

    /// Clean up empty parent directories after file deletion
    fn cleanup_empty_dirs<'a>(
        &'a self,
        file_path: &'a Path,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send + 'a>> {
        Box::pin(async move {
            if let Some(parent) = file_path.parent() {
                // Only clean up directories within the media root
                if parent.starts_with(&self.media_root) && parent != self.media_root {
                    if let Ok(mut entries) = fs::read_dir(parent).await {
                        if entries.next_entry().await.unwrap_or(None).is_none()
                            && fs::remove_dir(parent).await.is_ok()
                        {
                            tracing::debug!(
                                "🧹 Cleaned up empty directory: {}",
                                parent.display()
                            );
                            Box::pin(self.cleanup_empty_dirs(parent)).await;
                        }
                    }
                }
            }
        })
    }
}

#[async_trait]
impl MediaStorage for LocalStorage {
    fn tag(&self) -> BackendTag {
        BackendTag::Local
    }

    async fn save(&self, name: &str, _content_type: Option<&str>, data: Vec<u8>) -> Result<String> {
        let file_path = self.path(name)?;

        if let Some(parent) = file_path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                AppError::StorageError(format!("Failed to create directory: {}", e))
            })?;
        }

        fs::write(&file_path, &data)
            .await
            .map_err(|e| AppError::StorageError(format!("Failed to write file: {}", e)))?;

        tracing::debug!("💾 Stored file: {} ({} bytes)", name, data.len());
        Ok(name.to_string())
    }

    async fn delete(&self, name: &str) -> Result<()> {
        let file_path = self.path(name)?;

        match fs::remove_file(&file_path).await {
            Ok(_) => {
                tracing::debug!("🗑️  Deleted file: {}", name);
                self.cleanup_empty_dirs(&file_path).await;
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // File already doesn't exist, that's fine
                Ok(())
            }
            Err(e) => Err(AppError::StorageError(format!(
                "Failed to delete file: {}",
                e
            ))),
        }
    }

    async fn exists(&self, name: &str) -> Result<bool> {
        Ok(self.path(name)?.exists())
    }

    fn url(&self, name: &str) -> String {
        format!("{}/{}", self.base_url, name)
    }
}
