use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// Errors that can occur while persisting an image
#[derive(Error, Debug)]
pub enum ImageStoreError {
    #[error("Failed to create image directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write image {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Durable sink for finished uploads.
///
/// Called exactly once per successful upload, with the complete payload.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ImageStore: Send + Sync {
    /// Persist `data` for `laptop_id` and return the new image id.
    async fn save(
        &self,
        laptop_id: &str,
        image_type: &str,
        data: Bytes,
    ) -> Result<String, ImageStoreError>;
}

/// Image store writing one file per image: `{directory}/{image_id}{image_type}`.
pub struct DiskImageStore {
    directory: PathBuf,
}

impl DiskImageStore {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        let directory = directory.into();

        info!(directory = %directory.display(), "Disk image store initialized");

        Self { directory }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Location of a stored image
    pub fn image_path(&self, image_id: &str, image_type: &str) -> PathBuf {
        self.directory
            .join(format!("{}{}", image_id, sanitize_extension(image_type)))
    }
}

#[async_trait]
impl ImageStore for DiskImageStore {
    #[instrument(skip(self, data), fields(size_bytes = data.len()))]
    async fn save(
        &self,
        laptop_id: &str,
        image_type: &str,
        data: Bytes,
    ) -> Result<String, ImageStoreError> {
        tokio::fs::create_dir_all(&self.directory)
            .await
            .map_err(|source| ImageStoreError::CreateDir {
                path: self.directory.clone(),
                source,
            })?;

        let image_id = Uuid::new_v4().to_string();
        let path = self.image_path(&image_id, image_type);

        debug!(path = %path.display(), "Writing image to disk");

        tokio::fs::write(&path, &data)
            .await
            .map_err(|source| ImageStoreError::Write {
                path: path.clone(),
                source,
            })?;

        info!(
            image_id = %image_id,
            laptop_id = %laptop_id,
            size_bytes = data.len(),
            "Image saved"
        );

        Ok(image_id)
    }
}

/// Sanitize a client-supplied extension to prevent path traversal.
///
/// Keeps a single leading dot followed by ASCII alphanumerics; everything
/// else is replaced with `_`.
fn sanitize_extension(image_type: &str) -> String {
    let body: String = image_type
        .trim_start_matches('.')
        .chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' => c,
            _ => '_',
        })
        .collect();

    if body.is_empty() {
        String::new()
    } else {
        format!(".{}", body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_save_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskImageStore::new(dir.path().join("img"));
        let data = Bytes::from(vec![7u8; 2048]);

        let image_id = store.save("laptop-1", ".jpg", data.clone()).await.unwrap();

        let path = store.image_path(&image_id, ".jpg");
        assert!(path.ends_with(format!("{}.jpg", image_id)));
        assert_eq!(tokio::fs::read(&path).await.unwrap(), data.to_vec());
    }

    #[tokio::test]
    async fn test_each_save_gets_new_id() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskImageStore::new(dir.path());

        let a = store.save("laptop-1", ".png", Bytes::from_static(b"a")).await.unwrap();
        let b = store.save("laptop-1", ".png", Bytes::from_static(b"b")).await.unwrap();

        assert_ne!(a, b);
    }

    #[test]
    fn test_sanitize_extension() {
        assert_eq!(sanitize_extension(".jpg"), ".jpg");
        assert_eq!(sanitize_extension("png"), ".png");
        assert_eq!(sanitize_extension("./../etc"), ".____etc");
        assert_eq!(sanitize_extension(".tar/gz"), ".tar_gz");
        assert_eq!(sanitize_extension(""), "");
    }
}
