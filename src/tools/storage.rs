//! Directory-backed artifact storage for generated media.

use super::{ArtifactStore, ToolError};
use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, instrument};
use url::Url;

/// Stores artifacts under a root directory.
///
/// URLs are `<public_base_url>/<key>` when a public base is configured
/// (for a directory served by a CDN or static file server), otherwise
/// `file://` URLs pointing at the stored file.
pub struct LocalArtifactStore {
    root: PathBuf,
    public_base_url: Option<String>,
}

impl LocalArtifactStore {
    pub fn new(root: PathBuf, public_base_url: Option<String>) -> Self {
        Self {
            root,
            public_base_url,
        }
    }

    fn resolve(&self, key: &str) -> std::result::Result<PathBuf, ToolError> {
        let relative = Path::new(key);
        let is_plain = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if key.is_empty() || !is_plain {
            return Err(ToolError::invalid_input(format!("Invalid artifact key: {}", key)));
        }
        Ok(self.root.join(relative))
    }

    fn url_for(&self, key: &str, path: &Path) -> std::result::Result<String, ToolError> {
        match &self.public_base_url {
            Some(base) => Ok(format!("{}/{}", base.trim_end_matches('/'), key)),
            None => {
                let absolute = std::path::absolute(path)
                    .map_err(|e| ToolError::unavailable(format!("Artifact path: {}", e)))?;
                Url::from_file_path(&absolute)
                    .map(|u| u.to_string())
                    .map_err(|_| ToolError::unavailable(format!("Artifact path {:?} is not absolute", absolute)))
            }
        }
    }
}

#[async_trait]
impl ArtifactStore for LocalArtifactStore {
    #[instrument(skip(self, bytes), fields(size = bytes.len()))]
    async fn put(&self, key: &str, bytes: &[u8]) -> std::result::Result<String, ToolError> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ToolError::unavailable(format!("Artifact storage: {}", e)))?;
        }
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| ToolError::unavailable(format!("Artifact storage: {}", e)))?;

        debug!("Stored artifact {:?}", path);
        self.url_for(key, &path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_writes_file_and_returns_file_url() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalArtifactStore::new(dir.path().to_path_buf(), None);

        let url = store.put("audio/clip.mp3", b"ID3").await.unwrap();
        assert!(url.starts_with("file://"));
        assert!(url.ends_with("/audio/clip.mp3"));
        assert_eq!(std::fs::read(dir.path().join("audio/clip.mp3")).unwrap(), b"ID3");
    }

    #[tokio::test]
    async fn test_public_base_url() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalArtifactStore::new(
            dir.path().to_path_buf(),
            Some("https://cdn.example.com/media/".to_string()),
        );

        let url = store.put("video/v.mp4", b"mp4").await.unwrap();
        assert_eq!(url, "https://cdn.example.com/media/video/v.mp4");
    }

    #[tokio::test]
    async fn test_rejects_escaping_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalArtifactStore::new(dir.path().to_path_buf(), None);

        assert!(store.put("../escape.mp3", b"x").await.is_err());
        assert!(store.put("/etc/passwd", b"x").await.is_err());
        assert!(store.put("", b"x").await.is_err());
    }
}
