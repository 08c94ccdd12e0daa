//! File-backed discovery-document store
//!
//! Persists discovery documents as suffix-tagged JSON files
//! (`{key}.discovery.json`) under a configurable directory, backing the
//! provider's fallback path when the live download fails.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use grantwell_core::{DiscoveryDocument, DiscoveryStore};
use grantwell_domain::{AuthError, Result};
use tracing::debug;

const FILE_SUFFIX: &str = ".discovery.json";

/// [`DiscoveryStore`] persisting documents to a directory.
#[derive(Debug)]
pub struct FileDiscoveryStore {
    directory: PathBuf,
    key: String,
}

impl FileDiscoveryStore {
    /// Create a store writing `{key}.discovery.json` under `directory`.
    #[must_use]
    pub fn new(directory: impl Into<PathBuf>, key: impl Into<String>) -> Self {
        Self { directory: directory.into(), key: key.into() }
    }

    fn file_path(&self) -> PathBuf {
        self.directory.join(format!("{}{FILE_SUFFIX}", self.key))
    }

    /// The path the document is persisted at.
    #[must_use]
    pub fn path(&self) -> PathBuf {
        self.file_path()
    }
}

#[async_trait]
impl DiscoveryStore for FileDiscoveryStore {
    async fn load(&self) -> Result<Option<DiscoveryDocument>> {
        let path = self.file_path();
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(AuthError::transport(format!(
                    "failed to read discovery record {}: {err}",
                    path.display()
                )))
            }
        };

        let document = serde_json::from_str(&raw).map_err(|err| {
            AuthError::transport(format!("corrupt discovery record {}: {err}", path.display()))
        })?;

        debug!(path = %path.display(), "loaded persisted discovery document");
        Ok(Some(document))
    }

    async fn save(&self, document: &DiscoveryDocument) -> Result<()> {
        let path = self.file_path();

        if let Some(parent) = path.parent() {
            ensure_directory(parent).await?;
        }

        let raw = serde_json::to_string_pretty(document).map_err(|err| {
            AuthError::transport(format!("failed to serialize discovery document: {err}"))
        })?;

        tokio::fs::write(&path, raw).await.map_err(|err| {
            AuthError::transport(format!(
                "failed to write discovery record {}: {err}",
                path.display()
            ))
        })?;

        debug!(path = %path.display(), "persisted discovery document");
        Ok(())
    }
}

async fn ensure_directory(parent: &Path) -> Result<()> {
    tokio::fs::create_dir_all(parent).await.map_err(|err| {
        AuthError::transport(format!(
            "failed to create discovery directory {}: {err}",
            parent.display()
        ))
    })
}
