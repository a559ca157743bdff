//! Path-addressed content store over a rooted document namespace

use std::collections::HashMap;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use anyhow::Context;
use async_trait::async_trait;

use super::document::Document;
use super::path::DocPath;
use crate::error::{PatchError, Result};

/// Whether a read may be served from an intermediate cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Freshness {
    #[default]
    Cached,
    /// Bypass every cache and observe the bytes currently stored
    Revalidate,
}

/// Get/put capability over documents
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Read a document. `NotFound` when nothing is stored at `path`.
    async fn get(&self, path: &DocPath, freshness: Freshness) -> Result<Document>;

    /// Replace the document at `path` in full, creating parent directories.
    async fn put(&self, path: &DocPath, content: &str) -> Result<DocPath>;
}

/// Content store backed by a directory on the local filesystem
pub struct FsContentStore {
    root: PathBuf,
    cache: Option<Arc<Mutex<HashMap<DocPath, Document>>>>,
}

impl FsContentStore {
    /// Open a store rooted at `root`, creating the directory if needed.
    pub fn open(root: &Path, read_cache: bool) -> anyhow::Result<Self> {
        std::fs::create_dir_all(root)
            .with_context(|| format!("Failed to create workspace root: {}", root.display()))?;
        let root = root
            .canonicalize()
            .with_context(|| format!("Failed to resolve workspace root: {}", root.display()))?;

        tracing::info!("Content store rooted at: {}", root.display());

        Ok(Self {
            root,
            cache: read_cache.then(Default::default),
        })
    }

    fn cached(&self, path: &DocPath) -> Option<Document> {
        let cache = self.cache.as_ref()?;
        let cache = cache.lock().unwrap_or_else(|e| e.into_inner());
        cache.get(path).cloned()
    }

    fn remember(&self, document: &Document) {
        if let Some(cache) = &self.cache {
            let mut cache = cache.lock().unwrap_or_else(|e| e.into_inner());
            cache.insert(document.path.clone(), document.clone());
        }
    }

    fn forget(&self, path: &DocPath) {
        if let Some(cache) = &self.cache {
            let mut cache = cache.lock().unwrap_or_else(|e| e.into_inner());
            cache.remove(path);
        }
    }

    fn read_from_disk(root: &Path, path: &DocPath) -> Result<Document> {
        let full = path.resolve(root);

        let canonical = match full.canonicalize() {
            Ok(canonical) => canonical,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(PatchError::NotFound(path.to_string()))
            }
            Err(e) => return Err(io_error(path, e)),
        };
        // A symlink inside the root may still point outside it.
        if !canonical.starts_with(root) {
            return Err(PatchError::rejected(path.to_string(), "resolves outside root"));
        }
        if canonical.is_dir() {
            return Err(PatchError::NotFound(path.to_string()));
        }

        let content = std::fs::read_to_string(&canonical).map_err(|e| io_error(path, e))?;
        let last_modified = std::fs::metadata(&canonical)
            .and_then(|m| m.modified())
            .unwrap_or_else(|_| SystemTime::now());

        Ok(Document::new(path.clone(), content, last_modified))
    }

    /// The nearest existing ancestor of the target must resolve inside the root.
    fn ensure_contained(root: &Path, path: &DocPath) -> Result<()> {
        let full = path.resolve(root);
        let mut ancestor = full.parent();
        while let Some(dir) = ancestor {
            match dir.canonicalize() {
                Ok(canonical) if canonical.starts_with(root) => return Ok(()),
                Ok(_) => break,
                Err(e) if e.kind() == ErrorKind::NotFound => ancestor = dir.parent(),
                Err(e) => return Err(io_error(path, e)),
            }
        }
        Err(PatchError::rejected(path.to_string(), "resolves outside root"))
    }

    fn write_to_disk(root: &Path, path: &DocPath, content: &str) -> anyhow::Result<Document> {
        let full = path.resolve(root);
        let parent = full
            .parent()
            .with_context(|| format!("No parent directory for {}", full.display()))?;

        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        let canonical_parent = parent.canonicalize()?;
        if !canonical_parent.starts_with(root) {
            anyhow::bail!("parent directory resolves outside root");
        }
        if full.is_dir() {
            anyhow::bail!("a directory exists at {}", path);
        }

        // Readers see either the previous body or this one, never a mix.
        let mut tmp = tempfile::NamedTempFile::new_in(&canonical_parent)
            .with_context(|| format!("Failed to create temp file in {}", parent.display()))?;
        tmp.write_all(content.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&full)
            .with_context(|| format!("Failed to replace {}", full.display()))?;

        let last_modified = std::fs::metadata(&full)
            .and_then(|m| m.modified())
            .unwrap_or_else(|_| SystemTime::now());

        Ok(Document::new(path.clone(), content.to_string(), last_modified))
    }
}

#[async_trait]
impl ContentStore for FsContentStore {
    async fn get(&self, path: &DocPath, freshness: Freshness) -> Result<Document> {
        if freshness == Freshness::Cached {
            if let Some(document) = self.cached(path) {
                tracing::debug!("Cache hit: {}", path);
                return Ok(document);
            }
        }

        let root = self.root.clone();
        let owned = path.clone();
        let result = tokio::task::spawn_blocking(move || Self::read_from_disk(&root, &owned))
            .await
            .map_err(|e| io_error(path, std::io::Error::other(e)))?;

        match &result {
            Ok(document) => {
                tracing::debug!(
                    "Read document: {} [{}] ({} bytes)",
                    document.title(),
                    path,
                    document.content.len()
                );
                self.remember(document);
            }
            Err(PatchError::NotFound(_)) => self.forget(path),
            Err(_) => {}
        }
        result
    }

    async fn put(&self, path: &DocPath, content: &str) -> Result<DocPath> {
        let root = self.root.clone();
        let owned = path.clone();
        let body = content.to_string();
        let written = tokio::task::spawn_blocking(move || {
            Self::ensure_contained(&root, &owned)?;
            Self::write_to_disk(&root, &owned, &body).map_err(|e| PatchError::ApplyFailed {
                path: owned.to_string(),
                reason: format!("{e:#}"),
            })
        })
        .await
        .unwrap_or_else(|e| {
            Err(PatchError::ApplyFailed {
                path: path.to_string(),
                reason: e.to_string(),
            })
        })
        .map_err(|e| {
            tracing::error!("Failed to write {}: {}", path, e);
            self.forget(path);
            e
        })?;

        tracing::info!(
            "Saved document: {} [{}] ({} bytes)",
            written.title(),
            path,
            content.len()
        );
        self.remember(&written);
        Ok(written.path)
    }
}

fn io_error(path: &DocPath, source: std::io::Error) -> PatchError {
    PatchError::Io {
        path: path.to_string(),
        source,
    }
}
