//! File store for downloaded images
//!
//! Bodies are streamed into `<id>.png.part` and renamed to `<id>.png` only once
//! fully written, so a file under its final name is always complete.

use bytes::Bytes;
use futures::{Stream, StreamExt};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Failed to create output directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Write failed for {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Body stream failed: {0}")]
    Body(String),

    #[error("Body exceeds limit of {limit} bytes")]
    TooLarge { limit: u64 },

    #[error("Empty response body")]
    EmptyBody,
}

/// Storage result type
pub type Result<T> = std::result::Result<T, StorageError>;

#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
    max_bytes: Option<u64>,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            max_bytes: None,
        }
    }

    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = Some(max_bytes);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the output directory; failure here aborts the run
    pub async fn ensure_root(&self) -> Result<()> {
        fs::create_dir_all(&self.root)
            .await
            .map_err(|source| StorageError::CreateDir {
                path: self.root.clone(),
                source,
            })
    }

    pub fn path_for(&self, id: u64) -> PathBuf {
        self.root.join(format!("{}.png", id))
    }

    fn part_path_for(&self, id: u64) -> PathBuf {
        self.root.join(format!("{}.png.part", id))
    }

    /// Stream `body` to disk for `id`, returning the number of bytes written
    pub async fn save<S, E>(&self, id: u64, body: S) -> Result<u64>
    where
        S: Stream<Item = std::result::Result<Bytes, E>> + Unpin,
        E: std::fmt::Display,
    {
        let part = self.part_path_for(id);
        match self.write_part(&part, body).await {
            Ok(size) => {
                let target = self.path_for(id);
                fs::rename(&part, &target)
                    .await
                    .map_err(|source| StorageError::Write {
                        path: target.clone(),
                        source,
                    })?;
                tracing::debug!(id, size, path = %target.display(), "Saved image");
                Ok(size)
            }
            Err(e) => {
                // Best effort, the part file is never mistaken for a result
                let _ = fs::remove_file(&part).await;
                Err(e)
            }
        }
    }

    async fn write_part<S, E>(&self, part: &Path, mut body: S) -> Result<u64>
    where
        S: Stream<Item = std::result::Result<Bytes, E>> + Unpin,
        E: std::fmt::Display,
    {
        let write_err = |source| StorageError::Write {
            path: part.to_path_buf(),
            source,
        };

        if let Some(parent) = part.parent() {
            fs::create_dir_all(parent).await.map_err(write_err)?;
        }

        let mut file = fs::File::create(part).await.map_err(write_err)?;
        let mut written: u64 = 0;

        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| StorageError::Body(e.to_string()))?;
            written += chunk.len() as u64;
            if let Some(limit) = self.max_bytes {
                if written > limit {
                    return Err(StorageError::TooLarge { limit });
                }
            }
            file.write_all(&chunk).await.map_err(write_err)?;
        }

        if written == 0 {
            return Err(StorageError::EmptyBody);
        }

        file.flush().await.map_err(write_err)?;
        file.sync_all().await.map_err(write_err)?;
        Ok(written)
    }
}
