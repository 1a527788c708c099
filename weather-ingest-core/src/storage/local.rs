use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::info;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;

use crate::model::{Location, RawObservationPayload};

use super::{MAX_KEY_ATTEMPTS, StorageError, StorageSink, StoredRecord, partition_key};

/// Writes records under a root directory, e.g. `data/raw/year=2026/...`.
#[derive(Debug, Clone)]
pub struct LocalFileSink {
    root: PathBuf,
}

impl LocalFileSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

fn io_error(path: &Path, source: std::io::Error) -> StorageError {
    StorageError::Io { path: path.display().to_string(), source }
}

#[async_trait]
impl StorageSink for LocalFileSink {
    async fn save(
        &self,
        location: &Location,
        raw: &RawObservationPayload,
        ingested_at: DateTime<Utc>,
    ) -> Result<String, StorageError> {
        let body = StoredRecord::new(location, raw, ingested_at).to_json()?;

        for attempt in 0..MAX_KEY_ATTEMPTS {
            let path = self.root.join(partition_key(location, ingested_at, attempt));
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).await.map_err(|e| io_error(parent, e))?;
            }

            // create_new refuses to clobber an artifact from an earlier save.
            let mut file = match OpenOptions::new().write(true).create_new(true).open(&path).await {
                Ok(file) => file,
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(io_error(&path, e)),
            };

            file.write_all(&body).await.map_err(|e| io_error(&path, e))?;
            file.flush().await.map_err(|e| io_error(&path, e))?;

            info!("Saved locally to {}", path.display());
            return Ok(path.display().to_string());
        }

        let path = self.root.join(partition_key(location, ingested_at, 0));
        Err(io_error(&path, std::io::Error::new(ErrorKind::AlreadyExists, "no free key left")))
    }
}
