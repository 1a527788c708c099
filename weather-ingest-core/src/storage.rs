//! Persistence of raw payloads with provenance metadata.
//!
//! Keys are partitioned by ingestion date:
//! `year=YYYY/month=MM/day=DD/<location>_<YYYYMMDD>_<HHMMSS>.json`.
//! The destination is chosen once at startup, see [`StorageTarget::resolve`].

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Utc};
use serde::Serialize;
use std::fmt::Debug;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

use crate::config::{SetupError, StorageConfig, StorageKind};
use crate::model::{Location, RawObservationPayload};

pub mod local;
pub mod object;

pub use local::LocalFileSink;
pub use object::ObjectStorageSink;

/// Presence of this variable marks a deployed (serverless) environment.
pub const DEPLOYMENT_MARKER_VAR: &str = "AWS_LAMBDA_FUNCTION_NAME";
/// Bucket name used when the config file does not set one.
pub const BUCKET_VAR: &str = "S3_BUCKET_NAME";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Failed to write {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize stored record: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Object store error for {key}: {source}")]
    ObjectStore {
        key: String,
        #[source]
        source: object_store::Error,
    },
}

#[async_trait]
pub trait StorageSink: Send + Sync + Debug {
    /// Stores the payload and returns an identifier for the artifact.
    async fn save(
        &self,
        location: &Location,
        raw: &RawObservationPayload,
        ingested_at: DateTime<Utc>,
    ) -> Result<String, StorageError>;
}

/// Body written for each successful location.
#[derive(Debug, Serialize)]
pub struct StoredRecord<'a> {
    pub ingested_at: String,
    pub location: &'a str,
    pub latitude: f64,
    pub longitude: f64,
    pub country: &'a str,
    pub raw_response: &'a RawObservationPayload,
}

impl<'a> StoredRecord<'a> {
    pub fn new(location: &'a Location, raw: &'a RawObservationPayload, ingested_at: DateTime<Utc>) -> Self {
        Self {
            ingested_at: ingested_at.to_rfc3339(),
            location: &location.name,
            latitude: location.latitude,
            longitude: location.longitude,
            country: &location.country,
            raw_response: raw,
        }
    }

    pub fn to_json(&self) -> Result<Vec<u8>, StorageError> {
        Ok(serde_json::to_vec_pretty(self)?)
    }
}

/// Relative key for an artifact. `attempt > 0` adds a suffix so that a
/// second save with the same location and timestamp never overwrites.
pub fn partition_key(location: &Location, ingested_at: DateTime<Utc>, attempt: u32) -> String {
    let suffix = if attempt == 0 { String::new() } else { format!("_{attempt}") };
    format!(
        "year={}/month={:02}/day={:02}/{}_{}{}.json",
        ingested_at.year(),
        ingested_at.month(),
        ingested_at.day(),
        location.normalized_name(),
        ingested_at.format("%Y%m%d_%H%M%S"),
        suffix,
    )
}

/// Upper bound on collision suffixes tried before giving up.
pub(crate) const MAX_KEY_ATTEMPTS: u32 = 1000;

/// Process environment relevant to storage, captured once at startup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment {
    pub deployment_marker: Option<String>,
    pub bucket: Option<String>,
}

impl Environment {
    pub fn capture() -> Self {
        Self {
            deployment_marker: std::env::var(DEPLOYMENT_MARKER_VAR).ok(),
            bucket: std::env::var(BUCKET_VAR).ok().filter(|b| !b.trim().is_empty()),
        }
    }

    pub fn is_deployed(&self) -> bool {
        self.deployment_marker.is_some()
    }
}

/// Concrete destination after configuration and environment are combined.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageTarget {
    Local { root: PathBuf },
    Object { bucket: String },
}

impl StorageTarget {
    pub fn resolve(config: &StorageConfig, env: &Environment) -> Result<Self, SetupError> {
        let use_object = match config.kind {
            StorageKind::Local => false,
            StorageKind::Object => true,
            StorageKind::Auto => env.is_deployed(),
        };

        if !use_object {
            return Ok(StorageTarget::Local { root: config.raw_data_path.clone() });
        }

        let bucket = config
            .bucket
            .clone()
            .filter(|b| !b.trim().is_empty())
            .or_else(|| env.bucket.clone())
            .ok_or(SetupError::MissingBucket)?;

        Ok(StorageTarget::Object { bucket })
    }

    pub fn build(&self) -> Result<Arc<dyn StorageSink>, SetupError> {
        match self {
            StorageTarget::Local { root } => Ok(Arc::new(LocalFileSink::new(root.clone()))),
            StorageTarget::Object { bucket } => Ok(Arc::new(ObjectStorageSink::s3(bucket)?)),
        }
    }
}

impl std::fmt::Display for StorageTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageTarget::Local { root } => write!(f, "local directory {}", root.display()),
            StorageTarget::Object { bucket } => write!(f, "object storage bucket {bucket}"),
        }
    }
}
