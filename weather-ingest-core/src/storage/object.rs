use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::info;
use object_store::aws::AmazonS3Builder;
use object_store::path::Path as ObjectPath;
use object_store::{ObjectStore, PutPayload};
use std::sync::Arc;

use crate::config::SetupError;
use crate::model::{Location, RawObservationPayload};

use super::{MAX_KEY_ATTEMPTS, StorageError, StorageSink, StoredRecord, partition_key};

const KEY_PREFIX: &str = "raw";

/// Writes records to a bucket under `raw/year=YYYY/...`.
#[derive(Debug, Clone)]
pub struct ObjectStorageSink {
    bucket: String,
    store: Arc<dyn ObjectStore>,
}

impl ObjectStorageSink {
    pub fn new(bucket: impl Into<String>, store: Arc<dyn ObjectStore>) -> Self {
        Self { bucket: bucket.into(), store }
    }

    /// S3 backend, credentials and region taken from the standard AWS variables.
    pub fn s3(bucket: &str) -> Result<Self, SetupError> {
        let store = AmazonS3Builder::from_env()
            .with_bucket_name(bucket)
            .build()
            .map_err(|e| SetupError::ObjectStore(e.to_string()))?;

        Ok(Self::new(bucket, Arc::new(store)))
    }

    async fn exists(&self, key: &ObjectPath) -> Result<bool, StorageError> {
        match self.store.head(key).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(source) => Err(StorageError::ObjectStore { key: key.to_string(), source }),
        }
    }
}

#[async_trait]
impl StorageSink for ObjectStorageSink {
    async fn save(
        &self,
        location: &Location,
        raw: &RawObservationPayload,
        ingested_at: DateTime<Utc>,
    ) -> Result<String, StorageError> {
        let body = StoredRecord::new(location, raw, ingested_at).to_json()?;

        let mut key = ObjectPath::from(format!("{KEY_PREFIX}/{}", partition_key(location, ingested_at, 0)));
        let mut attempt = 1;
        while self.exists(&key).await? {
            if attempt >= MAX_KEY_ATTEMPTS {
                return Err(StorageError::ObjectStore {
                    key: key.to_string(),
                    source: object_store::Error::AlreadyExists {
                        path: key.to_string(),
                        source: "no free key left".into(),
                    },
                });
            }
            key = ObjectPath::from(format!(
                "{KEY_PREFIX}/{}",
                partition_key(location, ingested_at, attempt)
            ));
            attempt += 1;
        }

        self.store
            .put(&key, PutPayload::from(body))
            .await
            .map_err(|source| StorageError::ObjectStore { key: key.to_string(), source })?;

        let uri = format!("s3://{}/{}", self.bucket, key);
        info!("Saved to object storage: {uri}");
        Ok(uri)
    }
}
