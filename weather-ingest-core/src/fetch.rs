use crate::model::{FetchRequest, RawObservationPayload};
use async_trait::async_trait;
use std::fmt::Debug;
use thiserror::Error;

pub mod openmeteo;
pub mod retry;

pub use openmeteo::OpenMeteoClient;
pub use retry::{DefinitiveFailure, RetryPolicy, RetryingFetcher};

/// A single failed attempt. Every variant is treated as retryable.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("Request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Upstream returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Failed to decode response body as JSON: {0}")]
    Decode(String),
}

/// One GET against the weather archive, no retries.
#[async_trait]
pub trait ObservationSource: Send + Sync + Debug {
    async fn get(&self, request: &FetchRequest) -> Result<RawObservationPayload, FetchError>;
}

pub(crate) fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    match body.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}
