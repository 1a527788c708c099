use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

use crate::model::{FetchRequest, RawObservationPayload};

use super::{FetchError, ObservationSource, truncate_body};

/// Client for the Open-Meteo historical archive endpoint.
#[derive(Debug, Clone)]
pub struct OpenMeteoClient {
    endpoint: String,
    http: Client,
}

impl OpenMeteoClient {
    /// `timeout` bounds each individual request, not the whole retry loop.
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, FetchError> {
        let http = Client::builder().timeout(timeout).build().map_err(FetchError::Client)?;

        Ok(Self { endpoint: endpoint.into(), http })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl ObservationSource for OpenMeteoClient {
    async fn get(&self, request: &FetchRequest) -> Result<RawObservationPayload, FetchError> {
        let res = self
            .http
            .get(&self.endpoint)
            .query(&request.query_pairs())
            .send()
            .await
            .map_err(|source| FetchError::Transport { url: self.endpoint.clone(), source })?;

        let status = res.status();
        let body = res
            .text()
            .await
            .map_err(|source| FetchError::Transport { url: self.endpoint.clone(), source })?;

        if !status.is_success() {
            return Err(FetchError::Status { status: status.as_u16(), body: truncate_body(&body) });
        }

        serde_json::from_str(&body).map_err(|e| FetchError::Decode(e.to_string()))
    }
}
