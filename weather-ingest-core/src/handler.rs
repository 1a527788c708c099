//! Adapter between a scheduled trigger and the pipeline.
//!
//! The trigger gets a status code and a JSON body; per-location failures are
//! part of a 200 response, only setup errors and unexpected faults yield 500.

use anyhow::Result;
use chrono::{DateTime, Utc};
use log::{error, info};
use serde::Serialize;
use serde_json::{Value, json};

use crate::config::Config;
use crate::model::RunSummary;
use crate::pipeline::Pipeline;
use crate::storage::{Environment, StorageTarget};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvocationResponse {
    pub status_code: u16,
    pub body: Value,
}

impl InvocationResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }
}

/// Resolves storage, wires the pipeline and runs it once.
pub async fn invoke(config: &Config, env: &Environment, request_id: Option<&str>) -> InvocationResponse {
    info!("{}", "=".repeat(50));
    info!("Ingestion invoked");
    if let Some(id) = request_id {
        info!("Request ID: {id}");
    }
    info!("{}", "=".repeat(50));

    let outcome = run(config, env).await;
    respond(outcome, Utc::now(), request_id)
}

async fn run(config: &Config, env: &Environment) -> Result<RunSummary> {
    let target = StorageTarget::resolve(&config.storage, env)?;
    info!("Storage destination: {target}");

    let sink = target.build()?;
    let pipeline = Pipeline::from_config(config, sink)?;
    pipeline.run().await
}

pub fn respond(
    outcome: Result<RunSummary>,
    timestamp: DateTime<Utc>,
    request_id: Option<&str>,
) -> InvocationResponse {
    match outcome {
        Ok(summary) => {
            info!("Ingestion completed successfully");
            InvocationResponse {
                status_code: 200,
                body: json!({
                    "message": "Weather ingestion pipeline succeeded",
                    "timestamp": timestamp.to_rfc3339(),
                    "result": summary,
                }),
            }
        }
        Err(err) => {
            error!("Ingestion failed: {err:?}");
            let mut body = json!({
                "message": "Weather ingestion pipeline failed",
                "error": format!("{err:#}"),
                "timestamp": timestamp.to_rfc3339(),
            });
            if let Some(id) = request_id {
                body["request_id"] = json!(id);
            }
            InvocationResponse { status_code: 500, body }
        }
    }
}
