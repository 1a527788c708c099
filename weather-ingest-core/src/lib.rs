//! Core library for the `weather-ingest` pipeline.
//!
//! This crate defines:
//! - Configuration of the archive API, lookback window and locations
//! - A retrying fetcher over the historical weather archive
//! - The data contract validator for archive responses
//! - Storage sinks (local filesystem, object storage)
//! - The per-location orchestrator and the invocation adapter
//!
//! It is used by `weather-ingest-cli`, but can also be driven by other triggers.

pub mod config;
pub mod date_range;
pub mod fetch;
pub mod handler;
pub mod model;
pub mod pause;
pub mod pipeline;
pub mod storage;
pub mod validate;

pub use config::{Config, SetupError, StorageConfig, StorageKind};
pub use date_range::{Clock, DateRange, FixedClock, SystemClock};
pub use fetch::{DefinitiveFailure, ObservationSource, OpenMeteoClient, RetryPolicy, RetryingFetcher};
pub use handler::{InvocationResponse, invoke};
pub use model::{FetchRequest, Location, RawObservationPayload, RunSummary, ValidatedObservationSet};
pub use pipeline::Pipeline;
pub use storage::{Environment, StorageSink, StorageTarget};
pub use validate::{ValidationReport, Violation, validate};
