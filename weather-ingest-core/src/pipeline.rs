//! Sequential fetch → validate → persist loop over the configured locations.
//!
//! One location's failure never stops the run: fetch exhaustion, contract
//! violations and storage write errors are all recorded in the summary and
//! the loop moves on.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::date_range::{Clock, DateRange, SystemClock};
use crate::fetch::{OpenMeteoClient, RetryPolicy, RetryingFetcher};
use crate::model::{FailureStage, FetchRequest, Location, LocationFailure, RunSummary};
use crate::pause::{Pause, TokioPause};
use crate::storage::StorageSink;
use crate::validate::validate;

/// Hourly series carry one point per hour.
pub const POINTS_PER_DAY: usize = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LocationState {
    Fetching,
    Validating,
    Persisting,
    Done,
    Failed(FailureStage),
}

impl std::fmt::Display for LocationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LocationState::Fetching => f.write_str("fetching"),
            LocationState::Validating => f.write_str("validating"),
            LocationState::Persisting => f.write_str("persisting"),
            LocationState::Done => f.write_str("done"),
            LocationState::Failed(stage) => write!(f, "failed during {stage}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSettings {
    pub history_days: i64,
    pub hourly_metrics: Vec<String>,
    pub delay_between_locations: Duration,
}

impl From<&Config> for PipelineSettings {
    fn from(config: &Config) -> Self {
        Self {
            history_days: config.data.history_days,
            hourly_metrics: config.data.hourly_metrics.clone(),
            delay_between_locations: config.api.delay_between_locations(),
        }
    }
}

#[derive(Debug)]
pub struct Pipeline {
    locations: Vec<Location>,
    settings: PipelineSettings,
    fetcher: RetryingFetcher,
    sink: Arc<dyn StorageSink>,
    clock: Arc<dyn Clock>,
    pause: Arc<dyn Pause>,
}

impl Pipeline {
    pub fn new(
        locations: Vec<Location>,
        settings: PipelineSettings,
        fetcher: RetryingFetcher,
        sink: Arc<dyn StorageSink>,
        clock: Arc<dyn Clock>,
        pause: Arc<dyn Pause>,
    ) -> Self {
        Self { locations, settings, fetcher, sink, clock, pause }
    }

    /// Production wiring: Open-Meteo client, tokio timers, system clock.
    pub fn from_config(config: &Config, sink: Arc<dyn StorageSink>) -> Result<Self> {
        config.validate()?;

        let client = OpenMeteoClient::new(config.api.url.clone(), config.api.timeout())
            .context("Failed to create weather API client")?;
        let pause: Arc<dyn Pause> = Arc::new(TokioPause);
        let fetcher = RetryingFetcher::new(
            Box::new(client),
            RetryPolicy::new(config.api.max_retries),
            pause.clone(),
        );

        Ok(Self::new(
            config.locations.clone(),
            PipelineSettings::from(config),
            fetcher,
            sink,
            Arc::new(SystemClock),
            pause,
        ))
    }

    pub async fn run(&self) -> Result<RunSummary> {
        info!("{}", "=".repeat(50));
        info!("Starting weather data ingestion pipeline");
        info!("{}", "=".repeat(50));

        let range = DateRange::from_clock(self.clock.as_ref(), self.settings.history_days)
            .context("Failed to compute the lookback window")?;
        info!("Date range: {range}");

        let run_ts = self.clock.now();
        let mut success_count = 0;
        let mut failures = Vec::new();

        for (idx, location) in self.locations.iter().enumerate() {
            info!("Processing {}, {}", location.name, location.country);

            match self.process(location, &range, run_ts).await {
                Ok(stored) => {
                    debug!("{} stored as {stored}", location.name);
                    success_count += 1;
                }
                Err(failure) => {
                    error!("Skipping {} - {} failed: {}", failure.location, failure.stage, failure.reason);
                    failures.push(failure);
                }
            }

            if idx + 1 < self.locations.len() && !self.settings.delay_between_locations.is_zero() {
                self.pause.pause(self.settings.delay_between_locations).await;
            }
        }

        let summary = self.summarize(&range, success_count, failures);
        self.log_summary(&summary);
        Ok(summary)
    }

    async fn process(
        &self,
        location: &Location,
        range: &DateRange,
        run_ts: DateTime<Utc>,
    ) -> Result<String, LocationFailure> {
        let fail = |stage: FailureStage, reason: String| {
            debug!("{}: {}", location.name, LocationState::Failed(stage));
            LocationFailure { location: location.name.clone(), stage, reason }
        };

        debug!("{}: {}", location.name, LocationState::Fetching);
        let request = FetchRequest::for_location(location, range, &self.settings.hourly_metrics);
        let raw = self
            .fetcher
            .fetch(&request)
            .await
            .map_err(|e| fail(FailureStage::Fetch, e.to_string()))?;

        debug!("{}: {}", location.name, LocationState::Validating);
        let validated = validate(&raw).map_err(|e| fail(FailureStage::Validation, e.to_string()))?;
        info!("Validated {} data points for {}", validated.hourly.len(), location.name);

        // Store the raw payload, not the typed model, so the upstream response is kept as sent.
        debug!("{}: {}", location.name, LocationState::Persisting);
        let stored = self
            .sink
            .save(location, &raw, run_ts)
            .await
            .map_err(|e| fail(FailureStage::Storage, e.to_string()))?;

        debug!("{}: {}", location.name, LocationState::Done);
        Ok(stored)
    }

    fn summarize(
        &self,
        range: &DateRange,
        success_count: usize,
        failures: Vec<LocationFailure>,
    ) -> RunSummary {
        let points_per_location = range.day_count() * POINTS_PER_DAY;

        RunSummary {
            success_count,
            failure_count: failures.len(),
            total_records: success_count * points_per_location,
            expected_records: self.locations.len() * points_per_location,
            locations_processed: self.locations.iter().map(|l| l.name.clone()).collect(),
            failures,
        }
    }

    fn log_summary(&self, summary: &RunSummary) {
        let total = self.locations.len();
        info!("{}", "=".repeat(50));
        info!("Pipeline Summary");
        info!("{}", "=".repeat(50));
        info!("Successful: {}/{total}", summary.success_count);
        info!("Failed: {}/{total}", summary.failure_count);
        info!(
            "Total records: {} (expected: {})",
            summary.total_records, summary.expected_records
        );

        if summary.failure_count > 0 {
            warn!("Some locations failed - check logs for details");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::date_range::FixedClock;
    use crate::fetch::{FetchError, ObservationSource};
    use crate::model::RawObservationPayload;
    use crate::pause::testing::RecordingPause;
    use crate::storage::testing::MemorySink;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use serde_json::json;
    use std::sync::Mutex;

    const NEW_YORK: f64 = 40.7128;
    const SINGAPORE: f64 = 1.3048;
    const TOKYO: f64 = 35.6815;

    fn payload(latitude: f64) -> RawObservationPayload {
        json!({
            "latitude": latitude,
            "longitude": 0.0,
            "generationtime_ms": 0.1,
            "utc_offset_seconds": 0,
            "timezone": "GMT",
            "timezone_abbreviation": "GMT",
            "elevation": 10.0,
            "hourly_units": {
                "time": "iso8601",
                "temperature_2m": "°C",
                "relative_humidity_2m": "%",
                "weather_code": "wmo code",
                "wind_speed_10m": "km/h",
                "precipitation": "mm"
            },
            "hourly": {
                "time": ["2024-01-01T00:00"],
                "temperature_2m": [21.0],
                "relative_humidity_2m": [80.0],
                "weather_code": [3],
                "wind_speed_10m": [5.0],
                "precipitation": [0.0]
            }
        })
    }

    #[derive(Debug, Clone, Copy, PartialEq)]
    enum Behaviour {
        Ok,
        Down,
        Invalid,
    }

    /// Answers by latitude so each location can behave differently.
    #[derive(Debug, Clone, Default)]
    struct FakeArchive {
        behaviours: Vec<(f64, Behaviour)>,
        calls: Arc<Mutex<Vec<f64>>>,
    }

    impl FakeArchive {
        fn with(behaviours: &[(f64, Behaviour)]) -> Self {
            Self { behaviours: behaviours.to_vec(), ..Self::default() }
        }

        fn calls(&self) -> Vec<f64> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ObservationSource for FakeArchive {
        async fn get(&self, request: &FetchRequest) -> Result<RawObservationPayload, FetchError> {
            self.calls.lock().unwrap().push(request.latitude);
            let behaviour = self
                .behaviours
                .iter()
                .find(|(lat, _)| *lat == request.latitude)
                .map(|(_, b)| *b)
                .unwrap_or(Behaviour::Ok);

            match behaviour {
                Behaviour::Ok => Ok(payload(request.latitude)),
                Behaviour::Down => Err(FetchError::Status { status: 502, body: "bad gateway".into() }),
                Behaviour::Invalid => {
                    let mut raw = payload(request.latitude);
                    raw["timezone"] = json!("PST");
                    Ok(raw)
                }
            }
        }
    }

    fn locations() -> Vec<Location> {
        vec![
            Location::new("New York", NEW_YORK, -74.006, "USA"),
            Location::new("Singapore", SINGAPORE, 103.8312, "Singapore"),
            Location::new("Tokyo", TOKYO, 139.7671, "Japan"),
        ]
    }

    fn pipeline(archive: &FakeArchive, sink: &MemorySink, pause: &RecordingPause) -> Pipeline {
        let _ = env_logger::builder().is_test(true).try_init();

        let pause: Arc<dyn Pause> = Arc::new(pause.clone());
        let fetcher = RetryingFetcher::new(Box::new(archive.clone()), RetryPolicy::new(3), pause.clone());
        let settings = PipelineSettings {
            history_days: 30,
            hourly_metrics: vec!["temperature_2m".into()],
            delay_between_locations: Duration::from_secs(1),
        };
        let clock = FixedClock(Utc.with_ymd_and_hms(2024, 2, 1, 6, 0, 0).unwrap());

        Pipeline::new(locations(), settings, fetcher, Arc::new(sink.clone()), Arc::new(clock), pause)
    }

    #[tokio::test]
    async fn all_locations_succeed() {
        let archive = FakeArchive::default();
        let sink = MemorySink::default();
        let pause = RecordingPause::default();

        let summary = pipeline(&archive, &sink, &pause).run().await.unwrap();

        assert_eq!(summary.success_count, 3);
        assert_eq!(summary.failure_count, 0);
        assert_eq!(summary.total_records, 3 * 31 * 24);
        assert_eq!(summary.expected_records, 3 * 31 * 24);
        assert_eq!(sink.saved_names(), vec!["New York", "Singapore", "Tokyo"]);
        // Pacing between locations only, none after the last.
        assert_eq!(pause.calls(), vec![Duration::from_secs(1); 2]);
    }

    #[tokio::test]
    async fn exhausted_fetch_is_isolated() {
        let archive = FakeArchive::with(&[(SINGAPORE, Behaviour::Down)]);
        let sink = MemorySink::default();
        let pause = RecordingPause::default();

        let summary = pipeline(&archive, &sink, &pause).run().await.unwrap();

        assert_eq!(summary.success_count, 2);
        assert_eq!(summary.failure_count, 1);
        assert_eq!(summary.total_records, 2 * 31 * 24);
        assert_eq!(summary.locations_processed, vec!["New York", "Singapore", "Tokyo"]);
        assert_eq!(sink.saved_names(), vec!["New York", "Tokyo"]);
        assert_eq!(summary.failures[0].location, "Singapore");
        assert_eq!(summary.failures[0].stage, FailureStage::Fetch);

        let singapore_calls = archive.calls().iter().filter(|l| **l == SINGAPORE).count();
        assert_eq!(singapore_calls, 3);
        // Two backoffs for Singapore plus pacing after New York and Singapore.
        assert_eq!(
            pause.calls(),
            vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4),
                Duration::from_secs(1),
            ]
        );
    }

    #[tokio::test]
    async fn invalid_payload_is_not_stored_or_retried() {
        let archive = FakeArchive::with(&[(NEW_YORK, Behaviour::Invalid)]);
        let sink = MemorySink::default();
        let pause = RecordingPause::default();

        let summary = pipeline(&archive, &sink, &pause).run().await.unwrap();

        assert_eq!(summary.success_count, 2);
        assert_eq!(summary.failures[0].stage, FailureStage::Validation);
        assert!(summary.failures[0].reason.contains("Expected GMT, but got PST"));
        assert_eq!(sink.saved_names(), vec!["Singapore", "Tokyo"]);
        assert_eq!(archive.calls().iter().filter(|l| **l == NEW_YORK).count(), 1);
    }

    #[tokio::test]
    async fn storage_failure_counts_against_location_only() {
        let archive = FakeArchive::default();
        let sink = MemorySink::failing_for("Tokyo");
        let pause = RecordingPause::default();

        let summary = pipeline(&archive, &sink, &pause).run().await.unwrap();

        assert_eq!(summary.success_count, 2);
        assert_eq!(summary.failure_count, 1);
        assert_eq!(summary.failures[0].stage, FailureStage::Storage);
        assert!(summary.failures[0].reason.contains("disk full"));
    }

    #[tokio::test]
    async fn raw_payload_is_what_gets_stored() {
        let archive = FakeArchive::default();
        let sink = MemorySink::default();
        let pause = RecordingPause::default();

        pipeline(&archive, &sink, &pause).run().await.unwrap();

        let saved = sink.saved();
        assert_eq!(saved[0].1, payload(NEW_YORK));
    }

    #[tokio::test]
    async fn negative_lookback_escapes_as_error() {
        let archive = FakeArchive::default();
        let sink = MemorySink::default();
        let pause = RecordingPause::default();

        let mut p = pipeline(&archive, &sink, &pause);
        p.settings.history_days = -1;

        let err = p.run().await.unwrap_err();
        assert!(format!("{err:#}").contains("non-negative"));
        assert!(archive.calls().is_empty());
    }
}
