use log::{error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::model::{FetchRequest, RawObservationPayload};
use crate::pause::Pause;

use super::ObservationSource;

/// All attempts were used up. Carries no payload; callers must not retry.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("All {attempts} attempts failed, last error: {last_error}")]
pub struct DefinitiveFailure {
    pub attempts: u32,
    pub last_error: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Backoff after attempt `n` fails is `backoff_unit * 2^n`.
    pub backoff_unit: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self { max_attempts: max_attempts.max(1), backoff_unit: Duration::from_secs(1) }
    }

    pub fn backoff(&self, attempt: u32) -> Duration {
        self.backoff_unit.checked_mul(2u32.saturating_pow(attempt)).unwrap_or(Duration::MAX)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3)
    }
}

#[derive(Debug)]
pub struct RetryingFetcher {
    source: Box<dyn ObservationSource>,
    policy: RetryPolicy,
    pause: Arc<dyn Pause>,
}

impl RetryingFetcher {
    pub fn new(source: Box<dyn ObservationSource>, policy: RetryPolicy, pause: Arc<dyn Pause>) -> Self {
        Self { source, policy, pause }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    pub async fn fetch(&self, request: &FetchRequest) -> Result<RawObservationPayload, DefinitiveFailure> {
        let max = self.policy.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match self.source.get(request).await {
                Ok(payload) => {
                    if attempt > 1 {
                        info!("Attempt {attempt}/{max} succeeded");
                    }
                    return Ok(payload);
                }
                Err(err) => {
                    warn!("Attempt {attempt}/{max} failed: {err}");

                    if attempt >= max {
                        error!(
                            "CRITICAL: all {max} attempts failed for ({}, {})",
                            request.latitude, request.longitude
                        );
                        return Err(DefinitiveFailure { attempts: attempt, last_error: err.to_string() });
                    }

                    let wait = self.policy.backoff(attempt);
                    info!("   Retrying in {} seconds...", wait.as_secs_f64());
                    self.pause.pause(wait).await;
                    attempt += 1;
                }
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::ScriptedSource;
    use super::*;
    use crate::pause::testing::RecordingPause;
    use serde_json::json;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request() -> FetchRequest {
        FetchRequest {
            latitude: 40.7128,
            longitude: -74.006,
            start_date: "2024-01-01".into(),
            end_date: "2024-01-31".into(),
            hourly: vec!["temperature_2m".into()],
            timezone: "GMT".into(),
        }
    }

    fn fetcher(source: &ScriptedSource, pause: &RecordingPause, max_attempts: u32) -> RetryingFetcher {
        RetryingFetcher::new(
            Box::new(source.clone()),
            RetryPolicy::new(max_attempts),
            Arc::new(pause.clone()),
        )
    }

    #[test]
    fn backoff_doubles_per_attempt() {
        let policy = RetryPolicy::new(5);
        let secs: Vec<u64> = (1..=4).map(|a| policy.backoff(a).as_secs()).collect();
        assert_eq!(secs, vec![2, 4, 8, 16]);
    }

    #[test]
    fn zero_attempts_is_clamped_to_one() {
        assert_eq!(RetryPolicy::new(0).max_attempts, 1);
    }

    #[tokio::test]
    async fn first_success_returns_without_pausing() {
        let source = ScriptedSource::failing_then(0, json!({"ok": true}));
        let pause = RecordingPause::default();

        let payload = fetcher(&source, &pause, 3).fetch(&request()).await.unwrap();

        assert_eq!(payload, json!({"ok": true}));
        assert_eq!(source.calls(), 1);
        assert!(pause.calls().is_empty());
    }

    #[tokio::test]
    async fn eventual_success_after_k_failures() {
        for k in 1..4 {
            let source = ScriptedSource::failing_then(k, json!({"attempt": k}));
            let pause = RecordingPause::default();

            let payload = fetcher(&source, &pause, 4).fetch(&request()).await.unwrap();

            assert_eq!(payload, json!({"attempt": k}));
            assert_eq!(source.calls(), k + 1);
            let expected: Vec<Duration> =
                (1..=k as u32).map(|a| Duration::from_secs(1 << a)).collect();
            assert_eq!(pause.calls(), expected);
        }
    }

    #[tokio::test]
    async fn always_failing_source_gives_definitive_failure() {
        let source = ScriptedSource::new(vec![]);
        let pause = RecordingPause::default();

        let err = fetcher(&source, &pause, 3).fetch(&request()).await.unwrap_err();

        assert_eq!(err.attempts, 3);
        assert!(err.last_error.contains("status 500"));
        assert_eq!(source.calls(), 3);
        assert_eq!(pause.calls(), vec![Duration::from_secs(2), Duration::from_secs(4)]);
    }

    #[tokio::test]
    async fn retries_over_http_until_upstream_recovers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"timezone": "GMT"})))
            .mount(&server)
            .await;

        let client =
            crate::fetch::OpenMeteoClient::new(server.uri(), Duration::from_secs(2)).unwrap();
        let pause = RecordingPause::default();
        let fetcher = RetryingFetcher::new(Box::new(client), RetryPolicy::new(3), Arc::new(pause.clone()));

        let payload = fetcher.fetch(&request()).await.unwrap();

        assert_eq!(payload, json!({"timezone": "GMT"}));
        assert_eq!(pause.calls().len(), 2);
        assert_eq!(server.received_requests().await.unwrap().len(), 3);
    }
}
