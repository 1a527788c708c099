use async_trait::async_trait;
use std::fmt::Debug;
use std::time::Duration;

/// Suspends the single pipeline task. Used for retry backoff and pacing.
#[async_trait]
pub trait Pause: Send + Sync + Debug {
    async fn pause(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TokioPause;

#[async_trait]
impl Pause for TokioPause {
    async fn pause(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
