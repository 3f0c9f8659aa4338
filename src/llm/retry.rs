//! Retrying wrapper for the model service
//!
//! Only rate-limit signals are retried, on a fixed delay schedule. Interactive
//! turns use a short schedule (they are latency-bound); background turns use a
//! longer one. Authentication failures and other non-success responses pass
//! through untouched.

use super::{LlmError, LlmErrorKind, LlmRequest, LlmResponse, LlmService};
use async_trait::async_trait;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;

/// Delay schedule for rate-limit retries
#[derive(Debug, Clone)]
pub struct RetrySchedule {
    delays: Vec<Duration>,
}

impl RetrySchedule {
    pub fn new(delays: Vec<Duration>) -> Self {
        Self { delays }
    }

    /// Schedule for interactive turns
    pub fn interactive() -> Self {
        Self::new(vec![
            Duration::from_secs(1),
            Duration::from_secs(2),
            Duration::from_secs(5),
            Duration::from_secs(10),
        ])
    }

    /// Schedule for background/scheduled turns
    pub fn background() -> Self {
        Self::new(vec![
            Duration::from_secs(5),
            Duration::from_secs(15),
            Duration::from_secs(30),
            Duration::from_secs(60),
        ])
    }

    fn delay(&self, attempt: usize) -> Option<Duration> {
        self.delays.get(attempt).copied()
    }
}

/// Model client that retries rate-limited requests
pub struct RetryingClient {
    inner: Arc<dyn LlmService>,
    schedule: RetrySchedule,
    model_id: String,
}

impl RetryingClient {
    pub fn new(inner: Arc<dyn LlmService>, schedule: RetrySchedule) -> Self {
        let model_id = inner.model_id().to_string();
        Self {
            inner,
            schedule,
            model_id,
        }
    }
}

#[async_trait]
impl LlmService for RetryingClient {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        let mut attempt = 0usize;
        loop {
            let err = match self.inner.complete(request).await {
                Ok(response) => return Ok(response),
                Err(e) => e,
            };

            if err.kind != LlmErrorKind::RateLimit {
                return Err(err);
            }

            let Some(scheduled) = self.schedule.delay(attempt) else {
                return Err(LlmError::rate_limit(format!(
                    "Rate limited after {} retries: {}",
                    attempt, err.message
                )));
            };

            // Server-provided retry-after takes precedence over the schedule
            let base = err.retry_after.unwrap_or(scheduled);
            let jitter = rand::thread_rng().gen_range(0..=250);
            let delay = base + Duration::from_millis(jitter);

            tracing::warn!(
                attempt = attempt + 1,
                delay_ms = %delay.as_millis(),
                "Rate limited, retrying"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}
