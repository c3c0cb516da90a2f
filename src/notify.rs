//! Evaluation callback: POST the round result to the evaluator with backoff.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::clock::Clock;
use crate::errors::NotifyError;
use crate::models::EvaluationPayload;
use crate::retry::RetryPolicy;

/// Delivers an evaluation payload and reports the HTTP status it got back.
#[async_trait]
pub trait EvaluationSink: Send + Sync {
    async fn post(&self, url: &str, payload: &EvaluationPayload) -> Result<u16, NotifyError>;
}

/// Posts JSON with `reqwest`.
pub struct HttpEvaluationSink {
    http: reqwest::Client,
}

impl HttpEvaluationSink {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent("pagesmith")
            .build()?;
        Ok(Self { http })
    }
}

#[async_trait]
impl EvaluationSink for HttpEvaluationSink {
    async fn post(&self, url: &str, payload: &EvaluationPayload) -> Result<u16, NotifyError> {
        let resp = self
            .http
            .post(url)
            .json(payload)
            .send()
            .await
            .map_err(|source| NotifyError {
                url: url.to_string(),
                source,
            })?;
        Ok(resp.status().as_u16())
    }
}

/// Retries a sink until it answers `200` or the policy runs out.
pub struct EvaluationNotifier {
    sink: Arc<dyn EvaluationSink>,
    policy: RetryPolicy,
    clock: Arc<dyn Clock>,
}

impl EvaluationNotifier {
    pub fn new(sink: Arc<dyn EvaluationSink>, policy: RetryPolicy, clock: Arc<dyn Clock>) -> Self {
        Self { sink, policy, clock }
    }

    /// Returns `true` once the evaluator accepted the payload.
    ///
    /// Every non-`200` attempt, transport failures included, is followed by
    /// the policy's backoff, the last attempt too.
    pub async fn notify(&self, url: &str, payload: &EvaluationPayload) -> bool {
        for attempt in 1..=self.policy.max_attempts {
            match self.sink.post(url, payload).await {
                Ok(200) => {
                    tracing::info!(
                        task = %payload.task,
                        round = payload.round,
                        attempt,
                        "Evaluation notification accepted"
                    );
                    return true;
                }
                Ok(status) => {
                    tracing::warn!(task = %payload.task, attempt, status, "Evaluation endpoint rejected notification");
                }
                Err(e) => {
                    tracing::warn!(task = %payload.task, attempt, error = %e, "Evaluation notification failed");
                }
            }
            let delay = self.policy.delay_after(attempt);
            tracing::info!(attempt, delay_secs = delay.as_secs(), "Retrying evaluation notification");
            self.clock.sleep(delay).await;
        }

        tracing::error!(
            task = %payload.task,
            round = payload.round,
            attempts = self.policy.max_attempts,
            "Failed to notify evaluation endpoint"
        );
        false
    }
}
