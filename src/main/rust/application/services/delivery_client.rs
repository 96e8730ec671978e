use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::ports::{EnvelopeDelivery, MetricsReporter, WebhookTransport};
use crate::domain::value_objects::{
    AttemptOutcome, BroadcastEnvelope, DeliveryAttempt, DeliveryReport, WebhookConfig,
};

/// Delivers one envelope to the configured webhook with bounded retry
pub struct DeliveryClient {
    transport: Arc<dyn WebhookTransport>,
    config: WebhookConfig,
    metrics: Arc<dyn MetricsReporter>,
}

impl DeliveryClient {
    pub fn new(
        transport: Arc<dyn WebhookTransport>,
        config: WebhookConfig,
        metrics: Arc<dyn MetricsReporter>,
    ) -> Self {
        tracing::info!("Webhook client configured for: {}", config.url());
        Self {
            transport,
            config,
            metrics,
        }
    }

    /// Run the attempt loop and return every attempt made.
    ///
    /// Stops at the first success or terminal failure; network failures
    /// (and, depending on the retry predicate, 5xx responses) consume the
    /// attempt budget.
    pub async fn deliver(&self, envelope: &BroadcastEnvelope) -> DeliveryReport {
        let max_attempts = self.config.max_attempts();
        let mut report = DeliveryReport::new();
        let mut retry_delay = self.config.retry_backoff().map(|b| b.initial_delay());

        for attempt in 1..=max_attempts {
            let outcome = self.attempt(envelope).await;
            self.metrics.report_webhook_request(outcome.webhook_status());

            let retry = outcome.is_retryable();
            let record = DeliveryAttempt::new(self.config.url(), attempt, outcome);
            if record.outcome().is_success() {
                tracing::info!("Webhook to {}: {}", record.target_url(), record.outcome());
            } else {
                tracing::warn!(
                    "Webhook to {} (attempt {}/{}): {}",
                    record.target_url(),
                    record.attempt(),
                    max_attempts,
                    record.outcome()
                );
            }
            report.record(record);

            if !retry || attempt == max_attempts {
                break;
            }

            if let (Some(delay), Some(policy)) = (retry_delay, self.config.retry_backoff()) {
                tokio::time::sleep(delay).await;
                retry_delay = Some(policy.next_delay(delay));
            }
        }

        if !report.is_delivered() {
            self.metrics.report_webhook_error();
            tracing::error!("Webhook failed after {} attempt(s)", report.attempt_count());
        }

        report
    }

    async fn attempt(&self, envelope: &BroadcastEnvelope) -> AttemptOutcome {
        let result = self
            .transport
            .post_json(self.config.url(), envelope.as_value(), self.config.timeout())
            .await;

        match result {
            Ok(status_code) if (200..300).contains(&status_code) => {
                AttemptOutcome::Success { status_code }
            }
            Ok(status_code) if self.config.retry_predicate().is_retryable_status(status_code) => {
                AttemptOutcome::RetryableFailure {
                    status_code: Some(status_code),
                    reason: format!("HTTP {}", status_code),
                }
            }
            Ok(status_code) => AttemptOutcome::TerminalFailure { status_code },
            Err(e) => AttemptOutcome::RetryableFailure {
                status_code: None,
                reason: e.to_string(),
            },
        }
    }
}

#[async_trait]
impl EnvelopeDelivery for DeliveryClient {
    async fn send(&self, envelope: &BroadcastEnvelope) -> bool {
        self.deliver(envelope).await.is_delivered()
    }
}

/// Stand-in used when no webhook target is configured; drops every envelope
#[derive(Debug, Default, Clone)]
pub struct NoopDelivery;

#[async_trait]
impl EnvelopeDelivery for NoopDelivery {
    async fn send(&self, envelope: &BroadcastEnvelope) -> bool {
        tracing::warn!(
            "No webhook configured, dropping message: {}",
            envelope.as_value()
        );
        false
    }
}
