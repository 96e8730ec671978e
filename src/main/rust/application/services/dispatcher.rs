use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;

use crate::domain::ports::{EnvelopeDelivery, MessageHandler, MetricsReporter};
use crate::domain::value_objects::{BroadcastEnvelope, BrokerMessage, ProcessingStatus};

/// What happened to a single broker message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Delivered,
    DeliveryFailed,
    DecodeFailed,
}

impl DispatchOutcome {
    fn status(&self) -> ProcessingStatus {
        match self {
            Self::Delivered => ProcessingStatus::Success,
            Self::DeliveryFailed | Self::DecodeFailed => ProcessingStatus::Error,
        }
    }
}

/// Turns broker messages into webhook deliveries.
///
/// This is the subscription boundary: whatever one message does, the
/// subscription keeps running. It holds no mutable state, so concurrent
/// invocations by the broker client are fine.
pub struct Dispatcher {
    delivery: Arc<dyn EnvelopeDelivery>,
    metrics: Arc<dyn MetricsReporter>,
}

impl Dispatcher {
    pub fn new(delivery: Arc<dyn EnvelopeDelivery>, metrics: Arc<dyn MetricsReporter>) -> Self {
        Self { delivery, metrics }
    }

    pub async fn on_message(&self, raw: &[u8]) -> DispatchOutcome {
        let outcome = self.dispatch(raw).await;
        self.metrics.report_message_processed(outcome.status());
        outcome
    }

    async fn dispatch(&self, raw: &[u8]) -> DispatchOutcome {
        let envelope = match BroadcastEnvelope::decode(raw) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::error!("Failed to parse message JSON: {}", e);
                return DispatchOutcome::DecodeFailed;
            }
        };
        tracing::info!("Received message: {}", envelope.as_value());

        let sent = AssertUnwindSafe(self.delivery.send(&envelope))
            .catch_unwind()
            .await;

        match sent {
            Ok(true) => {
                tracing::debug!("Message successfully forwarded to webhook");
                DispatchOutcome::Delivered
            }
            Ok(false) => {
                tracing::warn!("Failed to forward message to webhook");
                DispatchOutcome::DeliveryFailed
            }
            Err(_) => {
                tracing::error!("Error processing message: delivery panicked");
                DispatchOutcome::DeliveryFailed
            }
        }
    }
}

#[async_trait]
impl MessageHandler for Dispatcher {
    async fn handle(&self, message: BrokerMessage) {
        let outcome = self.on_message(message.payload()).await;
        tracing::debug!(subject = %message.subject(), ?outcome, "Message dispatched");
    }
}
