use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::errors::TransportError;
use crate::domain::value_objects::BroadcastEnvelope;

/// Port for a single HTTP POST
#[async_trait]
pub trait WebhookTransport: Send + Sync {
    /// POST `body` as JSON; `Ok` carries the response status, whatever it is
    async fn post_json(
        &self,
        url: &str,
        body: &Value,
        timeout: Duration,
    ) -> std::result::Result<u16, TransportError>;
}

/// Port for handing a decoded envelope to its destination
#[async_trait]
pub trait EnvelopeDelivery: Send + Sync {
    async fn send(&self, envelope: &BroadcastEnvelope) -> bool;
}
