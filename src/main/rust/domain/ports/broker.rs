use std::sync::Arc;

use async_trait::async_trait;

use super::MessageHandler;
use crate::domain::errors::Result;
use crate::domain::value_objects::BrokerConfig;

/// Out-of-band notifications from the broker client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// The client lost its connection to the broker
    Disconnected,
    /// Non-fatal error reported by the client
    Error(String),
}

/// Port for establishing broker connections
#[async_trait]
pub trait BrokerConnector: Send + Sync {
    async fn connect(&self, config: &BrokerConfig) -> Result<Arc<dyn BrokerConnection>>;
}

/// Port for a live broker connection
#[async_trait]
pub trait BrokerConnection: Send + Sync {
    /// Register `handler` for every message on `topic` within `queue_group`.
    ///
    /// Returns once the subscription is registered. The handler is invoked
    /// by the client's own delivery task, possibly concurrently with the
    /// caller.
    async fn subscribe(
        &self,
        topic: &str,
        queue_group: &str,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<Box<dyn Subscription>>;

    /// Wait for the next link event; `None` once the client is gone
    async fn next_event(&self) -> Option<LinkEvent>;

    async fn close(&self) -> Result<()>;
}

/// Port for an active subscription
#[async_trait]
pub trait Subscription: Send + Sync {
    async fn unsubscribe(&mut self) -> Result<()>;
}
