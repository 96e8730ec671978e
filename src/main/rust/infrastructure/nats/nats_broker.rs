use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::domain::errors::{DomainError, Result};
use crate::domain::ports::{BrokerConnection, BrokerConnector, LinkEvent, MessageHandler, Subscription};
use crate::domain::value_objects::{BrokerConfig, BrokerMessage};

/// Upper bound for flushing on close and for a busy pump to wind down
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Translate a client event; `None` for events the supervisor ignores
fn link_event(event: async_nats::Event) -> Option<LinkEvent> {
    match event {
        async_nats::Event::Connected => {
            tracing::info!("NATS connected");
            None
        }
        async_nats::Event::Disconnected => {
            tracing::warn!("NATS disconnected");
            Some(LinkEvent::Disconnected)
        }
        async_nats::Event::Closed => {
            tracing::warn!("NATS connection closed");
            Some(LinkEvent::Disconnected)
        }
        other => {
            tracing::error!("NATS error: {:?}", other);
            Some(LinkEvent::Error(format!("{:?}", other)))
        }
    }
}

/// Connects to NATS through `async-nats`
#[derive(Debug, Default, Clone)]
pub struct NatsConnector;

impl NatsConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl BrokerConnector for NatsConnector {
    async fn connect(&self, config: &BrokerConfig) -> Result<Arc<dyn BrokerConnection>> {
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let options = async_nats::ConnectOptions::new()
            .connection_timeout(config.connect_timeout())
            .max_reconnects(config.max_reconnect_attempts() as usize)
            .event_callback(move |event| {
                let event_tx = event_tx.clone();
                async move {
                    if let Some(link_event) = link_event(event) {
                        // Receiver is gone once the connection was closed
                        let _ = event_tx.send(link_event);
                    }
                }
            });

        let client = options
            .connect(config.url())
            .await
            .map_err(|e| DomainError::ConnectionFailed(e.to_string()))?;

        Ok(Arc::new(NatsConnection {
            client: Mutex::new(Some(client)),
            events: tokio::sync::Mutex::new(event_rx),
        }))
    }
}

/// Live client; `close()` releases it, after which subscribing fails
pub struct NatsConnection {
    client: Mutex<Option<async_nats::Client>>,
    events: tokio::sync::Mutex<mpsc::UnboundedReceiver<LinkEvent>>,
}

impl NatsConnection {
    fn client(&self) -> Option<async_nats::Client> {
        self.client
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl BrokerConnection for NatsConnection {
    async fn subscribe(
        &self,
        topic: &str,
        queue_group: &str,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<Box<dyn Subscription>> {
        let client = self.client().ok_or(DomainError::NotConnected)?;
        let mut subscriber = client
            .queue_subscribe(topic.to_string(), queue_group.to_string())
            .await
            .map_err(|e| DomainError::SubscriptionFailed(e.to_string()))?;

        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

        // Messages are handled one at a time, in the order the client hands them over
        let pump = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut stop_rx => {
                        if let Err(e) = subscriber.unsubscribe().await {
                            tracing::warn!("Failed to unsubscribe: {}", e);
                        }
                        break;
                    }
                    next = subscriber.next() => match next {
                        Some(message) => {
                            let message = BrokerMessage::new(message.subject.to_string(), message.payload);
                            handler.handle(message).await;
                        }
                        None => {
                            tracing::debug!("Subscription stream ended");
                            break;
                        }
                    }
                }
            }
        });

        Ok(Box::new(NatsSubscription {
            stop: Some(stop_tx),
            pump: Some(pump),
        }))
    }

    async fn next_event(&self) -> Option<LinkEvent> {
        self.events.lock().await.recv().await
    }

    async fn close(&self) -> Result<()> {
        let client = self
            .client
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(client) = client else {
            return Ok(());
        };

        // A reconnecting client queues the flush; don't wait on it for long
        let flushed = tokio::time::timeout(DRAIN_TIMEOUT, client.flush()).await;
        drop(client);

        match flushed {
            Ok(result) => result.map_err(|e| DomainError::ConnectionFailed(e.to_string())),
            Err(_) => {
                tracing::warn!("NATS flush did not finish within {:?}", DRAIN_TIMEOUT);
                Ok(())
            }
        }
    }
}

struct NatsSubscription {
    stop: Option<oneshot::Sender<()>>,
    pump: Option<JoinHandle<()>>,
}

#[async_trait]
impl Subscription for NatsSubscription {
    async fn unsubscribe(&mut self) -> Result<()> {
        if let Some(stop) = self.stop.take() {
            // Pump may already have exited on its own
            let _ = stop.send(());
        }
        if let Some(mut pump) = self.pump.take() {
            match tokio::time::timeout(DRAIN_TIMEOUT, &mut pump).await {
                Ok(joined) => {
                    joined.map_err(|e| DomainError::SubscriptionFailed(e.to_string()))?
                }
                Err(_) => {
                    // Still inside a handler; cut the in-flight message short
                    tracing::warn!("Subscription still busy after {:?}, aborting", DRAIN_TIMEOUT);
                    pump.abort();
                }
            }
        }
        Ok(())
    }
}

impl Drop for NatsSubscription {
    fn drop(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_events_end_the_link() {
        assert_eq!(
            link_event(async_nats::Event::Disconnected),
            Some(LinkEvent::Disconnected)
        );
        assert_eq!(
            link_event(async_nats::Event::Closed),
            Some(LinkEvent::Disconnected)
        );
    }

    #[test]
    fn test_other_events_are_not_disconnects() {
        assert_eq!(link_event(async_nats::Event::Connected), None);
        assert!(matches!(
            link_event(async_nats::Event::SlowConsumer(7)),
            Some(LinkEvent::Error(_))
        ));
    }

    #[tokio::test]
    async fn test_unsubscribe_aborts_a_busy_pump() {
        let (stop_tx, _stop_rx) = oneshot::channel::<()>();
        let pump = tokio::spawn(std::future::pending::<()>());
        let mut subscription = NatsSubscription {
            stop: Some(stop_tx),
            pump: Some(pump),
        };

        let started = std::time::Instant::now();
        subscription.unsubscribe().await.unwrap();

        assert!(started.elapsed() < DRAIN_TIMEOUT + Duration::from_secs(1));
        assert!(subscription.pump.is_none());
    }
}
