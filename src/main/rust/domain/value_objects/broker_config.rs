use std::time::Duration;

use crate::domain::errors::{DomainError, Result};

const BROKER_SCHEMES: [&str; 2] = ["nats://", "tls://"];

/// Configuration for the broker connection and subscription
#[derive(Debug, Clone, PartialEq)]
pub struct BrokerConfig {
    url: String,
    topic: String,
    queue_group: String,
    connect_timeout: Duration,
    max_reconnect_attempts: u32,
}

impl BrokerConfig {
    pub fn new(
        url: String,
        topic: String,
        queue_group: String,
        connect_timeout: Duration,
        max_reconnect_attempts: u32,
    ) -> Result<Self> {
        Self::validate_url(&url)?;

        if topic.trim().is_empty() {
            return Err(DomainError::EmptySubscriptionField("topic"));
        }
        if queue_group.trim().is_empty() {
            return Err(DomainError::EmptySubscriptionField("queue group"));
        }
        if connect_timeout.is_zero() {
            return Err(DomainError::InvalidTimeout("connect timeout"));
        }

        Ok(Self {
            url,
            topic,
            queue_group,
            connect_timeout,
            max_reconnect_attempts,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn queue_group(&self) -> &str {
        &self.queue_group
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    pub fn max_reconnect_attempts(&self) -> u32 {
        self.max_reconnect_attempts
    }

    fn validate_url(url: &str) -> Result<()> {
        if !BROKER_SCHEMES.iter().any(|scheme| url.starts_with(scheme)) {
            return Err(DomainError::InvalidBrokerUrl(url.to_string()));
        }
        Ok(())
    }
}
