use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Invalid broker URL: {0}")]
    InvalidBrokerUrl(String),

    #[error("Invalid webhook URL: {0}")]
    InvalidWebhookUrl(String),

    #[error("Invalid subscription: {0} cannot be empty")]
    EmptySubscriptionField(&'static str),

    #[error("Invalid timeout: {0} must be greater than zero")]
    InvalidTimeout(&'static str),

    #[error("Invalid attempt budget: at least one attempt is required")]
    InvalidAttempts,

    #[error("Invalid backoff multiplier: must be >= 1.0")]
    InvalidBackoffMultiplier,

    #[error("Broker connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Broker connection timed out after {0:?}")]
    ConnectTimeout(Duration),

    #[error("Subscription failed: {0}")]
    SubscriptionFailed(String),

    #[error("Broker not connected")]
    NotConnected,

    #[error("HTTP client setup failed: {0}")]
    HttpClient(String),

    #[error("Unknown metric: {0}")]
    UnknownMetric(String),

    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),
}

pub type Result<T> = std::result::Result<T, DomainError>;

/// Transport-level webhook failure (no HTTP response was received)
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("request failed: {0}")]
    Request(String),
}

/// Why a broker payload could not become an envelope
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("payload is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}
