pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;

// Re-exports for convenience
pub use application::services::{
    ConnectionSupervisor, DeliveryClient, DispatchOutcome, Dispatcher, LifecycleOrchestrator,
    NoopDelivery,
};
pub use config::Config;
pub use domain::entities::{ConnectionLifecycle, StateTransition};
pub use domain::errors::{DecodeError, DomainError, Result, TransportError};
pub use domain::ports::{
    BrokerConnection, BrokerConnector, EnvelopeDelivery, LinkEvent, MessageHandler,
    MetricsReporter, Subscription, WebhookTransport,
};
pub use domain::value_objects::{
    BackoffPolicy, BroadcastEnvelope, BrokerConfig, BrokerMessage, ConnectionState,
    DeliveryReport, ProcessingStatus, RetryPredicate, WebhookConfig, WebhookStatus,
};
pub use infrastructure::http::ReqwestTransport;
pub use infrastructure::metrics::{serve_metrics, MetricsRegistry, ServiceInfo};
pub use infrastructure::nats::NatsConnector;
