mod backoff_policy;
mod broker_config;
mod broker_message;
mod connection_state;
mod delivery_attempt;
mod webhook_config;

pub use backoff_policy::BackoffPolicy;
pub use broker_config::BrokerConfig;
pub use broker_message::{BroadcastEnvelope, BrokerMessage};
pub use connection_state::ConnectionState;
pub use delivery_attempt::{
    AttemptOutcome, DeliveryAttempt, DeliveryReport, ProcessingStatus, WebhookStatus,
};
pub use webhook_config::{RetryPredicate, WebhookConfig, DEFAULT_MAX_ATTEMPTS};
