mod broker;
mod message_handler;
mod metrics_reporter;
mod webhook;

pub use broker::{BrokerConnection, BrokerConnector, LinkEvent, Subscription};
pub use message_handler::MessageHandler;
pub use metrics_reporter::MetricsReporter;
pub use webhook::{EnvelopeDelivery, WebhookTransport};
