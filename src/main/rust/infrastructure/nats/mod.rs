mod nats_broker;

pub use nats_broker::{NatsConnection, NatsConnector};
