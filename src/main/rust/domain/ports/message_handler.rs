use async_trait::async_trait;

use crate::domain::value_objects::BrokerMessage;

/// Port invoked once per inbound broker message
///
/// Implementations must absorb every failure: nothing a single message does
/// may end the subscription.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, message: BrokerMessage);
}
