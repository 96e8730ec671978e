mod connection_supervisor;
mod delivery_client;
mod dispatcher;
mod lifecycle_orchestrator;

pub use connection_supervisor::{ConnectionSupervisor, CONNECT_ATTEMPTS};
pub use delivery_client::{DeliveryClient, NoopDelivery};
pub use dispatcher::{DispatchOutcome, Dispatcher};
pub use lifecycle_orchestrator::LifecycleOrchestrator;
