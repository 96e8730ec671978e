mod metrics_registry;
mod metrics_server;

pub use metrics_registry::{
    MetricSample, MetricsRegistry, CONNECTION_STATUS, MESSAGES_PROCESSED, WEBHOOK_ERRORS,
    WEBHOOK_REQUESTS,
};
pub use metrics_server::{routes, serve_metrics, ServiceInfo};
