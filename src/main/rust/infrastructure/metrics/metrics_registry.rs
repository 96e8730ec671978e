use prometheus::proto::MetricType;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

use crate::domain::errors::{DomainError, Result};
use crate::domain::ports::MetricsReporter;
use crate::domain::value_objects::{ConnectionState, ProcessingStatus, WebhookStatus};

pub const MESSAGES_PROCESSED: &str = "messages_processed_total";
pub const WEBHOOK_REQUESTS: &str = "webhook_requests_total";
pub const WEBHOOK_ERRORS: &str = "webhook_errors_total";
pub const CONNECTION_STATUS: &str = "connection_status";

/// One exposed sample: metric name, label pairs, current value
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSample {
    pub name: String,
    pub labels: Vec<(String, String)>,
    pub value: f64,
}

/// Bridge metrics, owned by the composition root and shared by handle.
///
/// Every instance has its own Prometheus registry, so tests can build as
/// many as they like without duplicate-registration errors.
#[derive(Clone)]
pub struct MetricsRegistry {
    registry: Registry,
    messages_processed: IntCounterVec,
    webhook_requests: IntCounterVec,
    webhook_errors: IntCounter,
    connection_status: IntGauge,
}

impl MetricsRegistry {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let messages_processed = IntCounterVec::new(
            Opts::new(MESSAGES_PROCESSED, "Total messages processed from the broker"),
            &["status"],
        )?;
        let webhook_requests = IntCounterVec::new(
            Opts::new(WEBHOOK_REQUESTS, "Total webhook HTTP requests"),
            &["status_code"],
        )?;
        let webhook_errors = IntCounter::new(
            WEBHOOK_ERRORS,
            "Total messages that could not be delivered to the webhook",
        )?;
        let connection_status = IntGauge::new(
            CONNECTION_STATUS,
            "Broker connection status (1=connected, 0=disconnected)",
        )?;

        registry.register(Box::new(messages_processed.clone()))?;
        registry.register(Box::new(webhook_requests.clone()))?;
        registry.register(Box::new(webhook_errors.clone()))?;
        registry.register(Box::new(connection_status.clone()))?;

        Ok(Self {
            registry,
            messages_processed,
            webhook_requests,
            webhook_errors,
            connection_status,
        })
    }

    /// Look up a counter by name and label values
    pub fn counter(&self, name: &str, labels: &[&str]) -> Result<IntCounter> {
        let vec = match name {
            MESSAGES_PROCESSED => &self.messages_processed,
            WEBHOOK_REQUESTS => &self.webhook_requests,
            WEBHOOK_ERRORS if labels.is_empty() => return Ok(self.webhook_errors.clone()),
            _ => return Err(DomainError::UnknownMetric(name.to_string())),
        };
        vec.get_metric_with_label_values(labels)
            .map_err(|_| DomainError::UnknownMetric(format!("{}{:?}", name, labels)))
    }

    pub fn gauge(&self, name: &str) -> Result<IntGauge> {
        match name {
            CONNECTION_STATUS => Ok(self.connection_status.clone()),
            _ => Err(DomainError::UnknownMetric(name.to_string())),
        }
    }

    pub fn messages_processed(&self, status: ProcessingStatus) -> u64 {
        self.messages_processed
            .with_label_values(&[status.as_str()])
            .get()
    }

    pub fn webhook_requests(&self, status: WebhookStatus) -> u64 {
        self.webhook_requests
            .with_label_values(&[status.label().as_str()])
            .get()
    }

    pub fn webhook_errors(&self) -> u64 {
        self.webhook_errors.get()
    }

    /// Current gauge value; a plain atomic read, safe for health checks
    pub fn connection_status(&self) -> i64 {
        self.connection_status.get()
    }

    /// Flatten every registered metric into samples for exposition
    pub fn snapshot(&self) -> Vec<MetricSample> {
        let mut samples = Vec::new();
        for family in self.registry.gather() {
            for metric in family.get_metric() {
                let value = match family.get_field_type() {
                    MetricType::COUNTER => metric.get_counter().get_value(),
                    MetricType::GAUGE => metric.get_gauge().get_value(),
                    _ => continue,
                };
                samples.push(MetricSample {
                    name: family.get_name().to_string(),
                    labels: metric
                        .get_label()
                        .iter()
                        .map(|pair| (pair.get_name().to_string(), pair.get_value().to_string()))
                        .collect(),
                    value,
                });
            }
        }
        samples
    }

    /// Prometheus text exposition format
    pub fn encode_text(&self) -> Vec<u8> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = vec![];
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            tracing::error!("Failed to encode metrics: {}", e);
            return b"# Error encoding metrics\n".to_vec();
        }
        buffer
    }

    /// Zero every metric. Test harnesses only.
    pub fn reset(&self) {
        self.messages_processed.reset();
        self.webhook_requests.reset();
        self.webhook_errors.reset();
        self.connection_status.set(0);
    }
}

impl MetricsReporter for MetricsRegistry {
    fn report_message_processed(&self, status: ProcessingStatus) {
        self.messages_processed
            .with_label_values(&[status.as_str()])
            .inc();
    }

    fn report_webhook_request(&self, status: WebhookStatus) {
        self.webhook_requests
            .with_label_values(&[status.label().as_str()])
            .inc();
    }

    fn report_webhook_error(&self) {
        self.webhook_errors.inc();
    }

    fn report_connection_state(&self, state: &ConnectionState) {
        self.connection_status.set(state.as_metric());
    }
}
