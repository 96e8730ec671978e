use crate::domain::value_objects::{ConnectionState, ProcessingStatus, WebhookStatus};

/// Port for metrics reporting
pub trait MetricsReporter: Send + Sync {
    fn report_message_processed(&self, status: ProcessingStatus);
    fn report_webhook_request(&self, status: WebhookStatus);
    fn report_webhook_error(&self);
    fn report_connection_state(&self, state: &ConnectionState);
}
