use std::time::Duration;

use super::BackoffPolicy;
use crate::domain::errors::{DomainError, Result};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Decides whether an HTTP response status is worth another attempt.
///
/// Network-level failures are always retried; this only covers the case
/// where the target answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetryPredicate {
    /// Any HTTP response is final
    #[default]
    NetworkOnly,
    /// 5xx responses are retried like network failures
    NetworkAndServerErrors,
}

impl RetryPredicate {
    pub fn is_retryable_status(&self, status_code: u16) -> bool {
        match self {
            Self::NetworkOnly => false,
            Self::NetworkAndServerErrors => (500..=599).contains(&status_code),
        }
    }
}

/// Configuration for webhook delivery
#[derive(Debug, Clone, PartialEq)]
pub struct WebhookConfig {
    url: String,
    timeout: Duration,
    max_attempts: u32,
    retry_predicate: RetryPredicate,
    retry_backoff: Option<BackoffPolicy>,
}

impl WebhookConfig {
    pub fn new(url: String, timeout: Duration, max_attempts: u32) -> Result<Self> {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(DomainError::InvalidWebhookUrl(url));
        }
        if timeout.is_zero() {
            return Err(DomainError::InvalidTimeout("webhook timeout"));
        }
        if max_attempts == 0 {
            return Err(DomainError::InvalidAttempts);
        }

        Ok(Self {
            url,
            timeout,
            max_attempts,
            retry_predicate: RetryPredicate::default(),
            retry_backoff: None,
        })
    }

    pub fn with_retry_predicate(mut self, retry_predicate: RetryPredicate) -> Self {
        self.retry_predicate = retry_predicate;
        self
    }

    pub fn with_retry_backoff(mut self, retry_backoff: BackoffPolicy) -> Self {
        self.retry_backoff = Some(retry_backoff);
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn retry_predicate(&self) -> RetryPredicate {
        self.retry_predicate
    }

    /// `None` means attempts follow each other immediately
    pub fn retry_backoff(&self) -> Option<&BackoffPolicy> {
        self.retry_backoff.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_config_defaults() {
        let config = WebhookConfig::new(
            "http://localhost:8080/hook".to_string(),
            Duration::from_secs(30),
            DEFAULT_MAX_ATTEMPTS,
        )
        .unwrap();

        assert_eq!(config.max_attempts(), 3);
        assert_eq!(config.retry_predicate(), RetryPredicate::NetworkOnly);
        assert!(config.retry_backoff().is_none());
    }

    #[test]
    fn test_rejects_invalid_url() {
        let result = WebhookConfig::new(
            "ftp://localhost/hook".to_string(),
            Duration::from_secs(30),
            3,
        );
        assert!(matches!(result, Err(DomainError::InvalidWebhookUrl(_))));
    }

    #[test]
    fn test_rejects_zero_attempts_and_timeout() {
        let url = "https://example.com/hook".to_string();
        assert!(WebhookConfig::new(url.clone(), Duration::from_secs(30), 0).is_err());
        assert!(WebhookConfig::new(url, Duration::ZERO, 3).is_err());
    }

    #[test]
    fn test_retry_predicate() {
        assert!(!RetryPredicate::NetworkOnly.is_retryable_status(503));
        assert!(RetryPredicate::NetworkAndServerErrors.is_retryable_status(503));
        assert!(!RetryPredicate::NetworkAndServerErrors.is_retryable_status(404));
    }
}
