use std::fmt;

/// `status` label of `messages_processed_total`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingStatus {
    Success,
    Error,
}

impl ProcessingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
        }
    }
}

/// `status_code` label of `webhook_requests_total`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookStatus {
    /// The target answered with this HTTP status
    Code(u16),
    /// No response: timeout, refused, reset, DNS
    NetworkError,
}

impl WebhookStatus {
    pub fn label(&self) -> String {
        match self {
            Self::Code(code) => code.to_string(),
            Self::NetworkError => "error".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success { status_code: u16 },
    /// Worth another attempt while the budget lasts
    RetryableFailure {
        status_code: Option<u16>,
        reason: String,
    },
    /// The target rejected the payload, stop here
    TerminalFailure { status_code: u16 },
}

impl AttemptOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RetryableFailure { .. })
    }

    pub fn webhook_status(&self) -> WebhookStatus {
        match self {
            Self::Success { status_code } | Self::TerminalFailure { status_code } => {
                WebhookStatus::Code(*status_code)
            }
            Self::RetryableFailure {
                status_code: Some(code),
                ..
            } => WebhookStatus::Code(*code),
            Self::RetryableFailure {
                status_code: None, ..
            } => WebhookStatus::NetworkError,
        }
    }
}

impl fmt::Display for AttemptOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success { status_code } => write!(f, "delivered ({})", status_code),
            Self::RetryableFailure { reason, .. } => write!(f, "retryable failure: {}", reason),
            Self::TerminalFailure { status_code } => {
                write!(f, "rejected by target ({})", status_code)
            }
        }
    }
}

/// One POST of one envelope to the webhook target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryAttempt {
    target_url: String,
    attempt: u32,
    outcome: AttemptOutcome,
}

impl DeliveryAttempt {
    pub fn new(target_url: impl Into<String>, attempt: u32, outcome: AttemptOutcome) -> Self {
        Self {
            target_url: target_url.into(),
            attempt,
            outcome,
        }
    }

    pub fn target_url(&self) -> &str {
        &self.target_url
    }

    /// 1-based attempt index
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn outcome(&self) -> &AttemptOutcome {
        &self.outcome
    }
}

/// Every attempt made for a single envelope
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    attempts: Vec<DeliveryAttempt>,
}

impl DeliveryReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, attempt: DeliveryAttempt) {
        self.attempts.push(attempt);
    }

    pub fn attempts(&self) -> &[DeliveryAttempt] {
        &self.attempts
    }

    pub fn attempt_count(&self) -> usize {
        self.attempts.len()
    }

    /// Delivered only if the final attempt succeeded
    pub fn is_delivered(&self) -> bool {
        self.attempts
            .last()
            .map(|attempt| attempt.outcome().is_success())
            .unwrap_or(false)
    }
}
