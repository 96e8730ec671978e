use std::time::Duration;

use clap::Parser;

use crate::domain::value_objects::{BackoffPolicy, BrokerConfig, RetryPredicate, WebhookConfig};

#[derive(Parser, Debug, Clone)]
#[command(
    name = "broadcaster",
    version,
    about = "Forwards NATS events to an HTTP webhook with automatic reconnection"
)]
pub struct Config {
    /// NATS server URL
    #[arg(long, env = "NATS_URL", default_value = "nats://localhost:4222")]
    pub nats_url: String,

    /// Subject to subscribe to
    #[arg(long, env = "NATS_TOPIC", default_value = "todos.events")]
    pub nats_topic: String,

    /// Queue group shared by all broadcaster replicas
    #[arg(long, env = "NATS_QUEUE_GROUP", default_value = "broadcaster-workers")]
    pub nats_queue_group: String,

    /// Connection timeout in seconds
    #[arg(long, env = "NATS_CONNECT_TIMEOUT", default_value = "10")]
    pub nats_connect_timeout: u64,

    /// Reconnect attempts handed to the NATS client
    #[arg(long, env = "NATS_MAX_RECONNECT_ATTEMPTS", default_value = "60")]
    pub nats_max_reconnect_attempts: u32,

    /// Webhook target; messages are dropped when unset
    #[arg(long, env = "WEBHOOK_URL")]
    pub webhook_url: Option<String>,

    /// Per-request webhook timeout in seconds
    #[arg(long, env = "WEBHOOK_TIMEOUT", default_value = "30")]
    pub webhook_timeout: u64,

    /// Total webhook attempts per message
    #[arg(long, env = "WEBHOOK_RETRY_ATTEMPTS", default_value = "3")]
    pub webhook_retry_attempts: u32,

    /// Also retry 5xx responses
    #[arg(long, env = "WEBHOOK_RETRY_ON_SERVER_ERROR")]
    pub webhook_retry_on_server_error: bool,

    /// Delay between webhook attempts in milliseconds (0 retries immediately)
    #[arg(long, env = "WEBHOOK_RETRY_DELAY_MS", default_value = "0")]
    pub webhook_retry_delay_ms: u64,

    /// Metrics server port
    #[arg(long, env = "METRICS_PORT", default_value = "7777")]
    pub metrics_port: u16,

    /// Initial reconnection delay in seconds
    #[arg(long, env = "RECONNECT_INITIAL_DELAY", default_value = "5")]
    pub reconnect_initial_delay: u64,

    /// Maximum reconnection delay in seconds
    #[arg(long, env = "RECONNECT_MAX_DELAY", default_value = "60")]
    pub reconnect_max_delay: u64,

    /// Reconnection backoff multiplier
    #[arg(long, env = "RECONNECT_MULTIPLIER", default_value = "2.0")]
    pub reconnect_multiplier: f64,

    /// Seconds to wait for a clean shutdown before cancelling
    #[arg(long, env = "SHUTDOWN_GRACE_PERIOD", default_value = "5")]
    pub shutdown_grace_period: u64,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

/// Minimum allowed port (ports below 1024 are privileged)
const MIN_USER_PORT: u16 = 1024;

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        if !self.nats_url.starts_with("nats://") && !self.nats_url.starts_with("tls://") {
            anyhow::bail!("NATS URL must start with nats:// or tls://");
        }

        if self.nats_topic.trim().is_empty() {
            anyhow::bail!("NATS topic cannot be empty");
        }

        if self.nats_queue_group.trim().is_empty() {
            anyhow::bail!("NATS queue group cannot be empty");
        }

        if self.nats_connect_timeout == 0 {
            anyhow::bail!("NATS connect timeout cannot be 0");
        }

        if let Some(url) = &self.webhook_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                anyhow::bail!("Webhook URL must start with http:// or https://");
            }
        }

        if self.webhook_timeout == 0 {
            anyhow::bail!("Webhook timeout cannot be 0");
        }

        if self.webhook_retry_attempts == 0 {
            anyhow::bail!("Webhook retry attempts must be at least 1");
        }

        Self::validate_port(self.metrics_port, "metrics")?;

        if !self.reconnect_multiplier.is_finite() || self.reconnect_multiplier < 1.0 {
            anyhow::bail!("Reconnect multiplier must be >= 1.0");
        }

        if self.reconnect_initial_delay == 0 {
            anyhow::bail!("Initial reconnection delay cannot be 0");
        }

        if self.reconnect_max_delay < self.reconnect_initial_delay {
            anyhow::bail!(
                "Maximum reconnection delay ({}) cannot be less than initial delay ({})",
                self.reconnect_max_delay,
                self.reconnect_initial_delay
            );
        }

        Ok(())
    }

    fn validate_port(port: u16, name: &str) -> anyhow::Result<()> {
        if port == 0 {
            anyhow::bail!("Invalid {} port: port cannot be 0", name);
        }
        if port < MIN_USER_PORT {
            anyhow::bail!(
                "Invalid {} port: {} is a privileged port (< {}). Use a port >= {}",
                name,
                port,
                MIN_USER_PORT,
                MIN_USER_PORT
            );
        }
        Ok(())
    }

    pub fn to_broker_config(&self) -> crate::domain::errors::Result<BrokerConfig> {
        BrokerConfig::new(
            self.nats_url.clone(),
            self.nats_topic.clone(),
            self.nats_queue_group.clone(),
            Duration::from_secs(self.nats_connect_timeout),
            self.nats_max_reconnect_attempts,
        )
    }

    /// `None` when no webhook URL is configured
    pub fn to_webhook_config(&self) -> crate::domain::errors::Result<Option<WebhookConfig>> {
        let Some(url) = &self.webhook_url else {
            return Ok(None);
        };

        let mut config = WebhookConfig::new(
            url.clone(),
            Duration::from_secs(self.webhook_timeout),
            self.webhook_retry_attempts,
        )?;

        if self.webhook_retry_on_server_error {
            config = config.with_retry_predicate(RetryPredicate::NetworkAndServerErrors);
        }
        if self.webhook_retry_delay_ms > 0 {
            let delay = Duration::from_millis(self.webhook_retry_delay_ms);
            config = config.with_retry_backoff(BackoffPolicy::fixed(delay));
        }

        Ok(Some(config))
    }

    pub fn to_backoff_policy(&self) -> crate::domain::errors::Result<BackoffPolicy> {
        BackoffPolicy::new(
            Duration::from_secs(self.reconnect_initial_delay),
            Duration::from_secs(self.reconnect_max_delay),
            self.reconnect_multiplier,
        )
    }

    pub fn shutdown_grace_period(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_period)
    }

    pub fn log_filter(&self) -> &str {
        if self.verbose {
            "debug"
        } else {
            &self.log_level
        }
    }
}
