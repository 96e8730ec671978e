use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::watch;

use crate::domain::entities::ConnectionLifecycle;
use crate::domain::errors::{DomainError, Result};
use crate::domain::ports::{
    BrokerConnection, BrokerConnector, LinkEvent, MessageHandler, MetricsReporter, Subscription,
};
use crate::domain::value_objects::{BackoffPolicy, BrokerConfig, ConnectionState};

/// Connection attempts made by a single `connect()` call
pub const CONNECT_ATTEMPTS: u32 = 3;

/// Pause between attempts inside one `connect()` call
const CONNECT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// A connection that lasted at least this long reconnects without backoff
const MIN_STABLE_UPTIME: Duration = Duration::from_secs(30);

#[derive(Default)]
struct Session {
    connection: Option<Arc<dyn BrokerConnection>>,
    subscription: Option<Box<dyn Subscription>>,
}

enum CycleEnd {
    Stopped,
    ConnectFailed,
    Disconnected(String),
}

/// Keeps a broker connection and subscription alive until stopped.
///
/// Owns the connection state; every state transition goes through here and
/// is the only writer of the `connection_status` gauge. All methods take
/// `&self` so the supervisor can be shared between the run loop and the
/// code that stops it.
pub struct ConnectionSupervisor {
    connector: Arc<dyn BrokerConnector>,
    config: BrokerConfig,
    handler: Arc<dyn MessageHandler>,
    metrics: Arc<dyn MetricsReporter>,
    backoff_policy: BackoffPolicy,
    connect_retry_delay: Duration,
    min_stable_uptime: Duration,
    running: AtomicBool,
    stop_tx: watch::Sender<bool>,
    lifecycle: Mutex<ConnectionLifecycle>,
    session: tokio::sync::Mutex<Session>,
}

impl ConnectionSupervisor {
    pub fn new(
        connector: Arc<dyn BrokerConnector>,
        config: BrokerConfig,
        handler: Arc<dyn MessageHandler>,
        metrics: Arc<dyn MetricsReporter>,
        backoff_policy: BackoffPolicy,
    ) -> Self {
        let (stop_tx, _) = watch::channel(false);
        Self {
            connector,
            config,
            handler,
            metrics,
            backoff_policy,
            connect_retry_delay: CONNECT_RETRY_DELAY,
            min_stable_uptime: MIN_STABLE_UPTIME,
            running: AtomicBool::new(false),
            stop_tx,
            lifecycle: Mutex::new(ConnectionLifecycle::new()),
            session: tokio::sync::Mutex::new(Session::default()),
        }
    }

    pub fn with_connect_retry_delay(mut self, delay: Duration) -> Self {
        self.connect_retry_delay = delay;
        self
    }

    pub fn with_min_stable_uptime(mut self, uptime: Duration) -> Self {
        self.min_stable_uptime = uptime;
        self
    }

    pub fn current_state(&self) -> ConnectionState {
        *self.lifecycle().current_state()
    }

    pub fn transition_count(&self) -> usize {
        self.lifecycle().transition_count()
    }

    /// States visited so far, oldest first (bounded)
    pub fn state_history(&self) -> Vec<ConnectionState> {
        self.lifecycle().history().map(|t| t.to).collect()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Run the connect/subscribe/wait loop until `stop()` is called
    pub async fn start(&self) {
        let mut stop_rx = self.stop_tx.subscribe();
        if *stop_rx.borrow() {
            tracing::info!("Broadcaster service already stopped, not starting");
            return;
        }

        self.running.store(true, Ordering::SeqCst);
        tracing::info!("Starting broadcaster service...");

        let mut backoff = self.backoff_policy.initial_delay();
        let mut reconnect_attempt = 0u32;

        while self.running.load(Ordering::SeqCst) {
            let delay = match self.run_cycle(&mut stop_rx).await {
                Ok(CycleEnd::Stopped) => break,
                Ok(CycleEnd::Disconnected(reason)) => {
                    tracing::warn!("NATS connection lost: {}", reason);
                    let stable = self
                        .lifecycle()
                        .uptime()
                        .is_some_and(|uptime| uptime >= self.min_stable_uptime);

                    reconnect_attempt += 1;
                    self.teardown(|lifecycle| {
                        lifecycle.transition_to_reconnecting(reconnect_attempt, Some(reason))
                    })
                    .await;

                    if stable {
                        backoff = self.backoff_policy.initial_delay();
                        continue;
                    }
                    // Flapping link: wait like any other failure
                    backoff
                }
                Ok(CycleEnd::ConnectFailed) => backoff,
                Err(e) => {
                    tracing::error!("NATS connection error: {}", e);
                    let reason = e.to_string();
                    self.teardown(|lifecycle| lifecycle.transition_to_disconnected(Some(reason)))
                        .await;
                    backoff
                }
            };

            if !self.running.load(Ordering::SeqCst) {
                break;
            }

            tracing::info!("Retrying NATS connection in {:?}...", delay);
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = stop_rx.wait_for(|stopped| *stopped) => break,
            }
            backoff = self.backoff_policy.next_delay(delay);
        }

        self.running.store(false, Ordering::SeqCst);
        self.teardown(|lifecycle| lifecycle.transition_to_disconnected(Some("Stopped".to_string())))
            .await;
        tracing::info!("Broadcaster run loop exited");
    }

    /// Stop the run loop, unsubscribe and close. Safe to call at any time.
    pub async fn stop(&self) {
        tracing::info!("Stopping broadcaster service...");
        self.running.store(false, Ordering::SeqCst);
        self.stop_tx.send_replace(true);

        // Gauge drops before any broker I/O, which may be slow to finish
        self.transition(|lifecycle| {
            lifecycle.transition_to_disconnected(Some("Stopped by user".to_string()))
        });

        self.teardown(|_| {}).await;
        tracing::info!("Broadcaster service stopped");
    }

    /// Try to connect up to `CONNECT_ATTEMPTS` times; never fails
    pub async fn connect(&self) -> bool {
        tracing::info!("Connecting to NATS at {}", self.config.url());

        for attempt in 1..=CONNECT_ATTEMPTS {
            if self.stop_requested() {
                return false;
            }

            self.transition(|lifecycle| lifecycle.transition_to_connecting());

            match self.open_connection().await {
                Ok(connection) => return self.install(connection).await,
                Err(e) => {
                    tracing::error!(
                        "Failed to connect to NATS (attempt {}/{}): {}",
                        attempt,
                        CONNECT_ATTEMPTS,
                        e
                    );
                    self.transition(|lifecycle| {
                        lifecycle.transition_to_disconnected(Some(e.to_string()))
                    });

                    if attempt < CONNECT_ATTEMPTS {
                        tokio::time::sleep(self.connect_retry_delay).await;
                    }
                }
            }
        }

        tracing::error!("Could not connect to NATS after {} attempts", CONNECT_ATTEMPTS);
        false
    }

    /// Register `handler` on the current connection. Returns once the
    /// broker accepted the subscription; messages arrive out of band.
    pub async fn subscribe(
        &self,
        topic: &str,
        queue_group: &str,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<()> {
        let mut session = self.session.lock().await;
        let connection = session.connection.clone().ok_or(DomainError::NotConnected)?;

        let subscription = connection.subscribe(topic, queue_group, handler).await?;
        if let Some(mut previous) = session.subscription.replace(subscription) {
            if let Err(e) = previous.unsubscribe().await {
                tracing::warn!("Failed to drop previous subscription: {}", e);
            }
        }

        tracing::info!(
            "Subscribed to topic '{}' with queue group '{}'",
            topic,
            queue_group
        );
        Ok(())
    }

    async fn run_cycle(&self, stop_rx: &mut watch::Receiver<bool>) -> Result<CycleEnd> {
        if !self.connect().await {
            return Ok(CycleEnd::ConnectFailed);
        }

        self.subscribe(
            self.config.topic(),
            self.config.queue_group(),
            self.handler.clone(),
        )
        .await?;

        let connection = self
            .session
            .lock()
            .await
            .connection
            .clone()
            .ok_or(DomainError::NotConnected)?;

        tokio::select! {
            _ = stop_rx.wait_for(|stopped| *stopped) => Ok(CycleEnd::Stopped),
            reason = Self::watch_link(connection) => Ok(CycleEnd::Disconnected(reason)),
        }
    }

    /// Resolves with a reason once the broker reports the link as gone
    async fn watch_link(connection: Arc<dyn BrokerConnection>) -> String {
        loop {
            match connection.next_event().await {
                Some(LinkEvent::Disconnected) => return "broker reported disconnect".to_string(),
                Some(LinkEvent::Error(e)) => tracing::error!("NATS error: {}", e),
                None => return "broker event stream closed".to_string(),
            }
        }
    }

    async fn open_connection(&self) -> Result<Arc<dyn BrokerConnection>> {
        let timeout = self.config.connect_timeout();
        match tokio::time::timeout(timeout, self.connector.connect(&self.config)).await {
            Ok(result) => result,
            Err(_) => Err(DomainError::ConnectTimeout(timeout)),
        }
    }

    async fn install(&self, connection: Arc<dyn BrokerConnection>) -> bool {
        let mut session = self.session.lock().await;

        // stop() may have run while the attempt was in flight
        if self.stop_requested() {
            drop(session);
            if let Err(e) = connection.close().await {
                tracing::warn!("Failed to close connection: {}", e);
            }
            return false;
        }

        if !self.commit_connected() {
            drop(session);
            if let Err(e) = connection.close().await {
                tracing::warn!("Failed to close connection: {}", e);
            }
            return false;
        }

        if let Some(previous) = session.connection.replace(connection) {
            if let Err(e) = previous.close().await {
                tracing::warn!("Failed to close previous connection: {}", e);
            }
        }
        tracing::info!("Successfully connected to NATS");
        true
    }

    /// Record `Connected` unless a stop is pending. Checked under the
    /// lifecycle lock, which `stop()` takes after raising its flag.
    fn commit_connected(&self) -> bool {
        let mut lifecycle = self.lifecycle();
        if self.stop_requested() {
            return false;
        }
        lifecycle.transition_to_connected();
        self.metrics.report_connection_state(lifecycle.current_state());
        true
    }

    /// Unsubscribe, close and record the next state under the session lock
    async fn teardown(&self, next: impl FnOnce(&mut ConnectionLifecycle)) {
        let mut session = self.session.lock().await;

        if let Some(mut subscription) = session.subscription.take() {
            if let Err(e) = subscription.unsubscribe().await {
                tracing::warn!("Failed to unsubscribe: {}", e);
            }
        }
        if let Some(connection) = session.connection.take() {
            if let Err(e) = connection.close().await {
                tracing::warn!("Failed to close connection: {}", e);
            }
        }

        self.transition(next);
    }

    fn transition(&self, apply: impl FnOnce(&mut ConnectionLifecycle)) {
        let mut lifecycle = self.lifecycle();
        apply(&mut *lifecycle);
        // Reported under the lock so gauge writes keep transition order
        self.metrics.report_connection_state(lifecycle.current_state());
        tracing::debug!("Connection state: {}", lifecycle.current_state());
    }

    fn lifecycle(&self) -> MutexGuard<'_, ConnectionLifecycle> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn stop_requested(&self) -> bool {
        *self.stop_tx.borrow()
    }
}
