use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::task::{AbortHandle, JoinHandle};
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use broadcaster::{
    BackoffPolicy, BroadcastEnvelope, BrokerConfig, BrokerConnection, BrokerConnector,
    BrokerMessage, ConnectionState, ConnectionSupervisor, DeliveryClient, DispatchOutcome,
    Dispatcher, DomainError, EnvelopeDelivery, LifecycleOrchestrator, LinkEvent, MessageHandler,
    MetricsRegistry, ProcessingStatus, ReqwestTransport, Result, Subscription, TransportError,
    WebhookConfig, WebhookStatus, WebhookTransport,
};

fn webhook_config(url: String, max_attempts: u32) -> WebhookConfig {
    WebhookConfig::new(url, Duration::from_secs(2), max_attempts).unwrap()
}

fn broker_config() -> BrokerConfig {
    BrokerConfig::new(
        "nats://localhost:4222".to_string(),
        "todos.events".to_string(),
        "broadcaster-workers".to_string(),
        Duration::from_secs(1),
        60,
    )
    .unwrap()
}

/// Replays scripted responses; `None` stands for a network failure
struct FlakyTransport {
    script: Mutex<VecDeque<Option<u16>>>,
}

#[async_trait]
impl WebhookTransport for FlakyTransport {
    async fn post_json(
        &self,
        _url: &str,
        _body: &Value,
        _timeout: Duration,
    ) -> std::result::Result<u16, TransportError> {
        match self.script.lock().unwrap().pop_front().flatten() {
            Some(code) => Ok(code),
            None => Err(TransportError::Connect("connection reset".to_string())),
        }
    }
}

type InFlight = Arc<Mutex<Option<JoinHandle<()>>>>;

/// In-memory broker: hands published payloads to the registered handler
struct InMemoryConnection {
    handler: Mutex<Option<Arc<dyn MessageHandler>>>,
    in_flight: InFlight,
    events_tx: mpsc::UnboundedSender<LinkEvent>,
    events_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<LinkEvent>>,
    closed: AtomicBool,
}

impl InMemoryConnection {
    async fn publish(&self, payload: &'static [u8]) {
        let handler = self.handler.lock().unwrap().clone();
        if let Some(handler) = handler {
            handler.handle(BrokerMessage::new("todos.events", payload)).await;
        }
    }

    /// Hand the payload over without waiting; unsubscribe waits on it
    fn publish_in_background(&self, payload: &'static [u8]) {
        let handler = self.handler.lock().unwrap().clone();
        if let Some(handler) = handler {
            let task = tokio::spawn(async move {
                handler.handle(BrokerMessage::new("todos.events", payload)).await;
            });
            *self.in_flight.lock().unwrap() = Some(task);
        }
    }
}

/// Drains the in-flight message on unsubscribe, cancels it when dropped
struct InMemorySubscription {
    in_flight: InFlight,
    draining: Option<AbortHandle>,
}

#[async_trait]
impl Subscription for InMemorySubscription {
    async fn unsubscribe(&mut self) -> Result<()> {
        let task = self.in_flight.lock().unwrap().take();
        if let Some(task) = task {
            self.draining = Some(task.abort_handle());
            let _ = task.await;
        }
        Ok(())
    }
}

impl Drop for InMemorySubscription {
    fn drop(&mut self) {
        if let Some(draining) = self.draining.take() {
            draining.abort();
        }
        if let Some(task) = self.in_flight.lock().unwrap().take() {
            task.abort();
        }
    }
}

/// Accepts every request, but only after `delay`
struct SlowTransport {
    delay: Duration,
}

#[async_trait]
impl WebhookTransport for SlowTransport {
    async fn post_json(
        &self,
        _url: &str,
        _body: &Value,
        _timeout: Duration,
    ) -> std::result::Result<u16, TransportError> {
        tokio::time::sleep(self.delay).await;
        Ok(200)
    }
}

#[async_trait]
impl BrokerConnection for InMemoryConnection {
    async fn subscribe(
        &self,
        _topic: &str,
        _queue_group: &str,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<Box<dyn Subscription>> {
        *self.handler.lock().unwrap() = Some(handler);
        Ok(Box::new(InMemorySubscription {
            in_flight: self.in_flight.clone(),
            draining: None,
        }))
    }

    async fn next_event(&self) -> Option<LinkEvent> {
        self.events_rx.lock().await.recv().await
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Refuses the first `failures` connects
struct InMemoryBroker {
    failures: usize,
    calls: AtomicUsize,
    connections: Mutex<Vec<Arc<InMemoryConnection>>>,
}

impl InMemoryBroker {
    fn new(failures: usize) -> Arc<Self> {
        Arc::new(Self {
            failures,
            calls: AtomicUsize::new(0),
            connections: Mutex::new(Vec::new()),
        })
    }

    fn latest(&self) -> Arc<InMemoryConnection> {
        self.connections.lock().unwrap().last().cloned().unwrap()
    }

    /// True once the `n`th connection has a handler registered
    fn subscribed(&self, n: usize) -> bool {
        let connections = self.connections.lock().unwrap();
        connections.len() == n
            && connections[n - 1].handler.lock().unwrap().is_some()
    }
}

#[async_trait]
impl BrokerConnector for InMemoryBroker {
    async fn connect(&self, _config: &BrokerConfig) -> Result<Arc<dyn BrokerConnection>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call <= self.failures {
            return Err(DomainError::ConnectionFailed("connection refused".to_string()));
        }

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let connection = Arc::new(InMemoryConnection {
            handler: Mutex::new(None),
            in_flight: Arc::new(Mutex::new(None)),
            events_tx,
            events_rx: tokio::sync::Mutex::new(events_rx),
            closed: AtomicBool::new(false),
        });
        self.connections.lock().unwrap().push(connection.clone());
        Ok(connection)
    }
}

struct NullHandler;

#[async_trait]
impl MessageHandler for NullHandler {
    async fn handle(&self, _message: BrokerMessage) {}
}

async fn wait_until(condition: impl Fn() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

#[tokio::test]
async fn test_happy_path_forwards_to_webhook() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .and(body_json(json!({"id": "1", "text": "buy milk"})))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let metrics = Arc::new(MetricsRegistry::new().unwrap());
    let delivery = Arc::new(DeliveryClient::new(
        Arc::new(ReqwestTransport::new().unwrap()),
        webhook_config(format!("{}/hook", server.uri()), 3),
        metrics.clone(),
    ));
    let dispatcher = Dispatcher::new(delivery, metrics.clone());

    let outcome = dispatcher
        .on_message(br#"{"id":"1","text":"buy milk"}"#)
        .await;

    assert_eq!(outcome, DispatchOutcome::Delivered);
    assert_eq!(metrics.messages_processed(ProcessingStatus::Success), 1);
    assert_eq!(metrics.webhook_requests(WebhookStatus::Code(200)), 1);
}

#[tokio::test]
async fn test_malformed_payload_makes_no_webhook_call() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let metrics = Arc::new(MetricsRegistry::new().unwrap());
    let delivery = Arc::new(DeliveryClient::new(
        Arc::new(ReqwestTransport::new().unwrap()),
        webhook_config(server.uri(), 3),
        metrics.clone(),
    ));
    let dispatcher = Dispatcher::new(delivery, metrics.clone());

    let outcome = dispatcher.on_message(b"not-json").await;

    assert_eq!(outcome, DispatchOutcome::DecodeFailed);
    assert_eq!(metrics.messages_processed(ProcessingStatus::Error), 1);
    assert_eq!(metrics.messages_processed(ProcessingStatus::Success), 0);
}

#[tokio::test]
async fn test_flapping_webhook_recovers_within_budget() {
    let metrics = Arc::new(MetricsRegistry::new().unwrap());
    let transport = Arc::new(FlakyTransport {
        script: Mutex::new(VecDeque::from([None, None, Some(200)])),
    });
    let client = DeliveryClient::new(
        transport,
        webhook_config("http://webhook.local/hook".to_string(), 3),
        metrics.clone(),
    );

    let delivered = client
        .send(&BroadcastEnvelope::from(json!({"id": "7"})))
        .await;

    assert!(delivered);
    assert_eq!(metrics.webhook_requests(WebhookStatus::NetworkError), 2);
    assert_eq!(metrics.webhook_requests(WebhookStatus::Code(200)), 1);
    assert_eq!(metrics.webhook_errors(), 0);
}

#[tokio::test]
async fn test_connection_retry_then_success() {
    let metrics = Arc::new(MetricsRegistry::new().unwrap());
    let broker = InMemoryBroker::new(1);
    let supervisor = ConnectionSupervisor::new(
        broker.clone(),
        broker_config(),
        Arc::new(NullHandler),
        metrics.clone(),
        BackoffPolicy::default(),
    )
    .with_connect_retry_delay(Duration::from_millis(5));

    assert!(supervisor.connect().await);
    assert_eq!(broker.calls.load(Ordering::SeqCst), 2);
    assert_eq!(metrics.connection_status(), 1);
}

#[tokio::test]
async fn test_stop_is_idempotent() {
    let metrics = Arc::new(MetricsRegistry::new().unwrap());
    let supervisor = ConnectionSupervisor::new(
        InMemoryBroker::new(0),
        broker_config(),
        Arc::new(NullHandler),
        metrics.clone(),
        BackoffPolicy::default(),
    );

    supervisor.stop().await;
    supervisor.stop().await;

    assert_eq!(metrics.connection_status(), 0);
    assert_eq!(supervisor.current_state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_full_pipeline_through_broker() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(202))
        .mount(&server)
        .await;

    let metrics = Arc::new(MetricsRegistry::new().unwrap());
    let delivery = Arc::new(DeliveryClient::new(
        Arc::new(ReqwestTransport::new().unwrap()),
        webhook_config(format!("{}/hook", server.uri()), 3),
        metrics.clone(),
    ));
    let dispatcher = Arc::new(Dispatcher::new(delivery, metrics.clone()));

    let broker = InMemoryBroker::new(0);
    let supervisor = Arc::new(ConnectionSupervisor::new(
        broker.clone(),
        broker_config(),
        dispatcher,
        metrics.clone(),
        BackoffPolicy::fixed(Duration::from_millis(10)),
    ));
    let mut orchestrator = LifecycleOrchestrator::new(supervisor.clone(), Duration::from_secs(2));
    orchestrator.start_background();

    wait_until(|| broker.subscribed(1)).await;
    assert_eq!(metrics.connection_status(), 1);

    let connection = broker.latest();
    connection.publish(br#"{"id":"1","text":"buy milk"}"#).await;
    connection.publish(b"garbage").await;

    // Broker drops the link, the supervisor reconnects and resubscribes
    connection.events_tx.send(LinkEvent::Disconnected).unwrap();
    wait_until(|| broker.subscribed(2)).await;
    assert_eq!(metrics.connection_status(), 1);
    assert!(connection.closed.load(Ordering::SeqCst));

    broker.latest().publish(br#"{"id":"2"}"#).await;

    orchestrator.stop_background().await;

    assert_eq!(metrics.messages_processed(ProcessingStatus::Success), 2);
    assert_eq!(metrics.messages_processed(ProcessingStatus::Error), 1);
    assert_eq!(metrics.webhook_requests(WebhookStatus::Code(202)), 2);
    assert_eq!(metrics.connection_status(), 0);
    assert!(!supervisor.is_running());

    let received = server.received_requests().await.unwrap();
    assert_eq!(received.len(), 2);
}

#[tokio::test]
async fn test_shutdown_does_not_wait_for_slow_webhook() {
    let metrics = Arc::new(MetricsRegistry::new().unwrap());
    let delivery = Arc::new(DeliveryClient::new(
        Arc::new(SlowTransport {
            delay: Duration::from_secs(30),
        }),
        webhook_config("http://webhook.local/hook".to_string(), 1),
        metrics.clone(),
    ));
    let dispatcher = Arc::new(Dispatcher::new(delivery, metrics.clone()));

    let broker = InMemoryBroker::new(0);
    let supervisor = Arc::new(ConnectionSupervisor::new(
        broker.clone(),
        broker_config(),
        dispatcher,
        metrics.clone(),
        BackoffPolicy::fixed(Duration::from_millis(10)),
    ));
    let grace_period = Duration::from_millis(200);
    let mut orchestrator = LifecycleOrchestrator::new(supervisor.clone(), grace_period);
    orchestrator.start_background();

    wait_until(|| broker.subscribed(1)).await;
    broker.latest().publish_in_background(br#"{"id":"1"}"#);
    tokio::time::sleep(Duration::from_millis(50)).await;

    let started = std::time::Instant::now();
    orchestrator.stop_background().await;

    // One grace period for stop, at most one more for the task
    assert!(started.elapsed() < grace_period * 2 + Duration::from_millis(500));
    assert_eq!(metrics.connection_status(), 0);
    assert!(!orchestrator.is_running());

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(metrics.messages_processed(ProcessingStatus::Success), 0);
}

#[tokio::test]
async fn test_metrics_text_exposition() {
    let metrics = MetricsRegistry::new().unwrap();
    metrics
        .counter("messages_processed_total", &["success"])
        .unwrap()
        .inc_by(3);

    let text = String::from_utf8(metrics.encode_text()).unwrap();

    assert!(text.contains("# HELP messages_processed_total"));
    assert!(text.contains("# TYPE messages_processed_total counter"));
    assert!(text.contains("messages_processed_total{status=\"success\"} 3"));
    assert!(text.contains("# TYPE connection_status gauge"));
}
