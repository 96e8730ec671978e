use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio::sync::oneshot;
use tracing::info;

use broadcaster::{
    serve_metrics, Config, ConnectionSupervisor, DeliveryClient, Dispatcher, EnvelopeDelivery,
    LifecycleOrchestrator, MetricsRegistry, NatsConnector, NoopDelivery, ReqwestTransport,
    ServiceInfo,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse configuration
    let config = Config::parse();
    config.validate()?;

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(config.log_filter())),
        )
        .init();

    info!("Starting broadcaster");
    info!("  NATS URL: {}", config.nats_url);
    info!("  Topic: {} (queue group {})", config.nats_topic, config.nats_queue_group);
    info!(
        "  Webhook URL: {}",
        config.webhook_url.as_deref().unwrap_or("<not configured>")
    );
    info!("  Metrics port: {}", config.metrics_port);

    // Convert CLI config to domain configs
    let broker_config = config
        .to_broker_config()
        .map_err(|e| anyhow::anyhow!("{}", e))?;
    let webhook_config = config
        .to_webhook_config()
        .map_err(|e| anyhow::anyhow!("{}", e))?;
    let backoff_policy = config
        .to_backoff_policy()
        .map_err(|e| anyhow::anyhow!("{}", e))?;

    // Create infrastructure implementations (dependency injection)
    let metrics = Arc::new(MetricsRegistry::new()?);

    let delivery: Arc<dyn EnvelopeDelivery> = match webhook_config {
        Some(webhook_config) => {
            let transport = Arc::new(ReqwestTransport::new()?);
            Arc::new(DeliveryClient::new(transport, webhook_config, metrics.clone()))
        }
        None => {
            tracing::warn!("WEBHOOK_URL not configured, messages will be dropped");
            Arc::new(NoopDelivery)
        }
    };

    // Create application services
    let dispatcher = Arc::new(Dispatcher::new(delivery, metrics.clone()));
    let supervisor = Arc::new(ConnectionSupervisor::new(
        Arc::new(NatsConnector::new()),
        broker_config,
        dispatcher,
        metrics.clone(),
        backoff_policy,
    ));
    let mut orchestrator = LifecycleOrchestrator::new(supervisor, config.shutdown_grace_period());

    // Start metrics server
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let info = ServiceInfo {
        nats_url: config.nats_url.clone(),
        webhook_url: config.webhook_url.clone(),
    };
    let (addr, server) = serve_metrics(config.metrics_port, metrics, info, async {
        shutdown_rx.await.ok();
    })?;
    info!("Metrics server listening on http://{}", addr);
    let metrics_server = tokio::spawn(server);

    orchestrator.start_background();

    // Wait for Ctrl+C
    tokio::signal::ctrl_c().await?;
    info!("Received shutdown signal");

    orchestrator.stop_background().await;

    // Signal shutdown to metrics server
    let _ = shutdown_tx.send(());
    metrics_server.await?;

    info!("Broadcaster shutdown complete");
    Ok(())
}
