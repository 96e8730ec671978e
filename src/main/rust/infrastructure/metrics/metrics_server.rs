use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use serde::Serialize;
use warp::Filter;

use super::MetricsRegistry;

const SERVICE_NAME: &str = "broadcaster";

/// Endpoints reported by `/healthz`
#[derive(Debug, Clone, Serialize)]
pub struct ServiceInfo {
    pub nats_url: String,
    pub webhook_url: Option<String>,
}

/// Health check response structure
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
    version: &'static str,
}

#[derive(Serialize)]
struct DetailedHealthResponse {
    #[serde(flatten)]
    health: HealthResponse,
    #[serde(flatten)]
    info: ServiceInfo,
}

#[derive(Serialize)]
struct ReadinessResponse {
    status: &'static str,
    service: &'static str,
    version: &'static str,
    nats_connected: bool,
}

fn healthy() -> HealthResponse {
    HealthResponse {
        status: "healthy",
        service: SERVICE_NAME,
        version: env!("CARGO_PKG_VERSION"),
    }
}

/// All routes served on the metrics port
pub fn routes(
    metrics: Arc<MetricsRegistry>,
    info: ServiceInfo,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    // CORS configuration for browser access
    let cors = warp::cors()
        .allow_any_origin()
        .allow_methods(vec!["GET", "OPTIONS"])
        .allow_headers(vec!["Content-Type"]);

    let metrics_for_scrape = metrics.clone();
    let metrics_route = warp::path("metrics").and(warp::get()).map(move || {
        let body = metrics_for_scrape.encode_text();
        warp::reply::with_header(body, "content-type", "text/plain; version=0.0.4; charset=utf-8")
    });

    // Liveness: the process is up, nothing else is checked
    let health_route = warp::path("health")
        .and(warp::get())
        .map(|| warp::reply::json(&healthy()));

    let healthz_route = warp::path("healthz").and(warp::get()).map(move || {
        let response = DetailedHealthResponse {
            health: healthy(),
            info: info.clone(),
        };
        warp::reply::json(&response)
    });

    // Readiness reads the gauge only, it never waits on the broker
    let readiness_route = warp::path("ready").and(warp::get()).map(move || {
        let connected = metrics.connection_status() == 1;
        let response = ReadinessResponse {
            status: if connected { "ready" } else { "degraded" },
            service: SERVICE_NAME,
            version: env!("CARGO_PKG_VERSION"),
            nats_connected: connected,
        };
        warp::reply::json(&response)
    });

    metrics_route
        .or(health_route)
        .or(healthz_route)
        .or(readiness_route)
        .with(cors)
}

/// Bind the metrics server; the returned future runs until `shutdown` resolves
pub fn serve_metrics(
    port: u16,
    metrics: Arc<MetricsRegistry>,
    info: ServiceInfo,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(SocketAddr, impl Future<Output = ()>), warp::Error> {
    warp::serve(routes(metrics, info)).try_bind_with_graceful_shutdown(([0, 0, 0, 0], port), shutdown)
}
