//! HTTP Servers
//!
//! `/metrics` runs one poll cycle per scrape and answers with the encoded
//! families. The health server answers `/healthz`, `/livez` and `/readyz`;
//! readiness turns on after the first cycle that loaded its configuration.

use super::families::render;
use crate::collector::Poller;
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Request, Response, Server, StatusCode};
use parking_lot::RwLock;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

// =============================================================================
// Shared State
// =============================================================================

/// Liveness of the scrape loop, shared between both servers
#[derive(Debug, Default)]
pub struct HealthState {
    last_complete: RwLock<Option<DateTime<Utc>>>,
}

impl HealthState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_complete(&self, at: DateTime<Utc>) {
        *self.last_complete.write() = Some(at);
    }

    pub fn last_complete(&self) -> Option<DateTime<Utc>> {
        *self.last_complete.read()
    }

    pub fn is_ready(&self) -> bool {
        self.last_complete.read().is_some()
    }
}

fn text_response(status: StatusCode, body: impl Into<Body>) -> Response<Body> {
    let mut response = Response::new(body.into());
    *response.status_mut() = status;
    response
}

// =============================================================================
// Handlers
// =============================================================================

/// Serve one metrics request
pub async fn handle_metrics(req: Request<Body>, poller: Arc<Poller>, health: Arc<HealthState>) -> Response<Body> {
    if req.uri().path() != "/metrics" {
        return text_response(StatusCode::NOT_FOUND, "not found");
    }

    let outcome = poller.poll().await;
    if outcome.complete {
        health.mark_complete(outcome.started_at);
    }

    match render(&outcome) {
        Ok(text) => {
            let mut response = text_response(StatusCode::OK, text);
            response
                .headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static(prometheus::TEXT_FORMAT));
            response
        }
        Err(e) => {
            error!("Failed to render metrics: {}", e);
            text_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

/// Serve one health request
pub fn handle_health(req: &Request<Body>, health: &HealthState) -> Response<Body> {
    match req.uri().path() {
        "/healthz" | "/livez" => text_response(StatusCode::OK, "ok"),
        "/readyz" if health.is_ready() => text_response(StatusCode::OK, "ok"),
        "/readyz" => text_response(StatusCode::SERVICE_UNAVAILABLE, "no completed poll yet"),
        _ => text_response(StatusCode::NOT_FOUND, "not found"),
    }
}

// =============================================================================
// Servers
// =============================================================================

fn parse_addr(addr: &str, server: &str) -> Result<SocketAddr> {
    addr.parse()
        .map_err(|e| Error::Configuration(format!("Invalid {} server address: {}", server, e)))
}

/// Run the metrics server until `shutdown` fires
pub async fn run_metrics_server(
    addr: &str,
    poller: Arc<Poller>,
    health: Arc<HealthState>,
    shutdown: CancellationToken,
) -> Result<()> {
    let addr = parse_addr(addr, "metrics")?;

    let make_svc = make_service_fn(move |_conn| {
        let poller = poller.clone();
        let health = health.clone();
        async move {
            Ok::<_, Infallible>(service_fn(move |req: Request<Body>| {
                let poller = poller.clone();
                let health = health.clone();
                async move { Ok::<_, Infallible>(handle_metrics(req, poller, health).await) }
            }))
        }
    });

    info!("Metrics server listening on {}", addr);
    Server::try_bind(&addr)
        .map_err(|e| Error::Internal(format!("Metrics server bind error: {}", e)))?
        .serve(make_svc)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| Error::Internal(format!("Metrics server error: {}", e)))
}

/// Run the health server until `shutdown` fires
pub async fn run_health_server(addr: &str, health: Arc<HealthState>, shutdown: CancellationToken) -> Result<()> {
    let addr = parse_addr(addr, "health")?;

    let make_svc = make_service_fn(move |_conn| {
        let health = health.clone();
        async move {
            Ok::<_, Infallible>(service_fn(move |req: Request<Body>| {
                let health = health.clone();
                async move { Ok::<_, Infallible>(handle_health(&req, &health)) }
            }))
        }
    });

    info!("Health server listening on {}", addr);
    Server::try_bind(&addr)
        .map_err(|e| Error::Internal(format!("Health server bind error: {}", e)))?
        .serve(make_svc)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| Error::Internal(format!("Health server error: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::DesiredConfig;
    use crate::registry::ArrayRegistry;
    use crate::testing::{
        desired, golden_transport, MockStatusSink, MockTransportFactory, StaticConfigSource,
        StaticSecretResolver,
    };

    fn poller(config: DesiredConfig) -> Arc<Poller> {
        let sink = Arc::new(MockStatusSink::default());
        let registry = Arc::new(ArrayRegistry::new(
            Arc::new(StaticSecretResolver::default().with("fs-a-secret", "fs.example")),
            Arc::new(MockTransportFactory::default().with("fs.example", Arc::new(golden_transport()))),
            sink.clone(),
            chrono::Duration::minutes(2),
        ));
        Arc::new(Poller::new(Arc::new(StaticConfigSource::new(config)), registry, sink, false))
    }

    fn get(path: &str) -> Request<Body> {
        Request::builder().uri(path).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_scrape_polls_and_marks_ready() {
        let config = [desired("fs-a", &[("sc", "Pool0")])].into_iter().collect();
        let poller = poller(config);
        let health = Arc::new(HealthState::new());
        assert_eq!(handle_health(&get("/readyz"), &health).status(), StatusCode::SERVICE_UNAVAILABLE);

        let response = handle_metrics(get("/metrics"), poller, health.clone()).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[CONTENT_TYPE], prometheus::TEXT_FORMAT);

        let body = hyper::body::to_bytes(response.into_body()).await.unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains(r#"flashsystem_pool_health{pool_name="Pool0",subsystem_name="fs-a"} 0"#));
        assert!(!text.contains(r#"pool_name="Pool1""#));

        assert!(health.is_ready());
        assert_eq!(handle_health(&get("/readyz"), &health).status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_unknown_paths() {
        let health = Arc::new(HealthState::new());
        let response = handle_metrics(get("/other"), poller(DesiredConfig::new()), health.clone()).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(!health.is_ready());

        assert_eq!(handle_health(&get("/livez"), &health).status(), StatusCode::OK);
        assert_eq!(handle_health(&get("/nope"), &health).status(), StatusCode::NOT_FOUND);
    }
}
