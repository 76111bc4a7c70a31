//! HTTP surface (§6.1, §10.5): `axum` router behind `tower-http`'s
//! `TraceLayer` and a request `TimeoutLayer`, a per-IP `governor` rate
//! limiter ahead of the write endpoints, and `/health`/`/ready`/`/metrics`.
//! Health/readiness idiom grounded on
//! `astria-sequencer-relayer/src/api.rs`'s `Healthz`/`Readyz`
//! `IntoResponse` enums, updated to axum 0.7's `axum::serve` (that file's
//! own `axum::Server::bind` calls target axum 0.6, stale relative to this
//! workspace's declared 0.7.9 dependency).

mod auction;
mod bid;
mod error;

use std::{
    net::SocketAddr,
    sync::Arc,
    time::Duration,
};

use axum::{
    extract::{
        ConnectInfo,
        State,
    },
    http::StatusCode,
    middleware::{
        self,
        Next,
    },
    response::{
        IntoResponse,
        Response,
    },
    routing::{
        get,
        post,
    },
    Json,
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::{
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::info;

use crate::{
    auctions::AuctionService,
    metrics_init,
    rate_limit::RateLimiterMap,
    resilience::Envelope,
    store::Store,
    submission::Submitter,
};

pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone)]
pub struct AppState {
    pub auctions: Arc<AuctionService>,
    pub submitter: Arc<Submitter>,
    pub store: Arc<dyn Store>,
    pub store_envelope: Arc<Envelope>,
    pub bus_envelope: Arc<Envelope>,
    pub rate_limiter: Arc<RateLimiterMap>,
    pub prometheus: PrometheusHandle,
    pub shutdown: CancellationToken,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/auction/create", post(auction::create))
        .route("/api/v1/auction/get", get(auction::get))
        .route("/api/v1/auction/list", get(auction::list))
        .route("/api/v1/bid/place", post(bid::place))
        .route("/api/v1/bid/list", get(bid::list))
        .layer(middleware::from_fn_with_state(state.clone(), rate_limit_middleware))
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/metrics", get(metrics_endpoint))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .with_state(state)
}

pub async fn serve(addr: &str, state: AppState) -> std::io::Result<()> {
    let socket_addr: SocketAddr = addr.parse().map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidInput, err))?;
    let shutdown = state.shutdown.clone();
    let listener = TcpListener::bind(socket_addr).await?;
    info!(%socket_addr, "HTTP surface listening");
    axum::serve(listener, router(state).into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}

async fn rate_limit_middleware(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: axum::extract::Request,
    next: Next,
) -> Response {
    if state.rate_limiter.check(addr.ip()).await {
        next.run(request).await
    } else {
        metrics::counter!(metrics_init::RATE_LIMIT_REJECTIONS).increment(1);
        StatusCode::TOO_MANY_REQUESTS.into_response()
    }
}

#[derive(Debug, Serialize)]
struct StatusBody {
    status: &'static str,
}

enum Health {
    Ok,
}

impl IntoResponse for Health {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(StatusBody { status: "ok" })).into_response()
    }
}

async fn health() -> Health {
    Health::Ok
}

enum Ready {
    Ok,
    NotReady,
}

impl IntoResponse for Ready {
    fn into_response(self) -> Response {
        let (status, msg) = match self {
            Self::Ok => (StatusCode::OK, "ok"),
            Self::NotReady => (StatusCode::SERVICE_UNAVAILABLE, "not ready"),
        };
        (status, Json(StatusBody { status: msg })).into_response()
    }
}

/// §10.5: ready iff the store and bus circuit breakers are not OPEN.
async fn ready(State(state): State<AppState>) -> Ready {
    if state.store_envelope.is_available().await && state.bus_envelope.is_available().await {
        Ready::Ok
    } else {
        Ready::NotReady
    }
}

async fn metrics_endpoint(State(state): State<AppState>) -> String {
    state.prometheus.render()
}
