//! Liveness and diagnostic probe endpoints

use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, State},
    http::{header, HeaderMap, Uri},
    routing::get,
    Json, Router,
};
use serde::Serialize;

use super::convert::client_key;
use crate::admission::{retry_after_secs, RateDecision};
use crate::error::ConvertError;
use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
    service: &'static str,
}

#[derive(Serialize)]
pub struct ProbeResponse {
    message: &'static str,
    url: String,
}

/// Create the probe router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/test", get(probe).post(probe))
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        service: env!("CARGO_PKG_NAME"),
    })
}

/// Rate-limited echo of the request URL
async fn probe(
    State(state): State<AppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    uri: Uri,
) -> Result<Json<ProbeResponse>, ConvertError> {
    let client = client_key(connect_info);

    if let RateDecision::Reject { retry_after } = state.probe_limiter().check(&client) {
        tracing::warn!(client = %client, "Probe rate limit exceeded");
        return Err(ConvertError::RateLimited {
            retry_after_secs: retry_after_secs(retry_after),
        });
    }

    let path = uri.path_and_query().map(|p| p.as_str()).unwrap_or("/");
    let url = match headers.get(header::HOST).and_then(|h| h.to_str().ok()) {
        Some(host) => format!("http://{}{}", host, path),
        None => path.to_string(),
    };

    Ok(Json(ProbeResponse {
        message: "This is a test response",
        url,
    }))
}
