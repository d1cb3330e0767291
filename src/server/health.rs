//! Health endpoint for liveness probes.

use axum::Json;
use serde::Serialize;

/// Body of the health response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: &'static str,
}

/// `GET /healthz` - returns `{"status":"ok"}` while the server is accepting
/// connections. Suitable as a Kubernetes liveness probe.
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}
