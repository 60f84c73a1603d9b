use axum::Json;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use carepath_llm::Backends;
use http::StatusCode;

/// Liveness probe
pub async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

/// Liveness probe that also reports backend reachability
///
/// Always answers 200 while the process is up; unreachable backends only
/// degrade the reported status.
pub async fn detailed_health_handler(State(backends): State<Backends>) -> Response {
    let health = backends.health().await;
    let degraded = health.values().any(|ok| !ok);

    let report: serde_json::Map<String, serde_json::Value> = health
        .into_iter()
        .map(|(kind, ok)| (kind.as_str().to_owned(), serde_json::Value::Bool(ok)))
        .collect();

    Json(serde_json::json!({
        "status": if degraded { "degraded" } else { "ok" },
        "backends": report,
    }))
    .into_response()
}
