use axum::{extract::State, routing::get, Json, Router};
use serde_json::{json, Value};

use crate::state::AppState;

/// Create cluster status routes
pub fn cluster_routes(state: AppState) -> Router {
    Router::new()
        .route("/status", get(cluster_status))
        .with_state(state)
}

/// Overall cluster status: node count, server version, pod count. Reports
/// `unavailable` instead of failing when the cluster cannot be reached, so
/// the dashboard can render a degraded card.
async fn cluster_status(State(state): State<AppState>) -> Json<Value> {
    let guard = state.k8s_client.read().await;

    let Some(k8s) = guard.as_ref() else {
        return Json(json!({
            "status": "unavailable",
            "message": "Kubernetes client not initialized"
        }));
    };

    match k8s.cluster_summary().await {
        Ok(summary) => Json(json!({
            "status": "running",
            "node_count": summary.node_count,
            "pod_count": summary.pod_count,
            "version": summary.version,
        })),
        Err(e) => Json(json!({
            "status": "error",
            "message": e.to_string(),
        })),
    }
}
