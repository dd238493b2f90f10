use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};

use crate::error::{AppError, Result};
use crate::schemas::{ComponentSummary, IntentResponse};
use crate::services::lifecycle::{IntentStatus, OperationKind};
use crate::services::store::InstallRecord;
use crate::state::AppState;

/// Create component lifecycle routes
pub fn components_routes(state: AppState) -> Router {
    Router::new()
        .route("/", get(list_components))
        .route("/{id}/status", get(component_status))
        .route("/{id}/install", post(install_component))
        .route("/{id}/uninstall", post(uninstall_component))
        .route("/{id}/restart", post(restart_component))
        .with_state(state)
}

/// List every catalog component with its current install record.
async fn list_components(State(state): State<AppState>) -> Result<Json<Vec<ComponentSummary>>> {
    let records = state.engine.status_all().await?;

    let summaries = records
        .iter()
        .filter_map(|record| {
            state
                .catalog
                .get(&record.component)
                .map(|component| ComponentSummary::new(component, record))
        })
        .collect();

    Ok(Json(summaries))
}

/// Current install record for one component. Always a well-formed record so
/// a reconnecting client can resume polling. Clients are expected to poll
/// every 3s and give up after 15 minutes.
async fn component_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<InstallRecord>> {
    let record = state.engine.status(&id).await?;
    Ok(Json(record))
}

async fn install_component(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<IntentResponse>)> {
    handle_intent(&state, &id, OperationKind::Install).await
}

async fn uninstall_component(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<IntentResponse>)> {
    handle_intent(&state, &id, OperationKind::Uninstall).await
}

async fn restart_component(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<IntentResponse>)> {
    handle_intent(&state, &id, OperationKind::Restart).await
}

/// Map the engine's synchronous acknowledgment onto the wire contract:
/// 202 accepted, 200 already_processing, and the rejection's own status code
/// with a `{status: rejected, reason}` body. Unknown components stay a plain
/// 404.
async fn handle_intent(
    state: &AppState,
    id: &str,
    kind: OperationKind,
) -> Result<(StatusCode, Json<IntentResponse>)> {
    match state.engine.request_intent(id, kind).await {
        Ok(ack) => {
            let code = match ack.status {
                IntentStatus::Accepted => StatusCode::ACCEPTED,
                IntentStatus::AlreadyProcessing => StatusCode::OK,
            };
            Ok((code, Json(IntentResponse::from(ack))))
        }
        Err(e @ AppError::NotFound(_)) => Err(e),
        Err(
            e @ (AppError::Protected(_)
            | AppError::DependencyUnmet(_)
            | AppError::DependentsExist(_)
            | AppError::Conflict(_)),
        ) => Ok((
            e.status_code(),
            Json(IntentResponse::rejected(e.to_string())),
        )),
        Err(e) => Err(e),
    }
}
