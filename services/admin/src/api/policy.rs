//! Operator endpoints for the policy engine.
use crate::api::error::{ApiError, api_internal, api_internal_message};
use crate::api::types::{PolicyCheckRequest, PolicyCheckResponse, PolicyRulesResponse};
use crate::app::AppState;
use crate::service::{ProjectionError, ProjectionSummary};
use axum::Json;
use axum::extract::State;

#[utoipa::path(
    post,
    path = "/v1/policy/reload",
    tag = "policy",
    responses(
        (status = 200, description = "Engine rebuilt from storage", body = ProjectionSummary),
        (status = 500, description = "Rebuild failed", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn reload_policy(
    State(state): State<AppState>,
) -> Result<Json<ProjectionSummary>, ApiError> {
    let mut session = state
        .store
        .session()
        .await
        .map_err(|err| api_internal("failed to open session", &err))?;
    match state.projector.project_all(session.as_mut()).await {
        Ok(summary) => Ok(Json(summary)),
        Err(ProjectionError::Store(err)) => Err(api_internal("failed to load assignments", &err)),
        Err(ProjectionError::Engine(err)) => {
            tracing::error!(error = %err, "policy reload failed");
            Err(api_internal_message("policy reload failed"))
        }
    }
}

#[utoipa::path(
    post,
    path = "/v1/policy/check",
    tag = "policy",
    request_body = PolicyCheckRequest,
    responses(
        (status = 200, description = "Decision for the subject", body = PolicyCheckResponse)
    )
)]
pub(crate) async fn check_policy(
    State(state): State<AppState>,
    Json(body): Json<PolicyCheckRequest>,
) -> Result<Json<PolicyCheckResponse>, ApiError> {
    let allowed = state
        .engine
        .evaluate(&body.subject, &body.path, &body.method)
        .await
        .map_err(|err| {
            tracing::error!(error = %err, "policy check failed");
            api_internal_message("policy check failed")
        })?;
    Ok(Json(PolicyCheckResponse { allowed }))
}

#[utoipa::path(
    get,
    path = "/v1/policy/rules",
    tag = "policy",
    responses(
        (status = 200, description = "Every rule the engine holds", body = PolicyRulesResponse)
    )
)]
pub(crate) async fn list_rules(State(state): State<AppState>) -> Json<PolicyRulesResponse> {
    Json(state.engine.snapshot().await.into())
}
