//! Self-service endpoints acting on the caller named by the identity header.
use crate::api::authz::identity;
use crate::api::error::{ApiError, api_unauthorized};
use crate::api::op_context;
use crate::api::types::CurrentPasswordRequest;
use crate::app::AppState;
use crate::model::{CurrentUser, MenuTree};
use axum::Json;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};

fn caller(headers: &HeaderMap) -> Result<String, ApiError> {
    identity(headers)
        .map(str::to_string)
        .ok_or_else(|| api_unauthorized("missing caller identity"))
}

#[utoipa::path(
    get,
    path = "/v1/current/user",
    tag = "current",
    responses(
        (status = 200, description = "Calling user", body = CurrentUser),
        (status = 401, description = "No caller identity", body = crate::api::types::ErrorResponse),
        (status = 403, description = "Unknown or disabled user", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn current_user(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<CurrentUser>, ApiError> {
    let user_id = caller(&headers)?;
    let ctx = op_context(&state, &headers);
    Ok(Json(state.users.current(&ctx, &user_id).await?))
}

/// Root sees every visible menu; everyone else sees what their roles grant.
#[utoipa::path(
    get,
    path = "/v1/current/menus.tree",
    tag = "current",
    responses(
        (status = 200, description = "Menus the caller may navigate", body = [MenuTree]),
        (status = 401, description = "No caller identity", body = crate::api::types::ErrorResponse),
        (status = 403, description = "Caller has no roles or menus", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn current_menu_tree(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<MenuTree>>, ApiError> {
    let user_id = caller(&headers)?;
    let ctx = op_context(&state, &headers);
    let forest = if state.users.is_root(&user_id) {
        state.menus.query_visible_tree(&ctx).await?
    } else {
        state.menus.query_user_tree(&ctx, &user_id).await?
    };
    Ok(Json(forest))
}

#[utoipa::path(
    put,
    path = "/v1/current/password",
    tag = "current",
    request_body = CurrentPasswordRequest,
    responses(
        (status = 204, description = "Password changed"),
        (status = 400, description = "Old password mismatch or root caller", body = crate::api::types::ErrorResponse),
        (status = 401, description = "No caller identity", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn change_own_password(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CurrentPasswordRequest>,
) -> Result<StatusCode, ApiError> {
    let user_id = caller(&headers)?;
    let ctx = op_context(&state, &headers);
    state
        .users
        .change_own_password(&ctx, &user_id, &body.old_password, &body.new_password)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
