//! User API handlers.
//!
//! Password hashes never leave the service: `User` skips the field on
//! serialization, and password changes go through a dedicated endpoint.
use crate::api::error::ApiError;
use crate::api::op_context;
use crate::api::types::{PageQuery, PasswordChangeRequest, UserListQuery, UserListResponse};
use crate::app::AppState;
use crate::model::{QueryOptions, User, UserFilter, UserInput, UserStatus};
use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;

impl UserListQuery {
    fn filter(&self) -> UserFilter {
        UserFilter {
            ids: None,
            username: self.username.clone(),
            like_username: self.like_username.clone(),
            like_real_name: self.like_real_name.clone(),
            status: self.status,
            role_ids: self.role_ids.as_deref().map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|id| !id.is_empty())
                    .map(str::to_string)
                    .collect()
            }),
        }
    }
}

#[utoipa::path(
    get,
    path = "/v1/users",
    tag = "users",
    params(PageQuery, UserListQuery),
    responses(
        (status = 200, description = "Matching users", body = UserListResponse)
    )
)]
pub(crate) async fn list_users(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(page): Query<PageQuery>,
    Query(query): Query<UserListQuery>,
) -> Result<Json<UserListResponse>, ApiError> {
    let ctx = op_context(&state, &headers);
    let options = QueryOptions {
        include_roles: query.include_roles,
        pagination: page.pagination(),
        ..QueryOptions::default()
    };
    let result = state.users.query(&ctx, &query.filter(), options).await?;
    Ok(Json(result.into()))
}

#[utoipa::path(
    get,
    path = "/v1/users/{id}",
    tag = "users",
    params(("id" = String, Path, description = "User identifier")),
    responses(
        (status = 200, description = "User with role assignments", body = User),
        (status = 404, description = "User not found", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn get_user(
    Path(id): Path<String>,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<User>, ApiError> {
    let ctx = op_context(&state, &headers);
    let user = state
        .users
        .get(&ctx, &id, QueryOptions::with_children())
        .await?;
    Ok(Json(user))
}

#[utoipa::path(
    post,
    path = "/v1/users",
    tag = "users",
    request_body = UserInput,
    responses(
        (status = 201, description = "User created", body = User),
        (status = 400, description = "Invalid user", body = crate::api::types::ErrorResponse),
        (status = 404, description = "Assigned role not found", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn create_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<UserInput>,
) -> Result<impl IntoResponse, ApiError> {
    let ctx = op_context(&state, &headers);
    let user = state.users.create(&ctx, body).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

#[utoipa::path(
    put,
    path = "/v1/users/{id}",
    tag = "users",
    params(("id" = String, Path, description = "User identifier")),
    request_body = UserInput,
    responses(
        (status = 200, description = "User updated", body = User),
        (status = 400, description = "Invalid user", body = crate::api::types::ErrorResponse),
        (status = 404, description = "User or role not found", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn update_user(
    Path(id): Path<String>,
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<UserInput>,
) -> Result<Json<User>, ApiError> {
    let ctx = op_context(&state, &headers);
    Ok(Json(state.users.update(&ctx, &id, body).await?))
}

#[utoipa::path(
    delete,
    path = "/v1/users/{id}",
    tag = "users",
    params(("id" = String, Path, description = "User identifier")),
    responses(
        (status = 204, description = "User deleted"),
        (status = 404, description = "User not found", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn delete_user(
    Path(id): Path<String>,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let ctx = op_context(&state, &headers);
    state.users.delete(&ctx, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    patch,
    path = "/v1/users/{id}/enable",
    tag = "users",
    params(("id" = String, Path, description = "User identifier")),
    responses(
        (status = 204, description = "User enabled and memberships restored"),
        (status = 404, description = "User not found", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn enable_user(
    Path(id): Path<String>,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let ctx = op_context(&state, &headers);
    state
        .users
        .update_status(&ctx, &id, UserStatus::Enabled)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    patch,
    path = "/v1/users/{id}/disable",
    tag = "users",
    params(("id" = String, Path, description = "User identifier")),
    responses(
        (status = 204, description = "User disabled and memberships removed"),
        (status = 404, description = "User not found", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn disable_user(
    Path(id): Path<String>,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let ctx = op_context(&state, &headers);
    state
        .users
        .update_status(&ctx, &id, UserStatus::Disabled)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    put,
    path = "/v1/users/{id}/password",
    tag = "users",
    params(("id" = String, Path, description = "User identifier")),
    request_body = PasswordChangeRequest,
    responses(
        (status = 204, description = "Password replaced"),
        (status = 400, description = "Empty password", body = crate::api::types::ErrorResponse),
        (status = 404, description = "User not found", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn change_password(
    Path(id): Path<String>,
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<PasswordChangeRequest>,
) -> Result<StatusCode, ApiError> {
    let ctx = op_context(&state, &headers);
    state
        .users
        .update_password(&ctx, &id, &body.password)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
