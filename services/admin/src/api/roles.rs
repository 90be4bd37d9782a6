//! Role API handlers.
use crate::api::error::ApiError;
use crate::api::op_context;
use crate::api::types::{PageQuery, RoleListQuery, RoleListResponse};
use crate::app::AppState;
use crate::model::{QueryOptions, Role, RoleFilter, RoleInput};
use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;

#[utoipa::path(
    get,
    path = "/v1/roles",
    tag = "roles",
    params(PageQuery, RoleListQuery),
    responses(
        (status = 200, description = "Matching roles", body = RoleListResponse)
    )
)]
pub(crate) async fn list_roles(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(page): Query<PageQuery>,
    Query(query): Query<RoleListQuery>,
) -> Result<Json<RoleListResponse>, ApiError> {
    let ctx = op_context(&state, &headers);
    let filter = RoleFilter {
        ids: None,
        name: query.name,
        like_name: query.like_name,
        user_id: query.user_id,
    };
    let options = QueryOptions {
        include_menus: query.include_menus,
        pagination: page.pagination(),
        ..QueryOptions::default()
    };
    let result = state.roles.query(&ctx, &filter, options).await?;
    Ok(Json(result.into()))
}

#[utoipa::path(
    get,
    path = "/v1/roles.select",
    tag = "roles",
    responses(
        (status = 200, description = "Every role without grants", body = [Role])
    )
)]
pub(crate) async fn select_roles(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<Role>>, ApiError> {
    let ctx = op_context(&state, &headers);
    Ok(Json(state.roles.query_select(&ctx).await?))
}

#[utoipa::path(
    get,
    path = "/v1/roles/{id}",
    tag = "roles",
    params(("id" = String, Path, description = "Role identifier")),
    responses(
        (status = 200, description = "Role with grants", body = Role),
        (status = 404, description = "Role not found", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn get_role(
    Path(id): Path<String>,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Role>, ApiError> {
    let ctx = op_context(&state, &headers);
    let role = state
        .roles
        .get(&ctx, &id, QueryOptions::with_children())
        .await?;
    Ok(Json(role))
}

#[utoipa::path(
    post,
    path = "/v1/roles",
    tag = "roles",
    request_body = RoleInput,
    responses(
        (status = 201, description = "Role created and projected", body = Role),
        (status = 400, description = "Invalid role", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn create_role(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<RoleInput>,
) -> Result<impl IntoResponse, ApiError> {
    let ctx = op_context(&state, &headers);
    let role = state.roles.create(&ctx, body).await?;
    Ok((StatusCode::CREATED, Json(role)))
}

#[utoipa::path(
    put,
    path = "/v1/roles/{id}",
    tag = "roles",
    params(("id" = String, Path, description = "Role identifier")),
    request_body = RoleInput,
    responses(
        (status = 200, description = "Role updated and re-projected", body = Role),
        (status = 400, description = "Invalid role", body = crate::api::types::ErrorResponse),
        (status = 404, description = "Role not found", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn update_role(
    Path(id): Path<String>,
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<RoleInput>,
) -> Result<Json<Role>, ApiError> {
    let ctx = op_context(&state, &headers);
    Ok(Json(state.roles.update(&ctx, &id, body).await?))
}

#[utoipa::path(
    delete,
    path = "/v1/roles/{id}",
    tag = "roles",
    params(("id" = String, Path, description = "Role identifier")),
    responses(
        (status = 204, description = "Role deleted"),
        (status = 404, description = "Role not found", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn delete_role(
    Path(id): Path<String>,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let ctx = op_context(&state, &headers);
    state.roles.delete(&ctx, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}
