//! Menu tree API handlers.
use crate::api::error::ApiError;
use crate::api::op_context;
use crate::api::types::{MenuListQuery, MenuListResponse, PageQuery};
use crate::app::AppState;
use crate::model::{AncestorPath, Menu, MenuFilter, MenuInput, MenuTree, QueryOptions};
use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;

impl MenuListQuery {
    fn filter(&self) -> MenuFilter {
        MenuFilter {
            ids: None,
            like_name: self.like_name.clone(),
            parent_id: self.parent_id.clone(),
            prefix_parent_path: self.prefix_parent_path.as_deref().map(AncestorPath::parse),
            hidden: self.hidden,
        }
    }

    fn options(&self, page: &PageQuery) -> QueryOptions {
        QueryOptions {
            include_actions: self.include_children,
            include_resources: self.include_children,
            pagination: page.pagination(),
            ..QueryOptions::default()
        }
    }
}

#[utoipa::path(
    get,
    path = "/v1/menus",
    tag = "menus",
    params(PageQuery, MenuListQuery),
    responses(
        (status = 200, description = "Matching menus, newest sequence first", body = MenuListResponse)
    )
)]
pub(crate) async fn list_menus(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(page): Query<PageQuery>,
    Query(query): Query<MenuListQuery>,
) -> Result<Json<MenuListResponse>, ApiError> {
    let ctx = op_context(&state, &headers);
    let result = state
        .menus
        .query(&ctx, &query.filter(), query.options(&page))
        .await?;
    Ok(Json(result.into()))
}

#[utoipa::path(
    get,
    path = "/v1/menus.tree",
    tag = "menus",
    params(MenuListQuery),
    responses(
        (status = 200, description = "Menu forest", body = [MenuTree])
    )
)]
pub(crate) async fn menu_tree(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<MenuListQuery>,
) -> Result<Json<Vec<MenuTree>>, ApiError> {
    let ctx = op_context(&state, &headers);
    let forest = state
        .menus
        .query_tree(&ctx, &query.filter(), query.options(&PageQuery::default()))
        .await?;
    Ok(Json(forest))
}

#[utoipa::path(
    get,
    path = "/v1/menus/{id}",
    tag = "menus",
    params(("id" = String, Path, description = "Menu identifier")),
    responses(
        (status = 200, description = "Menu with actions and resources", body = Menu),
        (status = 404, description = "Menu not found", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn get_menu(
    Path(id): Path<String>,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Menu>, ApiError> {
    let ctx = op_context(&state, &headers);
    let menu = state
        .menus
        .get(&ctx, &id, QueryOptions::with_children())
        .await?;
    Ok(Json(menu))
}

#[utoipa::path(
    post,
    path = "/v1/menus",
    tag = "menus",
    request_body = MenuInput,
    responses(
        (status = 201, description = "Menu created", body = Menu),
        (status = 400, description = "Invalid menu", body = crate::api::types::ErrorResponse),
        (status = 404, description = "Parent not found", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn create_menu(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<MenuInput>,
) -> Result<impl IntoResponse, ApiError> {
    let ctx = op_context(&state, &headers);
    let menu = state.menus.create(&ctx, body).await?;
    Ok((StatusCode::CREATED, Json(menu)))
}

#[utoipa::path(
    put,
    path = "/v1/menus/{id}",
    tag = "menus",
    params(("id" = String, Path, description = "Menu identifier")),
    request_body = MenuInput,
    responses(
        (status = 200, description = "Menu updated, possibly moved", body = Menu),
        (status = 400, description = "Invalid menu or move", body = crate::api::types::ErrorResponse),
        (status = 404, description = "Menu or parent not found", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn update_menu(
    Path(id): Path<String>,
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<MenuInput>,
) -> Result<Json<Menu>, ApiError> {
    let ctx = op_context(&state, &headers);
    let menu = state.menus.update(&ctx, &id, body).await?;
    Ok(Json(menu))
}

#[utoipa::path(
    delete,
    path = "/v1/menus/{id}",
    tag = "menus",
    params(("id" = String, Path, description = "Menu identifier")),
    responses(
        (status = 204, description = "Menu deleted"),
        (status = 400, description = "Menu still has children", body = crate::api::types::ErrorResponse),
        (status = 404, description = "Menu not found", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn delete_menu(
    Path(id): Path<String>,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let ctx = op_context(&state, &headers);
    state.menus.delete(&ctx, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}
