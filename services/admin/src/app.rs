//! Admin HTTP application wiring.
//!
//! # Purpose
//! Builds the Axum router, installs the trace and authorization layers, and
//! defines the shared state injected into handlers.
use crate::api;
use crate::api::openapi::ApiDoc;
use crate::observability;
use crate::service::{MenuService, PolicyProjector, RoleService, UserService};
use crate::store::AdminStore;
use axum::Router;
use axum::routing::{get, patch, put};
use portcullis_authz::PolicyEngine;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing_opentelemetry::OpenTelemetrySpanExt;
use utoipa::OpenApi;

#[derive(Clone)]
pub struct AppState {
    pub api_version: String,
    pub store: Arc<dyn AdminStore>,
    pub engine: Arc<PolicyEngine>,
    pub projector: PolicyProjector,
    pub menus: MenuService,
    pub roles: RoleService,
    pub users: UserService,
    pub root_username: String,
    pub enforce: bool,
    pub request_timeout: Duration,
}

impl AppState {
    /// Wire services around one store and one engine.
    pub fn new(
        store: Arc<dyn AdminStore>,
        engine: Arc<PolicyEngine>,
        root_username: impl Into<String>,
        enforce: bool,
        request_timeout: Duration,
    ) -> Self {
        let root_username = root_username.into();
        let projector = PolicyProjector::new(engine.clone());
        Self {
            api_version: "v1".to_string(),
            menus: MenuService::new(store.clone(), projector.clone()),
            roles: RoleService::new(store.clone(), projector.clone()),
            users: UserService::new(store.clone(), projector.clone(), root_username.clone()),
            store,
            engine,
            projector,
            root_username,
            enforce,
            request_timeout,
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    let trace_layer =
        TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
            let parent = observability::trace_context_from_headers(request.headers());
            let span = tracing::info_span!(
                "http.request",
                method = %request.method(),
                uri = %request.uri(),
                version = ?request.version()
            );
            span.set_parent(parent);
            span
        });

    Router::new()
        .route("/v1/system/info", get(api::system::system_info))
        .route("/v1/system/health", get(api::system::system_health))
        .route(
            "/v1/menus",
            get(api::menus::list_menus).post(api::menus::create_menu),
        )
        .route("/v1/menus.tree", get(api::menus::menu_tree))
        .route(
            "/v1/menus/:id",
            get(api::menus::get_menu)
                .put(api::menus::update_menu)
                .delete(api::menus::delete_menu),
        )
        .route(
            "/v1/roles",
            get(api::roles::list_roles).post(api::roles::create_role),
        )
        .route("/v1/roles.select", get(api::roles::select_roles))
        .route(
            "/v1/roles/:id",
            get(api::roles::get_role)
                .put(api::roles::update_role)
                .delete(api::roles::delete_role),
        )
        .route(
            "/v1/users",
            get(api::users::list_users).post(api::users::create_user),
        )
        .route(
            "/v1/users/:id",
            get(api::users::get_user)
                .put(api::users::update_user)
                .delete(api::users::delete_user),
        )
        .route("/v1/users/:id/enable", patch(api::users::enable_user))
        .route("/v1/users/:id/disable", patch(api::users::disable_user))
        .route("/v1/users/:id/password", put(api::users::change_password))
        .route(
            "/v1/policy/reload",
            axum::routing::post(api::policy::reload_policy),
        )
        .route(
            "/v1/policy/check",
            axum::routing::post(api::policy::check_policy),
        )
        .route("/v1/policy/rules", get(api::policy::list_rules))
        .route("/v1/current/user", get(api::current::current_user))
        .route("/v1/current/menus.tree", get(api::current::current_menu_tree))
        .route("/v1/current/password", put(api::current::change_own_password))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            api::authz::authorize,
        ))
        .merge(
            utoipa_swagger_ui::SwaggerUi::new("/docs").url("/v1/openapi.json", ApiDoc::openapi()),
        )
        .layer(trace_layer)
        .with_state(state)
}
