use admin::app::{AppState, build_router};
use admin::store::memory::InMemoryStore;
use axum::routing::RouterIntoService;
use portcullis_authz::PolicyEngine;
use std::sync::Arc;
use std::time::Duration;

pub const ROOT: &str = "root";

pub async fn read_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json")
}

#[allow(dead_code)]
pub async fn memory_state(enforce: bool) -> AppState {
    let engine = Arc::new(PolicyEngine::new().await.expect("engine"));
    AppState::new(
        Arc::new(InMemoryStore::new()),
        engine,
        ROOT,
        enforce,
        Duration::from_secs(5),
    )
}

#[allow(dead_code)]
pub async fn memory_app(enforce: bool) -> (RouterIntoService<axum::body::Body, ()>, AppState) {
    let state = memory_state(enforce).await;
    (build_router(state.clone()).into_service(), state)
}
