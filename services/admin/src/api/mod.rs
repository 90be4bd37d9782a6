//! Admin HTTP API module.
//!
//! # Purpose
//! Route handler modules plus the helpers every handler shares for building
//! an operation context from the request.
pub mod authz;
pub mod current;
pub mod error;
pub mod menus;
pub mod openapi;
pub mod policy;
pub mod roles;
pub mod system;
pub mod types;
pub mod users;

use crate::app::AppState;
use crate::context::OpContext;
use axum::http::HeaderMap;

/// Context for one request: the calling identity and the configured deadline.
pub(crate) fn op_context(state: &AppState, headers: &HeaderMap) -> OpContext {
    let actor = authz::identity(headers).unwrap_or("anonymous");
    OpContext::new(actor).with_timeout(state.request_timeout)
}
