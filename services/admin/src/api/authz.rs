//! Request-time authorization.
//!
//! # Purpose
//! Resolves the caller from the `x-portcullis-user` header and asks the policy
//! engine whether that user may call the request's method on its path.
//!
//! # Key invariants and assumptions
//! - The header carries a user id; the configured root username bypasses the
//!   engine entirely.
//! - System endpoints and API docs are always public.
//! - `/v1/current/` endpoints need an identity but no grant; they only ever
//!   act on the caller.
//! - A missing identity is 401, a denied decision is 403.
//!
//! # Security considerations
//! - Token issuance and verification happen upstream; this layer trusts the
//!   header it is given.
use crate::api::error::{ApiError, api_forbidden, api_internal_message, api_unauthorized};
use crate::app::AppState;
use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;

pub const IDENTITY_HEADER: &str = "x-portcullis-user";

pub fn identity(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(IDENTITY_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

pub fn is_public(path: &str) -> bool {
    path.starts_with("/v1/system/") || path == "/v1/openapi.json" || path.starts_with("/docs")
}

pub fn is_self_service(path: &str) -> bool {
    path.starts_with("/v1/current/")
}

fn record(decision: &'static str) {
    metrics::counter!("portcullis_authz_decisions_total", "decision" => decision).increment(1);
}

pub(crate) async fn authorize(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if !state.enforce || is_public(request.uri().path()) {
        return Ok(next.run(request).await);
    }
    let Some(user) = identity(request.headers()).map(str::to_string) else {
        record("unauthenticated");
        return Err(api_unauthorized("missing caller identity"));
    };
    if user == state.root_username {
        record("root");
        return Ok(next.run(request).await);
    }
    if is_self_service(request.uri().path()) {
        record("self");
        return Ok(next.run(request).await);
    }

    let path = request.uri().path().to_string();
    let method = request.method().as_str().to_string();
    let allowed = state
        .engine
        .evaluate(&user, &path, &method)
        .await
        .map_err(|err| {
            tracing::error!(error = %err, user = %user, path = %path, method = %method, "authorization check failed");
            api_internal_message("authorization check failed")
        })?;
    if !allowed {
        record("deny");
        tracing::debug!(user = %user, path = %path, method = %method, "request denied");
        return Err(api_forbidden("permission denied"));
    }
    record("allow");
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_ignores_blank_and_invalid_headers() {
        let mut headers = HeaderMap::new();
        assert_eq!(identity(&headers), None);
        headers.insert(IDENTITY_HEADER, "  ".parse().expect("header"));
        assert_eq!(identity(&headers), None);
        headers.insert(
            IDENTITY_HEADER,
            axum::http::HeaderValue::from_bytes(b"\xFF").expect("header"),
        );
        assert_eq!(identity(&headers), None);
        headers.insert(IDENTITY_HEADER, "u-1".parse().expect("header"));
        assert_eq!(identity(&headers), Some("u-1"));
    }

    #[test]
    fn system_and_docs_are_public() {
        assert!(is_public("/v1/system/health"));
        assert!(is_public("/v1/openapi.json"));
        assert!(is_public("/docs/"));
        assert!(!is_public("/v1/menus"));
        assert!(!is_public("/v1/systematic"));
    }

    #[test]
    fn only_current_paths_are_self_service() {
        assert!(is_self_service("/v1/current/user"));
        assert!(is_self_service("/v1/current/menus.tree"));
        assert!(!is_self_service("/v1/current"));
        assert!(!is_self_service("/v1/users/current"));
    }
}
