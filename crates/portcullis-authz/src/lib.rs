//! Portcullis authorization primitives.
//!
//! # Purpose
//! Holds the Casbin model and the [`PolicyEngine`] that the admin service
//! projects role permissions and user memberships into.
//!
//! # Key invariants
//! - Role permissions are `(role, path, method)` triples; paths use
//!   `keyMatch2` patterns such as `/v1/users/:id`.
//! - Users reach permissions only through membership edges.
//!
//! # Examples
//! ```rust
//! # async fn demo() -> portcullis_authz::AuthzResult<()> {
//! use portcullis_authz::PolicyEngine;
//!
//! let engine = PolicyEngine::new().await?;
//! engine.add_permission("role-ops", "/v1/menus", "GET").await?;
//! engine.add_membership("user-1", "role-ops").await?;
//! assert!(engine.evaluate("user-1", "/v1/menus", "GET").await?);
//! # Ok(())
//! # }
//! ```
mod casbin_model;
mod engine;
mod errors;
mod types;

pub use casbin_model::{casbin_model, casbin_model_string};
pub use engine::PolicyEngine;
pub use errors::{AuthzError, AuthzResult};
pub use types::{Membership, PolicyRule, RuleSnapshot};
