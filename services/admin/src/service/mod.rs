//! Business operations over the admin store.
//!
//! # Purpose
//! Each service validates input, runs its writes through
//! [`tx::run_in_transaction`], and re-projects the affected subjects into the
//! policy engine once the transaction has committed.
//!
//! # Error contract
//! [`ServiceError::Policy`] means the write is durable but the engine may be
//! stale until the next projection of that subject, a reload, or the
//! reconciliation loop.
use crate::context::DeadlineExceeded;
use crate::store::StoreError;
use thiserror::Error;

pub mod diff;
pub mod menu;
pub mod password;
pub mod policy;
pub mod role;
#[cfg(test)]
pub(crate) mod testing;
pub mod tx;
pub mod user;

pub use menu::MenuService;
pub use policy::{PolicyProjector, ProjectionError, ProjectionSummary, spawn_reconcile_task};
pub use role::RoleService;
pub use user::UserService;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Validation(String),
    /// The caller is known but may not use this operation.
    #[error("{0}")]
    Forbidden(String),
    #[error("storage failure: {0}")]
    Storage(#[source] StoreError),
    #[error("write committed but policy projection failed: {0}")]
    Policy(#[from] ProjectionError),
    #[error("operation cancelled")]
    Cancelled,
}

pub type ServiceResult<T> = Result<T, ServiceError>;

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => ServiceError::NotFound(format!("{what} not found")),
            StoreError::Conflict(what) => ServiceError::Validation(format!("duplicate value: {what}")),
            other => ServiceError::Storage(other),
        }
    }
}

impl From<DeadlineExceeded> for ServiceError {
    fn from(_: DeadlineExceeded) -> Self {
        ServiceError::Cancelled
    }
}

pub(crate) fn validation(message: impl Into<String>) -> ServiceError {
    ServiceError::Validation(message.into())
}

pub(crate) fn forbidden(message: impl Into<String>) -> ServiceError {
    ServiceError::Forbidden(message.into())
}

pub(crate) fn not_found(message: impl Into<String>) -> ServiceError {
    ServiceError::NotFound(message.into())
}
