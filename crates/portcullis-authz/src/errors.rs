use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthzError {
    #[error("invalid model: {0}")]
    Model(String),
    #[error("enforcer error: {0}")]
    Enforcer(#[from] casbin::Error),
    #[error("invalid rule: {0}")]
    InvalidRule(String),
}

pub type AuthzResult<T> = Result<T, AuthzError>;
