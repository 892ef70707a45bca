use thiserror::Error;

use crate::stores::StoreError;

/// Caller-facing failure taxonomy for both engines. The first four variants
/// are terminal for the request; `Store` wraps data-store failures, the only
/// class a caller may retry (nothing is committed before the single finalize
/// transaction).
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Forbidden(&'static str),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Validation(String),
    #[error("storage error: {0}")]
    Store(#[from] StoreError),
}
