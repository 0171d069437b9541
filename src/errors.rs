use thiserror::Error;

use crate::store::StoreError;

/// Error taxonomy for the access-control core.
///
/// `authenticate`/`authorize` collapse `InvalidCredential` and `NotFound`
/// into a plain `false` so callers cannot distinguish "no such credential"
/// from "malformed credential". Everything else always propagates,
/// `Configuration` in particular.
#[derive(Debug, Error)]
pub enum AccessError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("credential not found")]
    NotFound,

    #[error("invalid credential: {0}")]
    InvalidCredential(&'static str),

    #[error("token collision")]
    Collision,

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl AccessError {
    /// True for the ordinary bad-credential conditions that the engine
    /// downgrades to `false` instead of surfacing.
    pub fn is_credential_failure(&self) -> bool {
        matches!(
            self,
            AccessError::InvalidCredential(_) | AccessError::NotFound
        )
    }
}
