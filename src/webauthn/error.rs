use crate::webauthn::engine::EngineError;
use thiserror::Error;

/// Credential store failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("user not found")]
    NotFound,
    #[error("unknown user")]
    UnknownUser,
    #[error("unknown credential")]
    UnknownCredential,
    #[error("credential already registered")]
    DuplicateCredential,
}

/// Ceremony failures surfaced to callers.
#[derive(Debug, Error)]
pub enum CeremonyError {
    #[error("invalid origin: {0}")]
    InvalidOrigin(String),
    #[error("user forbidden")]
    UserForbidden,
    #[error("no pending registration")]
    NoPendingRegistration,
    #[error("no pending login")]
    NoPendingLogin,
    #[error("challenge construction failed: {0}")]
    Construction(#[source] EngineError),
    #[error("verification failed: {0}")]
    Verification(#[source] EngineError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

