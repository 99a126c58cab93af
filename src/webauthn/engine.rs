//! Protocol engine seam.
//!
//! The orchestrator never touches cryptographic material. It hands the
//! relying-party context, the user and the pending session to a
//! `ProtocolEngine`, which builds challenge options and verifies the
//! authenticator's answers.

use crate::webauthn::{
    models::{Credential, CredentialDescriptor, RelyingPartyUser},
    relying_party::RelyingPartyContext,
    sessions::CeremonySession,
};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("relying party configuration rejected: {0}")]
    Configuration(String),
    #[error("malformed authenticator response: {0}")]
    MalformedResponse(String),
    #[error("challenge expired")]
    ChallengeExpired,
    #[error("challenge mismatch")]
    ChallengeMismatch,
    #[error("credential is excluded")]
    ExcludedCredential,
    #[error("unknown credential")]
    UnknownCredential,
    #[error("sign counter regressed from {stored} to {reported}")]
    CounterRegression { stored: u32, reported: u32 },
    #[error("{0}")]
    Protocol(String),
}

/// Result of a verified login assertion.
#[derive(Debug, Clone)]
pub struct LoginVerification {
    /// The matched credential, already carrying `counter`.
    pub credential: Credential,
    pub counter: u32,
}

pub trait ProtocolEngine: Send + Sync {
    /// Engine state kept between registration begin and finish.
    type RegistrationState: Send + Sync;
    /// Engine state kept between login begin and finish.
    type LoginState: Send + Sync;

    /// Build registration options for `user`, refusing `exclusions`.
    ///
    /// # Errors
    /// Returns error if the engine cannot build a challenge.
    fn construct_registration_challenge(
        &self,
        rp: &RelyingPartyContext,
        user: &dyn RelyingPartyUser,
        exclusions: &[CredentialDescriptor],
    ) -> Result<(Value, Self::RegistrationState), EngineError>;

    /// Verify an attestation response against the pending session.
    ///
    /// # Errors
    /// Returns error if the response does not verify.
    fn verify_registration_response(
        &self,
        rp: &RelyingPartyContext,
        user: &dyn RelyingPartyUser,
        session: CeremonySession<Self::RegistrationState>,
        response: &Value,
    ) -> Result<Credential, EngineError>;

    /// Build login options scoped to the user's credentials.
    ///
    /// # Errors
    /// Returns error if the engine cannot build a challenge.
    fn construct_login_challenge(
        &self,
        rp: &RelyingPartyContext,
        user: &dyn RelyingPartyUser,
    ) -> Result<(Value, Self::LoginState), EngineError>;

    /// Verify an assertion against the pending session and the user's keys.
    ///
    /// # Errors
    /// Returns error if the assertion does not verify.
    fn verify_login_response(
        &self,
        rp: &RelyingPartyContext,
        user: &dyn RelyingPartyUser,
        session: CeremonySession<Self::LoginState>,
        response: &Value,
    ) -> Result<LoginVerification, EngineError>;
}

/// Reject sessions older than the policy timeout.
///
/// # Errors
/// Returns `EngineError::ChallengeExpired` when the session is too old.
pub fn ensure_fresh<S>(
    rp: &RelyingPartyContext,
    session: &CeremonySession<S>,
) -> Result<(), EngineError> {
    if session.created_at.elapsed() >= rp.policy.timeout {
        return Err(EngineError::ChallengeExpired);
    }
    Ok(())
}

/// Reject a reported counter that does not move past the stored one.
///
/// Authenticators that do not implement counters report zero forever; that
/// is accepted as long as the stored value is zero too.
///
/// # Errors
/// Returns `EngineError::CounterRegression` on a possible clone.
pub fn ensure_counter_advanced(stored: u32, reported: u32) -> Result<(), EngineError> {
    if (stored != 0 || reported != 0) && reported <= stored {
        return Err(EngineError::CounterRegression { stored, reported });
    }
    Ok(())
}
