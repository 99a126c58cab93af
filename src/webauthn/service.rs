//! Ceremony orchestration.
//!
//! `CeremonyService` ties the credential store, the session registry, the
//! relying-party resolver and a protocol engine together. Handlers talk to it
//! through the object-safe `Ceremonies` facade so the engine's session state
//! types stay out of the HTTP layer.

use crate::webauthn::{
    engine::ProtocolEngine,
    error::CeremonyError,
    models::{Credential, CredentialId, UserIdentity},
    relying_party::RelyingPartyConfig,
    sessions::SessionRegistry,
    store::CredentialStore,
};
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Outcome of a login begin.
#[derive(Debug, Clone, PartialEq)]
pub enum LoginChallenge {
    /// Assertion options to hand to the client.
    Options(Value),
    /// The identity has nothing to log in with.
    NotRegistered,
}

pub trait Ceremonies: Send + Sync {
    /// Start a registration, creating the user record on first contact.
    ///
    /// # Errors
    /// Returns `InvalidOrigin` or `Construction`.
    fn begin_registration(
        &self,
        origin: Option<&str>,
        identity: &UserIdentity,
    ) -> Result<Value, CeremonyError>;

    /// Verify an attestation and persist the new credential.
    ///
    /// # Errors
    /// Returns `InvalidOrigin`, `UserForbidden`, `NoPendingRegistration`,
    /// `Verification` or `Store(DuplicateCredential)`.
    fn finish_registration(
        &self,
        origin: Option<&str>,
        identity: &UserIdentity,
        response: &Value,
    ) -> Result<Credential, CeremonyError>;

    /// Start a login for an identity that owns at least one credential.
    ///
    /// # Errors
    /// Returns `InvalidOrigin` or `Construction`.
    fn begin_login(
        &self,
        origin: Option<&str>,
        identity: &UserIdentity,
    ) -> Result<LoginChallenge, CeremonyError>;

    /// Verify an assertion and persist the reported sign counter.
    ///
    /// # Errors
    /// Returns `InvalidOrigin`, `UserForbidden`, `NoPendingLogin`,
    /// `Verification` or `Store`.
    fn finish_login(
        &self,
        origin: Option<&str>,
        identity: &UserIdentity,
        response: &Value,
    ) -> Result<Credential, CeremonyError>;

    fn list_credentials(&self, identity: &UserIdentity) -> Vec<Credential>;

    fn remove_credential(&self, identity: &UserIdentity, credential_id: &CredentialId) -> bool;
}

pub struct CeremonyService<S, E: ProtocolEngine> {
    store: Arc<S>,
    engine: E,
    sessions: SessionRegistry<E::RegistrationState, E::LoginState>,
    relying_party: RelyingPartyConfig,
}

impl<S, E> CeremonyService<S, E>
where
    S: CredentialStore,
    E: ProtocolEngine,
{
    #[must_use]
    pub fn new(store: Arc<S>, engine: E, relying_party: RelyingPartyConfig) -> Self {
        Self {
            store,
            engine,
            sessions: SessionRegistry::new(),
            relying_party,
        }
    }

    #[must_use]
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    #[must_use]
    pub fn sessions(&self) -> &SessionRegistry<E::RegistrationState, E::LoginState> {
        &self.sessions
    }

    #[must_use]
    pub fn relying_party(&self) -> &RelyingPartyConfig {
        &self.relying_party
    }
}

impl<S, E> Ceremonies for CeremonyService<S, E>
where
    S: CredentialStore,
    E: ProtocolEngine,
{
    #[instrument(skip_all, fields(identity = %identity))]
    fn begin_registration(
        &self,
        origin: Option<&str>,
        identity: &UserIdentity,
    ) -> Result<Value, CeremonyError> {
        let rp = self.relying_party.resolve(origin)?;
        let user = self.store.create_or_get(identity);
        let exclusions = user.exclusions();

        let (options, state) = self
            .engine
            .construct_registration_challenge(&rp, &user, &exclusions)
            .map_err(|err| {
                warn!("Failed to construct registration challenge: {err}");
                CeremonyError::Construction(err)
            })?;

        let session = self.sessions.begin_registration(identity, state);
        info!(
            session = %session,
            rp_id = %rp.id,
            excluded = exclusions.len(),
            "registration started"
        );

        Ok(options)
    }

    #[instrument(skip_all, fields(identity = %identity))]
    fn finish_registration(
        &self,
        origin: Option<&str>,
        identity: &UserIdentity,
        response: &Value,
    ) -> Result<Credential, CeremonyError> {
        let rp = self.relying_party.resolve(origin)?;
        let user = self
            .store
            .get(identity)
            .map_err(|_| CeremonyError::UserForbidden)?;
        let session = self
            .sessions
            .take_registration(identity)
            .ok_or(CeremonyError::NoPendingRegistration)?;
        let handle = session.handle;

        let credential = self
            .engine
            .verify_registration_response(&rp, &user, session, response)
            .map_err(|err| {
                warn!(session = %handle, "Registration verification failed: {err}");
                CeremonyError::Verification(err)
            })?;

        self.store.add_credential(identity, credential.clone())?;
        info!(
            session = %handle,
            credential = %credential.id.to_base64url(),
            "registration finished"
        );

        Ok(credential)
    }

    #[instrument(skip_all, fields(identity = %identity))]
    fn begin_login(
        &self,
        origin: Option<&str>,
        identity: &UserIdentity,
    ) -> Result<LoginChallenge, CeremonyError> {
        let rp = self.relying_party.resolve(origin)?;

        let Ok(user) = self.store.get(identity) else {
            info!("login requested for unknown identity");
            return Ok(LoginChallenge::NotRegistered);
        };
        if user.credentials.is_empty() {
            info!("login requested for identity without credentials");
            return Ok(LoginChallenge::NotRegistered);
        }

        let (options, state) = self
            .engine
            .construct_login_challenge(&rp, &user)
            .map_err(|err| {
                warn!("Failed to construct login challenge: {err}");
                CeremonyError::Construction(err)
            })?;

        let session = self.sessions.begin_login(identity, state);
        info!(session = %session, rp_id = %rp.id, "login started");

        Ok(LoginChallenge::Options(options))
    }

    #[instrument(skip_all, fields(identity = %identity))]
    fn finish_login(
        &self,
        origin: Option<&str>,
        identity: &UserIdentity,
        response: &Value,
    ) -> Result<Credential, CeremonyError> {
        let rp = self.relying_party.resolve(origin)?;
        let user = self
            .store
            .get(identity)
            .map_err(|_| CeremonyError::UserForbidden)?;
        let session = self
            .sessions
            .take_login(identity)
            .ok_or(CeremonyError::NoPendingLogin)?;
        let handle = session.handle;

        let verification = self
            .engine
            .verify_login_response(&rp, &user, session, response)
            .map_err(|err| {
                warn!(session = %handle, "Login verification failed: {err}");
                CeremonyError::Verification(err)
            })?;

        self.store.update_sign_counter(
            identity,
            &verification.credential.id,
            verification.counter,
        )?;
        info!(
            session = %handle,
            credential = %verification.credential.id.to_base64url(),
            counter = verification.counter,
            "login finished"
        );

        Ok(verification.credential)
    }

    fn list_credentials(&self, identity: &UserIdentity) -> Vec<Credential> {
        self.store.list_credentials(identity)
    }

    #[instrument(skip_all, fields(identity = %identity))]
    fn remove_credential(&self, identity: &UserIdentity, credential_id: &CredentialId) -> bool {
        let removed = self.store.remove_credential(identity, credential_id);
        if removed {
            info!(credential = %credential_id.to_base64url(), "credential removed");
        }
        removed
    }
}
