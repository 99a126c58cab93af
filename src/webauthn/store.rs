//! Credential store.
//!
//! The store maps a `UserIdentity` to its `UserRecord`. The in-memory
//! implementation keeps one `DashMap` entry per identity, so every operation
//! runs under the shard lock of that identity and operations on unrelated
//! identities proceed in parallel.

use crate::webauthn::{
    error::StoreError,
    models::{Credential, CredentialId, UserIdentity, UserRecord},
};
use dashmap::{mapref::entry::Entry, DashMap};
use tracing::debug;

pub trait CredentialStore: Send + Sync {
    /// Read-only lookup.
    ///
    /// # Errors
    /// Returns `StoreError::NotFound` if the identity was never created.
    fn get(&self, identity: &UserIdentity) -> Result<UserRecord, StoreError>;

    /// Return the existing record or create an empty one.
    fn create_or_get(&self, identity: &UserIdentity) -> UserRecord;

    /// Credentials of a user; empty for unknown identities.
    fn list_credentials(&self, identity: &UserIdentity) -> Vec<Credential>;

    /// Append a credential.
    ///
    /// # Errors
    /// Returns `UnknownUser` if the identity was never created and
    /// `DuplicateCredential` if the user already owns this credential id.
    fn add_credential(
        &self,
        identity: &UserIdentity,
        credential: Credential,
    ) -> Result<(), StoreError>;

    /// Remove a credential by exact id. Returns whether anything was removed.
    fn remove_credential(&self, identity: &UserIdentity, credential_id: &CredentialId) -> bool;

    /// Persist the sign counter reported by the last successful login.
    ///
    /// # Errors
    /// Returns `UnknownUser` or `UnknownCredential` when nothing matches.
    fn update_sign_counter(
        &self,
        identity: &UserIdentity,
        credential_id: &CredentialId,
        counter: u32,
    ) -> Result<(), StoreError>;
}

#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    users: DashMap<UserIdentity, UserRecord>,
}

impl MemoryCredentialStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn user_count(&self) -> usize {
        self.users.len()
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn get(&self, identity: &UserIdentity) -> Result<UserRecord, StoreError> {
        self.users
            .get(identity)
            .map(|record| record.value().clone())
            .ok_or(StoreError::NotFound)
    }

    fn create_or_get(&self, identity: &UserIdentity) -> UserRecord {
        match self.users.entry(identity.clone()) {
            Entry::Occupied(entry) => entry.get().clone(),
            Entry::Vacant(entry) => {
                debug!(identity = %identity, "creating user record");
                entry.insert(UserRecord::new(identity.clone())).value().clone()
            }
        }
    }

    fn list_credentials(&self, identity: &UserIdentity) -> Vec<Credential> {
        self.users
            .get(identity)
            .map(|record| record.credentials.clone())
            .unwrap_or_default()
    }

    fn add_credential(
        &self,
        identity: &UserIdentity,
        credential: Credential,
    ) -> Result<(), StoreError> {
        let mut record = self.users.get_mut(identity).ok_or(StoreError::UnknownUser)?;

        if record.find_credential(&credential.id).is_some() {
            return Err(StoreError::DuplicateCredential);
        }

        record.credentials.push(credential);
        Ok(())
    }

    fn remove_credential(&self, identity: &UserIdentity, credential_id: &CredentialId) -> bool {
        let Some(mut record) = self.users.get_mut(identity) else {
            return false;
        };

        let before = record.credentials.len();
        record
            .credentials
            .retain(|credential| &credential.id != credential_id);
        before != record.credentials.len()
    }

    fn update_sign_counter(
        &self,
        identity: &UserIdentity,
        credential_id: &CredentialId,
        counter: u32,
    ) -> Result<(), StoreError> {
        let mut record = self.users.get_mut(identity).ok_or(StoreError::UnknownUser)?;

        let credential = record
            .credentials
            .iter_mut()
            .find(|credential| &credential.id == credential_id)
            .ok_or(StoreError::UnknownCredential)?;
        credential.sign_count = counter;
        Ok(())
    }
}
