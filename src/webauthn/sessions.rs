//! In-flight ceremony sessions.
//!
//! Registration and login sessions live in separate namespaces keyed by
//! identity. Beginning a ceremony replaces any earlier session of the same
//! kind for that identity, and finishing one always removes it, so a
//! challenge can be answered at most once.

use crate::webauthn::models::UserIdentity;
use dashmap::DashMap;
use std::{fmt, time::Instant};
use tracing::debug;
use ulid::Ulid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CeremonyKind {
    Registration,
    Login,
}

impl fmt::Display for CeremonyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Registration => f.write_str("registration"),
            Self::Login => f.write_str("login"),
        }
    }
}

/// Identifier of one issued challenge, used to correlate logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionHandle(Ulid);

impl SessionHandle {
    fn generate() -> Self {
        Self(Ulid::new())
    }
}

impl fmt::Display for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug)]
pub struct CeremonySession<S> {
    pub handle: SessionHandle,
    pub identity: UserIdentity,
    pub kind: CeremonyKind,
    pub created_at: Instant,
    pub state: S,
}

pub struct SessionRegistry<R, L> {
    registrations: DashMap<UserIdentity, CeremonySession<R>>,
    logins: DashMap<UserIdentity, CeremonySession<L>>,
}

impl<R, L> Default for SessionRegistry<R, L> {
    fn default() -> Self {
        Self {
            registrations: DashMap::new(),
            logins: DashMap::new(),
        }
    }
}

impl<R, L> SessionRegistry<R, L> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin_registration(&self, identity: &UserIdentity, state: R) -> SessionHandle {
        begin(&self.registrations, CeremonyKind::Registration, identity, state)
    }

    pub fn begin_login(&self, identity: &UserIdentity, state: L) -> SessionHandle {
        begin(&self.logins, CeremonyKind::Login, identity, state)
    }

    pub fn take_registration(&self, identity: &UserIdentity) -> Option<CeremonySession<R>> {
        self.registrations
            .remove(identity)
            .map(|(_, session)| session)
    }

    pub fn take_login(&self, identity: &UserIdentity) -> Option<CeremonySession<L>> {
        self.logins.remove(identity).map(|(_, session)| session)
    }

    #[must_use]
    pub fn has_session(&self, kind: CeremonyKind, identity: &UserIdentity) -> bool {
        match kind {
            CeremonyKind::Registration => self.registrations.contains_key(identity),
            CeremonyKind::Login => self.logins.contains_key(identity),
        }
    }

    #[must_use]
    pub fn len(&self, kind: CeremonyKind) -> usize {
        match kind {
            CeremonyKind::Registration => self.registrations.len(),
            CeremonyKind::Login => self.logins.len(),
        }
    }
}

fn begin<S>(
    sessions: &DashMap<UserIdentity, CeremonySession<S>>,
    kind: CeremonyKind,
    identity: &UserIdentity,
    state: S,
) -> SessionHandle {
    let handle = SessionHandle::generate();
    let previous = sessions.insert(
        identity.clone(),
        CeremonySession {
            handle,
            identity: identity.clone(),
            kind,
            created_at: Instant::now(),
            state,
        },
    );

    if let Some(previous) = previous {
        debug!(
            identity = %identity,
            kind = %kind,
            replaced = %previous.handle,
            session = %handle,
            "replaced pending session"
        );
    }

    handle
}
