//! # Keyhold (WebAuthn ceremony service)
//!
//! `keyhold` runs the relying-party side of WebAuthn registration and login
//! ceremonies. It hands out challenges, keeps the pending ceremony state per
//! user, binds the authenticator's answer back to that state and stores the
//! resulting public-key credentials.
//!
//! ## Layout
//!
//! - [`webauthn`]: the ceremony core. Credential store, session registry,
//!   relying-party resolution and the orchestrator. Cryptographic checks live
//!   behind the `ProtocolEngine` trait; `PasskeyEngine` implements it with
//!   `webauthn-rs`.
//! - [`api`]: the axum HTTP surface and its `OpenAPI` document.
//! - [`cli`]: argument parsing, telemetry and the server action.
//!
//! ## Storage
//!
//! Credentials are kept in memory and are lost on restart. The store is a
//! trait so a durable backend can replace `MemoryCredentialStore` without
//! touching ceremony logic.

pub mod api;
pub mod cli;
pub mod webauthn;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_commit_hash_format() {
        if GIT_COMMIT_HASH == "unknown" {
            // non-git build
            return;
        }
        assert!(
            GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()),
            "GIT_COMMIT_HASH should be a hex string, got: {GIT_COMMIT_HASH}"
        );
        assert!(GIT_COMMIT_HASH.len() >= 7);
    }
}
