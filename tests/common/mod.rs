#![allow(dead_code)]

//! Simulated protocol engine.
//!
//! Challenges are random ULIDs. A "response" is plain JSON echoing the
//! challenge, naming a credential id and, for logins, a counter. No
//! cryptography is involved; what gets exercised is the orchestration around
//! the engine.

use anyhow::{anyhow, Result};
use chrono::Utc;
use keyhold::webauthn::{
    ensure_counter_advanced, ensure_fresh, CeremonyService, CeremonySession, Credential,
    CredentialDescriptor, CredentialId, EngineError, LoginVerification, MemoryCredentialStore,
    ProtocolEngine, PublicKey, RelyingPartyConfig, RelyingPartyContext, RelyingPartyUser,
};
use serde_json::{json, Value};
use std::{sync::Arc, time::Duration};
use ulid::Ulid;

pub const LOCAL_ORIGIN: &str = "http://localhost:3000";
pub const EXAMPLE_ORIGIN: &str = "https://example.com";

pub struct RegistrationState {
    challenge: String,
    excluded: Vec<CredentialId>,
}

pub struct LoginState {
    challenge: String,
}

#[derive(Default)]
pub struct SimulatedEngine {
    /// Skip the exclusion check so duplicates reach the store.
    lenient: bool,
}

impl SimulatedEngine {
    pub fn lenient() -> Self {
        Self { lenient: true }
    }
}

fn check_challenge(expected: &str, response: &Value) -> Result<(), EngineError> {
    let answered = response
        .get("challenge")
        .and_then(Value::as_str)
        .ok_or_else(|| EngineError::MalformedResponse("missing challenge".to_string()))?;
    if answered != expected {
        return Err(EngineError::ChallengeMismatch);
    }
    Ok(())
}

fn credential_id(response: &Value) -> Result<CredentialId, EngineError> {
    response
        .get("credentialId")
        .and_then(Value::as_str)
        .and_then(CredentialId::decode)
        .ok_or_else(|| EngineError::MalformedResponse("missing credentialId".to_string()))
}

impl ProtocolEngine for SimulatedEngine {
    type RegistrationState = RegistrationState;
    type LoginState = LoginState;

    fn construct_registration_challenge(
        &self,
        rp: &RelyingPartyContext,
        user: &dyn RelyingPartyUser,
        exclusions: &[CredentialDescriptor],
    ) -> Result<(Value, RegistrationState), EngineError> {
        let challenge = Ulid::new().to_string();
        let exclude: Vec<Value> = exclusions
            .iter()
            .map(|descriptor| {
                json!({
                    "type": "public-key",
                    "id": descriptor.id.to_base64url(),
                    "transports": descriptor.transports,
                })
            })
            .collect();

        let options = json!({
            "publicKey": {
                "challenge": challenge,
                "rp": { "id": rp.id, "name": rp.name, "icon": rp.icon },
                "user": {
                    "id": user.user_handle().to_string(),
                    "name": user.name(),
                    "displayName": user.display_name(),
                    "icon": user.icon(),
                },
                "timeout": rp.policy.timeout_ms(),
                "attestation": rp.policy.attestation.as_str(),
                "authenticatorSelection": {
                    "authenticatorAttachment": rp.policy.attachment.map(|a| a.as_str()),
                    "userVerification": rp.policy.user_verification.as_str(),
                },
                "excludeCredentials": exclude,
            }
        });

        Ok((
            options,
            RegistrationState {
                challenge,
                excluded: exclusions.iter().map(|d| d.id.clone()).collect(),
            },
        ))
    }

    fn verify_registration_response(
        &self,
        rp: &RelyingPartyContext,
        _user: &dyn RelyingPartyUser,
        session: CeremonySession<RegistrationState>,
        response: &Value,
    ) -> Result<Credential, EngineError> {
        ensure_fresh(rp, &session)?;
        check_challenge(&session.state.challenge, response)?;

        let id = credential_id(response)?;
        if !self.lenient && session.state.excluded.contains(&id) {
            return Err(EngineError::ExcludedCredential);
        }

        Ok(Credential {
            public_key: PublicKey {
                algorithm: "ES256".to_string(),
                key: id.as_slice().to_vec(),
            },
            engine_data: id.as_slice().to_vec(),
            id,
            sign_count: 0,
            transports: vec!["internal".to_string()],
            created_at: Utc::now(),
        })
    }

    fn construct_login_challenge(
        &self,
        rp: &RelyingPartyContext,
        user: &dyn RelyingPartyUser,
    ) -> Result<(Value, LoginState), EngineError> {
        let challenge = Ulid::new().to_string();
        let allow: Vec<Value> = user
            .credentials()
            .iter()
            .map(|credential| json!({"type": "public-key", "id": credential.id.to_base64url()}))
            .collect();

        let options = json!({
            "publicKey": {
                "challenge": challenge,
                "rpId": rp.id,
                "timeout": rp.policy.timeout_ms(),
                "userVerification": rp.policy.user_verification.as_str(),
                "allowCredentials": allow,
            }
        });

        Ok((options, LoginState { challenge }))
    }

    fn verify_login_response(
        &self,
        rp: &RelyingPartyContext,
        user: &dyn RelyingPartyUser,
        session: CeremonySession<LoginState>,
        response: &Value,
    ) -> Result<LoginVerification, EngineError> {
        ensure_fresh(rp, &session)?;
        check_challenge(&session.state.challenge, response)?;

        let id = credential_id(response)?;
        let stored = user
            .credentials()
            .iter()
            .find(|credential| credential.id == id)
            .ok_or(EngineError::UnknownCredential)?;

        let counter = response
            .get("counter")
            .and_then(Value::as_u64)
            .and_then(|value| u32::try_from(value).ok())
            .unwrap_or(0);
        ensure_counter_advanced(stored.sign_count, counter)?;

        let mut credential = stored.clone();
        credential.sign_count = counter;
        Ok(LoginVerification {
            credential,
            counter,
        })
    }
}

pub type SimulatedService = CeremonyService<MemoryCredentialStore, SimulatedEngine>;

pub fn allowed_origins() -> Vec<String> {
    vec![LOCAL_ORIGIN.to_string(), EXAMPLE_ORIGIN.to_string()]
}

pub fn relying_party(timeout: Duration) -> Result<RelyingPartyConfig> {
    RelyingPartyConfig::new("Keyhold Test".to_string(), allowed_origins(), timeout)
}

pub fn service() -> Result<SimulatedService> {
    service_with(SimulatedEngine::default(), Duration::from_secs(60))
}

pub fn service_with(engine: SimulatedEngine, timeout: Duration) -> Result<SimulatedService> {
    Ok(CeremonyService::new(
        Arc::new(MemoryCredentialStore::new()),
        engine,
        relying_party(timeout)?,
    ))
}

pub fn challenge_of(options: &Value) -> Result<String> {
    options["publicKey"]["challenge"]
        .as_str()
        .map(ToString::to_string)
        .ok_or_else(|| anyhow!("options carry no challenge: {options}"))
}

pub fn registration_response(options: &Value, credential_id: &[u8]) -> Result<Value> {
    Ok(json!({
        "challenge": challenge_of(options)?,
        "credentialId": CredentialId::from(credential_id).to_base64url(),
    }))
}

pub fn login_response(options: &Value, credential_id: &[u8], counter: u32) -> Result<Value> {
    Ok(json!({
        "challenge": challenge_of(options)?,
        "credentialId": CredentialId::from(credential_id).to_base64url(),
        "counter": counter,
    }))
}
