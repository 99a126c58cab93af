//! Passkey protocol engine backed by `webauthn-rs`.
//!
//! Flow Overview:
//! 1) Build a `Webauthn` instance per allowed origin (cached after first use).
//! 2) Start passkey registration/authentication and adjust the emitted options
//!    to the relying party's policy (attachment, attestation, timeout, icon,
//!    transport hints).
//! 3) Finish ceremonies against the state kept in the session registry, then
//!    translate the result into the crate's `Credential` model.
//!
//! Security boundaries:
//! - Challenge, origin and RP ID checks are enforced by `webauthn-rs`.
//! - Session age and sign-counter regressions are checked here.
//! - Passkey data and raw authenticator payloads are never logged.

use crate::webauthn::{
    engine::{
        ensure_counter_advanced, ensure_fresh, EngineError, LoginVerification, ProtocolEngine,
    },
    models::{Credential, CredentialDescriptor, CredentialId, PublicKey, RelyingPartyUser},
    relying_party::{AuthenticatorAttachment, RelyingPartyContext},
    sessions::CeremonySession,
};
use chrono::Utc;
use dashmap::DashMap;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::debug;
use webauthn_rs::prelude::{
    CredentialID, Passkey, PasskeyAuthentication, PasskeyRegistration, PublicKeyCredential,
    RegisterPublicKeyCredential, Url, Webauthn, WebauthnBuilder, WebauthnError,
};

const INTERNAL_TRANSPORT: &str = "internal";

#[derive(Default)]
pub struct PasskeyEngine {
    webauthn_by_origin: DashMap<String, Arc<Webauthn>>,
}

impl PasskeyEngine {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn webauthn_for(&self, rp: &RelyingPartyContext) -> Result<Arc<Webauthn>, EngineError> {
        if let Some(webauthn) = self.webauthn_by_origin.get(&rp.origin) {
            return Ok(Arc::clone(webauthn.value()));
        }

        let rp_origin = Url::parse(&rp.origin)
            .map_err(|err| EngineError::Configuration(format!("{}: {err}", rp.origin)))?;
        let webauthn = WebauthnBuilder::new(&rp.id, &rp_origin)
            .map_err(|err| EngineError::Configuration(err.to_string()))?
            .rp_name(&rp.name)
            .build()
            .map_err(|err| EngineError::Configuration(err.to_string()))?;

        debug!(origin = %rp.origin, rp_id = %rp.id, "built webauthn instance");

        let webauthn = Arc::new(webauthn);
        self.webauthn_by_origin
            .insert(rp.origin.clone(), Arc::clone(&webauthn));
        Ok(webauthn)
    }
}

impl ProtocolEngine for PasskeyEngine {
    type RegistrationState = PasskeyRegistration;
    type LoginState = PasskeyAuthentication;

    fn construct_registration_challenge(
        &self,
        rp: &RelyingPartyContext,
        user: &dyn RelyingPartyUser,
        exclusions: &[CredentialDescriptor],
    ) -> Result<(Value, Self::RegistrationState), EngineError> {
        let webauthn = self.webauthn_for(rp)?;

        let exclude_credentials: Vec<CredentialID> = exclusions
            .iter()
            .map(|descriptor| descriptor.id.as_slice().to_vec().into())
            .collect();
        let exclude_credentials = (!exclude_credentials.is_empty()).then_some(exclude_credentials);

        let (challenge, registration) = webauthn
            .start_passkey_registration(
                user.user_handle(),
                user.name(),
                user.display_name(),
                exclude_credentials,
            )
            .map_err(map_webauthn_error)?;

        let mut options = serde_json::to_value(challenge)
            .map_err(|err| EngineError::Protocol(format!("Failed to encode options: {err}")))?;
        if let Some(public_key) = options.get_mut("publicKey").and_then(Value::as_object_mut) {
            apply_creation_policy(public_key, rp, user, exclusions);
        }

        Ok((options, registration))
    }

    fn verify_registration_response(
        &self,
        rp: &RelyingPartyContext,
        user: &dyn RelyingPartyUser,
        session: CeremonySession<Self::RegistrationState>,
        response: &Value,
    ) -> Result<Credential, EngineError> {
        ensure_fresh(rp, &session)?;

        let webauthn = self.webauthn_for(rp)?;
        let credential: RegisterPublicKeyCredential = serde_json::from_value(response.clone())
            .map_err(|err| EngineError::MalformedResponse(err.to_string()))?;

        let passkey = webauthn
            .finish_passkey_registration(&credential, &session.state)
            .map_err(map_webauthn_error)?;

        let id = CredentialId::from(passkey.cred_id().as_slice());
        if user.credentials().iter().any(|existing| existing.id == id) {
            return Err(EngineError::ExcludedCredential);
        }

        let key = serde_json::to_vec(passkey.get_public_key())
            .map_err(|err| EngineError::Protocol(format!("Failed to encode public key: {err}")))?;

        Ok(Credential {
            id,
            public_key: PublicKey {
                algorithm: format!("{:?}", passkey.cred_algorithm()),
                key,
            },
            sign_count: 0,
            transports: response_transports(response, rp),
            created_at: Utc::now(),
            engine_data: serialize_passkey(&passkey)?,
        })
    }

    fn construct_login_challenge(
        &self,
        rp: &RelyingPartyContext,
        user: &dyn RelyingPartyUser,
    ) -> Result<(Value, Self::LoginState), EngineError> {
        let webauthn = self.webauthn_for(rp)?;

        let passkeys = user
            .credentials()
            .iter()
            .map(|credential| deserialize_passkey(&credential.engine_data))
            .collect::<Result<Vec<_>, _>>()?;

        let (challenge, authentication) = webauthn
            .start_passkey_authentication(&passkeys)
            .map_err(map_webauthn_error)?;

        let mut options = serde_json::to_value(challenge)
            .map_err(|err| EngineError::Protocol(format!("Failed to encode options: {err}")))?;
        if let Some(public_key) = options.get_mut("publicKey").and_then(Value::as_object_mut) {
            apply_request_policy(public_key, rp, user.credentials());
        }

        Ok((options, authentication))
    }

    fn verify_login_response(
        &self,
        rp: &RelyingPartyContext,
        user: &dyn RelyingPartyUser,
        session: CeremonySession<Self::LoginState>,
        response: &Value,
    ) -> Result<LoginVerification, EngineError> {
        ensure_fresh(rp, &session)?;

        let webauthn = self.webauthn_for(rp)?;
        let credential: PublicKeyCredential = serde_json::from_value(response.clone())
            .map_err(|err| EngineError::MalformedResponse(err.to_string()))?;

        let result = webauthn
            .finish_passkey_authentication(&credential, &session.state)
            .map_err(map_webauthn_error)?;

        let id = CredentialId::from(result.cred_id().as_slice());
        let stored = user
            .credentials()
            .iter()
            .find(|credential| credential.id == id)
            .ok_or(EngineError::UnknownCredential)?;

        // `sign_count` is the authoritative counter. The passkey serialized in
        // `engine_data` keeps the counter and backup flags from registration.
        let counter = result.counter();
        ensure_counter_advanced(stored.sign_count, counter)?;

        let mut credential = stored.clone();
        credential.sign_count = counter;
        Ok(LoginVerification {
            credential,
            counter,
        })
    }
}

fn apply_creation_policy(
    public_key: &mut Map<String, Value>,
    rp: &RelyingPartyContext,
    user: &dyn RelyingPartyUser,
    exclusions: &[CredentialDescriptor],
) {
    public_key.insert(
        "attestation".to_string(),
        json!(rp.policy.attestation.as_str()),
    );
    public_key.insert("timeout".to_string(), json!(rp.policy.timeout_ms()));

    if let Some(entity) = public_key.get_mut("rp").and_then(Value::as_object_mut) {
        entity.insert("icon".to_string(), json!(rp.icon));
    }
    if let (Some(icon), Some(entity)) = (
        user.icon(),
        public_key.get_mut("user").and_then(Value::as_object_mut),
    ) {
        entity.insert("icon".to_string(), json!(icon));
    }

    let selection = public_key
        .entry("authenticatorSelection")
        .or_insert_with(|| json!({}));
    if let Some(selection) = selection.as_object_mut() {
        match rp.policy.attachment {
            Some(attachment) => {
                selection.insert(
                    "authenticatorAttachment".to_string(),
                    json!(attachment.as_str()),
                );
            }
            None => {
                selection.remove("authenticatorAttachment");
            }
        }
        selection.insert(
            "userVerification".to_string(),
            json!(rp.policy.user_verification.as_str()),
        );
    }

    if let Some(excluded) = public_key
        .get_mut("excludeCredentials")
        .and_then(Value::as_array_mut)
    {
        for entry in excluded {
            attach_transports(entry, exclusions.iter().map(|d| (&d.id, &d.transports)));
        }
    }
}

fn apply_request_policy(
    public_key: &mut Map<String, Value>,
    rp: &RelyingPartyContext,
    credentials: &[Credential],
) {
    public_key.insert("timeout".to_string(), json!(rp.policy.timeout_ms()));
    public_key.insert(
        "userVerification".to_string(),
        json!(rp.policy.user_verification.as_str()),
    );

    if let Some(allowed) = public_key
        .get_mut("allowCredentials")
        .and_then(Value::as_array_mut)
    {
        for entry in allowed {
            attach_transports(entry, credentials.iter().map(|c| (&c.id, &c.transports)));
        }
    }
}

fn attach_transports<'a>(
    entry: &mut Value,
    known: impl Iterator<Item = (&'a CredentialId, &'a Vec<String>)>,
) {
    let Some(encoded) = entry.get("id").and_then(Value::as_str) else {
        return;
    };
    let Some(id) = CredentialId::decode(encoded) else {
        return;
    };

    let transports = known
        .filter(|(known_id, _)| **known_id == id)
        .map(|(_, transports)| transports)
        .next();

    if let (Some(transports), Some(entry)) = (transports, entry.as_object_mut()) {
        if !transports.is_empty() {
            entry.insert("transports".to_string(), json!(transports));
        }
    }
}

fn response_transports(response: &Value, rp: &RelyingPartyContext) -> Vec<String> {
    let reported: Vec<String> = response
        .get("response")
        .and_then(|inner| inner.get("transports"))
        .and_then(Value::as_array)
        .map(|values| {
            values
                .iter()
                .filter_map(Value::as_str)
                .map(ToString::to_string)
                .collect()
        })
        .unwrap_or_default();

    if !reported.is_empty() {
        return reported;
    }

    match rp.policy.attachment {
        Some(AuthenticatorAttachment::Platform) => vec![INTERNAL_TRANSPORT.to_string()],
        _ => Vec::new(),
    }
}

fn map_webauthn_error(err: WebauthnError) -> EngineError {
    match err {
        WebauthnError::MismatchedChallenge => EngineError::ChallengeMismatch,
        other => EngineError::Protocol(other.to_string()),
    }
}

/// Serialize a passkey for storage.
///
/// # Errors
/// Returns error if serialization fails.
pub fn serialize_passkey(passkey: &Passkey) -> Result<Vec<u8>, EngineError> {
    serde_json::to_vec(passkey)
        .map_err(|err| EngineError::Protocol(format!("Failed to serialize passkey: {err}")))
}

/// Deserialize a stored passkey.
///
/// # Errors
/// Returns error if deserialization fails.
pub fn deserialize_passkey(data: &[u8]) -> Result<Passkey, EngineError> {
    serde_json::from_slice(data)
        .map_err(|err| EngineError::Protocol(format!("Failed to deserialize passkey: {err}")))
}
