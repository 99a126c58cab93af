//! Relying-party context resolution.
//!
//! Every ceremony runs against a `RelyingPartyContext` derived from the origin
//! the request claims to come from. The claimed origin is untrusted input: it
//! is parsed, normalized to `scheme://host[:port]` and must match one of the
//! configured origins before any ceremony state is touched.

use crate::webauthn::error::CeremonyError;
use anyhow::{anyhow, Context, Result};
use std::{str::FromStr, time::Duration};
use tracing::warn;
use url::Url;

pub const DEFAULT_RP_NAME: &str = "Keyhold";
pub const DEFAULT_ORIGIN: &str = "http://localhost:3000";
pub const DEFAULT_CEREMONY_TIMEOUT_MS: u64 = 1_800_000;
const ICON_PATH: &str = "/favicon.ico";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttestationPreference {
    None,
    Indirect,
    Direct,
}

impl AttestationPreference {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Indirect => "indirect",
            Self::Direct => "direct",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthenticatorAttachment {
    Platform,
    CrossPlatform,
}

impl AuthenticatorAttachment {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Platform => "platform",
            Self::CrossPlatform => "cross-platform",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserVerification {
    Required,
    Preferred,
    Discouraged,
}

impl UserVerification {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Required => "required",
            Self::Preferred => "preferred",
            Self::Discouraged => "discouraged",
        }
    }
}

impl FromStr for AttestationPreference {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "indirect" => Ok(Self::Indirect),
            "direct" => Ok(Self::Direct),
            other => Err(anyhow!("Unknown attestation preference: {other}")),
        }
    }
}

impl FromStr for AuthenticatorAttachment {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "platform" => Ok(Self::Platform),
            "cross-platform" => Ok(Self::CrossPlatform),
            other => Err(anyhow!("Unknown authenticator attachment: {other}")),
        }
    }
}

impl FromStr for UserVerification {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "required" => Ok(Self::Required),
            "preferred" => Ok(Self::Preferred),
            "discouraged" => Ok(Self::Discouraged),
            other => Err(anyhow!("Unknown user verification requirement: {other}")),
        }
    }
}

/// Security knobs applied to every ceremony.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CeremonyPolicy {
    pub attestation: AttestationPreference,
    pub attachment: Option<AuthenticatorAttachment>,
    pub user_verification: UserVerification,
    pub timeout: Duration,
}

impl Default for CeremonyPolicy {
    fn default() -> Self {
        Self {
            attestation: AttestationPreference::None,
            attachment: Some(AuthenticatorAttachment::Platform),
            user_verification: UserVerification::Required,
            timeout: Duration::from_millis(DEFAULT_CEREMONY_TIMEOUT_MS),
        }
    }
}

impl CeremonyPolicy {
    #[must_use]
    pub fn timeout_ms(&self) -> u64 {
        u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelyingPartyContext {
    pub name: String,
    /// Relying-party identifier, the origin's hostname.
    pub id: String,
    pub origin: String,
    pub icon: String,
    pub policy: CeremonyPolicy,
}

#[derive(Debug, Clone)]
pub struct RelyingPartyConfig {
    name: String,
    allowed_origins: Vec<String>,
    policy: CeremonyPolicy,
}

impl RelyingPartyConfig {
    /// Create a relying-party configuration.
    ///
    /// # Errors
    /// Returns error if the name is empty, any origin is invalid, or no
    /// origin is configured.
    pub fn new(name: String, allowed_origins: Vec<String>, timeout: Duration) -> Result<Self> {
        if name.trim().is_empty() {
            return Err(anyhow!("Relying party name must not be empty"));
        }

        let allowed_origins = normalize_origins(allowed_origins)?;
        if allowed_origins.is_empty() {
            return Err(anyhow!("Allowed origins must not be empty"));
        }

        if timeout.is_zero() {
            return Err(anyhow!("Ceremony timeout must be greater than zero"));
        }

        Ok(Self {
            name,
            allowed_origins,
            policy: CeremonyPolicy {
                timeout,
                ..CeremonyPolicy::default()
            },
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn allowed_origins(&self) -> &[String] {
        &self.allowed_origins
    }

    #[must_use]
    pub fn policy(&self) -> &CeremonyPolicy {
        &self.policy
    }

    /// Replace attestation, attachment and user verification. The timeout
    /// validated by `new` is kept.
    #[must_use]
    pub fn with_policy(mut self, policy: CeremonyPolicy) -> Self {
        self.policy = CeremonyPolicy {
            timeout: self.policy.timeout,
            ..policy
        };
        self
    }

    /// Derive the context for a request claiming `origin`. `None` selects the
    /// first configured origin.
    ///
    /// # Errors
    /// Returns `CeremonyError::InvalidOrigin` if the origin cannot be parsed
    /// or is not allowed.
    pub fn resolve(&self, origin: Option<&str>) -> Result<RelyingPartyContext, CeremonyError> {
        let claimed = origin
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| self.allowed_origins[0].as_str());

        let parsed = Url::parse(claimed)
            .map_err(|err| CeremonyError::InvalidOrigin(format!("{claimed}: {err}")))?;
        let host = parsed
            .host_str()
            .ok_or_else(|| CeremonyError::InvalidOrigin(format!("{claimed}: missing host")))?
            .to_string();
        let origin = origin_of(&parsed, &host);

        if !self.allowed_origins.contains(&origin) {
            warn!(origin = %origin, "origin not allowed");
            return Err(CeremonyError::InvalidOrigin(format!(
                "{origin}: not allowed"
            )));
        }

        Ok(RelyingPartyContext {
            name: self.name.clone(),
            id: host,
            icon: format!("{origin}{ICON_PATH}"),
            origin,
            policy: self.policy.clone(),
        })
    }
}

fn origin_of(parsed: &Url, host: &str) -> String {
    let port = parsed
        .port()
        .map_or_else(String::new, |port| format!(":{port}"));
    format!("{}://{}{}", parsed.scheme(), host, port)
}

fn normalize_origins(origins: Vec<String>) -> Result<Vec<String>> {
    let mut normalized = Vec::new();
    for origin in origins {
        let origin = normalize_origin(&origin)?;
        if !normalized.contains(&origin) {
            normalized.push(origin);
        }
    }
    Ok(normalized)
}

/// Normalize an origin to `scheme://host[:port]`.
///
/// # Errors
/// Returns error if the value is not a URL with a host.
pub fn normalize_origin(origin: &str) -> Result<String> {
    let parsed =
        Url::parse(origin.trim()).with_context(|| format!("Invalid origin URL: {origin}"))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| anyhow!("Origin must include a host: {origin}"))?;
    Ok(origin_of(&parsed, host))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Result<RelyingPartyConfig> {
        RelyingPartyConfig::new(
            "Example".to_string(),
            vec![
                "https://example.com".to_string(),
                "http://localhost:3000/".to_string(),
            ],
            Duration::from_millis(DEFAULT_CEREMONY_TIMEOUT_MS),
        )
    }

    #[test]
    fn resolves_referer_to_context() -> Result<()> {
        let context = config()?.resolve(Some("https://example.com/index.html?x=1"))?;
        assert_eq!(context.id, "example.com");
        assert_eq!(context.origin, "https://example.com");
        assert_eq!(context.icon, "https://example.com/favicon.ico");
        assert_eq!(context.name, "Example");
        assert_eq!(context.policy.attestation, AttestationPreference::None);
        assert_eq!(
            context.policy.attachment,
            Some(AuthenticatorAttachment::Platform)
        );
        assert_eq!(context.policy.user_verification, UserVerification::Required);
        assert_eq!(context.policy.timeout_ms(), 1_800_000);
        Ok(())
    }

    #[test]
    fn policy_values_parse() -> Result<()> {
        assert_eq!(
            "Direct".parse::<AttestationPreference>()?,
            AttestationPreference::Direct
        );
        assert_eq!(
            "cross-platform".parse::<AuthenticatorAttachment>()?,
            AuthenticatorAttachment::CrossPlatform
        );
        assert_eq!(
            " preferred ".parse::<UserVerification>()?,
            UserVerification::Preferred
        );
        assert!("always".parse::<UserVerification>().is_err());
        assert!("usb".parse::<AuthenticatorAttachment>().is_err());
        Ok(())
    }

    #[test]
    fn with_policy_keeps_timeout() -> Result<()> {
        let config = config()?.with_policy(CeremonyPolicy {
            attestation: AttestationPreference::Indirect,
            attachment: None,
            user_verification: UserVerification::Discouraged,
            timeout: Duration::ZERO,
        });
        let context = config.resolve(None)?;
        assert_eq!(context.policy.attestation, AttestationPreference::Indirect);
        assert_eq!(context.policy.attachment, None);
        assert_eq!(
            context.policy.user_verification,
            UserVerification::Discouraged
        );
        assert_eq!(context.policy.timeout_ms(), DEFAULT_CEREMONY_TIMEOUT_MS);
        Ok(())
    }

    #[test]
    fn keeps_explicit_port() -> Result<()> {
        let context = config()?.resolve(Some("http://localhost:3000"))?;
        assert_eq!(context.id, "localhost");
        assert_eq!(context.origin, "http://localhost:3000");
        assert_eq!(context.icon, "http://localhost:3000/favicon.ico");
        Ok(())
    }

    #[test]
    fn missing_origin_uses_first_configured() -> Result<()> {
        let config = config()?;
        assert_eq!(config.resolve(None)?.origin, "https://example.com");
        assert_eq!(config.resolve(Some("  "))?.origin, "https://example.com");
        Ok(())
    }

    #[test]
    fn rejects_unparseable_origin() -> Result<()> {
        let err = config()?.resolve(Some("not a url"));
        assert!(matches!(err, Err(CeremonyError::InvalidOrigin(_))));
        Ok(())
    }

    #[test]
    fn rejects_origin_outside_allow_list() -> Result<()> {
        let config = config()?;
        assert!(matches!(
            config.resolve(Some("https://evil.example.net")),
            Err(CeremonyError::InvalidOrigin(_))
        ));
        assert!(matches!(
            config.resolve(Some("https://example.com:8443")),
            Err(CeremonyError::InvalidOrigin(_))
        ));
        Ok(())
    }

    #[test]
    fn config_requires_origins() {
        assert!(RelyingPartyConfig::new(
            "Example".to_string(),
            Vec::new(),
            Duration::from_secs(1)
        )
        .is_err());
        assert!(RelyingPartyConfig::new(
            "Example".to_string(),
            vec!["nope".to_string()],
            Duration::from_secs(1)
        )
        .is_err());
        assert!(RelyingPartyConfig::new(
            " ".to_string(),
            vec![DEFAULT_ORIGIN.to_string()],
            Duration::from_secs(1)
        )
        .is_err());
    }

    #[test]
    fn config_deduplicates_origins() -> Result<()> {
        let config = RelyingPartyConfig::new(
            "Example".to_string(),
            vec![
                "https://example.com".to_string(),
                "https://example.com/".to_string(),
            ],
            Duration::from_secs(1),
        )?;
        assert_eq!(config.allowed_origins(), &["https://example.com".to_string()]);
        Ok(())
    }
}
