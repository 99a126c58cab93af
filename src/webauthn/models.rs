use base64ct::{Base64, Base64UrlUnpadded, Encoding};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use utoipa::ToSchema;
use uuid::Uuid;

/// Externally supplied handle naming a principal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserIdentity(String);

impl UserIdentity {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserIdentity {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Opaque credential identifier chosen by the authenticator.
///
/// Serialized as unpadded base64url, the encoding browsers use for `rawId`.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct CredentialId(Vec<u8>);

impl CredentialId {
    #[must_use]
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    #[must_use]
    pub fn to_base64url(&self) -> String {
        Base64UrlUnpadded::encode_string(&self.0)
    }

    /// Decode an identifier from either base64url (unpadded) or standard
    /// padded base64. Clients have historically sent both.
    #[must_use]
    pub fn decode(encoded: &str) -> Option<Self> {
        let trimmed = encoded.trim();
        if trimmed.is_empty() {
            return None;
        }
        Base64UrlUnpadded::decode_vec(trimmed)
            .or_else(|_| Base64::decode_vec(trimmed))
            .ok()
            .filter(|bytes| !bytes.is_empty())
            .map(Self)
    }
}

impl From<Vec<u8>> for CredentialId {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl From<&[u8]> for CredentialId {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }
}

impl fmt::Debug for CredentialId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CredentialId({})", self.to_base64url())
    }
}

impl Serialize for CredentialId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_base64url())
    }
}

impl<'de> Deserialize<'de> for CredentialId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        Self::decode(&encoded).ok_or_else(|| serde::de::Error::custom("invalid credential id"))
    }
}

/// Public key material tagged with its COSE algorithm name (e.g. `ES256`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PublicKey {
    pub algorithm: String,
    #[serde(with = "base64url_bytes")]
    #[schema(value_type = String)]
    pub key: Vec<u8>,
}

/// A registered authenticator public key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Credential {
    #[schema(value_type = String)]
    pub id: CredentialId,
    pub public_key: PublicKey,
    pub sign_count: u32,
    pub transports: Vec<String>,
    #[schema(value_type = String, format = DateTime)]
    pub created_at: DateTime<Utc>,
    /// Engine-owned state needed to run later ceremonies with this key.
    #[serde(skip)]
    pub engine_data: Vec<u8>,
}

/// Entry of a registration exclusion list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialDescriptor {
    pub id: CredentialId,
    pub transports: Vec<String>,
}

impl From<&Credential> for CredentialDescriptor {
    fn from(credential: &Credential) -> Self {
        Self {
            id: credential.id.clone(),
            transports: credential.transports.clone(),
        }
    }
}

/// Capability set the protocol engine needs from a user.
pub trait RelyingPartyUser {
    /// Stable user handle sent to authenticators.
    fn user_handle(&self) -> Uuid;
    fn name(&self) -> &str;
    fn display_name(&self) -> &str;
    fn icon(&self) -> Option<&str>;
    fn credentials(&self) -> &[Credential];
}

/// Stored user with its credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub identity: UserIdentity,
    pub handle: Uuid,
    pub credentials: Vec<Credential>,
}

impl UserRecord {
    #[must_use]
    pub fn new(identity: UserIdentity) -> Self {
        Self {
            identity,
            handle: Uuid::new_v4(),
            credentials: Vec::new(),
        }
    }

    #[must_use]
    pub fn exclusions(&self) -> Vec<CredentialDescriptor> {
        self.credentials.iter().map(CredentialDescriptor::from).collect()
    }

    #[must_use]
    pub fn find_credential(&self, id: &CredentialId) -> Option<&Credential> {
        self.credentials.iter().find(|credential| &credential.id == id)
    }
}

impl RelyingPartyUser for UserRecord {
    fn user_handle(&self) -> Uuid {
        self.handle
    }

    fn name(&self) -> &str {
        self.identity.as_str()
    }

    fn display_name(&self) -> &str {
        self.identity.as_str()
    }

    fn icon(&self) -> Option<&str> {
        None
    }

    fn credentials(&self) -> &[Credential] {
        &self.credentials
    }
}

mod base64url_bytes {
    use base64ct::{Base64UrlUnpadded, Encoding};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&Base64UrlUnpadded::encode_string(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        Base64UrlUnpadded::decode_vec(&encoded).map_err(serde::de::Error::custom)
    }
}
