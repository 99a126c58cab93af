use super::{identity, NameQuery};
use crate::webauthn::{Ceremonies, Credential, CredentialId};
use axum::{
    extract::{Extension, Query},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::warn;
use utoipa::IntoParams;

#[derive(Debug, Deserialize, IntoParams)]
pub struct RemoveKeyQuery {
    /// User name, 1 to 64 characters.
    pub name: Option<String>,
    /// Credential id, base64url or standard base64.
    pub cred: Option<String>,
}

#[utoipa::path(
    get,
    path = "/getKeys",
    params(NameQuery),
    responses(
        (status = 200, description = "Credentials of the user, empty when the name is unknown, missing or invalid", body = [Credential])
    ),
    tag = "keys"
)]
/// List a user's credentials.
pub async fn get_keys(
    query: Query<NameQuery>,
    ceremonies: Extension<Arc<dyn Ceremonies>>,
) -> impl IntoResponse {
    let credentials = match identity(query.name.as_deref()) {
        Ok(identity) => ceremonies.list_credentials(&identity),
        Err(_) => {
            warn!("getKeys without a valid name");
            Vec::new()
        }
    };

    (StatusCode::OK, Json(credentials))
}

#[utoipa::path(
    get,
    path = "/removeKeys",
    params(RemoveKeyQuery),
    responses(
        (status = 200, description = "Always `null`, whether or not a credential matched")
    ),
    tag = "keys"
)]
/// Remove one credential by id. Nothing is removed when the name or the
/// credential id is missing or cannot be decoded.
pub async fn remove_keys(
    query: Query<RemoveKeyQuery>,
    ceremonies: Extension<Arc<dyn Ceremonies>>,
) -> impl IntoResponse {
    match (
        identity(query.name.as_deref()),
        query.cred.as_deref().map(CredentialId::decode),
    ) {
        (Ok(identity), Some(Some(credential_id))) => {
            ceremonies.remove_credential(&identity, &credential_id);
        }
        (Err(_), _) => warn!("removeKeys without a valid name"),
        (Ok(identity), None) => warn!(identity = %identity, "removeKeys without cred"),
        (Ok(identity), Some(None)) => {
            warn!(identity = %identity, "removeKeys with undecodable cred");
        }
    }

    (StatusCode::OK, Json(Value::Null))
}
