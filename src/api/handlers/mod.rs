//! API handlers and shared request utilities.
//!
//! Every ceremony endpoint identifies the user by the `name` query parameter
//! and derives the relying party from the `Origin` header, falling back to
//! `Referer`.

pub mod health;
pub mod keys;
pub mod login;
pub mod register;

use crate::webauthn::UserIdentity;
use axum::{
    body::Bytes,
    http::{
        header::{ORIGIN, REFERER},
        HeaderMap, StatusCode,
    },
    response::{IntoResponse, Response},
};
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use utoipa::IntoParams;

pub(crate) const MAX_WEBAUTHN_JSON_BYTES: usize = 32 * 1024;
pub(crate) type HandlerError = Box<Response>;

#[derive(Debug, Deserialize, IntoParams)]
pub struct NameQuery {
    /// User name, 1 to 64 characters.
    pub name: Option<String>,
}

/// Names are free-form but bounded and free of control characters.
pub fn valid_name(name: &str) -> bool {
    Regex::new(r"^[^\p{Cc}]{1,64}$").is_ok_and(|re| re.is_match(name))
}

pub(crate) fn identity(name: Option<&str>) -> Result<UserIdentity, HandlerError> {
    let Some(name) = name else {
        return Err(Box::new(
            (StatusCode::BAD_REQUEST, "Missing name".to_string()).into_response(),
        ));
    };

    if !valid_name(name) {
        return Err(Box::new(
            (StatusCode::BAD_REQUEST, "Invalid name".to_string()).into_response(),
        ));
    }

    Ok(UserIdentity::from(name))
}

pub(crate) fn request_origin(headers: &HeaderMap) -> Option<&str> {
    [ORIGIN, REFERER].iter().find_map(|header| {
        headers
            .get(header)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
    })
}

pub(crate) fn request_id(headers: &HeaderMap) -> String {
    headers
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown")
        .to_string()
}

/// Decode an authenticator response.
///
/// Oversized bodies are refused outright. Anything that is not JSON is handed
/// on as `null` so the engine rejects it after the session was consumed.
pub(crate) fn parse_webauthn_body(body: &Bytes) -> Result<Value, HandlerError> {
    if body.len() > MAX_WEBAUTHN_JSON_BYTES {
        return Err(Box::new(StatusCode::PAYLOAD_TOO_LARGE.into_response()));
    }

    Ok(serde_json::from_slice(body).unwrap_or(Value::Null))
}

pub(crate) fn create_authn_failed(reason: &str) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        format!("Create Authn Failed: {reason}"),
    )
        .into_response()
}
