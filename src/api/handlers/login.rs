//! Login endpoints.

use super::{
    create_authn_failed, identity, parse_webauthn_body, request_id, request_origin, NameQuery,
};
use crate::webauthn::{Ceremonies, CeremonyError, LoginChallenge};
use axum::{
    body::Bytes,
    extract::{Extension, Query},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json},
};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Body returned when the identity has nothing to log in with.
pub const NOT_REGISTERED: &str = "not register";

#[utoipa::path(
    get,
    path = "/loginRequest",
    params(NameQuery),
    responses(
        (status = 200, description = "Assertion options, or the JSON string `not register`"),
        (status = 400, description = "Missing or invalid name"),
        (status = 500, description = "Relying party could not be derived, or the challenge could not be built")
    ),
    tag = "login"
)]
/// Begin a login ceremony.
pub async fn login_request(
    headers: HeaderMap,
    query: Query<NameQuery>,
    ceremonies: Extension<Arc<dyn Ceremonies>>,
) -> impl IntoResponse {
    let request_id = request_id(&headers);
    let identity = match identity(query.name.as_deref()) {
        Ok(identity) => identity,
        Err(response) => return *response,
    };

    match ceremonies.begin_login(request_origin(&headers), &identity) {
        Ok(LoginChallenge::Options(options)) => (StatusCode::OK, Json(options)).into_response(),
        Ok(LoginChallenge::NotRegistered) => {
            (StatusCode::OK, Json(NOT_REGISTERED)).into_response()
        }
        Err(CeremonyError::InvalidOrigin(reason)) => {
            warn!(identity = %identity, request_id = %request_id, "invalid origin: {reason}");
            create_authn_failed(&reason)
        }
        Err(err) => {
            error!(
                identity = %identity,
                request_id = %request_id,
                "failed to begin login: {err}"
            );
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("BeginLogin Failed: {err}"),
            )
                .into_response()
        }
    }
}

/// Finish a login ceremony. Accepts any method.
pub async fn login_response(
    headers: HeaderMap,
    query: Query<NameQuery>,
    ceremonies: Extension<Arc<dyn Ceremonies>>,
    body: Bytes,
) -> impl IntoResponse {
    let request_id = request_id(&headers);
    let identity = match identity(query.name.as_deref()) {
        Ok(identity) => identity,
        Err(response) => return *response,
    };
    let response = match parse_webauthn_body(&body) {
        Ok(response) => response,
        Err(response) => return *response,
    };

    match ceremonies.finish_login(request_origin(&headers), &identity, &response) {
        Ok(credential) => {
            info!(identity = %identity, request_id = %request_id, "login succeeded");
            (StatusCode::OK, Json(credential)).into_response()
        }
        Err(CeremonyError::InvalidOrigin(reason)) => {
            warn!(identity = %identity, request_id = %request_id, "invalid origin: {reason}");
            create_authn_failed(&reason)
        }
        Err(CeremonyError::UserForbidden) => {
            (StatusCode::FORBIDDEN, Json(NOT_REGISTERED)).into_response()
        }
        Err(CeremonyError::NoPendingLogin) => {
            (StatusCode::FORBIDDEN, "Login Forbidden".to_string()).into_response()
        }
        Err(CeremonyError::Verification(err)) => {
            (StatusCode::FORBIDDEN, format!("Request Invalid: {err}")).into_response()
        }
        Err(err) => {
            error!(
                identity = %identity,
                request_id = %request_id,
                "failed to finish login: {err}"
            );
            (StatusCode::INTERNAL_SERVER_ERROR, "Login Failed".to_string()).into_response()
        }
    }
}
