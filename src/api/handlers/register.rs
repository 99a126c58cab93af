//! Registration endpoints.
//!
//! `/registerRequest` issues credential creation options and
//! `/registerResponse` verifies the authenticator's attestation.

use super::{
    create_authn_failed, identity, parse_webauthn_body, request_id, request_origin, NameQuery,
};
use crate::webauthn::{Ceremonies, CeremonyError, Credential, StoreError};
use axum::{
    body::Bytes,
    extract::{Extension, Query},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json},
};
use std::sync::Arc;
use tracing::{error, info, warn};

#[utoipa::path(
    get,
    path = "/registerRequest",
    params(NameQuery),
    responses(
        (status = 200, description = "Credential creation options, or `BeginRegistration Failed` text"),
        (status = 400, description = "Missing or invalid name"),
        (status = 500, description = "Relying party could not be derived from the request origin")
    ),
    tag = "register"
)]
/// Begin a registration ceremony.
pub async fn register_request(
    headers: HeaderMap,
    query: Query<NameQuery>,
    ceremonies: Extension<Arc<dyn Ceremonies>>,
) -> impl IntoResponse {
    let request_id = request_id(&headers);
    let identity = match identity(query.name.as_deref()) {
        Ok(identity) => identity,
        Err(response) => return *response,
    };

    match ceremonies.begin_registration(request_origin(&headers), &identity) {
        Ok(options) => (StatusCode::OK, Json(options)).into_response(),
        Err(CeremonyError::InvalidOrigin(reason)) => {
            warn!(identity = %identity, request_id = %request_id, "invalid origin: {reason}");
            create_authn_failed(&reason)
        }
        Err(err) => {
            error!(
                identity = %identity,
                request_id = %request_id,
                "failed to begin registration: {err}"
            );
            (StatusCode::OK, format!("BeginRegistration Failed: {err}")).into_response()
        }
    }
}

#[utoipa::path(
    post,
    path = "/registerResponse",
    params(NameQuery),
    request_body(content = String, description = "Authenticator attestation response (JSON)", content_type = "application/json"),
    responses(
        (status = 200, description = "Registered credential, or `Request Invalid` text", body = Credential),
        (status = 400, description = "Missing or invalid name"),
        (status = 403, description = "`User Forbidden` or `Register Forbidden`"),
        (status = 409, description = "Credential already registered"),
        (status = 413, description = "Response body too large"),
        (status = 500, description = "Relying party could not be derived from the request origin")
    ),
    tag = "register"
)]
/// Finish a registration ceremony.
pub async fn register_response(
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

    match ceremonies.finish_registration(request_origin(&headers), &identity, &response) {
        Ok(credential) => {
            info!(identity = %identity, request_id = %request_id, "credential registered");
            (StatusCode::OK, Json(credential)).into_response()
        }
        Err(CeremonyError::InvalidOrigin(reason)) => {
            warn!(identity = %identity, request_id = %request_id, "invalid origin: {reason}");
            create_authn_failed(&reason)
        }
        Err(CeremonyError::UserForbidden) => {
            (StatusCode::FORBIDDEN, "User Forbidden".to_string()).into_response()
        }
        Err(CeremonyError::NoPendingRegistration) => {
            (StatusCode::FORBIDDEN, "Register Forbidden".to_string()).into_response()
        }
        Err(CeremonyError::Verification(err)) => {
            (StatusCode::OK, format!("Request Invalid: {err}")).into_response()
        }
        Err(CeremonyError::Store(StoreError::DuplicateCredential)) => (
            StatusCode::CONFLICT,
            "Credential already registered".to_string(),
        )
            .into_response(),
        Err(err) => {
            error!(
                identity = %identity,
                request_id = %request_id,
                "failed to finish registration: {err}"
            );
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Register Failed".to_string(),
            )
                .into_response()
        }
    }
}
