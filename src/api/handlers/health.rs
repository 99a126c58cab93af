use crate::GIT_COMMIT_HASH;
use axum::{
    body::Body,
    http::{HeaderMap, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use tracing::debug;
use utoipa::ToSchema;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct Health {
    commit: String,
    name: String,
    version: String,
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Build information; OPTIONS returns headers only", body = Health)
    ),
    tag = "health"
)]
/// Report name, version and commit. Every method gets the `X-App` header,
/// only GET gets the body.
pub async fn health(method: Method) -> impl IntoResponse {
    let health = Health {
        commit: GIT_COMMIT_HASH.to_string(),
        name: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    };

    let headers = x_app_header(&health);
    if method == Method::GET {
        (StatusCode::OK, headers, Json(health)).into_response()
    } else {
        (StatusCode::OK, headers, Body::empty()).into_response()
    }
}

/// `name:version:commit`, commit shortened to seven characters.
fn x_app_header(health: &Health) -> HeaderMap {
    let commit: String = health.commit.chars().take(7).collect();
    let mut headers = HeaderMap::new();

    match HeaderValue::from_str(&format!("{}:{}:{commit}", health.name, health.version)) {
        Ok(value) => {
            headers.insert("X-App", value);
        }
        Err(err) => debug!("Failed to build X-App header: {err}"),
    }

    headers
}
