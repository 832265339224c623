//! Account registration/login/logout and the bearer-token extractor every
//! other authenticated route pulls in (spec.md 4.2, 6).

use std::sync::Arc;

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts, State},
    http::{request::Parts, StatusCode},
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::{error::ErrorKind, node::Node};

use super::error::ApiError;

pub fn router() -> Router<Arc<Node>> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
        .route("/auth/whoami", axum::routing::get(whoami))
}

/// Resolves the `Authorization: Bearer <token>` header to its owning
/// username. Any route taking this as an extractor argument requires a
/// valid, unexpired session (spec.md 4.2).
pub struct AuthUser(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    Arc<Node>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let node = Arc::<Node>::from_ref(state);
        let header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::from(crate::error::CoreError::new(ErrorKind::Unauthorized, "missing bearer token")))?;
        let token = header
            .strip_prefix("Bearer ")
            .ok_or_else(|| ApiError::from(crate::error::CoreError::new(ErrorKind::Unauthorized, "malformed authorization header")))?;
        let username = node.identity.whoami(token)?;
        Ok(AuthUser(username))
    }
}

#[derive(Deserialize)]
struct RegisterRequest {
    username: String,
    password: String,
}

async fn register(State(node): State<Arc<Node>>, Json(req): Json<RegisterRequest>) -> Result<StatusCode, ApiError> {
    node.identity.register(&req.username, &req.password)?;
    Ok(StatusCode::CREATED)
}

#[derive(Deserialize)]
struct LoginRequest {
    username: String,
    password: String,
}

#[derive(Serialize)]
struct LoginResponse {
    token: String,
    expires_at: u64,
}

async fn login(State(node): State<Arc<Node>>, Json(req): Json<LoginRequest>) -> Result<Json<LoginResponse>, ApiError> {
    let (token, expires_at) = node.identity.login(&req.username, &req.password, None)?;
    Ok(Json(LoginResponse { token, expires_at }))
}

async fn logout(State(node): State<Arc<Node>>, AuthUser(_username): AuthUser, auth_header: axum::http::HeaderMap) -> Result<StatusCode, ApiError> {
    let token = auth_header
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .unwrap_or("");
    node.identity.logout(token)?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Serialize)]
struct WhoAmIResponse {
    username: String,
}

async fn whoami(AuthUser(username): AuthUser) -> Json<WhoAmIResponse> {
    Json(WhoAmIResponse { username })
}
