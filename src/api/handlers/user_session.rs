//! Endpoints behind the auth gate that operate on the caller's own session.

use axum::{
    extract::Extension,
    http::{header::SET_COOKIE, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;
use utoipa::ToSchema;

use super::auth::{clear_session_cookie, CookieSettings};
use crate::auth::{Principal, SessionManager};

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct AuthStatus {
    #[serde(rename = "isAuth")]
    pub is_auth: bool,
    pub id: String,
    pub email: String,
    pub name: String,
    pub lastname: String,
}

#[utoipa::path(
    get,
    path = "/api/userisauth",
    responses (
        (status = 200, description = "Session is valid", body = AuthStatus),
        (status = 401, description = "Not authenticated", body = super::auth::NotAuthenticated),
    ),
    security(("auth_cookie" = [])),
    tag = "users"
)]
pub async fn user_is_auth(Extension(principal): Extension<Principal>) -> Json<AuthStatus> {
    let user = principal.user;
    Json(AuthStatus {
        is_auth: true,
        id: user.id.to_string(),
        email: user.email,
        name: user.name,
        lastname: user.lastname,
    })
}

#[utoipa::path(
    get,
    path = "/api/logout",
    responses (
        (status = 200, description = "Session revoked and cookie cleared"),
        (status = 400, description = "Session could not be revoked"),
        (status = 401, description = "Not authenticated", body = super::auth::NotAuthenticated),
    ),
    security(("auth_cookie" = [])),
    tag = "users"
)]
pub async fn logout(
    sessions: Extension<Arc<SessionManager>>,
    cookies: Extension<CookieSettings>,
    Extension(principal): Extension<Principal>,
) -> Response {
    if let Err(err) = sessions.logout(&principal).await {
        error!("Failed to revoke session: {err}");
        return (StatusCode::BAD_REQUEST, "Failed to logout".to_string()).into_response();
    }

    let mut headers = HeaderMap::new();
    match clear_session_cookie(&cookies) {
        Ok(cookie) => {
            headers.insert(SET_COOKIE, cookie);
        }
        Err(err) => error!("Failed to build clearing cookie: {err}"),
    }

    (StatusCode::OK, headers).into_response()
}
