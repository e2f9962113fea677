use axum::{
    extract::Extension,
    http::{header::SET_COOKIE, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, instrument};
use utoipa::ToSchema;

use super::auth::{session_cookie, CookieSettings};
use crate::auth::{AuthError, SessionManager};

/// Message for every credential failure, known email or not.
pub const LOGIN_FAILED_MESSAGE: &str = "Wrong password";

#[derive(ToSchema, Deserialize)]
pub struct UserLogin {
    email: String,
    password: String,
}

impl std::fmt::Debug for UserLogin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserLogin")
            .field("email", &self.email)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginResponse {
    #[serde(rename = "isAuth")]
    pub is_auth: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

fn failed(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(LoginResponse {
            is_auth: false,
            id: None,
            email: None,
            message: Some(message.to_string()),
        }),
    )
        .into_response()
}

#[utoipa::path(
    post,
    path = "/api/login",
    request_body = UserLogin,
    responses (
        (status = 200, description = "Login successful, sets the `auth` cookie", body = LoginResponse, content_type = "application/json"),
        (status = 400, description = "Missing email or password", body = LoginResponse),
        (status = 401, description = "Wrong credentials", body = LoginResponse),
        (status = 503, description = "Store unavailable", body = LoginResponse),
    ),
    tag = "users"
)]
#[instrument(skip(sessions, cookies))]
pub async fn login(
    sessions: Extension<Arc<SessionManager>>,
    cookies: Extension<CookieSettings>,
    payload: Option<Json<UserLogin>>,
) -> Response {
    let user: UserLogin = match payload {
        Some(Json(payload)) => payload,
        None => return failed(StatusCode::BAD_REQUEST, "Missing payload"),
    };

    let password = SecretString::from(user.password);

    match sessions.login(&user.email, &password).await {
        Ok(issued) => {
            let mut headers = HeaderMap::new();
            match session_cookie(&cookies, &issued.token) {
                Ok(cookie) => {
                    headers.insert(SET_COOKIE, cookie);
                }
                Err(err) => {
                    error!("Failed to build session cookie: {err}");
                    return failed(StatusCode::UNAUTHORIZED, LOGIN_FAILED_MESSAGE);
                }
            }

            (
                StatusCode::OK,
                headers,
                Json(LoginResponse {
                    is_auth: true,
                    id: Some(issued.user.id.to_string()),
                    email: Some(issued.user.email),
                    message: None,
                }),
            )
                .into_response()
        }
        Err(err) if err.is_credential_failure() => {
            failed(StatusCode::UNAUTHORIZED, LOGIN_FAILED_MESSAGE)
        }
        Err(AuthError::Validation(reason)) => failed(StatusCode::BAD_REQUEST, reason),
        Err(AuthError::Unavailable | AuthError::Persistence(_)) => {
            failed(StatusCode::SERVICE_UNAVAILABLE, "Service unavailable")
        }
        Err(err) => {
            error!("Login failed: {err}");
            failed(StatusCode::UNAUTHORIZED, LOGIN_FAILED_MESSAGE)
        }
    }
}
