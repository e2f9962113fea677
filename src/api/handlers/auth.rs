//! Auth gate middleware and session cookie helpers.
//!
//! Flow overview: read the `auth` cookie (or a bearer header), let the
//! session manager resolve it, and either attach a [`Principal`] to the
//! request or stop the request before any handler runs.

use axum::{
    extract::{Extension, Request},
    http::{
        header::{InvalidHeaderValue, AUTHORIZATION, COOKIE},
        HeaderMap, HeaderValue, StatusCode,
    },
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error};
use utoipa::ToSchema;

use crate::auth::{AuthError, Principal, SessionManager};

pub const AUTH_COOKIE_NAME: &str = "auth";

/// Cookie attributes for the session token.
#[derive(Clone, Copy, Debug)]
pub struct CookieSettings {
    pub secure: bool,
    pub max_age_seconds: i64,
}

impl CookieSettings {
    #[must_use]
    pub fn new(secure: bool, max_age_seconds: i64) -> Self {
        Self {
            secure,
            max_age_seconds,
        }
    }
}

/// Body of every auth gate rejection.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct NotAuthenticated {
    #[serde(rename = "isAuth")]
    pub is_auth: bool,
    pub error: bool,
}

/// Reject unauthenticated requests; on success the handler can extract
/// `Extension<Principal>`.
pub async fn require_auth(
    Extension(sessions): Extension<Arc<SessionManager>>,
    mut request: Request,
    next: Next,
) -> Response {
    let token = extract_session_token(request.headers());

    match sessions.authenticate(token.as_deref()).await {
        Ok(principal) => {
            request.extensions_mut().insert(principal);
            next.run(request).await
        }
        Err(err) => rejection(&err),
    }
}

/// Map a failed authentication to a response; never leaks why it failed.
pub(crate) fn rejection(err: &AuthError) -> Response {
    match err {
        AuthError::Unavailable | AuthError::Persistence(_) => {
            error!("Auth gate could not reach the store: {err}");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                "Service unavailable".to_string(),
            )
                .into_response()
        }
        _ => {
            debug!("Auth gate rejected request: {err}");
            (
                StatusCode::UNAUTHORIZED,
                Json(NotAuthenticated {
                    is_auth: false,
                    error: true,
                }),
            )
                .into_response()
        }
    }
}

/// Build the `HttpOnly` session cookie.
pub(crate) fn session_cookie(
    settings: &CookieSettings,
    token: &str,
) -> Result<HeaderValue, InvalidHeaderValue> {
    let mut cookie = format!(
        "{AUTH_COOKIE_NAME}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        settings.max_age_seconds
    );
    if settings.secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

pub(crate) fn clear_session_cookie(
    settings: &CookieSettings,
) -> Result<HeaderValue, InvalidHeaderValue> {
    let mut cookie = format!("{AUTH_COOKIE_NAME}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0");
    if settings.secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

pub(crate) fn extract_session_token(headers: &HeaderMap) -> Option<String> {
    if let Some(token) = extract_cookie_token(headers) {
        return Some(token);
    }
    extract_bearer_token(headers)
}

fn extract_cookie_token(headers: &HeaderMap) -> Option<String> {
    for header in headers.get_all(COOKIE) {
        let Ok(value) = header.to_str() else {
            continue;
        };
        for pair in value.split(';') {
            let mut parts = pair.trim().splitn(2, '=');
            let key = parts.next().map(str::trim);
            let val = parts.next().map(str::trim);
            if let (Some(AUTH_COOKIE_NAME), Some(val)) = (key, val) {
                if !val.is_empty() {
                    return Some(val.to_string());
                }
            }
        }
    }
    None
}

fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let trimmed = value.trim();
    let token = trimmed
        .strip_prefix("Bearer ")
        .or_else(|| trimmed.strip_prefix("bearer "))?
        .trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}
