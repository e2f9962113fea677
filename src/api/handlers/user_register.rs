use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, instrument};
use utoipa::ToSchema;

use super::{users::UserView, valid_email};
use crate::auth::{AuthError, Registration, SessionManager};

#[derive(ToSchema, Deserialize)]
pub struct UserRegister {
    email: String,
    password: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    lastname: String,
}

impl std::fmt::Debug for UserRegister {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserRegister")
            .field("email", &self.email)
            .field("password", &"[REDACTED]")
            .field("name", &self.name)
            .field("lastname", &self.lastname)
            .finish()
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RegisterResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<UserView>,
}

impl RegisterResponse {
    fn failed() -> Json<Self> {
        Json(Self {
            success: false,
            user: None,
        })
    }
}

#[utoipa::path(
    post,
    path = "/api/register",
    request_body = UserRegister,
    responses (
        (status = 200, description = "Registration successful", body = RegisterResponse, content_type = "application/json"),
        (status = 400, description = "Missing or invalid fields", body = RegisterResponse),
        (status = 409, description = "Email already registered", body = RegisterResponse),
        (status = 500, description = "Store failure", body = RegisterResponse),
    ),
    tag = "users"
)]
#[instrument(skip(sessions))]
pub async fn register(
    sessions: Extension<Arc<SessionManager>>,
    payload: Option<Json<UserRegister>>,
) -> impl IntoResponse {
    let user: UserRegister = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, RegisterResponse::failed()),
    };

    if !valid_email(&user.email) {
        debug!("Invalid email");

        return (StatusCode::BAD_REQUEST, RegisterResponse::failed());
    }

    let registration = Registration {
        email: user.email,
        password: SecretString::from(user.password),
        name: user.name,
        lastname: user.lastname,
    };

    match sessions.register(registration).await {
        Ok(record) => (
            StatusCode::OK,
            Json(RegisterResponse {
                success: true,
                user: Some(UserView::from(&record)),
            }),
        ),
        Err(AuthError::Validation(reason)) => {
            debug!("Registration rejected: {reason}");
            (StatusCode::BAD_REQUEST, RegisterResponse::failed())
        }
        Err(AuthError::Conflict) => (StatusCode::CONFLICT, RegisterResponse::failed()),
        Err(AuthError::Unavailable) => {
            (StatusCode::SERVICE_UNAVAILABLE, RegisterResponse::failed())
        }
        Err(err) => {
            error!("Registration failed: {err}");
            (StatusCode::INTERNAL_SERVER_ERROR, RegisterResponse::failed())
        }
    }
}
