//! Route handlers and the small validation helpers they share.

pub mod auth;
pub mod books;
pub mod health;
pub mod root;
pub mod user_login;
pub mod user_register;
pub mod user_session;
pub mod users;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use regex::Regex;
use serde_json::json;
use uuid::Uuid;

/// Lightweight email sanity check used before persisting a registration.
pub fn valid_email(email: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|re| re.is_match(email))
}

/// Parse a record id from a query string, answering 400 when it is not a UUID.
pub(crate) fn parse_id(raw: &str) -> Result<Uuid, Response> {
    Uuid::parse_str(raw.trim()).map_err(|_| {
        (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "invalid id" })),
        )
            .into_response()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_email() {
        assert!(valid_email("reader@bookshelf.dev"));
        assert!(valid_email("a.b+c@example.co.uk"));
        assert!(!valid_email("reader"));
        assert!(!valid_email("reader@bookshelf"));
        assert!(!valid_email("re ader@bookshelf.dev"));
        assert!(!valid_email(""));
    }

    #[test]
    fn test_parse_id() {
        let id = Uuid::new_v4();
        assert_eq!(parse_id(&id.to_string()).ok(), Some(id));

        let rejected = parse_id("not-a-uuid");
        assert!(rejected.is_err());
        if let Err(response) = rejected {
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        }
    }
}
