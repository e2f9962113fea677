use thiserror::Error;

use crate::store::StoreError;

/// Outcomes of the credential and session core.
///
/// The HTTP layer decides how each one is reported; `NotFound` and
/// `Authentication` must never be distinguishable by a client.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid input: {0}")]
    Validation(&'static str),
    #[error("no matching user")]
    NotFound,
    #[error("not authenticated")]
    Authentication,
    #[error("email already registered")]
    Conflict,
    #[error("persistence failure")]
    Persistence(#[source] StoreError),
    #[error("store did not answer in time")]
    Unavailable,
    #[error("internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// True for every outcome that a client must see as "not authenticated".
    #[must_use]
    pub fn is_credential_failure(&self) -> bool {
        matches!(self, Self::NotFound | Self::Authentication)
    }
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict => Self::Conflict,
            StoreError::Unavailable(_) => Self::Unavailable,
            other @ StoreError::Database(_) => Self::Persistence(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_map_to_auth_errors() {
        assert!(matches!(
            AuthError::from(StoreError::Conflict),
            AuthError::Conflict
        ));
        assert!(matches!(
            AuthError::from(StoreError::Unavailable("down".to_string())),
            AuthError::Unavailable
        ));
        assert!(matches!(
            AuthError::from(StoreError::Database(sqlx::Error::PoolTimedOut)),
            AuthError::Persistence(_)
        ));
    }

    #[test]
    fn credential_failures_are_grouped() {
        assert!(AuthError::NotFound.is_credential_failure());
        assert!(AuthError::Authentication.is_credential_failure());
        assert!(!AuthError::Unavailable.is_credential_failure());
        assert!(!AuthError::Validation("email").is_credential_failure());
    }
}
