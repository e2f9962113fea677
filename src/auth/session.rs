//! Session lifecycle: register, login, authenticate, logout.
//!
//! Flow overview: registration hashes the password before the first write.
//! Login verifies the password, signs a token and stores its digest on the
//! user record, replacing any previous one (one session per user). Every
//! protected request decodes the token, loads the user it names and checks the
//! stored digest still matches. Logout clears the digest.
//!
//! No locks are taken here. The store's single-record writes are the only
//! synchronisation, so concurrent logins resolve last-write-wins.

use chrono::Utc;
use secrecy::{ExposeSecret, SecretString};
use std::{future::Future, sync::Arc, time::Duration};
use tokio::sync::OnceCell;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use super::{
    password::{Hasher, PasswordHash},
    token::{constant_time_eq, digest, TokenSigner},
    AuthError,
};
use crate::store::{StoreError, UserRecord, UserStore};

const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(5);

/// Plaintext verified against unknown emails so both paths cost one hash.
const DUMMY_PASSWORD: &str = "bookshelf-timing-equaliser";

/// Input for creating an account.
#[derive(Debug)]
pub struct Registration {
    pub email: String,
    pub password: SecretString,
    pub name: String,
    pub lastname: String,
}

/// A freshly issued session.
#[derive(Debug)]
pub struct IssuedSession {
    pub user: UserRecord,
    pub token: String,
}

/// Authenticated request context attached by the auth gate.
#[derive(Clone, Debug)]
pub struct Principal {
    pub user: UserRecord,
    pub token: String,
}

pub struct SessionManager {
    users: Arc<dyn UserStore>,
    hasher: Hasher,
    signer: TokenSigner,
    store_timeout: Duration,
    dummy_hash: OnceCell<PasswordHash>,
}

impl SessionManager {
    #[must_use]
    pub fn new(users: Arc<dyn UserStore>, hasher: Hasher, signer: TokenSigner) -> Self {
        Self {
            users,
            hasher,
            signer,
            store_timeout: DEFAULT_STORE_TIMEOUT,
            dummy_hash: OnceCell::new(),
        }
    }

    #[must_use]
    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    #[must_use]
    pub fn session_ttl_seconds(&self) -> i64 {
        self.signer.ttl_seconds()
    }

    /// Run a store call with the configured upper bound.
    async fn bounded<T, F>(&self, call: F) -> Result<T, AuthError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        match tokio::time::timeout(self.store_timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => {
                error!("Store call failed: {err}");
                Err(AuthError::from(err))
            }
            Err(_) => {
                error!(
                    "Store call exceeded {}ms",
                    self.store_timeout.as_millis()
                );
                Err(AuthError::Unavailable)
            }
        }
    }

    /// Create an account. The password is hashed before the record exists.
    ///
    /// # Errors
    /// `Validation` for missing fields, `Conflict` for a taken email,
    /// `Persistence`/`Unavailable` for store failures, `Internal` if hashing fails.
    #[instrument(skip_all)]
    pub async fn register(&self, registration: Registration) -> Result<UserRecord, AuthError> {
        let Registration {
            email,
            password,
            name,
            lastname,
        } = registration;

        let email = email.trim().to_string();
        if email.is_empty() {
            return Err(AuthError::Validation("email is required"));
        }

        let password = self.hasher.prepare_for_save(None, Some(&password)).await?;
        let user = UserRecord::new(email, name, lastname, password);

        self.bounded(self.users.insert_user(&user)).await?;
        info!(user_id = %user.id, "User registered");

        Ok(user)
    }

    /// Verify credentials and issue a new session, replacing any previous one.
    ///
    /// # Errors
    /// `NotFound` for an unknown email, `Authentication` for a wrong password
    /// or when the token cannot be signed or stored. Callers must report both
    /// the same way.
    #[instrument(skip_all)]
    pub async fn login(
        &self,
        email: &str,
        password: &SecretString,
    ) -> Result<IssuedSession, AuthError> {
        if email.trim().is_empty() || password.expose_secret().is_empty() {
            return Err(AuthError::Validation("email and password are required"));
        }

        let Some(user) = self
            .bounded(self.users.find_user_by_email(email.trim()))
            .await?
        else {
            self.burn_dummy_verify(password).await;
            debug!("Login for unknown email");
            return Err(AuthError::NotFound);
        };

        match self.hasher.verify(password, &user.password).await {
            Ok(true) => {}
            Ok(false) => {
                debug!(user_id = %user.id, "Wrong password");
                return Err(AuthError::Authentication);
            }
            Err(err) => {
                error!(user_id = %user.id, "Stored password hash unusable: {err}");
                return Err(AuthError::Authentication);
            }
        }

        let token = self.issue(user.id).await?;
        info!(user_id = %user.id, "Session issued");

        Ok(IssuedSession { user, token })
    }

    /// Sign a token for `user_id` and make it the user's only valid session.
    ///
    /// # Errors
    /// `Authentication` if signing or persisting fails; `Unavailable` on timeout.
    pub async fn issue(&self, user_id: Uuid) -> Result<String, AuthError> {
        let token = self.signer.issue(user_id).map_err(|err| {
            error!("Failed to sign session token: {err}");
            AuthError::Authentication
        })?;

        let stored = match self
            .bounded(
                self.users
                    .set_session_token(user_id, &digest(&token), Utc::now()),
            )
            .await
        {
            Ok(stored) => stored,
            Err(AuthError::Unavailable) => return Err(AuthError::Unavailable),
            Err(_) => return Err(AuthError::Authentication),
        };

        if !stored {
            warn!(user_id = %user_id, "User vanished before session could be stored");
            return Err(AuthError::Authentication);
        }

        Ok(token)
    }

    /// Resolve a presented token to a principal.
    ///
    /// # Errors
    /// `Authentication` for a missing, malformed, expired or superseded token
    /// or a deleted user; `Unavailable`/`Persistence` when the store fails.
    pub async fn authenticate(&self, token: Option<&str>) -> Result<Principal, AuthError> {
        let Some(token) = token.map(str::trim).filter(|t| !t.is_empty()) else {
            return Err(AuthError::Authentication);
        };

        let claims = self.signer.decode(token).map_err(|err| {
            debug!("Rejected session token: {err}");
            AuthError::Authentication
        })?;
        let user_id = claims
            .user_id()
            .map_err(|_| AuthError::Authentication)?;

        let Some(user) = self.bounded(self.users.find_user_by_id(user_id)).await? else {
            debug!(user_id = %user_id, "Session token for missing user");
            return Err(AuthError::Authentication);
        };

        let presented = digest(token);
        let current = user
            .session_token_hash
            .as_deref()
            .is_some_and(|stored| constant_time_eq(stored, &presented));
        if !current {
            debug!(user_id = %user_id, "Session token is not the current one");
            return Err(AuthError::Authentication);
        }

        Ok(Principal {
            user,
            token: token.to_string(),
        })
    }

    /// Revoke the principal's session.
    ///
    /// A token that was already superseded leaves the newer session intact.
    ///
    /// # Errors
    /// `Persistence`/`Unavailable` when the write fails.
    #[instrument(skip_all, fields(user_id = %principal.user.id))]
    pub async fn logout(&self, principal: &Principal) -> Result<(), AuthError> {
        let cleared = self
            .bounded(
                self.users
                    .clear_session_token(principal.user.id, &digest(&principal.token)),
            )
            .await?;

        if cleared {
            info!("Session revoked");
        } else {
            debug!("Session was already replaced or revoked");
        }
        Ok(())
    }

    /// Hash the dummy password now so the first unknown-email login costs the
    /// same as every later one.
    ///
    /// # Errors
    /// `Internal` if hashing fails.
    pub async fn warm_up(&self) -> Result<(), AuthError> {
        self.dummy_hash().await.map(|_| ())
    }

    async fn dummy_hash(&self) -> Result<&PasswordHash, AuthError> {
        self.dummy_hash
            .get_or_try_init(|| async {
                let dummy = SecretString::from(DUMMY_PASSWORD.to_string());
                self.hasher.hash(&dummy).await
            })
            .await
    }

    async fn burn_dummy_verify(&self, password: &SecretString) {
        if let Ok(dummy) = self.dummy_hash().await {
            let _ = self.hasher.verify(password, dummy).await;
        }
    }
}
