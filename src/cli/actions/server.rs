use crate::{
    api::{self, handlers::auth::CookieSettings, AppState},
    auth::{Hasher, SessionManager, TokenSigner},
    store::{BookStore, MemoryStore, PgStore, UserStore},
};
use anyhow::{Context, Result};
use secrecy::SecretString;
use std::{sync::Arc, time::Duration};
use tracing::{info, warn};

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: Option<String>,
    pub token_secret: SecretString,
    pub session_ttl_seconds: i64,
    pub store_timeout_ms: u64,
    pub cookie_secure: bool,
    pub argon2_memory_kib: u32,
    pub argon2_iterations: u32,
    pub frontend_origin: Option<String>,
}

/// Build the stores and session core from the arguments.
///
/// # Errors
/// Returns an error if the database is unreachable or a setting is invalid.
pub async fn build_state(args: Args) -> Result<AppState> {
    let (users, books): (Arc<dyn UserStore>, Arc<dyn BookStore>) = match &args.dsn {
        Some(dsn) => {
            let store = Arc::new(
                PgStore::connect(dsn)
                    .await
                    .context("Failed to connect to database")?,
            );
            info!("Using PostgreSQL store");
            let users: Arc<dyn UserStore> = store.clone();
            let books: Arc<dyn BookStore> = store;
            (users, books)
        }
        None => {
            warn!("No DSN configured, data is kept in memory only");
            let store = Arc::new(MemoryStore::new());
            let users: Arc<dyn UserStore> = store.clone();
            let books: Arc<dyn BookStore> = store;
            (users, books)
        }
    };

    let hasher = Hasher::with_work_factor(args.argon2_memory_kib, args.argon2_iterations)
        .context("Invalid Argon2 work factor")?;
    let signer = TokenSigner::new(args.token_secret, args.session_ttl_seconds)
        .context("Invalid session token settings")?;

    let sessions = Arc::new(
        SessionManager::new(users.clone(), hasher, signer)
            .with_store_timeout(Duration::from_millis(args.store_timeout_ms)),
    );
    sessions
        .warm_up()
        .await
        .context("Failed to prepare password verifier")?;

    let cookies = CookieSettings::new(args.cookie_secure, sessions.session_ttl_seconds());

    Ok(AppState {
        sessions,
        users,
        books,
        cookies,
        frontend_origin: args.frontend_origin,
    })
}

/// Execute the server action.
/// # Errors
/// Returns an error if the state cannot be built or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    let port = args.port;
    let state = build_state(args).await?;

    api::new(port, state).await
}
