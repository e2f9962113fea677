//! Map validated CLI arguments to the action to run.

use crate::cli::actions::{server::Args, Action};
use crate::cli::commands::session;
use anyhow::Result;

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>("port").copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>("dsn")
        .cloned()
        .filter(|v| !v.trim().is_empty());

    let session_opts = session::Options::parse(matches)?;

    Ok(Action::Server(Args {
        port,
        dsn,
        token_secret: session_opts.token_secret,
        session_ttl_seconds: session_opts.session_ttl_seconds,
        store_timeout_ms: session_opts.store_timeout_ms,
        cookie_secure: session_opts.cookie_secure,
        argon2_memory_kib: session_opts.argon2_memory_kib,
        argon2_iterations: session_opts.argon2_iterations,
        frontend_origin: session_opts.frontend_origin,
    }))
}
