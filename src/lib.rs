//! # Bookshelf (book reviews API)
//!
//! `bookshelf` serves a small CRUD API for users and their book reviews. Its
//! core is credential and session handling:
//!
//! - **Passwords** are hashed with Argon2id before every write that sets one;
//!   the plaintext is never stored or logged.
//! - **Sessions** are HS256 tokens delivered in the `auth` cookie. The store
//!   keeps a digest of the single current token per user, so a new login
//!   supersedes the previous one and logout revokes it.
//! - **The auth gate** checks both the signature and the stored digest before
//!   any protected handler runs.
//!
//! Storage is PostgreSQL when a DSN is configured and an in-memory store
//! otherwise.

pub mod api;
pub mod auth;
pub mod cli;
pub mod store;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};
