//! Credential and session management.
//!
//! - [`password`]: Argon2id hashing and verification.
//! - [`token`]: HS256 signed session tokens and their stored digest.
//! - [`session`]: register, login, authenticate and logout on top of a
//!   [`UserStore`](crate::store::UserStore).
//!
//! ## Single session per user
//!
//! Each user record holds the digest of at most one token. Logging in again
//! overwrites it, which silently revokes the previous session. A token is only
//! accepted while it is both correctly signed and equal to the stored one.

mod error;
pub mod password;
pub mod session;
pub mod token;

pub use error::AuthError;
pub use password::{Hasher, PasswordHash};
pub use session::{IssuedSession, Principal, Registration, SessionManager};
pub use token::{TokenError, TokenSigner};
