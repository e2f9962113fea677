//! Persistence for users and books.
//!
//! The auth core and the handlers only see the [`UserStore`] and [`BookStore`]
//! traits. Two backends implement both: [`PgStore`] for production and
//! [`MemoryStore`] for tests and local runs without a database.
//!
//! Every write is atomic at the single-record level. Session tokens are never
//! stored raw; the store only ever sees the SHA-256 digest of the current token.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::PasswordHash;

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Hard cap for a single page of books.
pub const MAX_PAGE_SIZE: usize = 100;
pub const DEFAULT_PAGE_SIZE: usize = 10;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record already exists")]
    Conflict,
    #[error("database error")]
    Database(#[source] sqlx::Error),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl From<sqlx::Error> for StoreError {
    /// Connection-level failures mean the store cannot be reached at all;
    /// everything else is a failed statement.
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                Self::Unavailable(err.to_string())
            }
            other => Self::Database(other),
        }
    }
}

/// Persisted user. `password` can only hold a hash produced by the hasher or
/// loaded back from the store.
#[derive(Clone, Debug)]
pub struct UserRecord {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub lastname: String,
    pub password: PasswordHash,
    pub session_token_hash: Option<Vec<u8>>,
    pub session_issued_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl UserRecord {
    #[must_use]
    pub fn new(email: String, name: String, lastname: String, password: PasswordHash) -> Self {
        Self {
            id: Uuid::new_v4(),
            email,
            name,
            lastname,
            password,
            session_token_hash: None,
            session_issued_at: None,
            created_at: Utc::now(),
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct BookRecord {
    #[serde(rename = "_id")]
    pub id: Uuid,
    #[serde(rename = "ownerId")]
    pub owner_id: Uuid,
    pub name: String,
    pub author: String,
    pub review: Option<String>,
    pub pages: Option<i32>,
    pub rating: Option<i32>,
    pub price: Option<String>,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

/// Partial update; `None` leaves the field untouched.
#[derive(ToSchema, Serialize, Deserialize, Clone, Debug, Default)]
pub struct BookChanges {
    pub name: Option<String>,
    pub author: Option<String>,
    pub review: Option<String>,
    pub pages: Option<i32>,
    pub rating: Option<i32>,
    pub price: Option<String>,
}

impl BookChanges {
    pub(crate) fn apply(self, book: &mut BookRecord) {
        if let Some(name) = self.name {
            book.name = name;
        }
        if let Some(author) = self.author {
            book.author = author;
        }
        if self.review.is_some() {
            book.review = self.review;
        }
        if self.pages.is_some() {
            book.pages = self.pages;
        }
        if self.rating.is_some() {
            book.rating = self.rating;
        }
        if self.price.is_some() {
            book.price = self.price;
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    /// Parse the `order` query value; only `asc` and `desc` are accepted.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "asc" | "1" => Some(Self::Asc),
            "desc" | "-1" => Some(Self::Desc),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Page {
    pub skip: usize,
    pub limit: usize,
    pub order: SortOrder,
}

impl Page {
    #[must_use]
    pub fn new(skip: Option<usize>, limit: Option<usize>, order: SortOrder) -> Self {
        let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE).min(MAX_PAGE_SIZE);
        Self {
            skip: skip.unwrap_or(0),
            limit,
            order,
        }
    }
}

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Insert a new user, `StoreError::Conflict` when the email is taken.
    async fn insert_user(&self, user: &UserRecord) -> Result<(), StoreError>;

    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<UserRecord>, StoreError>;

    /// Exact, case-sensitive match on the email.
    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>, StoreError>;

    /// Overwrite the current session token digest. Returns `false` if the
    /// user does not exist.
    async fn set_session_token(
        &self,
        id: Uuid,
        token_hash: &[u8],
        issued_at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Clear the session token only if the stored digest is still `token_hash`.
    /// Returns `false` when nothing was cleared.
    async fn clear_session_token(&self, id: Uuid, token_hash: &[u8]) -> Result<bool, StoreError>;

    async fn delete_user(&self, id: Uuid) -> Result<bool, StoreError>;

    async fn list_users(&self) -> Result<Vec<UserRecord>, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}

#[async_trait]
pub trait BookStore: Send + Sync {
    async fn insert_book(&self, book: &BookRecord) -> Result<(), StoreError>;

    async fn find_book(&self, id: Uuid) -> Result<Option<BookRecord>, StoreError>;

    /// Books ordered by creation time.
    async fn list_books(&self, page: Page) -> Result<Vec<BookRecord>, StoreError>;

    async fn update_book(
        &self,
        id: Uuid,
        changes: BookChanges,
    ) -> Result<Option<BookRecord>, StoreError>;

    async fn delete_book(&self, id: Uuid) -> Result<bool, StoreError>;

    async fn books_by_owner(&self, owner_id: Uuid) -> Result<Vec<BookRecord>, StoreError>;
}
