//! PostgreSQL backend.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, postgres::PgRow, Connection, PgPool, Row};
use std::time::Duration;
use tracing::{info_span, Instrument};
use uuid::Uuid;

use super::{
    BookChanges, BookRecord, BookStore, Page, SortOrder, StoreError, UserRecord, UserStore,
};
use crate::auth::PasswordHash;

const SCHEMA_SQL: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/sql/schema.sql"));

const USER_COLUMNS: &str =
    "id, email, name, lastname, password_hash, session_token_hash, session_issued_at, created_at";
const BOOK_COLUMNS: &str = "id, owner_id, name, author, review, pages, rating, price, created_at";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

fn query_span(operation: &str, statement: &str) -> tracing::Span {
    info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = operation,
        db.statement = statement
    )
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

fn user_from_row(row: &PgRow) -> Result<UserRecord, sqlx::Error> {
    Ok(UserRecord {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        name: row.try_get("name")?,
        lastname: row.try_get("lastname")?,
        password: PasswordHash::from_stored(row.try_get("password_hash")?),
        session_token_hash: row.try_get("session_token_hash")?,
        session_issued_at: row.try_get("session_issued_at")?,
        created_at: row.try_get("created_at")?,
    })
}

fn book_from_row(row: &PgRow) -> Result<BookRecord, sqlx::Error> {
    Ok(BookRecord {
        id: row.try_get("id")?,
        owner_id: row.try_get("owner_id")?,
        name: row.try_get("name")?,
        author: row.try_get("author")?,
        review: row.try_get("review")?,
        pages: row.try_get("pages")?,
        rating: row.try_get("rating")?,
        price: row.try_get("price")?,
        created_at: row.try_get("created_at")?,
    })
}

/// Split the schema file into single statements, skipping comments.
fn split_sql_statements(sql: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();

    for line in sql.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with("--") {
            continue;
        }
        current.push_str(line);
        current.push('\n');

        if trimmed.ends_with(';') {
            let statement = current.trim();
            if !statement.is_empty() {
                statements.push(statement.to_string());
            }
            current.clear();
        }
    }

    let leftover = current.trim();
    if !leftover.is_empty() {
        statements.push(leftover.to_string());
    }

    statements
}

impl PgStore {
    #[must_use]
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect to the database and make sure the schema exists.
    ///
    /// # Errors
    /// Returns an error if the connection or the schema setup fails.
    pub async fn connect(dsn: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .min_connections(1)
            .max_connections(5)
            .max_lifetime(Duration::from_secs(60 * 2))
            .test_before_acquire(true)
            .connect(dsn)
            .await?;

        let store = Self::from_pool(pool);
        store.apply_schema().await?;
        Ok(store)
    }

    async fn apply_schema(&self) -> Result<(), StoreError> {
        for statement in split_sql_statements(SCHEMA_SQL) {
            sqlx::query(&statement)
                .execute(&self.pool)
                .instrument(query_span("DDL", &statement))
                .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl UserStore for PgStore {
    async fn insert_user(&self, user: &UserRecord) -> Result<(), StoreError> {
        let query = r"
            INSERT INTO users
                (id, email, name, lastname, password_hash, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
        ";
        let result = sqlx::query(query)
            .bind(user.id)
            .bind(&user.email)
            .bind(&user.name)
            .bind(&user.lastname)
            .bind(user.password.as_str())
            .bind(user.created_at)
            .execute(&self.pool)
            .instrument(query_span("INSERT", query))
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(err) if is_unique_violation(&err) => Err(StoreError::Conflict),
            Err(err) => Err(err.into()),
        }
    }

    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<UserRecord>, StoreError> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", &query))
            .await?;
        Ok(row.as_ref().map(user_from_row).transpose()?)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>, StoreError> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
        let row = sqlx::query(&query)
            .bind(email)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", &query))
            .await?;
        Ok(row.as_ref().map(user_from_row).transpose()?)
    }

    async fn set_session_token(
        &self,
        id: Uuid,
        token_hash: &[u8],
        issued_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let query = r"
            UPDATE users
            SET session_token_hash = $2, session_issued_at = $3
            WHERE id = $1
        ";
        let result = sqlx::query(query)
            .bind(id)
            .bind(token_hash)
            .bind(issued_at)
            .execute(&self.pool)
            .instrument(query_span("UPDATE", query))
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn clear_session_token(&self, id: Uuid, token_hash: &[u8]) -> Result<bool, StoreError> {
        // Conditional on the digest so a newer login is never revoked by a stale logout.
        let query = r"
            UPDATE users
            SET session_token_hash = NULL, session_issued_at = NULL
            WHERE id = $1 AND session_token_hash = $2
        ";
        let result = sqlx::query(query)
            .bind(id)
            .bind(token_hash)
            .execute(&self.pool)
            .instrument(query_span("UPDATE", query))
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn delete_user(&self, id: Uuid) -> Result<bool, StoreError> {
        let query = "DELETE FROM users WHERE id = $1";
        let result = sqlx::query(query)
            .bind(id)
            .execute(&self.pool)
            .instrument(query_span("DELETE", query))
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn list_users(&self) -> Result<Vec<UserRecord>, StoreError> {
        let query = format!("SELECT {USER_COLUMNS} FROM users ORDER BY created_at, id");
        let rows = sqlx::query(&query)
            .fetch_all(&self.pool)
            .instrument(query_span("SELECT", &query))
            .await?;
        Ok(rows.iter().map(user_from_row).collect::<Result<_, _>>()?)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let acquire_span = info_span!(
            "db.acquire",
            db.system = "postgresql",
            db.operation = "ACQUIRE"
        );
        let mut conn = self.pool.acquire().instrument(acquire_span).await?;
        let ping_span = info_span!("db.ping", db.system = "postgresql", db.operation = "PING");
        conn.ping().instrument(ping_span).await?;
        Ok(())
    }
}

#[async_trait]
impl BookStore for PgStore {
    async fn insert_book(&self, book: &BookRecord) -> Result<(), StoreError> {
        let query = r"
            INSERT INTO books
                (id, owner_id, name, author, review, pages, rating, price, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        ";
        let result = sqlx::query(query)
            .bind(book.id)
            .bind(book.owner_id)
            .bind(&book.name)
            .bind(&book.author)
            .bind(&book.review)
            .bind(book.pages)
            .bind(book.rating)
            .bind(&book.price)
            .bind(book.created_at)
            .execute(&self.pool)
            .instrument(query_span("INSERT", query))
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(err) if is_unique_violation(&err) => Err(StoreError::Conflict),
            Err(err) => Err(err.into()),
        }
    }

    async fn find_book(&self, id: Uuid) -> Result<Option<BookRecord>, StoreError> {
        let query = format!("SELECT {BOOK_COLUMNS} FROM books WHERE id = $1");
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", &query))
            .await?;
        Ok(row.as_ref().map(book_from_row).transpose()?)
    }

    async fn list_books(&self, page: Page) -> Result<Vec<BookRecord>, StoreError> {
        let direction = match page.order {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        };
        let query = format!(
            "SELECT {BOOK_COLUMNS} FROM books \
             ORDER BY created_at {direction}, id {direction} OFFSET $1 LIMIT $2"
        );
        let rows = sqlx::query(&query)
            .bind(i64::try_from(page.skip).unwrap_or(i64::MAX))
            .bind(i64::try_from(page.limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .instrument(query_span("SELECT", &query))
            .await?;
        Ok(rows.iter().map(book_from_row).collect::<Result<_, _>>()?)
    }

    async fn update_book(
        &self,
        id: Uuid,
        changes: BookChanges,
    ) -> Result<Option<BookRecord>, StoreError> {
        let query = format!(
            r"
            UPDATE books SET
                name = COALESCE($2, name),
                author = COALESCE($3, author),
                review = COALESCE($4, review),
                pages = COALESCE($5, pages),
                rating = COALESCE($6, rating),
                price = COALESCE($7, price)
            WHERE id = $1
            RETURNING {BOOK_COLUMNS}
            "
        );
        let row = sqlx::query(&query)
            .bind(id)
            .bind(changes.name)
            .bind(changes.author)
            .bind(changes.review)
            .bind(changes.pages)
            .bind(changes.rating)
            .bind(changes.price)
            .fetch_optional(&self.pool)
            .instrument(query_span("UPDATE", &query))
            .await?;
        Ok(row.as_ref().map(book_from_row).transpose()?)
    }

    async fn delete_book(&self, id: Uuid) -> Result<bool, StoreError> {
        let query = "DELETE FROM books WHERE id = $1";
        let result = sqlx::query(query)
            .bind(id)
            .execute(&self.pool)
            .instrument(query_span("DELETE", query))
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn books_by_owner(&self, owner_id: Uuid) -> Result<Vec<BookRecord>, StoreError> {
        let query =
            format!("SELECT {BOOK_COLUMNS} FROM books WHERE owner_id = $1 ORDER BY created_at, id");
        let rows = sqlx::query(&query)
            .bind(owner_id)
            .fetch_all(&self.pool)
            .instrument(query_span("SELECT", &query))
            .await?;
        Ok(rows.iter().map(book_from_row).collect::<Result<_, _>>()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_splits_into_statements() {
        let statements = split_sql_statements(SCHEMA_SQL);
        assert_eq!(statements.len(), 4);
        assert!(statements[0].starts_with("CREATE TABLE IF NOT EXISTS users"));
        assert!(statements.iter().all(|s| s.ends_with(';')));
    }

    #[test]
    fn split_keeps_trailing_statement_without_semicolon() {
        let statements = split_sql_statements("SELECT 1;\n-- note\nSELECT 2");
        assert_eq!(statements, vec!["SELECT 1;".to_string(), "SELECT 2".to_string()]);
    }
}
