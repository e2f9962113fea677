//! In-memory store used by tests and when no DSN is configured.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    BookChanges, BookRecord, BookStore, Page, SortOrder, StoreError, UserRecord, UserStore,
};

#[derive(Default)]
pub struct MemoryStore {
    users: RwLock<HashMap<Uuid, UserRecord>>,
    books: RwLock<HashMap<Uuid, BookRecord>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn creation_order(a: &BookRecord, b: &BookRecord) -> std::cmp::Ordering {
    a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id))
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn insert_user(&self, user: &UserRecord) -> Result<(), StoreError> {
        let mut users = self.users.write().await;
        if users
            .values()
            .any(|existing| existing.email == user.email || existing.id == user.id)
        {
            return Err(StoreError::Conflict);
        }
        users.insert(user.id, user.clone());
        Ok(())
    }

    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<UserRecord>, StoreError> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>, StoreError> {
        Ok(self
            .users
            .read()
            .await
            .values()
            .find(|user| user.email == email)
            .cloned())
    }

    async fn set_session_token(
        &self,
        id: Uuid,
        token_hash: &[u8],
        issued_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut users = self.users.write().await;
        let Some(user) = users.get_mut(&id) else {
            return Ok(false);
        };
        user.session_token_hash = Some(token_hash.to_vec());
        user.session_issued_at = Some(issued_at);
        Ok(true)
    }

    async fn clear_session_token(&self, id: Uuid, token_hash: &[u8]) -> Result<bool, StoreError> {
        let mut users = self.users.write().await;
        match users.get_mut(&id) {
            Some(user) if user.session_token_hash.as_deref() == Some(token_hash) => {
                user.session_token_hash = None;
                user.session_issued_at = None;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete_user(&self, id: Uuid) -> Result<bool, StoreError> {
        Ok(self.users.write().await.remove(&id).is_some())
    }

    async fn list_users(&self) -> Result<Vec<UserRecord>, StoreError> {
        let mut users: Vec<UserRecord> = self.users.read().await.values().cloned().collect();
        users.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(users)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[async_trait]
impl BookStore for MemoryStore {
    async fn insert_book(&self, book: &BookRecord) -> Result<(), StoreError> {
        let mut books = self.books.write().await;
        if books.contains_key(&book.id) {
            return Err(StoreError::Conflict);
        }
        books.insert(book.id, book.clone());
        Ok(())
    }

    async fn find_book(&self, id: Uuid) -> Result<Option<BookRecord>, StoreError> {
        Ok(self.books.read().await.get(&id).cloned())
    }

    async fn list_books(&self, page: Page) -> Result<Vec<BookRecord>, StoreError> {
        let mut books: Vec<BookRecord> = self.books.read().await.values().cloned().collect();
        books.sort_by(creation_order);
        if page.order == SortOrder::Desc {
            books.reverse();
        }
        Ok(books.into_iter().skip(page.skip).take(page.limit).collect())
    }

    async fn update_book(
        &self,
        id: Uuid,
        changes: BookChanges,
    ) -> Result<Option<BookRecord>, StoreError> {
        let mut books = self.books.write().await;
        Ok(books.get_mut(&id).map(|book| {
            changes.apply(book);
            book.clone()
        }))
    }

    async fn delete_book(&self, id: Uuid) -> Result<bool, StoreError> {
        Ok(self.books.write().await.remove(&id).is_some())
    }

    async fn books_by_owner(&self, owner_id: Uuid) -> Result<Vec<BookRecord>, StoreError> {
        let mut books: Vec<BookRecord> = self
            .books
            .read()
            .await
            .values()
            .filter(|book| book.owner_id == owner_id)
            .cloned()
            .collect();
        books.sort_by(creation_order);
        Ok(books)
    }
}
