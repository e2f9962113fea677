use axum::{
    extract::{Extension, Query},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use super::parse_id;
use crate::auth::Principal;
use crate::store::{BookChanges, BookRecord, BookStore, Page, SortOrder};

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct NewBook {
    pub name: String,
    pub author: String,
    pub review: Option<String>,
    pub pages: Option<i32>,
    pub rating: Option<i32>,
    pub price: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct BookUpdate {
    #[serde(rename = "_id")]
    pub id: Uuid,
    #[serde(flatten)]
    pub changes: BookChanges,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct BookCreated {
    pub post: bool,
    #[serde(rename = "bookId")]
    pub book_id: Uuid,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct BookUpdated {
    pub success: bool,
    pub doc: BookRecord,
}

#[derive(Deserialize, IntoParams, Debug)]
pub struct BookIdQuery {
    /// Book id
    id: String,
}

#[derive(Deserialize, IntoParams, Debug, Default)]
pub struct BooksQuery {
    /// Number of books to skip
    skip: Option<usize>,
    /// Page size, capped at 100
    limit: Option<usize>,
    /// `asc` (oldest first) or `desc`
    order: Option<String>,
}

fn store_failure(context: &str, err: &dyn std::fmt::Display) -> Response {
    error!("{context}: {err}");
    StatusCode::INTERNAL_SERVER_ERROR.into_response()
}

fn valid_rating(rating: Option<i32>) -> bool {
    rating.map_or(true, |r| (1..=5).contains(&r))
}

#[utoipa::path(
    get,
    path = "/api/getbookbyid",
    params(BookIdQuery),
    responses (
        (status = 200, description = "The book", body = BookRecord),
        (status = 400, description = "Invalid id"),
        (status = 404, description = "No such book"),
    ),
    tag = "books"
)]
pub async fn get_book(
    books: Extension<Arc<dyn BookStore>>,
    Query(query): Query<BookIdQuery>,
) -> Response {
    let id = match parse_id(&query.id) {
        Ok(id) => id,
        Err(response) => return response,
    };

    match books.find_book(id).await {
        Ok(Some(book)) => Json(book).into_response(),
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(err) => store_failure("Failed to fetch book", &err),
    }
}

#[utoipa::path(
    get,
    path = "/api/getbooks",
    params(BooksQuery),
    responses (
        (status = 200, description = "Books ordered by creation time", body = [BookRecord]),
        (status = 400, description = "Invalid order"),
    ),
    tag = "books"
)]
pub async fn list_books(
    books: Extension<Arc<dyn BookStore>>,
    Query(query): Query<BooksQuery>,
) -> Response {
    let order = match query.order.as_deref() {
        None => SortOrder::Asc,
        Some(value) => match SortOrder::parse(value) {
            Some(order) => order,
            None => {
                return (StatusCode::BAD_REQUEST, "order must be asc or desc".to_string())
                    .into_response()
            }
        },
    };

    let page = Page::new(query.skip, query.limit, order);
    debug!(?page, "Listing books");

    match books.list_books(page).await {
        Ok(books) => Json(books).into_response(),
        Err(err) => store_failure("Failed to list books", &err),
    }
}

#[utoipa::path(
    post,
    path = "/api/addbook",
    request_body = NewBook,
    responses (
        (status = 200, description = "Book stored", body = BookCreated),
        (status = 400, description = "Missing or invalid fields"),
        (status = 401, description = "Not authenticated", body = super::auth::NotAuthenticated),
    ),
    security(("auth_cookie" = [])),
    tag = "books"
)]
pub async fn add_book(
    books: Extension<Arc<dyn BookStore>>,
    Extension(principal): Extension<Principal>,
    payload: Option<Json<NewBook>>,
) -> Response {
    let new_book = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    if new_book.name.trim().is_empty() || new_book.author.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            "name and author are required".to_string(),
        )
            .into_response();
    }
    if !valid_rating(new_book.rating) {
        return (StatusCode::BAD_REQUEST, "rating must be 1-5".to_string()).into_response();
    }

    let book = BookRecord {
        id: Uuid::now_v7(),
        owner_id: principal.user.id,
        name: new_book.name,
        author: new_book.author,
        review: new_book.review,
        pages: new_book.pages,
        rating: new_book.rating,
        price: new_book.price,
        created_at: Utc::now(),
    };

    match books.insert_book(&book).await {
        Ok(()) => {
            info!(book_id = %book.id, owner_id = %book.owner_id, "Book added");
            Json(BookCreated {
                post: true,
                book_id: book.id,
            })
            .into_response()
        }
        Err(err) => store_failure("Failed to add book", &err),
    }
}

#[utoipa::path(
    post,
    path = "/api/updatebook",
    request_body = BookUpdate,
    responses (
        (status = 200, description = "Book updated", body = BookUpdated),
        (status = 400, description = "Missing or invalid fields"),
        (status = 401, description = "Not authenticated", body = super::auth::NotAuthenticated),
        (status = 404, description = "No such book"),
    ),
    security(("auth_cookie" = [])),
    tag = "books"
)]
pub async fn update_book(
    books: Extension<Arc<dyn BookStore>>,
    Extension(_principal): Extension<Principal>,
    payload: Option<Json<BookUpdate>>,
) -> Response {
    let update = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    if !valid_rating(update.changes.rating) {
        return (StatusCode::BAD_REQUEST, "rating must be 1-5".to_string()).into_response();
    }

    match books.update_book(update.id, update.changes).await {
        Ok(Some(doc)) => Json(BookUpdated { success: true, doc }).into_response(),
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(err) => store_failure("Failed to update book", &err),
    }
}

#[utoipa::path(
    delete,
    path = "/api/deletebook",
    params(BookIdQuery),
    responses (
        (status = 200, description = "Book deleted", body = bool),
        (status = 400, description = "Invalid id"),
        (status = 401, description = "Not authenticated", body = super::auth::NotAuthenticated),
        (status = 404, description = "No such book"),
    ),
    security(("auth_cookie" = [])),
    tag = "books"
)]
pub async fn delete_book(
    books: Extension<Arc<dyn BookStore>>,
    Extension(_principal): Extension<Principal>,
    Query(query): Query<BookIdQuery>,
) -> Response {
    let id = match parse_id(&query.id) {
        Ok(id) => id,
        Err(response) => return response,
    };

    match books.delete_book(id).await {
        Ok(true) => Json(true).into_response(),
        Ok(false) => StatusCode::NOT_FOUND.into_response(),
        Err(err) => store_failure("Failed to delete book", &err),
    }
}
