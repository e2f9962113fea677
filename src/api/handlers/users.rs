//! Public user lookups. Responses never carry the password hash or session fields.

use axum::{
    extract::{Extension, Query},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;
use utoipa::{IntoParams, ToSchema};

use super::parse_id;
use crate::store::{BookRecord, BookStore, UserRecord, UserStore};

/// Field-filtered view of a user.
#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct UserView {
    pub id: String,
    pub email: String,
    pub name: String,
    pub lastname: String,
}

impl From<&UserRecord> for UserView {
    fn from(user: &UserRecord) -> Self {
        Self {
            id: user.id.to_string(),
            email: user.email.clone(),
            name: user.name.clone(),
            lastname: user.lastname.clone(),
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct Reviewer {
    pub name: String,
    pub lastname: String,
}

#[derive(Deserialize, IntoParams, Debug)]
pub struct ReviewerQuery {
    /// User id
    id: String,
}

#[derive(Deserialize, IntoParams, Debug)]
pub struct UserPostsQuery {
    /// Owner user id
    user: String,
}

#[utoipa::path(
    get,
    path = "/api/getreviewer",
    params(ReviewerQuery),
    responses (
        (status = 200, description = "Reviewer name", body = Reviewer),
        (status = 400, description = "Invalid id"),
        (status = 404, description = "No such user"),
    ),
    tag = "users"
)]
pub async fn get_reviewer(
    users: Extension<Arc<dyn UserStore>>,
    Query(query): Query<ReviewerQuery>,
) -> Response {
    let id = match parse_id(&query.id) {
        Ok(id) => id,
        Err(response) => return response,
    };

    match users.find_user_by_id(id).await {
        Ok(Some(user)) => Json(Reviewer {
            name: user.name,
            lastname: user.lastname,
        })
        .into_response(),
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(err) => {
            error!("Failed to lookup reviewer: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[utoipa::path(
    get,
    path = "/api/users",
    responses (
        (status = 200, description = "All users", body = [UserView]),
    ),
    tag = "users"
)]
pub async fn list_users(users: Extension<Arc<dyn UserStore>>) -> Response {
    match users.list_users().await {
        Ok(records) => {
            Json(records.iter().map(UserView::from).collect::<Vec<_>>()).into_response()
        }
        Err(err) => {
            error!("Failed to list users: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[utoipa::path(
    get,
    path = "/api/user_posts",
    params(UserPostsQuery),
    responses (
        (status = 200, description = "Books added by the user", body = [BookRecord]),
        (status = 400, description = "Invalid id"),
    ),
    tag = "users"
)]
pub async fn user_posts(
    books: Extension<Arc<dyn BookStore>>,
    Query(query): Query<UserPostsQuery>,
) -> Response {
    let owner_id = match parse_id(&query.user) {
        Ok(id) => id,
        Err(response) => return response,
    };

    match books.books_by_owner(owner_id).await {
        Ok(books) => Json(books).into_response(),
        Err(err) => {
            error!("Failed to list user posts: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
