use anyhow::{anyhow, Result};
use axum::{
    body::Body,
    http::{
        header::{CONTENT_TYPE, COOKIE, SET_COOKIE},
        HeaderMap, Method, Request, StatusCode,
    },
    Router,
};
use async_trait::async_trait;
use bookshelf::{
    api::{self, handlers::auth::CookieSettings, AppState},
    auth::{Hasher, SessionManager, TokenSigner},
    store::{BookStore, MemoryStore, StoreError, UserRecord, UserStore},
};
use chrono::{DateTime, Utc};
use http_body_util::BodyExt;
use secrecy::SecretString;
use serde_json::{json, Value};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tower::ServiceExt;
use uuid::Uuid;

const SECRET: &str = "integration-secret-0123456789abcdef";

fn router() -> Result<Router> {
    let store = Arc::new(MemoryStore::new());
    router_with(store.clone(), store)
}

fn router_with(users: Arc<dyn UserStore>, books: Arc<dyn BookStore>) -> Result<Router> {
    let hasher = Hasher::with_work_factor(1024, 1)?;
    let signer = TokenSigner::new(SecretString::from(SECRET.to_string()), 3600)?;
    let sessions = Arc::new(SessionManager::new(users.clone(), hasher, signer));

    api::app(AppState {
        sessions,
        users,
        books,
        cookies: CookieSettings::new(false, 3600),
        frontend_origin: None,
    })
}

struct Reply {
    status: StatusCode,
    headers: HeaderMap,
    body: Value,
}

impl Reply {
    /// The `name=value` part of the session cookie, ready to send back.
    fn cookie(&self) -> Result<String> {
        let header = self
            .headers
            .get(SET_COOKIE)
            .ok_or_else(|| anyhow!("no Set-Cookie header"))?
            .to_str()?;
        header
            .split(';')
            .next()
            .map(str::to_string)
            .ok_or_else(|| anyhow!("empty Set-Cookie header"))
    }
}

async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    cookie: Option<&str>,
    body: Option<Value>,
) -> Result<Reply> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(COOKIE, cookie);
    }
    let request = match body {
        Some(body) => builder
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))?,
        None => builder.body(Body::empty())?,
    };

    let response = app.clone().oneshot(request).await?;
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = response.into_body().collect().await?.to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| {
            Value::String(String::from_utf8_lossy(&bytes).into_owned())
        })
    };

    Ok(Reply {
        status,
        headers,
        body,
    })
}

async fn register(app: &Router, email: &str, password: &str) -> Result<Reply> {
    send(
        app,
        Method::POST,
        "/api/register",
        None,
        Some(json!({
            "email": email,
            "password": password,
            "name": "Ada",
            "lastname": "Lovelace",
        })),
    )
    .await
}

async fn login(app: &Router, email: &str, password: &str) -> Result<Reply> {
    send(
        app,
        Method::POST,
        "/api/login",
        None,
        Some(json!({ "email": email, "password": password })),
    )
    .await
}

#[tokio::test]
async fn register_then_login_sets_cookie() -> Result<()> {
    let app = router()?;

    let registered = register(&app, "a@x.com", "secret").await?;
    assert_eq!(registered.status, StatusCode::OK);
    assert_eq!(registered.body["success"], json!(true));
    assert_eq!(registered.body["user"]["email"], json!("a@x.com"));
    assert!(registered.body["user"].get("password").is_none());

    let logged_in = login(&app, "a@x.com", "secret").await?;
    assert_eq!(logged_in.status, StatusCode::OK);
    assert_eq!(logged_in.body["isAuth"], json!(true));
    assert_eq!(logged_in.body["email"], json!("a@x.com"));
    assert_eq!(logged_in.body["id"], registered.body["user"]["id"]);

    let set_cookie = logged_in
        .headers
        .get(SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    assert!(set_cookie.starts_with("auth="));
    assert!(set_cookie.contains("HttpOnly"));
    assert!(set_cookie.contains("SameSite=Lax"));
    assert!(set_cookie.contains("Max-Age=3600"));
    Ok(())
}

#[tokio::test]
async fn duplicate_and_invalid_registrations_are_rejected() -> Result<()> {
    let app = router()?;

    assert_eq!(register(&app, "a@x.com", "secret").await?.status, StatusCode::OK);

    let duplicate = register(&app, "a@x.com", "other").await?;
    assert_eq!(duplicate.status, StatusCode::CONFLICT);
    assert_eq!(duplicate.body["success"], json!(false));

    let bad_email = register(&app, "not-an-email", "secret").await?;
    assert_eq!(bad_email.status, StatusCode::BAD_REQUEST);

    let empty_password = register(&app, "b@x.com", "").await?;
    assert_eq!(empty_password.status, StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn wrong_password_and_unknown_email_look_the_same() -> Result<()> {
    let app = router()?;
    register(&app, "a@x.com", "secret").await?;

    let wrong = login(&app, "a@x.com", "nope").await?;
    assert_eq!(wrong.status, StatusCode::UNAUTHORIZED);
    assert_eq!(
        wrong.body,
        json!({ "isAuth": false, "message": "Wrong password" })
    );
    assert!(wrong.headers.get(SET_COOKIE).is_none());

    let unknown = login(&app, "ghost@x.com", "secret").await?;
    assert_eq!(unknown.status, wrong.status);
    assert_eq!(unknown.body, wrong.body);
    Ok(())
}

#[tokio::test]
async fn login_without_payload_is_bad_request() -> Result<()> {
    let app = router()?;
    let reply = send(&app, Method::POST, "/api/login", None, None).await?;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.body["isAuth"], json!(false));
    Ok(())
}

#[tokio::test]
async fn gate_requires_a_valid_cookie() -> Result<()> {
    let app = router()?;
    register(&app, "a@x.com", "secret").await?;
    let cookie = login(&app, "a@x.com", "secret").await?.cookie()?;

    let ok = send(&app, Method::GET, "/api/userisauth", Some(&cookie), None).await?;
    assert_eq!(ok.status, StatusCode::OK);
    assert_eq!(ok.body["isAuth"], json!(true));
    assert_eq!(ok.body["email"], json!("a@x.com"));
    assert_eq!(ok.body["name"], json!("Ada"));
    assert_eq!(ok.body["lastname"], json!("Lovelace"));

    let missing = send(&app, Method::GET, "/api/userisauth", None, None).await?;
    assert_eq!(missing.status, StatusCode::UNAUTHORIZED);
    assert_eq!(missing.body, json!({ "isAuth": false, "error": true }));

    let garbled = send(
        &app,
        Method::GET,
        "/api/userisauth",
        Some("auth=garbage"),
        None,
    )
    .await?;
    assert_eq!(garbled.status, StatusCode::UNAUTHORIZED);
    assert_eq!(garbled.body, missing.body);
    Ok(())
}

#[tokio::test]
async fn relogin_supersedes_previous_cookie() -> Result<()> {
    let app = router()?;
    register(&app, "a@x.com", "secret").await?;

    let first = login(&app, "a@x.com", "secret").await?.cookie()?;
    let second = login(&app, "a@x.com", "secret").await?.cookie()?;
    assert_ne!(first, second);

    let stale = send(&app, Method::GET, "/api/userisauth", Some(&first), None).await?;
    assert_eq!(stale.status, StatusCode::UNAUTHORIZED);

    let current = send(&app, Method::GET, "/api/userisauth", Some(&second), None).await?;
    assert_eq!(current.status, StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn logout_clears_cookie_and_revokes_token() -> Result<()> {
    let app = router()?;
    register(&app, "a@x.com", "secret").await?;
    let cookie = login(&app, "a@x.com", "secret").await?.cookie()?;

    let out = send(&app, Method::GET, "/api/logout", Some(&cookie), None).await?;
    assert_eq!(out.status, StatusCode::OK);
    let cleared = out
        .headers
        .get(SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    assert!(cleared.starts_with("auth=;"));
    assert!(cleared.contains("Max-Age=0"));

    let after = send(&app, Method::GET, "/api/userisauth", Some(&cookie), None).await?;
    assert_eq!(after.status, StatusCode::UNAUTHORIZED);

    let again = send(&app, Method::GET, "/api/logout", Some(&cookie), None).await?;
    assert_eq!(again.status, StatusCode::UNAUTHORIZED);
    Ok(())
}

/// Memory-backed user store whose session clears fail once `fail_clears` is set.
struct ClearFailingStore {
    inner: MemoryStore,
    fail_clears: AtomicBool,
}

#[async_trait]
impl UserStore for ClearFailingStore {
    async fn insert_user(&self, user: &UserRecord) -> Result<(), StoreError> {
        self.inner.insert_user(user).await
    }
    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<UserRecord>, StoreError> {
        self.inner.find_user_by_id(id).await
    }
    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>, StoreError> {
        self.inner.find_user_by_email(email).await
    }
    async fn set_session_token(
        &self,
        id: Uuid,
        token_hash: &[u8],
        issued_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        self.inner.set_session_token(id, token_hash, issued_at).await
    }
    async fn clear_session_token(&self, id: Uuid, token_hash: &[u8]) -> Result<bool, StoreError> {
        if self.fail_clears.load(Ordering::SeqCst) {
            return Err(StoreError::Database(sqlx::Error::RowNotFound));
        }
        self.inner.clear_session_token(id, token_hash).await
    }
    async fn delete_user(&self, id: Uuid) -> Result<bool, StoreError> {
        self.inner.delete_user(id).await
    }
    async fn list_users(&self) -> Result<Vec<UserRecord>, StoreError> {
        self.inner.list_users().await
    }
    async fn ping(&self) -> Result<(), StoreError> {
        self.inner.ping().await
    }
}

#[tokio::test]
async fn failed_revoke_is_bad_request_and_keeps_session() -> Result<()> {
    let users = Arc::new(ClearFailingStore {
        inner: MemoryStore::new(),
        fail_clears: AtomicBool::new(false),
    });
    let app = router_with(users.clone(), Arc::new(MemoryStore::new()))?;
    register(&app, "a@x.com", "secret").await?;
    let cookie = login(&app, "a@x.com", "secret").await?.cookie()?;

    users.fail_clears.store(true, Ordering::SeqCst);
    let out = send(&app, Method::GET, "/api/logout", Some(&cookie), None).await?;
    assert_eq!(out.status, StatusCode::BAD_REQUEST);
    assert_eq!(out.body, json!("Failed to logout"));
    assert!(out.headers.get(SET_COOKIE).is_none());

    let still = send(&app, Method::GET, "/api/userisauth", Some(&cookie), None).await?;
    assert_eq!(still.status, StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn book_crud_through_the_gate() -> Result<()> {
    let app = router()?;
    let user = register(&app, "a@x.com", "secret").await?;
    let user_id = user.body["user"]["id"]
        .as_str()
        .ok_or_else(|| anyhow!("missing user id"))?
        .to_string();
    let cookie = login(&app, "a@x.com", "secret").await?.cookie()?;

    let book = json!({
        "name": "Dune",
        "author": "Frank Herbert",
        "review": "Spice.",
        "pages": 412,
        "rating": 5,
        "price": "9.99",
    });

    let anonymous = send(&app, Method::POST, "/api/addbook", None, Some(book.clone())).await?;
    assert_eq!(anonymous.status, StatusCode::UNAUTHORIZED);

    let added = send(&app, Method::POST, "/api/addbook", Some(&cookie), Some(book)).await?;
    assert_eq!(added.status, StatusCode::OK);
    assert_eq!(added.body["post"], json!(true));
    let book_id = added.body["bookId"]
        .as_str()
        .ok_or_else(|| anyhow!("missing book id"))?
        .to_string();

    let fetched = send(
        &app,
        Method::GET,
        &format!("/api/getbookbyid?id={book_id}"),
        None,
        None,
    )
    .await?;
    assert_eq!(fetched.status, StatusCode::OK);
    assert_eq!(fetched.body["name"], json!("Dune"));
    assert_eq!(fetched.body["ownerId"], json!(user_id));

    let updated = send(
        &app,
        Method::POST,
        "/api/updatebook",
        Some(&cookie),
        Some(json!({ "_id": book_id, "review": "Even better the second time." })),
    )
    .await?;
    assert_eq!(updated.status, StatusCode::OK);
    assert_eq!(updated.body["success"], json!(true));
    assert_eq!(
        updated.body["doc"]["review"],
        json!("Even better the second time.")
    );
    assert_eq!(updated.body["doc"]["author"], json!("Frank Herbert"));

    let posts = send(
        &app,
        Method::GET,
        &format!("/api/user_posts?user={user_id}"),
        None,
        None,
    )
    .await?;
    assert_eq!(posts.status, StatusCode::OK);
    assert_eq!(posts.body.as_array().map(Vec::len), Some(1));

    let reviewer = send(
        &app,
        Method::GET,
        &format!("/api/getreviewer?id={user_id}"),
        None,
        None,
    )
    .await?;
    assert_eq!(
        reviewer.body,
        json!({ "name": "Ada", "lastname": "Lovelace" })
    );

    let deleted = send(
        &app,
        Method::DELETE,
        &format!("/api/deletebook?id={book_id}"),
        Some(&cookie),
        None,
    )
    .await?;
    assert_eq!(deleted.status, StatusCode::OK);
    assert_eq!(deleted.body, json!(true));

    let gone = send(
        &app,
        Method::GET,
        &format!("/api/getbookbyid?id={book_id}"),
        None,
        None,
    )
    .await?;
    assert_eq!(gone.status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn getbooks_pages_and_orders() -> Result<()> {
    let app = router()?;
    register(&app, "a@x.com", "secret").await?;
    let cookie = login(&app, "a@x.com", "secret").await?.cookie()?;

    for title in ["First", "Second", "Third"] {
        let added = send(
            &app,
            Method::POST,
            "/api/addbook",
            Some(&cookie),
            Some(json!({ "name": title, "author": "Anon" })),
        )
        .await?;
        assert_eq!(added.status, StatusCode::OK);
    }

    let names = |reply: &Reply| -> Vec<String> {
        reply
            .body
            .as_array()
            .map(|books| {
                books
                    .iter()
                    .filter_map(|b| b["name"].as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    };

    let asc = send(&app, Method::GET, "/api/getbooks", None, None).await?;
    assert_eq!(names(&asc), ["First", "Second", "Third"]);

    let desc = send(
        &app,
        Method::GET,
        "/api/getbooks?order=desc&skip=1&limit=1",
        None,
        None,
    )
    .await?;
    assert_eq!(names(&desc), ["Second"]);

    let bad = send(&app, Method::GET, "/api/getbooks?order=sideways", None, None).await?;
    assert_eq!(bad.status, StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn users_listing_hides_credentials() -> Result<()> {
    let app = router()?;
    register(&app, "a@x.com", "secret").await?;
    login(&app, "a@x.com", "secret").await?;

    let users = send(&app, Method::GET, "/api/users", None, None).await?;
    assert_eq!(users.status, StatusCode::OK);
    let listed = users.body.as_array().cloned().unwrap_or_default();
    assert_eq!(listed.len(), 1);
    for user in listed {
        let object = user.as_object().cloned().unwrap_or_default();
        let mut keys: Vec<_> = object.keys().cloned().collect();
        keys.sort();
        assert_eq!(keys, ["email", "id", "lastname", "name"]);
    }
    Ok(())
}

#[tokio::test]
async fn invalid_ids_are_bad_requests() -> Result<()> {
    let app = router()?;
    let reply = send(&app, Method::GET, "/api/getbookbyid?id=nope", None, None).await?;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);

    let reply = send(&app, Method::GET, "/api/getreviewer?id=nope", None, None).await?;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn health_reports_store_and_app_header() -> Result<()> {
    let app = router()?;
    let reply = send(&app, Method::GET, "/health", None, None).await?;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["database"], json!("ok"));
    assert_eq!(reply.body["name"], json!(env!("CARGO_PKG_NAME")));
    assert!(reply.headers.get("x-app").is_some());
    assert!(reply.headers.get("x-request-id").is_some());

    let root = send(&app, Method::GET, "/", None, None).await?;
    assert_eq!(root.status, StatusCode::OK);
    Ok(())
}
