use super::handlers::{auth, books, health, user_login, user_register, user_session, users};
use axum::middleware;
use utoipa::openapi::{
    security::{ApiKey, ApiKeyValue, SecurityScheme},
    Components, Contact, InfoBuilder, License, OpenApiBuilder, Tag,
};
use utoipa_axum::{router::OpenApiRouter, routes};

/// Security scheme name referenced by `security(("auth_cookie" = []))`.
pub const AUTH_COOKIE_SCHEME: &str = "auth_cookie";

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    // Reuse the same router wiring and only return the generated OpenAPI document.
    let (_router, openapi) = api_router().split_for_parts();
    openapi
}

/// Build the router that also drives the `OpenAPI` document.
///
/// Public routes and gated routes are registered separately; the gate is a
/// route layer so it only wraps the routes registered before it.
pub(crate) fn api_router() -> OpenApiRouter {
    let public = OpenApiRouter::with_openapi(cargo_openapi())
        .routes(routes!(health::health))
        .routes(routes!(user_register::register))
        .routes(routes!(user_login::login))
        .routes(routes!(books::get_book))
        .routes(routes!(books::list_books))
        .routes(routes!(users::get_reviewer))
        .routes(routes!(users::list_users))
        .routes(routes!(users::user_posts));

    let protected = OpenApiRouter::new()
        .routes(routes!(user_session::user_is_auth))
        .routes(routes!(user_session::logout))
        .routes(routes!(books::add_book))
        .routes(routes!(books::update_book))
        .routes(routes!(books::delete_book))
        .route_layer(middleware::from_fn(auth::require_auth));

    public.merge(protected)
}

/// Base document: Cargo info, the cookie security scheme and the tag list.
/// Merged routers keep these and add their own paths and schemas.
fn cargo_openapi() -> utoipa::openapi::OpenApi {
    // Use Cargo.toml metadata instead of the utoipa-axum crate info defaults.
    let mut info = InfoBuilder::new()
        .title(env!("CARGO_PKG_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .description(optional_str(env!("CARGO_PKG_DESCRIPTION")))
        .build();

    info.contact = cargo_contact();
    info.license = cargo_license();

    let mut components = Components::default();
    components.add_security_scheme(
        AUTH_COOKIE_SCHEME,
        SecurityScheme::ApiKey(ApiKey::Cookie(ApiKeyValue::new(auth::AUTH_COOKIE_NAME))),
    );

    let mut users_tag = Tag::new("users");
    users_tag.description = Some("Registration, login and session checks".to_string());

    let mut books_tag = Tag::new("books");
    books_tag.description = Some("Book reviews".to_string());

    let mut health_tag = Tag::new("health");
    health_tag.description = Some("Liveness and store reachability".to_string());

    OpenApiBuilder::new()
        .info(info)
        .components(Some(components))
        .tags(Some(vec![users_tag, books_tag, health_tag]))
        .build()
}

fn cargo_contact() -> Option<Contact> {
    // Cargo authors are `;` separated and may include "Name <email>".
    let authors = env!("CARGO_PKG_AUTHORS");
    let primary = authors.split(';').next().map(str::trim)?;
    if primary.is_empty() {
        return None;
    }

    let (name, email) = parse_author(primary);
    if name.is_none() && email.is_none() {
        return None;
    }

    let mut contact = Contact::new();
    contact.name = name.map(str::to_string);
    contact.email = email.map(str::to_string);
    Some(contact)
}

fn cargo_license() -> Option<License> {
    let identifier = optional_str(env!("CARGO_PKG_LICENSE"))?;
    let mut license = License::new(identifier);
    license.identifier = Some(identifier.to_string());
    Some(license)
}

fn optional_str(value: &'static str) -> Option<&'static str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

fn parse_author(author: &str) -> (Option<&str>, Option<&str>) {
    match author.find('<') {
        Some(start) => {
            let name = author[..start].trim();
            let email = author[start + 1..].trim_end_matches('>').trim();
            (
                (!name.is_empty()).then_some(name),
                (!email.is_empty()).then_some(email),
            )
        }
        None => {
            let name = author.trim();
            ((!name.is_empty()).then_some(name), None)
        }
    }
}
