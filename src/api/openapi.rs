//! OpenAPI documentation

use axum::Json;
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};

use crate::api::{auth, books, borrowed_books, health, users};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Book Lending API",
        version = "1.0.0",
        description = "Catalog, borrow/return lifecycle and overdue detection"
    ),
    servers(
        (url = "/api/v1", description = "API v1")
    ),
    paths(
        // Health
        health::health_check,
        health::readiness_check,
        // Auth
        auth::register,
        auth::login,
        // Users
        users::get_user,
        // Books
        books::create_book,
        books::get_book,
        books::update_book,
        books::delete_book,
        // Lending
        borrowed_books::borrow_book,
        borrowed_books::return_book,
        borrowed_books::get_borrow_record,
    ),
    components(
        schemas(
            auth::LoginRequest,
            auth::LoginResponse,
            crate::models::user::CreateUser,
            crate::models::user::UserInfo,
            crate::models::book::Book,
            crate::models::book::BookStatus,
            crate::models::book::CreateBook,
            crate::models::book::UpdateBook,
            crate::models::borrow_record::BorrowRecord,
            crate::models::id::BookId,
            crate::models::id::UserId,
            crate::models::id::BorrowRecordId,
            health::HealthResponse,
            crate::error::ErrorResponse,
        )
    ),
    modifiers(&BearerAuth),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "auth", description = "Registration and login"),
        (name = "users", description = "Users"),
        (name = "books", description = "Catalog management"),
        (name = "lending", description = "Borrow and return")
    )
)]
pub struct ApiDoc;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

/// Serve the OpenAPI document
pub async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
