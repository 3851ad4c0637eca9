//! Borrow and return endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use crate::{
    error::AppResult,
    models::{
        borrow_record::BorrowRecord,
        id::{BookId, BorrowRecordId},
    },
    AppState,
};

use super::AuthenticatedUser;

/// Borrow a book for the authenticated user
#[utoipa::path(
    post,
    path = "/borrowed-books/borrow/{book_id}",
    tag = "lending",
    security(("bearer_auth" = [])),
    params(
        ("book_id" = String, Path, description = "Book ID")
    ),
    responses(
        (status = 201, description = "Loan opened", body = BorrowRecord),
        (status = 400, description = "Malformed ID", body = crate::error::ErrorResponse),
        (status = 401, description = "Not authenticated", body = crate::error::ErrorResponse),
        (status = 409, description = "Book missing or not available", body = crate::error::ErrorResponse)
    )
)]
pub async fn borrow_book(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(book_id): Path<String>,
) -> AppResult<(StatusCode, Json<BorrowRecord>)> {
    let book_id = BookId::parse(&book_id)?;
    let record = state
        .services
        .lending
        .borrow_book(book_id, claims.user_id())
        .await?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// Return a borrowed book
#[utoipa::path(
    post,
    path = "/borrowed-books/return/{id}",
    tag = "lending",
    security(("bearer_auth" = [])),
    params(
        ("id" = String, Path, description = "Borrow record ID")
    ),
    responses(
        (status = 200, description = "Loan closed", body = BorrowRecord),
        (status = 400, description = "Malformed ID", body = crate::error::ErrorResponse),
        (status = 404, description = "Record missing or already returned", body = crate::error::ErrorResponse)
    )
)]
pub async fn return_book(
    State(state): State<AppState>,
    AuthenticatedUser(_claims): AuthenticatedUser,
    Path(id): Path<String>,
) -> AppResult<Json<BorrowRecord>> {
    let id = BorrowRecordId::parse(&id)?;
    let record = state.services.lending.return_book(id).await?;
    Ok(Json(record))
}

/// Get a borrow record by ID
#[utoipa::path(
    get,
    path = "/borrowed-books/{id}",
    tag = "lending",
    security(("bearer_auth" = [])),
    params(
        ("id" = String, Path, description = "Borrow record ID")
    ),
    responses(
        (status = 200, description = "Borrow record", body = BorrowRecord),
        (status = 400, description = "Malformed ID", body = crate::error::ErrorResponse),
        (status = 404, description = "Record not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn get_borrow_record(
    State(state): State<AppState>,
    AuthenticatedUser(_claims): AuthenticatedUser,
    Path(id): Path<String>,
) -> AppResult<Json<BorrowRecord>> {
    let id = BorrowRecordId::parse(&id)?;
    let record = state.services.lending.get_borrow_record(id).await?;
    Ok(Json(record))
}
