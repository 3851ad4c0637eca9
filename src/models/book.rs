//! Book model and related types

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use validator::Validate;

use super::id::{BookId, UserId};
use crate::error::AppError;

/// Lending status of a book
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum BookStatus {
    Available,
    Borrowed,
    /// Still on loan; the loan exceeded the allowed period
    Overdue,
}

impl BookStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookStatus::Available => "available",
            BookStatus::Borrowed => "borrowed",
            BookStatus::Overdue => "overdue",
        }
    }
}

impl fmt::Display for BookStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "available" => Ok(BookStatus::Available),
            "borrowed" => Ok(BookStatus::Borrowed),
            "overdue" => Ok(BookStatus::Overdue),
            other => Err(AppError::Internal(format!("unknown book status {:?}", other))),
        }
    }
}

/// Book in the catalog.
///
/// `borrower_id` is set exactly when `status` is not [`BookStatus::Available`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Book {
    pub id: BookId,
    pub title: String,
    pub author: String,
    pub published_date: DateTime<Utc>,
    pub status: BookStatus,
    pub borrower_id: Option<UserId>,
}

impl Book {
    pub fn is_available(&self) -> bool {
        self.status == BookStatus::Available
    }
}

/// Internal row structure for database queries
#[derive(Debug, FromRow)]
pub struct BookRow {
    pub id: BookId,
    pub title: String,
    pub author: String,
    pub published_date: DateTime<Utc>,
    pub status: String,
    pub borrower_id: Option<UserId>,
}

impl TryFrom<BookRow> for Book {
    type Error = AppError;

    fn try_from(row: BookRow) -> Result<Self, Self::Error> {
        Ok(Book {
            id: row.id,
            title: row.title,
            author: row.author,
            published_date: row.published_date,
            status: row.status.parse()?,
            borrower_id: row.borrower_id,
        })
    }
}

/// Create book request
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateBook {
    #[validate(length(min = 1, max = 512, message = "title is required"))]
    pub title: String,
    #[validate(length(min = 1, max = 256, message = "author is required"))]
    pub author: String,
    /// Defaults to the creation time when omitted
    pub published_date: Option<DateTime<Utc>>,
}

/// Bibliographic update. Lending fields are deliberately absent.
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateBook {
    #[validate(length(min = 1, max = 512))]
    pub title: Option<String>,
    #[validate(length(min = 1, max = 256))]
    pub author: Option<String>,
    pub published_date: Option<DateTime<Utc>>,
}

impl UpdateBook {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.author.is_none() && self.published_date.is_none()
    }

    pub fn apply(&self, book: &mut Book) {
        if let Some(ref title) = self.title {
            book.title = title.clone();
        }
        if let Some(ref author) = self.author {
            book.author = author.clone();
        }
        if let Some(published_date) = self.published_date {
            book.published_date = published_date;
        }
    }
}

/// A book about to be inserted; the store assigns the id
#[derive(Debug, Clone)]
pub struct NewBook {
    pub title: String,
    pub author: String,
    pub published_date: DateTime<Utc>,
}

/// Selects a single book, optionally only in a given status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BookFilter {
    pub id: BookId,
    pub status: Option<BookStatus>,
}

impl BookFilter {
    pub fn by_id(id: BookId) -> Self {
        Self { id, status: None }
    }

    pub fn available(id: BookId) -> Self {
        Self {
            id,
            status: Some(BookStatus::Available),
        }
    }

    pub fn matches(&self, book: &Book) -> bool {
        book.id == self.id && self.status.map_or(true, |status| book.status == status)
    }
}

/// Lifecycle write on a book (status plus borrower).
///
/// Only the lending workflow can build one, so the catalog cannot move a book
/// in or out of a loan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BookLending {
    status: BookStatus,
    borrower_id: Option<UserId>,
}

impl BookLending {
    pub(crate) fn lent_to(user_id: UserId) -> Self {
        Self {
            status: BookStatus::Borrowed,
            borrower_id: Some(user_id),
        }
    }

    pub(crate) fn released() -> Self {
        Self {
            status: BookStatus::Available,
            borrower_id: None,
        }
    }

    pub fn status(&self) -> BookStatus {
        self.status
    }

    pub fn borrower_id(&self) -> Option<UserId> {
        self.borrower_id
    }

    pub fn apply(&self, book: &mut Book) {
        book.status = self.status;
        book.borrower_id = self.borrower_id;
    }
}
