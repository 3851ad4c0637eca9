//! Storage layer
//!
//! [`Store`] is the capability set the services run against: single-document
//! reads and writes, a bulk conditional update for the overdue sweep, and
//! transactions. Transactions are only reachable through [`with_transaction`],
//! which commits when the unit of work succeeds and rolls back otherwise.
//!
//! Two backends implement it: [`postgres::PgStore`] for deployments and
//! [`memory::MemoryStore`] for tests and local development.

pub mod memory;
pub mod postgres;

use std::{future::Future, pin::Pin, sync::Arc};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    config::{DatabaseConfig, StorageBackend},
    error::AppResult,
    models::{
        book::{Book, BookFilter, BookLending, NewBook, UpdateBook},
        borrow_record::{BorrowRecord, NewBorrowRecord},
        id::{BookId, BorrowRecordId},
        user::{NewUser, User, UserFilter},
    },
};

/// Storage backend shared by every service and the overdue sweeper
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Store: Send + Sync {
    /// Open a transaction. Services go through [`with_transaction`] instead.
    async fn begin(&self) -> AppResult<Box<dyn StoreTx>>;

    /// Check that the backend is reachable
    async fn ping(&self) -> AppResult<()>;

    async fn find_book(&self, filter: BookFilter) -> AppResult<Option<Book>>;

    async fn insert_book(&self, book: NewBook) -> AppResult<Book>;

    /// Apply a bibliographic update, returning the updated book if it exists
    async fn update_book(&self, id: BookId, update: UpdateBook) -> AppResult<Option<Book>>;

    /// Delete a book whatever its status; returns the number of deleted books
    async fn delete_book(&self, id: BookId) -> AppResult<u64>;

    /// Flag as overdue every borrowed book whose open loan started strictly
    /// before `cutoff`. Returns how many books changed status.
    async fn mark_overdue(&self, cutoff: DateTime<Utc>) -> AppResult<u64>;

    async fn find_borrow_record(&self, id: BorrowRecordId) -> AppResult<Option<BorrowRecord>>;

    /// Insert a user; a taken username is a `Conflict`
    async fn insert_user(&self, user: NewUser) -> AppResult<User>;

    async fn find_user(&self, filter: UserFilter) -> AppResult<Option<User>>;
}

/// Operations available inside a transaction
#[async_trait]
pub trait StoreTx: Send {
    /// Read a book for update
    async fn find_book(&mut self, filter: BookFilter) -> AppResult<Option<Book>>;

    /// Write status and borrower of a book; returns the matched count
    async fn set_book_lending(&mut self, id: BookId, lending: BookLending) -> AppResult<u64>;

    async fn insert_borrow_record(&mut self, record: NewBorrowRecord) -> AppResult<BorrowRecord>;

    /// Close the loan if it is still open, returning the closed record
    async fn close_borrow_record(
        &mut self,
        id: BorrowRecordId,
        returned_at: DateTime<Utc>,
    ) -> AppResult<Option<BorrowRecord>>;

    async fn commit(self: Box<Self>) -> AppResult<()>;

    async fn rollback(self: Box<Self>) -> AppResult<()>;
}

/// Open transaction handed to a unit of work
pub type Tx = Box<dyn StoreTx>;

/// Future returned by a unit of work
pub type TxFuture<'t, T> = Pin<Box<dyn Future<Output = AppResult<T>> + Send + 't>>;

/// Run `work` inside a transaction: all of its writes commit, or none do.
///
/// ```ignore
/// let record = with_transaction(store, move |tx| Box::pin(async move {
///     let book = tx.find_book(BookFilter::available(book_id)).await?;
///     // ...
///     Ok::<_, AppError>(record)
/// })).await?;
/// ```
pub async fn with_transaction<T, F>(store: &dyn Store, work: F) -> AppResult<T>
where
    T: Send,
    F: for<'t> FnOnce(&'t mut Tx) -> TxFuture<'t, T> + Send,
{
    let mut tx = store.begin().await?;
    let outcome = work(&mut tx).await;

    match outcome {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                tracing::warn!("Failed to roll back transaction: {}", rollback_err);
            }
            Err(err)
        }
    }
}

/// Build the store selected by configuration
pub async fn connect(config: &DatabaseConfig) -> AppResult<Arc<dyn Store>> {
    match config.backend {
        StorageBackend::Postgres => {
            let store = postgres::PgStore::connect(config).await?;
            store.migrate().await?;
            Ok(Arc::new(store))
        }
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory storage; data is lost on shutdown");
            Ok(Arc::new(memory::MemoryStore::new()))
        }
    }
}
