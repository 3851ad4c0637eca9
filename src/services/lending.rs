//! Borrow/return lifecycle
//!
//! Borrowing and returning each run as one storage transaction that touches
//! both the book and its borrow record. The store's transaction isolation is
//! the only concurrency guard: concurrent borrows of one book serialize on the
//! book and all but the first see it unavailable.

use std::{sync::Arc, time::Duration};

use crate::{
    clock::Clock,
    error::{AppError, AppResult},
    models::{
        book::{BookFilter, BookLending},
        borrow_record::{BorrowRecord, NewBorrowRecord},
        id::{BookId, BorrowRecordId, UserId},
        user::UserFilter,
    },
    repository::{with_transaction, Store},
};

use super::with_deadline;

#[derive(Clone)]
pub struct LendingService {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    deadline: Duration,
}

impl LendingService {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>, deadline: Duration) -> Self {
        Self {
            store,
            clock,
            deadline,
        }
    }

    /// Lend an available book to a user.
    ///
    /// Fails with `NotAvailable` when the book is missing or already lent out;
    /// the two cases are not distinguished.
    pub async fn borrow_book(&self, book_id: BookId, user_id: UserId) -> AppResult<BorrowRecord> {
        with_deadline(self.deadline, "borrow_book", async {
            self.store
                .find_user(UserFilter::Id(user_id))
                .await?
                .ok_or_else(|| AppError::NotFound(format!("User {} not found", user_id)))?;

            let borrowed_at = self.clock.now();

            let record = with_transaction(self.store.as_ref(), move |tx| {
                Box::pin(async move {
                    let book = tx
                        .find_book(BookFilter::available(book_id))
                        .await?
                        .ok_or_else(|| {
                            AppError::NotAvailable(format!("Book {} is not available", book_id))
                        })?;

                    let record = tx
                        .insert_borrow_record(NewBorrowRecord {
                            book_id: book.id,
                            user_id,
                            borrowed_at,
                        })
                        .await?;

                    tx.set_book_lending(book.id, BookLending::lent_to(user_id))
                        .await?;

                    Ok::<_, AppError>(record)
                })
            })
            .await?;

            tracing::info!(
                borrow_record_id = %record.id,
                book_id = %record.book_id,
                user_id = %record.user_id,
                "Book borrowed"
            );
            Ok(record)
        })
        .await
    }

    /// Close an open loan and make its book available again.
    ///
    /// An overdue book goes straight back to available. Fails with `NotFound`
    /// when the record does not exist or is already closed.
    pub async fn return_book(&self, record_id: BorrowRecordId) -> AppResult<BorrowRecord> {
        with_deadline(self.deadline, "return_book", async {
            let returned_at = self.clock.now();

            let record = with_transaction(self.store.as_ref(), move |tx| {
                Box::pin(async move {
                    let record = tx
                        .close_borrow_record(record_id, returned_at)
                        .await?
                        .ok_or_else(|| {
                            AppError::NotFound(format!(
                                "Borrow record {} not found or already returned",
                                record_id
                            ))
                        })?;

                    let matched = tx
                        .set_book_lending(record.book_id, BookLending::released())
                        .await?;
                    if matched == 0 {
                        tracing::warn!(
                            borrow_record_id = %record.id,
                            book_id = %record.book_id,
                            "Returned a loan whose book no longer exists"
                        );
                    }

                    Ok::<_, AppError>(record)
                })
            })
            .await?;

            tracing::info!(
                borrow_record_id = %record.id,
                book_id = %record.book_id,
                "Book returned"
            );
            Ok(record)
        })
        .await
    }

    /// Get a borrow record by ID
    pub async fn get_borrow_record(&self, record_id: BorrowRecordId) -> AppResult<BorrowRecord> {
        with_deadline(self.deadline, "get_borrow_record", async {
            self.store
                .find_borrow_record(record_id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("Borrow record {} not found", record_id)))
        })
        .await
    }
}
