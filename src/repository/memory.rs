//! In-memory store for tests and local development
//!
//! All collections sit behind one async mutex. A transaction holds the mutex
//! for its whole lifetime and works on a copy of the collections, which
//! replaces the shared state only on commit. Transactions are therefore
//! serializable, and dropping one discards its writes.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{Store, StoreTx};
use crate::{
    error::{AppError, AppResult},
    models::{
        book::{Book, BookFilter, BookLending, BookStatus, NewBook, UpdateBook},
        borrow_record::{BorrowRecord, NewBorrowRecord},
        id::{BookId, BorrowRecordId, UserId},
        user::{NewUser, User, UserFilter},
    },
};

#[derive(Debug, Default, Clone)]
struct Collections {
    books: HashMap<BookId, Book>,
    borrow_records: HashMap<BorrowRecordId, BorrowRecord>,
    users: HashMap<UserId, User>,
}

impl Collections {
    fn find_book(&self, filter: &BookFilter) -> Option<Book> {
        self.books.get(&filter.id).filter(|b| filter.matches(b)).cloned()
    }

    fn set_book_lending(&mut self, id: BookId, lending: BookLending) -> u64 {
        match self.books.get_mut(&id) {
            Some(book) => {
                lending.apply(book);
                1
            }
            None => 0,
        }
    }

    fn insert_borrow_record(&mut self, record: NewBorrowRecord) -> AppResult<BorrowRecord> {
        let has_open_loan = self
            .borrow_records
            .values()
            .any(|r| r.book_id == record.book_id && r.is_open());
        if has_open_loan {
            return Err(AppError::Internal(format!(
                "Book {} already has an open borrow record",
                record.book_id
            )));
        }

        let record = BorrowRecord {
            id: BorrowRecordId::generate(),
            book_id: record.book_id,
            user_id: record.user_id,
            borrowed_at: record.borrowed_at,
            returned_at: None,
        };
        self.borrow_records.insert(record.id, record.clone());
        Ok(record)
    }

    fn close_borrow_record(
        &mut self,
        id: BorrowRecordId,
        returned_at: DateTime<Utc>,
    ) -> Option<BorrowRecord> {
        let record = self.borrow_records.get_mut(&id).filter(|r| r.is_open())?;
        record.returned_at = Some(returned_at);
        Some(record.clone())
    }

    fn mark_overdue(&mut self, cutoff: DateTime<Utc>) -> u64 {
        let mut modified = 0;
        for record in self.borrow_records.values().filter(|r| r.is_overdue_at(cutoff)) {
            if let Some(book) = self.books.get_mut(&record.book_id) {
                if book.status == BookStatus::Borrowed && book.borrower_id == Some(record.user_id) {
                    book.status = BookStatus::Overdue;
                    modified += 1;
                }
            }
        }
        modified
    }
}

/// Store backed by process memory. Cloning shares the same data.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<Collections>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every loan ever recorded for a book, oldest first
    pub async fn borrow_records_for_book(&self, book_id: BookId) -> Vec<BorrowRecord> {
        let state = self.state.lock().await;
        let mut records: Vec<BorrowRecord> = state
            .borrow_records
            .values()
            .filter(|r| r.book_id == book_id)
            .cloned()
            .collect();
        records.sort_by_key(|r| r.borrowed_at);
        records
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> AppResult<Box<dyn StoreTx>> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryTx { guard, working }))
    }

    async fn ping(&self) -> AppResult<()> {
        let _state = self.state.lock().await;
        Ok(())
    }

    async fn find_book(&self, filter: BookFilter) -> AppResult<Option<Book>> {
        Ok(self.state.lock().await.find_book(&filter))
    }

    async fn insert_book(&self, book: NewBook) -> AppResult<Book> {
        let book = Book {
            id: BookId::generate(),
            title: book.title,
            author: book.author,
            published_date: book.published_date,
            status: BookStatus::Available,
            borrower_id: None,
        };
        self.state.lock().await.books.insert(book.id, book.clone());
        Ok(book)
    }

    async fn update_book(&self, id: BookId, update: UpdateBook) -> AppResult<Option<Book>> {
        let mut state = self.state.lock().await;
        Ok(state.books.get_mut(&id).map(|book| {
            update.apply(book);
            book.clone()
        }))
    }

    async fn delete_book(&self, id: BookId) -> AppResult<u64> {
        let removed = self.state.lock().await.books.remove(&id);
        Ok(u64::from(removed.is_some()))
    }

    async fn mark_overdue(&self, cutoff: DateTime<Utc>) -> AppResult<u64> {
        Ok(self.state.lock().await.mark_overdue(cutoff))
    }

    async fn find_borrow_record(&self, id: BorrowRecordId) -> AppResult<Option<BorrowRecord>> {
        Ok(self.state.lock().await.borrow_records.get(&id).cloned())
    }

    async fn insert_user(&self, user: NewUser) -> AppResult<User> {
        let mut state = self.state.lock().await;
        if state.users.values().any(|u| u.username == user.username) {
            return Err(AppError::Conflict(format!(
                "Username {:?} is already taken",
                user.username
            )));
        }

        let user = User {
            id: UserId::generate(),
            username: user.username,
            password_hash: user.password_hash,
            created_at: user.created_at,
        };
        state.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_user(&self, filter: UserFilter) -> AppResult<Option<User>> {
        let state = self.state.lock().await;
        Ok(state.users.values().find(|u| filter.matches(u)).cloned())
    }
}

struct MemoryTx {
    guard: OwnedMutexGuard<Collections>,
    working: Collections,
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn find_book(&mut self, filter: BookFilter) -> AppResult<Option<Book>> {
        Ok(self.working.find_book(&filter))
    }

    async fn set_book_lending(&mut self, id: BookId, lending: BookLending) -> AppResult<u64> {
        Ok(self.working.set_book_lending(id, lending))
    }

    async fn insert_borrow_record(&mut self, record: NewBorrowRecord) -> AppResult<BorrowRecord> {
        self.working.insert_borrow_record(record)
    }

    async fn close_borrow_record(
        &mut self,
        id: BorrowRecordId,
        returned_at: DateTime<Utc>,
    ) -> AppResult<Option<BorrowRecord>> {
        Ok(self.working.close_borrow_record(id, returned_at))
    }

    async fn commit(self: Box<Self>) -> AppResult<()> {
        let MemoryTx { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> AppResult<()> {
        Ok(())
    }
}
