//! PostgreSQL store
//!
//! Borrow and return run in a read-committed transaction; the book row is
//! locked with `FOR UPDATE` when read inside a transaction, so concurrent
//! borrows of the same book queue on the row and re-check its status. The
//! partial unique index on open loans backs the one-open-loan-per-book rule.
//!
//! The tests below need a live database and are ignored by default:
//! `DATABASE_URL=postgres://... cargo test -- --ignored`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, Pool, Postgres, Transaction};

use super::{Store, StoreTx};
use crate::{
    config::DatabaseConfig,
    error::{AppError, AppResult},
    models::{
        book::{Book, BookFilter, BookLending, BookRow, BookStatus, NewBook, UpdateBook},
        borrow_record::{BorrowRecord, NewBorrowRecord},
        id::{BookId, BorrowRecordId, UserId},
        user::{NewUser, User, UserFilter},
    },
};

const BOOK_COLUMNS: &str = "id, title, author, published_date, status, borrower_id";
const BORROW_RECORD_COLUMNS: &str = "id, book_id, user_id, borrowed_at, returned_at";
const USER_COLUMNS: &str = "id, username, password_hash, created_at";

fn find_book_query(lock: bool) -> String {
    format!(
        "SELECT {} FROM books WHERE id = $1 AND ($2::text IS NULL OR status = $2){}",
        BOOK_COLUMNS,
        if lock { " FOR UPDATE" } else { "" }
    )
}

#[derive(Clone)]
pub struct PgStore {
    pool: Pool<Postgres>,
}

impl PgStore {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Create a connection pool from configuration
    pub async fn connect(config: &DatabaseConfig) -> AppResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .connect(&config.url)
            .await?;

        tracing::info!("Connected to database");
        Ok(Self::new(pool))
    }

    /// Run embedded migrations
    pub async fn migrate(&self) -> AppResult<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to run database migrations: {}", e)))?;

        tracing::info!("Database migrations completed");
        Ok(())
    }

    pub fn pool(&self) -> &Pool<Postgres> {
        &self.pool
    }
}

#[async_trait]
impl Store for PgStore {
    async fn begin(&self) -> AppResult<Box<dyn StoreTx>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgTx { tx }))
    }

    async fn ping(&self) -> AppResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn find_book(&self, filter: BookFilter) -> AppResult<Option<Book>> {
        sqlx::query_as::<_, BookRow>(&find_book_query(false))
            .bind(filter.id)
            .bind(filter.status.map(|s| s.as_str()))
            .fetch_optional(&self.pool)
            .await?
            .map(Book::try_from)
            .transpose()
    }

    async fn insert_book(&self, book: NewBook) -> AppResult<Book> {
        let row = sqlx::query_as::<_, BookRow>(&format!(
            r#"
            INSERT INTO books (id, title, author, published_date, status, borrower_id)
            VALUES ($1, $2, $3, $4, $5, NULL)
            RETURNING {}
            "#,
            BOOK_COLUMNS
        ))
        .bind(BookId::generate())
        .bind(&book.title)
        .bind(&book.author)
        .bind(book.published_date)
        .bind(BookStatus::Available.as_str())
        .fetch_one(&self.pool)
        .await?;

        row.try_into()
    }

    async fn update_book(&self, id: BookId, update: UpdateBook) -> AppResult<Option<Book>> {
        sqlx::query_as::<_, BookRow>(&format!(
            r#"
            UPDATE books
            SET title = COALESCE($2, title),
                author = COALESCE($3, author),
                published_date = COALESCE($4, published_date)
            WHERE id = $1
            RETURNING {}
            "#,
            BOOK_COLUMNS
        ))
        .bind(id)
        .bind(update.title)
        .bind(update.author)
        .bind(update.published_date)
        .fetch_optional(&self.pool)
        .await?
        .map(Book::try_from)
        .transpose()
    }

    async fn delete_book(&self, id: BookId) -> AppResult<u64> {
        let result = sqlx::query("DELETE FROM books WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn mark_overdue(&self, cutoff: DateTime<Utc>) -> AppResult<u64> {
        // Both the book and its open loan are locked, so after waiting on a
        // concurrent return each row is re-checked at its latest version.
        let result = sqlx::query(
            r#"
            WITH due AS (
                SELECT b.id
                FROM books AS b
                JOIN borrow_records AS r ON r.book_id = b.id
                WHERE r.returned_at IS NULL
                  AND r.borrowed_at < $1
                  AND b.status = $3
                  AND b.borrower_id = r.user_id
                FOR UPDATE OF b, r
            )
            UPDATE books
            SET status = $2
            FROM due
            WHERE books.id = due.id
              AND books.status = $3
            "#,
        )
        .bind(cutoff)
        .bind(BookStatus::Overdue.as_str())
        .bind(BookStatus::Borrowed.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn find_borrow_record(&self, id: BorrowRecordId) -> AppResult<Option<BorrowRecord>> {
        let record = sqlx::query_as::<_, BorrowRecord>(&format!(
            "SELECT {} FROM borrow_records WHERE id = $1",
            BORROW_RECORD_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn insert_user(&self, user: NewUser) -> AppResult<User> {
        sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (id, username, password_hash, created_at)
            VALUES ($1, $2, $3, $4)
            RETURNING {}
            "#,
            USER_COLUMNS
        ))
        .bind(UserId::generate())
        .bind(&user.username)
        .bind(&user.password_hash)
        .bind(user.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                AppError::Conflict(format!("Username {:?} is already taken", user.username))
            }
            other => AppError::Database(other),
        })
    }

    async fn find_user(&self, filter: UserFilter) -> AppResult<Option<User>> {
        let user = match filter {
            UserFilter::Id(id) => {
                sqlx::query_as::<_, User>(&format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS))
                    .bind(id)
                    .fetch_optional(&self.pool)
                    .await?
            }
            UserFilter::Username(username) => {
                sqlx::query_as::<_, User>(&format!(
                    "SELECT {} FROM users WHERE username = $1",
                    USER_COLUMNS
                ))
                .bind(username)
                .fetch_optional(&self.pool)
                .await?
            }
        };

        Ok(user)
    }
}

/// Transaction on a pooled connection. Dropping it without commit rolls back.
struct PgTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTx for PgTx {
    async fn find_book(&mut self, filter: BookFilter) -> AppResult<Option<Book>> {
        sqlx::query_as::<_, BookRow>(&find_book_query(true))
            .bind(filter.id)
            .bind(filter.status.map(|s| s.as_str()))
            .fetch_optional(&mut *self.tx)
            .await?
            .map(Book::try_from)
            .transpose()
    }

    async fn set_book_lending(&mut self, id: BookId, lending: BookLending) -> AppResult<u64> {
        let result = sqlx::query("UPDATE books SET status = $2, borrower_id = $3 WHERE id = $1")
            .bind(id)
            .bind(lending.status().as_str())
            .bind(lending.borrower_id())
            .execute(&mut *self.tx)
            .await?;

        Ok(result.rows_affected())
    }

    async fn insert_borrow_record(&mut self, record: NewBorrowRecord) -> AppResult<BorrowRecord> {
        let record = sqlx::query_as::<_, BorrowRecord>(&format!(
            r#"
            INSERT INTO borrow_records (id, book_id, user_id, borrowed_at, returned_at)
            VALUES ($1, $2, $3, $4, NULL)
            RETURNING {}
            "#,
            BORROW_RECORD_COLUMNS
        ))
        .bind(BorrowRecordId::generate())
        .bind(record.book_id)
        .bind(record.user_id)
        .bind(record.borrowed_at)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(record)
    }

    async fn close_borrow_record(
        &mut self,
        id: BorrowRecordId,
        returned_at: DateTime<Utc>,
    ) -> AppResult<Option<BorrowRecord>> {
        let record = sqlx::query_as::<_, BorrowRecord>(&format!(
            r#"
            UPDATE borrow_records
            SET returned_at = $2
            WHERE id = $1 AND returned_at IS NULL
            RETURNING {}
            "#,
            BORROW_RECORD_COLUMNS
        ))
        .bind(id)
        .bind(returned_at)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(record)
    }

    async fn commit(self: Box<Self>) -> AppResult<()> {
        let PgTx { tx } = *self;
        tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> AppResult<()> {
        let PgTx { tx } = *self;
        tx.rollback().await?;
        Ok(())
    }
}
