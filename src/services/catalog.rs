//! Catalog management service

use std::{sync::Arc, time::Duration};

use validator::Validate;

use crate::{
    clock::Clock,
    error::{AppError, AppResult},
    models::{
        book::{Book, BookFilter, CreateBook, NewBook, UpdateBook},
        id::BookId,
    },
    repository::Store,
};

use super::with_deadline;

#[derive(Clone)]
pub struct CatalogService {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    deadline: Duration,
}

impl CatalogService {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>, deadline: Duration) -> Self {
        Self {
            store,
            clock,
            deadline,
        }
    }

    /// Add a book to the catalog. New books are always available.
    pub async fn create_book(&self, book: CreateBook) -> AppResult<Book> {
        book.validate()?;

        with_deadline(self.deadline, "create_book", async {
            let book = self
                .store
                .insert_book(NewBook {
                    title: book.title,
                    author: book.author,
                    published_date: book.published_date.unwrap_or_else(|| self.clock.now()),
                })
                .await?;

            tracing::info!(book_id = %book.id, title = %book.title, "Book created");
            Ok(book)
        })
        .await
    }

    /// Get a book by ID
    pub async fn get_book(&self, id: BookId) -> AppResult<Book> {
        with_deadline(self.deadline, "get_book", async {
            self.store
                .find_book(BookFilter::by_id(id))
                .await?
                .ok_or_else(|| AppError::NotFound(format!("Book {} not found", id)))
        })
        .await
    }

    /// Update title, author or publication date. Lending state is untouched.
    pub async fn update_book(&self, id: BookId, update: UpdateBook) -> AppResult<Book> {
        update.validate()?;
        if update.is_empty() {
            return Err(AppError::InvalidArgument(
                "At least one of title, author or published_date is required".to_string(),
            ));
        }

        with_deadline(self.deadline, "update_book", async {
            let book = self
                .store
                .update_book(id, update)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("Book {} not found", id)))?;

            tracing::info!(book_id = %book.id, "Book updated");
            Ok(book)
        })
        .await
    }

    /// Remove a book from the catalog, whatever its lending status
    pub async fn delete_book(&self, id: BookId) -> AppResult<()> {
        with_deadline(self.deadline, "delete_book", async {
            let deleted = self.store.delete_book(id).await?;
            if deleted == 0 {
                return Err(AppError::NotFound(format!("Book {} not found", id)));
            }

            tracing::info!(book_id = %id, "Book deleted");
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        clock::ManualClock,
        models::{book::BookStatus, id::UserId},
        repository::memory::MemoryStore,
        services::lending::LendingService,
    };
    use chrono::{TimeZone, Utc};

    fn catalog(store: &MemoryStore, clock: &ManualClock) -> CatalogService {
        CatalogService::new(
            Arc::new(store.clone()),
            Arc::new(clock.clone()),
            Duration::from_secs(5),
        )
    }

    fn create(title: &str) -> CreateBook {
        CreateBook {
            title: title.to_string(),
            author: "Octavia E. Butler".to_string(),
            published_date: None,
        }
    }

    #[tokio::test]
    async fn test_create_book_starts_available() {
        let store = MemoryStore::new();
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap());
        let catalog = catalog(&store, &clock);

        let book = catalog.create_book(create("Kindred")).await.unwrap();
        assert_eq!(book.status, BookStatus::Available);
        assert_eq!(book.borrower_id, None);
        assert_eq!(book.published_date, clock.now());

        assert_eq!(catalog.get_book(book.id).await.unwrap(), book);
    }

    #[tokio::test]
    async fn test_create_book_keeps_given_date() {
        let store = MemoryStore::new();
        let clock = ManualClock::new(Utc::now());
        let catalog = catalog(&store, &clock);
        let published = Utc.with_ymd_and_hms(1979, 6, 1, 0, 0, 0).unwrap();

        let book = catalog
            .create_book(CreateBook {
                published_date: Some(published),
                ..create("Kindred")
            })
            .await
            .unwrap();
        assert_eq!(book.published_date, published);
    }

    #[tokio::test]
    async fn test_create_book_requires_title() {
        let store = MemoryStore::new();
        let catalog = catalog(&store, &ManualClock::new(Utc::now()));

        let err = catalog.create_book(create("")).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_get_missing_book() {
        let store = MemoryStore::new();
        let catalog = catalog(&store, &ManualClock::new(Utc::now()));

        let err = catalog.get_book(BookId::generate()).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_update_leaves_lending_state_alone() {
        let store = MemoryStore::new();
        let clock = ManualClock::new(Utc::now());
        let catalog = catalog(&store, &clock);
        let lending = LendingService::new(
            Arc::new(store.clone()),
            Arc::new(clock.clone()),
            Duration::from_secs(5),
        );

        let book = catalog.create_book(create("Parable of the Sower")).await.unwrap();
        let user = store
            .insert_user(crate::models::user::NewUser {
                username: "reader".to_string(),
                password_hash: "unused".to_string(),
                created_at: Utc::now(),
            })
            .await
            .unwrap();
        lending.borrow_book(book.id, user.id).await.unwrap();

        let updated = catalog
            .update_book(
                book.id,
                UpdateBook {
                    title: Some("Parable of the Talents".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.title, "Parable of the Talents");
        assert_eq!(updated.author, book.author);
        assert_eq!(updated.status, BookStatus::Borrowed);
        assert_eq!(updated.borrower_id, Some(user.id));
    }

    #[tokio::test]
    async fn test_update_rejects_empty_and_missing() {
        let store = MemoryStore::new();
        let catalog = catalog(&store, &ManualClock::new(Utc::now()));
        let book = catalog.create_book(create("Dawn")).await.unwrap();

        let err = catalog.update_book(book.id, UpdateBook::default()).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidArgument(_)));

        let update = UpdateBook {
            author: Some("Someone".to_string()),
            ..Default::default()
        };
        let err = catalog.update_book(BookId::generate(), update).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_delete_book_even_when_borrowed() {
        let store = MemoryStore::new();
        let catalog = catalog(&store, &ManualClock::new(Utc::now()));
        let book = catalog.create_book(create("Wild Seed")).await.unwrap();

        let mut tx = store.begin().await.unwrap();
        tx.set_book_lending(book.id, crate::models::book::BookLending::lent_to(UserId::generate()))
            .await
            .unwrap();
        tx.commit().await.unwrap();

        catalog.delete_book(book.id).await.unwrap();
        assert!(matches!(
            catalog.get_book(book.id).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            catalog.delete_book(book.id).await,
            Err(AppError::NotFound(_))
        ));
    }
}
