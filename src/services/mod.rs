//! Business logic services

pub mod catalog;
pub mod lending;
pub mod sweeper;
pub mod users;

use std::{future::Future, sync::Arc, time::Duration};

use crate::{
    clock::Clock,
    config::AppConfig,
    error::{AppError, AppResult},
    repository::Store,
};

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub catalog: catalog::CatalogService,
    pub lending: lending::LendingService,
    pub users: users::UsersService,
    store: Arc<dyn Store>,
    deadline: Duration,
}

impl Services {
    /// Create all services over the given store
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>, config: &AppConfig) -> Self {
        let deadline = config.lending.operation_timeout();

        Self {
            catalog: catalog::CatalogService::new(store.clone(), clock.clone(), deadline),
            lending: lending::LendingService::new(store.clone(), clock.clone(), deadline),
            users: users::UsersService::new(store.clone(), clock, config.auth.clone(), deadline),
            store,
            deadline,
        }
    }

    /// Check storage connectivity
    pub async fn ping(&self) -> AppResult<()> {
        with_deadline(self.deadline, "ping", self.store.ping()).await
    }
}

/// Bound an operation by `deadline`.
///
/// On expiry the operation's future is dropped, which rolls back any
/// transaction it had open.
pub(crate) async fn with_deadline<T, F>(deadline: Duration, operation: &str, fut: F) -> AppResult<T>
where
    F: Future<Output = AppResult<T>>,
{
    match tokio::time::timeout(deadline, fut).await {
        Ok(result) => result,
        Err(_) => Err(AppError::DeadlineExceeded(format!(
            "{} did not complete within {} ms",
            operation,
            deadline.as_millis()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{clock::SystemClock, repository::memory::MemoryStore};

    #[tokio::test]
    async fn test_with_deadline_passes_result_through() {
        let value = with_deadline(Duration::from_secs(1), "noop", async { Ok(7) }).await;
        assert_eq!(value.unwrap(), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_deadline_expires() {
        let result: AppResult<()> = with_deadline(Duration::from_millis(50), "sleepy", async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(())
        })
        .await;

        assert!(matches!(result, Err(AppError::DeadlineExceeded(ref msg)) if msg.contains("sleepy")));
    }

    #[tokio::test]
    async fn test_ping_is_bounded_by_deadline() {
        let mut config = AppConfig::default();
        config.lending.operation_timeout_ms = 50;
        let store = MemoryStore::new();
        let services = Services::new(Arc::new(store.clone()), Arc::new(SystemClock), &config);

        services.ping().await.unwrap();

        // A transaction left open keeps the store busy.
        let stuck = store.begin().await.unwrap();
        let result = services.ping().await;
        drop(stuck);

        assert!(matches!(result, Err(AppError::DeadlineExceeded(ref msg)) if msg.contains("ping")));
        services.ping().await.unwrap();
    }
}
