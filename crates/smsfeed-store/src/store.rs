//! Async seam over the message repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use smsfeed_core::Message;

use crate::error::StoreError;
use crate::messages::MessageRepo;

/// Message persistence as seen by the ingest path, history view, and sweeper.
#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn insert(&self, sender: &str, text: &str) -> Result<Message, StoreError>;

    async fn recent(&self, limit: usize) -> Result<Vec<Message>, StoreError>;

    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError>;

    async fn count(&self) -> Result<usize, StoreError>;
}

/// SQLite-backed store. Each call runs on the blocking pool so the
/// connection mutex is never held on a runtime worker.
#[derive(Clone)]
pub struct SqliteMessageStore {
    repo: MessageRepo,
}

impl SqliteMessageStore {
    pub fn new(repo: MessageRepo) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl MessageStore for SqliteMessageStore {
    async fn insert(&self, sender: &str, text: &str) -> Result<Message, StoreError> {
        let repo = self.repo.clone();
        let (sender, text) = (sender.to_owned(), text.to_owned());
        run_blocking(move || repo.insert(&sender, &text)).await
    }

    async fn recent(&self, limit: usize) -> Result<Vec<Message>, StoreError> {
        let repo = self.repo.clone();
        run_blocking(move || repo.recent(limit)).await
    }

    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError> {
        let repo = self.repo.clone();
        run_blocking(move || repo.delete_older_than(cutoff)).await
    }

    async fn count(&self) -> Result<usize, StoreError> {
        let repo = self.repo.clone();
        run_blocking(move || repo.count()).await
    }
}

async fn run_blocking<F, T>(f: F) -> Result<T, StoreError>
where
    F: FnOnce() -> Result<T, StoreError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Database;
    use chrono::Duration;
    use std::sync::Arc;

    fn store() -> SqliteMessageStore {
        SqliteMessageStore::new(MessageRepo::new(Database::in_memory().unwrap()))
    }

    #[tokio::test]
    async fn insert_and_recent_through_trait_object() {
        let store: Arc<dyn MessageStore> = Arc::new(store());
        let msg = store.insert("bank", "your code is 0000").await.unwrap();
        let recent = store.recent(1).await.unwrap();
        assert_eq!(recent, vec![msg]);
    }

    #[tokio::test]
    async fn delete_older_than_through_trait() {
        let store = store();
        store.insert("a", "1").await.unwrap();
        store.insert("b", "2").await.unwrap();
        let cutoff = Utc::now() + Duration::seconds(1);
        assert_eq!(store.delete_older_than(cutoff).await.unwrap(), 2);
        assert_eq!(store.delete_older_than(cutoff).await.unwrap(), 0);
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_inserts_all_land() {
        let store = Arc::new(store());
        let tasks: Vec<_> = (0..32)
            .map(|i| {
                let store = Arc::clone(&store);
                tokio::spawn(async move { store.insert("s", &i.to_string()).await })
            })
            .collect();
        for t in tasks {
            t.await.unwrap().unwrap();
        }
        assert_eq!(store.count().await.unwrap(), 32);
        let recent = store.recent(100).await.unwrap();
        assert!(recent.windows(2).all(|w| w[0].received_at >= w[1].received_at));
    }
}
