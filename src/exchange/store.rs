//! Storage capability for pending authorization codes.

use async_trait::async_trait;
use std::{collections::HashMap, time::Duration};
use tokio::{sync::Mutex, time::Instant};

use crate::error::Result;

#[derive(Debug, Clone)]
pub struct CodeEntry {
    pub code: String,
    pub token: String,
    pub created_at: Instant,
}

impl CodeEntry {
    #[must_use]
    pub fn is_expired(&self, ttl: Duration) -> bool {
        self.created_at.elapsed() >= ttl
    }
}

/// Where issued codes wait for redemption.
///
/// Implementations must make [`CodeStore::take`] an atomic check-and-delete:
/// for any code, at most one caller ever receives the entry.
#[async_trait]
pub trait CodeStore: Send + Sync {
    /// Store a new entry. Returns `false` if the code is already taken.
    async fn insert(&self, entry: CodeEntry) -> Result<bool>;

    /// Remove the entry and hand it to the caller in one step.
    async fn take(&self, code: &str) -> Result<Option<CodeEntry>>;

    /// Drop entries older than `ttl`, returning how many were removed.
    async fn purge_expired(&self, ttl: Duration) -> Result<usize>;
}

/// Single-process store guarded by a mutex.
#[derive(Debug, Default)]
pub struct MemoryCodeStore {
    entries: Mutex<HashMap<String, CodeEntry>>,
}

impl MemoryCodeStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

#[async_trait]
impl CodeStore for MemoryCodeStore {
    async fn insert(&self, entry: CodeEntry) -> Result<bool> {
        let mut entries = self.entries.lock().await;
        if entries.contains_key(&entry.code) {
            return Ok(false);
        }
        entries.insert(entry.code.clone(), entry);
        Ok(true)
    }

    async fn take(&self, code: &str) -> Result<Option<CodeEntry>> {
        Ok(self.entries.lock().await.remove(code))
    }

    async fn purge_expired(&self, ttl: Duration) -> Result<usize> {
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(ttl));
        Ok(before - entries.len())
    }
}
