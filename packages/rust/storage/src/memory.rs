//! In-process implementation of both store interfaces.
//!
//! Used by tests and dry runs. Semantics match [`crate::Storage`], including
//! version checks and expiry.

use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use coursegen_shared::{CourseGenError, Result};
use tokio::sync::Mutex;

use crate::{DocumentStore, ExpiringStore, VersionedDocument};

/// Process-local document and key-value store.
#[derive(Default)]
pub struct MemoryStore {
    documents: Mutex<BTreeMap<String, VersionedDocument>>,
    /// Value and expiry; `None` never expires.
    entries: Mutex<HashMap<String, (String, Option<Instant>)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<VersionedDocument>> {
        Ok(self.documents.lock().await.get(key).cloned())
    }

    async fn put(
        &self,
        key: &str,
        body: &serde_json::Value,
        expected_version: Option<u64>,
    ) -> Result<u64> {
        let mut documents = self.documents.lock().await;
        let current = documents.get(key).map(|d| d.version);

        let next = match (expected_version, current) {
            (None, current) => current.unwrap_or(0) + 1,
            (Some(expected), Some(actual)) if expected == actual => actual + 1,
            (Some(expected), Some(actual)) => {
                return Err(CourseGenError::Conflict {
                    key: key.to_string(),
                    expected,
                    actual,
                });
            }
            (Some(_), None) => return Err(CourseGenError::NotFound(key.to_string())),
        };

        documents.insert(
            key.to_string(),
            VersionedDocument {
                version: next,
                body: body.clone(),
            },
        );
        Ok(next)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.documents.lock().await.remove(key);
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>> {
        Ok(self.documents.lock().await.keys().cloned().collect())
    }
}

#[async_trait]
impl ExpiringStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some((_, Some(expires_at))) if *expires_at <= Instant::now() => {
                entries.remove(key);
                Ok(None)
            }
            Some((value, _)) => Ok(Some(value.clone())),
            None => Ok(None),
        }
    }

    async fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let expires_at = Instant::now().checked_add(ttl);
        self.entries
            .lock()
            .await
            .insert(key.to_string(), (value.to_string(), expires_at));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.lock().await.remove(key);
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<()> {
        self.entries
            .lock()
            .await
            .retain(|key, _| !key.starts_with(prefix));
        Ok(())
    }

    async fn purge_expired(&self) -> Result<u64> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|_, (_, expires_at)| expires_at.is_none_or(|at| at > now));
        Ok((before - entries.len()) as u64)
    }
}
