//! Persistence for course drafts and expiring orchestration metadata.
//!
//! Two collaborator interfaces are defined here:
//! - [`DocumentStore`]: one versioned JSON document per key (the course draft)
//! - [`ExpiringStore`]: string values with a time-to-live (cursor fields,
//!   progress snapshots)
//!
//! [`Storage`] implements both on a local libSQL database; [`MemoryStore`]
//! implements both in process memory.

mod memory;
mod migrations;

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use coursegen_shared::{CourseGenError, Result};
use libsql::{Connection, Database, params};

pub use memory::MemoryStore;

// ---------------------------------------------------------------------------
// Collaborator interfaces
// ---------------------------------------------------------------------------

/// A stored JSON document and the version it was read at.
#[derive(Debug, Clone, PartialEq)]
pub struct VersionedDocument {
    pub version: u64,
    pub body: serde_json::Value,
}

/// Versioned JSON document storage.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetch a document. Unparsable bodies surface as [`CourseGenError::Corrupt`].
    async fn get(&self, key: &str) -> Result<Option<VersionedDocument>>;

    /// Write a document and return its new version.
    ///
    /// With `expected_version = Some(v)` the write only happens if the stored
    /// version is still `v`; otherwise [`CourseGenError::Conflict`] (or
    /// [`CourseGenError::NotFound`] if the document vanished). `None` writes
    /// unconditionally.
    async fn put(
        &self,
        key: &str,
        body: &serde_json::Value,
        expected_version: Option<u64>,
    ) -> Result<u64>;

    async fn delete(&self, key: &str) -> Result<()>;

    /// All document keys, sorted.
    async fn keys(&self) -> Result<Vec<String>>;
}

/// Key-value storage whose entries read as absent once expired.
#[async_trait]
pub trait ExpiringStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<()>;

    /// Remove every entry whose key starts with `prefix`.
    async fn delete_prefix(&self, prefix: &str) -> Result<()>;

    /// Drop expired entries, returning how many were removed.
    async fn purge_expired(&self) -> Result<u64>;
}

fn storage_err(e: libsql::Error) -> CourseGenError {
    CourseGenError::Storage(e.to_string())
}

fn expiry_millis(ttl: Duration) -> i64 {
    let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
    Utc::now().timestamp_millis().saturating_add(ttl_ms)
}

// ---------------------------------------------------------------------------
// libSQL storage
// ---------------------------------------------------------------------------

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
}

impl Storage {
    /// Open or create a database at `path`, applying pending migrations.
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| CourseGenError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(storage_err)?;

        let conn = db.connect().map_err(storage_err)?;

        let storage = Self { db, conn };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        CourseGenError::Storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    async fn current_version(&self, key: &str) -> Result<Option<u64>> {
        let mut rows = self
            .conn
            .query("SELECT version FROM courses WHERE id = ?1", params![key])
            .await
            .map_err(storage_err)?;

        match rows.next().await {
            Ok(Some(row)) => {
                let version: i64 = row.get(0).map_err(storage_err)?;
                Ok(Some(version as u64))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(storage_err(e)),
        }
    }
}

#[async_trait]
impl DocumentStore for Storage {
    async fn get(&self, key: &str) -> Result<Option<VersionedDocument>> {
        let mut rows = self
            .conn
            .query("SELECT body, version FROM courses WHERE id = ?1", params![key])
            .await
            .map_err(storage_err)?;

        let row = match rows.next().await {
            Ok(Some(row)) => row,
            Ok(None) => return Ok(None),
            Err(e) => return Err(storage_err(e)),
        };

        let body: String = row.get(0).map_err(storage_err)?;
        let version: i64 = row.get(1).map_err(storage_err)?;
        let body = serde_json::from_str(&body).map_err(|e| CourseGenError::Corrupt {
            course_id: key.to_string(),
            message: e.to_string(),
        })?;

        Ok(Some(VersionedDocument {
            version: version as u64,
            body,
        }))
    }

    async fn put(
        &self,
        key: &str,
        body: &serde_json::Value,
        expected_version: Option<u64>,
    ) -> Result<u64> {
        let text = serde_json::to_string(body)
            .map_err(|e| CourseGenError::Storage(format!("serialize {key}: {e}")))?;
        let now = Utc::now().to_rfc3339();

        match expected_version {
            None => {
                self.conn
                    .execute(
                        "INSERT INTO courses (id, body, version, created_at, updated_at)
                         VALUES (?1, ?2, 1, ?3, ?3)
                         ON CONFLICT(id) DO UPDATE SET
                           body = excluded.body,
                           version = courses.version + 1,
                           updated_at = excluded.updated_at",
                        params![key, text.as_str(), now.as_str()],
                    )
                    .await
                    .map_err(storage_err)?;

                self.current_version(key)
                    .await?
                    .ok_or_else(|| CourseGenError::NotFound(key.to_string()))
            }
            Some(expected) => {
                let changed = self
                    .conn
                    .execute(
                        "UPDATE courses SET body = ?1, version = version + 1, updated_at = ?2
                         WHERE id = ?3 AND version = ?4",
                        params![text.as_str(), now.as_str(), key, expected as i64],
                    )
                    .await
                    .map_err(storage_err)?;

                if changed > 0 {
                    return Ok(expected + 1);
                }

                match self.current_version(key).await? {
                    Some(actual) => Err(CourseGenError::Conflict {
                        key: key.to_string(),
                        expected,
                        actual,
                    }),
                    None => Err(CourseGenError::NotFound(key.to_string())),
                }
            }
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM courses WHERE id = ?1", params![key])
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let mut rows = self
            .conn
            .query("SELECT id FROM courses ORDER BY id", params![])
            .await
            .map_err(storage_err)?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(row.get::<String>(0).map_err(storage_err)?);
        }
        Ok(results)
    }
}

#[async_trait]
impl ExpiringStore for Storage {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut rows = self
            .conn
            .query(
                "SELECT value, expires_at FROM kv_entries WHERE key = ?1",
                params![key],
            )
            .await
            .map_err(storage_err)?;

        let row = match rows.next().await {
            Ok(Some(row)) => row,
            Ok(None) => return Ok(None),
            Err(e) => return Err(storage_err(e)),
        };

        let value: String = row.get(0).map_err(storage_err)?;
        let expires_at: i64 = row.get(1).map_err(storage_err)?;

        if expires_at <= Utc::now().timestamp_millis() {
            drop(rows);
            ExpiringStore::delete(self, key).await?;
            return Ok(None);
        }
        Ok(Some(value))
    }

    async fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO kv_entries (key, value, expires_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET
                   value = excluded.value,
                   expires_at = excluded.expires_at",
                params![key, value, expiry_millis(ttl)],
            )
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM kv_entries WHERE key = ?1", params![key])
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<()> {
        // substr instead of LIKE so `_` and `%` in keys are literal
        self.conn
            .execute(
                "DELETE FROM kv_entries WHERE substr(key, 1, length(?1)) = ?1",
                params![prefix],
            )
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    async fn purge_expired(&self) -> Result<u64> {
        let removed = self
            .conn
            .execute(
                "DELETE FROM kv_entries WHERE expires_at <= ?1",
                params![Utc::now().timestamp_millis()],
            )
            .await
            .map_err(storage_err)?;
        Ok(removed)
    }
}
