//! Progress Reporter: the UI-facing snapshot under `{course_id}.progress`.
//!
//! Reporter failures never fail the pipeline. They are logged and the merged
//! snapshot is still returned.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use coursegen_shared::{CourseId, ProgressSnapshot, ProgressStatus, ProgressUpdate};
use coursegen_storage::ExpiringStore;
use tracing::warn;

#[derive(Clone)]
pub struct ProgressReporter {
    kv: Arc<dyn ExpiringStore>,
    ttl: Duration,
}

fn progress_key(course_id: &CourseId) -> String {
    format!("{course_id}.progress")
}

impl ProgressReporter {
    pub fn new(kv: Arc<dyn ExpiringStore>, ttl: Duration) -> Self {
        Self { kv, ttl }
    }

    /// Current snapshot, or the zero state when absent or unreadable.
    pub async fn get(&self, course_id: &CourseId) -> ProgressSnapshot {
        match self.kv.get(&progress_key(course_id)).await {
            Ok(Some(raw)) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!(%course_id, error = %e, "discarding unreadable progress snapshot");
                ProgressSnapshot::default()
            }),
            Ok(None) => ProgressSnapshot::default(),
            Err(e) => {
                warn!(%course_id, error = %e, "failed to read progress");
                ProgressSnapshot::default()
            }
        }
    }

    /// Merge `update` over the stored snapshot and persist it.
    pub async fn update(&self, course_id: &CourseId, update: ProgressUpdate) -> ProgressSnapshot {
        let mut snapshot = self.get(course_id).await;
        snapshot.merge(update);
        snapshot.last_updated = Some(Utc::now());
        self.store(course_id, &snapshot).await;
        snapshot
    }

    /// Replace the snapshot with a fresh pending one.
    pub async fn reset(&self, course_id: &CourseId) -> ProgressSnapshot {
        let snapshot = ProgressSnapshot {
            status: ProgressStatus::Pending,
            current_task: "Queued".into(),
            last_updated: Some(Utc::now()),
            ..ProgressSnapshot::default()
        };
        self.store(course_id, &snapshot).await;
        snapshot
    }

    pub async fn clear(&self, course_id: &CourseId) {
        if let Err(e) = self.kv.delete(&progress_key(course_id)).await {
            warn!(%course_id, error = %e, "failed to clear progress");
        }
    }

    async fn store(&self, course_id: &CourseId, snapshot: &ProgressSnapshot) {
        let raw = match serde_json::to_string(snapshot) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(%course_id, error = %e, "failed to serialize progress");
                return;
            }
        };
        if let Err(e) = self.kv.put(&progress_key(course_id), &raw, self.ttl).await {
            warn!(%course_id, error = %e, "failed to save progress");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coursegen_shared::{CourseGenError, Result};
    use coursegen_storage::MemoryStore;

    struct BrokenKv;

    #[async_trait::async_trait]
    impl ExpiringStore for BrokenKv {
        async fn get(&self, _key: &str) -> Result<Option<String>> {
            Err(CourseGenError::Storage("down".into()))
        }
        async fn put(&self, _key: &str, _value: &str, _ttl: Duration) -> Result<()> {
            Err(CourseGenError::Storage("down".into()))
        }
        async fn delete(&self, _key: &str) -> Result<()> {
            Err(CourseGenError::Storage("down".into()))
        }
        async fn delete_prefix(&self, _prefix: &str) -> Result<()> {
            Err(CourseGenError::Storage("down".into()))
        }
        async fn purge_expired(&self) -> Result<u64> {
            Err(CourseGenError::Storage("down".into()))
        }
    }

    #[tokio::test]
    async fn updates_merge() {
        let reporter = ProgressReporter::new(Arc::new(MemoryStore::new()), Duration::from_secs(60));
        let id = CourseId("c".into());

        reporter
            .update(
                &id,
                ProgressUpdate {
                    total_chapters: Some(4),
                    ..ProgressUpdate::default()
                },
            )
            .await;
        let snapshot = reporter.update(&id, ProgressUpdate::task(42, "Writing")).await;

        assert_eq!(snapshot.total_chapters, 4);
        assert_eq!(snapshot.percent_complete, 42);
        assert_eq!(snapshot.status, ProgressStatus::Processing);
        assert!(snapshot.last_updated.is_some());
        assert_eq!(reporter.get(&id).await, snapshot);
    }

    #[tokio::test]
    async fn failures_are_swallowed() {
        let reporter = ProgressReporter::new(Arc::new(BrokenKv), Duration::from_secs(60));
        let id = CourseId("c".into());
        let snapshot = reporter.update(&id, ProgressUpdate::task(10, "x")).await;
        assert_eq!(snapshot.percent_complete, 10);
        assert_eq!(reporter.get(&id).await, ProgressSnapshot::default());
        reporter.clear(&id).await;
    }
}
