//! Draft Store: loads and saves the Course Draft document keyed by course id.

use std::sync::Arc;

use coursegen_shared::{CourseDraft, CourseGenError, CourseId, Result};
use coursegen_storage::DocumentStore;
use tracing::debug;

/// Typed access to course drafts on top of a [`DocumentStore`].
///
/// Every load returns the document version; saves are rejected with
/// [`CourseGenError::Conflict`] when another writer got there first.
#[derive(Clone)]
pub struct DraftStore {
    documents: Arc<dyn DocumentStore>,
}

impl DraftStore {
    pub fn new(documents: Arc<dyn DocumentStore>) -> Self {
        Self { documents }
    }

    /// Load a draft and its version. A stored body that does not decode as a
    /// draft is [`CourseGenError::Corrupt`].
    pub async fn load(&self, course_id: &CourseId) -> Result<Option<(CourseDraft, u64)>> {
        let Some(document) = self.documents.get(course_id.as_str()).await? else {
            return Ok(None);
        };

        let draft: CourseDraft =
            serde_json::from_value(document.body).map_err(|e| CourseGenError::Corrupt {
                course_id: course_id.to_string(),
                message: e.to_string(),
            })?;

        if draft.id != *course_id {
            return Err(CourseGenError::Corrupt {
                course_id: course_id.to_string(),
                message: format!("document holds course {}", draft.id),
            });
        }

        Ok(Some((draft, document.version)))
    }

    /// Store a brand-new draft and return its first version.
    pub async fn create(&self, draft: &CourseDraft) -> Result<u64> {
        if self.documents.get(draft.id.as_str()).await?.is_some() {
            return Err(CourseGenError::validation(format!(
                "course {} already exists",
                draft.id
            )));
        }
        let body = to_body(draft)?;
        self.documents.put(draft.id.as_str(), &body, None).await
    }

    /// Save `draft` if the stored copy is still at `expected_version`.
    pub async fn save(&self, draft: &mut CourseDraft, expected_version: u64) -> Result<u64> {
        draft.touch();
        let body = to_body(draft)?;
        let version = self
            .documents
            .put(draft.id.as_str(), &body, Some(expected_version))
            .await?;
        debug!(course_id = %draft.id, version, "draft saved");
        Ok(version)
    }

    pub async fn delete(&self, course_id: &CourseId) -> Result<()> {
        self.documents.delete(course_id.as_str()).await
    }

    pub async fn list(&self) -> Result<Vec<CourseId>> {
        Ok(self
            .documents
            .keys()
            .await?
            .into_iter()
            .map(CourseId)
            .collect())
    }
}

fn to_body(draft: &CourseDraft) -> Result<serde_json::Value> {
    serde_json::to_value(draft)
        .map_err(|e| CourseGenError::parse(format!("serialize draft {}: {e}", draft.id)))
}
