//! Course lifecycle: creation, status and deletion.

use std::collections::HashSet;

use chrono::Utc;
use coursegen_shared::{
    ChunkResult, CourseDraft, CourseGenError, CourseId, Cursor, ImageRef, ProgressSnapshot,
    ProgressUpdate, Quiz, Result,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::pipeline::Pipeline;

/// Metadata for a new course, as submitted by the author.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CourseRequest {
    pub title: String,
    pub description: String,
    pub target_audience: String,
    pub difficulty: String,
    pub learning_objectives: Vec<String>,
    pub prerequisites: String,
    pub main_topics: String,
    pub cover_image: Option<String>,
    pub images: Vec<ImageUpload>,
}

/// An already-uploaded image, addressed by filename.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageUpload {
    pub filename: String,
    pub url: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreatedCourse {
    pub course_id: CourseId,
    /// Result of the `init` step run during creation.
    pub chunk: ChunkResult,
}

#[derive(Debug, Clone, Serialize)]
pub struct CourseStatus {
    pub course_id: CourseId,
    pub title: String,
    pub completed: bool,
    pub cursor: Cursor,
    pub progress: ProgressSnapshot,
}

impl CourseRequest {
    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(CourseGenError::validation("course title is required"));
        }

        let mut seen = HashSet::new();
        for image in &self.images {
            let filename = image.filename.trim();
            if filename.is_empty() {
                return Err(CourseGenError::validation("image filename is required"));
            }
            if !seen.insert(filename) {
                return Err(CourseGenError::validation(format!(
                    "duplicate image filename: {filename}"
                )));
            }
        }
        Ok(())
    }

    fn into_draft(self) -> CourseDraft {
        let now = Utc::now();
        let id = CourseId::generate(&self.title);
        CourseDraft {
            id,
            title: self.title.trim().to_string(),
            description: self.description.trim().to_string(),
            target_audience: self.target_audience.trim().to_string(),
            difficulty: self.difficulty.trim().to_string(),
            learning_objectives: self
                .learning_objectives
                .into_iter()
                .map(|o| o.trim().to_string())
                .filter(|o| !o.is_empty())
                .collect(),
            prerequisites: self.prerequisites.trim().to_string(),
            main_topics: self.main_topics,
            cover_image: self.cover_image.filter(|c| !c.trim().is_empty()),
            created_at: now,
            updated_at: now,
            completed: false,
            estimated_time: String::new(),
            images: self
                .images
                .into_iter()
                .map(|image| ImageRef {
                    id: Uuid::new_v4().to_string(),
                    url: image.url.trim().to_string(),
                    filename: image.filename.trim().to_string(),
                    description: image.description.trim().to_string(),
                    analyzed: false,
                    analysis: None,
                })
                .collect(),
            chapters: Vec::new(),
            quiz: Quiz::default(),
        }
    }
}

fn parse_id(course_id: &str) -> Result<CourseId> {
    let trimmed = course_id.trim();
    if trimmed.is_empty() {
        return Err(CourseGenError::validation("missing course id"));
    }
    Ok(CourseId(trimmed.to_string()))
}

impl Pipeline {
    /// Store a new draft, reset its cursor and progress, and run `init` once.
    #[instrument(skip_all, fields(title = %request.title))]
    pub async fn create_course(&self, request: CourseRequest) -> Result<CreatedCourse> {
        request.validate()?;
        let draft = request.into_draft();
        let course_id = draft.id.clone();

        self.drafts().create(&draft).await?;
        self.cursors().reset(&course_id).await?;
        self.progress().reset(&course_id).await;
        self.progress()
            .update(
                &course_id,
                ProgressUpdate {
                    current_task: Some("Course created".into()),
                    ..ProgressUpdate::default()
                },
            )
            .await;
        info!(%course_id, images = draft.images.len(), "course created");

        let chunk = self.advance(course_id.as_str()).await;
        Ok(CreatedCourse { course_id, chunk })
    }

    /// Current cursor and progress of an existing course.
    pub async fn status(&self, course_id: &str) -> Result<CourseStatus> {
        let course_id = parse_id(course_id)?;
        let (draft, _) = self
            .drafts()
            .load(&course_id)
            .await?
            .ok_or_else(|| CourseGenError::NotFound(format!("course {course_id}")))?;

        Ok(CourseStatus {
            cursor: self.cursors().load(&course_id).await?,
            progress: self.progress().get(&course_id).await,
            title: draft.title,
            completed: draft.completed,
            course_id,
        })
    }

    pub async fn load_course(&self, course_id: &str) -> Result<CourseDraft> {
        let course_id = parse_id(course_id)?;
        self.drafts()
            .load(&course_id)
            .await?
            .map(|(draft, _)| draft)
            .ok_or_else(|| CourseGenError::NotFound(format!("course {course_id}")))
    }

    pub async fn list_courses(&self) -> Result<Vec<CourseId>> {
        self.drafts().list().await
    }

    /// Remove the draft, every cursor key and the progress snapshot.
    #[instrument(skip_all, fields(course_id = %course_id))]
    pub async fn delete_course(&self, course_id: &str) -> Result<()> {
        let course_id = parse_id(course_id)?;
        let existed = self.drafts().load(&course_id).await.map(|d| d.is_some());

        self.drafts().delete(&course_id).await?;
        self.cursors().clear(&course_id).await?;
        self.progress().clear(&course_id).await;
        self.kv().delete_prefix(&format!("{course_id}.")).await?;

        match existed {
            Ok(false) => Err(CourseGenError::NotFound(format!("course {course_id}"))),
            _ => {
                info!(%course_id, "course deleted");
                Ok(())
            }
        }
    }
}
