//! Cursor Store: the processing cursor as four independently expiring keys.
//!
//! Keys are `{course_id}.step`, `{course_id}.chapter_index`,
//! `{course_id}.section_index` and `{course_id}.image_index`. Missing keys
//! read as `init` / 0.

use std::sync::Arc;
use std::time::Duration;

use coursegen_shared::{CourseId, Cursor, Result, Step};
use coursegen_storage::ExpiringStore;
use tracing::warn;

const STEP: &str = "step";
const CHAPTER_INDEX: &str = "chapter_index";
const SECTION_INDEX: &str = "section_index";
const IMAGE_INDEX: &str = "image_index";

#[derive(Clone)]
pub struct CursorStore {
    kv: Arc<dyn ExpiringStore>,
    ttl: Duration,
}

pub(crate) fn cursor_key(course_id: &CourseId, field: &str) -> String {
    format!("{course_id}.{field}")
}

impl CursorStore {
    pub fn new(kv: Arc<dyn ExpiringStore>, ttl: Duration) -> Self {
        Self { kv, ttl }
    }

    /// Load the cursor. An unrecognized step is an error; an unreadable
    /// index falls back to zero.
    pub async fn load(&self, course_id: &CourseId) -> Result<Cursor> {
        let step = match self.kv.get(&cursor_key(course_id, STEP)).await? {
            Some(raw) => raw.parse::<Step>()?,
            None => Step::Init,
        };

        Ok(Cursor {
            step,
            chapter_index: self.load_index(course_id, CHAPTER_INDEX).await?,
            section_index: self.load_index(course_id, SECTION_INDEX).await?,
            image_index: self.load_index(course_id, IMAGE_INDEX).await?,
        })
    }

    async fn load_index(&self, course_id: &CourseId, field: &str) -> Result<usize> {
        let Some(raw) = self.kv.get(&cursor_key(course_id, field)).await? else {
            return Ok(0);
        };
        Ok(raw.trim().parse().unwrap_or_else(|_| {
            warn!(%course_id, field, value = %raw, "unreadable cursor index, using 0");
            0
        }))
    }

    /// Write the four keys: section before chapter, `step` last.
    ///
    /// A save that fails partway leaves the stored cursor at or before the
    /// old position, never past it.
    pub async fn save(&self, course_id: &CourseId, cursor: &Cursor) -> Result<()> {
        let fields = [
            (IMAGE_INDEX, cursor.image_index.to_string()),
            (SECTION_INDEX, cursor.section_index.to_string()),
            (CHAPTER_INDEX, cursor.chapter_index.to_string()),
            (STEP, cursor.step.as_str().to_string()),
        ];
        for (field, value) in fields {
            self.kv
                .put(&cursor_key(course_id, field), &value, self.ttl)
                .await?;
        }
        Ok(())
    }

    pub async fn reset(&self, course_id: &CourseId) -> Result<()> {
        self.save(course_id, &Cursor::default()).await
    }

    pub async fn clear(&self, course_id: &CourseId) -> Result<()> {
        for field in [STEP, CHAPTER_INDEX, SECTION_INDEX, IMAGE_INDEX] {
            self.kv.delete(&cursor_key(course_id, field)).await?;
        }
        Ok(())
    }
}
