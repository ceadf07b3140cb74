//! Orchestration state: the processing cursor, the UI progress snapshot and
//! the per-invocation chunk result.
//!
//! None of this is durable. A lost cursor falls back to [`Step::Init`] and a
//! lost snapshot to zero without touching the draft.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CourseGenError;

// ---------------------------------------------------------------------------
// Step
// ---------------------------------------------------------------------------

/// Pipeline steps in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    #[default]
    Init,
    AnalyzeImages,
    Outline,
    ChapterIntro,
    SectionContent,
    Finalize,
}

impl Step {
    pub const ALL: [Step; 6] = [
        Step::Init,
        Step::AnalyzeImages,
        Step::Outline,
        Step::ChapterIntro,
        Step::SectionContent,
        Step::Finalize,
    ];

    /// Persisted representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::AnalyzeImages => "analyze_images",
            Self::Outline => "outline",
            Self::ChapterIntro => "chapter_intro",
            Self::SectionContent => "section_content",
            Self::Finalize => "finalize",
        }
    }
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Step {
    type Err = CourseGenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Step::ALL
            .into_iter()
            .find(|step| step.as_str() == s.trim())
            .ok_or_else(|| CourseGenError::UnknownStep(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Cursor
// ---------------------------------------------------------------------------

/// Pointer to the next chunk of work for a course.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    pub step: Step,
    pub chapter_index: usize,
    pub section_index: usize,
    pub image_index: usize,
}

impl Cursor {
    /// Move to `step` with every index reset to zero.
    pub fn enter(&mut self, step: Step) {
        *self = Cursor {
            step,
            ..Cursor::default()
        };
    }
}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// UI-facing status values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStatus {
    #[default]
    Pending,
    Processing,
    Retrying,
    Completed,
    Failed,
}

/// Ephemeral progress record polled by the UI.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressSnapshot {
    pub percent_complete: u8,
    pub current_task: String,
    pub status: ProgressStatus,
    pub current_chapter: usize,
    pub current_section: usize,
    pub total_chapters: usize,
    pub total_sections: usize,
    pub completed_sections: usize,
    pub completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
}

/// A partial snapshot. `None` fields keep their previous value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressUpdate {
    pub percent_complete: Option<u8>,
    pub current_task: Option<String>,
    pub status: Option<ProgressStatus>,
    pub current_chapter: Option<usize>,
    pub current_section: Option<usize>,
    pub total_chapters: Option<usize>,
    pub total_sections: Option<usize>,
    pub completed_sections: Option<usize>,
    pub completed: Option<bool>,
}

impl ProgressUpdate {
    /// The common case: a percentage and a task description while processing.
    pub fn task(percent: u8, task: impl Into<String>) -> Self {
        Self {
            percent_complete: Some(percent),
            current_task: Some(task.into()),
            status: Some(ProgressStatus::Processing),
            ..Self::default()
        }
    }
}

impl ProgressSnapshot {
    /// Shallow-merge `update` over this snapshot.
    pub fn merge(&mut self, update: ProgressUpdate) {
        if let Some(v) = update.percent_complete {
            self.percent_complete = v.min(100);
        }
        if let Some(v) = update.current_task {
            self.current_task = v;
        }
        if let Some(v) = update.status {
            self.status = v;
        }
        if let Some(v) = update.current_chapter {
            self.current_chapter = v;
        }
        if let Some(v) = update.current_section {
            self.current_section = v;
        }
        if let Some(v) = update.total_chapters {
            self.total_chapters = v;
        }
        if let Some(v) = update.total_sections {
            self.total_sections = v;
        }
        if let Some(v) = update.completed_sections {
            self.completed_sections = v;
        }
        if let Some(v) = update.completed {
            self.completed = v;
        }
    }
}

// ---------------------------------------------------------------------------
// ChunkResult
// ---------------------------------------------------------------------------

/// What one pipeline invocation reports back to the polling client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkResult {
    pub success: bool,
    pub complete: bool,
    pub percent: u8,
    pub message: String,
    /// False only for terminal failures that polling cannot fix.
    #[serde(default = "default_retryable")]
    pub retryable: bool,
}

fn default_retryable() -> bool {
    true
}

impl ChunkResult {
    pub fn progressed(percent: u8, complete: bool, message: impl Into<String>) -> Self {
        Self {
            success: true,
            complete,
            percent,
            message: message.into(),
            retryable: true,
        }
    }

    pub fn failed(percent: u8, message: impl Into<String>, retryable: bool) -> Self {
        Self {
            success: false,
            complete: false,
            percent,
            message: message.into(),
            retryable,
        }
    }
}
