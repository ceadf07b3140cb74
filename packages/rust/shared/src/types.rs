//! Course Draft domain types.
//!
//! The draft is one JSON document per course. Field names follow the stored
//! document format (camelCase at the top level, snake_case inside image
//! analyses) so drafts written by older tooling load unchanged.

use std::collections::HashSet;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

/// Sentinel stored when an image could not be analyzed.
pub const ANALYSIS_UNAVAILABLE: &str = "Image analysis unavailable.";

static NON_SLUG_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-z0-9]+").expect("static regex"));

// ---------------------------------------------------------------------------
// CourseId
// ---------------------------------------------------------------------------

/// A course identifier: a title slug plus a random suffix.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CourseId(pub String);

impl CourseId {
    /// Generate an id such as `intro-to-rust-3f9a1c2e`.
    pub fn generate(title: &str) -> Self {
        let slug = slugify(title);
        let random = Uuid::new_v4().simple().to_string();
        let suffix = &random[..8];
        if slug.is_empty() {
            Self(format!("course-{suffix}"))
        } else {
            Self(format!("{slug}-{suffix}"))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CourseId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lowercase, hyphen-separated, at most 48 characters.
pub fn slugify(text: &str) -> String {
    let lower = text.to_lowercase();
    let slug = NON_SLUG_CHARS.replace_all(&lower, "-");
    let slug = slug.trim_matches('-');
    let mut out: String = slug.chars().take(48).collect();
    while out.ends_with('-') {
        out.pop();
    }
    out
}

// ---------------------------------------------------------------------------
// Image analysis
// ---------------------------------------------------------------------------

/// Read `null` as the field's default.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// How an image could be used in a quiz.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuizPotential {
    #[serde(deserialize_with = "null_as_default")]
    pub suitable_for_quiz: bool,
    #[serde(deserialize_with = "null_as_default")]
    pub quiz_concepts: Vec<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub distinguishing_features: String,
    #[serde(deserialize_with = "null_as_default")]
    pub comparison_points: String,
}

/// Structured result of a vision analysis.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StructuredAnalysis {
    #[serde(deserialize_with = "null_as_default")]
    pub educational_analysis: String,
    #[serde(deserialize_with = "null_as_default")]
    pub visual_elements: String,
    #[serde(deserialize_with = "null_as_default")]
    pub concepts: Vec<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub quiz_potential: QuizPotential,
}

/// An image analysis, either structured or legacy free text.
///
/// Both shapes are accepted on load. A legacy string that itself holds a
/// JSON object is promoted to [`Analysis::Structured`]; an object that does
/// not fit the structured shape is kept as legacy text.
#[derive(Debug, Clone, PartialEq)]
pub enum Analysis {
    Structured(StructuredAnalysis),
    Legacy(String),
}

impl Analysis {
    /// Normalize free text, promoting embedded JSON objects.
    pub fn from_text(text: &str) -> Self {
        let trimmed = text.trim();
        if trimmed.starts_with('{') {
            if let Ok(structured) = serde_json::from_str::<StructuredAnalysis>(trimmed) {
                return Self::Structured(structured);
            }
        }
        Self::Legacy(trimmed.to_string())
    }

    pub fn unavailable() -> Self {
        Self::Legacy(ANALYSIS_UNAVAILABLE.to_string())
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Legacy(text) if text == ANALYSIS_UNAVAILABLE)
    }

    /// Only structured analyses can vouch for quiz suitability.
    pub fn suitable_for_quiz(&self) -> bool {
        match self {
            Self::Structured(s) => s.quiz_potential.suitable_for_quiz,
            Self::Legacy(_) => false,
        }
    }

    /// Prose summary suitable for prompts and fallback content.
    pub fn summary(&self) -> String {
        match self {
            Self::Structured(s) => {
                let mut parts = Vec::new();
                if !s.educational_analysis.trim().is_empty() {
                    parts.push(s.educational_analysis.trim().to_string());
                }
                if !s.visual_elements.trim().is_empty() {
                    parts.push(format!("Visual elements: {}", s.visual_elements.trim()));
                }
                if !s.concepts.is_empty() {
                    parts.push(format!("Key concepts: {}", s.concepts.join(", ")));
                }
                parts.join(" ")
            }
            Self::Legacy(text) if text == ANALYSIS_UNAVAILABLE => String::new(),
            Self::Legacy(text) => text.clone(),
        }
    }
}

impl Serialize for Analysis {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Structured(s) => s.serialize(serializer),
            Self::Legacy(text) => serializer.serialize_str(text),
        }
    }
}

impl<'de> Deserialize<'de> for Analysis {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        match value {
            serde_json::Value::String(text) => Ok(Self::from_text(&text)),
            serde_json::Value::Object(_) => {
                Ok(match StructuredAnalysis::deserialize(&value) {
                    Ok(structured) => Self::Structured(structured),
                    Err(_) => Self::Legacy(value.to_string()),
                })
            }
            other => Ok(Self::Legacy(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Draft
// ---------------------------------------------------------------------------

/// An uploaded image and its (possibly pending) analysis.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageRef {
    pub id: String,
    #[serde(default)]
    pub url: String,
    pub filename: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub analyzed: bool,
    #[serde(default)]
    pub analysis: Option<Analysis>,
}

impl ImageRef {
    /// Record an analysis. `analyzed` only ever moves from false to true.
    pub fn mark_analyzed(&mut self, analysis: Analysis) {
        self.analysis = Some(analysis);
        self.analyzed = true;
    }

    pub fn suitable_for_quiz(&self) -> bool {
        self.analysis.as_ref().is_some_and(Analysis::suitable_for_quiz)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Section {
    pub title: String,
    #[serde(default)]
    pub content: String,
    /// Filename of the attached image, or empty.
    #[serde(default)]
    pub image: String,
    /// Overflow images when a section holds more than one.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub additional_images: Vec<String>,
    #[serde(default)]
    pub estimated_time: String,
}

impl Section {
    /// All image filenames referenced by this section.
    pub fn image_filenames(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.image.as_str())
            .filter(|f| !f.is_empty())
            .chain(self.additional_images.iter().map(String::as_str))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Chapter {
    pub title: String,
    #[serde(default)]
    pub introduction: String,
    #[serde(default)]
    pub sections: Vec<Section>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QuestionType {
    MultipleChoice,
    TrueFalse,
    ImageChoice,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub question: String,
    #[serde(rename = "type")]
    pub kind: QuestionType,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
    /// Image filenames, for image-choice questions.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub image_options: Vec<String>,
    #[serde(rename = "correctAnswer")]
    pub correct_answer: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

impl Question {
    /// Number of answer choices regardless of question type.
    pub fn choice_count(&self) -> usize {
        match self.kind {
            QuestionType::ImageChoice => self.image_options.len(),
            _ => self.options.len(),
        }
    }

    /// A question is usable when it has a prompt, at least two choices and an
    /// in-range answer.
    pub fn is_valid(&self) -> bool {
        !self.question.trim().is_empty()
            && self.choice_count() >= 2
            && self.correct_answer < self.choice_count()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Quiz {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub questions: Vec<Question>,
}

/// The course document being incrementally built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseDraft {
    pub id: CourseId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub target_audience: String,
    #[serde(default)]
    pub difficulty: String,
    #[serde(default)]
    pub learning_objectives: Vec<String>,
    #[serde(default)]
    pub prerequisites: String,
    /// Free-text topic list as entered by the author.
    #[serde(default)]
    pub main_topics: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_image: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub estimated_time: String,
    #[serde(default)]
    pub images: Vec<ImageRef>,
    #[serde(default)]
    pub chapters: Vec<Chapter>,
    #[serde(default)]
    pub quiz: Quiz,
}

impl CourseDraft {
    pub fn total_sections(&self) -> usize {
        self.chapters.iter().map(|c| c.sections.len()).sum()
    }

    /// Sections that come before `(chapter_index, section_index)` in document order.
    pub fn sections_before(&self, chapter_index: usize, section_index: usize) -> usize {
        let earlier: usize = self
            .chapters
            .iter()
            .take(chapter_index)
            .map(|c| c.sections.len())
            .sum();
        let within = self
            .chapters
            .get(chapter_index)
            .map(|c| section_index.min(c.sections.len()))
            .unwrap_or(0);
        earlier + within
    }

    pub fn has_unanalyzed_images(&self) -> bool {
        self.images.iter().any(|i| !i.analyzed)
    }

    pub fn image_by_filename(&self, filename: &str) -> Option<&ImageRef> {
        self.images.iter().find(|i| i.filename == filename)
    }

    pub fn image_filenames(&self) -> HashSet<&str> {
        self.images.iter().map(|i| i.filename.as_str()).collect()
    }

    /// Topics parsed from the free-text `main_topics` field.
    ///
    /// Accepts newline, comma or semicolon separated lists and strips list
    /// markers; duplicates (case-insensitive) are dropped.
    pub fn topic_list(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.main_topics
            .split(['\n', ',', ';'])
            .map(|t| t.trim().trim_start_matches(['-', '*', '•']).trim())
            .filter(|t| !t.is_empty())
            .filter(|t| seen.insert(t.to_lowercase()))
            .map(String::from)
            .collect()
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
