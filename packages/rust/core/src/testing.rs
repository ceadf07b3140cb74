//! Test doubles shared by the core unit tests.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use coursegen_ai::{AiError, AiResult, AiService, CompletionRequest, ImagePayload};
use coursegen_shared::{
    Analysis, CourseDraft, CourseGenError, CourseId, ImageRef, PipelineSettings, QuizPotential,
    Result, StructuredAnalysis,
};
use coursegen_storage::{DocumentStore, ExpiringStore, MemoryStore, VersionedDocument};

use crate::media::ImageLoader;
use crate::pipeline::Pipeline;

/// A draft with `images` unanalyzed images named `img-<n>.png` and three
/// topics.
pub(crate) fn sample_draft(images: usize) -> CourseDraft {
    let now = Utc::now();
    CourseDraft {
        id: CourseId("cell-biology-0a1b2c3d".into()),
        title: "Cell Biology".into(),
        description: "How cells are built and how they divide.".into(),
        target_audience: "first-year students".into(),
        difficulty: "beginner".into(),
        learning_objectives: vec!["Name the main organelles".into()],
        prerequisites: String::new(),
        main_topics: "Membranes, Organelles, Mitosis".into(),
        cover_image: None,
        created_at: now,
        updated_at: now,
        completed: false,
        estimated_time: String::new(),
        images: (0..images)
            .map(|i| ImageRef {
                id: format!("image-{i}"),
                url: String::new(),
                filename: format!("img-{i}.png"),
                description: format!("Figure {i}"),
                analyzed: false,
                analysis: None,
            })
            .collect(),
        chapters: Vec::new(),
        quiz: Default::default(),
    }
}

pub(crate) fn structured(concept: &str, suitable: bool) -> Analysis {
    Analysis::Structured(StructuredAnalysis {
        educational_analysis: format!("A diagram of {concept}"),
        visual_elements: "Labelled drawing".into(),
        concepts: vec![concept.to_string()],
        quiz_potential: QuizPotential {
            suitable_for_quiz: suitable,
            ..QuizPotential::default()
        },
    })
}

// ---------------------------------------------------------------------------
// AI double
// ---------------------------------------------------------------------------

/// Which call site a request came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Call {
    Vision,
    Outline,
    Intro,
    Section,
}

impl Call {
    pub(crate) fn of(request: &CompletionRequest) -> Call {
        let prompt = request
            .messages
            .last()
            .map(|m| m.content.as_str())
            .unwrap_or_default();
        if request.image.is_some() {
            Call::Vision
        } else if prompt.contains("Design the course outline") {
            Call::Outline
        } else if prompt.contains("introduction for this chapter") {
            Call::Intro
        } else {
            Call::Section
        }
    }
}

type Handler = dyn Fn(Call, &CompletionRequest) -> AiResult<String> + Send + Sync;

/// [`AiService`] answering from a closure and recording every call.
pub(crate) struct ScriptedAi {
    handler: Box<Handler>,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedAi {
    pub(crate) fn new(
        handler: impl Fn(Call, &CompletionRequest) -> AiResult<String> + Send + Sync + 'static,
    ) -> Self {
        Self {
            handler: Box::new(handler),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Every call fails like an overloaded service.
    pub(crate) fn failing() -> Self {
        Self::new(|_, _| {
            Err(AiError::Http {
                status: 503,
                body: "overloaded".into(),
            })
        })
    }

    /// Plausible answers for every call site. The outline only places the
    /// first image so repair has work to do.
    pub(crate) fn healthy() -> Self {
        Self::new(|call, _| Ok(canned(call)))
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn count(&self, call: Call) -> usize {
        self.calls().into_iter().filter(|c| *c == call).count()
    }
}

pub(crate) fn canned(call: Call) -> String {
    match call {
        Call::Vision => serde_json::json!({
            "educational_analysis": "Shows a plant cell",
            "visual_elements": "Cell wall, chloroplasts",
            "concepts": ["chloroplast"],
            "quiz_potential": {"suitable_for_quiz": true, "quiz_concepts": ["chloroplast"]}
        })
        .to_string(),
        Call::Outline => format!(
            "Here you go:\n```json\n{}\n```",
            serde_json::json!({
                "chapters": [
                    {"title": "Membranes", "sections": [
                        {"title": "Lipid bilayers", "image": "img-0.png"},
                        {"title": "Transport", "image": "missing.png"}
                    ]},
                    {"title": "Organelles", "sections": [
                        {"title": "The nucleus", "image": ""}
                    ]}
                ],
                "quiz": {"title": "Cells Quiz", "questions": [
                    {"question": "Cells have membranes.", "type": "true-false",
                     "options": ["True", "False"], "correctAnswer": 0},
                    {"question": "Broken", "type": "multiple-choice",
                     "options": ["A"], "correctAnswer": 3}
                ]},
                "estimatedTime": "1 hour"
            })
        ),
        Call::Intro => "```html\n<p>Welcome to this chapter.</p>\n```".into(),
        Call::Section => format!("<p>{}</p>", "Cells divide to grow. ".repeat(40)),
    }
}

#[async_trait]
impl AiService for ScriptedAi {
    async fn complete(&self, request: CompletionRequest) -> AiResult<String> {
        let call = Call::of(&request);
        self.calls.lock().unwrap().push(call);
        (self.handler)(call, &request)
    }
}

// ---------------------------------------------------------------------------
// Media double
// ---------------------------------------------------------------------------

/// Serves a tiny PNG for every image except those listed as missing.
#[derive(Default)]
pub(crate) struct StaticImages {
    pub missing: HashSet<String>,
}

#[async_trait]
impl ImageLoader for StaticImages {
    async fn load(&self, image: &ImageRef) -> Result<ImagePayload> {
        if self.missing.contains(&image.filename) {
            return Err(CourseGenError::NotFound(image.filename.clone()));
        }
        Ok(ImagePayload::from_bytes("image/png", b"\x89PNG"))
    }
}

// ---------------------------------------------------------------------------
// Storage double
// ---------------------------------------------------------------------------

/// [`MemoryStore`] whose document writes can be switched to fail.
#[derive(Default)]
pub(crate) struct FlakyDocuments {
    pub inner: MemoryStore,
    pub fail_writes: AtomicBool,
}

impl FlakyDocuments {
    pub(crate) fn set_failing(&self, failing: bool) {
        self.fail_writes.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl DocumentStore for FlakyDocuments {
    async fn get(&self, key: &str) -> Result<Option<VersionedDocument>> {
        DocumentStore::get(&self.inner, key).await
    }

    async fn put(
        &self,
        key: &str,
        body: &serde_json::Value,
        expected_version: Option<u64>,
    ) -> Result<u64> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(CourseGenError::Storage("disk full".into()));
        }
        DocumentStore::put(&self.inner, key, body, expected_version).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        DocumentStore::delete(&self.inner, key).await
    }

    async fn keys(&self) -> Result<Vec<String>> {
        self.inner.keys().await
    }
}

/// [`MemoryStore`] that rejects writes to keys ending in a chosen suffix.
#[derive(Default)]
pub(crate) struct FlakyKv {
    pub inner: MemoryStore,
    pub fail_suffix: Mutex<Option<String>>,
}

impl FlakyKv {
    pub(crate) fn fail_writes_ending_with(&self, suffix: Option<&str>) {
        *self.fail_suffix.lock().unwrap() = suffix.map(String::from);
    }

    fn rejects(&self, key: &str) -> bool {
        self.fail_suffix
            .lock()
            .unwrap()
            .as_deref()
            .is_some_and(|suffix| key.ends_with(suffix))
    }
}

#[async_trait]
impl ExpiringStore for FlakyKv {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        ExpiringStore::get(&self.inner, key).await
    }

    async fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        if self.rejects(key) {
            return Err(CourseGenError::Storage(format!("write to {key} refused")));
        }
        ExpiringStore::put(&self.inner, key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        ExpiringStore::delete(&self.inner, key).await
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<()> {
        self.inner.delete_prefix(prefix).await
    }

    async fn purge_expired(&self) -> Result<u64> {
        self.inner.purge_expired().await
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub(crate) struct Harness {
    pub pipeline: Pipeline,
    pub ai: Arc<ScriptedAi>,
    pub documents: Arc<FlakyDocuments>,
    pub kv: Arc<FlakyKv>,
}

pub(crate) fn harness(ai: ScriptedAi) -> Harness {
    harness_with(ai, StaticImages::default())
}

pub(crate) fn harness_with(ai: ScriptedAi, images: StaticImages) -> Harness {
    let ai = Arc::new(ai);
    let documents = Arc::new(FlakyDocuments::default());
    let kv = Arc::new(FlakyKv::default());
    let settings = PipelineSettings {
        cursor_ttl: Duration::from_secs(600),
        progress_ttl: Duration::from_secs(600),
        ..PipelineSettings::default()
    };
    let pipeline = Pipeline::new(
        ai.clone(),
        Arc::new(images),
        documents.clone(),
        kv.clone(),
        settings,
    );
    Harness {
        pipeline,
        ai,
        documents,
        kv,
    }
}

impl Harness {
    /// Store `draft` directly, bypassing course creation.
    pub(crate) async fn seed(&self, draft: &CourseDraft) {
        self.pipeline.drafts().create(draft).await.unwrap();
    }

    pub(crate) async fn draft(&self, id: &CourseId) -> CourseDraft {
        self.pipeline.drafts().load(id).await.unwrap().unwrap().0
    }

    pub(crate) async fn raw_kv(&self, key: &str) -> Option<String> {
        ExpiringStore::get(self.kv.as_ref(), key).await.unwrap()
    }
}
