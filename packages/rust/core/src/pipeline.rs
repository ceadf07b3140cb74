//! Pipeline Driver: one chunk of work per `advance` call.
//!
//! `advance` loads the cursor and draft into a [`PipelineState`], dispatches
//! to the executor for the current step and persists the moved cursor only
//! when the executor succeeds. A failed step leaves the cursor untouched so
//! the next poll retries the same step at the same indices.

use std::sync::Arc;

use coursegen_ai::AiService;
use coursegen_shared::{
    ChunkResult, CourseDraft, CourseGenError, CourseId, Cursor, PipelineSettings, ProgressStatus,
    ProgressUpdate, Result, Step,
};
use coursegen_storage::{DocumentStore, ExpiringStore};
use tracing::{error, info, instrument, warn};

use crate::cursor::CursorStore;
use crate::draft::DraftStore;
use crate::media::ImageLoader;
use crate::progress::ProgressReporter;
use crate::steps::{self, StepContext};

/// Everything one invocation works on.
#[derive(Debug, Clone)]
pub struct PipelineState {
    pub course_id: CourseId,
    pub cursor: Cursor,
    pub draft: CourseDraft,
    /// Draft version at load time, checked on every save.
    pub version: u64,
}

impl PipelineState {
    pub fn is_complete(&self) -> bool {
        self.cursor.step == Step::Finalize && self.draft.completed
    }

    /// Sections finished according to the cursor.
    pub fn completed_sections(&self) -> usize {
        match self.cursor.step {
            Step::SectionContent => self
                .draft
                .sections_before(self.cursor.chapter_index, self.cursor.section_index),
            Step::Finalize => self.draft.total_sections(),
            _ => 0,
        }
    }
}

/// The course-generation pipeline and its collaborators.
pub struct Pipeline {
    ai: Arc<dyn AiService>,
    images: Arc<dyn ImageLoader>,
    drafts: DraftStore,
    cursors: CursorStore,
    progress: ProgressReporter,
    kv: Arc<dyn ExpiringStore>,
    settings: PipelineSettings,
}

impl Pipeline {
    pub fn new(
        ai: Arc<dyn AiService>,
        images: Arc<dyn ImageLoader>,
        documents: Arc<dyn DocumentStore>,
        kv: Arc<dyn ExpiringStore>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            ai,
            images,
            drafts: DraftStore::new(documents),
            cursors: CursorStore::new(kv.clone(), settings.cursor_ttl),
            progress: ProgressReporter::new(kv.clone(), settings.progress_ttl),
            kv,
            settings,
        }
    }

    pub fn drafts(&self) -> &DraftStore {
        &self.drafts
    }

    pub fn cursors(&self) -> &CursorStore {
        &self.cursors
    }

    pub fn progress(&self) -> &ProgressReporter {
        &self.progress
    }

    pub(crate) fn kv(&self) -> &dyn ExpiringStore {
        self.kv.as_ref()
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Run one chunk for `course_id`. Never returns an error: every failure
    /// is reported in the [`ChunkResult`].
    #[instrument(skip_all, fields(course_id = %course_id))]
    pub async fn advance(&self, course_id: &str) -> ChunkResult {
        let course_id = course_id.trim();
        if course_id.is_empty() {
            return ChunkResult::failed(0, "missing course id", false);
        }
        let course_id = CourseId(course_id.to_string());

        match self.try_advance(&course_id).await {
            Ok(result) => result,
            Err(e) => self.report_failure(&course_id, e).await,
        }
    }

    async fn try_advance(&self, course_id: &CourseId) -> Result<ChunkResult> {
        let Some((draft, version)) = self.drafts.load(course_id).await? else {
            warn!(%course_id, "course not found");
            return Ok(ChunkResult::failed(
                0,
                format!("course {course_id} not found"),
                false,
            ));
        };
        let cursor = self.cursors.load(course_id).await?;

        let mut state = PipelineState {
            course_id: course_id.clone(),
            cursor,
            draft,
            version,
        };

        let ctx = StepContext {
            ai: self.ai.as_ref(),
            images: self.images.as_ref(),
            drafts: &self.drafts,
            progress: &self.progress,
            settings: &self.settings,
        };

        let from = state.cursor.step;
        let outcome = steps::execute(&ctx, &mut state).await?;
        self.cursors.save(course_id, &state.cursor).await?;

        let complete = state.is_complete();
        if from != state.cursor.step {
            info!(%course_id, %from, to = %state.cursor.step, percent = outcome.percent, "step advanced");
        }

        self.progress
            .update(
                course_id,
                ProgressUpdate {
                    percent_complete: Some(outcome.percent),
                    current_task: Some(outcome.message.clone()),
                    status: Some(if complete {
                        ProgressStatus::Completed
                    } else {
                        ProgressStatus::Processing
                    }),
                    current_chapter: Some(state.cursor.chapter_index),
                    current_section: Some(state.cursor.section_index),
                    total_chapters: Some(state.draft.chapters.len()),
                    total_sections: Some(state.draft.total_sections()),
                    completed_sections: Some(state.completed_sections()),
                    completed: Some(complete),
                },
            )
            .await;

        Ok(ChunkResult::progressed(outcome.percent, complete, outcome.message))
    }

    /// Turn a step-fatal error into a failure result, keeping the last
    /// reported percentage.
    async fn report_failure(&self, course_id: &CourseId, e: CourseGenError) -> ChunkResult {
        let retryable = e.is_retryable();
        let message = e.to_string();
        if retryable {
            warn!(%course_id, error = %message, "step failed, will retry on next poll");
        } else {
            error!(%course_id, error = %message, "pipeline halted");
        }

        let snapshot = self
            .progress
            .update(
                course_id,
                ProgressUpdate {
                    current_task: Some(message.clone()),
                    status: Some(if retryable {
                        ProgressStatus::Retrying
                    } else {
                        ProgressStatus::Failed
                    }),
                    ..ProgressUpdate::default()
                },
            )
            .await;

        ChunkResult::failed(snapshot.percent_complete, message, retryable)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Mutex;

    use super::*;
    use crate::repair::unused_images;
    use crate::testing::{
        Call, ScriptedAi, StaticImages, canned, harness, harness_with, sample_draft,
    };
    use coursegen_ai::AiError;
    use coursegen_shared::{Analysis, QuestionType};

    async fn run_to_completion(pipeline: &Pipeline, id: &CourseId) -> Vec<(Step, ChunkResult)> {
        let mut trace = Vec::new();
        for _ in 0..200 {
            let step = pipeline.cursors().load(id).await.unwrap().step;
            let result = pipeline.advance(id.as_str()).await;
            assert!(result.success, "step {step} failed: {}", result.message);
            let done = result.complete;
            trace.push((step, result));
            if done {
                return trace;
            }
        }
        panic!("pipeline did not complete");
    }

    fn assert_monotonic(trace: &[(Step, ChunkResult)]) {
        for pair in trace.windows(2) {
            assert!(pair[0].0 <= pair[1].0, "step went backwards: {:?}", pair);
            assert!(pair[0].1.percent <= pair[1].1.percent, "percent decreased: {:?}", pair);
        }
    }

    fn assert_brackets(trace: &[(Step, ChunkResult)]) {
        for (step, result) in trace {
            let (lo, hi) = match step {
                Step::Init => (5, 5),
                Step::AnalyzeImages => (8, 20),
                Step::Outline => (30, 30),
                Step::ChapterIntro => (40, 50),
                Step::SectionContent => (50, 90),
                Step::Finalize => (100, 100),
            };
            assert!(
                (lo..=hi).contains(&result.percent),
                "{step} reported {} outside {lo}..={hi}",
                result.percent
            );
        }
    }

    #[tokio::test]
    async fn full_run_with_healthy_ai() {
        let h = harness(ScriptedAi::healthy());
        let draft = sample_draft(4);
        h.seed(&draft).await;

        let trace = run_to_completion(&h.pipeline, &draft.id).await;
        assert_monotonic(&trace);
        assert_brackets(&trace);

        let steps: Vec<Step> = trace.iter().map(|(s, _)| *s).collect();
        assert_eq!(
            steps,
            vec![
                Step::Init,
                Step::AnalyzeImages,
                Step::AnalyzeImages,
                Step::Outline,
                Step::ChapterIntro,
                Step::ChapterIntro,
                Step::SectionContent,
                Step::SectionContent,
                Step::SectionContent,
                Step::SectionContent,
                Step::Finalize,
            ]
        );

        let done = h.draft(&draft.id).await;
        assert!(done.completed);
        assert!(done.images.iter().all(|i| i.analyzed && i.suitable_for_quiz()));
        assert!(unused_images(&done).is_empty());
        // "missing.png" was cleared and refilled by repair.
        assert_eq!(done.chapters[0].sections[1].image, "img-1.png");
        assert_eq!(done.chapters[1].sections[0].image, "img-2.png");
        assert_eq!(done.chapters[0].sections.last().unwrap().title, "Additional Content");
        assert_eq!(done.chapters[0].introduction, "<p>Welcome to this chapter.</p>");
        assert!(done.chapters.iter().flat_map(|c| &c.sections).all(|s| !s.estimated_time.is_empty()));
        assert_eq!(done.quiz.questions.len(), 1);
        assert_eq!(done.estimated_time, "4 minutes");

        let snapshot = h.pipeline.progress().get(&draft.id).await;
        assert_eq!(snapshot.percent_complete, 100);
        assert_eq!(snapshot.status, ProgressStatus::Completed);
        assert!(snapshot.completed);
        assert_eq!(snapshot.completed_sections, snapshot.total_sections);

        // Finalize is terminal and idempotent.
        let again = h.pipeline.advance(draft.id.as_str()).await;
        assert!(again.success && again.complete);
        assert_eq!(again.percent, 100);
        assert_eq!(h.draft(&draft.id).await, done);
    }

    #[tokio::test]
    async fn no_images_skips_analysis() {
        let h = harness(ScriptedAi::healthy());
        let draft = sample_draft(0);
        h.seed(&draft).await;

        let first = h.pipeline.advance(draft.id.as_str()).await;
        assert_eq!(first.percent, 5);
        assert_eq!(h.pipeline.cursors().load(&draft.id).await.unwrap().step, Step::Outline);

        let second = h.pipeline.advance(draft.id.as_str()).await;
        assert_eq!(second.percent, 30);
        assert_eq!(h.ai.count(Call::Vision), 0);
        assert_eq!(
            h.pipeline.cursors().load(&draft.id).await.unwrap().step,
            Step::ChapterIntro
        );
    }

    #[tokio::test]
    async fn ai_outage_degrades_to_fallback_content() {
        let h = harness(ScriptedAi::failing());
        let mut draft = sample_draft(7);
        draft.main_topics = "Membranes, Organelles, Mitosis, Meiosis".into();
        h.seed(&draft).await;

        let trace = run_to_completion(&h.pipeline, &draft.id).await;
        assert_monotonic(&trace);
        assert_brackets(&trace);

        let done = h.draft(&draft.id).await;
        assert!(done.completed);
        assert!(done.images.iter().all(|i| i.analyzed));
        assert!(done
            .images
            .iter()
            .all(|i| i.analysis.as_ref().is_some_and(Analysis::is_unavailable)));

        assert_eq!(done.chapters.len(), 4);
        assert!(done.chapters.iter().all(|c| c.sections.len() == 2));
        assert!(unused_images(&done).is_empty());
        assert!(done.chapters.iter().all(|c| c.introduction.contains("<ul>")));
        assert_eq!(done.quiz.questions.len(), 10);
        assert!(done.quiz.questions.iter().all(|q| q.kind != QuestionType::ImageChoice));

        // 7 images in batches of 3, 4 intros, 8 sections.
        assert_eq!(h.ai.count(Call::Vision), 7);
        assert_eq!(h.ai.count(Call::Intro), 4);
        assert_eq!(h.ai.count(Call::Section), 8);
    }

    #[tokio::test]
    async fn failed_image_load_does_not_block_batch() {
        let images = StaticImages {
            missing: HashSet::from(["img-1.png".to_string()]),
        };
        let h = harness_with(ScriptedAi::healthy(), images);
        let draft = sample_draft(3);
        h.seed(&draft).await;

        h.pipeline.advance(draft.id.as_str()).await;
        let result = h.pipeline.advance(draft.id.as_str()).await;
        assert!(result.success);
        assert_eq!(result.percent, 20);
        assert!(result.message.contains("1 unavailable"));

        let stored = h.draft(&draft.id).await;
        assert!(stored.images.iter().all(|i| i.analyzed));
        assert!(stored.images[1].analysis.as_ref().unwrap().is_unavailable());
        assert!(stored.images[0].suitable_for_quiz());
        assert_eq!(h.ai.count(Call::Vision), 2);
    }

    #[tokio::test]
    async fn failed_save_retries_same_step() {
        let h = harness(ScriptedAi::healthy());
        let draft = sample_draft(0);
        h.seed(&draft).await;
        h.pipeline.advance(draft.id.as_str()).await;

        h.documents.set_failing(true);
        let failed = h.pipeline.advance(draft.id.as_str()).await;
        assert!(!failed.success);
        assert!(!failed.complete);
        assert!(failed.retryable);
        assert_eq!(failed.percent, 20);

        let cursor = h.pipeline.cursors().load(&draft.id).await.unwrap();
        assert_eq!(cursor.step, Step::Outline);
        assert_eq!(h.pipeline.progress().get(&draft.id).await.status, ProgressStatus::Retrying);

        h.documents.set_failing(false);
        let retried = h.pipeline.advance(draft.id.as_str()).await;
        assert!(retried.success);
        assert_eq!(retried.percent, 30);
        assert_eq!(h.ai.count(Call::Outline), 2);
    }

    #[tokio::test]
    async fn failed_cursor_write_does_not_skip_sections() {
        let h = harness(ScriptedAi::healthy());
        let draft = sample_draft(0);
        h.seed(&draft).await;
        for _ in 0..3 {
            assert!(h.pipeline.advance(draft.id.as_str()).await.success);
        }
        let before = h.pipeline.cursors().load(&draft.id).await.unwrap();
        assert_eq!(before.step, Step::ChapterIntro);
        assert_eq!(before.chapter_index, 1);

        // The last introduction is written but moving to section_content
        // cannot reset the chapter index.
        h.kv.fail_writes_ending_with(Some(".chapter_index"));
        let failed = h.pipeline.advance(draft.id.as_str()).await;
        assert!(!failed.success && failed.retryable);
        assert_eq!(h.pipeline.cursors().load(&draft.id).await.unwrap(), before);

        h.kv.fail_writes_ending_with(None);
        let trace = run_to_completion(&h.pipeline, &draft.id).await;
        assert_eq!(trace[0].0, Step::ChapterIntro);

        let done = h.draft(&draft.id).await;
        assert!(done.completed);
        for (ci, chapter) in done.chapters.iter().enumerate() {
            for (si, section) in chapter.sections.iter().enumerate() {
                assert!(!section.content.is_empty(), "section {ci}.{si} was skipped");
            }
        }
        assert_eq!(h.ai.count(Call::Section), done.total_sections());
        assert_eq!(h.ai.count(Call::Intro), 3);
    }

    #[tokio::test]
    async fn concurrent_write_is_rejected() {
        let h = harness(ScriptedAi::healthy());
        let draft = sample_draft(0);
        h.seed(&draft).await;
        h.pipeline.advance(draft.id.as_str()).await;
        h.pipeline.advance(draft.id.as_str()).await;

        // Another writer bumps the version while this invocation holds an
        // older copy.
        let (mut stale, version) = h.pipeline.drafts().load(&draft.id).await.unwrap().unwrap();
        let (mut other, _) = h.pipeline.drafts().load(&draft.id).await.unwrap().unwrap();
        other.title = "Edited elsewhere".into();
        h.pipeline.drafts().save(&mut other, version).await.unwrap();

        let err = h.pipeline.drafts().save(&mut stale, version).await.unwrap_err();
        assert!(matches!(err, CourseGenError::Conflict { .. }));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn substantial_sections_are_not_rewritten() {
        let h = harness(ScriptedAi::healthy());
        let draft = sample_draft(0);
        h.seed(&draft).await;
        for _ in 0..4 {
            h.pipeline.advance(draft.id.as_str()).await;
        }
        assert_eq!(
            h.pipeline.cursors().load(&draft.id).await.unwrap().step,
            Step::SectionContent
        );

        // Simulate a crash after the first section was saved but before the
        // cursor moved: write the content directly.
        let (mut stored, version) = h.pipeline.drafts().load(&draft.id).await.unwrap().unwrap();
        stored.chapters[0].sections[0].content = canned(Call::Section);
        h.pipeline.drafts().save(&mut stored, version).await.unwrap();

        let result = h.pipeline.advance(draft.id.as_str()).await;
        assert!(result.success);
        assert_eq!(h.ai.count(Call::Section), 0);
        let after = h.draft(&draft.id).await;
        assert_eq!(after.chapters[0].sections[0].content, canned(Call::Section));
        assert_eq!(after.chapters[0].sections[0].estimated_time, "1 minute");
    }

    #[tokio::test]
    async fn missing_course_and_id() {
        let h = harness(ScriptedAi::healthy());
        let result = h.pipeline.advance("ghost-course").await;
        assert!(!result.success && !result.complete && !result.retryable);
        assert!(h.raw_kv("ghost-course.progress").await.is_none());
        assert!(h.raw_kv("ghost-course.step").await.is_none());

        let result = h.pipeline.advance("  ").await;
        assert!(!result.success);
        assert_eq!(result.message, "missing course id");
    }

    #[tokio::test]
    async fn missing_course_ignores_leftover_cursor() {
        let h = harness(ScriptedAi::healthy());
        ExpiringStore::put(
            h.kv.as_ref(),
            "ghost-course.step",
            "publish",
            std::time::Duration::from_secs(60),
        )
        .await
        .unwrap();

        let result = h.pipeline.advance("ghost-course").await;
        assert!(!result.success && !result.retryable);
        assert_eq!(result.message, "course ghost-course not found");
        assert!(h.raw_kv("ghost-course.progress").await.is_none());
        assert_eq!(h.raw_kv("ghost-course.step").await.as_deref(), Some("publish"));
    }

    #[tokio::test]
    async fn unknown_step_halts() {
        let h = harness(ScriptedAi::healthy());
        let draft = sample_draft(0);
        h.seed(&draft).await;
        ExpiringStore::put(
            h.kv.as_ref(),
            &format!("{}.step", draft.id),
            "publish",
            std::time::Duration::from_secs(60),
        )
        .await
        .unwrap();

        let result = h.pipeline.advance(draft.id.as_str()).await;
        assert!(!result.success);
        assert!(!result.retryable);
        assert!(result.message.contains("publish"));
        assert_eq!(h.pipeline.progress().get(&draft.id).await.status, ProgressStatus::Failed);
    }

    #[tokio::test]
    async fn lost_cursor_resumes_without_reoutlining() {
        let h = harness(ScriptedAi::healthy());
        let draft = sample_draft(0);
        h.seed(&draft).await;
        for _ in 0..3 {
            h.pipeline.advance(draft.id.as_str()).await;
        }
        let outlined = h.draft(&draft.id).await;
        assert!(!outlined.chapters.is_empty());

        h.pipeline.cursors().clear(&draft.id).await.unwrap();
        let result = h.pipeline.advance(draft.id.as_str()).await;
        assert!(result.success);
        assert_eq!(
            h.pipeline.cursors().load(&draft.id).await.unwrap().step,
            Step::ChapterIntro
        );
        assert_eq!(h.ai.count(Call::Outline), 1);
    }

    #[tokio::test]
    async fn outline_garbage_uses_fallback() {
        let seen = std::sync::Arc::new(Mutex::new(0usize));
        let counter = seen.clone();
        let ai = ScriptedAi::new(move |call, _| match call {
            Call::Outline => {
                *counter.lock().unwrap() += 1;
                Ok("I cannot produce JSON today.".into())
            }
            Call::Vision => Err(AiError::Timeout(std::time::Duration::from_secs(120))),
            other => Ok(canned(other)),
        });
        let h = harness(ai);
        let draft = sample_draft(5);
        h.seed(&draft).await;

        for _ in 0..4 {
            h.pipeline.advance(draft.id.as_str()).await;
        }
        assert_eq!(*seen.lock().unwrap(), 1);
        let stored = h.draft(&draft.id).await;
        assert_eq!(stored.chapters.len(), 3);
        assert_eq!(stored.chapters[0].title, "Membranes");
        assert!(unused_images(&stored).is_empty());
    }
}
