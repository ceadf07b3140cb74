//! Step executors: one bounded unit of work per pipeline invocation.
//!
//! Each executor receives the loaded [`PipelineState`], does its chunk of
//! work, saves the draft if it changed and moves the cursor. The driver
//! persists the cursor only after the executor returns `Ok`.

mod analyze_images;
mod chapter_intro;
mod finalize;
mod init;
mod outline;
mod section_content;

use std::time::Duration;

use coursegen_ai::{AiError, AiResult, AiService, ChatMessage, CompletionRequest, strip_code_fences};
use coursegen_shared::{PipelineSettings, ProgressUpdate, Result, Step};

use crate::draft::DraftStore;
use crate::media::ImageLoader;
use crate::pipeline::PipelineState;
use crate::progress::ProgressReporter;

const TEMPERATURE: f32 = 0.7;

/// Collaborators available to every executor.
pub(crate) struct StepContext<'a> {
    pub ai: &'a dyn AiService,
    pub images: &'a dyn ImageLoader,
    pub drafts: &'a DraftStore,
    pub progress: &'a ProgressReporter,
    pub settings: &'a PipelineSettings,
}

/// What an executor reports back to the driver.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct StepOutcome {
    pub percent: u8,
    pub message: String,
}

impl StepOutcome {
    fn new(percent: u8, message: impl Into<String>) -> Self {
        Self {
            percent,
            message: message.into(),
        }
    }
}

impl StepContext<'_> {
    /// Persist the draft under optimistic concurrency.
    async fn save(&self, state: &mut PipelineState) -> Result<()> {
        state.version = self.drafts.save(&mut state.draft, state.version).await?;
        Ok(())
    }

    async fn report(&self, state: &PipelineState, percent: u8, task: impl Into<String>) {
        self.progress
            .update(&state.course_id, ProgressUpdate::task(percent, task))
            .await;
    }

    /// One text-model call returning HTML with any code fence removed.
    async fn write_html(
        &self,
        messages: Vec<ChatMessage>,
        max_tokens: u32,
        timeout: Duration,
    ) -> AiResult<String> {
        let request = CompletionRequest::new(&self.settings.ai.text_model, messages)
            .max_tokens(max_tokens)
            .timeout(timeout)
            .temperature(TEMPERATURE);
        let text = self.ai.complete(request).await?;
        let html = strip_code_fences(&text);
        if html.is_empty() {
            return Err(AiError::Empty);
        }
        Ok(html.to_string())
    }
}

/// `base + round(done / total * span)`, capped at `base + span`.
/// An empty range counts as finished.
pub(crate) fn scaled(base: u8, span: u8, done: usize, total: usize) -> u8 {
    if total == 0 {
        return base + span;
    }
    let fraction = (done.min(total) as f64) / (total as f64);
    base + ((fraction * f64::from(span)).round() as u8).min(span)
}

/// Run the executor for the cursor's current step.
pub(crate) async fn execute(ctx: &StepContext<'_>, state: &mut PipelineState) -> Result<StepOutcome> {
    match state.cursor.step {
        Step::Init => init::run(state),
        Step::AnalyzeImages => analyze_images::run(ctx, state).await,
        Step::Outline => outline::run(ctx, state).await,
        Step::ChapterIntro => chapter_intro::run(ctx, state).await,
        Step::SectionContent => section_content::run(ctx, state).await,
        Step::Finalize => finalize::run(ctx, state).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scaled_percentages() {
        assert_eq!(scaled(40, 10, 0, 4), 40);
        assert_eq!(scaled(40, 10, 1, 4), 43);
        assert_eq!(scaled(40, 10, 4, 4), 50);
        assert_eq!(scaled(50, 40, 9, 4), 90);
        assert_eq!(scaled(8, 12, 0, 0), 20);
    }
}
