use coursegen_shared::{CourseDraft, Result, Step};
use tracing::info;

use super::StepOutcome;
use crate::pipeline::PipelineState;

pub(super) const PERCENT: u8 = 5;

/// Where work resumes once every image is analyzed.
///
/// A draft that already has chapters is never re-outlined, so a lost cursor
/// cannot wipe written content.
pub(super) fn step_after_images(draft: &CourseDraft) -> Step {
    if draft.completed {
        Step::Finalize
    } else if draft.chapters.is_empty() {
        Step::Outline
    } else {
        Step::ChapterIntro
    }
}

pub(super) fn run(state: &mut PipelineState) -> Result<StepOutcome> {
    let (next, message) = if state.draft.has_unanalyzed_images() {
        let pending = state.draft.images.iter().filter(|i| !i.analyzed).count();
        (Step::AnalyzeImages, format!("{pending} images queued for analysis"))
    } else {
        let next = step_after_images(&state.draft);
        (next, format!("Nothing to analyze, continuing with {next}"))
    };

    info!(course_id = %state.course_id, %next, "initialized");
    state.cursor.enter(next);
    Ok(StepOutcome::new(PERCENT, message))
}
