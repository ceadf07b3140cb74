use coursegen_shared::Result;
use tracing::info;

use super::{StepContext, StepOutcome};
use crate::pipeline::PipelineState;
use crate::text;

/// Mark the course complete. Running it again changes nothing.
pub(super) async fn run(ctx: &StepContext<'_>, state: &mut PipelineState) -> Result<StepOutcome> {
    if state.draft.completed {
        return Ok(StepOutcome::new(100, "Course already complete"));
    }

    let words: usize = state
        .draft
        .chapters
        .iter()
        .map(|c| {
            text::word_count(&c.introduction)
                + c.sections
                    .iter()
                    .map(|s| text::word_count(&s.content))
                    .sum::<usize>()
        })
        .sum();

    let minutes = text::reading_minutes(words, ctx.settings.words_per_minute);
    state.draft.estimated_time = text::format_minutes(minutes);
    state.draft.completed = true;
    ctx.save(state).await?;

    info!(course_id = %state.course_id, words, estimated_time = %state.draft.estimated_time, "course complete");
    Ok(StepOutcome::new(
        100,
        format!("Course complete ({} of reading)", state.draft.estimated_time),
    ))
}
