use coursegen_shared::{Result, Step};
use tracing::{debug, warn};

use super::{StepContext, StepOutcome, scaled};
use crate::pipeline::PipelineState;
use crate::{fallback, prompts, text};

fn percent(done: usize, total: usize) -> u8 {
    scaled(40, 10, done, total)
}

/// Write the introduction of the chapter at the cursor.
pub(super) async fn run(ctx: &StepContext<'_>, state: &mut PipelineState) -> Result<StepOutcome> {
    let total = state.draft.chapters.len();
    let index = state.cursor.chapter_index;

    if index >= total {
        state.cursor.enter(Step::SectionContent);
        return Ok(StepOutcome::new(
            percent(total, total),
            "All chapter introductions written",
        ));
    }

    let title = state.draft.chapters[index].title.clone();
    let settings = ctx.settings;

    if text::is_substantial(
        &state.draft.chapters[index].introduction,
        settings.substantial_word_count,
        settings.substantial_paragraphs,
    ) {
        debug!(course_id = %state.course_id, chapter = index, "introduction already written");
    } else {
        ctx.report(
            state,
            percent(index, total),
            format!("Writing introduction for chapter {}: {title}", index + 1),
        )
        .await;

        let introduction = match ctx
            .write_html(
                prompts::chapter_intro(&state.draft, index),
                settings.ai.intro_max_tokens,
                settings.ai.content_timeout,
            )
            .await
        {
            Ok(html) => html,
            Err(e) => {
                warn!(course_id = %state.course_id, chapter = index, error = %e, "AI introduction unavailable, using fallback");
                fallback::chapter_intro(&state.draft, index)
            }
        };

        state.draft.chapters[index].introduction = introduction;
        ctx.save(state).await?;
    }

    state.cursor.chapter_index = index + 1;
    if state.cursor.chapter_index >= total {
        state.cursor.enter(Step::SectionContent);
    }

    Ok(StepOutcome::new(
        percent(index + 1, total),
        format!("Introduction ready for chapter {} of {total}: {title}", index + 1),
    ))
}
