use coursegen_shared::{CourseDraft, Result, Step};
use tracing::{debug, warn};

use super::{StepContext, StepOutcome, scaled};
use crate::pipeline::PipelineState;
use crate::{fallback, prompts, text};

fn percent(done: usize, total: usize) -> u8 {
    scaled(50, 40, done, total)
}

/// First section at or after `(chapter, section)` in document order,
/// skipping chapters without sections.
fn locate(draft: &CourseDraft, mut chapter: usize, mut section: usize) -> Option<(usize, usize)> {
    while let Some(c) = draft.chapters.get(chapter) {
        if section < c.sections.len() {
            return Some((chapter, section));
        }
        chapter += 1;
        section = 0;
    }
    None
}

/// Write the body of the section at the cursor.
pub(super) async fn run(ctx: &StepContext<'_>, state: &mut PipelineState) -> Result<StepOutcome> {
    let total = state.draft.total_sections();
    let cursor = state.cursor;

    let Some((ci, si)) = locate(&state.draft, cursor.chapter_index, cursor.section_index) else {
        state.cursor.enter(Step::Finalize);
        return Ok(StepOutcome::new(percent(total, total), "All sections written"));
    };

    let settings = ctx.settings;
    let section = &state.draft.chapters[ci].sections[si];
    let title = section.title.clone();
    let mut changed = false;

    if text::is_substantial(
        &section.content,
        settings.substantial_word_count,
        settings.substantial_paragraphs,
    ) {
        debug!(course_id = %state.course_id, chapter = ci, section = si, "section already written");
    } else {
        let done = state.draft.sections_before(ci, si);
        ctx.report(
            state,
            percent(done, total),
            format!("Writing section {} of {total}: {title}", done + 1),
        )
        .await;

        let content = match ctx
            .write_html(
                prompts::section_content(&state.draft, ci, si),
                settings.ai.section_max_tokens,
                settings.ai.content_timeout,
            )
            .await
        {
            Ok(html) => html,
            Err(e) => {
                warn!(course_id = %state.course_id, chapter = ci, section = si, error = %e, "AI section unavailable, using fallback");
                fallback::section_content(&state.draft, ci, si)
            }
        };
        state.draft.chapters[ci].sections[si].content = content;
        changed = true;
    }

    let section = &mut state.draft.chapters[ci].sections[si];
    let estimate = text::estimated_time(&section.content, settings.words_per_minute);
    if section.estimated_time != estimate {
        section.estimated_time = estimate;
        changed = true;
    }

    if changed {
        ctx.save(state).await?;
    }

    let done = match locate(&state.draft, ci, si + 1) {
        Some((next_chapter, next_section)) => {
            state.cursor.chapter_index = next_chapter;
            state.cursor.section_index = next_section;
            state.draft.sections_before(next_chapter, next_section)
        }
        None => {
            state.cursor.enter(Step::Finalize);
            total
        }
    };

    Ok(StepOutcome::new(
        percent(done, total),
        format!("Section ready ({done} of {total}): {title}"),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use coursegen_shared::{Chapter, Section};

    #[test]
    fn locate_skips_empty_chapters() {
        let mut draft = crate::testing::sample_draft(0);
        let with = |n: usize| Chapter {
            title: "c".into(),
            sections: vec![Section::default(); n],
            ..Chapter::default()
        };
        draft.chapters = vec![with(1), with(0), with(2)];

        assert_eq!(locate(&draft, 0, 0), Some((0, 0)));
        assert_eq!(locate(&draft, 0, 1), Some((2, 0)));
        assert_eq!(locate(&draft, 2, 2), None);
        assert_eq!(locate(&draft, 7, 0), None);
    }
}
