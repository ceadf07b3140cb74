use coursegen_ai::{CompletionRequest, extract_json_object, strip_code_fences};
use coursegen_shared::{Analysis, CourseDraft, ImageRef, Result};
use tracing::{debug, info, warn};

use super::init::step_after_images;
use super::{StepContext, StepOutcome, scaled};
use crate::pipeline::PipelineState;
use crate::prompts;

fn percent(done: usize, total: usize) -> u8 {
    scaled(8, 12, done, total)
}

/// Analyze the next batch of images. A failed image gets the sentinel
/// analysis and is still marked analyzed.
pub(super) async fn run(ctx: &StepContext<'_>, state: &mut PipelineState) -> Result<StepOutcome> {
    let total = state.draft.images.len();
    let start = state.cursor.image_index.min(total);
    let end = (start + ctx.settings.image_batch_size.max(1)).min(total);

    let mut analyzed = 0;
    let mut unavailable = 0;
    for index in start..end {
        if state.draft.images[index].analyzed {
            continue;
        }
        ctx.report(
            state,
            percent(index, total),
            format!("Analyzing image {} of {total}", index + 1),
        )
        .await;

        let image = state.draft.images[index].clone();
        let analysis = analyze(ctx, &state.draft, &image).await;
        if analysis.is_unavailable() {
            unavailable += 1;
        }
        state.draft.images[index].mark_analyzed(analysis);
        analyzed += 1;
    }

    if analyzed > 0 {
        ctx.save(state).await?;
    }

    state.cursor.image_index = end;
    if end >= total {
        let next = step_after_images(&state.draft);
        info!(course_id = %state.course_id, images = total, "image analysis finished");
        state.cursor.enter(next);
    }

    let mut message = format!("Analyzed images {} to {end} of {total}", start + 1);
    if unavailable > 0 {
        message.push_str(&format!(" ({unavailable} unavailable)"));
    }
    Ok(StepOutcome::new(percent(end, total), message))
}

async fn analyze(ctx: &StepContext<'_>, draft: &CourseDraft, image: &ImageRef) -> Analysis {
    let payload = match ctx.images.load(image).await {
        Ok(payload) => payload,
        Err(e) => {
            warn!(filename = %image.filename, error = %e, "image could not be loaded");
            return Analysis::unavailable();
        }
    };

    let ai = &ctx.settings.ai;
    let request = CompletionRequest::new(&ai.vision_model, prompts::image_analysis(draft, image))
        .max_tokens(ai.vision_max_tokens)
        .timeout(ai.vision_timeout)
        .image(payload);

    match ctx.ai.complete(request).await {
        Ok(text) => {
            let body = extract_json_object(&text).unwrap_or_else(|| strip_code_fences(&text));
            let analysis = Analysis::from_text(body);
            if matches!(&analysis, Analysis::Legacy(t) if t.is_empty()) {
                return Analysis::unavailable();
            }
            debug!(filename = %image.filename, structured = matches!(analysis, Analysis::Structured(_)), "image analyzed");
            analysis
        }
        Err(e) => {
            warn!(filename = %image.filename, error = %e, "vision analysis failed");
            Analysis::unavailable()
        }
    }
}
