use coursegen_ai::{AiError, AiResult, CompletionRequest, parse_json_response};
use coursegen_shared::{Chapter, CourseDraft, CourseGenError, Question, QuestionType, Quiz, Result, Step};
use serde::Deserialize;
use tracing::{info, warn};

use super::{StepContext, StepOutcome, TEMPERATURE};
use crate::fallback::{self, Outline};
use crate::pipeline::PipelineState;
use crate::{prompts, repair};

const PERCENT_DURING: u8 = 20;
const PERCENT_AFTER: u8 = 30;

/// Which tier of the cascade produced the outline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Source {
    Ai,
    Fallback,
    Minimal,
}

impl Source {
    fn label(self) -> &'static str {
        match self {
            Self::Ai => "generated",
            Self::Fallback => "fallback",
            Self::Minimal => "minimal",
        }
    }
}

/// Outline as the model returns it. Questions stay raw so one bad question
/// does not discard the rest.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawOutline {
    #[serde(default)]
    chapters: Vec<Chapter>,
    #[serde(default)]
    quiz: Option<RawQuiz>,
    #[serde(default, alias = "estimated_time")]
    estimated_time: String,
}

#[derive(Deserialize, Default)]
struct RawQuiz {
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    questions: Vec<serde_json::Value>,
}

pub(super) async fn run(ctx: &StepContext<'_>, state: &mut PipelineState) -> Result<StepOutcome> {
    ctx.report(state, PERCENT_DURING, "Generating course outline").await;

    let draft = &state.draft;
    let (outline, source) = generate(ctx, draft)
        .await
        .map(|o| (o, Source::Ai))
        .map_err(CourseGenError::from)
        .or_else(|e| {
            warn!(course_id = %state.course_id, error = %e, "AI outline unusable, using fallback outline");
            fallback::fallback_outline(draft, ctx.settings).map(|o| (o, Source::Fallback))
        })
        .unwrap_or_else(|e| {
            warn!(course_id = %state.course_id, error = %e, "fallback outline failed, using minimal outline");
            (fallback::minimal_outline(draft), Source::Minimal)
        });

    outline.apply_to(&mut state.draft);
    let dropped = repair::drop_unknown_images(&mut state.draft);
    let placed = repair::assign_unused_images(&mut state.draft);
    if dropped > 0 || placed > 0 {
        info!(course_id = %state.course_id, dropped, placed, "repaired image usage");
    }

    ctx.save(state).await?;
    state.cursor.enter(Step::ChapterIntro);

    let chapters = state.draft.chapters.len();
    let sections = state.draft.total_sections();
    info!(course_id = %state.course_id, chapters, sections, source = source.label(), "outline ready");
    Ok(StepOutcome::new(
        PERCENT_AFTER,
        format!(
            "Outline ready ({}): {chapters} chapters, {sections} sections",
            source.label()
        ),
    ))
}

async fn generate(ctx: &StepContext<'_>, draft: &CourseDraft) -> AiResult<Outline> {
    let ai = &ctx.settings.ai;
    let request = CompletionRequest::new(
        &ai.text_model,
        prompts::outline(draft, ctx.settings.fallback_quiz_questions),
    )
    .max_tokens(ai.outline_max_tokens)
    .timeout(ai.outline_timeout)
    .temperature(TEMPERATURE);

    let text = ctx.ai.complete(request).await?;
    let raw: RawOutline = parse_json_response(&text)?;
    validate(raw, draft, ctx.settings.fallback_quiz_questions)
}

/// Accept an outline only if it has chapters; salvage its valid questions.
fn validate(raw: RawOutline, draft: &CourseDraft, quiz_questions: usize) -> AiResult<Outline> {
    let chapters: Vec<Chapter> = raw
        .chapters
        .into_iter()
        .filter(|c| !c.title.trim().is_empty())
        .collect();
    if chapters.is_empty() {
        return Err(AiError::Malformed("outline has no chapters".into()));
    }

    let known = draft.image_filenames();
    let raw_quiz = raw.quiz.unwrap_or_default();
    let questions: Vec<Question> = raw_quiz
        .questions
        .into_iter()
        .filter_map(|value| serde_json::from_value::<Question>(value).ok())
        .filter(Question::is_valid)
        .filter(|q| {
            q.kind != QuestionType::ImageChoice
                || q.image_options.iter().all(|f| known.contains(f.as_str()))
        })
        .collect();

    let quiz = if questions.is_empty() {
        warn!("outline quiz had no usable questions, using fallback quiz");
        fallback::fallback_quiz(draft, &chapters, quiz_questions)
    } else {
        let title = if raw_quiz.title.trim().is_empty() {
            format!("{} Quiz", draft.title.trim())
        } else {
            raw_quiz.title
        };
        Quiz {
            title,
            description: raw_quiz.description,
            questions,
        }
    };

    let estimated_time = if raw.estimated_time.trim().is_empty() {
        fallback::estimate_from_sections(chapters.iter().map(|c| c.sections.len()).sum())
    } else {
        raw.estimated_time
    };

    Ok(Outline {
        chapters,
        quiz,
        estimated_time,
    })
}
