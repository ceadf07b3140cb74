//! Deterministic, AI-free content used whenever the AI service is
//! unavailable or returns unusable output.
//!
//! Everything here is a pure function of the draft and settings: the same
//! topics and images always produce the same outline, quiz and prose.

use std::collections::HashSet;

use coursegen_shared::{
    Analysis, Chapter, CourseDraft, CourseGenError, ImageRef, PipelineSettings, Question,
    QuestionType, Quiz, Result, Section,
};

use crate::text::{escape_html, format_minutes};

/// Minutes budgeted per section when no content exists yet.
const MINUTES_PER_SECTION: usize = 15;

/// Chapters, quiz and estimated time produced by one outline strategy.
#[derive(Debug, Clone, PartialEq)]
pub struct Outline {
    pub chapters: Vec<Chapter>,
    pub quiz: Quiz,
    pub estimated_time: String,
}

impl Outline {
    /// Replace the draft's chapters, quiz and estimated time.
    pub fn apply_to(self, draft: &mut CourseDraft) {
        draft.chapters = self.chapters;
        draft.quiz = self.quiz;
        draft.estimated_time = self.estimated_time;
    }
}

// ---------------------------------------------------------------------------
// Outline
// ---------------------------------------------------------------------------

/// Topics used when the author gave none.
pub fn default_topics(title: &str) -> Vec<String> {
    vec![
        format!("Introduction to {title}"),
        "Core Concepts".into(),
        "Practical Applications".into(),
        "Review and Next Steps".into(),
    ]
}

/// Sections per chapter so that every image has a slot.
pub fn sections_per_chapter(image_count: usize, chapter_count: usize) -> usize {
    image_count.div_ceil(chapter_count.max(1)).max(2)
}

fn section_title(topic: &str, index: usize) -> String {
    match index {
        0 => format!("Understanding {topic}"),
        1 => format!("Applying {topic}"),
        2 => format!("{topic} in Practice"),
        3 => format!("Exploring {topic} Further"),
        n => format!("{topic}: Part {}", n + 1),
    }
}

pub fn estimate_from_sections(section_count: usize) -> String {
    format_minutes((section_count * MINUTES_PER_SECTION).max(MINUTES_PER_SECTION))
}

/// Build an outline from the author's topic list.
///
/// Images are dealt round-robin across chapters: image `k` goes to chapter
/// `k % chapters`, section `k / chapters`.
pub fn fallback_outline(draft: &CourseDraft, settings: &PipelineSettings) -> Result<Outline> {
    let title = draft.title.trim();
    if title.is_empty() {
        return Err(CourseGenError::validation("course has no title"));
    }

    let mut topics = draft.topic_list();
    if topics.is_empty() {
        topics = default_topics(title);
    }
    topics.truncate(settings.max_fallback_chapters.max(1));

    let chapter_count = topics.len();
    let per_chapter = sections_per_chapter(draft.images.len(), chapter_count);

    let mut chapters: Vec<Chapter> = topics
        .iter()
        .map(|topic| Chapter {
            title: topic.clone(),
            introduction: String::new(),
            sections: (0..per_chapter)
                .map(|j| Section {
                    title: section_title(topic, j),
                    ..Section::default()
                })
                .collect(),
        })
        .collect();

    for (k, image) in draft.images.iter().enumerate() {
        let section = &mut chapters[k % chapter_count].sections[k / chapter_count];
        if section.image.is_empty() {
            section.image = image.filename.clone();
        } else {
            section.additional_images.push(image.filename.clone());
        }
    }

    let placed: usize = chapters
        .iter()
        .flat_map(|c| &c.sections)
        .map(|s| s.image_filenames().count())
        .sum();
    if placed != draft.images.len() {
        return Err(CourseGenError::validation(format!(
            "fallback outline placed {placed} of {} images",
            draft.images.len()
        )));
    }

    let quiz = fallback_quiz(draft, &chapters, settings.fallback_quiz_questions);
    let estimated_time = estimate_from_sections(chapter_count * per_chapter);

    Ok(Outline {
        chapters,
        quiz,
        estimated_time,
    })
}

/// Last resort: one chapter, one section, one question.
pub fn minimal_outline(draft: &CourseDraft) -> Outline {
    let title = if draft.title.trim().is_empty() {
        "This Course"
    } else {
        draft.title.trim()
    };

    Outline {
        chapters: vec![Chapter {
            title: format!("{title}: Overview"),
            introduction: String::new(),
            sections: vec![Section {
                title: format!("Introduction to {title}"),
                ..Section::default()
            }],
        }],
        quiz: Quiz {
            title: format!("{title} Quiz"),
            description: format!("Check your understanding of {title}."),
            questions: vec![Question {
                question: format!("This course is about {title}."),
                kind: QuestionType::TrueFalse,
                options: vec!["True".into(), "False".into()],
                image_options: Vec::new(),
                correct_answer: 0,
                explanation: None,
            }],
        },
        estimated_time: estimate_from_sections(1),
    }
}

// ---------------------------------------------------------------------------
// Quiz
// ---------------------------------------------------------------------------

/// `count` text questions alternating multiple-choice / true-false, plus one
/// image-choice question when at least two images are suitable for quizzing.
pub fn fallback_quiz(draft: &CourseDraft, chapters: &[Chapter], count: usize) -> Quiz {
    let title = draft.title.trim();
    let mut questions = Vec::with_capacity(count + 1);

    if !chapters.is_empty() {
        for q in 0..count {
            let question = if q % 2 == 0 {
                multiple_choice(title, chapters, q)
            } else {
                true_false(chapters, q)
            };
            questions.push(question);
        }
    }

    if let Some(question) = image_choice(&draft.images) {
        questions.push(question);
    }

    Quiz {
        title: format!("{title} Quiz"),
        description: format!("Test your understanding of {title}."),
        questions,
    }
}

/// The chapter and section title question `q` is about.
fn subject(chapters: &[Chapter], q: usize) -> (&str, &str) {
    let chapter = &chapters[q % chapters.len()];
    let section = chapter
        .sections
        .get((q / chapters.len()) % chapter.sections.len().max(1))
        .map(|s| s.title.as_str())
        .unwrap_or(chapter.title.as_str());
    (chapter.title.as_str(), section)
}

fn multiple_choice(course_title: &str, chapters: &[Chapter], q: usize) -> Question {
    let (chapter, correct) = subject(chapters, q);

    let mut seen: HashSet<&str> = HashSet::from([correct]);
    let mut distractors: Vec<String> = Vec::with_capacity(3);

    let others = (1..chapters.len()).map(|offset| &chapters[(q + offset) % chapters.len()]);
    for other in others {
        if let Some(s) = other.sections.first() {
            if seen.insert(s.title.as_str()) {
                distractors.push(s.title.clone());
            }
        }
        if distractors.len() == 3 {
            break;
        }
    }

    let generic = [
        format!("Topics unrelated to {course_title}"),
        "None of the above".to_string(),
        "Material outside the scope of this course".to_string(),
    ];
    for filler in generic {
        if distractors.len() == 3 {
            break;
        }
        if !distractors.contains(&filler) && filler != correct {
            distractors.push(filler);
        }
    }

    let position = (q / 2) % (distractors.len() + 1);
    let mut options = distractors;
    options.insert(position, correct.to_string());

    Question {
        question: format!("Which of these is covered in the chapter \"{chapter}\"?"),
        kind: QuestionType::MultipleChoice,
        options,
        image_options: Vec::new(),
        correct_answer: position,
        explanation: Some(format!("\"{correct}\" is part of \"{chapter}\".")),
    }
}

fn true_false(chapters: &[Chapter], q: usize) -> Question {
    let (chapter, section) = subject(chapters, q);
    let other = (chapters.len() > 1 && (q / 2) % 2 == 1)
        .then(|| {
            let other = &chapters[(q + 1) % chapters.len()];
            other.sections.first().map(|s| s.title.as_str())
        })
        .flatten()
        .filter(|other| *other != section);

    let (statement, answer, explanation) = match other {
        Some(other) => (
            format!("The section \"{other}\" belongs to the chapter \"{chapter}\"."),
            1,
            format!("\"{other}\" is covered in a different chapter."),
        ),
        None => (
            format!("The section \"{section}\" belongs to the chapter \"{chapter}\"."),
            0,
            format!("\"{section}\" is part of \"{chapter}\"."),
        ),
    };

    Question {
        question: statement,
        kind: QuestionType::TrueFalse,
        options: vec!["True".into(), "False".into()],
        image_options: Vec::new(),
        correct_answer: answer,
        explanation: Some(explanation),
    }
}

/// What an image-choice question should ask about.
fn quiz_subject(image: &ImageRef) -> String {
    if let Some(Analysis::Structured(s)) = &image.analysis {
        if let Some(concept) = s.quiz_potential.quiz_concepts.first() {
            return concept.clone();
        }
        if let Some(concept) = s.concepts.first() {
            return concept.clone();
        }
    }
    if !image.description.trim().is_empty() {
        return image.description.trim().to_string();
    }
    image.filename.clone()
}

fn image_choice(images: &[ImageRef]) -> Option<Question> {
    let suitable: Vec<&ImageRef> = images
        .iter()
        .filter(|i| i.suitable_for_quiz())
        .take(4)
        .collect();
    if suitable.len() < 2 {
        return None;
    }

    let subject = quiz_subject(suitable[0]);
    Some(Question {
        question: format!("Which image best illustrates {subject}?"),
        kind: QuestionType::ImageChoice,
        options: Vec::new(),
        image_options: suitable.iter().map(|i| i.filename.clone()).collect(),
        correct_answer: 0,
        explanation: None,
    })
}

// ---------------------------------------------------------------------------
// Prose
// ---------------------------------------------------------------------------

/// Introduction for chapter `chapter_index` listing its sections.
pub fn chapter_intro(draft: &CourseDraft, chapter_index: usize) -> String {
    let course = escape_html(draft.title.trim());
    let Some(chapter) = draft.chapters.get(chapter_index) else {
        return format!("<p>This chapter continues the course <strong>{course}</strong>.</p>");
    };
    let title = escape_html(&chapter.title);

    let mut html = format!(
        "<p>Welcome to <strong>{title}</strong>, chapter {} of {} in <em>{course}</em>.</p>",
        chapter_index + 1,
        draft.chapters.len()
    );
    if !draft.target_audience.trim().is_empty() {
        html.push_str(&format!(
            "<p>This chapter is written for {}.</p>",
            escape_html(draft.target_audience.trim())
        ));
    }
    if !chapter.sections.is_empty() {
        html.push_str("<p>In this chapter you will work through:</p><ul>");
        for section in &chapter.sections {
            html.push_str(&format!("<li>{}</li>", escape_html(&section.title)));
        }
        html.push_str("</ul>");
    }
    html
}

/// Body for section `section_index` of chapter `chapter_index`.
pub fn section_content(draft: &CourseDraft, chapter_index: usize, section_index: usize) -> String {
    let course = escape_html(draft.title.trim());
    let Some(chapter) = draft.chapters.get(chapter_index) else {
        return format!("<p>This section is part of <em>{course}</em>.</p>");
    };
    let Some(section) = chapter.sections.get(section_index) else {
        return format!("<p>This section is part of <em>{course}</em>.</p>");
    };

    let section_title = escape_html(&section.title);
    let mut html = format!(
        "<p>This section covers <strong>{section_title}</strong> as part of the chapter \
         <em>{}</em>.</p>",
        escape_html(&chapter.title)
    );

    if !draft.description.trim().is_empty() {
        html.push_str(&format!(
            "<p>{}</p>",
            escape_html(draft.description.trim())
        ));
    }

    for filename in section.image_filenames() {
        let Some(image) = draft.image_by_filename(filename) else {
            continue;
        };
        let summary = image
            .analysis
            .as_ref()
            .map(Analysis::summary)
            .unwrap_or_default();
        let caption = if image.description.trim().is_empty() {
            "The accompanying image".to_string()
        } else {
            format!("The accompanying image ({})", escape_html(image.description.trim()))
        };
        if summary.is_empty() {
            html.push_str(&format!("<p>{caption} illustrates this topic.</p>"));
        } else {
            html.push_str(&format!("<p>{caption} shows: {}</p>", escape_html(&summary)));
        }
    }

    if !draft.learning_objectives.is_empty() {
        html.push_str("<p>Keep these objectives in mind as you study:</p><ul>");
        for objective in &draft.learning_objectives {
            html.push_str(&format!("<li>{}</li>", escape_html(objective)));
        }
        html.push_str("</ul>");
    }

    html.push_str(&format!(
        "<p>Take a moment to review the key ideas of {section_title} before moving on.</p>"
    ));
    html
}
