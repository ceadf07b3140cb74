//! Prompt construction for every AI call site.

use std::fmt::Write as _;

use coursegen_ai::ChatMessage;
use coursegen_shared::{Analysis, CourseDraft, ImageRef};

const SYSTEM_DESIGNER: &str = "You are an expert instructional designer who builds clear, \
well-structured online courses. Follow the requested output format exactly.";

fn course_context(draft: &CourseDraft) -> String {
    let mut out = format!("Course title: {}\n", draft.title);
    let fields = [
        ("Description", draft.description.as_str()),
        ("Target audience", draft.target_audience.as_str()),
        ("Difficulty", draft.difficulty.as_str()),
        ("Prerequisites", draft.prerequisites.as_str()),
    ];
    for (label, value) in fields {
        if !value.trim().is_empty() {
            let _ = writeln!(out, "{label}: {}", value.trim());
        }
    }
    if !draft.learning_objectives.is_empty() {
        let _ = writeln!(out, "Learning objectives:");
        for objective in &draft.learning_objectives {
            let _ = writeln!(out, "- {objective}");
        }
    }
    out
}

fn image_line(image: &ImageRef) -> String {
    let mut line = format!("- {}", image.filename);
    if !image.description.trim().is_empty() {
        let _ = write!(line, " (author's note: {})", image.description.trim());
    }
    let summary = image
        .analysis
        .as_ref()
        .map(Analysis::summary)
        .unwrap_or_default();
    if !summary.is_empty() {
        let _ = write!(line, ": {summary}");
    }
    if image.suitable_for_quiz() {
        line.push_str(" [suitable for image quiz]");
    }
    line
}

/// Full outline: chapters, sections, image placement and quiz.
pub fn outline(draft: &CourseDraft, quiz_questions: usize) -> Vec<ChatMessage> {
    let mut prompt = course_context(draft);

    let topics = draft.topic_list();
    if !topics.is_empty() {
        let _ = writeln!(prompt, "Main topics: {}", topics.join("; "));
    }

    if draft.images.is_empty() {
        prompt.push_str("\nNo images were uploaded.\n");
    } else {
        prompt.push_str("\nUploaded images (use each filename at most once, exactly as written):\n");
        for image in &draft.images {
            let _ = writeln!(prompt, "{}", image_line(image));
        }
    }

    let _ = write!(
        prompt,
        r#"
Design the course outline. Respond with a single JSON object and nothing else:
{{
  "chapters": [
    {{
      "title": "Chapter title",
      "introduction": "",
      "sections": [{{"title": "Section title", "content": "", "image": "filename or empty string"}}]
    }}
  ],
  "quiz": {{
    "title": "Quiz title",
    "description": "One sentence",
    "questions": [
      {{"question": "...", "type": "multiple-choice", "options": ["A", "B", "C", "D"], "correctAnswer": 0}},
      {{"question": "...", "type": "true-false", "options": ["True", "False"], "correctAnswer": 1}},
      {{"question": "...", "type": "image-choice", "image_options": ["a.png", "b.png"], "correctAnswer": 0}}
    ]
  }},
  "estimatedTime": "2 hours"
}}
Rules: 3 to 6 chapters with 2 to 4 sections each. Place every uploaded image in the section it fits best.
Write {quiz_questions} quiz questions mixing multiple-choice and true-false; only use image-choice with images marked suitable."#
    );

    vec![ChatMessage::system(SYSTEM_DESIGNER), ChatMessage::user(prompt)]
}

/// Introduction for one chapter.
pub fn chapter_intro(draft: &CourseDraft, chapter_index: usize) -> Vec<ChatMessage> {
    let mut prompt = course_context(draft);
    if let Some(chapter) = draft.chapters.get(chapter_index) {
        let _ = writeln!(
            prompt,
            "\nChapter {} of {}: {}",
            chapter_index + 1,
            draft.chapters.len(),
            chapter.title
        );
        if !chapter.sections.is_empty() {
            let _ = writeln!(prompt, "Sections in this chapter:");
            for section in &chapter.sections {
                let _ = writeln!(prompt, "- {}", section.title);
            }
        }
    }
    prompt.push_str(
        "\nWrite an engaging introduction for this chapter in 2 to 3 paragraphs. \
         Explain what the learner will gain and how the sections connect. \
         Respond with HTML using only <p>, <strong>, <em>, <ul> and <li> tags.",
    );

    vec![ChatMessage::system(SYSTEM_DESIGNER), ChatMessage::user(prompt)]
}

/// Body of one section, with the analyses of its images as context.
pub fn section_content(
    draft: &CourseDraft,
    chapter_index: usize,
    section_index: usize,
) -> Vec<ChatMessage> {
    let mut prompt = course_context(draft);
    if let Some(chapter) = draft.chapters.get(chapter_index) {
        let _ = writeln!(prompt, "\nChapter: {}", chapter.title);
        if let Some(section) = chapter.sections.get(section_index) {
            let _ = writeln!(prompt, "Section: {}", section.title);
            let images: Vec<&ImageRef> = section
                .image_filenames()
                .filter_map(|f| draft.image_by_filename(f))
                .collect();
            if !images.is_empty() {
                let _ = writeln!(prompt, "Images shown in this section:");
                for image in images {
                    let _ = writeln!(prompt, "{}", image_line(image));
                }
            }
        }
    }
    prompt.push_str(
        "\nWrite the full lesson for this section: 4 to 6 paragraphs with concrete examples, \
         referring to the images where relevant. Respond with HTML using only <h3>, <p>, \
         <strong>, <em>, <ul>, <ol> and <li> tags.",
    );

    vec![ChatMessage::system(SYSTEM_DESIGNER), ChatMessage::user(prompt)]
}

/// Vision analysis of one uploaded image.
pub fn image_analysis(draft: &CourseDraft, image: &ImageRef) -> Vec<ChatMessage> {
    let mut prompt = format!(
        "This image was uploaded for the course \"{}\".\n",
        draft.title
    );
    if !image.description.trim().is_empty() {
        let _ = writeln!(prompt, "The author describes it as: {}", image.description.trim());
    }
    prompt.push_str(
        r#"Analyze it for teaching. Respond with a single JSON object:
{"educational_analysis": "what the image teaches", "visual_elements": "what is shown",
 "concepts": ["concept"], "quiz_potential": {"suitable_for_quiz": true,
 "quiz_concepts": ["concept"], "distinguishing_features": "...", "comparison_points": "..."}}"#,
    );

    vec![
        ChatMessage::system("You are an educational content analyst reviewing course images."),
        ChatMessage::user(prompt),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{sample_draft, structured};

    #[test]
    fn outline_lists_images_and_topics() {
        let mut draft = sample_draft(2);
        draft.images[1].mark_analyzed(structured("Mitosis", true));
        let messages = outline(&draft, 10);

        assert_eq!(messages.len(), 2);
        let user = &messages[1].content;
        assert!(user.contains("- img-0.png"));
        assert!(user.contains("Key concepts: Mitosis"));
        assert!(user.contains("[suitable for image quiz]"));
        assert!(user.contains("Main topics: Membranes; Organelles; Mitosis"));
        assert!(user.contains("Write 10 quiz questions"));
    }

    #[test]
    fn unavailable_analysis_is_not_quoted() {
        let mut draft = sample_draft(1);
        draft.images[0].mark_analyzed(Analysis::unavailable());
        let user = &outline(&draft, 10)[1].content;
        assert!(!user.contains(coursegen_shared::ANALYSIS_UNAVAILABLE));
    }
}
