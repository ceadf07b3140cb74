//! Image-usage repair: every uploaded image ends up referenced by a section.

use std::collections::HashSet;

use coursegen_shared::{Chapter, CourseDraft, Section};
use tracing::debug;

/// Title of sections created to hold images the outline left out.
pub const ADDITIONAL_CONTENT: &str = "Additional Content";

/// Filenames of images no section references, in upload order.
pub fn unused_images(draft: &CourseDraft) -> Vec<String> {
    let used: HashSet<&str> = draft
        .chapters
        .iter()
        .flat_map(|c| &c.sections)
        .flat_map(Section::image_filenames)
        .collect();

    draft
        .images
        .iter()
        .map(|i| i.filename.as_str())
        .filter(|f| !used.contains(f))
        .map(String::from)
        .collect()
}

/// Attach every unused image to the first section without an image, or to a
/// new "Additional Content" section on the first chapter. Returns how many
/// images were placed.
pub fn assign_unused_images(draft: &mut CourseDraft) -> usize {
    let unused = unused_images(draft);
    if unused.is_empty() {
        return 0;
    }

    if draft.chapters.is_empty() {
        draft.chapters.push(Chapter {
            title: ADDITIONAL_CONTENT.into(),
            ..Chapter::default()
        });
    }

    for filename in &unused {
        let open_slot = draft
            .chapters
            .iter_mut()
            .flat_map(|c| c.sections.iter_mut())
            .find(|s| s.image.is_empty());

        match open_slot {
            Some(section) => section.image = filename.clone(),
            None => draft.chapters[0].sections.push(Section {
                title: ADDITIONAL_CONTENT.into(),
                image: filename.clone(),
                ..Section::default()
            }),
        }
    }

    debug!(placed = unused.len(), "assigned unused images");
    unused.len()
}

/// Clear section image references that name no uploaded image. Returns how
/// many references were removed.
pub fn drop_unknown_images(draft: &mut CourseDraft) -> usize {
    let known: HashSet<String> = draft.image_filenames().into_iter().map(String::from).collect();
    let mut removed = 0;

    for section in draft.chapters.iter_mut().flat_map(|c| c.sections.iter_mut()) {
        if !section.image.is_empty() && !known.contains(&section.image) {
            section.image.clear();
            removed += 1;
        }
        let before = section.additional_images.len();
        section.additional_images.retain(|f| known.contains(f));
        removed += before - section.additional_images.len();

        if section.image.is_empty() && !section.additional_images.is_empty() {
            section.image = section.additional_images.remove(0);
        }
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::sample_draft;

    fn section(title: &str, image: &str) -> Section {
        Section {
            title: title.into(),
            image: image.into(),
            ..Section::default()
        }
    }

    #[test]
    fn fills_empty_slots_first() {
        let mut draft = sample_draft(3);
        draft.chapters = vec![
            Chapter {
                title: "A".into(),
                sections: vec![section("a1", "img-0.png"), section("a2", "")],
                ..Chapter::default()
            },
            Chapter {
                title: "B".into(),
                sections: vec![section("b1", "")],
                ..Chapter::default()
            },
        ];

        assert_eq!(assign_unused_images(&mut draft), 2);
        assert_eq!(draft.chapters[0].sections[1].image, "img-1.png");
        assert_eq!(draft.chapters[1].sections[0].image, "img-2.png");
        assert!(unused_images(&draft).is_empty());
    }

    #[test]
    fn overflow_goes_to_first_chapter() {
        let mut draft = sample_draft(5);
        draft.chapters = vec![
            Chapter {
                title: "A".into(),
                sections: vec![section("a1", "")],
                ..Chapter::default()
            },
            Chapter {
                title: "B".into(),
                sections: vec![section("b1", "img-4.png")],
                ..Chapter::default()
            },
        ];

        assert_eq!(assign_unused_images(&mut draft), 4);
        let first = &draft.chapters[0].sections;
        assert_eq!(first.len(), 4);
        assert_eq!(first[0].image, "img-0.png");
        assert!(first[1..].iter().all(|s| s.title == ADDITIONAL_CONTENT));
        assert_eq!(draft.chapters[1].sections.len(), 1);
        assert!(unused_images(&draft).is_empty());
    }

    #[test]
    fn no_chapters_gets_one() {
        let mut draft = sample_draft(1);
        draft.chapters.clear();
        assign_unused_images(&mut draft);
        assert_eq!(draft.chapters.len(), 1);
        assert_eq!(draft.chapters[0].sections[0].image, "img-0.png");
    }

    #[test]
    fn unknown_references_cleared() {
        let mut draft = sample_draft(1);
        draft.chapters = vec![Chapter {
            title: "A".into(),
            sections: vec![Section {
                title: "s".into(),
                image: "ghost.png".into(),
                additional_images: vec!["img-0.png".into(), "other.jpg".into()],
                ..Section::default()
            }],
            ..Chapter::default()
        }];

        assert_eq!(drop_unknown_images(&mut draft), 2);
        let s = &draft.chapters[0].sections[0];
        assert_eq!(s.image, "img-0.png");
        assert!(s.additional_images.is_empty());
    }
}
