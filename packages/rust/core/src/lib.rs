//! Chunked, resumable course generation.
//!
//! A course is built by repeatedly calling [`Pipeline::advance`]. Each call
//! runs one bounded chunk of work (a batch of image analyses, the outline,
//! one chapter introduction, one section body, or finalization), persists the
//! draft and moves the cursor so the next call picks up where this one
//! stopped.

pub mod course;
pub mod cursor;
pub mod draft;
pub mod fallback;
pub mod media;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod repair;
mod steps;
pub mod text;

#[cfg(test)]
pub(crate) mod testing;

pub use course::{CourseRequest, CourseStatus, CreatedCourse, ImageUpload};
pub use cursor::CursorStore;
pub use draft::DraftStore;
pub use media::{ImageLoader, MediaLoader};
pub use pipeline::{Pipeline, PipelineState};
pub use progress::ProgressReporter;
