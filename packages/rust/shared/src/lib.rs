//! Shared types, error model, and configuration for CourseGen.
//!
//! This crate is the foundation depended on by all other CourseGen crates.
//! It provides:
//! - [`CourseGenError`], the unified error type
//! - The course document model ([`CourseDraft`], [`Chapter`], [`Section`], [`Quiz`], [`Analysis`])
//! - Orchestration state ([`Step`], [`Cursor`], [`ProgressSnapshot`], [`ChunkResult`])
//! - Configuration ([`AppConfig`], [`PipelineSettings`], config loading)

pub mod config;
pub mod error;
pub mod state;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AiConfig, AiSettings, AppConfig, DefaultsConfig, PipelineConfig, PipelineSettings,
    config_dir, config_file_path, expand_home, init_config, load_config, load_config_from,
    validate_api_key, validate_config,
};
pub use error::{CourseGenError, Result};
pub use state::{ChunkResult, Cursor, ProgressSnapshot, ProgressStatus, ProgressUpdate, Step};
pub use types::{
    ANALYSIS_UNAVAILABLE, Analysis, Chapter, CourseDraft, CourseId, ImageRef, Question,
    QuestionType, Quiz, QuizPotential, Section, StructuredAnalysis, slugify,
};
