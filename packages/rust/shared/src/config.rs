//! Application configuration for CourseGen.
//!
//! User config lives at `~/.coursegen/coursegen.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{CourseGenError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "coursegen.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".coursegen";

// ---------------------------------------------------------------------------
// Config structs (matching coursegen.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Storage locations.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Generative AI service settings.
    #[serde(default)]
    pub ai: AiConfig,

    /// Chunking and content-generation policies.
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// libSQL database file holding drafts, cursors and progress.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Directory holding uploaded image files, addressed by filename.
    #[serde(default = "default_media_dir")]
    pub media_dir: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            media_dir: default_media_dir(),
        }
    }
}

fn default_database_path() -> String {
    "~/.coursegen/coursegen.db".into()
}
fn default_media_dir() -> String {
    "~/.coursegen/media".into()
}

/// `[ai]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// OpenAI-compatible API root; `/chat/completions` is appended.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Model for outline, introductions and section bodies.
    #[serde(default = "default_text_model")]
    pub text_model: String,

    /// Model for image analysis.
    #[serde(default = "default_vision_model")]
    pub vision_model: String,

    #[serde(default = "default_outline_timeout")]
    pub outline_timeout_secs: u64,

    #[serde(default = "default_content_timeout")]
    pub content_timeout_secs: u64,

    #[serde(default = "default_vision_timeout")]
    pub vision_timeout_secs: u64,

    #[serde(default = "default_outline_max_tokens")]
    pub outline_max_tokens: u32,

    #[serde(default = "default_intro_max_tokens")]
    pub intro_max_tokens: u32,

    #[serde(default = "default_section_max_tokens")]
    pub section_max_tokens: u32,

    #[serde(default = "default_vision_max_tokens")]
    pub vision_max_tokens: u32,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_api_key_env(),
            base_url: default_base_url(),
            text_model: default_text_model(),
            vision_model: default_vision_model(),
            outline_timeout_secs: default_outline_timeout(),
            content_timeout_secs: default_content_timeout(),
            vision_timeout_secs: default_vision_timeout(),
            outline_max_tokens: default_outline_max_tokens(),
            intro_max_tokens: default_intro_max_tokens(),
            section_max_tokens: default_section_max_tokens(),
            vision_max_tokens: default_vision_max_tokens(),
        }
    }
}

fn default_api_key_env() -> String {
    "OPENROUTER_API_KEY".into()
}
fn default_base_url() -> String {
    "https://openrouter.ai/api/v1".into()
}
fn default_text_model() -> String {
    "openai/gpt-4o-mini".into()
}
fn default_vision_model() -> String {
    "openai/gpt-4o".into()
}
fn default_outline_timeout() -> u64 {
    180
}
fn default_content_timeout() -> u64 {
    120
}
fn default_vision_timeout() -> u64 {
    120
}
fn default_outline_max_tokens() -> u32 {
    4000
}
fn default_intro_max_tokens() -> u32 {
    1500
}
fn default_section_max_tokens() -> u32 {
    2500
}
fn default_vision_max_tokens() -> u32 {
    1000
}

/// `[pipeline]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Images analyzed per `analyze_images` chunk.
    #[serde(default = "default_image_batch_size")]
    pub image_batch_size: usize,

    /// Lifetime of each cursor field.
    #[serde(default = "default_cursor_ttl")]
    pub cursor_ttl_secs: u64,

    /// Lifetime of the progress snapshot.
    #[serde(default = "default_progress_ttl")]
    pub progress_ttl_secs: u64,

    /// Upper bound on chapters built by the fallback outline.
    #[serde(default = "default_max_fallback_chapters")]
    pub max_fallback_chapters: usize,

    /// Text questions in the fallback quiz.
    #[serde(default = "default_fallback_quiz_questions")]
    pub fallback_quiz_questions: usize,

    /// Reading speed used for estimated times.
    #[serde(default = "default_words_per_minute")]
    pub words_per_minute: usize,

    /// Word count at which a section counts as already written.
    #[serde(default = "default_substantial_word_count")]
    pub substantial_word_count: usize,

    /// Paragraph count at which a section counts as already written.
    #[serde(default = "default_substantial_paragraphs")]
    pub substantial_paragraphs: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            image_batch_size: default_image_batch_size(),
            cursor_ttl_secs: default_cursor_ttl(),
            progress_ttl_secs: default_progress_ttl(),
            max_fallback_chapters: default_max_fallback_chapters(),
            fallback_quiz_questions: default_fallback_quiz_questions(),
            words_per_minute: default_words_per_minute(),
            substantial_word_count: default_substantial_word_count(),
            substantial_paragraphs: default_substantial_paragraphs(),
        }
    }
}

fn default_image_batch_size() -> usize {
    3
}
fn default_cursor_ttl() -> u64 {
    24 * 60 * 60
}
fn default_progress_ttl() -> u64 {
    60 * 60
}
fn default_max_fallback_chapters() -> usize {
    6
}
fn default_fallback_quiz_questions() -> usize {
    10
}
fn default_words_per_minute() -> usize {
    200
}
fn default_substantial_word_count() -> usize {
    150
}
fn default_substantial_paragraphs() -> usize {
    3
}

// ---------------------------------------------------------------------------
// Runtime settings (derived from the file config)
// ---------------------------------------------------------------------------

/// Per-call-site AI parameters.
#[derive(Debug, Clone)]
pub struct AiSettings {
    pub text_model: String,
    pub vision_model: String,
    pub outline_timeout: Duration,
    pub content_timeout: Duration,
    pub vision_timeout: Duration,
    pub outline_max_tokens: u32,
    pub intro_max_tokens: u32,
    pub section_max_tokens: u32,
    pub vision_max_tokens: u32,
}

impl From<&AppConfig> for AiSettings {
    fn from(config: &AppConfig) -> Self {
        let ai = &config.ai;
        Self {
            text_model: ai.text_model.clone(),
            vision_model: ai.vision_model.clone(),
            outline_timeout: Duration::from_secs(ai.outline_timeout_secs),
            content_timeout: Duration::from_secs(ai.content_timeout_secs),
            vision_timeout: Duration::from_secs(ai.vision_timeout_secs),
            outline_max_tokens: ai.outline_max_tokens,
            intro_max_tokens: ai.intro_max_tokens,
            section_max_tokens: ai.section_max_tokens,
            vision_max_tokens: ai.vision_max_tokens,
        }
    }
}

/// Runtime pipeline configuration, merged from config file + defaults.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub ai: AiSettings,
    pub image_batch_size: usize,
    pub cursor_ttl: Duration,
    pub progress_ttl: Duration,
    pub max_fallback_chapters: usize,
    pub fallback_quiz_questions: usize,
    pub words_per_minute: usize,
    pub substantial_word_count: usize,
    pub substantial_paragraphs: usize,
}

impl From<&AppConfig> for PipelineSettings {
    fn from(config: &AppConfig) -> Self {
        let p = &config.pipeline;
        Self {
            ai: AiSettings::from(config),
            image_batch_size: p.image_batch_size.max(1),
            cursor_ttl: Duration::from_secs(p.cursor_ttl_secs),
            progress_ttl: Duration::from_secs(p.progress_ttl_secs),
            max_fallback_chapters: p.max_fallback_chapters.max(1),
            fallback_quiz_questions: p.fallback_quiz_questions,
            words_per_minute: p.words_per_minute.max(1),
            substantial_word_count: p.substantial_word_count,
            substantial_paragraphs: p.substantial_paragraphs,
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.coursegen/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| CourseGenError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.coursegen/coursegen.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| CourseGenError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content).map_err(|e| {
        CourseGenError::config(format!("failed to parse {}: {e}", path.display()))
    })?;
    validate_config(&config)?;
    Ok(config)
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| CourseGenError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| CourseGenError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| CourseGenError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Reject values that would make the pipeline misbehave at runtime.
pub fn validate_config(config: &AppConfig) -> Result<()> {
    Url::parse(&config.ai.base_url).map_err(|e| {
        CourseGenError::config(format!("ai.base_url {:?} is not a URL: {e}", config.ai.base_url))
    })?;
    if config.ai.text_model.trim().is_empty() || config.ai.vision_model.trim().is_empty() {
        return Err(CourseGenError::config("ai.text_model and ai.vision_model must be set"));
    }
    if config.pipeline.image_batch_size == 0 {
        return Err(CourseGenError::config("pipeline.image_batch_size must be at least 1"));
    }
    Ok(())
}

/// Check that the AI API key env var is set and non-empty, returning it.
pub fn validate_api_key(config: &AppConfig) -> Result<String> {
    let var_name = &config.ai.api_key_env;
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(val),
        _ => Err(CourseGenError::config(format!(
            "AI API key not found. Set the {var_name} environment variable.\n\
             Get a key at https://openrouter.ai/keys"
        ))),
    }
}

/// Expand a leading `~/` against the user's home directory.
pub fn expand_home(path: &str) -> Result<PathBuf> {
    match path.strip_prefix("~/") {
        Some(rest) => {
            let home = dirs::home_dir()
                .ok_or_else(|| CourseGenError::config("could not determine home directory"))?;
            Ok(home.join(rest))
        }
        None => Ok(PathBuf::from(path)),
    }
}
