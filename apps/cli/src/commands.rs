//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, bail, eyre};
use coursegen_ai::OpenRouterClient;
use coursegen_core::{CourseRequest, ImageUpload, MediaLoader, Pipeline};
use coursegen_shared::{
    AppConfig, PipelineSettings, expand_home, init_config, load_config, load_config_from,
    validate_api_key,
};
use coursegen_storage::Storage;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// CourseGen: chunked, resumable course generation.
#[derive(Parser)]
#[command(
    name = "coursegen",
    version,
    about = "Generate multi-chapter courses with outlines, lessons and quizzes, one chunk at a time.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file (defaults to ~/.coursegen/coursegen.toml).
    #[arg(long, global = true, env = "COURSEGEN_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Create a course and run its first chunk.
    Create(CreateArgs),

    /// Run exactly one chunk and print the result as JSON.
    Advance {
        /// Course ID.
        course_id: String,
    },

    /// Poll the pipeline until the course is complete.
    Run {
        /// Course ID.
        course_id: String,

        /// Stop after this many chunks even if incomplete.
        #[arg(long, default_value = "500")]
        max_chunks: usize,

        /// Pause between chunks, in milliseconds.
        #[arg(long, default_value = "0")]
        interval_ms: u64,

        /// Give up after this many consecutive failed chunks.
        #[arg(long, default_value = "5")]
        max_failures: usize,
    },

    /// Show the cursor and progress of a course.
    Status {
        /// Course ID.
        course_id: String,
    },

    /// Print a course draft.
    Show {
        /// Course ID.
        course_id: String,

        /// Print the chapter/section outline instead of the full JSON.
        #[arg(long)]
        outline: bool,
    },

    /// List all courses.
    List,

    /// Delete a course with its cursor and progress.
    Delete {
        /// Course ID.
        course_id: String,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Args)]
pub(crate) struct CreateArgs {
    /// Read the full course request from a JSON file.
    #[arg(long, conflicts_with = "title")]
    from: Option<PathBuf>,

    /// Course title.
    #[arg(long)]
    title: Option<String>,

    #[arg(long, default_value = "")]
    description: String,

    /// Target audience.
    #[arg(long, default_value = "")]
    audience: String,

    #[arg(long, default_value = "beginner")]
    difficulty: String,

    /// Learning objective (repeatable).
    #[arg(long = "objective")]
    objectives: Vec<String>,

    #[arg(long, default_value = "")]
    prerequisites: String,

    /// Main topics, comma or newline separated.
    #[arg(long, default_value = "")]
    topics: String,

    /// Cover image filename.
    #[arg(long)]
    cover_image: Option<String>,

    /// Uploaded image as FILE or FILE=DESCRIPTION (repeatable). FILE is a
    /// name inside the media directory or an http(s) URL.
    #[arg(long = "image")]
    images: Vec<String>,
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "coursegen=info",
        1 => "coursegen=debug",
        _ => "coursegen=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config;
    match cli.command {
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show(config_path).await,
        },
        command => {
            let config = resolve_config(config_path)?;
            match command {
                Command::Create(args) => cmd_create(&config, args).await,
                Command::Advance { course_id } => cmd_advance(&config, &course_id).await,
                Command::Run {
                    course_id,
                    max_chunks,
                    interval_ms,
                    max_failures,
                } => {
                    cmd_run(
                        &config,
                        &course_id,
                        max_chunks,
                        Duration::from_millis(interval_ms),
                        max_failures,
                    )
                    .await
                }
                Command::Status { course_id } => cmd_status(&config, &course_id).await,
                Command::Show { course_id, outline } => {
                    cmd_show(&config, &course_id, outline).await
                }
                Command::List => cmd_list(&config).await,
                Command::Delete { course_id } => cmd_delete(&config, &course_id).await,
                Command::Config { .. } => Ok(()),
            }
        }
    }
}

fn resolve_config(path: Option<PathBuf>) -> Result<AppConfig> {
    Ok(match path {
        Some(path) => load_config_from(&path)?,
        None => load_config()?,
    })
}

/// Wire the pipeline to libSQL storage, the media directory and the AI
/// client. Commands that never call the AI service skip the key check.
async fn open_pipeline(config: &AppConfig, needs_ai: bool) -> Result<Pipeline> {
    let api_key = if needs_ai {
        validate_api_key(config)?
    } else {
        std::env::var(&config.ai.api_key_env).unwrap_or_default()
    };

    let db_path = expand_home(&config.defaults.database_path)?;
    let storage = Arc::new(Storage::open(&db_path).await?);
    let media = MediaLoader::new(expand_home(&config.defaults.media_dir)?)?;
    let ai = OpenRouterClient::new(&config.ai.base_url, api_key)?;

    Ok(Pipeline::new(
        Arc::new(ai),
        Arc::new(media),
        storage.clone(),
        storage,
        PipelineSettings::from(config),
    ))
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

fn parse_image(arg: &str) -> ImageUpload {
    let (file, description) = arg
        .split_once('=')
        .map(|(f, d)| (f.trim(), d.trim()))
        .unwrap_or((arg.trim(), ""));

    if file.starts_with("http://") || file.starts_with("https://") {
        let filename = file
            .rsplit('/')
            .next()
            .filter(|name| !name.is_empty())
            .unwrap_or(file);
        ImageUpload {
            filename: filename.to_string(),
            url: file.to_string(),
            description: description.to_string(),
        }
    } else {
        ImageUpload {
            filename: file.to_string(),
            url: String::new(),
            description: description.to_string(),
        }
    }
}

fn build_request(args: CreateArgs) -> Result<CourseRequest> {
    if let Some(path) = args.from {
        let raw = std::fs::read_to_string(&path)
            .map_err(|e| eyre!("cannot read '{}': {e}", path.display()))?;
        return serde_json::from_str(&raw)
            .map_err(|e| eyre!("invalid course request in '{}': {e}", path.display()));
    }

    let title = args
        .title
        .ok_or_else(|| eyre!("either --title or --from is required"))?;

    Ok(CourseRequest {
        title,
        description: args.description,
        target_audience: args.audience,
        difficulty: args.difficulty,
        learning_objectives: args.objectives,
        prerequisites: args.prerequisites,
        main_topics: args.topics,
        cover_image: args.cover_image,
        images: args.images.iter().map(|s| parse_image(s)).collect(),
    })
}

async fn cmd_create(config: &AppConfig, args: CreateArgs) -> Result<()> {
    let request = build_request(args)?;
    let pipeline = open_pipeline(config, true).await?;

    info!(title = %request.title, images = request.images.len(), "creating course");
    let created = pipeline.create_course(request).await?;

    println!();
    println!("  Course created!");
    println!("  ID:       {}", created.course_id);
    println!("  Progress: {}%", created.chunk.percent);
    println!("  Next:     {}", created.chunk.message);
    println!();
    println!("  Continue with: coursegen run {}", created.course_id);
    println!();
    Ok(())
}

async fn cmd_advance(config: &AppConfig, course_id: &str) -> Result<()> {
    let pipeline = open_pipeline(config, true).await?;
    let result = pipeline.advance(course_id).await;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

async fn cmd_run(
    config: &AppConfig,
    course_id: &str,
    max_chunks: usize,
    interval: Duration,
    max_failures: usize,
) -> Result<()> {
    let pipeline = open_pipeline(config, true).await?;

    let bar = ProgressBar::new(100);
    bar.set_style(
        ProgressStyle::with_template("{spinner:.cyan} [{bar:40.cyan/blue}] {pos:>3}% {msg}")?
            .progress_chars("=> "),
    );
    bar.enable_steady_tick(Duration::from_millis(120));

    let mut failures = 0;
    for chunk in 1..=max_chunks {
        let result = pipeline.advance(course_id).await;
        bar.set_position(u64::from(result.percent));
        bar.set_message(result.message.clone());

        if result.complete {
            bar.finish_with_message("Course complete");
            println!("  Finished {course_id} in {chunk} chunks.");
            return Ok(());
        }

        if result.success {
            failures = 0;
        } else {
            failures += 1;
            warn!(course_id, failures, message = %result.message, "chunk failed");
            if !result.retryable {
                bar.abandon();
                bail!("pipeline halted: {}", result.message);
            }
            if failures >= max_failures {
                bar.abandon();
                bail!("{failures} consecutive failures, last: {}", result.message);
            }
        }

        if !interval.is_zero() {
            tokio::time::sleep(interval).await;
        }
    }

    bar.abandon();
    println!("  Stopped after {max_chunks} chunks; run again to continue.");
    Ok(())
}

async fn cmd_status(config: &AppConfig, course_id: &str) -> Result<()> {
    let pipeline = open_pipeline(config, false).await?;
    let status = pipeline.status(course_id).await?;
    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}

async fn cmd_show(config: &AppConfig, course_id: &str, outline: bool) -> Result<()> {
    let pipeline = open_pipeline(config, false).await?;
    let draft = pipeline.load_course(course_id).await?;

    if !outline {
        println!("{}", serde_json::to_string_pretty(&draft)?);
        return Ok(());
    }

    println!("{} ({})", draft.title, draft.id);
    if !draft.estimated_time.is_empty() {
        println!("Estimated time: {}", draft.estimated_time);
    }
    for (ci, chapter) in draft.chapters.iter().enumerate() {
        println!("{}. {}", ci + 1, chapter.title);
        for (si, section) in chapter.sections.iter().enumerate() {
            let image = if section.image.is_empty() {
                String::new()
            } else {
                format!("  [{}]", section.image)
            };
            println!("   {}.{} {}{image}", ci + 1, si + 1, section.title);
        }
    }
    println!("Quiz: {} questions", draft.quiz.questions.len());
    Ok(())
}

async fn cmd_list(config: &AppConfig) -> Result<()> {
    let pipeline = open_pipeline(config, false).await?;
    let ids = pipeline.list_courses().await?;
    if ids.is_empty() {
        println!("No courses yet.");
        return Ok(());
    }

    for id in ids {
        match pipeline.status(id.as_str()).await {
            Ok(status) => {
                let state = if status.completed {
                    "complete".to_string()
                } else {
                    format!("{}% ({})", status.progress.percent_complete, status.cursor.step)
                };
                println!("{id}  {}  {state}", status.title);
            }
            Err(e) => println!("{id}  <unreadable: {e}>"),
        }
    }
    Ok(())
}

async fn cmd_delete(config: &AppConfig, course_id: &str) -> Result<()> {
    let pipeline = open_pipeline(config, false).await?;
    pipeline.delete_course(course_id).await?;
    println!("Deleted {course_id}");
    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show(path: Option<PathBuf>) -> Result<()> {
    let config = resolve_config(path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_arguments() {
        let local = parse_image("cell.png=Plant cell under a microscope");
        assert_eq!(local.filename, "cell.png");
        assert_eq!(local.description, "Plant cell under a microscope");
        assert!(local.url.is_empty());

        let remote = parse_image("https://cdn.example.com/u/leaf.jpg");
        assert_eq!(remote.filename, "leaf.jpg");
        assert_eq!(remote.url, "https://cdn.example.com/u/leaf.jpg");
        assert!(remote.description.is_empty());
    }

    #[test]
    fn cli_parses_create() {
        let cli = Cli::try_parse_from([
            "coursegen",
            "-vv",
            "create",
            "--title",
            "Botany",
            "--objective",
            "Roots",
            "--objective",
            "Leaves",
            "--image",
            "a.png=A",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        let Command::Create(args) = cli.command else {
            panic!("expected create");
        };
        let request = build_request(args).unwrap();
        assert_eq!(request.title, "Botany");
        assert_eq!(request.learning_objectives, vec!["Roots", "Leaves"]);
        assert_eq!(request.images[0].description, "A");
    }

    #[test]
    fn create_requires_title_or_file() {
        let cli = Cli::try_parse_from(["coursegen", "create"]).unwrap();
        let Command::Create(args) = cli.command else {
            panic!("expected create");
        };
        assert!(build_request(args).is_err());
    }
}
