//! CourseGen CLI. Builds multi-chapter courses with a generative AI service.
//!
//! Each `advance` runs one bounded chunk of the pipeline; `run` polls until
//! the course is complete.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
