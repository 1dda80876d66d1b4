use clap::{Parser, Subcommand};
use showpulse_core::PipelineConfig;

mod pipeline;
mod sources;

#[derive(Debug, Parser)]
#[command(name = "showpulse")]
#[command(about = "Weekly audience-signal panel pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Aggregate one source's raw records into weekly rows.
    Aggregate {
        /// Configured source name (e.g. tiktok, trends).
        source: String,
    },
    /// Outer-join all sources' weekly aggregates into the canonical panel.
    Merge,
    /// Run quality checks over the panel and persist the report.
    Validate,
    /// Build the model-ready feature table from the panel.
    Features,
    /// Run aggregate, merge, validate and features in order.
    Run,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let config = PipelineConfig::load()?;

    let cli = Cli::parse();
    match cli.command {
        Commands::Aggregate { source } => pipeline::run_aggregate(&config, &source),
        Commands::Merge => pipeline::run_merge(&config),
        Commands::Validate => pipeline::run_validate(&config),
        Commands::Features => pipeline::run_features(&config),
        Commands::Run => pipeline::run_all(&config),
    }
}
