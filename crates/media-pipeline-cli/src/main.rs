//! Media Pipeline CLI - run declarative media analysis pipelines
//!
//! Command-line interface over the pipeline registry, the DAG and linear
//! executors and the streaming backpressure controller.

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use media_pipeline_core::EngineConfig;
use std::path::PathBuf;
use tracing::{debug, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

mod commands;
mod parser;
mod process_plugin;

use commands::pipelines::{InfoCommand, ListCommand};
use commands::registry_helper::Engine;
use commands::run::{ChainCommand, RunCommand};
use commands::stream::StreamCommand;
use commands::validate::ValidateCommand;

/// Environment variable naming the engine config file
const CONFIG_ENV: &str = "MEDIA_PIPELINE_CONFIG";

#[derive(Parser)]
#[command(
    name = "media-pipeline",
    version,
    about = "Declarative DAG pipelines for plugin-based media analysis",
    after_help = "EXAMPLES:\n  \
                  # List registered pipelines and plugins\n  \
                  media-pipeline list\n  \
                  media-pipeline plugins\n\n  \
                  # Check edge types before running\n  \
                  media-pipeline validate scene-analysis\n\n  \
                  # Run a pipeline on a JSON payload\n  \
                  media-pipeline run scene-analysis --input frame.json\n\n  \
                  # Chain tools of a single plugin\n  \
                  media-pipeline chain vision --tools decode,detect --input frame.json\n\n  \
                  # Replay JSON-lines frames through backpressure\n  \
                  media-pipeline stream scene-analysis --frames frames.jsonl"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Engine config file (falls back to $MEDIA_PIPELINE_CONFIG)
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Override the pipelines directory
    #[arg(long, global = true, value_name = "DIR")]
    pipelines_dir: Option<PathBuf>,

    /// Override the plugins directory
    #[arg(long, global = true, value_name = "DIR")]
    plugins_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// List registered pipelines
    List(ListCommand),

    /// Show metadata for one pipeline
    Info(InfoCommand),

    /// Check edge type compatibility
    Validate(ValidateCommand),

    /// Run a registered pipeline
    Run(RunCommand),

    /// Run tools of one plugin in sequence
    Chain(ChainCommand),

    /// Replay frames through a streaming session
    Stream(StreamCommand),

    /// List available plugins
    Plugins,
}

impl Cli {
    fn load_config(&self) -> Result<EngineConfig> {
        let path = self
            .config
            .clone()
            .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from));

        let mut config = match path {
            Some(path) => EngineConfig::from_yaml(&path)
                .with_context(|| format!("Failed to load config {}", path.display()))?,
            None => EngineConfig::default(),
        };

        if let Some(dir) = &self.pipelines_dir {
            config.pipelines_dir = dir.clone();
        }
        if let Some(dir) = &self.plugins_dir {
            config.plugins_dir = dir.clone();
        }
        Ok(config)
    }
}

fn init_tracing(cli: &Cli) -> Result<()> {
    // RUST_LOG wins over the command-based default
    if std::env::var_os("RUST_LOG").is_some() {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_target(false)
            .with_writer(std::io::stderr)
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to set tracing subscriber: {}", e))?;
        return Ok(());
    }

    // Listings keep stdout clean
    let log_level = match &cli.command {
        Commands::List(_) | Commands::Info(_) | Commands::Plugins => Level::WARN,
        _ => {
            if cli.verbose {
                Level::DEBUG
            } else {
                Level::INFO
            }
        }
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli)?;

    let config = cli.load_config()?;
    config.validate()?;
    debug!("Engine config: {:?}", config);

    let engine = Engine::load(config)?;

    match cli.command {
        Commands::List(cmd) => cmd.execute(&engine).await,
        Commands::Info(cmd) => cmd.execute(&engine).await,
        Commands::Validate(cmd) => cmd.execute(&engine).await,
        Commands::Run(cmd) => cmd.execute(&engine).await,
        Commands::Chain(cmd) => cmd.execute(&engine).await,
        Commands::Stream(cmd) => cmd.execute(&engine).await,
        Commands::Plugins => commands::plugins::list_plugins(&engine).await,
    }
}
