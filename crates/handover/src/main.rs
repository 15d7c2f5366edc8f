use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use handover_core::config::HandoverConfig;
use handover_core::pipeline::{self, RunOptions};
use handover_core::{db, ingestion};
use serde_json::json;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Portfolio handover sync", long_about = None)]
struct Cli {
    /// Configuration file (defaults to ./handover.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = LogFormat::Json, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Json,
    Pretty,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Resolve, upsert and export the handover form responses
    Run(RunArgs),
    /// Validate the input file without touching any database
    Check(CheckArgs),
    /// Run destination database migrations
    Migrate,
}

#[derive(Args, Debug, Default)]
struct RunArgs {
    /// Skip the destination upsert; snapshots are still written
    #[arg(long)]
    dry_run: bool,
    /// Override the configured input CSV
    #[arg(long)]
    input: Option<PathBuf>,
    /// Override the configured snapshot directory
    #[arg(long)]
    output_dir: Option<PathBuf>,
}

#[derive(Args, Debug, Default)]
struct CheckArgs {
    #[arg(long)]
    input: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);
    dotenvy::dotenv().ok();

    let mut config = HandoverConfig::load(cli.config.as_deref()).context("failed to load configuration")?;

    match cli.command {
        Command::Run(args) => {
            if let Some(input) = args.input {
                config.paths.input_file = input;
            }
            if let Some(output_dir) = args.output_dir {
                config.paths.output_directory = output_dir;
            }
            if args.dry_run {
                warn!("Dry run requested; destination table will not be modified");
            }

            let options = RunOptions { dry_run: args.dry_run };
            let report = pipeline::run(&config, &options)
                .await
                .context("handover run failed")?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Command::Check(args) => {
            let input = args.input.unwrap_or_else(|| config.paths.input_file.clone());
            let rows = ingestion::read_source_file(&input)
                .with_context(|| format!("failed to read {}", input.display()))?;
            let violations = pipeline::check_source(&rows, config.processing.strict_live_index_checks)?;
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({
                    "input": input,
                    "rows": rows.len(),
                    "live_index_violations": violations,
                }))?
            );
            Ok(())
        }
        Command::Migrate => {
            let database_url = config.destination_database_url()?;
            let pool = db::connect(&database_url, 1).await?;
            db::run_migrations(&pool).await?;
            info!("Database migrations applied");
            Ok(())
        }
    }
}

fn init_tracing(format: LogFormat) {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.pretty().init(),
    }
}
