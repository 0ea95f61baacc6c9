mod compwise;
mod config;
mod extract;
mod invoker;
mod preprocess;
mod row;
mod script;
mod sweep;
mod table;
#[cfg(test)]
mod test_support;
mod transcript;

use clap::{Parser, Subcommand};
use compwise::CompwiseParams;
use config::{Config, ConfigError};
use preprocess::PairRange;
use std::path::PathBuf;
use std::process::ExitCode;
use sweep::{
    BenchmarkInstance, Category, ErrorMetric, RunOverrides, SweepError, SweepSettings,
    SweepSummary, WidthOverrides,
};
use tracing_subscriber::EnvFilter;

/// Benchmark driver for approximate symmetrization in ABC: preprocess
/// circuit families, then sweep component-wise symmetrization over them,
/// recording timings and sizes as semicolon-separated tables.
#[derive(Parser, Debug)]
#[command(name = "symbench", version, about)]
pub struct Cli {
    /// Config file path
    #[arg(short, long, default_value = "symbench.toml", global = true)]
    config: PathBuf,

    /// More logging; repeat for debug, trace and per-block transcript dumps
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Per-invocation timeout, e.g. `90`, `30m`, `4h` (overrides config)
    #[arg(long, global = true)]
    timeout: Option<String>,

    /// ABC optimization script run inside each stage (overrides config)
    #[arg(long, value_name = "CMD", global = true)]
    optimize_command: Option<String>,

    /// Print resolved settings and the instance list, don't run
    #[arg(long, global = true)]
    dry_run: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build, optimize and store every instance of a benchmark family
    Preprocess {
        #[arg(value_enum)]
        category: Category,
        /// First bit-width
        #[arg(long)]
        start: Option<u32>,
        /// Last bit-width (inclusive)
        #[arg(long)]
        end: Option<u32>,
        #[arg(long)]
        stride: Option<u32>,
        /// First pair count (mac only)
        #[arg(long, default_value_t = 2)]
        start_pairs: u32,
        /// Last pair count (mac only, inclusive)
        #[arg(long, default_value_t = 5)]
        end_pairs: u32,
    },
    /// Symmetrize every preprocessed instance under six profit/regime stages
    Compwise {
        #[arg(value_enum)]
        category: Category,
        #[arg(value_enum)]
        metric: ErrorMetric,
        /// Error bound of the bounded stages, passed to ABC as written
        threshold: String,
    },
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Sweep(#[from] SweepError),
    #[error("failed to render dry-run output: {0}")]
    Json(#[from] serde_json::Error),
}

fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("symbench={level}")));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .init();
}

fn print_plan(
    settings: &SweepSettings,
    instances: &[BenchmarkInstance],
    table: &std::path::Path,
) -> Result<(), CliError> {
    let plan = serde_json::json!({
        "settings": settings,
        "table": table,
        "instances": instances,
    });
    println!("{}", serde_json::to_string_pretty(&plan)?);
    Ok(())
}

async fn run(cli: Cli) -> Result<Option<SweepSummary>, CliError> {
    let config = Config::load(&cli.config)?;
    let settings = SweepSettings::resolve(
        &config,
        &RunOverrides {
            timeout: cli.timeout.clone(),
            optimize_command: cli.optimize_command.clone(),
            verbosity: cli.verbose,
        },
    )?;
    tracing::debug!(?settings, "resolved settings");

    let summary = match cli.command {
        Command::Preprocess {
            category,
            start,
            end,
            stride,
            start_pairs,
            end_pairs,
        } => {
            let widths = WidthOverrides { start, end, stride };
            let pairs = PairRange {
                start: start_pairs,
                end: end_pairs,
            };
            let instances = preprocess::plan(&settings, category, &widths, pairs)?;
            if cli.dry_run {
                let table = settings.preprocessed_dir(category).join(preprocess::LOG_FILE);
                print_plan(&settings, &instances, &table)?;
                return Ok(None);
            }
            tracing::info!(
                category = category.as_str(),
                instances = instances.len(),
                "preprocessing sweep"
            );
            preprocess::run(&settings, category, &instances).await?
        }
        Command::Compwise {
            category,
            metric,
            threshold,
        } => {
            let params = CompwiseParams::new(category, metric, threshold)?;
            let instances = compwise::plan(&settings, category)?;
            let timestamp = chrono::Local::now().format("%Y_%m_%d_%H_%M_%S").to_string();
            let table = compwise::table_path(&settings, &params, &timestamp);
            if cli.dry_run {
                print_plan(&settings, &instances, &table)?;
                return Ok(None);
            }
            tracing::info!(
                category = category.as_str(),
                metric = metric.as_str(),
                threshold = %params.threshold,
                instances = instances.len(),
                "symmetrization sweep"
            );
            compwise::run(&settings, &params, &instances, &table).await?
        }
    };
    Ok(Some(summary))
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    tracing::debug!(?cli, "parsed CLI arguments");

    match run(cli).await {
        Ok(Some(summary)) => {
            tracing::info!(
                table = %summary.table.display(),
                rows = summary.rows,
                timed_out = summary.timed_out_stages,
                skipped = summary.skipped,
                "sweep finished"
            );
            ExitCode::SUCCESS
        }
        Ok(None) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e}");
            ExitCode::FAILURE
        }
    }
}
