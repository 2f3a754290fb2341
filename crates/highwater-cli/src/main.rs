use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use highwater_catalog::TableIdentifier;
use highwater_core::{Config, JobArgs, RunReport, RunStatus, WatermarkOrigin, WatermarkPolicy};
use highwater_engine::{resolve_watermark, IncrementalLoad, JobRun, LoadOptions, LoadSpec};

mod connections;

use connections::{build_source, build_warehouse};

const DEFAULT_CONFIG: &str = "highwater.toml";

/// Highwater - incremental loads from a source catalog into a warehouse
#[derive(Parser)]
#[command(name = "highwater")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file (default: highwater.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Append source rows newer than the target's high-water mark
    Run {
        #[command(flatten)]
        job: JobOpts,

        /// Compute the delta but do not write it
        #[arg(long)]
        dry_run: bool,

        /// Write a JSON run report to this path
        #[arg(long)]
        report: Option<PathBuf>,

        /// What to do when the mark cannot be read (abort | full_reload)
        #[arg(long)]
        on_watermark_error: Option<WatermarkPolicy>,
    },

    /// Print the current high-water mark of a target table
    Watermark {
        /// Target table (table, schema.table or database.schema.table)
        #[arg(long)]
        target_table: String,

        /// Named connection from the config file
        #[arg(long)]
        connection_name: String,

        /// Column whose maximum is the mark
        #[arg(long)]
        incremental_column: String,

        /// What to do when the mark cannot be read (abort | full_reload)
        #[arg(long)]
        on_watermark_error: Option<WatermarkPolicy>,
    },

    /// Test a named warehouse connection
    Check {
        /// Named connection from the config file
        #[arg(long)]
        connection_name: String,
    },
}

/// Arguments identifying one load job
#[derive(Args)]
struct JobOpts {
    /// Job name recorded in logs and the run report
    #[arg(long)]
    job_name: String,

    /// Source catalog database
    #[arg(long)]
    catalog_database: String,

    /// Source catalog table
    #[arg(long)]
    catalog_table: String,

    /// Target table (table, schema.table or database.schema.table)
    #[arg(long)]
    target_table: String,

    /// Named connection from the config file
    #[arg(long)]
    connection_name: String,

    /// Monotonically increasing column used to find new rows
    #[arg(long)]
    incremental_column: String,
}

impl From<JobOpts> for JobArgs {
    fn from(opts: JobOpts) -> Self {
        JobArgs {
            job_name: opts.job_name,
            catalog_database: opts.catalog_database,
            catalog_table: opts.catalog_table,
            target_table: opts.target_table,
            connection_name: opts.connection_name,
            incremental_column: opts.incremental_column,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Settings may reference `env:NAME`; pick up a local .env first
    dotenvy::dotenv().ok();
    init_tracing(cli.verbose);

    let config = load_config(cli.config.as_ref())?;

    match cli.command {
        Commands::Run {
            job,
            dry_run,
            report,
            on_watermark_error,
        } => {
            let options = LoadOptions {
                on_watermark_error: on_watermark_error.unwrap_or(config.load.on_watermark_error),
                dry_run,
            };
            run_command(&config, job.into(), options, report.as_ref()).await
        }
        Commands::Watermark {
            target_table,
            connection_name,
            incremental_column,
            on_watermark_error,
        } => {
            let policy = on_watermark_error.unwrap_or(config.load.on_watermark_error);
            watermark_command(&config, &target_table, &connection_name, &incremental_column, policy).await
        }
        Commands::Check { connection_name } => check_command(&config, &connection_name).await,
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(filter)
        .init();
}

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    if let Some(config_path) = path {
        return Config::from_file(config_path)
            .with_context(|| format!("Failed to load config from {}", config_path.display()));
    }

    let default_path = std::path::Path::new(DEFAULT_CONFIG);
    if default_path.exists() {
        Ok(Config::from_file(default_path)?)
    } else {
        tracing::info!("No {} found, using defaults", DEFAULT_CONFIG);
        Ok(Config::default())
    }
}

/// Run command - one incremental load, then commit
async fn run_command(
    config: &Config,
    args: JobArgs,
    options: LoadOptions,
    report_path: Option<&PathBuf>,
) -> Result<()> {
    let spec = LoadSpec::from_args(&args)?;
    let job = JobRun::init(&args.job_name);

    tracing::debug!(
        connection = %args.connection_name,
        policy = %options.on_watermark_error,
        dry_run = options.dry_run,
        "preparing load"
    );

    let source = build_source(config)?;
    let target = build_warehouse(config, &args.connection_name).await?;

    let outcome = IncrementalLoad::new(source.as_ref(), target.as_ref(), spec.clone(), options)
        .run()
        .await
        .with_context(|| format!("Job '{}' failed", args.job_name))?;

    let report = job.commit(&spec, outcome);

    if let Some(path) = report_path {
        report
            .save_to_file(path)
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
        tracing::info!(path = %path.display(), "run report saved");
    }

    print_run_summary(&report);
    Ok(())
}

/// Watermark command - resolve and print the current mark
async fn watermark_command(
    config: &Config,
    target_table: &str,
    connection_name: &str,
    incremental_column: &str,
    policy: WatermarkPolicy,
) -> Result<()> {
    let table = TableIdentifier::parse(target_table)?;
    let adapter = build_warehouse(config, connection_name).await?;

    let resolution = resolve_watermark(adapter.as_ref(), &table, incremental_column, policy)
        .await
        .with_context(|| format!("Failed to read high-water mark of {}", table))?;

    match &resolution.watermark {
        Some(mark) => println!("{}", mark),
        None => println!("{} ({})", "none".yellow(), describe_origin(&resolution.origin)),
    }

    Ok(())
}

/// Check command - test a warehouse connection
async fn check_command(config: &Config, connection_name: &str) -> Result<()> {
    let adapter = build_warehouse(config, connection_name).await?;

    adapter
        .test_connection()
        .await
        .with_context(|| format!("Connection '{}' failed", connection_name))?;

    println!(
        "{} {} ({})",
        "✓ Connection successful:".green(),
        connection_name,
        adapter.name()
    );
    Ok(())
}

fn describe_origin(origin: &WatermarkOrigin) -> String {
    match origin {
        WatermarkOrigin::Found => "read from target".to_string(),
        WatermarkOrigin::EmptyTarget => "target is empty, full load".to_string(),
        WatermarkOrigin::TargetMissing => "target does not exist, full load".to_string(),
        WatermarkOrigin::ReadFailed { reason } => format!("read failed, full reload: {}", reason),
    }
}

fn print_run_summary(report: &RunReport) {
    println!("\n{}", "=".repeat(60).bright_blue());
    println!("{}", "Incremental Load Report".bold().bright_blue());
    println!("{}", "=".repeat(60).bright_blue());
    println!();

    println!("Job:                {}", report.job_name);
    println!("Source:             {}", report.source_table);
    println!("Target:             {}", report.target_table);
    println!("Incremental column: {}", report.incremental_column);

    match &report.watermark {
        Some(mark) => println!("Watermark:          {}", mark),
        None => {
            let origin = describe_origin(&report.watermark_origin);
            let origin = if matches!(report.watermark_origin, WatermarkOrigin::ReadFailed { .. }) {
                origin.yellow()
            } else {
                origin.normal()
            };
            println!("Watermark:          none ({})", origin);
        }
    }
    println!();

    println!("{}", "Rows:".bold());
    println!("  Source:  {}", report.counts.source_rows);
    println!("  Delta:   {}", report.counts.delta_rows);
    println!("  Written: {}", report.counts.written_rows);
    println!();

    match report.status {
        RunStatus::Appended => println!(
            "{}",
            format!("✓ Appended {} rows", report.counts.written_rows).green().bold()
        ),
        RunStatus::NoNewData => println!("{}", "No new data to load.".cyan()),
        RunStatus::DryRun => println!(
            "{}",
            format!("Dry run: {} rows would be appended", report.counts.delta_rows).yellow()
        ),
    }

    println!();
    println!("{}", "=".repeat(60).bright_blue());
}
