use anyhow::{bail, Context, Result};
use arrow::array::RecordBatch;
use arrow::compute::concat_batches;
use clap::{Args, Parser, Subcommand};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use std::path::{Path, PathBuf};
use upsert2parquet_writer::{merge_dataset, DatasetSummary, EncodingOptions, MergeRequest};

mod init;

/// Merge rows into a time-partitioned Parquet dataset
#[derive(Parser)]
#[command(name = "upsert2parquet")]
#[command(version)]
#[command(about = "Merge rows into a time-partitioned Parquet dataset", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Log level: trace, debug, info, warn, error
    #[arg(short = 'v', long, value_name = "LEVEL", global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Merge the rows of a Parquet file into a dataset
    Merge(MergeArgs),
    /// Print the dataset summary as JSON
    Inspect {
        /// Dataset directory
        #[arg(long, value_name = "DIR")]
        dataset: PathBuf,
    },
}

#[derive(Args)]
struct MergeArgs {
    /// Dataset directory (created when missing)
    #[arg(long, value_name = "DIR")]
    dataset: PathBuf,

    /// Parquet file holding the new rows
    #[arg(long, value_name = "FILE")]
    input: PathBuf,

    /// Partition width, e.g. 2H, 30T, D, W, M, Q, Y
    #[arg(long, value_name = "FREQ")]
    granularity: Option<String>,

    /// Temporal key column (defaults to the first column)
    #[arg(long, value_name = "COLUMN")]
    group_on: Option<String>,

    /// Column identifying duplicates; repeat for several (defaults to all columns)
    #[arg(long = "dedup-on", value_name = "COLUMN")]
    dedup_on: Vec<String>,

    /// Fail if the dataset already holds partitions
    #[arg(long)]
    create: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Step 1: Load configuration
    let mut config = init::load_config(cli.config.as_deref())?;

    // Step 2: Apply CLI overrides (highest priority)
    if let Some(level) = &cli.log_level {
        config.logging.log_level = level.clone();
    }

    // Step 3: Initialize tracing
    init::init_tracing(&config.logging);

    match cli.command {
        Commands::Merge(args) => run_merge(args, &config),
        Commands::Inspect { dataset } => run_inspect(&dataset),
    }
}

fn run_merge(args: MergeArgs, config: &upsert2parquet_config::RuntimeConfig) -> Result<()> {
    let granularity = init::resolve_granularity(args.granularity.as_deref(), config)?;
    let batch = read_input(&args.input)?;

    let mut request = MergeRequest::new(&args.dataset, &batch, granularity)
        .with_policy(init::resolve_policy(&args.dedup_on, config))
        .with_mode(init::resolve_mode(args.create, config))
        .with_encoding(EncodingOptions::from(&config.storage));
    if let Some(column) = args.group_on.or_else(|| config.dataset.group_on.clone()) {
        request = request.with_group_on(column);
    }

    let report = merge_dataset(&request)
        .with_context(|| format!("Failed to merge into {}", args.dataset.display()))?;

    println!(
        "{}: {} partition(s) written, {} skipped",
        report.dataset.display(),
        report.written(),
        report.skipped()
    );
    Ok(())
}

fn run_inspect(dataset: &Path) -> Result<()> {
    let Some(summary) = DatasetSummary::load(dataset)
        .with_context(|| format!("Failed to read summary of {}", dataset.display()))?
    else {
        bail!("No dataset summary found in {}", dataset.display());
    };

    println!(
        "{}",
        serde_json::to_string_pretty(&summary).context("Failed to render summary")?
    );
    Ok(())
}

/// All rows of a Parquet file as a single batch
fn read_input(path: &Path) -> Result<RecordBatch> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open input {}", path.display()))?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)
        .with_context(|| format!("Failed to read Parquet input {}", path.display()))?;
    let schema = builder.schema().clone();

    let batches = builder
        .build()?
        .collect::<std::result::Result<Vec<_>, _>>()
        .with_context(|| format!("Failed to decode rows of {}", path.display()))?;
    Ok(concat_batches(&schema, &batches)?)
}
