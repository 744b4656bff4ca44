//! Command-line interface components.

use crate::aggregation::AnalysisResult;
use crate::config::{AnalysisConfig, ExecutionMode, PlotFormat};
use crate::constants::{
    DEFAULT_CHUNK_SIZE, DEFAULT_INPUT_FILE, DEFAULT_OUTPUT_DIR, DEFAULT_OUTPUT_FILE,
    DEFAULT_PARTITION_SIZE,
};
use crate::processor::PipelineRunner;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use std::path::PathBuf;
use tracing::debug;

#[derive(Parser, Debug, Clone)]
#[command(name = "dimuon_selector")]
#[command(about = "Select opposite-sign dimuon events and histogram their kinematics")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Args {
    /// Input Parquet file (or glob) holding the Events table
    #[arg(short, long, default_value = DEFAULT_INPUT_FILE)]
    pub input: PathBuf,

    /// Output file for the histogram collection
    #[arg(short, long, default_value = DEFAULT_OUTPUT_FILE)]
    pub output: PathBuf,

    /// Directory for plots and the run summary
    #[arg(short = 'd', long, default_value = DEFAULT_OUTPUT_DIR)]
    pub outdir: PathBuf,

    /// Process only the first N events (single-threaded)
    #[arg(short = 'n', long, value_name = "N")]
    pub nevents: Option<u64>,

    /// Number of parallel workers (defaults to the number of CPUs)
    #[arg(short = 'j', long, conflicts_with = "nevents")]
    pub workers: Option<usize>,

    /// Events read per chunk
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
    pub chunk_size: usize,

    /// Maximum events per parallel partition
    #[arg(long, default_value_t = DEFAULT_PARTITION_SIZE)]
    pub partition_size: u64,

    /// Image format of the plots
    #[arg(long, value_enum, default_value_t = PlotFormat::Png)]
    pub plot_format: PlotFormat,

    /// Skip plot rendering
    #[arg(long)]
    pub no_plots: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Only log warnings and errors, hide the progress bar
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,
}

impl Args {
    pub fn get_log_level(&self) -> &'static str {
        if self.verbose {
            "debug"
        } else if self.quiet {
            "warn"
        } else {
            "info"
        }
    }

    pub fn execution_mode(&self) -> ExecutionMode {
        ExecutionMode::from_event_limit(self.nevents, self.workers)
    }

    /// Build the run configuration from the parsed arguments
    pub fn to_config(&self) -> AnalysisConfig {
        let config = AnalysisConfig::new(&self.input)
            .with_output_file(&self.output)
            .with_output_dir(&self.outdir)
            .with_execution_mode(self.execution_mode())
            .with_chunk_size(self.chunk_size)
            .with_partition_size(self.partition_size)
            .with_plot_format(self.plot_format);

        if self.no_plots {
            config.without_plots()
        } else {
            config
        }
    }
}

/// Install the stderr tracing subscriber
pub fn setup_logging(args: &Args) -> Result<()> {
    use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

    let log_level = args.get_log_level();
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("dimuon_selector={}", log_level)));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(false)
                .with_level(true)
                .with_timer(fmt::time::uptime())
                .with_writer(std::io::stderr),
        )
        .try_init()
        .map_err(|e| anyhow!("Failed to initialize logging: {}", e))?;

    debug!("Logging initialized at level: {}", log_level);
    Ok(())
}

/// Run the selection described by `args`
pub async fn run(args: Args) -> Result<AnalysisResult> {
    setup_logging(&args)?;

    let config = args.to_config();
    debug!("Configuration: {:?}", config);

    let runner = PipelineRunner::new(config)
        .with_context(|| format!("Cannot start selection on {}", args.input.display()))?
        .with_progress(!args.quiet);

    runner.execute().await.context("Dimuon selection failed")
}
