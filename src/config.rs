//! Configuration management and validation.
//!
//! Provides the run configuration: input and output locations, the explicit
//! execution mode, muon selection thresholds, dataset column names and the
//! immutable rendering style handed to the plot renderer.

use crate::constants::{
    DEFAULT_CHUNK_SIZE, DEFAULT_INPUT_FILE, DEFAULT_MAX_MUON_ABS_ETA, DEFAULT_MAX_MUON_ISOLATION,
    DEFAULT_MIN_MUON_PT, DEFAULT_OUTPUT_DIR, DEFAULT_OUTPUT_FILE, DEFAULT_PARTITION_SIZE,
    DEFAULT_TRIGGER_COLUMNS, JET_COUNT_COLUMN, muon_columns,
};
use crate::error::{DimuonError, Result};
use polars::prelude::IdxSize;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::debug;

/// How the event loop is scheduled.
///
/// `Bounded` is the only mode that honours an event limit: "first N events"
/// needs a single ordered traversal, so it always runs on one worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionMode {
    /// Disjoint event ranges processed by independent workers
    Parallel { workers: usize },
    /// First `max_events` events, single-threaded, in source order
    Bounded { max_events: u64 },
}

impl ExecutionMode {
    /// Parallel mode sized to the number of logical CPUs
    pub fn parallel() -> Self {
        Self::Parallel {
            workers: num_cpus::get(),
        }
    }

    /// Pick the mode from an optional event limit
    pub fn from_event_limit(max_events: Option<u64>, workers: Option<usize>) -> Self {
        match max_events {
            Some(max_events) => Self::Bounded { max_events },
            None => Self::Parallel {
                workers: workers.unwrap_or_else(num_cpus::get),
            },
        }
    }

    /// Number of workers this mode runs with
    pub fn workers(&self) -> usize {
        match self {
            Self::Parallel { workers } => *workers,
            Self::Bounded { .. } => 1,
        }
    }

    pub fn max_events(&self) -> Option<u64> {
        match self {
            Self::Parallel { .. } => None,
            Self::Bounded { max_events } => Some(*max_events),
        }
    }

    pub fn is_parallel(&self) -> bool {
        matches!(self, Self::Parallel { .. })
    }

    /// Short human readable description used in logs and summaries
    pub fn describe(&self) -> String {
        match self {
            Self::Parallel { workers } => format!("parallel ({} workers)", workers),
            Self::Bounded { max_events } => {
                format!("first {} events (single-threaded mode)", max_events)
            }
        }
    }
}

impl Default for ExecutionMode {
    fn default() -> Self {
        Self::parallel()
    }
}

/// Per-muon quality thresholds. All comparisons are strict.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MuonSelectionCuts {
    /// pT must exceed this value (GeV)
    pub min_pt: f32,
    /// |eta| must be below this value
    pub max_abs_eta: f32,
    /// Tight identification flag is required
    pub require_tight_id: bool,
    /// PF relative isolation must be below this value
    pub max_isolation: f32,
}

impl Default for MuonSelectionCuts {
    fn default() -> Self {
        Self {
            min_pt: DEFAULT_MIN_MUON_PT,
            max_abs_eta: DEFAULT_MAX_MUON_ABS_ETA,
            require_tight_id: true,
            max_isolation: DEFAULT_MAX_MUON_ISOLATION,
        }
    }
}

/// Column names of the event table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnNames {
    pub triggers: [String; 2],
    pub jet_count: String,
    pub muon_pt: String,
    pub muon_eta: String,
    pub muon_phi: String,
    pub muon_mass: String,
    pub muon_charge: String,
    pub muon_tight_id: String,
    pub muon_isolation: String,
}

impl Default for ColumnNames {
    fn default() -> Self {
        Self {
            triggers: DEFAULT_TRIGGER_COLUMNS.map(str::to_string),
            jet_count: JET_COUNT_COLUMN.to_string(),
            muon_pt: muon_columns::PT.to_string(),
            muon_eta: muon_columns::ETA.to_string(),
            muon_phi: muon_columns::PHI.to_string(),
            muon_mass: muon_columns::MASS.to_string(),
            muon_charge: muon_columns::CHARGE.to_string(),
            muon_tight_id: muon_columns::TIGHT_ID.to_string(),
            muon_isolation: muon_columns::ISOLATION.to_string(),
        }
    }
}

impl ColumnNames {
    /// Boolean scalar columns
    pub fn boolean_scalars(&self) -> Vec<&str> {
        self.triggers.iter().map(String::as_str).collect()
    }

    /// Floating point per-muon columns
    pub fn float_arrays(&self) -> Vec<&str> {
        vec![
            self.muon_pt.as_str(),
            self.muon_eta.as_str(),
            self.muon_phi.as_str(),
            self.muon_mass.as_str(),
            self.muon_isolation.as_str(),
        ]
    }

    /// Every column the pipeline reads
    pub fn all(&self) -> Vec<&str> {
        let mut columns = self.boolean_scalars();
        columns.push(self.jet_count.as_str());
        columns.extend(self.float_arrays());
        columns.push(self.muon_charge.as_str());
        columns.push(self.muon_tight_id.as_str());
        columns
    }
}

/// Stat box fields shown on rendered plots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatBoxOptions {
    pub name: bool,
    pub entries: bool,
    pub mean: bool,
    pub std_dev: bool,
}

impl Default for StatBoxOptions {
    fn default() -> Self {
        Self {
            name: true,
            entries: true,
            mean: true,
            std_dev: true,
        }
    }
}

/// Image format of the rendered plots
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
pub enum PlotFormat {
    /// Raster image, rasterised from the SVG document
    #[default]
    Png,
    Svg,
}

impl PlotFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Svg => "svg",
        }
    }
}

/// Immutable plot style passed explicitly to the renderer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderConfig {
    pub width: u32,
    pub height: u32,
    /// Left margin as a fraction of the canvas width
    pub left_margin: f64,
    pub right_margin: f64,
    pub top_margin: f64,
    pub bottom_margin: f64,
    pub line_color: String,
    pub line_width: f64,
    pub fill_color: String,
    pub font_family: String,
    pub font_size: f64,
    /// Experiment label drawn above the frame; empty disables it
    pub label: String,
    pub stat_box: StatBoxOptions,
    /// Raster resolution; 72 keeps one pixel per SVG unit
    pub dpi: u32,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
            left_margin: 0.12,
            right_margin: 0.05,
            top_margin: 0.10,
            bottom_margin: 0.10,
            line_color: "#0000ff".to_string(),
            line_width: 2.0,
            fill_color: "#9999ff".to_string(),
            font_family: "Helvetica, Arial, sans-serif".to_string(),
            font_size: 14.0,
            label: "CMS Open Data".to_string(),
            stat_box: StatBoxOptions::default(),
            dpi: 72,
        }
    }
}

/// Global configuration for a dimuon selection run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Parquet file (or glob) holding the event table
    pub input_path: PathBuf,

    /// Persisted histogram collection
    pub output_file: PathBuf,

    /// Directory for rendered plots and the run summary
    pub output_dir: PathBuf,

    /// Explicit scheduling decision
    pub execution_mode: ExecutionMode,

    /// Events pulled from the source per chunk
    pub chunk_size: usize,

    /// Maximum events per parallel partition
    pub partition_size: u64,

    pub cuts: MuonSelectionCuts,

    pub columns: ColumnNames,

    pub render: RenderConfig,

    pub plot_format: PlotFormat,

    /// Skip plot rendering
    pub skip_plots: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            input_path: PathBuf::from(DEFAULT_INPUT_FILE),
            output_file: PathBuf::from(DEFAULT_OUTPUT_FILE),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            execution_mode: ExecutionMode::default(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            partition_size: DEFAULT_PARTITION_SIZE,
            cuts: MuonSelectionCuts::default(),
            columns: ColumnNames::default(),
            render: RenderConfig::default(),
            plot_format: PlotFormat::default(),
            skip_plots: false,
        }
    }
}

impl AnalysisConfig {
    /// Create configuration for an input file with default settings
    pub fn new(input_path: impl Into<PathBuf>) -> Self {
        Self {
            input_path: input_path.into(),
            ..Default::default()
        }
    }

    /// Set the histogram output file
    pub fn with_output_file(mut self, output_file: impl Into<PathBuf>) -> Self {
        self.output_file = output_file.into();
        self
    }

    /// Set the plot and summary directory
    pub fn with_output_dir(mut self, output_dir: impl Into<PathBuf>) -> Self {
        self.output_dir = output_dir.into();
        self
    }

    /// Set the execution mode
    pub fn with_execution_mode(mut self, mode: ExecutionMode) -> Self {
        self.execution_mode = mode;
        self
    }

    /// Set the chunk size
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Set the parallel partition size
    pub fn with_partition_size(mut self, partition_size: u64) -> Self {
        self.partition_size = partition_size;
        self
    }

    /// Override the muon selection thresholds
    pub fn with_cuts(mut self, cuts: MuonSelectionCuts) -> Self {
        self.cuts = cuts;
        self
    }

    /// Override the plot style
    pub fn with_render_config(mut self, render: RenderConfig) -> Self {
        self.render = render;
        self
    }

    /// Set the plot image format
    pub fn with_plot_format(mut self, plot_format: PlotFormat) -> Self {
        self.plot_format = plot_format;
        self
    }

    /// Disable plot rendering
    pub fn without_plots(mut self) -> Self {
        self.skip_plots = true;
        self
    }

    /// Check the configuration before any pipeline work starts
    pub fn validate(&self) -> Result<()> {
        if let ExecutionMode::Parallel { workers } = self.execution_mode {
            if workers == 0 {
                return Err(DimuonError::configuration(
                    "parallel execution needs at least one worker",
                ));
            }
        }

        if self.chunk_size == 0 {
            return Err(DimuonError::configuration("chunk size must be positive"));
        }
        if self.chunk_size as u64 > IdxSize::MAX as u64 {
            return Err(DimuonError::configuration(format!(
                "chunk size {} exceeds the largest readable slice of {} rows",
                self.chunk_size,
                IdxSize::MAX
            )));
        }

        if self.partition_size == 0 {
            return Err(DimuonError::configuration("partition size must be positive"));
        }

        let cuts = &self.cuts;
        if !cuts.min_pt.is_finite() || !cuts.max_abs_eta.is_finite() || !cuts.max_isolation.is_finite()
        {
            return Err(DimuonError::configuration(format!(
                "muon selection thresholds must be finite: {:?}",
                cuts
            )));
        }

        if self.columns.triggers[0] == self.columns.triggers[1] {
            return Err(DimuonError::configuration(format!(
                "trigger columns must differ, got '{}' twice",
                self.columns.triggers[0]
            )));
        }

        if self.render.width == 0 || self.render.height == 0 || self.render.dpi == 0 {
            return Err(DimuonError::configuration("plot size and resolution must be positive"));
        }

        debug!("Configuration validated: {}", self.execution_mode.describe());
        Ok(())
    }
}
