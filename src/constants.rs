//! Application constants for the dimuon selector
//!
//! Column names of the NanoAOD-style `Events` table, default selection
//! thresholds, histogram definitions and output file names.

// =============================================================================
// Dataset Columns
// =============================================================================

/// Name of the event table the Parquet export was produced from
pub const EVENTS_TABLE: &str = "Events";

/// Default trigger columns, combined with a logical OR
pub const DEFAULT_TRIGGER_COLUMNS: [&str; 2] = ["HLT_IsoMu24", "HLT_IsoMu18"];

/// Jet multiplicity column
pub const JET_COUNT_COLUMN: &str = "nJet";

/// Per-muon array columns
pub mod muon_columns {
    pub const PT: &str = "Muon_pt";
    pub const ETA: &str = "Muon_eta";
    pub const PHI: &str = "Muon_phi";
    pub const MASS: &str = "Muon_mass";
    pub const CHARGE: &str = "Muon_charge";
    pub const TIGHT_ID: &str = "Muon_tightId";
    pub const ISOLATION: &str = "Muon_pfRelIso04_all";
}

// =============================================================================
// Selection
// =============================================================================

/// Minimum muon transverse momentum in GeV (exclusive)
pub const DEFAULT_MIN_MUON_PT: f32 = 20.0;

/// Maximum absolute muon pseudorapidity (exclusive)
pub const DEFAULT_MAX_MUON_ABS_ETA: f32 = 2.4;

/// Maximum PF relative isolation (exclusive)
pub const DEFAULT_MAX_MUON_ISOLATION: f32 = 0.15;

/// Number of good muons a dimuon candidate must have
pub const DIMUON_MULTIPLICITY: usize = 2;

/// Cutflow labels, in pipeline order
pub mod cutflow_labels {
    pub const EXACTLY_TWO_MUONS: &str = "Exactly 2 good muons";
    pub const OPPOSITE_SIGN: &str = "Opposite-sign muons";
}

// =============================================================================
// Processing
// =============================================================================

/// Events pulled from the dataset per chunk
pub const DEFAULT_CHUNK_SIZE: usize = 50_000;

/// Upper bound on events handled by a single parallel partition
pub const DEFAULT_PARTITION_SIZE: u64 = 250_000;

/// Default input and output locations, matching the analysis defaults
pub const DEFAULT_INPUT_FILE: &str = "data.parquet";
pub const DEFAULT_OUTPUT_FILE: &str = "output.parquet";
pub const DEFAULT_OUTPUT_DIR: &str = ".";

/// Run summary written next to the plots
pub const SUMMARY_FILENAME: &str = "cutflow.json";

// =============================================================================
// Histograms
// =============================================================================

/// Static definition of one output histogram
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HistogramDefinition {
    pub name: &'static str,
    pub title: &'static str,
    pub x_label: &'static str,
    pub y_label: &'static str,
    pub bins: usize,
    pub low: f64,
    pub high: f64,
    /// Filename stem used for the rendered plot
    pub stem: &'static str,
}

pub const H_N_JET: HistogramDefinition = HistogramDefinition {
    name: "h_nJet",
    title: "Number of Jets",
    x_label: "Number of jets",
    y_label: "Events",
    bins: 15,
    low: 0.0,
    high: 15.0,
    stem: "nJet",
};

pub const H_MUON1_PT: HistogramDefinition = HistogramDefinition {
    name: "h_muon1_pt",
    title: "Leading Muon p_{T}",
    x_label: "p_{T} [GeV]",
    y_label: "Events / 5 GeV",
    bins: 40,
    low: 0.0,
    high: 200.0,
    stem: "muon1_pt",
};

pub const H_MUON2_PT: HistogramDefinition = HistogramDefinition {
    name: "h_muon2_pt",
    title: "Subleading Muon p_{T}",
    x_label: "p_{T} [GeV]",
    y_label: "Events / 5 GeV",
    bins: 40,
    low: 0.0,
    high: 200.0,
    stem: "muon2_pt",
};

pub const H_DIMUON_MASS: HistogramDefinition = HistogramDefinition {
    name: "h_dimuon_mass",
    title: "Dimuon Invariant Mass",
    x_label: "m_{#mu#mu} [GeV]",
    y_label: "Events / 2 GeV",
    bins: 75,
    low: 0.0,
    high: 150.0,
    stem: "dimuon_mass",
};

/// All output histograms in booking order
pub const HISTOGRAM_DEFINITIONS: [HistogramDefinition; 4] =
    [H_N_JET, H_MUON1_PT, H_MUON2_PT, H_DIMUON_MASS];

/// Build the trigger cutflow label from the two trigger column names
pub fn trigger_label(first: &str, second: &str) -> String {
    format!("Trigger selection ({} || {})", first, second)
}

/// Plot file name for a histogram stem and image extension
pub fn plot_filename(stem: &str, extension: &str) -> String {
    format!("{}.{}", stem, extension)
}
