//! Dimuon Selector Library
//!
//! Selects opposite-sign muon pairs from a columnar collider event table and
//! histograms their kinematics.
//!
//! This library provides tools for:
//! - Reading the `Events` table from Parquet with schema validation
//! - An ordered, validated pipeline of selection stages (trigger OR, muon
//!   quality mask, exact multiplicity, opposite charge, invariant mass)
//! - Histogram and cutflow aggregation that merges deterministically across
//!   parallel workers
//! - Parallel or bounded single-threaded execution, chosen explicitly
//! - Persisting histograms to Parquet, rendering PNG or SVG plots and writing a run
//!   summary

pub mod aggregation;
pub mod cli;
pub mod config;
pub mod constants;
pub mod error;
pub mod models;
pub mod processor;
pub mod selection;

pub use aggregation::{AnalysisResult, Cutflow, Histogram};
pub use config::{AnalysisConfig, ExecutionMode, MuonSelectionCuts, PlotFormat};
pub use error::{DimuonError, Result};
pub use models::{DimuonObservables, EventRecord, MuonCollection};
pub use processor::PipelineRunner;
pub use selection::Pipeline;
