//! Histogram and cutflow aggregation
//!
//! An [`Aggregator`] accumulates histograms and the cutflow while events are
//! processed. Workers each own one and the runner merges them once every
//! worker is done. [`Aggregator::finalize`] consumes the aggregator and
//! returns the read-only [`AnalysisResult`]; queries only exist there, so
//! nothing can mutate a finished result or read a half-filled one.

pub mod cutflow;
pub mod histogram;

#[cfg(test)]
pub mod tests;

pub use cutflow::{Cutflow, CutflowEntry};
pub use histogram::{Binning, Histogram};

use crate::config::ExecutionMode;
use crate::constants::{H_DIMUON_MASS, H_MUON1_PT, H_MUON2_PT, H_N_JET, HISTOGRAM_DEFINITIONS};
use crate::error::{DimuonError, Result};
use crate::models::{EventRecord, ProcessingStats};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;

/// Event quantity a histogram is filled with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observable {
    JetCount,
    Muon1Pt,
    Muon2Pt,
    DimuonMass,
}

impl Observable {
    /// Observable filling the histogram with the given booking name
    pub fn for_histogram(name: &str) -> Option<Self> {
        match name {
            n if n == H_N_JET.name => Some(Self::JetCount),
            n if n == H_MUON1_PT.name => Some(Self::Muon1Pt),
            n if n == H_MUON2_PT.name => Some(Self::Muon2Pt),
            n if n == H_DIMUON_MASS.name => Some(Self::DimuonMass),
            _ => None,
        }
    }

    /// Value for a fully derived event
    pub fn value(&self, event: &EventRecord) -> Option<f64> {
        match self {
            Self::JetCount => Some(event.n_jet as f64),
            Self::Muon1Pt => event.dimuon.map(|d| d.muon1_pt),
            Self::Muon2Pt => event.dimuon.map(|d| d.muon2_pt),
            Self::DimuonMass => event.dimuon.map(|d| d.mass),
        }
    }
}

/// Accumulating state of one worker (or of the merged run)
#[derive(Debug, Clone)]
pub struct Aggregator {
    histograms: Vec<(Observable, Histogram)>,
    cutflow: Cutflow,
    events_read: u64,
}

impl Aggregator {
    /// Book the output histograms and a cutflow with the given filter labels
    pub fn new(cutflow_labels: Vec<String>) -> Result<Self> {
        let histograms = HISTOGRAM_DEFINITIONS
            .iter()
            .map(|definition| {
                let observable = Observable::for_histogram(definition.name).ok_or_else(|| {
                    DimuonError::configuration(format!(
                        "no observable for histogram '{}'",
                        definition.name
                    ))
                })?;
                Ok((observable, Histogram::from_definition(definition)?))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            histograms,
            cutflow: Cutflow::new(cutflow_labels),
            events_read: 0,
        })
    }

    /// Count one event pulled from the source
    pub fn count_read(&mut self) {
        self.events_read += 1;
    }

    pub fn events_read(&self) -> u64 {
        self.events_read
    }

    /// Cutflow updated by the pipeline during the pass
    pub fn cutflow_mut(&mut self) -> &mut Cutflow {
        &mut self.cutflow
    }

    /// Fill every histogram from an event that survived all filters
    pub fn fill(&mut self, event: &EventRecord) -> Result<()> {
        for (observable, histogram) in &mut self.histograms {
            let value = observable.value(event).ok_or_else(|| {
                DimuonError::precondition(
                    "aggregation",
                    event.entry,
                    format!("event has no value for '{}'", histogram.name()),
                )
            })?;
            histogram.fill(value)?;
        }
        Ok(())
    }

    /// Add another aggregator's histograms and cutflow to this one
    pub fn merge(&mut self, other: &Aggregator) -> Result<()> {
        if self.histograms.len() != other.histograms.len() {
            return Err(DimuonError::HistogramMismatch {
                name: "*".to_string(),
                reason: format!(
                    "{} histograms booked, other has {}",
                    self.histograms.len(),
                    other.histograms.len()
                ),
            });
        }
        for ((_, mine), (_, theirs)) in self.histograms.iter_mut().zip(&other.histograms) {
            mine.merge(theirs)?;
        }
        self.cutflow.merge(&other.cutflow)?;
        self.events_read += other.events_read;
        Ok(())
    }

    /// Close the pass and hand out the read-only result
    pub fn finalize(self, execution_mode: ExecutionMode, partitions: usize, elapsed: Duration) -> AnalysisResult {
        AnalysisResult {
            histograms: self.histograms.into_iter().map(|(_, h)| h).collect(),
            cutflow: self.cutflow,
            events_read: self.events_read,
            execution_mode,
            partitions,
            elapsed,
        }
    }
}

/// Finished, read-only outcome of a run
#[derive(Debug, Clone)]
pub struct AnalysisResult {
    histograms: Vec<Histogram>,
    cutflow: Cutflow,
    events_read: u64,
    execution_mode: ExecutionMode,
    partitions: usize,
    elapsed: Duration,
}

impl AnalysisResult {
    /// Histograms in booking order
    pub fn histograms(&self) -> &[Histogram] {
        &self.histograms
    }

    pub fn histogram(&self, name: &str) -> Option<&Histogram> {
        self.histograms.iter().find(|h| h.name() == name)
    }

    pub fn cutflow(&self) -> &Cutflow {
        &self.cutflow
    }

    pub fn events_read(&self) -> u64 {
        self.events_read
    }

    /// Events that survived every filter
    pub fn selected_events(&self) -> u64 {
        self.histogram(H_DIMUON_MASS.name)
            .map(Histogram::entries)
            .unwrap_or(0)
    }

    pub fn execution_mode(&self) -> ExecutionMode {
        self.execution_mode
    }

    pub fn partitions(&self) -> usize {
        self.partitions
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Volume and timing figures of the run
    pub fn stats(&self) -> ProcessingStats {
        ProcessingStats {
            events_read: self.events_read,
            events_selected: self.selected_events(),
            partitions: self.partitions,
            processing_time_ms: self.elapsed.as_millis(),
        }
    }

    /// Serializable run summary
    pub fn summary(&self, input: impl Into<String>) -> RunSummary {
        RunSummary {
            generated_at: Utc::now(),
            input: input.into(),
            execution_mode: self.execution_mode.describe(),
            events_read: self.events_read,
            selected_events: self.selected_events(),
            partitions: self.partitions,
            processing_time_ms: self.elapsed.as_millis() as u64,
            cutflow: self.cutflow.entries().to_vec(),
            histograms: self.histograms.iter().map(HistogramSummary::from).collect(),
        }
    }
}

/// Headline statistics of one histogram
#[derive(Debug, Clone, Serialize)]
pub struct HistogramSummary {
    pub name: String,
    pub title: String,
    pub binning: Binning,
    pub entries: u64,
    pub mean: f64,
    pub std_dev: f64,
    pub underflow: f64,
    pub overflow: f64,
}

impl From<&Histogram> for HistogramSummary {
    fn from(h: &Histogram) -> Self {
        Self {
            name: h.name().to_string(),
            title: h.title().to_string(),
            binning: *h.binning(),
            entries: h.entries(),
            mean: h.mean(),
            std_dev: h.std_dev(),
            underflow: h.underflow(),
            overflow: h.overflow(),
        }
    }
}

/// JSON document written next to the plots
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub generated_at: DateTime<Utc>,
    pub input: String,
    pub execution_mode: String,
    pub events_read: u64,
    pub selected_events: u64,
    pub partitions: usize,
    pub processing_time_ms: u64,
    pub cutflow: Vec<CutflowEntry>,
    pub histograms: Vec<HistogramSummary>,
}
