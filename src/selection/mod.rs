//! Event selection pipeline
//!
//! The selection is an ordered list of [`Stage`] objects. Filters either keep
//! or drop an event and each owns one cutflow entry; transforms only add
//! derived fields. Nothing runs until a worker pushes events through
//! [`Pipeline::process`].
//!
//! # Stages
//!
//! - [`trigger`] - OR of two trigger decisions
//! - [`muon_quality`] - per-muon quality mask, count and compaction
//! - [`dimuon`] - exactly two good muons, then opposite charges
//! - [`kinematics`] - 4-vector sum and invariant mass
//!
//! Stages declare the event fields they need and provide. [`Pipeline::new`]
//! rejects an order in which a stage would read a field no earlier stage
//! produced, so the positional indexing in the dimuon and kinematics stages
//! can never run ahead of the multiplicity filter.

pub mod dimuon;
pub mod kinematics;
pub mod muon_quality;
pub mod trigger;

#[cfg(test)]
pub mod tests;

pub use dimuon::{ExactMultiplicityFilter, OppositeChargeFilter};
pub use kinematics::{FourVector, KinematicCalculator, PolarVector};
pub use muon_quality::MuonQualitySelector;
pub use trigger::TriggerFilter;

use crate::aggregation::Cutflow;
use crate::config::AnalysisConfig;
use crate::constants::DIMUON_MULTIPLICITY;
use crate::error::{DimuonError, Result};
use crate::models::EventRecord;
use std::fmt;
use tracing::debug;

/// Event fields that stages read or produce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventField {
    /// Raw trigger decisions
    Triggers,
    /// Raw muon arrays
    Muons,
    /// Quality mask and compacted good-muon arrays
    GoodMuons,
    /// Guarantee that exactly two good muons are present
    TwoGoodMuons,
    /// Invariant mass and per-muon pT
    Dimuon,
}

impl EventField {
    /// Fields every record carries straight from the source
    pub const SOURCE_FIELDS: [EventField; 2] = [EventField::Triggers, EventField::Muons];
}

impl fmt::Display for EventField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventField::Triggers => "trigger decisions",
            EventField::Muons => "muon arrays",
            EventField::GoodMuons => "good muon arrays",
            EventField::TwoGoodMuons => "exactly two good muons",
            EventField::Dimuon => "dimuon observables",
        };
        f.write_str(name)
    }
}

/// Result of applying one stage to an event
#[derive(Debug)]
pub enum StageOutcome {
    Keep(EventRecord),
    Drop,
}

/// One step of the selection pipeline
pub trait Stage: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    /// Cutflow label for filters; `None` for stages that never drop events
    fn cutflow_label(&self) -> Option<&str> {
        None
    }

    fn requires(&self) -> &'static [EventField] {
        &[]
    }

    fn provides(&self) -> &'static [EventField] {
        &[]
    }

    fn apply(&self, event: EventRecord) -> Result<StageOutcome>;
}

/// Ordered, validated list of stages
#[derive(Debug)]
pub struct Pipeline {
    stages: Vec<Box<dyn Stage>>,
}

impl Pipeline {
    /// Build a pipeline, checking that every requirement is met by an earlier stage
    pub fn new(stages: Vec<Box<dyn Stage>>) -> Result<Self> {
        let mut available: Vec<EventField> = EventField::SOURCE_FIELDS.to_vec();

        for stage in &stages {
            for requirement in stage.requires() {
                if !available.contains(requirement) {
                    return Err(DimuonError::PipelineOrder {
                        stage: stage.name().to_string(),
                        requirement: requirement.to_string(),
                    });
                }
            }
            available.extend_from_slice(stage.provides());
        }

        debug!(
            "Pipeline built with {} stages: {:?}",
            stages.len(),
            stages.iter().map(|s| s.name()).collect::<Vec<_>>()
        );

        Ok(Self { stages })
    }

    /// The dimuon selection: trigger, muon quality, multiplicity, charge, kinematics
    pub fn dimuon(config: &AnalysisConfig) -> Result<Self> {
        let [first, second] = &config.columns.triggers;
        Self::new(vec![
            Box::new(TriggerFilter::new(first, second)),
            Box::new(MuonQualitySelector::new(config.cuts)),
            Box::new(ExactMultiplicityFilter::new(DIMUON_MULTIPLICITY)),
            Box::new(OppositeChargeFilter),
            Box::new(KinematicCalculator),
        ])
    }

    /// Cutflow labels of the filter stages, in pipeline order
    pub fn cutflow_labels(&self) -> Vec<String> {
        self.stages
            .iter()
            .filter_map(|stage| stage.cutflow_label().map(str::to_string))
            .collect()
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|stage| stage.name()).collect()
    }

    /// A fresh cutflow matching this pipeline's filters
    pub fn new_cutflow(&self) -> Cutflow {
        Cutflow::new(self.cutflow_labels())
    }

    /// Push one event through every stage.
    ///
    /// Returns the fully derived event if it survives all filters. The cutflow
    /// must have been created by [`Pipeline::new_cutflow`].
    pub fn process(&self, event: EventRecord, cutflow: &mut Cutflow) -> Result<Option<EventRecord>> {
        let mut current = event;
        let mut filter_index = 0;

        for stage in &self.stages {
            let is_filter = stage.cutflow_label().is_some();
            match stage.apply(current)? {
                StageOutcome::Keep(next) => {
                    if is_filter {
                        cutflow.record(filter_index, true)?;
                        filter_index += 1;
                    }
                    current = next;
                }
                StageOutcome::Drop => {
                    if is_filter {
                        cutflow.record(filter_index, false)?;
                    }
                    return Ok(None);
                }
            }
        }

        Ok(Some(current))
    }
}
