//! Core data structures for the selection pipeline.
//!
//! An [`EventRecord`] carries the raw scalar and per-muon array fields of one
//! event plus the fields derived by later stages. All arrays of one muon
//! collection are index-aligned: position `i` in every array describes the
//! same muon.

use crate::error::{DimuonError, Result};
use serde::{Deserialize, Serialize};

/// Boolean mask over a per-object array
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SelectionMask(Vec<bool>);

impl SelectionMask {
    pub fn new(flags: Vec<bool>) -> Self {
        Self(flags)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of selected entries
    pub fn count(&self) -> usize {
        self.0.iter().filter(|&&flag| flag).count()
    }

    pub fn as_slice(&self) -> &[bool] {
        &self.0
    }

    /// Keep the entries of `values` whose mask flag is set, preserving order.
    ///
    /// The mask must have exactly the length of `values`.
    pub fn compact<T: Copy>(&self, values: &[T]) -> Option<Vec<T>> {
        if values.len() != self.0.len() {
            return None;
        }
        Some(
            values
                .iter()
                .zip(&self.0)
                .filter_map(|(value, &keep)| keep.then_some(*value))
                .collect(),
        )
    }
}

/// Index-aligned per-muon arrays as read from the dataset
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MuonCollection {
    pub pt: Vec<f32>,
    pub eta: Vec<f32>,
    pub phi: Vec<f32>,
    pub mass: Vec<f32>,
    pub charge: Vec<i32>,
    pub tight_id: Vec<bool>,
    pub isolation: Vec<f32>,
}

impl MuonCollection {
    /// Number of muons, taken from the pt array
    pub fn len(&self) -> usize {
        self.pt.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pt.is_empty()
    }

    /// Check that every array has the length of the pt array
    pub fn check_alignment(&self, entry: u64) -> Result<()> {
        let expected = self.pt.len();
        let lengths = [
            ("eta", self.eta.len()),
            ("phi", self.phi.len()),
            ("mass", self.mass.len()),
            ("charge", self.charge.len()),
            ("tightId", self.tight_id.len()),
            ("isolation", self.isolation.len()),
        ];

        for (field, len) in lengths {
            if len != expected {
                return Err(DimuonError::MisalignedArrays {
                    entry,
                    details: format!("{} has {} entries but pt has {}", field, len, expected),
                });
            }
        }
        Ok(())
    }
}

/// Muons surviving the quality selection, compacted with the quality mask
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GoodMuons {
    pub mask: SelectionMask,
    pub pt: Vec<f32>,
    pub eta: Vec<f32>,
    pub phi: Vec<f32>,
    pub mass: Vec<f32>,
    pub charge: Vec<i32>,
}

impl GoodMuons {
    /// Number of good muons (`nGoodMuon`)
    pub fn count(&self) -> usize {
        self.pt.len()
    }
}

/// Quantities derived from the two selected muons
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DimuonObservables {
    /// Invariant mass of the muon pair in GeV
    pub mass: f64,
    pub muon1_pt: f64,
    pub muon2_pt: f64,
}

/// One event flowing through the pipeline
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EventRecord {
    /// Position of the event in the source
    pub entry: u64,
    /// Trigger decisions, in configured column order
    pub triggers: [bool; 2],
    pub n_jet: i64,
    pub muons: MuonCollection,
    /// Set by the muon quality stage
    pub good_muons: Option<GoodMuons>,
    /// Set by the kinematics stage
    pub dimuon: Option<DimuonObservables>,
}

impl EventRecord {
    pub fn new(entry: u64, triggers: [bool; 2], n_jet: i64, muons: MuonCollection) -> Self {
        Self {
            entry,
            triggers,
            n_jet,
            muons,
            good_muons: None,
            dimuon: None,
        }
    }

    /// Number of good muons, if the quality stage has run
    pub fn n_good_muons(&self) -> Option<usize> {
        self.good_muons.as_ref().map(GoodMuons::count)
    }
}

/// Timing and volume figures for one run
#[derive(Debug, Default, Clone, Serialize)]
pub struct ProcessingStats {
    pub events_read: u64,
    pub events_selected: u64,
    pub partitions: usize,
    pub processing_time_ms: u128,
}

impl ProcessingStats {
    /// Event throughput in events per second
    pub fn events_per_second(&self) -> f64 {
        if self.processing_time_ms == 0 {
            0.0
        } else {
            self.events_read as f64 * 1000.0 / self.processing_time_ms as f64
        }
    }
}
