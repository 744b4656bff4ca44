//! Muon quality selection
//!
//! Builds the good-muon mask element by element and compacts the kinematic
//! arrays with it. The compacted arrays share the new indexing, so `pt[0]`
//! and `charge[0]` of the result describe the same good muon.

use super::{EventField, Stage, StageOutcome};
use crate::config::MuonSelectionCuts;
use crate::error::{DimuonError, Result};
use crate::models::{EventRecord, GoodMuons, MuonCollection, SelectionMask};
use tracing::trace;

/// Defines `goodMuon_mask`, `nGoodMuon` and the compacted good-muon arrays
#[derive(Debug, Clone)]
pub struct MuonQualitySelector {
    cuts: MuonSelectionCuts,
}

impl MuonQualitySelector {
    pub fn new(cuts: MuonSelectionCuts) -> Self {
        Self { cuts }
    }

    pub fn cuts(&self) -> &MuonSelectionCuts {
        &self.cuts
    }

    /// Mask of muons passing pT, |eta|, tight ID and isolation requirements
    pub fn build_mask(&self, muons: &MuonCollection) -> SelectionMask {
        let cuts = &self.cuts;
        let flags = muons
            .pt
            .iter()
            .zip(&muons.eta)
            .zip(&muons.tight_id)
            .zip(&muons.isolation)
            .map(|(((&pt, &eta), &tight_id), &isolation)| {
                (pt > cuts.min_pt)
                    & (eta.abs() < cuts.max_abs_eta)
                    & (tight_id || !cuts.require_tight_id)
                    & (isolation < cuts.max_isolation)
            })
            .collect();
        SelectionMask::new(flags)
    }

    /// Mask the muon collection of one event
    pub fn select(&self, muons: &MuonCollection, entry: u64) -> Result<GoodMuons> {
        muons.check_alignment(entry)?;

        let mask = self.build_mask(muons);
        let mask_len = mask.len();
        let misaligned = || DimuonError::MisalignedArrays {
            entry,
            details: format!("mask of length {} does not fit the muon arrays", mask_len),
        };

        let good = GoodMuons {
            pt: mask.compact(&muons.pt).ok_or_else(misaligned)?,
            eta: mask.compact(&muons.eta).ok_or_else(misaligned)?,
            phi: mask.compact(&muons.phi).ok_or_else(misaligned)?,
            mass: mask.compact(&muons.mass).ok_or_else(misaligned)?,
            charge: mask.compact(&muons.charge).ok_or_else(misaligned)?,
            mask,
        };

        trace!(
            "Event {}: {} of {} muons pass quality selection",
            entry,
            good.count(),
            muons.len()
        );
        Ok(good)
    }
}

impl Stage for MuonQualitySelector {
    fn name(&self) -> &str {
        "muon_quality"
    }

    fn requires(&self) -> &'static [EventField] {
        &[EventField::Muons]
    }

    fn provides(&self) -> &'static [EventField] {
        &[EventField::GoodMuons]
    }

    fn apply(&self, mut event: EventRecord) -> Result<StageOutcome> {
        event.good_muons = Some(self.select(&event.muons, event.entry)?);
        Ok(StageOutcome::Keep(event))
    }
}
