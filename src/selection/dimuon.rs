//! Dimuon candidate selection: multiplicity then charge.
//!
//! The charge filter indexes the first two good muons directly. That is only
//! valid after the multiplicity filter, so it re-checks the count and fails the
//! run instead of reading out of bounds if the stages were ever reordered.

use super::{EventField, Stage, StageOutcome};
use crate::constants::{DIMUON_MULTIPLICITY, cutflow_labels};
use crate::error::{DimuonError, Result};
use crate::models::{EventRecord, GoodMuons};

/// Borrow the good muons of an event, which must hold exactly two
pub(crate) fn require_pair<'a>(stage: &str, event: &'a EventRecord) -> Result<&'a GoodMuons> {
    let good = event.good_muons.as_ref().ok_or_else(|| {
        DimuonError::precondition(stage, event.entry, "good muons have not been selected")
    })?;

    if good.count() != DIMUON_MULTIPLICITY || good.charge.len() != DIMUON_MULTIPLICITY {
        return Err(DimuonError::precondition(
            stage,
            event.entry,
            format!(
                "expected exactly {} good muons, found {}",
                DIMUON_MULTIPLICITY,
                good.count()
            ),
        ));
    }
    Ok(good)
}

/// Keeps events with exactly `required` good muons
#[derive(Debug, Clone)]
pub struct ExactMultiplicityFilter {
    required: usize,
    label: String,
}

impl ExactMultiplicityFilter {
    pub fn new(required: usize) -> Self {
        let label = if required == DIMUON_MULTIPLICITY {
            cutflow_labels::EXACTLY_TWO_MUONS.to_string()
        } else {
            format!("Exactly {} good muons", required)
        };
        Self { required, label }
    }

    pub fn required(&self) -> usize {
        self.required
    }
}

impl Stage for ExactMultiplicityFilter {
    fn name(&self) -> &str {
        "exact_multiplicity"
    }

    fn cutflow_label(&self) -> Option<&str> {
        Some(&self.label)
    }

    fn requires(&self) -> &'static [EventField] {
        &[EventField::GoodMuons]
    }

    fn provides(&self) -> &'static [EventField] {
        if self.required == DIMUON_MULTIPLICITY {
            &[EventField::TwoGoodMuons]
        } else {
            &[]
        }
    }

    fn apply(&self, event: EventRecord) -> Result<StageOutcome> {
        let count = event.n_good_muons().ok_or_else(|| {
            DimuonError::precondition(self.name(), event.entry, "good muons have not been selected")
        })?;

        if count == self.required {
            Ok(StageOutcome::Keep(event))
        } else {
            Ok(StageOutcome::Drop)
        }
    }
}

/// Keeps muon pairs with opposite charges
#[derive(Debug, Clone, Copy, Default)]
pub struct OppositeChargeFilter;

impl OppositeChargeFilter {
    pub fn is_opposite_sign(charges: &[i32]) -> bool {
        i64::from(charges[0]) * i64::from(charges[1]) < 0
    }
}

impl Stage for OppositeChargeFilter {
    fn name(&self) -> &str {
        "opposite_charge"
    }

    fn cutflow_label(&self) -> Option<&str> {
        Some(cutflow_labels::OPPOSITE_SIGN)
    }

    fn requires(&self) -> &'static [EventField] {
        &[EventField::TwoGoodMuons]
    }

    fn apply(&self, event: EventRecord) -> Result<StageOutcome> {
        let good = require_pair(self.name(), &event)?;
        if Self::is_opposite_sign(&good.charge) {
            Ok(StageOutcome::Keep(event))
        } else {
            Ok(StageOutcome::Drop)
        }
    }
}
