//! Per-filter pass counts.
//!
//! Each filter records how many events reached it (`all`) and how many
//! survived (`pass`). Filters only see survivors of earlier filters, so `pass`
//! never increases along the pipeline.

use crate::error::{DimuonError, Result};
use serde::Serialize;
use std::fmt;

/// Counts for one filter
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CutflowEntry {
    pub label: String,
    pub all: u64,
    pub pass: u64,
}

impl CutflowEntry {
    /// Fraction of events reaching this filter that survive it, in percent
    pub fn efficiency(&self) -> f64 {
        if self.all == 0 {
            0.0
        } else {
            self.pass as f64 / self.all as f64 * 100.0
        }
    }
}

/// Ordered cutflow for one pipeline
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Cutflow {
    entries: Vec<CutflowEntry>,
}

impl Cutflow {
    pub fn new(labels: Vec<String>) -> Self {
        Self {
            entries: labels
                .into_iter()
                .map(|label| CutflowEntry {
                    label,
                    all: 0,
                    pass: 0,
                })
                .collect(),
        }
    }

    /// Record one event reaching filter `index`
    pub fn record(&mut self, index: usize, passed: bool) -> Result<()> {
        let len = self.entries.len();
        let entry = self
            .entries
            .get_mut(index)
            .ok_or_else(|| DimuonError::CutflowMismatch {
                reason: format!("filter index {} outside cutflow of {} entries", index, len),
            })?;
        entry.all += 1;
        if passed {
            entry.pass += 1;
        }
        Ok(())
    }

    /// Component-wise addition of a cutflow with the same labels
    pub fn merge(&mut self, other: &Cutflow) -> Result<()> {
        if self.labels().ne(other.labels()) {
            return Err(DimuonError::CutflowMismatch {
                reason: format!(
                    "labels {:?} differ from {:?}",
                    self.labels().collect::<Vec<_>>(),
                    other.labels().collect::<Vec<_>>()
                ),
            });
        }
        for (mine, theirs) in self.entries.iter_mut().zip(&other.entries) {
            mine.all += theirs.all;
            mine.pass += theirs.pass;
        }
        Ok(())
    }

    pub fn entries(&self) -> &[CutflowEntry] {
        &self.entries
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|entry| entry.label.as_str())
    }

    /// Pass count of the filter with `label`
    pub fn pass_count(&self, label: &str) -> Option<u64> {
        self.entries
            .iter()
            .find(|entry| entry.label == label)
            .map(|entry| entry.pass)
    }

    /// Pass counts in pipeline order
    pub fn pass_counts(&self) -> Vec<u64> {
        self.entries.iter().map(|entry| entry.pass).collect()
    }

    /// Whether pass counts never increase and each filter saw exactly the
    /// survivors of the previous one
    pub fn is_consistent(&self) -> bool {
        self.entries.iter().all(|entry| entry.pass <= entry.all)
            && self
                .entries
                .windows(2)
                .all(|pair| pair[1].all == pair[0].pass && pair[1].pass <= pair[0].pass)
    }
}

impl fmt::Display for Cutflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let first_all = self.entries.first().map(|entry| entry.all).unwrap_or(0);
        for entry in &self.entries {
            let cumulative = if first_all == 0 {
                0.0
            } else {
                entry.pass as f64 / first_all as f64 * 100.0
            };
            writeln!(
                f,
                "{:<50}: pass={:<10} all={:<10} -- eff={:.2} % cumulative eff={:.2} %",
                entry.label,
                entry.pass,
                entry.all,
                entry.efficiency(),
                cumulative
            )?;
        }
        Ok(())
    }
}
