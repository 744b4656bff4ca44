//! Trigger selection

use super::{EventField, Stage, StageOutcome};
use crate::constants::trigger_label;
use crate::error::Result;
use crate::models::EventRecord;

/// Keeps events where at least one of the two triggers fired
#[derive(Debug, Clone)]
pub struct TriggerFilter {
    label: String,
}

impl TriggerFilter {
    pub fn new(first: &str, second: &str) -> Self {
        Self {
            label: trigger_label(first, second),
        }
    }

    pub fn passes(event: &EventRecord) -> bool {
        event.triggers[0] || event.triggers[1]
    }
}

impl Stage for TriggerFilter {
    fn name(&self) -> &str {
        "trigger"
    }

    fn cutflow_label(&self) -> Option<&str> {
        Some(&self.label)
    }

    fn requires(&self) -> &'static [EventField] {
        &[EventField::Triggers]
    }

    fn apply(&self, event: EventRecord) -> Result<StageOutcome> {
        if Self::passes(&event) {
            Ok(StageOutcome::Keep(event))
        } else {
            Ok(StageOutcome::Drop)
        }
    }
}
