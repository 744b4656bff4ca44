//! Tests for the selection stages and pipeline
//!
//! `fixtures` builds synthetic events and is shared with the aggregation and
//! processor tests.

pub mod fixtures;
pub mod pipeline;
