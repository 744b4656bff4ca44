//! Tests for aggregation across workers
