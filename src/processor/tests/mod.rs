//! Integration tests for the processor module
//!
//! Exercises sources, partition planning and complete runs over Parquet
//! datasets written into temporary directories.

pub mod parquet_fixture;
pub mod record_source;
pub mod runner;
