//! Complete runs through the pipeline runner

use super::parquet_fixture::{events_frame, write_events, write_frame};
use crate::config::{AnalysisConfig, ColumnNames, ExecutionMode, PlotFormat};
use crate::constants::{H_DIMUON_MASS, SUMMARY_FILENAME};
use crate::error::{DimuonError, Result};
use crate::models::EventRecord;
use crate::processor::PipelineRunner;
use crate::processor::source::{DatasetSource, MemorySource};
use crate::selection::tests::fixtures::mixed_events;
use polars::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tempfile::TempDir;

fn dataset(dir: &TempDir, count: u64) -> PathBuf {
    let path = dir.path().join("events.parquet");
    write_events(&mixed_events(count), &path);
    path
}

fn config(input: &Path, dir: &TempDir) -> AnalysisConfig {
    AnalysisConfig::new(input)
        .with_output_file(dir.path().join("out").join("histograms.parquet"))
        .with_output_dir(dir.path().join("plots"))
        .with_chunk_size(37)
        .with_partition_size(90)
}

#[tokio::test]
async fn test_basic_processing_writes_outputs() {
    let dir = TempDir::new().unwrap();
    let input = dataset(&dir, 400);
    let config = config(&input, &dir).with_execution_mode(ExecutionMode::Parallel { workers: 3 });

    let runner = PipelineRunner::new(config.clone()).unwrap();
    let result = runner.execute().await.unwrap();

    assert_eq!(result.events_read(), 400);
    assert!(result.selected_events() > 0);
    assert!(result.cutflow().is_consistent());
    assert_eq!(result.partitions(), 5);

    // One row per cell, flows included
    let written = ParquetReader::new(fs::File::open(&config.output_file).unwrap())
        .finish()
        .unwrap();
    assert_eq!(written.height(), 17 + 42 + 42 + 77);

    for plot in ["nJet.png", "muon1_pt.png", "muon2_pt.png", "dimuon_mass.png"] {
        let png = fs::read(config.output_dir.join(plot)).unwrap();
        assert!(png.starts_with(b"\x89PNG"));
    }

    let summary: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(config.output_dir.join(SUMMARY_FILENAME)).unwrap())
            .unwrap();
    assert_eq!(summary["events_read"], 400);
    assert_eq!(summary["selected_events"], result.selected_events());
}

#[tokio::test]
async fn test_skip_plots() {
    let dir = TempDir::new().unwrap();
    let input = dataset(&dir, 30);
    let config = config(&input, &dir).without_plots();

    PipelineRunner::new(config.clone()).unwrap().execute().await.unwrap();
    assert!(config.output_file.exists());
    assert!(!config.output_dir.join("dimuon_mass.png").exists());
    assert!(config.output_dir.join(SUMMARY_FILENAME).exists());
}

#[tokio::test]
async fn test_bounded_mode_reads_prefix() {
    let dir = TempDir::new().unwrap();
    let input = dataset(&dir, 200);

    for (limit, expected) in [(50, 50), (500, 200)] {
        let config = config(&input, &dir).with_execution_mode(ExecutionMode::Bounded { max_events: limit });
        let result = PipelineRunner::new(config).unwrap().run().await.unwrap();
        assert_eq!(result.events_read(), expected);
        assert_eq!(result.partitions(), 1);
        assert_eq!(result.cutflow().entries()[0].all, expected);
    }
}

#[tokio::test]
async fn test_parallel_matches_bounded_full_pass() {
    let dir = TempDir::new().unwrap();
    let input = dataset(&dir, 1000);

    let parallel = PipelineRunner::new(
        config(&input, &dir).with_execution_mode(ExecutionMode::Parallel { workers: 4 }),
    )
    .unwrap()
    .run()
    .await
    .unwrap();
    let bounded = PipelineRunner::new(
        config(&input, &dir).with_execution_mode(ExecutionMode::Bounded { max_events: 1000 }),
    )
    .unwrap()
    .run()
    .await
    .unwrap();

    assert_eq!(parallel.cutflow(), bounded.cutflow());
    for (a, b) in parallel.histograms().iter().zip(bounded.histograms()) {
        assert_eq!(a.all_cells(), b.all_cells());
        assert!((a.mean() - b.mean()).abs() < 1e-9);
    }
}

#[tokio::test]
async fn test_repeated_runs_are_identical() {
    let dir = TempDir::new().unwrap();
    let input = dataset(&dir, 700);
    let config = config(&input, &dir).with_execution_mode(ExecutionMode::Parallel { workers: 8 });
    let runner = PipelineRunner::new(config).unwrap();

    let first = runner.run().await.unwrap();
    let second = runner.run().await.unwrap();

    assert_eq!(first.cutflow(), second.cutflow());
    assert_eq!(first.histograms(), second.histograms());
    let mass = first.histogram(H_DIMUON_MASS.name).unwrap();
    assert_eq!(
        mass.mean().to_bits(),
        second.histogram(H_DIMUON_MASS.name).unwrap().mean().to_bits()
    );
}

#[tokio::test]
async fn test_missing_column_fails_before_processing() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("events.parquet");
    let mut df = events_frame(&mixed_events(20), &ColumnNames::default())
        .drop("HLT_IsoMu18")
        .unwrap();
    write_frame(&mut df, &input);

    let config = config(&input, &dir);
    let err = PipelineRunner::new(config.clone()).unwrap().execute().await.unwrap_err();
    assert!(matches!(err, DimuonError::Schema { .. }));
    assert!(err.is_setup_error());
    assert!(!config.output_file.exists());
}

#[tokio::test]
async fn test_invalid_config_rejected() {
    let dir = TempDir::new().unwrap();
    let input = dataset(&dir, 5);
    let config = config(&input, &dir).with_execution_mode(ExecutionMode::Parallel { workers: 0 });
    assert!(matches!(
        PipelineRunner::new(config),
        Err(DimuonError::Configuration { .. })
    ));
}

#[tokio::test]
async fn test_malformed_event_aborts_run() {
    let mut events = mixed_events(50);
    events[17].muons.phi.clear();
    events[17].muons.pt = vec![30.0];

    let runner = PipelineRunner::with_source(
        AnalysisConfig::default().with_execution_mode(ExecutionMode::Parallel { workers: 2 }),
        Arc::new(MemorySource::new(events)),
    )
    .unwrap();
    assert!(matches!(
        runner.run().await,
        Err(DimuonError::MisalignedArrays { entry: 17, .. })
    ));
}

#[tokio::test]
async fn test_memory_source_run() {
    let runner = PipelineRunner::with_source(
        AnalysisConfig::default().with_execution_mode(ExecutionMode::Bounded { max_events: 60 }),
        Arc::new(MemorySource::new(mixed_events(100))),
    )
    .unwrap();

    let result = runner.run().await.unwrap();
    assert_eq!(result.events_read(), 60);
    assert_eq!(result.execution_mode(), ExecutionMode::Bounded { max_events: 60 });
}

#[tokio::test]
async fn test_svg_plot_format() {
    let dir = TempDir::new().unwrap();
    let input = dataset(&dir, 40);
    let config = config(&input, &dir).with_plot_format(PlotFormat::Svg);

    PipelineRunner::new(config.clone()).unwrap().execute().await.unwrap();
    let svg = fs::read_to_string(config.output_dir.join("dimuon_mass.svg")).unwrap();
    assert!(svg.contains("CMS Open Data"));
    assert!(!config.output_dir.join("dimuon_mass.png").exists());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parquet_run_on_multi_thread_runtime() {
    let dir = TempDir::new().unwrap();
    let input = dataset(&dir, 300);

    for mode in [
        ExecutionMode::Parallel { workers: 4 },
        ExecutionMode::Bounded { max_events: 120 },
    ] {
        let config = config(&input, &dir).with_execution_mode(mode);
        let result = PipelineRunner::new(config.clone()).unwrap().execute().await.unwrap();

        assert_eq!(result.events_read(), mode.max_events().unwrap_or(300));
        assert!(result.cutflow().is_consistent());
        assert!(config.output_file.exists());
        assert!(config.output_dir.join("dimuon_mass.png").exists());
    }
}

/// Memory source whose first event range fails, counting read calls
struct FailingSource {
    inner: MemorySource,
    reads: AtomicU64,
}

impl DatasetSource for FailingSource {
    fn describe(&self) -> String {
        "failing source".to_string()
    }

    fn validate_schema(&self) -> Result<()> {
        Ok(())
    }

    fn total_events(&self) -> Result<u64> {
        self.inner.total_events()
    }

    fn read_range(&self, start: u64, len: usize) -> Result<Vec<EventRecord>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if start == 0 {
            return Err(DimuonError::MalformedValue {
                column: "Muon_pt".to_string(),
                entry: 0,
                reason: "unreadable".to_string(),
            });
        }
        self.inner.read_range(start, len)
    }
}

#[tokio::test]
async fn test_failed_partition_stops_remaining_partitions() {
    let dataset = Arc::new(FailingSource {
        inner: MemorySource::new(mixed_events(50)),
        reads: AtomicU64::new(0),
    });
    let config = AnalysisConfig::default()
        .with_execution_mode(ExecutionMode::Parallel { workers: 1 })
        .with_partition_size(10);

    let runner = PipelineRunner::with_source(config, dataset.clone()).unwrap();
    assert!(matches!(
        runner.run().await,
        Err(DimuonError::MalformedValue { entry: 0, .. })
    ));
    // Four more partitions were planned but never read
    assert_eq!(dataset.reads.load(Ordering::SeqCst), 1);
}
