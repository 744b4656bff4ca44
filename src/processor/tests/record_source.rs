//! Partition planning and lazy record streams

use crate::config::ExecutionMode;
use crate::error::{DimuonError, Result};
use crate::models::EventRecord;
use crate::processor::source::{DatasetSource, EventRange, MemorySource, RecordSource};
use crate::selection::tests::fixtures::mixed_events;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Memory source counting the events it hands out
struct CountingSource {
    inner: MemorySource,
    served: AtomicU64,
}

impl CountingSource {
    fn new(count: u64) -> Self {
        Self {
            inner: MemorySource::new(mixed_events(count)),
            served: AtomicU64::new(0),
        }
    }

    fn served(&self) -> u64 {
        self.served.load(Ordering::SeqCst)
    }
}

impl DatasetSource for CountingSource {
    fn describe(&self) -> String {
        "counting source".to_string()
    }

    fn validate_schema(&self) -> Result<()> {
        Ok(())
    }

    fn total_events(&self) -> Result<u64> {
        self.inner.total_events()
    }

    fn read_range(&self, start: u64, len: usize) -> Result<Vec<EventRecord>> {
        let records = self.inner.read_range(start, len)?;
        self.served.fetch_add(records.len() as u64, Ordering::SeqCst);
        Ok(records)
    }
}

#[test]
fn test_bounded_reads_exactly_limit() {
    for (limit, total, expected) in [(10, 100, 10), (100, 100, 100), (250, 100, 100), (0, 100, 0)] {
        let dataset = Arc::new(CountingSource::new(total));
        let source = RecordSource::open(dataset.clone(), Some(limit), 7).unwrap();
        let mode = ExecutionMode::Bounded { max_events: limit };

        let partitions = source.plan_partitions(&mode, 1000).unwrap();
        assert_eq!(partitions.len(), 1);

        let read = partitions
            .into_iter()
            .flat_map(|range| source.stream(range))
            .map(|record| record.unwrap())
            .count() as u64;
        assert_eq!(read, expected);
        assert_eq!(dataset.served(), expected);
    }
}

#[test]
fn test_records_keep_source_order() {
    let source = RecordSource::open(Arc::new(CountingSource::new(50)), Some(20), 6).unwrap();
    let entries: Vec<u64> = source.stream_all().map(|r| r.unwrap().entry).collect();
    assert_eq!(entries, (0..20).collect::<Vec<_>>());
}

#[test]
fn test_stream_pulls_lazily() {
    let dataset = Arc::new(CountingSource::new(100));
    let source = RecordSource::open(dataset.clone(), None, 10).unwrap();

    let mut stream = source.stream(EventRange::new(0, 100));
    assert_eq!(dataset.served(), 0);
    assert_eq!(stream.remaining_unread(), 100);

    stream.next().unwrap().unwrap();
    assert_eq!(dataset.served(), 10);
    assert_eq!(stream.remaining_unread(), 90);
}

#[test]
fn test_parallel_partitions_cover_all_events() {
    let source = RecordSource::open(Arc::new(CountingSource::new(1003)), None, 64).unwrap();
    let partitions = source
        .plan_partitions(&ExecutionMode::Parallel { workers: 4 }, 100)
        .unwrap();

    assert_eq!(partitions.first().map(|r| r.start), Some(0));
    assert_eq!(partitions.last().map(|r| r.end), Some(1003));
    for pair in partitions.windows(2) {
        assert_eq!(pair[0].end, pair[1].start);
    }
    assert!(partitions.iter().all(|r| !r.is_empty() && r.len() <= 100));
    assert_eq!(partitions.iter().map(EventRange::len).sum::<u64>(), 1003);
}

#[test]
fn test_small_dataset_spreads_over_workers() {
    let source = RecordSource::open(Arc::new(CountingSource::new(10)), None, 64).unwrap();
    let partitions = source
        .plan_partitions(&ExecutionMode::Parallel { workers: 4 }, 1000)
        .unwrap();
    assert_eq!(partitions.len(), 4);
    assert_eq!(partitions[3], EventRange::new(9, 10));
}

#[test]
fn test_limit_forbids_parallel_plan() {
    let source = RecordSource::open(Arc::new(CountingSource::new(10)), Some(5), 64).unwrap();
    let result = source.plan_partitions(&ExecutionMode::Parallel { workers: 2 }, 1000);
    assert!(matches!(result, Err(DimuonError::Configuration { .. })));
}

#[test]
fn test_empty_dataset_has_no_parallel_partitions() {
    let source = RecordSource::open(Arc::new(MemorySource::default()), None, 64).unwrap();
    let partitions = source
        .plan_partitions(&ExecutionMode::Parallel { workers: 4 }, 1000)
        .unwrap();
    assert!(partitions.is_empty());
    assert_eq!(source.stream_all().count(), 0);
}

#[test]
fn test_zero_chunk_size_rejected() {
    assert!(RecordSource::open(Arc::new(MemorySource::default()), None, 0).is_err());
}
