//! Event sources
//!
//! A [`DatasetSource`] is the external, named-column event store. The
//! [`RecordSource`] on top of it plans event ranges for the workers and hands
//! out [`RecordStream`]s, which pull records chunk by chunk only when the
//! consuming worker asks for them. Streams are consumed by value and cannot be
//! restarted.

use crate::config::{ColumnNames, ExecutionMode};
use crate::error::{DimuonError, Result};
use crate::models::{EventRecord, MuonCollection};

use polars::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Half-open range of event positions `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventRange {
    pub start: u64,
    pub end: u64,
}

impl EventRange {
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Named-column event store the pipeline reads from
pub trait DatasetSource: Send + Sync {
    /// Human readable location, used in logs and summaries
    fn describe(&self) -> String;

    /// Fail with a schema error if a required column is absent or mis-shaped
    fn validate_schema(&self) -> Result<()>;

    /// Number of events available
    fn total_events(&self) -> Result<u64>;

    /// Read up to `len` events starting at position `start`, in source order
    fn read_range(&self, start: u64, len: usize) -> Result<Vec<EventRecord>>;
}

/// Dataset wrapper that applies the optional prefix limit and plans partitions
#[derive(Clone)]
pub struct RecordSource {
    dataset: Arc<dyn DatasetSource>,
    max_events: Option<u64>,
    available: u64,
    chunk_size: usize,
}

impl RecordSource {
    /// Validate the dataset schema and count its events
    pub fn open(
        dataset: Arc<dyn DatasetSource>,
        max_events: Option<u64>,
        chunk_size: usize,
    ) -> Result<Self> {
        if chunk_size == 0 {
            return Err(DimuonError::configuration("chunk size must be positive"));
        }

        dataset.validate_schema()?;
        let available = dataset.total_events()?;
        info!("Opened {} with {} events", dataset.describe(), available);

        Ok(Self {
            dataset,
            max_events,
            available,
            chunk_size,
        })
    }

    pub fn describe(&self) -> String {
        self.dataset.describe()
    }

    /// Events in the dataset
    pub fn available_events(&self) -> u64 {
        self.available
    }

    /// Events this source will yield: `min(max_events, available)`
    pub fn event_count(&self) -> u64 {
        match self.max_events {
            Some(max_events) => max_events.min(self.available),
            None => self.available,
        }
    }

    /// A prefix limit requires a single ordered traversal
    pub fn permits_parallel(&self) -> bool {
        self.max_events.is_none()
    }

    /// Split the events into the ranges workers will process.
    ///
    /// Parallel mode covers every event exactly once with disjoint ranges of at
    /// most `partition_size` events. Bounded mode yields one ordered range.
    pub fn plan_partitions(&self, mode: &ExecutionMode, partition_size: u64) -> Result<Vec<EventRange>> {
        let total = self.event_count();

        match mode {
            ExecutionMode::Bounded { max_events } => {
                if self.max_events != Some(*max_events) {
                    return Err(DimuonError::configuration(format!(
                        "bounded mode expects a source limited to {} events",
                        max_events
                    )));
                }
                Ok(vec![EventRange::new(0, total)])
            }
            ExecutionMode::Parallel { workers } => {
                if !self.permits_parallel() {
                    return Err(DimuonError::configuration(
                        "an event limit forbids parallel execution; use bounded mode",
                    ));
                }
                if *workers == 0 || partition_size == 0 {
                    return Err(DimuonError::configuration(
                        "parallel execution needs workers and a positive partition size",
                    ));
                }

                let per_worker = total.div_ceil(*workers as u64).max(1);
                let size = per_worker.min(partition_size);
                let mut ranges = Vec::new();
                let mut start = 0;
                while start < total {
                    let end = (start + size).min(total);
                    ranges.push(EventRange::new(start, end));
                    start = end;
                }

                debug!(
                    "Planned {} partitions of up to {} events for {} events",
                    ranges.len(),
                    size,
                    total
                );
                Ok(ranges)
            }
        }
    }

    /// Lazy stream over one range
    pub fn stream(&self, range: EventRange) -> RecordStream {
        let end = range.end.min(self.event_count());
        RecordStream {
            dataset: Arc::clone(&self.dataset),
            next: range.start.min(end),
            end,
            chunk_size: self.chunk_size,
            buffer: Vec::new().into_iter(),
            failed: false,
        }
    }

    /// Lazy stream over every event this source yields, in order
    pub fn stream_all(&self) -> RecordStream {
        self.stream(EventRange::new(0, self.event_count()))
    }
}

/// Pull-based iterator over one event range
pub struct RecordStream {
    dataset: Arc<dyn DatasetSource>,
    next: u64,
    end: u64,
    chunk_size: usize,
    buffer: std::vec::IntoIter<EventRecord>,
    failed: bool,
}

impl RecordStream {
    /// Events not yet pulled from the dataset
    pub fn remaining_unread(&self) -> u64 {
        self.end - self.next
    }

    fn refill(&mut self) -> Result<bool> {
        if self.next >= self.end {
            return Ok(false);
        }

        let len = (self.end - self.next).min(self.chunk_size as u64) as usize;
        let chunk = self.dataset.read_range(self.next, len)?;
        if chunk.len() != len {
            return Err(DimuonError::schema(
                "*",
                format!(
                    "expected {} events at position {}, dataset returned {}",
                    len,
                    self.next,
                    chunk.len()
                ),
            ));
        }

        self.next += len as u64;
        self.buffer = chunk.into_iter();
        Ok(true)
    }
}

impl Iterator for RecordStream {
    type Item = Result<EventRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        loop {
            if let Some(event) = self.buffer.next() {
                return Some(Ok(event));
            }
            match self.refill() {
                Ok(true) => continue,
                Ok(false) => return None,
                Err(e) => {
                    self.failed = true;
                    return Some(Err(e));
                }
            }
        }
    }
}

/// In-memory dataset, mainly for tests and benchmarks
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    events: Vec<EventRecord>,
}

impl MemorySource {
    /// Wrap events, renumbering their entries by position
    pub fn new(events: Vec<EventRecord>) -> Self {
        let events = events
            .into_iter()
            .enumerate()
            .map(|(i, mut event)| {
                event.entry = i as u64;
                event
            })
            .collect();
        Self { events }
    }
}

impl DatasetSource for MemorySource {
    fn describe(&self) -> String {
        format!("in-memory dataset ({} events)", self.events.len())
    }

    fn validate_schema(&self) -> Result<()> {
        Ok(())
    }

    fn total_events(&self) -> Result<u64> {
        Ok(self.events.len() as u64)
    }

    fn read_range(&self, start: u64, len: usize) -> Result<Vec<EventRecord>> {
        let start = (start as usize).min(self.events.len());
        let end = start.saturating_add(len).min(self.events.len());
        Ok(self.events[start..end].to_vec())
    }
}

/// Parquet export of the `Events` table, read with polars lazy scans
#[derive(Debug, Clone)]
pub struct ParquetSource {
    path: PathBuf,
    columns: ColumnNames,
}

impl ParquetSource {
    /// Create a source for a Parquet file or glob pattern
    pub fn new(path: impl Into<PathBuf>, columns: ColumnNames) -> Result<Self> {
        let path = path.into();
        let is_glob = path.to_string_lossy().contains(['*', '?', '[']);
        if !is_glob && !path.exists() {
            return Err(DimuonError::DatasetNotFound { path });
        }
        Ok(Self { path, columns })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn scan(&self) -> Result<LazyFrame> {
        Ok(LazyFrame::scan_parquet(&self.path, ScanArgsParquet::default())?)
    }

    /// Scan projected to the pipeline columns with fixed dtypes
    fn projected(&self) -> Result<LazyFrame> {
        let c = &self.columns;
        let float_list = || DataType::List(Box::new(DataType::Float32));

        Ok(self.scan()?.select([
            col(c.triggers[0].as_str()).cast(DataType::Boolean),
            col(c.triggers[1].as_str()).cast(DataType::Boolean),
            col(c.jet_count.as_str()).cast(DataType::Int64),
            col(c.muon_pt.as_str()).cast(float_list()),
            col(c.muon_eta.as_str()).cast(float_list()),
            col(c.muon_phi.as_str()).cast(float_list()),
            col(c.muon_mass.as_str()).cast(float_list()),
            col(c.muon_isolation.as_str()).cast(float_list()),
            col(c.muon_charge.as_str()).cast(DataType::List(Box::new(DataType::Int32))),
            col(c.muon_tight_id.as_str()).cast(DataType::List(Box::new(DataType::Boolean))),
        ]))
    }

    fn frame_to_records(&self, df: &DataFrame, first_entry: u64) -> Result<Vec<EventRecord>> {
        let c = &self.columns;
        let column = |name: &str| -> Result<Series> {
            Ok(df.column(name)?.as_materialized_series().clone())
        };

        let trigger_a = column(&c.triggers[0])?;
        let trigger_b = column(&c.triggers[1])?;
        let n_jet = column(&c.jet_count)?;
        let pt = column(&c.muon_pt)?;
        let eta = column(&c.muon_eta)?;
        let phi = column(&c.muon_phi)?;
        let mass = column(&c.muon_mass)?;
        let isolation = column(&c.muon_isolation)?;
        let charge = column(&c.muon_charge)?;
        let tight_id = column(&c.muon_tight_id)?;

        let (trigger_a, trigger_b, n_jet) = (trigger_a.bool()?, trigger_b.bool()?, n_jet.i64()?);

        // One pass per list column and chunk
        let floats = |series: &Series| -> Result<Option<Vec<f32>>> { Ok(series.f32()?.into_iter().collect()) };
        let mut pt = list_rows(pt.list()?, &c.muon_pt, first_entry, floats)?.into_iter();
        let mut eta = list_rows(eta.list()?, &c.muon_eta, first_entry, floats)?.into_iter();
        let mut phi = list_rows(phi.list()?, &c.muon_phi, first_entry, floats)?.into_iter();
        let mut mass = list_rows(mass.list()?, &c.muon_mass, first_entry, floats)?.into_iter();
        let mut isolation = list_rows(isolation.list()?, &c.muon_isolation, first_entry, floats)?.into_iter();
        let mut charge = list_rows(charge.list()?, &c.muon_charge, first_entry, |series| {
            Ok(series.i32()?.into_iter().collect())
        })?
        .into_iter();
        let mut tight_id = list_rows(tight_id.list()?, &c.muon_tight_id, first_entry, |series| {
            Ok(series.bool()?.into_iter().collect())
        })?
        .into_iter();

        let mut records = Vec::with_capacity(df.height());
        for row in 0..df.height() {
            let entry = first_entry + row as u64;
            let scalar = |name: &str| malformed(name, entry, "null value");
            let short = |name: &str| malformed(name, entry, "column shorter than the frame");

            let triggers = [
                trigger_a.get(row).ok_or_else(|| scalar(&c.triggers[0]))?,
                trigger_b.get(row).ok_or_else(|| scalar(&c.triggers[1]))?,
            ];
            let n_jet = n_jet.get(row).ok_or_else(|| scalar(&c.jet_count))?;

            let muons = MuonCollection {
                pt: pt.next().ok_or_else(|| short(&c.muon_pt))?,
                eta: eta.next().ok_or_else(|| short(&c.muon_eta))?,
                phi: phi.next().ok_or_else(|| short(&c.muon_phi))?,
                mass: mass.next().ok_or_else(|| short(&c.muon_mass))?,
                charge: charge.next().ok_or_else(|| short(&c.muon_charge))?,
                tight_id: tight_id.next().ok_or_else(|| short(&c.muon_tight_id))?,
                isolation: isolation.next().ok_or_else(|| short(&c.muon_isolation))?,
            };

            records.push(EventRecord::new(entry, triggers, n_jet, muons));
        }
        Ok(records)
    }
}

fn malformed(column: &str, entry: u64, reason: &str) -> DimuonError {
    DimuonError::MalformedValue {
        column: column.to_string(),
        entry,
        reason: reason.to_string(),
    }
}

/// Per-row values of a list column, iterated with one reused row series.
///
/// `values` returns `None` when a row holds a null element.
fn list_rows<T>(
    list: &ListChunked,
    column: &str,
    first_entry: u64,
    values: impl Fn(&Series) -> Result<Option<Vec<T>>>,
) -> Result<Vec<Vec<T>>> {
    list.amortized_iter()
        .enumerate()
        .map(|(row, cell)| {
            let entry = first_entry + row as u64;
            let cell = cell.ok_or_else(|| malformed(column, entry, "null array"))?;
            values(cell.as_ref())?.ok_or_else(|| malformed(column, entry, "null array element"))
        })
        .collect()
}

/// Expected shape of a dataset column
#[derive(Debug, Clone, Copy)]
enum ColumnShape {
    BooleanScalar,
    IntegerScalar,
    FloatArray,
    IntegerArray,
    BooleanArray,
}

impl ColumnShape {
    fn accepts(&self, dtype: &DataType) -> bool {
        match (self, dtype) {
            (Self::BooleanScalar, DataType::Boolean) => true,
            (Self::IntegerScalar, dtype) => dtype.is_integer(),
            (Self::FloatArray, DataType::List(inner)) => inner.is_float(),
            (Self::IntegerArray, DataType::List(inner)) => inner.is_integer(),
            (Self::BooleanArray, DataType::List(inner)) => matches!(**inner, DataType::Boolean),
            _ => false,
        }
    }

    fn describe(&self) -> &'static str {
        match self {
            Self::BooleanScalar => "boolean scalar",
            Self::IntegerScalar => "integer scalar",
            Self::FloatArray => "list of floats",
            Self::IntegerArray => "list of integers",
            Self::BooleanArray => "list of booleans",
        }
    }
}

impl DatasetSource for ParquetSource {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn validate_schema(&self) -> Result<()> {
        let schema = self.scan()?.collect_schema()?;
        let c = &self.columns;

        let mut expected = vec![
            (c.triggers[0].as_str(), ColumnShape::BooleanScalar),
            (c.triggers[1].as_str(), ColumnShape::BooleanScalar),
            (c.jet_count.as_str(), ColumnShape::IntegerScalar),
            (c.muon_charge.as_str(), ColumnShape::IntegerArray),
            (c.muon_tight_id.as_str(), ColumnShape::BooleanArray),
        ];
        expected.extend(
            c.float_arrays()
                .into_iter()
                .map(|name| (name, ColumnShape::FloatArray)),
        );

        for (name, shape) in expected {
            let dtype = schema.get(name).ok_or_else(|| {
                DimuonError::schema(name, format!("column not found in {} table", crate::constants::EVENTS_TABLE))
            })?;
            if !shape.accepts(dtype) {
                return Err(DimuonError::schema(
                    name,
                    format!("expected {}, found {}", shape.describe(), dtype),
                ));
            }
        }

        debug!("Schema of {} validated", self.path.display());
        Ok(())
    }

    fn total_events(&self) -> Result<u64> {
        let counted = self.scan()?.select([len()]).collect()?;
        let count = counted
            .get_columns()
            .first()
            .ok_or_else(|| DimuonError::schema("*", "row count query returned no column"))?
            .as_materialized_series()
            .cast(&DataType::UInt64)?;
        Ok(count.u64()?.get(0).unwrap_or(0))
    }

    fn read_range(&self, start: u64, len: usize) -> Result<Vec<EventRecord>> {
        let slice_len = IdxSize::try_from(len).map_err(|_| {
            DimuonError::configuration(format!("cannot read {} events in one slice", len))
        })?;
        let df = self.projected()?.slice(start as i64, slice_len).collect()?;
        debug!(
            "Read {} events at position {} from {}",
            df.height(),
            start,
            self.path.display()
        );
        self.frame_to_records(&df, start)
    }
}
