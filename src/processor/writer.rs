//! Output persistence
//!
//! Every output is written to a temporary file next to its destination and
//! renamed into place, so a failed run never leaves a truncated file behind.

use crate::aggregation::{Histogram, RunSummary};
use crate::error::{DimuonError, Result};

use polars::prelude::*;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// Write `path` through a temporary file in the same directory
pub fn write_atomically<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut File) -> Result<()>,
{
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent)?;

    let mut temp = NamedTempFile::new_in(&parent)?;
    write(temp.as_file_mut())?;
    temp.as_file_mut().flush()?;

    temp.persist(path).map_err(|e| DimuonError::OutputWrite {
        path: path.to_path_buf(),
        reason: e.error.to_string(),
    })?;
    debug!("Persisted {}", path.display());
    Ok(())
}

/// Writes the histogram collection as a Parquet table with one row per cell
#[derive(Debug, Clone)]
pub struct HistogramWriter {
    output_path: PathBuf,
}

impl HistogramWriter {
    pub fn new(output_path: impl Into<PathBuf>) -> Self {
        Self {
            output_path: output_path.into(),
        }
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    /// Long-format frame: bin 0 is underflow, `bins + 1` is overflow
    pub fn to_frame(histograms: &[Histogram]) -> Result<DataFrame> {
        let mut name = Vec::new();
        let mut title = Vec::new();
        let mut x_label = Vec::new();
        let mut bin = Vec::new();
        let mut low_edge = Vec::new();
        let mut high_edge = Vec::new();
        let mut content = Vec::new();
        let mut sumw2 = Vec::new();
        let mut entries = Vec::new();

        for histogram in histograms {
            let binning = histogram.binning();
            for (index, &value) in histogram.all_cells().iter().enumerate() {
                let (low, high) = if index == 0 {
                    (f64::NEG_INFINITY, binning.low)
                } else if index == binning.bins + 1 {
                    (binning.high, f64::INFINITY)
                } else {
                    (binning.low_edge(index), binning.low_edge(index + 1))
                };

                name.push(histogram.name().to_string());
                title.push(histogram.title().to_string());
                x_label.push(histogram.x_label().to_string());
                bin.push(index as u32);
                low_edge.push(low);
                high_edge.push(high);
                content.push(value);
                sumw2.push(histogram.bin_sumw2(index));
                entries.push(histogram.entries());
            }
        }

        Ok(df!(
            "histogram" => name,
            "title" => title,
            "x_label" => x_label,
            "bin" => bin,
            "low_edge" => low_edge,
            "high_edge" => high_edge,
            "content" => content,
            "sumw2" => sumw2,
            "entries" => entries,
        )?)
    }

    /// Persist the histograms, replacing any previous file
    pub fn write(&self, histograms: &[Histogram]) -> Result<usize> {
        let mut df = Self::to_frame(histograms)?;
        let rows = df.height();

        write_atomically(&self.output_path, |file| {
            ParquetWriter::new(file)
                .with_compression(ParquetCompression::Snappy)
                .with_statistics(StatisticsOptions::default())
                .finish(&mut df)?;
            Ok(())
        })?;

        info!(
            "Wrote {} histograms ({} rows) to {}",
            histograms.len(),
            rows,
            self.output_path.display()
        );
        Ok(rows)
    }
}

/// Write the run summary as pretty-printed JSON
pub fn write_summary(summary: &RunSummary, path: &Path) -> Result<()> {
    write_atomically(path, |file| {
        serde_json::to_writer_pretty(&mut *file, summary)?;
        file.write_all(b"\n")?;
        Ok(())
    })?;
    info!("Wrote run summary to {}", path.display());
    Ok(())
}
