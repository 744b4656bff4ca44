//! Run orchestration.
//!
//! The [`PipelineRunner`] owns one selection run: it validates the
//! configuration and the dataset schema, plans event ranges according to the
//! explicit [`ExecutionMode`](crate::config::ExecutionMode), drives the workers and merges their partial
//! aggregations in partition order. Outputs (histogram file, plots, summary)
//! are only written by [`PipelineRunner::execute`], after the pass finished.

pub mod render;
pub mod source;
pub mod writer;

#[cfg(test)]
pub mod tests;

use self::render::{render_all, renderer_for};
use self::source::{DatasetSource, EventRange, ParquetSource, RecordSource, RecordStream};
use self::writer::{HistogramWriter, write_summary};

use crate::aggregation::{Aggregator, AnalysisResult};
use crate::config::AnalysisConfig;
use crate::constants::SUMMARY_FILENAME;
use crate::error::{DimuonError, Result};
use crate::selection::Pipeline;

use colored::*;
use futures::stream::{self, StreamExt, TryStreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use std::time::Instant;
use tokio::task;
use tracing::{debug, info, warn};

/// Run one partition on the calling thread
pub fn process_partition(pipeline: &Pipeline, records: RecordStream) -> Result<Aggregator> {
    let mut aggregator = Aggregator::new(pipeline.cutflow_labels())?;

    for record in records {
        let event = record?;
        aggregator.count_read();
        if let Some(selected) = pipeline.process(event, aggregator.cutflow_mut())? {
            aggregator.fill(&selected)?;
        }
    }
    Ok(aggregator)
}

/// Drives a dimuon selection run over one dataset
pub struct PipelineRunner {
    config: AnalysisConfig,
    dataset: Arc<dyn DatasetSource>,
    show_progress: bool,
}

impl PipelineRunner {
    /// Runner reading the configured Parquet input
    pub fn new(config: AnalysisConfig) -> Result<Self> {
        let dataset = ParquetSource::new(config.input_path.clone(), config.columns.clone())?;
        Self::with_source(config, Arc::new(dataset))
    }

    /// Runner reading from any dataset source
    pub fn with_source(config: AnalysisConfig, dataset: Arc<dyn DatasetSource>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            dataset,
            show_progress: false,
        })
    }

    /// Show a progress bar over partitions
    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Execute the selection pass and return the finalized result.
    ///
    /// The schema is checked before any event is read. Any per-event failure
    /// aborts the whole pass.
    pub async fn run(&self) -> Result<AnalysisResult> {
        let start_time = Instant::now();
        let mode = self.config.execution_mode;

        let pipeline = Arc::new(Pipeline::dimuon(&self.config)?);
        let source = self.open_source(mode.max_events()).await?;
        let partitions = source.plan_partitions(&mode, self.config.partition_size)?;
        if source.event_count() == 0 {
            warn!("No events to process in {}", source.describe());
        }

        info!(
            "Processing {} of {} events in {} partitions, mode: {}",
            source.event_count(),
            source.available_events(),
            partitions.len(),
            mode.describe()
        );

        let progress = self.show_progress.then(|| progress_bar(partitions.len() as u64));
        let partials = self
            .run_partitions(&pipeline, &source, &partitions, mode.workers(), progress.as_ref())
            .await?;
        if let Some(pb) = &progress {
            pb.finish_with_message("Selection complete");
        }

        // Partition order, not completion order, keeps repeated runs identical
        let mut merged = Aggregator::new(pipeline.cutflow_labels())?;
        for partial in &partials {
            merged.merge(partial)?;
        }

        let result = merged.finalize(mode, partitions.len(), start_time.elapsed());
        info!(
            "Selected {} of {} events in {:?}",
            result.selected_events(),
            result.events_read(),
            result.elapsed()
        );
        Ok(result)
    }

    /// Schema check and event count run on the blocking pool: polars drives
    /// its own runtime inside `collect` and must not block an async worker.
    async fn open_source(&self, max_events: Option<u64>) -> Result<RecordSource> {
        let dataset = Arc::clone(&self.dataset);
        let chunk_size = self.config.chunk_size;

        task::spawn_blocking(move || RecordSource::open(dataset, max_events, chunk_size))
            .await
            .map_err(|e| DimuonError::TaskFailed {
                task: format!("opening {}", self.dataset.describe()),
                reason: e.to_string(),
            })?
    }

    async fn run_partitions(
        &self,
        pipeline: &Arc<Pipeline>,
        source: &RecordSource,
        partitions: &[EventRange],
        workers: usize,
        progress: Option<&ProgressBar>,
    ) -> Result<Vec<Aggregator>> {
        // The first failing partition ends the pass without waiting for the others
        let mut finished: Vec<(usize, Aggregator)> = stream::iter(partitions.iter().copied().enumerate())
            .map(|(index, range)| {
                let pipeline = Arc::clone(pipeline);
                let records = source.stream(range);
                let progress = progress.cloned();
                async move {
                    debug!("Worker started on events {}..{}", range.start, range.end);
                    let aggregator = task::spawn_blocking(move || process_partition(&pipeline, records))
                        .await
                        .map_err(|e| DimuonError::WorkerFailed {
                            start: range.start,
                            end: range.end,
                            reason: e.to_string(),
                        })??;
                    if let Some(pb) = progress {
                        pb.inc(1);
                    }
                    Ok::<_, DimuonError>((index, aggregator))
                }
            })
            .buffer_unordered(workers.max(1))
            .try_collect()
            .await?;

        finished.sort_by_key(|(index, _)| *index);
        Ok(finished.into_iter().map(|(_, aggregator)| aggregator).collect())
    }

    /// Run the pass, print the report and write every output
    pub async fn execute(&self) -> Result<AnalysisResult> {
        println!("{}", "Starting dimuon selection".bright_green().bold());
        println!("  {} {}", "Input:".bright_cyan(), self.dataset.describe());
        println!("  {} {}", "Output:".bright_cyan(), self.config.output_file.display());
        println!(
            "  {} {}",
            "Mode:".bright_cyan(),
            self.config.execution_mode.describe()
        );

        println!("\n{}", "Running selection...".bright_yellow());
        let result = self.run().await?;

        self.write_outputs(&result).await?;
        print_report(&result);
        Ok(result)
    }

    /// Persist histograms, plots and the run summary
    pub async fn write_outputs(&self, result: &AnalysisResult) -> Result<()> {
        let config = self.config.clone();
        let result = result.clone();
        let input = self.dataset.describe();

        task::spawn_blocking(move || -> Result<()> {
            HistogramWriter::new(&config.output_file).write(result.histograms())?;

            if !config.skip_plots {
                let renderer = renderer_for(config.plot_format, config.render.clone());
                let plots = render_all(renderer.as_ref(), result.histograms(), &config.output_dir)?;
                info!("Rendered {} plots into {}", plots.len(), config.output_dir.display());
            }

            write_summary(&result.summary(input), &config.output_dir.join(SUMMARY_FILENAME))
        })
        .await
        .map_err(|e| DimuonError::OutputWrite {
            path: self.config.output_file.clone(),
            reason: e.to_string(),
        })?
    }
}

fn progress_bar(partitions: u64) -> ProgressBar {
    let pb = ProgressBar::new(partitions);
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");
    pb.set_style(style);
    pb.set_message("Processing partitions");
    pb
}

/// Print the cutflow report and run statistics
pub fn print_report(result: &AnalysisResult) {
    let stats = result.stats();

    println!("\n{}", "Cutflow Report".bright_green().bold());
    print!("{}", result.cutflow());

    println!("\n{}", "Processing Summary".bright_green().bold());
    println!(
        "  {} {}ms",
        "Time elapsed:".bright_cyan(),
        stats.processing_time_ms.to_string().bright_white()
    );
    println!(
        "  {} {}",
        "Events read:".bright_cyan(),
        stats.events_read.to_string().bright_white()
    );
    println!(
        "  {} {:.0}",
        "Events/second:".bright_cyan(),
        stats.events_per_second()
    );
    println!(
        "  {} {}",
        "Partitions:".bright_cyan(),
        stats.partitions.to_string().bright_white()
    );
    println!(
        "\nSelected {} dimuon events",
        stats.events_selected.to_string().bright_white().bold()
    );
}
