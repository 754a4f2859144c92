//! Batch orchestration: discover failed records and enrich each one.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::analysis::{AnalysisResult, normalize};
use crate::attach::{AttachOutcome, analysis_file_name, attach_analysis};
use crate::config::Config;
use crate::llm::{InvokeError, InvokeOptions, ModelTransport, RawResponse, select_transport};
use crate::prompt::build_analysis_prompt;
use crate::results::{ResultRecord, ResultStore, StoreError};

/// Exit code for a completed batch, degraded records included
pub const EXIT_OK: u8 = 0;

/// Exit code when the batch could not start
pub const EXIT_FATAL: u8 = 2;

/// Prefix of the analysis text written when the transport fails
pub const TRANSPORT_FAILURE_PREFIX: &str = "LLM call failed: ";

/// Result type for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Errors that stop a run before any record is processed
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Results directory cannot be used
    #[error("cannot use results directory: {0}")]
    ResultsDir(#[from] StoreError),

    /// Transport could not be constructed
    #[error("cannot set up model transport: {0}")]
    Transport(#[from] InvokeError),
}

impl PipelineError {
    pub fn exit_code(&self) -> u8 {
        EXIT_FATAL
    }
}

/// Shared stop signal, checked between records
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// How a single record ended up
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RecordOutcome {
    /// Analysis written and attachment added
    Attached,
    /// Analysis written; the record already referenced it
    AlreadyPresent,
    /// Analysis or record could not be written
    Failed { message: String },
}

impl From<AttachOutcome> for RecordOutcome {
    fn from(outcome: AttachOutcome) -> Self {
        match outcome {
            AttachOutcome::Attached => RecordOutcome::Attached,
            AttachOutcome::AlreadyPresent => RecordOutcome::AlreadyPresent,
        }
    }
}

/// Per-record entry of a run summary
#[derive(Debug, Clone, Serialize)]
pub struct RecordReport {
    pub id: String,
    pub name: String,
    pub analysis_file: String,
    /// The transport failed and the analysis only records that failure
    pub degraded: bool,
    pub outcome: RecordOutcome,
    /// Short preview of the analysis
    pub headline: String,
}

/// Result of a complete triage run
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub results_dir: PathBuf,
    pub transport: String,
    /// Failed or broken records found
    pub discovered: usize,
    /// Stopped early by a cancellation request
    pub cancelled: bool,
    pub records: Vec<RecordReport>,
}

impl RunSummary {
    pub fn attached(&self) -> usize {
        self.count(|o| *o == RecordOutcome::Attached)
    }

    pub fn already_present(&self) -> usize {
        self.count(|o| *o == RecordOutcome::AlreadyPresent)
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, RecordOutcome::Failed { .. }))
    }

    pub fn degraded(&self) -> usize {
        self.records.iter().filter(|r| r.degraded).count()
    }

    fn count(&self, pred: impl Fn(&RecordOutcome) -> bool) -> usize {
        self.records.iter().filter(|r| pred(&r.outcome)).count()
    }
}

/// Drives prompt, transport, normalization and attachment for every failed
/// record in a results directory
pub struct Orchestrator {
    results_dir: PathBuf,
    options: InvokeOptions,
    transport: Box<dyn ModelTransport>,
    cancel: CancellationToken,
}

impl Orchestrator {
    pub fn new(
        results_dir: impl Into<PathBuf>,
        options: InvokeOptions,
        transport: Box<dyn ModelTransport>,
    ) -> Self {
        Self {
            results_dir: results_dir.into(),
            options,
            transport,
            cancel: CancellationToken::new(),
        }
    }

    /// Orchestrator for a configuration, with the transport it selects
    pub fn from_config(config: &Config) -> PipelineResult<Self> {
        Ok(Self::new(
            &config.results_dir,
            InvokeOptions::from_config(config),
            select_transport(config)?,
        ))
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Process every failed or broken record.
    ///
    /// Per-record problems are logged and reported in the summary; only an
    /// unusable results directory fails the run.
    pub fn run(&self) -> PipelineResult<RunSummary> {
        let started_at = Utc::now();
        let store = ResultStore::open(&self.results_dir)?;
        let records = store.discover()?;

        let mut summary = RunSummary {
            started_at,
            finished_at: started_at,
            results_dir: self.results_dir.clone(),
            transport: self.transport.name().to_string(),
            discovered: records.len(),
            cancelled: false,
            records: Vec::with_capacity(records.len()),
        };

        if records.is_empty() {
            info!("no failed results in {}", self.results_dir.display());
            summary.finished_at = Utc::now();
            return Ok(summary);
        }

        info!(
            "analyzing {} failed result(s) with {} transport, model {}",
            records.len(),
            self.transport.name(),
            self.options.model
        );

        let total = records.len();
        for (index, mut record) in records.into_iter().enumerate() {
            if self.cancel.is_cancelled() {
                warn!("cancelled, {} record(s) left unprocessed", total - index);
                summary.cancelled = true;
                break;
            }
            info!("[{}/{}] {}", index + 1, total, display_name(&record));
            summary.records.push(self.process_record(&store, &mut record));
        }

        summary.finished_at = Utc::now();
        info!(
            "done: {} attached, {} already present, {} failed, {} degraded",
            summary.attached(),
            summary.already_present(),
            summary.failed(),
            summary.degraded()
        );
        Ok(summary)
    }

    fn process_record(&self, store: &ResultStore, record: &mut ResultRecord) -> RecordReport {
        let prompt = build_analysis_prompt(record);

        let (response, degraded) = match self.transport.invoke(&prompt, &self.options) {
            Ok(response) => (response, false),
            Err(e) => {
                warn!("model call failed for {}: {}", record.id(), e);
                (RawResponse::raw(format!("{}{}", TRANSPORT_FAILURE_PREFIX, e)), true)
            }
        };

        let analysis = normalize(&response);
        let headline = AnalysisResult::from_text(&analysis).headline();

        let outcome = match attach_analysis(store, record, &analysis) {
            Ok(outcome) => outcome.into(),
            Err(e) => {
                warn!("could not attach analysis to {}: {}", record.path().display(), e);
                RecordOutcome::Failed {
                    message: e.to_string(),
                }
            }
        };

        RecordReport {
            id: record.id().into_owned(),
            name: record.name().to_string(),
            analysis_file: analysis_file_name(&record.id()),
            degraded,
            outcome,
            headline,
        }
    }
}

fn display_name(record: &ResultRecord) -> String {
    if record.name().is_empty() {
        record.id().into_owned()
    } else {
        record.name().to_string()
    }
}

/// Run the pipeline for a configuration with the transport it selects
pub fn run(config: &Config, cancel: CancellationToken) -> PipelineResult<RunSummary> {
    Orchestrator::from_config(config)?.with_cancellation(cancel).run()
}
