//! Failure Triage - language model diagnoses for failed test results.
//!
//! This crate provides:
//! - Discovery of failed/broken result records in a results directory
//! - Deterministic prompt construction from a record's steps and failure detail
//! - HTTP and local-process model transports behind one trait
//! - Tolerant normalization of whatever the model answers
//! - Idempotent attachment of the analysis back into the record
//!
//! # Example
//!
//! ```rust,no_run
//! use failure_triage::{CancellationToken, Config, Orchestrator};
//!
//! let config = Config::from_env().results_dir("allure-results");
//! let summary = Orchestrator::from_config(&config)
//!     .unwrap()
//!     .with_cancellation(CancellationToken::new())
//!     .run()
//!     .unwrap();
//! println!("{} analyses attached", summary.attached());
//! ```

pub mod analysis;
pub mod attach;
pub mod config;
pub mod llm;
pub mod pipeline;
pub mod prompt;
pub mod results;

// Re-export configuration
pub use config::Config;

// Re-export result store types
pub use results::{Attachment, FailureDetail, ResultRecord, ResultStore, Step, StoreError, StoreResult, TestStatus};

// Re-export the pipeline stages
pub use analysis::{AnalysisResult, normalize};
pub use attach::{AttachError, AttachOutcome, AttachResult, analysis_file_name, attach_analysis};
pub use llm::{HttpTransport, InvokeError, InvokeOptions, InvokeResult, ModelTransport, ProcessTransport, RawResponse, select_transport};
pub use pipeline::{
    CancellationToken, EXIT_FATAL, EXIT_OK, Orchestrator, PipelineError, PipelineResult, RecordOutcome,
    RecordReport, RunSummary, run,
};
pub use prompt::build_analysis_prompt;
