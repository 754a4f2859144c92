//! Linking an analysis into its result record.

use serde::Serialize;
use tracing::{debug, info};

use crate::results::{Attachment, ResultRecord, ResultStore, StoreError, write_atomic};

/// Display name of the analysis attachment
pub const ANALYSIS_ATTACHMENT_NAME: &str = "LLM failure analysis";

/// MIME type of the analysis file
pub const ANALYSIS_MIME_TYPE: &str = "text/plain";

/// Suffix of every analysis file name
pub const ANALYSIS_FILE_SUFFIX: &str = "-llm-analysis.txt";

/// Result type for attach operations
pub type AttachResult<T> = Result<T, AttachError>;

/// Errors that can occur while attaching an analysis
#[derive(Debug, thiserror::Error)]
pub enum AttachError {
    /// Analysis file could not be written
    #[error("failed to write analysis file: {0}")]
    Write(#[source] StoreError),

    /// Record could not be updated or rewritten
    #[error("failed to update result record: {0}")]
    Persist(#[source] StoreError),
}

/// What `attach_analysis` did to the record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachOutcome {
    /// New attachment appended and record rewritten
    Attached,
    /// Record already referenced the analysis file; left untouched
    AlreadyPresent,
}

/// Analysis file name for a record identifier.
///
/// Characters outside `[A-Za-z0-9._-]` become `_`.
pub fn analysis_file_name(id: &str) -> String {
    let sanitized: String = id
        .chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '.' | '_' | '-' => c,
            _ => '_',
        })
        .collect();
    format!("{}{}", sanitized, ANALYSIS_FILE_SUFFIX)
}

/// Write the analysis next to the record and reference it from the record
/// exactly once.
pub fn attach_analysis(
    store: &ResultStore,
    record: &mut ResultRecord,
    analysis: &str,
) -> AttachResult<AttachOutcome> {
    let file_name = analysis_file_name(&record.id());
    let path = store.path_for(&file_name);

    write_atomic(&path, analysis.as_bytes()).map_err(AttachError::Write)?;
    debug!("wrote {}", path.display());

    if record.has_attachment_source(&file_name) {
        info!("analysis attachment {} already present", file_name);
        return Ok(AttachOutcome::AlreadyPresent);
    }

    let attachment = Attachment {
        name: ANALYSIS_ATTACHMENT_NAME.to_string(),
        source: file_name,
        mime_type: ANALYSIS_MIME_TYPE.to_string(),
    };
    record.push_attachment(&attachment).map_err(AttachError::Persist)?;
    store.persist(record).map_err(AttachError::Persist)?;
    Ok(AttachOutcome::Attached)
}
