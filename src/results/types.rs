// Core types for result records

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::borrow::Cow;
use std::path::{Path, PathBuf};

/// Outcome of an executed test or step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    Passed,
    Failed,
    Broken,
    Skipped,
    #[serde(other)]
    Unknown,
}

impl TestStatus {
    /// Parse a status string; anything unrecognized is `Unknown`
    pub fn parse(status: &str) -> Self {
        match status {
            "passed" => TestStatus::Passed,
            "failed" => TestStatus::Failed,
            "broken" => TestStatus::Broken,
            "skipped" => TestStatus::Skipped,
            _ => TestStatus::Unknown,
        }
    }

    /// Only failed and broken results are worth a diagnosis
    pub fn is_analyzable(self) -> bool {
        matches!(self, TestStatus::Failed | TestStatus::Broken)
    }
}

/// Failure detail carried by a record or a step (`statusDetails`)
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct FailureDetail {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub trace: Option<String>,
}

/// A single executed step
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Step {
    #[serde(default)]
    pub name: Option<String>,

    /// Raw status string as written by the test runner
    #[serde(default)]
    pub status: Option<String>,

    #[serde(default, rename = "statusDetails")]
    pub status_details: Option<FailureDetail>,
}

impl Step {
    pub fn status(&self) -> TestStatus {
        self.status
            .as_deref()
            .map(TestStatus::parse)
            .unwrap_or(TestStatus::Unknown)
    }

    /// The step's own failure message, if any
    pub fn failure_message(&self) -> Option<&str> {
        self.status_details
            .as_ref()
            .and_then(|d| d.message.as_deref())
            .filter(|m| !m.is_empty())
    }
}

/// A side-car artifact referenced by a record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    /// Display name shown by report viewers
    pub name: String,

    /// File name of the artifact, relative to the results directory
    pub source: String,

    /// MIME type
    #[serde(rename = "type")]
    pub mime_type: String,
}

/// A result record backed by the generic JSON document it was parsed from.
///
/// Typed accessors cover only the fields the pipeline reads or writes; every
/// other field stays in the document untouched so a rewrite is lossless.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultRecord {
    path: PathBuf,
    document: Map<String, Value>,
}

impl ResultRecord {
    /// Parse a record from the text of the file at `path`
    pub fn parse(path: impl Into<PathBuf>, text: &str) -> StoreResult<Self> {
        let path = path.into();
        let value: Value = serde_json::from_str(text).map_err(|source| StoreError::Parse {
            path: path.clone(),
            source,
        })?;
        match value {
            Value::Object(document) => Ok(Self { path, document }),
            _ => Err(StoreError::Shape {
                path,
                detail: "top-level value is not an object".to_string(),
            }),
        }
    }

    /// File the record was read from and is persisted back to
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The underlying document, including fields this crate does not model
    pub fn document(&self) -> &Map<String, Value> {
        &self.document
    }

    /// Record identifier: the `uuid` field, else the file stem
    pub fn id(&self) -> Cow<'_, str> {
        match self.str_field("uuid") {
            Some(uuid) if !uuid.is_empty() => Cow::Borrowed(uuid),
            _ => self
                .path
                .file_stem()
                .map(|s| s.to_string_lossy())
                .unwrap_or(Cow::Borrowed("result")),
        }
    }

    pub fn name(&self) -> &str {
        self.str_field("name").unwrap_or("")
    }

    pub fn full_name(&self) -> Option<&str> {
        self.str_field("fullName").filter(|s| !s.is_empty())
    }

    pub fn status(&self) -> TestStatus {
        self.str_field("status")
            .map(TestStatus::parse)
            .unwrap_or(TestStatus::Unknown)
    }

    /// Top-level failure detail (`statusDetails`)
    pub fn failure(&self) -> Option<FailureDetail> {
        self.document
            .get("statusDetails")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Top-level steps in recorded order; entries that are not step objects are skipped
    pub fn steps(&self) -> Vec<Step> {
        self.array_field("steps")
            .iter()
            .filter_map(|v| serde_json::from_value(v.clone()).ok())
            .collect()
    }

    pub fn attachments(&self) -> Vec<Attachment> {
        self.array_field("attachments")
            .iter()
            .filter_map(|v| serde_json::from_value(v.clone()).ok())
            .collect()
    }

    /// Whether any attachment already references `source`
    pub fn has_attachment_source(&self, source: &str) -> bool {
        self.array_field("attachments")
            .iter()
            .any(|a| a.get("source").and_then(Value::as_str) == Some(source))
    }

    /// Append an attachment, creating the `attachments` array when absent.
    ///
    /// Existing entries are kept exactly as they were.
    pub fn push_attachment(&mut self, attachment: &Attachment) -> StoreResult<()> {
        let entry = serde_json::to_value(attachment).map_err(|source| StoreError::Parse {
            path: self.path.clone(),
            source,
        })?;

        match self.document.get_mut("attachments") {
            Some(Value::Array(items)) => items.push(entry),
            None | Some(Value::Null) => {
                self.document
                    .insert("attachments".to_string(), Value::Array(vec![entry]));
            }
            Some(_) => {
                return Err(StoreError::Shape {
                    path: self.path.clone(),
                    detail: "`attachments` is not an array".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Pretty-formatted JSON for the record file
    pub fn to_pretty_json(&self) -> StoreResult<String> {
        serde_json::to_string_pretty(&self.document).map_err(|source| StoreError::Parse {
            path: self.path.clone(),
            source,
        })
    }

    fn str_field(&self, key: &str) -> Option<&str> {
        self.document.get(key).and_then(Value::as_str)
    }

    fn array_field(&self, key: &str) -> &[Value] {
        self.document
            .get(key)
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// Result type for result store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Error types for result store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Results directory does not exist
    #[error("results directory {} does not exist", .0.display())]
    MissingDirectory(PathBuf),

    /// Results path exists but is not a directory
    #[error("results path {} is not a directory", .0.display())]
    NotADirectory(PathBuf),

    /// I/O error on a specific file
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// File content is not valid JSON
    #[error("invalid JSON in {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// JSON is valid but not shaped like a result record
    #[error("unexpected record shape in {}: {detail}", .path.display())]
    Shape { path: PathBuf, detail: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn record(text: &str) -> ResultRecord {
        ResultRecord::parse("/tmp/results/abc-result.json", text).unwrap()
    }

    #[test]
    fn test_status_parse() {
        assert_eq!(TestStatus::parse("failed"), TestStatus::Failed);
        assert_eq!(TestStatus::parse("broken"), TestStatus::Broken);
        assert_eq!(TestStatus::parse("FAILED"), TestStatus::Unknown);
        assert!(TestStatus::Broken.is_analyzable());
        assert!(!TestStatus::Skipped.is_analyzable());
    }

    #[test]
    fn test_id_prefers_uuid() {
        let rec = record(r#"{"uuid": "1234-abcd", "status": "failed"}"#);
        assert_eq!(rec.id(), "1234-abcd");

        let rec = record(r#"{"status": "failed"}"#);
        assert_eq!(rec.id(), "abc-result");
    }

    #[test]
    fn test_typed_accessors() {
        let rec = record(
            r#"{
                "name": "Login",
                "fullName": "features/login.feature:3",
                "status": "broken",
                "statusDetails": {"message": "boom", "trace": "at line 1"},
                "steps": [
                    {"name": "Given a user", "status": "passed"},
                    "not a step",
                    {"name": "When it fails", "status": "failed", "statusDetails": {"message": "nope"}}
                ]
            }"#,
        );
        assert_eq!(rec.name(), "Login");
        assert_eq!(rec.full_name(), Some("features/login.feature:3"));
        assert_eq!(rec.status(), TestStatus::Broken);
        assert_eq!(rec.failure().unwrap().message.as_deref(), Some("boom"));

        let steps = rec.steps();
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[1].status(), TestStatus::Failed);
        assert_eq!(steps[1].failure_message(), Some("nope"));
    }

    #[test]
    fn test_push_attachment_preserves_existing() {
        let mut rec = record(
            r#"{"status": "failed", "attachments": [{"name": "screenshot", "source": "shot.png", "type": "image/png", "size": 42}]}"#,
        );
        let attachment = Attachment {
            name: "notes".to_string(),
            source: "notes.txt".to_string(),
            mime_type: "text/plain".to_string(),
        };
        rec.push_attachment(&attachment).unwrap();

        let items = rec.document()["attachments"].as_array().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0]["size"], 42);
        assert_eq!(items[1]["type"], "text/plain");
        assert!(rec.has_attachment_source("notes.txt"));
    }

    #[test]
    fn test_push_attachment_rejects_non_array() {
        let mut rec = record(r#"{"status": "failed", "attachments": "oops"}"#);
        let attachment = Attachment {
            name: "a".to_string(),
            source: "a.txt".to_string(),
            mime_type: "text/plain".to_string(),
        };
        assert!(matches!(
            rec.push_attachment(&attachment),
            Err(StoreError::Shape { .. })
        ));
        assert_eq!(rec.document()["attachments"], "oops");
    }

    #[test]
    fn test_parse_rejects_non_object() {
        let err = ResultRecord::parse("x.json", "[1, 2]").unwrap_err();
        assert!(matches!(err, StoreError::Shape { .. }));
        let err = ResultRecord::parse("x.json", "{not json").unwrap_err();
        assert!(matches!(err, StoreError::Parse { .. }));
    }
}
