//! Model output normalization.
//!
//! Models are asked for a JSON object, but what comes back ranges from clean
//! JSON to JSON wrapped in prose to plain text. [`normalize`] turns any of it
//! into the text that gets written next to the result record, and
//! [`AnalysisResult`] is the typed view of that text.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::llm::RawResponse;

/// Field names a structured analysis may carry, in canonical order
pub const ANALYSIS_FIELDS: [&str; 7] = [
    "summary",
    "probable_root_cause",
    "confidence",
    "suggested_fix",
    "immediate_workaround",
    "files_to_change",
    "allure_attachment",
];

/// Longest headline taken from unstructured text
const HEADLINE_CHARS: usize = 200;

/// Structured failure analysis, degraded to `raw` when the model did not
/// answer in this shape
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probable_root_cause: Option<String>,
    /// Free-form; models answer with words or numbers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_fix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub immediate_workaround: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files_to_change: Vec<String>,
    /// Markdown report
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allure_attachment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
}

impl AnalysisResult {
    /// Degraded analysis holding only unstructured text
    pub fn degraded(text: impl Into<String>) -> Self {
        Self {
            raw: Some(text.into()),
            ..Default::default()
        }
    }

    /// Typed view of normalized analysis text
    pub fn from_text(text: &str) -> Self {
        match serde_json::from_str::<AnalysisResult>(text) {
            Ok(analysis) if analysis.has_structure() || analysis.raw.is_some() => analysis,
            _ => Self::degraded(text),
        }
    }

    /// Whether any recognized field is present
    pub fn has_structure(&self) -> bool {
        self.summary.is_some()
            || self.probable_root_cause.is_some()
            || self.confidence.is_some()
            || self.suggested_fix.is_some()
            || self.immediate_workaround.is_some()
            || !self.files_to_change.is_empty()
            || self.allure_attachment.is_some()
    }

    /// One-line preview for progress output
    pub fn headline(&self) -> String {
        let text = self
            .summary
            .as_deref()
            .or(self.probable_root_cause.as_deref())
            .or(self.raw.as_deref())
            .unwrap_or("");
        let line = text.trim();
        match line.char_indices().nth(HEADLINE_CHARS) {
            Some((end, _)) => format!("{}...", &line[..end]),
            None => line.to_string(),
        }
    }
}

/// Coerce raw model output into the text persisted as the analysis.
///
/// - JSON with a recognized analysis field: re-serialized canonically
/// - JSON object holding only a string `raw`: unwrapped to that text
/// - any other JSON: re-serialized canonically
/// - anything else: passed through unchanged
///
/// Normalizing already-normalized text returns it unchanged.
pub fn normalize(response: &RawResponse) -> String {
    let text = match response {
        RawResponse::Text(text) => text.clone(),
        RawResponse::Json(value) => pretty(value),
    };
    normalize_text(text)
}

fn normalize_text(text: String) -> String {
    let Ok(value) = serde_json::from_str::<Value>(&text) else {
        return text;
    };

    match value {
        Value::Object(map) if has_recognized_field(&map) => pretty(&Value::Object(canonical_order(map))),
        Value::Object(map) if is_raw_wrapper(&map) => match map.into_iter().next() {
            Some((_, Value::String(raw))) => normalize_text(raw),
            _ => text,
        },
        other => pretty(&other),
    }
}

fn has_recognized_field(map: &Map<String, Value>) -> bool {
    ANALYSIS_FIELDS.iter().any(|field| map.contains_key(*field))
}

fn is_raw_wrapper(map: &Map<String, Value>) -> bool {
    map.len() == 1 && matches!(map.get("raw"), Some(Value::String(_)))
}

/// Recognized fields first in `ANALYSIS_FIELDS` order, then the rest as received
fn canonical_order(map: Map<String, Value>) -> Map<String, Value> {
    let mut ordered = Map::with_capacity(map.len());
    for field in ANALYSIS_FIELDS {
        if let Some(value) = map.get(field) {
            ordered.insert(field.to_string(), value.clone());
        }
    }
    ordered.extend(
        map.into_iter()
            .filter(|(key, _)| !ANALYSIS_FIELDS.contains(&key.as_str())),
    );
    ordered
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}
