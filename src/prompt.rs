//! Prompt construction for failure analysis.

use std::fmt::Write;

use crate::results::{ResultRecord, TestStatus};

/// Traces longer than this many characters are cut off
pub const MAX_TRACE_CHARS: usize = 3000;

const PREAMBLE: &str = "You are a senior test automation engineer diagnosing a failed automated test.\n\
Respond with JSON only, no prose outside the JSON object, using these fields:\n\
- summary: one or two sentences describing what went wrong\n\
- probable_root_cause: the most likely underlying cause\n\
- confidence: low, medium or high\n\
- suggested_fix: how to fix the cause\n\
- immediate_workaround: how to unblock the test run now\n\
- files_to_change: array of file paths likely involved\n\
- allure_attachment: a short markdown report for the test report";

/// Build the analysis prompt for one result record.
///
/// The output depends only on the record, so the same record always yields
/// byte-identical text.
pub fn build_analysis_prompt(record: &ResultRecord) -> String {
    let mut prompt = String::from(PREAMBLE);
    prompt.push_str("\n\n");

    let _ = writeln!(prompt, "Test name: {}", record.name());
    if let Some(full_name) = record.full_name() {
        let _ = writeln!(prompt, "Full name: {}", full_name);
    }

    let failure = record.failure().unwrap_or_default();
    if let Some(message) = failure.message.as_deref().filter(|m| !m.is_empty()) {
        let _ = writeln!(prompt, "Error message: {}", message);
    }

    let steps = record.steps();
    if !steps.is_empty() {
        prompt.push_str("\nSteps:\n");
        for (index, step) in steps.iter().enumerate() {
            let _ = writeln!(
                prompt,
                "{}. {} - {}",
                index + 1,
                step.name.as_deref().unwrap_or("(unnamed step)"),
                step.status.as_deref().unwrap_or("unknown"),
            );
            if step.status() == TestStatus::Failed {
                if let Some(message) = step.failure_message() {
                    let _ = writeln!(prompt, "   Step error: {}", message);
                }
            }
        }
    }

    if let Some(trace) = failure.trace.as_deref().filter(|t| !t.is_empty()) {
        let _ = writeln!(prompt, "\nStack trace:\n{}", truncate_chars(trace, MAX_TRACE_CHARS));
    }

    prompt
}

/// First `max` characters of `text`
fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn record(value: serde_json::Value) -> ResultRecord {
        ResultRecord::parse("fake-result.json", &value.to_string()).unwrap()
    }

    #[test]
    fn test_prompt_lists_steps_in_order() {
        let rec = record(serde_json::json!({
            "status": "failed",
            "name": "Fake failing scenario",
            "statusDetails": {"message": "TypeError: foo is not a function"},
            "steps": [
                {"name": "Given I do something", "status": "passed"},
                {"name": "When I trigger failure", "status": "failed",
                 "statusDetails": {"message": "TypeError: foo is not a function"}}
            ]
        }));
        let prompt = build_analysis_prompt(&rec);

        assert!(prompt.starts_with(PREAMBLE));
        assert!(prompt.contains("JSON only"));
        assert!(prompt.contains("Test name: Fake failing scenario\n"));
        assert!(prompt.contains("Error message: TypeError: foo is not a function\n"));
        assert!(prompt.contains(
            "1. Given I do something - passed\n\
             2. When I trigger failure - failed\n   \
             Step error: TypeError: foo is not a function\n"
        ));
        assert!(!prompt.contains("Full name:"));
        assert!(!prompt.contains("Stack trace:"));
    }

    #[test]
    fn test_step_error_only_for_failed_steps() {
        let rec = record(serde_json::json!({
            "status": "broken",
            "name": "n",
            "steps": [
                {"name": "s1", "status": "broken", "statusDetails": {"message": "hidden"}},
                {"name": "s2", "status": "failed"}
            ]
        }));
        let prompt = build_analysis_prompt(&rec);
        assert!(prompt.contains("1. s1 - broken\n2. s2 - failed\n"));
        assert!(!prompt.contains("Step error"));
    }

    #[test]
    fn test_trace_truncated_to_limit() {
        let trace: String = (0..5000).map(|i| char::from(b'a' + (i % 26) as u8)).collect();
        let rec = record(serde_json::json!({
            "status": "failed",
            "name": "long trace",
            "statusDetails": {"trace": trace}
        }));
        let prompt = build_analysis_prompt(&rec);
        let section = prompt.split("Stack trace:\n").nth(1).unwrap();
        assert_eq!(section.trim_end_matches('\n'), &trace[..MAX_TRACE_CHARS]);
    }

    #[test]
    fn test_truncate_chars_multibyte() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
    }

    #[test]
    fn test_prompt_is_deterministic() {
        let value = serde_json::json!({
            "status": "failed",
            "name": "again",
            "fullName": "suite.again",
            "statusDetails": {"message": "m", "trace": "t"},
            "steps": [{"name": "a", "status": "passed"}]
        });
        assert_eq!(
            build_analysis_prompt(&record(value.clone())),
            build_analysis_prompt(&record(value))
        );
    }
}
