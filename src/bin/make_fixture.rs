use std::path::PathBuf;

use serde_json::json;

/// Writes a failing and a passing result record so the triage pipeline can be
/// tried without a browser test run.
fn main() {
    let dir = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(failure_triage::config::DEFAULT_RESULTS_DIR));

    if let Err(e) = write_fixtures(&dir) {
        eprintln!("Failed to write fixtures: {}", e);
        std::process::exit(1);
    }
    println!("Wrote fixture results to {}", dir.display());
}

fn write_fixtures(dir: &std::path::Path) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)?;

    let now = chrono::Utc::now().timestamp_millis();
    let trace: String = "    at Object.<anonymous> (features/step_definitions/steps.js:12:5)\n"
        .chars()
        .cycle()
        .take(5000)
        .collect();

    let failing = json!({
        "uuid": "fake-failing-0001",
        "name": "Fake failing scenario",
        "fullName": "features/fake.feature: Fake failing scenario",
        "status": "failed",
        "statusDetails": {
            "message": "TypeError: foo is not a function",
            "trace": trace,
        },
        "stage": "finished",
        "start": now - 1500,
        "stop": now,
        "steps": [
            {"name": "Given I do something", "status": "passed", "stage": "finished"},
            {
                "name": "When I trigger failure",
                "status": "failed",
                "stage": "finished",
                "statusDetails": {"message": "TypeError: foo is not a function"}
            }
        ],
        "attachments": [],
        "labels": [{"name": "feature", "value": "Fake"}]
    });

    let passing = json!({
        "uuid": "fake-passing-0001",
        "name": "Fake passing scenario",
        "status": "passed",
        "stage": "finished",
        "start": now - 800,
        "stop": now,
        "steps": [{"name": "Given everything works", "status": "passed"}],
        "attachments": []
    });

    for (name, record) in [
        ("fake-failing-0001-result.json", failing),
        ("fake-passing-0001-result.json", passing),
    ] {
        let text = serde_json::to_string_pretty(&record).map_err(std::io::Error::other)?;
        std::fs::write(dir.join(name), text)?;
    }
    Ok(())
}
