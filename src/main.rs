use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use failure_triage::config::Config;
use failure_triage::pipeline::{self, CancellationToken, EXIT_OK, RecordOutcome, RunSummary};

/// Failure Triage - attach language model diagnoses to failed test results
#[derive(Parser, Debug)]
#[command(
    name = "failure-triage",
    about = "Attach language model failure analyses to failed test result records",
    after_help = "ENVIRONMENT VARIABLES:\n\
        FAILURE_TRIAGE_RESULTS_DIR   Results directory\n\
        FAILURE_TRIAGE_MODEL         Model name\n\
        FAILURE_TRIAGE_ENDPOINT      Model service URL (selects HTTP transport)\n\
        FAILURE_TRIAGE_API_PATH      API path appended to the endpoint\n\
        FAILURE_TRIAGE_MAX_TOKENS    Token limit per analysis\n\
        FAILURE_TRIAGE_TIMEOUT       Transport timeout (seconds)\n\
        FAILURE_TRIAGE_RUNNER        Local model runner executable\n\
        FAILURE_TRIAGE_RUNNER_ARGS   Runner argument template\n\
        RUST_LOG                     Log filter (overrides --verbose)"
)]
struct Args {
    /// Directory of result records (default: allure-results)
    #[arg(short, long)]
    results_dir: Option<PathBuf>,

    /// Model name
    #[arg(short, long)]
    model: Option<String>,

    /// Model service base URL; without one the local runner is used
    #[arg(short, long)]
    endpoint: Option<String>,

    /// API path appended to the endpoint
    #[arg(long)]
    api_path: Option<String>,

    /// Token limit per analysis
    #[arg(long)]
    max_tokens: Option<u32>,

    /// Transport timeout in seconds (at least 1)
    #[arg(short, long, value_parser = clap::value_parser!(u64).range(1..))]
    timeout: Option<u64>,

    /// Local model runner executable
    #[arg(long)]
    runner: Option<String>,

    /// Output the run summary as JSON
    #[arg(long)]
    json: bool,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    /// Layer command line flags over the environment configuration
    fn into_config(self, mut config: Config) -> Config {
        if let Some(dir) = self.results_dir {
            config = config.results_dir(dir);
        }
        if let Some(model) = self.model {
            config = config.model(model);
        }
        if let Some(endpoint) = self.endpoint {
            config = config.endpoint(endpoint);
        }
        if let Some(api_path) = self.api_path {
            config = config.api_path(api_path);
        }
        if let Some(max_tokens) = self.max_tokens {
            config = config.max_tokens(max_tokens);
        }
        if let Some(timeout) = self.timeout {
            config = config.timeout_secs(timeout);
        }
        if let Some(runner) = self.runner {
            config = config.runner(runner);
        }
        config
    }
}

fn main() -> ExitCode {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let json = args.json;
    let config = args.into_config(failure_triage::config::get().clone());

    let cancel = CancellationToken::new();
    install_interrupt_handler(cancel.clone());

    let summary = match pipeline::run(&config, cancel) {
        Ok(summary) => summary,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::from(e.exit_code());
        }
    };

    if json {
        match serde_json::to_string_pretty(&summary) {
            Ok(text) => println!("{}", text),
            Err(e) => eprintln!("Warning: could not serialize summary: {}", e),
        }
    } else {
        print_summary(&summary);
    }

    ExitCode::from(EXIT_OK)
}

/// Cancel the batch on Ctrl-C; the record being processed still finishes
fn install_interrupt_handler(cancel: CancellationToken) {
    std::thread::spawn(move || {
        let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
            Ok(runtime) => runtime,
            Err(e) => {
                tracing::warn!("Ctrl-C handling unavailable: {}", e);
                return;
            }
        };
        runtime.block_on(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupt received, stopping after the current record");
                cancel.cancel();
            }
        });
    });
}

fn print_summary(summary: &RunSummary) {
    if summary.discovered == 0 {
        println!("No failed or broken results in {}", summary.results_dir.display());
        return;
    }

    println!(
        "Analyzed {} of {} failed result(s) via {} transport",
        summary.records.len(),
        summary.discovered,
        summary.transport
    );
    for report in &summary.records {
        let status = match &report.outcome {
            RecordOutcome::Attached => "attached".to_string(),
            RecordOutcome::AlreadyPresent => "already present".to_string(),
            RecordOutcome::Failed { message } => format!("failed: {}", message),
        };
        let degraded = if report.degraded { " (degraded)" } else { "" };
        println!("  {} -> {} [{}]{}", report.id, report.analysis_file, status, degraded);
        if !report.headline.is_empty() {
            println!("    {}", report.headline);
        }
    }
    if summary.cancelled {
        println!("Run cancelled before all results were analyzed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_timeout_is_rejected() {
        assert!(Args::try_parse_from(["failure-triage", "--timeout", "0"]).is_err());

        let args = Args::try_parse_from(["failure-triage", "--timeout", "45"]).unwrap();
        let config = args.into_config(Config::defaults());
        assert_eq!(config.timeout(), Some(std::time::Duration::from_secs(45)));
    }
}
