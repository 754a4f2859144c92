//! Configuration management with environment variable support.
//!
//! This module provides centralized configuration for the triage pipeline:
//! - Environment variables for all configurable values
//! - Sensible defaults for a local model setup
//! - Builder methods so the CLI can layer its flags on top
//!
//! # Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `FAILURE_TRIAGE_RESULTS_DIR` | Directory holding result records | `allure-results` |
//! | `FAILURE_TRIAGE_MODEL` | Model name passed to the transport | `llama3` |
//! | `FAILURE_TRIAGE_ENDPOINT` | Model service base URL (selects HTTP) | unset |
//! | `FAILURE_TRIAGE_API_PATH` | Path appended to the endpoint | `/api/generate` |
//! | `FAILURE_TRIAGE_MAX_TOKENS` | Token limit for each completion | `800` |
//! | `FAILURE_TRIAGE_TIMEOUT` | Per-call transport timeout in seconds | unset |
//! | `FAILURE_TRIAGE_RUNNER` | Local model runner executable | `ollama` |
//! | `FAILURE_TRIAGE_RUNNER_ARGS` | Runner argument template | `run {model} --max-tokens {max_tokens}` |
//!
//! # Example
//!
//! ```bash
//! # Talk to an HTTP model service instead of spawning the runner
//! export FAILURE_TRIAGE_ENDPOINT="http://127.0.0.1:11434"
//! export FAILURE_TRIAGE_MODEL="qwen3"
//! ```

use std::env;
use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;

// ============================================================================
// Default Values
// ============================================================================

/// Default results directory
pub const DEFAULT_RESULTS_DIR: &str = "allure-results";

/// Default model name
pub const DEFAULT_MODEL: &str = "llama3";

/// Default API path for the HTTP transport
pub const DEFAULT_API_PATH: &str = "/api/generate";

/// Default max tokens for a completion
pub const DEFAULT_MAX_TOKENS: u32 = 800;

/// Default local model runner executable
pub const DEFAULT_RUNNER: &str = "ollama";

/// Default runner argument template
pub const DEFAULT_RUNNER_ARGS: &str = "run {model} --max-tokens {max_tokens}";

// ============================================================================
// Environment Variable Names
// ============================================================================

pub const ENV_RESULTS_DIR: &str = "FAILURE_TRIAGE_RESULTS_DIR";
pub const ENV_MODEL: &str = "FAILURE_TRIAGE_MODEL";
pub const ENV_ENDPOINT: &str = "FAILURE_TRIAGE_ENDPOINT";
pub const ENV_API_PATH: &str = "FAILURE_TRIAGE_API_PATH";
pub const ENV_MAX_TOKENS: &str = "FAILURE_TRIAGE_MAX_TOKENS";
pub const ENV_TIMEOUT: &str = "FAILURE_TRIAGE_TIMEOUT";
pub const ENV_RUNNER: &str = "FAILURE_TRIAGE_RUNNER";
pub const ENV_RUNNER_ARGS: &str = "FAILURE_TRIAGE_RUNNER_ARGS";

/// Legacy endpoint variable shared with the report tooling
pub const ENV_ENDPOINT_LEGACY: &str = "LLM_ENDPOINT";

static CONFIG: OnceLock<Config> = OnceLock::new();

/// Get the global configuration (initialized from environment on first access)
pub fn get() -> &'static Config {
    CONFIG.get_or_init(Config::from_env)
}

/// Centralized configuration for a triage run
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Directory holding the result records
    pub results_dir: PathBuf,
    /// Model name
    pub model: String,
    /// Model service base URL; presence selects the HTTP transport
    pub endpoint: Option<String>,
    /// Path appended to the endpoint
    pub api_path: String,
    /// Maximum tokens in a completion
    pub max_tokens: u32,
    /// Per-call transport timeout (seconds), unbounded when unset or zero
    pub timeout_secs: Option<u64>,
    /// Local model runner executable
    pub runner: String,
    /// Runner argument template with `{model}` and `{max_tokens}` placeholders
    pub runner_args: String,
}

impl Config {
    /// Create configuration from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        Self::from_vars(|name| env::var(name).ok())
    }

    /// Create configuration from an arbitrary variable lookup.
    ///
    /// Empty values count as unset.
    pub fn from_vars<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        Self {
            results_dir: var(ENV_RESULTS_DIR)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_RESULTS_DIR)),
            model: var(ENV_MODEL).unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            endpoint: var(ENV_ENDPOINT).or_else(|| var(ENV_ENDPOINT_LEGACY)),
            api_path: var(ENV_API_PATH).unwrap_or_else(|| DEFAULT_API_PATH.to_string()),
            max_tokens: var(ENV_MAX_TOKENS)
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(DEFAULT_MAX_TOKENS),
            timeout_secs: var(ENV_TIMEOUT)
                .and_then(|s| s.trim().parse().ok())
                .filter(|&secs| secs > 0),
            runner: var(ENV_RUNNER).unwrap_or_else(|| DEFAULT_RUNNER.to_string()),
            runner_args: var(ENV_RUNNER_ARGS).unwrap_or_else(|| DEFAULT_RUNNER_ARGS.to_string()),
        }
    }

    /// Create configuration with all defaults (ignoring environment)
    pub fn defaults() -> Self {
        Self::from_vars(|_| None)
    }

    pub fn results_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.results_dir = dir.into();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn api_path(mut self, api_path: impl Into<String>) -> Self {
        self.api_path = api_path.into();
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn timeout_secs(mut self, seconds: u64) -> Self {
        self.timeout_secs = Some(seconds);
        self
    }

    pub fn runner(mut self, runner: impl Into<String>) -> Self {
        self.runner = runner.into();
        self
    }

    pub fn runner_args(mut self, template: impl Into<String>) -> Self {
        self.runner_args = template.into();
        self
    }

    /// Transport timeout as a `Duration`; zero means no timeout
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs
            .filter(|&secs| secs > 0)
            .map(Duration::from_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::defaults()
    }
}
