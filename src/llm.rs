//! Language model transports.
//!
//! Two interchangeable ways to get a completion for a prompt:
//! - [`HttpTransport`]: a single JSON POST to a model service
//! - [`ProcessTransport`]: a local model runner fed through stdin
//!
//! Both are stateless per call; model name, token limit and timeout arrive
//! with each [`InvokeOptions`].

use std::io::{Read, Write};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::debug;

use crate::config::Config;

/// Result type for transport operations
pub type InvokeResult<T> = Result<T, InvokeError>;

/// Errors that can occur while invoking the model
#[derive(Debug, thiserror::Error)]
pub enum InvokeError {
    /// Request could not be sent or the body could not be read
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Model service answered with a non-success status
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// Runner executable could not be started
    #[error("failed to launch `{program}`: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Runner exited unsuccessfully
    #[error("runner exited with {}: {stderr}", .code.map(|c| c.to_string()).unwrap_or_else(|| "signal".to_string()))]
    ProcessFailed { code: Option<i32>, stderr: String },

    /// No completion within the configured timeout
    #[error("no response within {0:?}")]
    Timeout(Duration),

    /// IO error while talking to the runner
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Raw transport output, before normalization
#[derive(Debug, Clone, PartialEq)]
pub enum RawResponse {
    /// Verbatim text (runner stdout)
    Text(String),
    /// Structured body (HTTP)
    Json(Value),
}

impl RawResponse {
    /// `{"raw": text}`, the degraded shape for unstructured output
    pub fn raw(text: impl Into<String>) -> Self {
        RawResponse::Json(serde_json::json!({ "raw": text.into() }))
    }
}

/// Per-call invocation parameters
#[derive(Debug, Clone, PartialEq)]
pub struct InvokeOptions {
    pub model: String,
    pub max_tokens: u32,
    /// Upper bound for the whole call; `None` waits indefinitely
    pub timeout: Option<Duration>,
}

impl InvokeOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            timeout: config.timeout(),
        }
    }
}

/// A way of obtaining a completion for a prompt
pub trait ModelTransport {
    /// Short transport name for logs and summaries
    fn name(&self) -> &'static str;

    /// Send `prompt` to the model and return its raw output
    fn invoke(&self, prompt: &str, options: &InvokeOptions) -> InvokeResult<RawResponse>;
}

/// Pick the transport the configuration asks for: HTTP when an endpoint is
/// set, the local runner otherwise
pub fn select_transport(config: &Config) -> InvokeResult<Box<dyn ModelTransport>> {
    match &config.endpoint {
        Some(endpoint) => Ok(Box::new(
            HttpTransport::new(endpoint)?.api_path(&config.api_path),
        )),
        None => Ok(Box::new(
            ProcessTransport::new(&config.runner).args_template(&config.runner_args),
        )),
    }
}

// ============================================================================
// HTTP
// ============================================================================

/// POSTs `{model, prompt, max_tokens}` to `<endpoint><api_path>`
#[derive(Debug, Clone)]
pub struct HttpTransport {
    endpoint: String,
    api_path: String,
    client: reqwest::blocking::Client,
}

impl HttpTransport {
    pub fn new(endpoint: impl Into<String>) -> InvokeResult<Self> {
        Ok(Self {
            endpoint: endpoint.into(),
            api_path: crate::config::DEFAULT_API_PATH.to_string(),
            // Only the per-call timeout in `InvokeOptions` bounds a request.
            client: reqwest::blocking::Client::builder()
                .timeout(None::<Duration>)
                .build()?,
        })
    }

    pub fn api_path(mut self, api_path: impl Into<String>) -> Self {
        self.api_path = api_path.into();
        self
    }

    /// Full request URL
    pub fn url(&self) -> String {
        let base = self.endpoint.trim_end_matches('/');
        if self.api_path.is_empty() || self.api_path.starts_with('/') {
            format!("{}{}", base, self.api_path)
        } else {
            format!("{}/{}", base, self.api_path)
        }
    }
}

impl ModelTransport for HttpTransport {
    fn name(&self) -> &'static str {
        "http"
    }

    fn invoke(&self, prompt: &str, options: &InvokeOptions) -> InvokeResult<RawResponse> {
        let body = serde_json::json!({
            "model": options.model,
            "prompt": prompt,
            "max_tokens": options.max_tokens,
        });

        let mut request = self.client.post(self.url()).json(&body);
        if let Some(timeout) = options.timeout {
            request = request.timeout(timeout);
        }

        let map_err = |e: reqwest::Error| match options.timeout {
            Some(timeout) if e.is_timeout() => InvokeError::Timeout(timeout),
            _ => InvokeError::Http(e),
        };

        let response = request.send().map_err(map_err)?;
        let status = response.status();
        let text = response.text().map_err(map_err)?;

        if !status.is_success() {
            return Err(InvokeError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        debug!("model service answered {} ({} bytes)", status, text.len());
        match serde_json::from_str::<Value>(&text) {
            Ok(json) => Ok(RawResponse::Json(json)),
            Err(_) => Ok(RawResponse::raw(text)),
        }
    }
}

// ============================================================================
// Local process
// ============================================================================

/// How often a running child is polled for exit
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Runs a local model runner, writing the prompt to its stdin
#[derive(Debug, Clone)]
pub struct ProcessTransport {
    program: String,
    args_template: String,
}

impl ProcessTransport {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args_template: crate::config::DEFAULT_RUNNER_ARGS.to_string(),
        }
    }

    /// Whitespace-separated argument template; `{model}` and `{max_tokens}`
    /// are substituted per call
    pub fn args_template(mut self, template: impl Into<String>) -> Self {
        self.args_template = template.into();
        self
    }

    /// Arguments for one invocation
    pub fn build_args(&self, options: &InvokeOptions) -> Vec<String> {
        let max_tokens = options.max_tokens.to_string();
        self.args_template
            .split_whitespace()
            .map(|arg| {
                arg.replace("{model}", &options.model)
                    .replace("{max_tokens}", &max_tokens)
            })
            .collect()
    }
}

impl ModelTransport for ProcessTransport {
    fn name(&self) -> &'static str {
        "process"
    }

    fn invoke(&self, prompt: &str, options: &InvokeOptions) -> InvokeResult<RawResponse> {
        let args = self.build_args(options);
        debug!("spawning {} {:?}", self.program, args);

        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| InvokeError::Launch {
                program: self.program.clone(),
                source,
            })?;

        // stdin, stdout and stderr each get a thread so no pipe can fill up.
        // The writer is never joined; a runner may exit without draining stdin.
        if let Some(mut stdin) = child.stdin.take() {
            let prompt = prompt.to_owned();
            thread::spawn(move || {
                let _ = stdin.write_all(prompt.as_bytes());
            });
        }
        let stdout = child.stdout.take().map(spawn_reader);
        let stderr = child.stderr.take().map(spawn_reader);

        let started = Instant::now();
        let status = wait_with_timeout(&mut child, started, options.timeout)?;

        // A descendant of the runner can keep the pipes open after it exits.
        let stdout = collect_output(stdout, started, options.timeout)?;
        let stderr = collect_output(stderr, started, options.timeout)?;

        if !status.success() {
            return Err(InvokeError::ProcessFailed {
                code: status.code(),
                stderr: stderr.trim().to_string(),
            });
        }
        Ok(RawResponse::Text(stdout))
    }
}

type OutputReceiver = mpsc::Receiver<std::io::Result<Vec<u8>>>;

fn spawn_reader<R: Read + Send + 'static>(mut source: R) -> OutputReceiver {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut buf = Vec::new();
        let result = source.read_to_end(&mut buf).map(|_| buf);
        let _ = tx.send(result);
    });
    rx
}

/// Wait for a reader to reach end of stream, within what is left of the timeout
fn collect_output(
    rx: Option<OutputReceiver>,
    started: Instant,
    timeout: Option<Duration>,
) -> InvokeResult<String> {
    let Some(rx) = rx else {
        return Ok(String::new());
    };

    let received = match timeout {
        None => rx.recv().map_err(|_| reader_gone()),
        Some(timeout) => {
            let remaining = timeout.saturating_sub(started.elapsed()).max(POLL_INTERVAL);
            match rx.recv_timeout(remaining) {
                Ok(result) => Ok(result),
                Err(mpsc::RecvTimeoutError::Timeout) => return Err(InvokeError::Timeout(timeout)),
                Err(mpsc::RecvTimeoutError::Disconnected) => Err(reader_gone()),
            }
        }
    };

    let bytes = received??;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn reader_gone() -> std::io::Error {
    std::io::Error::other("output reader thread stopped without a result")
}

fn wait_with_timeout(
    child: &mut Child,
    started: Instant,
    timeout: Option<Duration>,
) -> InvokeResult<ExitStatus> {
    let Some(timeout) = timeout else {
        return Ok(child.wait()?);
    };

    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(status);
        }
        if started.elapsed() > timeout {
            let _ = child.kill();
            let _ = child.wait();
            return Err(InvokeError::Timeout(timeout));
        }
        thread::sleep(POLL_INTERVAL);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use pretty_assertions::assert_eq;

    fn options() -> InvokeOptions {
        InvokeOptions {
            model: "llama3".to_string(),
            max_tokens: 800,
            timeout: None,
        }
    }

    #[test]
    fn test_http_url_join() {
        let t = HttpTransport::new("http://localhost:11434/").unwrap();
        assert_eq!(t.url(), "http://localhost:11434/api/generate");
        let t = t.api_path("v1/completions");
        assert_eq!(t.url(), "http://localhost:11434/v1/completions");
    }

    #[test]
    fn test_http_posts_expected_body() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/api/generate")
                .json_body(serde_json::json!({
                    "model": "llama3",
                    "prompt": "why did it fail?",
                    "max_tokens": 800
                }));
            then.status(200)
                .header("content-type", "application/json")
                .body(r#"{"summary": "null pointer"}"#);
        });

        let transport = HttpTransport::new(server.base_url()).unwrap();
        let response = transport.invoke("why did it fail?", &options()).unwrap();

        mock.assert();
        assert_eq!(
            response,
            RawResponse::Json(serde_json::json!({"summary": "null pointer"}))
        );
    }

    #[test]
    fn test_http_plain_text_body_is_wrapped() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/api/generate");
            then.status(200).body("the login button moved");
        });

        let transport = HttpTransport::new(server.base_url()).unwrap();
        let response = transport.invoke("p", &options()).unwrap();
        assert_eq!(response, RawResponse::raw("the login button moved"));
    }

    #[test]
    fn test_http_error_status() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/api/generate");
            then.status(500).body("model not loaded");
        });

        let transport = HttpTransport::new(server.base_url()).unwrap();
        match transport.invoke("p", &options()) {
            Err(InvokeError::Status { status, body }) => {
                assert_eq!(status, 500);
                assert_eq!(body, "model not loaded");
            }
            other => panic!("expected status error, got {:?}", other),
        }
    }

    #[test]
    fn test_http_timeout_is_reported_as_timeout() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/api/generate");
            then.status(200).delay(Duration::from_secs(3)).body("late");
        });

        let transport = HttpTransport::new(server.base_url()).unwrap();
        let opts = InvokeOptions {
            timeout: Some(Duration::from_millis(300)),
            ..options()
        };
        assert!(matches!(
            transport.invoke("p", &opts),
            Err(InvokeError::Timeout(t)) if t == Duration::from_millis(300)
        ));
    }

    #[test]
    fn test_http_without_timeout_waits_for_slow_model() {
        // Longer than reqwest's built-in client default of 30 s
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/api/generate");
            then.status(200)
                .delay(Duration::from_secs(32))
                .body(r#"{"summary": "slow but fine"}"#);
        });

        let transport = HttpTransport::new(server.base_url()).unwrap();
        let response = transport.invoke("p", &options()).unwrap();
        assert_eq!(
            response,
            RawResponse::Json(serde_json::json!({"summary": "slow but fine"}))
        );
    }

    #[test]
    fn test_build_args_substitutes_placeholders() {
        let t = ProcessTransport::new("ollama");
        assert_eq!(
            t.build_args(&options()),
            vec!["run", "llama3", "--max-tokens", "800"]
        );
    }

    #[test]
    fn test_launch_failure() {
        let t = ProcessTransport::new("/definitely/not/a/runner");
        assert!(matches!(
            t.invoke("p", &options()),
            Err(InvokeError::Launch { .. })
        ));
    }

    #[test]
    fn test_select_transport() {
        let config = Config::defaults();
        assert_eq!(select_transport(&config).unwrap().name(), "process");
        let config = config.endpoint("http://127.0.0.1:11434");
        assert_eq!(select_transport(&config).unwrap().name(), "http");
    }

    #[cfg(unix)]
    mod runner {
        use super::*;
        use pretty_assertions::assert_eq;

        /// A transport running `body` as a shell script through `/bin/sh`
        fn script(dir: &tempfile::TempDir, body: &str) -> ProcessTransport {
            let path = dir.path().join("runner.sh");
            std::fs::write(&path, format!("{}\n", body)).unwrap();
            ProcessTransport::new("/bin/sh").args_template(format!(
                "{} {}",
                path.display(),
                crate::config::DEFAULT_RUNNER_ARGS
            ))
        }

        #[test]
        fn test_prompt_goes_through_stdin() {
            let dir = tempfile::tempdir().unwrap();
            let t = script(&dir, r#"echo "args: $*"; cat"#);

            let response = t.invoke("line one\nline two", &options()).unwrap();
            assert_eq!(
                response,
                RawResponse::Text("args: run llama3 --max-tokens 800\nline one\nline two".to_string())
            );
        }

        #[test]
        fn test_nonzero_exit() {
            let dir = tempfile::tempdir().unwrap();
            let t = script(&dir, "echo 'model missing' >&2; exit 3");

            match t.invoke("p", &options()) {
                Err(InvokeError::ProcessFailed { code, stderr }) => {
                    assert_eq!(code, Some(3));
                    assert_eq!(stderr, "model missing");
                }
                other => panic!("expected process failure, got {:?}", other),
            }
        }

        #[test]
        fn test_timeout_kills_runner() {
            let dir = tempfile::tempdir().unwrap();
            let t = script(&dir, "exec sleep 5");
            let opts = InvokeOptions {
                timeout: Some(Duration::from_millis(200)),
                ..options()
            };

            let started = Instant::now();
            assert!(matches!(t.invoke("p", &opts), Err(InvokeError::Timeout(_))));
            assert!(started.elapsed() < Duration::from_secs(4));
        }

        #[test]
        fn test_timeout_covers_output_held_by_descendant() {
            let dir = tempfile::tempdir().unwrap();
            let t = script(&dir, "sleep 20 & echo started; exit 0");
            let opts = InvokeOptions {
                timeout: Some(Duration::from_secs(1)),
                ..options()
            };

            let started = Instant::now();
            assert!(matches!(t.invoke("p", &opts), Err(InvokeError::Timeout(_))));
            assert!(started.elapsed() < Duration::from_secs(10));
        }
    }
}
