//! Sandboxed JavaScript execution
//!
//! Each evaluation runs in a child process: the running binary re-executed
//! with the hidden `sandbox-eval` subcommand. The child reads one
//! [`EvaluationRequest`] as JSON on stdin, caps its own CPU time and
//! address space, evaluates the code in a fresh `boa_engine` context with
//! no host bindings, and writes one [`EvaluationReply`] on stdout. The
//! parent kills the child when the wall-clock timeout expires.
//!
//! Several strategies are tried in order until one succeeds:
//!
//! 1. expression: `(code)`
//! 2. statement block: the script's completion value
//! 3. function body: `(function(){ code })()`
//! 4. line by line in one shared context, skipping lines that fail

use std::collections::HashMap;
use std::fmt;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use boa_engine::{Context, JsValue, Source};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::agent::tools::types::{Tool, ToolError, ToolResult};
use crate::config::SandboxSettings;

/// Hidden CLI subcommand served by the sandbox child
pub const SANDBOX_SUBCOMMAND: &str = "sandbox-eval";

/// Result text for code that evaluates to `undefined`
pub const SUCCESS_MESSAGE: &str = "Code executed successfully";

/// Evaluation result handed back to the model
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EvaluationOutput {
    pub result: Value,
    #[serde(rename = "type")]
    pub kind: String,
    pub executed: bool,
    /// Lines skipped by the line-by-line strategy
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<String>,
}

/// What the parent sends the child on stdin
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EvaluationRequest {
    pub code: String,
    #[serde(default)]
    pub settings: SandboxSettings,
}

impl EvaluationRequest {
    /// Runs the request in-process
    pub fn evaluate(&self) -> EvaluationReply {
        match Sandbox::new(self.settings.clone()).evaluate(&self.code) {
            Ok(output) => EvaluationReply::Ok(output),
            Err(ToolError::Evaluation(message)) => EvaluationReply::Error(message),
            Err(other) => EvaluationReply::Error(other.to_string()),
        }
    }
}

/// What the child writes on stdout: `{"ok": {...}}` or `{"error": "..."}`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationReply {
    Ok(EvaluationOutput),
    Error(String),
}

impl EvaluationReply {
    pub fn into_result(self) -> ToolResult<EvaluationOutput> {
        match self {
            EvaluationReply::Ok(output) => Ok(output),
            EvaluationReply::Error(message) => Err(ToolError::Evaluation(message)),
        }
    }
}

/// Child side of `execute_javascript`: one request in, one reply out
///
/// Resource limits are applied to the current process after the request is
/// read, so only call this from the `sandbox-eval` subcommand.
pub fn serve_evaluation<R: Read, W: Write>(reader: R, mut writer: W) -> io::Result<()> {
    let request: EvaluationRequest = serde_json::from_reader(reader)?;
    apply_resource_limits(&request.settings)?;

    let reply = request.evaluate();
    serde_json::to_writer(&mut writer, &reply)?;
    writer.flush()
}

/// Caps CPU seconds and address space of the current process
///
/// Soft limits never exceed the existing hard limits.
#[cfg(unix)]
pub fn apply_resource_limits(settings: &SandboxSettings) -> io::Result<()> {
    let cpu_seconds = settings.timeout_ms.div_ceil(1000) + 1;
    let mut limits = vec![(libc::RLIMIT_CPU, cpu_seconds)];
    if settings.memory_limit_mb > 0 {
        limits.push((
            libc::RLIMIT_AS,
            settings.memory_limit_mb.saturating_mul(1024 * 1024),
        ));
    }

    for (resource, value) in limits {
        let mut current = libc::rlimit {
            rlim_cur: 0,
            rlim_max: 0,
        };
        // SAFETY: `current` is a valid, writable rlimit for the whole call
        if unsafe { libc::getrlimit(resource, &mut current) } != 0 {
            return Err(io::Error::last_os_error());
        }

        let wanted = (value as libc::rlim_t).min(current.rlim_max);
        let limit = libc::rlimit {
            rlim_cur: wanted,
            rlim_max: current.rlim_max,
        };
        // SAFETY: `limit` is a valid rlimit for the whole call
        if unsafe { libc::setrlimit(resource, &limit) } != 0 {
            return Err(io::Error::last_os_error());
        }
    }

    Ok(())
}

#[cfg(not(unix))]
pub fn apply_resource_limits(_settings: &SandboxSettings) -> io::Result<()> {
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Strategy {
    Expression,
    StatementBlock,
    FunctionBody,
    LineByLine,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Strategy::Expression => "expression",
            Strategy::StatementBlock => "statement_block",
            Strategy::FunctionBody => "function_body",
            Strategy::LineByLine => "line_by_line",
        };
        f.write_str(name)
    }
}

/// Synchronous evaluator used inside the sandbox child
#[derive(Debug, Clone)]
pub struct Sandbox {
    settings: SandboxSettings,
}

impl Sandbox {
    pub fn new(settings: SandboxSettings) -> Self {
        Self { settings }
    }

    fn context(&self) -> Context {
        let mut context = Context::default();
        let limits = context.runtime_limits_mut();
        limits.set_loop_iteration_limit(self.settings.loop_iteration_limit);
        limits.set_recursion_limit(self.settings.recursion_limit);
        context
    }

    /// Tries each strategy in turn, returning the first success
    pub fn evaluate(&self, code: &str) -> ToolResult<EvaluationOutput> {
        let attempts = [
            (Strategy::Expression, format!("(\n{}\n)", code)),
            (Strategy::StatementBlock, code.to_string()),
            (Strategy::FunctionBody, format!("(function(){{\n{}\n}})()", code)),
        ];

        let mut last_error = String::new();

        for (strategy, source) in attempts {
            let mut context = self.context();
            match context.eval(Source::from_bytes(source.as_bytes())) {
                Ok(value) => {
                    tracing::debug!(strategy = %strategy, "JavaScript evaluated");
                    let (result, kind) = describe(&value, &mut context);
                    return Ok(EvaluationOutput {
                        result,
                        kind,
                        executed: true,
                        diagnostics: Vec::new(),
                    });
                }
                Err(e) => {
                    last_error = e.to_string();
                    tracing::debug!(strategy = %strategy, error = %last_error, "Strategy failed");
                }
            }
        }

        self.evaluate_lines(code).map_err(|line_error| {
            ToolError::Evaluation(line_error.unwrap_or(last_error))
        })
    }

    /// Line-by-line fallback. On total failure returns the last line error.
    fn evaluate_lines(&self, code: &str) -> Result<EvaluationOutput, Option<String>> {
        let mut context = self.context();
        let mut last_value = None;
        let mut diagnostics = Vec::new();
        let mut last_error = None;

        for (index, line) in code.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }

            match context.eval(Source::from_bytes(line.as_bytes())) {
                Ok(value) => last_value = Some(value),
                Err(e) => {
                    let message = format!("line {}: {}", index + 1, e);
                    tracing::debug!(strategy = %Strategy::LineByLine, error = %message, "Skipping line");
                    last_error = Some(e.to_string());
                    diagnostics.push(message);
                }
            }
        }

        match last_value {
            Some(value) => {
                if !diagnostics.is_empty() {
                    tracing::warn!(skipped = diagnostics.len(), "JavaScript lines skipped");
                }
                let (result, kind) = describe(&value, &mut context);
                Ok(EvaluationOutput {
                    result,
                    kind,
                    executed: true,
                    diagnostics,
                })
            }
            None => Err(last_error),
        }
    }
}

/// JSON form and `typeof` name of a JS value
fn describe(value: &JsValue, context: &mut Context) -> (Value, String) {
    let kind = type_name(value);

    let result = if value.is_undefined() {
        Value::String(SUCCESS_MESSAGE.to_string())
    } else if value.is_null() {
        Value::Null
    } else if let Some(b) = value.as_boolean() {
        Value::Bool(b)
    } else if let Some(s) = value.as_string() {
        Value::String(s.to_std_string_escaped())
    } else if let Some(n) = value.as_number() {
        number_to_json(n)
    } else if value.is_object() && !value.is_callable() {
        value
            .to_json(context)
            .unwrap_or_else(|_| Value::String(value.display().to_string()))
    } else {
        Value::String(value.display().to_string())
    };

    (result, kind.to_string())
}

fn type_name(value: &JsValue) -> &'static str {
    if value.is_undefined() {
        "undefined"
    } else if value.is_boolean() {
        "boolean"
    } else if value.is_string() {
        "string"
    } else if value.is_number() {
        "number"
    } else if value.is_bigint() {
        "bigint"
    } else if value.is_symbol() {
        "symbol"
    } else if value.is_callable() {
        "function"
    } else {
        // typeof null is "object"
        "object"
    }
}

/// Integral values become JSON integers; NaN and infinities become null
fn number_to_json(n: f64) -> Value {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
        Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }
}

/// `execute_javascript`: evaluates code in a sandbox child process
pub struct JavaScriptTool {
    settings: SandboxSettings,
    program: Option<PathBuf>,
    timeout: Duration,
}

impl JavaScriptTool {
    pub fn new(settings: SandboxSettings) -> Self {
        let program = settings
            .executable
            .clone()
            .or_else(|| match std::env::current_exe() {
                Ok(path) => Some(path),
                Err(e) => {
                    tracing::warn!(error = %e, "Cannot locate the JavaScript sandbox executable");
                    None
                }
            });

        Self {
            timeout: Duration::from_millis(settings.timeout_ms),
            settings,
            program,
        }
    }

    /// Spawns the child, sends the request and decodes its reply
    ///
    /// Dropping the returned future kills the child.
    async fn run_child(&self, program: &Path, code: String) -> ToolResult<EvaluationOutput> {
        let request = EvaluationRequest {
            code,
            settings: self.settings.clone(),
        };
        let payload = serde_json::to_vec(&request)
            .map_err(|e| ToolError::Evaluation(format!("unencodable request: {}", e)))?;

        let mut child = Command::new(program)
            .arg(SANDBOX_SUBCOMMAND)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                ToolError::Configuration(format!("Cannot start the JavaScript sandbox: {}", e))
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            // A child that died early shows up in its exit status below
            if let Err(e) = stdin.write_all(&payload).await {
                tracing::debug!(error = %e, "Sandbox closed stdin early");
            }
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| ToolError::Evaluation(format!("sandbox wait failed: {}", e)))?;

        match serde_json::from_slice::<EvaluationReply>(&output.stdout) {
            Ok(reply) => reply.into_result(),
            Err(_) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                let detail = stderr
                    .lines()
                    .rev()
                    .map(str::trim)
                    .find(|line| !line.is_empty())
                    .unwrap_or("no output");
                tracing::warn!(status = %output.status, "JavaScript sandbox stopped without a result");
                Err(ToolError::Evaluation(format!(
                    "sandbox stopped ({}): {}",
                    output.status, detail
                )))
            }
        }
    }
}

impl Default for JavaScriptTool {
    fn default() -> Self {
        Self::new(SandboxSettings::default())
    }
}

#[async_trait::async_trait]
impl Tool for JavaScriptTool {
    fn name(&self) -> &str {
        "execute_javascript"
    }

    fn description(&self) -> &str {
        "Execute JavaScript code and return the result"
    }

    fn parameters(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "code": {
                    "type": "string",
                    "description": "The JavaScript code to execute"
                }
            },
            "required": ["code"]
        })
    }

    async fn execute(&self, args: HashMap<String, Value>) -> ToolResult<String> {
        let code = args
            .get("code")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::invalid_arguments(self.name(), "Missing required parameter 'code'"))?
            .to_string();

        let program = self.program.as_deref().ok_or_else(|| {
            ToolError::Configuration("JavaScript sandbox executable not found".to_string())
        })?;

        let output = match tokio::time::timeout(self.timeout, self.run_child(program, code)).await {
            Ok(result) => result?,
            Err(_) => {
                tracing::warn!(timeout_ms = self.timeout.as_millis() as u64, "JavaScript timed out");
                return Err(ToolError::Evaluation(format!(
                    "timed out after {} ms",
                    self.timeout.as_millis()
                )));
            }
        };

        serde_json::to_string(&output)
            .map_err(|e| ToolError::Evaluation(format!("unencodable result: {}", e)))
    }
}
