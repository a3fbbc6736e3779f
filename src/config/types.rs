/// Core types for the genverify pipeline
///
/// Every verification run produces a fresh set of these values. Validators
/// build them and hand them back; nothing downstream mutates them.
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Issue severity, ordered by blocking strength.
///
/// Only `Critical` blocks acceptance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    #[serde(rename = "critical")]
    Critical,
    #[serde(rename = "warning")]
    Warning,
    #[serde(rename = "info")]
    Info,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::Warning => "warning",
            Severity::Info => "info",
        }
    }

    pub fn is_blocking(&self) -> bool {
        matches!(self, Severity::Critical)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pipeline step that owns an issue or a step result
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StepKind {
    #[serde(rename = "extraction")]
    Extraction,
    #[serde(rename = "structure")]
    Structure,
    #[serde(rename = "format")]
    Format,
    #[serde(rename = "output")]
    Output,
}

impl StepKind {
    /// Short machine key used on issues
    pub fn key(&self) -> &'static str {
        match self {
            StepKind::Extraction => "extraction",
            StepKind::Structure => "structure",
            StepKind::Format => "format",
            StepKind::Output => "output",
        }
    }

    /// Human-readable step title used on step results
    pub fn title(&self) -> &'static str {
        match self {
            StepKind::Extraction => "Archive Extraction",
            StepKind::Structure => "File Structure Check",
            StepKind::Format => "Code Format Check",
            StepKind::Output => "Output Format Check",
        }
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// One discrete defect finding.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Issue {
    step: StepKind,
    severity: Severity,
    message: String,
    details: Option<String>,
    file_path: Option<String>,
}

impl Issue {
    pub fn new(step: StepKind, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            step,
            severity,
            message: message.into(),
            details: None,
            file_path: None,
        }
    }

    pub fn critical(step: StepKind, message: impl Into<String>) -> Self {
        Self::new(step, Severity::Critical, message)
    }

    pub fn warning(step: StepKind, message: impl Into<String>) -> Self {
        Self::new(step, Severity::Warning, message)
    }

    pub fn info(step: StepKind, message: impl Into<String>) -> Self {
        Self::new(step, Severity::Info, message)
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_file(mut self, file_path: impl Into<String>) -> Self {
        self.file_path = Some(file_path.into());
        self
    }

    pub fn step(&self) -> StepKind {
        self.step
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn details(&self) -> Option<&str> {
        self.details.as_deref()
    }

    pub fn file_path(&self) -> Option<&str> {
        self.file_path.as_deref()
    }
}

/// Opaque key-value bag attached to a step result
pub type StepDetails = BTreeMap<String, Value>;

/// Outcome of a single validation step.
///
/// `passed` is decided by the step that produced the result. It is never
/// recomputed from the issue list: a synthesized skip carries only an INFO
/// issue and still reports `passed = false`.
#[derive(Clone, Debug, Serialize)]
pub struct StepResult {
    step: StepKind,
    step_name: String,
    passed: bool,
    issues: Vec<Issue>,
    details: StepDetails,
}

impl StepResult {
    /// Result whose pass/fail is decided by the absence of CRITICAL issues
    pub fn from_issues(step: StepKind, issues: Vec<Issue>, details: StepDetails) -> Self {
        let passed = !issues.iter().any(|i| i.severity().is_blocking());
        Self::with_outcome(step, passed, issues, details)
    }

    /// Result with an explicit pass/fail decision
    pub fn with_outcome(
        step: StepKind,
        passed: bool,
        issues: Vec<Issue>,
        details: StepDetails,
    ) -> Self {
        debug_assert!(
            !passed || !issues.iter().any(|i| i.severity().is_blocking()),
            "a passing step cannot carry critical issues"
        );
        Self {
            step,
            step_name: step.title().to_string(),
            passed,
            issues,
            details,
        }
    }

    /// Synthesized result for a step that did not run
    pub fn skipped(step: StepKind, reason: impl Into<String>) -> Self {
        Self::with_outcome(
            step,
            false,
            vec![Issue::info(step, reason)],
            StepDetails::new(),
        )
    }

    pub fn step(&self) -> StepKind {
        self.step
    }

    pub fn step_name(&self) -> &str {
        &self.step_name
    }

    pub fn passed(&self) -> bool {
        self.passed
    }

    pub fn issues(&self) -> &[Issue] {
        &self.issues
    }

    pub fn details(&self) -> &StepDetails {
        &self.details
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.issues.iter().filter(|i| i.severity() == severity).count()
    }

    /// String detail lookup
    pub fn detail_str(&self, key: &str) -> Option<&str> {
        self.details.get(key).and_then(Value::as_str)
    }
}

/// Aggregate outcome of one verification run
#[derive(Clone, Debug, Serialize)]
pub struct VerificationResult {
    generator_path: String,
    domain: Option<String>,
    passed: bool,
    steps: Vec<StepResult>,
}

impl VerificationResult {
    /// Aggregate step results; the run passes only if every step passed.
    pub fn aggregate(
        generator_path: impl Into<String>,
        domain: Option<String>,
        steps: Vec<StepResult>,
    ) -> Self {
        let passed = !steps.is_empty() && steps.iter().all(StepResult::passed);
        Self {
            generator_path: generator_path.into(),
            domain,
            passed,
            steps,
        }
    }

    pub fn generator_path(&self) -> &str {
        &self.generator_path
    }

    pub fn domain(&self) -> Option<&str> {
        self.domain.as_deref()
    }

    pub fn passed(&self) -> bool {
        self.passed
    }

    pub fn steps(&self) -> &[StepResult] {
        &self.steps
    }

    pub fn step(&self, kind: StepKind) -> Option<&StepResult> {
        self.steps.iter().find(|s| s.step() == kind)
    }

    pub fn total_issues(&self) -> usize {
        self.steps.iter().map(|s| s.issues().len()).sum()
    }

    pub fn critical_issues(&self) -> usize {
        self.steps.iter().map(|s| s.count(Severity::Critical)).sum()
    }

    pub fn warning_issues(&self) -> usize {
        self.steps.iter().map(|s| s.count(Severity::Warning)).sum()
    }
}

/// Execution status of an external process
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionStatus {
    /// Exit code 0
    #[serde(rename = "OK")]
    Ok,
    /// Non-zero exit code
    #[serde(rename = "RE")]
    RuntimeError,
    /// Wall time limit exceeded, process group killed
    #[serde(rename = "TLE")]
    TimeLimit,
    /// Terminated by a signal we did not send
    #[serde(rename = "SIG")]
    Signaled,
}

impl Default for ExecutionStatus {
    fn default() -> Self {
        ExecutionStatus::Ok
    }
}

/// Result of one external process invocation
#[derive(Default, Clone, Debug, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub exit_code: Option<i32>,
    pub status: ExecutionStatus,
    pub stdout: String,
    pub stderr: String,
    /// Wall clock time used (in seconds)
    pub wall_time: f64,
    pub signal: Option<i32>,
    pub success: bool,
    /// True if captured output was cut to the configured tail
    pub output_truncated: bool,
}

impl ExecutionResult {
    /// Diagnostic tail: stderr when present, stdout otherwise
    pub fn diagnostic_tail(&self, max_chars: usize) -> String {
        let source = if self.stderr.trim().is_empty() {
            &self.stdout
        } else {
            &self.stderr
        };
        tail_chars(source.trim_end(), max_chars)
    }
}

/// Last `max_chars` characters of `text`, on a char boundary
pub fn tail_chars(text: &str, max_chars: usize) -> String {
    let count = text.chars().count();
    if count <= max_chars {
        return text.to_string();
    }
    text.chars().skip(count - max_chars).collect()
}

/// Custom error types for genverify
#[derive(Error, Debug)]
pub enum VerifyError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Archive error: {0}")]
    Archive(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Process error: {0}")]
    Process(String),

    #[error("Timeout after {seconds}s: {operation}")]
    Timeout { operation: String, seconds: u64 },

    #[error("Workspace error: {0}")]
    Workspace(String),

    #[error("Media probe error: {0}")]
    Probe(String),

    #[error("Report error: {0}")]
    Report(String),
}

/// Result type alias for genverify operations
pub type Result<T> = std::result::Result<T, VerifyError>;
