//! Execution control
//!
//! Every external process the verifier starts goes through a
//! [`CommandRunner`]. The production runner is [`executor::ProcessExecutor`];
//! tests substitute their own.

pub mod executor;

use crate::config::types::{ExecutionResult, Result};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Fully resolved invocation of one external process
#[derive(Debug, Clone, PartialEq)]
pub struct CommandSpec {
    /// Short name used in logs and issue messages
    pub label: String,
    pub program: PathBuf,
    pub args: Vec<String>,
    pub workdir: PathBuf,
    /// Complete child environment; nothing is inherited
    pub env: BTreeMap<String, String>,
    pub timeout: Duration,
}

impl CommandSpec {
    pub fn new(label: &str, program: impl Into<PathBuf>, workdir: impl Into<PathBuf>) -> Self {
        Self {
            label: label.to_string(),
            program: program.into(),
            args: Vec::new(),
            workdir: workdir.into(),
            env: BTreeMap::new(),
            timeout: Duration::from_secs(60),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, env: BTreeMap<String, String>) -> Self {
        self.env = env;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Shell-like rendering for logs
    pub fn command_line(&self) -> String {
        let mut parts = vec![self.program.display().to_string()];
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
    }
}

/// Runs external commands to completion or timeout.
///
/// A non-zero exit or a timeout is reported through the returned
/// [`ExecutionResult`]; `Err` means the process could not be run at all.
pub trait CommandRunner: Send + Sync {
    fn run(&self, spec: &CommandSpec) -> Result<ExecutionResult>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_spec_builder() {
        let spec = CommandSpec::new("execute", "/ws/venv/bin/python", "/sub")
            .arg("examples/generate.py")
            .args(["--num-samples", "5"])
            .timeout(Duration::from_secs(600));
        assert_eq!(
            spec.command_line(),
            "/ws/venv/bin/python examples/generate.py --num-samples 5"
        );
        assert_eq!(spec.timeout, Duration::from_secs(600));
        assert!(spec.env.is_empty());
    }
}
