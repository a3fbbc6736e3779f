/// Sandbox session: the run-scoped workspace plus the state it has reached
///
/// States only move forward and each is attempted once. Whatever state a
/// session stops in, closing it enters `Cleanup` and removes the workspace.
use crate::config::types::{ExecutionResult, ExecutionStatus, Result, VerifyError};
use crate::exec::{CommandRunner, CommandSpec};
use crate::observability::audit::events;
use crate::safety::workspace::Workspace;
use serde::Serialize;
use std::fmt;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SandboxState {
    CreateSandbox,
    InstallDeps,
    InstallPackage,
    ExecuteEntrypoint,
    LocateOutput,
    ValidateSamples,
    Cleanup,
}

impl SandboxState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SandboxState::CreateSandbox => "CREATE_SANDBOX",
            SandboxState::InstallDeps => "INSTALL_DEPS",
            SandboxState::InstallPackage => "INSTALL_PACKAGE",
            SandboxState::ExecuteEntrypoint => "EXECUTE_ENTRYPOINT",
            SandboxState::LocateOutput => "LOCATE_OUTPUT",
            SandboxState::ValidateSamples => "VALIDATE_SAMPLES",
            SandboxState::Cleanup => "CLEANUP",
        }
    }
}

impl fmt::Display for SandboxState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a command stage did not succeed
#[derive(Debug, Clone, PartialEq)]
pub struct StageFailure {
    pub state: SandboxState,
    /// Diagnostic text suitable for an issue's details
    pub diagnostic: String,
}

pub struct SandboxSession<'a> {
    workspace: Workspace,
    runner: &'a dyn CommandRunner,
    state: Option<SandboxState>,
    tail_chars: usize,
}

impl<'a> SandboxSession<'a> {
    /// Create the run-scoped workspace for a new session
    pub fn open(
        sandbox_root: &Path,
        runner: &'a dyn CommandRunner,
        tail_chars: usize,
    ) -> Result<Self> {
        let workspace = Workspace::new(sandbox_root)?;
        Ok(Self {
            workspace,
            runner,
            state: None,
            tail_chars,
        })
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    pub fn run_id(&self) -> &str {
        self.workspace.run_id()
    }

    /// Last state entered
    pub fn state(&self) -> Option<SandboxState> {
        self.state
    }

    /// Advance to `next`. Re-entering or going back is a programming error.
    pub fn enter(&mut self, next: SandboxState) -> Result<()> {
        if let Some(current) = self.state {
            if next <= current {
                return Err(VerifyError::Process(format!(
                    "Illegal sandbox transition {} -> {}",
                    current, next
                )));
            }
        }
        self.state = Some(next);
        events::sandbox_state_entered(self.workspace.run_id(), next.as_str());
        Ok(())
    }

    /// Enter `state` and run its single command attempt
    pub fn run_stage(
        &mut self,
        state: SandboxState,
        spec: &CommandSpec,
    ) -> std::result::Result<ExecutionResult, StageFailure> {
        self.enter(state).map_err(|e| self.failure(state, e.to_string()))?;

        let result = self
            .runner
            .run(spec)
            .map_err(|e| self.failure(state, e.to_string()))?;

        match result.status {
            ExecutionStatus::Ok => Ok(result),
            ExecutionStatus::TimeLimit => {
                let timeout = VerifyError::Timeout {
                    operation: spec.label.clone(),
                    seconds: spec.timeout.as_secs(),
                };
                let tail = result.diagnostic_tail(self.tail_chars);
                let diagnostic = if tail.is_empty() {
                    timeout.to_string()
                } else {
                    format!("{}\n{}", timeout, tail)
                };
                Err(self.failure(state, diagnostic))
            }
            ExecutionStatus::RuntimeError | ExecutionStatus::Signaled => {
                let code = match (result.exit_code, result.signal) {
                    (Some(code), _) => code.to_string(),
                    (None, Some(signal)) => format!("signal {}", signal),
                    (None, None) => "unknown".to_string(),
                };
                let diagnostic = format!(
                    "Exit code: {}\n{}",
                    code,
                    result.diagnostic_tail(self.tail_chars)
                );
                Err(self.failure(state, diagnostic.trim_end().to_string()))
            }
        }
    }

    fn failure(&self, state: SandboxState, diagnostic: String) -> StageFailure {
        let first_line = diagnostic.lines().next().unwrap_or_default();
        events::sandbox_state_failed(self.workspace.run_id(), state.as_str(), first_line);
        StageFailure { state, diagnostic }
    }

    /// Enter `Cleanup` and remove the workspace. Returns the last state
    /// reached before cleanup.
    pub fn close(mut self) -> Option<SandboxState> {
        let reached = self.state;
        self.state = Some(SandboxState::Cleanup);
        events::sandbox_state_entered(self.workspace.run_id(), SandboxState::Cleanup.as_str());
        self.workspace.cleanup();
        reached
    }
}
