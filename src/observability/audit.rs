/// Audit event logging for verification runs
///
/// Every event is mirrored to the `log` facade. When an audit file is
/// configured the event is also appended to it as one JSON line, carrying
/// the run correlation id so interleaved runs can be told apart.
use crate::config::types::{Result, VerifyError};
use chrono::{DateTime, Utc};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};

/// Audit event severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditSeverity {
    High,
    Medium,
    Low,
}

/// Types of events recorded during a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditEventType {
    VerificationStart,
    VerificationEnd,
    ExtractionFailure,
    StepCompleted,
    StepSkipped,
    SandboxStateEntered,
    SandboxStateFailed,
    ProcessSpawned,
    WallTimeLimitViolation,
    ForcedKill,
    CleanupSuccess,
    CleanupFailure,
}

impl AuditEventType {
    /// Default severity for this event type
    pub fn default_severity(&self) -> AuditSeverity {
        match self {
            AuditEventType::VerificationStart
            | AuditEventType::VerificationEnd
            | AuditEventType::StepCompleted
            | AuditEventType::StepSkipped
            | AuditEventType::SandboxStateEntered
            | AuditEventType::ProcessSpawned
            | AuditEventType::CleanupSuccess => AuditSeverity::Low,
            AuditEventType::SandboxStateFailed
            | AuditEventType::ExtractionFailure
            | AuditEventType::CleanupFailure => AuditSeverity::Medium,
            AuditEventType::WallTimeLimitViolation | AuditEventType::ForcedKill => {
                AuditSeverity::High
            }
        }
    }
}

/// Individual audit event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_type: AuditEventType,
    pub severity: AuditSeverity,
    pub timestamp: DateTime<Utc>,
    pub details: String,
    pub run_id: Option<String>,
    pub state: Option<String>,
    pub command: Option<String>,
    pub file_path: Option<String>,
}

impl AuditEvent {
    /// Create a new event with the type's default severity
    pub fn new(event_type: AuditEventType, details: String) -> Self {
        Self {
            event_type,
            severity: event_type.default_severity(),
            timestamp: Utc::now(),
            details,
            run_id: None,
            state: None,
            command: None,
            file_path: None,
        }
    }

    pub fn with_run_id(mut self, run_id: &str) -> Self {
        self.run_id = Some(run_id.to_string());
        self
    }

    pub fn with_state(mut self, state: &str) -> Self {
        self.state = Some(state.to_string());
        self
    }

    pub fn with_command(mut self, command: String) -> Self {
        self.command = Some(command);
        self
    }

    pub fn with_file_path(mut self, path: &Path) -> Self {
        self.file_path = Some(path.display().to_string());
        self
    }
}

/// Append-only JSON lines audit sink
pub struct AuditLogger {
    audit_file: Mutex<File>,
    audit_path: PathBuf,
}

impl AuditLogger {
    pub fn new(audit_path: PathBuf) -> Result<Self> {
        if let Some(parent) = audit_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    VerifyError::Config(format!("Failed to create audit log directory: {}", e))
                })?;
            }
        }

        let audit_file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&audit_path)
            .map_err(|e| VerifyError::Config(format!("Failed to open audit log: {}", e)))?;

        Ok(Self {
            audit_file: Mutex::new(audit_file),
            audit_path,
        })
    }

    fn write_event(&self, event: &AuditEvent) {
        let line = match serde_json::to_string(event) {
            Ok(line) => line,
            Err(e) => {
                error!("Failed to serialize audit event: {}", e);
                return;
            }
        };

        match self.audit_file.lock() {
            Ok(mut file) => {
                if let Err(e) = writeln!(file, "{}", line) {
                    error!("Failed to write audit log: {}", e);
                }
                if let Err(e) = file.flush() {
                    error!("Failed to flush audit log: {}", e);
                }
            }
            Err(_) => error!("Failed to acquire lock on audit file"),
        }
    }

    pub fn audit_path(&self) -> &Path {
        &self.audit_path
    }
}

static AUDIT_LOGGER: OnceLock<AuditLogger> = OnceLock::new();

/// Initialize the global audit file sink. Without a path only `log` is used.
pub fn init_audit_logger(audit_path: Option<PathBuf>) -> Result<()> {
    let Some(path) = audit_path else {
        return Ok(());
    };

    let logger = AuditLogger::new(path)?;
    let shown = logger.audit_path().display().to_string();
    if AUDIT_LOGGER.set(logger).is_err() {
        warn!("Audit logger already initialized, keeping the first sink");
    } else {
        info!("Audit log: {}", shown);
    }
    Ok(())
}

/// Record an event through `log` and, if configured, the audit file
pub fn log_audit_event(event: AuditEvent) {
    let run = event.run_id.as_deref().unwrap_or("-");
    match event.severity {
        AuditSeverity::High => error!("[{}] {:?}: {}", run, event.event_type, event.details),
        AuditSeverity::Medium => warn!("[{}] {:?}: {}", run, event.event_type, event.details),
        AuditSeverity::Low => info!("[{}] {:?}: {}", run, event.event_type, event.details),
    }

    if let Some(logger) = AUDIT_LOGGER.get() {
        logger.write_event(&event);
    }
}

/// Convenience functions for common events
pub mod events {
    use super::*;

    pub fn verification_start(run_id: &str, archive: &Path) {
        log_audit_event(
            AuditEvent::new(
                AuditEventType::VerificationStart,
                format!("Verifying submission {}", archive.display()),
            )
            .with_run_id(run_id)
            .with_file_path(archive),
        );
    }

    pub fn verification_end(run_id: &str, passed: bool, critical: usize, warnings: usize) {
        log_audit_event(
            AuditEvent::new(
                AuditEventType::VerificationEnd,
                format!(
                    "Verification {} ({} critical, {} warnings)",
                    if passed { "passed" } else { "failed" },
                    critical,
                    warnings
                ),
            )
            .with_run_id(run_id),
        );
    }

    pub fn extraction_failure(run_id: &str, archive: &Path, reason: &str) {
        log_audit_event(
            AuditEvent::new(
                AuditEventType::ExtractionFailure,
                format!("Extraction failed: {}", reason),
            )
            .with_run_id(run_id)
            .with_file_path(archive),
        );
    }

    pub fn step_completed(run_id: &str, step: &str, passed: bool, issues: usize) {
        log_audit_event(
            AuditEvent::new(
                AuditEventType::StepCompleted,
                format!(
                    "{}: {} - {} issue(s)",
                    step,
                    if passed { "PASS" } else { "FAIL" },
                    issues
                ),
            )
            .with_run_id(run_id),
        );
    }

    pub fn step_skipped(run_id: &str, step: &str, reason: &str) {
        log_audit_event(
            AuditEvent::new(AuditEventType::StepSkipped, format!("{}: {}", step, reason))
                .with_run_id(run_id),
        );
    }

    pub fn sandbox_state_entered(run_id: &str, state: &str) {
        log_audit_event(
            AuditEvent::new(
                AuditEventType::SandboxStateEntered,
                format!("Entering {}", state),
            )
            .with_run_id(run_id)
            .with_state(state),
        );
    }

    pub fn sandbox_state_failed(run_id: &str, state: &str, reason: &str) {
        log_audit_event(
            AuditEvent::new(
                AuditEventType::SandboxStateFailed,
                format!("{} failed: {}", state, reason),
            )
            .with_run_id(run_id)
            .with_state(state),
        );
    }

    pub fn process_spawned(command: String, pid: u32) {
        log_audit_event(
            AuditEvent::new(AuditEventType::ProcessSpawned, format!("pid {}", pid))
                .with_command(command),
        );
    }

    pub fn wall_time_exceeded(command: String, limit_secs: u64) {
        log_audit_event(
            AuditEvent::new(
                AuditEventType::WallTimeLimitViolation,
                format!("Wall time limit of {}s exceeded", limit_secs),
            )
            .with_command(command),
        );
    }

    pub fn forced_kill(pid: u32) {
        log_audit_event(AuditEvent::new(
            AuditEventType::ForcedKill,
            format!("Process group {} did not exit after SIGTERM, sent SIGKILL", pid),
        ));
    }

    pub fn cleanup_success(path: &Path) {
        log_audit_event(
            AuditEvent::new(AuditEventType::CleanupSuccess, "Removed".to_string())
                .with_file_path(path),
        );
    }

    pub fn cleanup_failure(path: &Path, reason: &str) {
        log_audit_event(
            AuditEvent::new(
                AuditEventType::CleanupFailure,
                format!("Cleanup failed: {}", reason),
            )
            .with_file_path(path),
        );
    }
}
