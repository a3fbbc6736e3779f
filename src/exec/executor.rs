/// Process execution with hard wall-clock limits
use crate::config::types::{ExecutionResult, ExecutionStatus, Result, VerifyError};
use crate::exec::{CommandRunner, CommandSpec};
use crate::observability::audit::events;
use crate::utils::output::{join_reader, spawn_tail_reader};
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Spawns each command in its own process group and polls it to completion
#[derive(Debug, Clone)]
pub struct ProcessExecutor {
    kill_grace: Duration,
    capture_limit: usize,
}

impl ProcessExecutor {
    pub fn new(kill_grace: Duration, capture_limit: usize) -> Self {
        Self {
            kill_grace,
            capture_limit,
        }
    }

    fn spawn(&self, spec: &CommandSpec) -> Result<Child> {
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .current_dir(&spec.workdir)
            .env_clear()
            .envs(&spec.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0);

        cmd.spawn().map_err(|e| {
            VerifyError::Process(format!(
                "Failed to start {} ({}): {}",
                spec.label,
                spec.program.display(),
                e
            ))
        })
    }

    /// SIGTERM the group, then SIGKILL whatever survives the grace period
    fn terminate_group(&self, child: &mut Child) {
        let pid = child.id();
        let pgid = Pid::from_raw(pid as i32);

        if let Err(e) = killpg(pgid, Signal::SIGTERM) {
            log::debug!("SIGTERM to process group {} failed: {}", pid, e);
        }

        let deadline = Instant::now() + self.kill_grace;
        while Instant::now() < deadline {
            if matches!(child.try_wait(), Ok(Some(_))) {
                break;
            }
            thread::sleep(POLL_INTERVAL);
        }

        if matches!(child.try_wait(), Ok(None)) {
            events::forced_kill(pid);
        }
        // Also reaches grandchildren that outlived the leader
        let _ = killpg(pgid, Signal::SIGKILL);
        let _ = child.wait();
    }
}

impl CommandRunner for ProcessExecutor {
    fn run(&self, spec: &CommandSpec) -> Result<ExecutionResult> {
        let start = Instant::now();
        let mut child = self.spawn(spec)?;
        let pid = child.id();
        events::process_spawned(spec.command_line(), pid);

        let stdout_handle = spawn_tail_reader(child.stdout.take(), self.capture_limit);
        let stderr_handle = spawn_tail_reader(child.stderr.take(), self.capture_limit);

        loop {
            match child.try_wait() {
                Ok(Some(exit_status)) => {
                    // Leftover group members would hold the pipes open
                    let _ = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL);

                    let stdout = join_reader(stdout_handle);
                    let stderr = join_reader(stderr_handle);
                    let signal = exit_status.signal();
                    let status = if exit_status.success() {
                        ExecutionStatus::Ok
                    } else if signal.is_some() {
                        ExecutionStatus::Signaled
                    } else {
                        ExecutionStatus::RuntimeError
                    };

                    log::debug!(
                        "{} exited with {:?} after {:.1}s",
                        spec.label,
                        exit_status.code(),
                        start.elapsed().as_secs_f64()
                    );

                    return Ok(ExecutionResult {
                        exit_code: exit_status.code(),
                        status,
                        output_truncated: stdout.truncated || stderr.truncated,
                        stdout: stdout.to_string_lossy(),
                        stderr: stderr.to_string_lossy(),
                        wall_time: start.elapsed().as_secs_f64(),
                        signal,
                        success: exit_status.success(),
                    });
                }
                Ok(None) => {
                    if start.elapsed() >= spec.timeout {
                        events::wall_time_exceeded(spec.command_line(), spec.timeout.as_secs());
                        self.terminate_group(&mut child);

                        let stdout = join_reader(stdout_handle);
                        let stderr = join_reader(stderr_handle);

                        return Ok(ExecutionResult {
                            exit_code: None,
                            status: ExecutionStatus::TimeLimit,
                            output_truncated: stdout.truncated || stderr.truncated,
                            stdout: stdout.to_string_lossy(),
                            stderr: stderr.to_string_lossy(),
                            wall_time: start.elapsed().as_secs_f64(),
                            signal: Some(Signal::SIGKILL as i32),
                            success: false,
                        });
                    }
                    thread::sleep(POLL_INTERVAL);
                }
                Err(e) => {
                    self.terminate_group(&mut child);
                    return Err(VerifyError::Process(format!(
                        "Process monitoring error for {}: {}",
                        spec.label, e
                    )));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn shell(script: &str, timeout: Duration) -> CommandSpec {
        let mut env = BTreeMap::new();
        env.insert("PATH".to_string(), "/usr/bin:/bin".to_string());
        CommandSpec::new("test", "/bin/sh", std::env::temp_dir())
            .args(["-c", script])
            .env(env)
            .timeout(timeout)
    }

    fn executor() -> ProcessExecutor {
        ProcessExecutor::new(Duration::from_millis(100), 1024)
    }

    #[test]
    fn test_successful_command() {
        let result = executor()
            .run(&shell("echo hello", Duration::from_secs(10)))
            .unwrap();
        assert!(result.success);
        assert_eq!(result.status, ExecutionStatus::Ok);
        assert_eq!(result.stdout.trim(), "hello");
    }

    #[test]
    fn test_non_zero_exit() {
        let result = executor()
            .run(&shell("echo oops >&2; exit 3", Duration::from_secs(10)))
            .unwrap();
        assert!(!result.success);
        assert_eq!(result.status, ExecutionStatus::RuntimeError);
        assert_eq!(result.exit_code, Some(3));
        assert_eq!(result.stderr.trim(), "oops");
    }

    #[test]
    fn test_environment_is_not_inherited() {
        std::env::set_var("GENVERIFY_HOST_SECRET", "leak");
        let result = executor()
            .run(&shell(
                "echo \"${GENVERIFY_HOST_SECRET:-clean}\"",
                Duration::from_secs(10),
            ))
            .unwrap();
        assert_eq!(result.stdout.trim(), "clean");
    }

    #[test]
    fn test_timeout_kills_process_group() {
        let start = Instant::now();
        let result = executor()
            .run(&shell("sleep 30 & sleep 30; wait", Duration::from_millis(300)))
            .unwrap();
        assert_eq!(result.status, ExecutionStatus::TimeLimit);
        assert!(!result.success);
        assert!(start.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn test_output_is_bounded() {
        let result = ProcessExecutor::new(Duration::from_millis(100), 8)
            .run(&shell(
                "i=0; while [ $i -lt 100 ]; do echo line$i; i=$((i+1)); done; echo END",
                Duration::from_secs(10),
            ))
            .unwrap();
        assert!(result.output_truncated);
        assert!(result.stdout.ends_with("END\n"));
        assert!(result.stdout.len() <= 8);
    }

    #[test]
    fn test_missing_program_is_error() {
        let spec = CommandSpec::new("missing", "/nonexistent/python", std::env::temp_dir());
        let err = executor().run(&spec).unwrap_err();
        assert!(matches!(err, VerifyError::Process(_)));
    }
}
