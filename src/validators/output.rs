/// Output validation: run the submission in a sandbox and inspect what it wrote
///
/// Stages run strictly in order, once each:
/// `CREATE_SANDBOX -> INSTALL_DEPS -> INSTALL_PACKAGE -> EXECUTE_ENTRYPOINT
/// -> LOCATE_OUTPUT -> VALIDATE_SAMPLES -> CLEANUP`. A failed stage ends the
/// run; cleanup always happens.
use crate::config::loader::VerifierConfig;
use crate::config::policy::SubmissionPolicy;
use crate::config::types::{Issue, StepDetails, StepKind, StepResult};
use crate::exec::CommandRunner;
use crate::sandbox::adapter::SandboxAdapter;
use crate::sandbox::session::{SandboxSession, SandboxState};
use crate::validators::media::VideoProbe;
use crate::validators::samples::SampleInspector;
use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};

const STEP: StepKind = StepKind::Output;

pub struct OutputValidator<'a> {
    config: &'a VerifierConfig,
    runner: &'a dyn CommandRunner,
    adapter: &'a dyn SandboxAdapter,
    probe: &'a dyn VideoProbe,
}

impl<'a> OutputValidator<'a> {
    pub fn new(
        config: &'a VerifierConfig,
        runner: &'a dyn CommandRunner,
        adapter: &'a dyn SandboxAdapter,
        probe: &'a dyn VideoProbe,
    ) -> Self {
        Self {
            config,
            runner,
            adapter,
            probe,
        }
    }

    pub fn validate(&self, root: &Path, domain: Option<&str>, num_samples: usize) -> StepResult {
        let mut issues = Vec::new();
        let mut details = StepDetails::new();
        details.insert("generated_samples".to_string(), json!(0));

        let mut session = match SandboxSession::open(
            &self.config.sandbox_root,
            self.runner,
            self.config.diagnostic_tail_chars,
        ) {
            Ok(session) => session,
            Err(e) => {
                issues.push(
                    Issue::critical(STEP, "Failed to create test virtual environment")
                        .with_details(e.to_string()),
                );
                details.insert(
                    "final_state".to_string(),
                    json!(SandboxState::CreateSandbox.as_str()),
                );
                return StepResult::from_issues(STEP, issues, details);
            }
        };
        details.insert("sandbox_run_id".to_string(), json!(session.run_id()));
        log::info!(
            "Running submission in {} sandbox {}",
            self.adapter.runtime(),
            session.run_id()
        );

        self.drive(&mut session, root, domain, num_samples, &mut issues, &mut details);

        let reached = session.close();
        if let Some(state) = reached {
            details.insert("final_state".to_string(), json!(state.as_str()));
        }

        StepResult::from_issues(STEP, issues, details)
    }

    /// Walk the states; returns early on the first failed stage
    fn drive(
        &self,
        session: &mut SandboxSession<'_>,
        root: &Path,
        domain: Option<&str>,
        num_samples: usize,
        issues: &mut Vec<Issue>,
        details: &mut StepDetails,
    ) {
        let spec = self.adapter.create_command(session.workspace(), root);
        if let Err(failure) = session.run_stage(SandboxState::CreateSandbox, &spec) {
            issues.push(
                Issue::critical(STEP, "Failed to create test virtual environment")
                    .with_details(failure.diagnostic),
            );
            return;
        }

        if let Some(spec) = self.adapter.install_deps_command(session.workspace(), root) {
            if let Err(failure) = session.run_stage(SandboxState::InstallDeps, &spec) {
                issues.push(
                    Issue::critical(
                        STEP,
                        "Failed to install dependencies in isolated environment",
                    )
                    .with_details(failure.diagnostic),
                );
                return;
            }
        }

        if let Some(spec) = self.adapter.install_package_command(session.workspace(), root) {
            if let Err(failure) = session.run_stage(SandboxState::InstallPackage, &spec) {
                issues.push(
                    Issue::warning(STEP, "Failed to install generator package (setup.py)")
                        .with_details(failure.diagnostic),
                );
            }
        }

        let entry_point = self.adapter.entry_point();
        if !root.join(entry_point).is_file() {
            enter_state(session, SandboxState::ExecuteEntrypoint);
            issues.push(Issue::critical(
                STEP,
                format!("Cannot run generator - {} not found", entry_point),
            ));
            return;
        }
        let spec = self
            .adapter
            .execute_command(session.workspace(), root, num_samples);
        if let Err(failure) = session.run_stage(SandboxState::ExecuteEntrypoint, &spec) {
            issues.push(
                Issue::critical(STEP, "Generator execution failed").with_details(failure.diagnostic),
            );
            return;
        }

        enter_state(session, SandboxState::LocateOutput);
        let Some(output_dir) = locate_output(root, domain, &self.config.policy) else {
            let domain = domain.unwrap_or("{domain}");
            issues.push(
                Issue::critical(STEP, "Could not find output directory").with_details(format!(
                    "Expected: data/questions/{}_task/ or data/{}_task/",
                    domain, domain
                )),
            );
            return;
        };
        details.insert(
            "output_directory".to_string(),
            json!(output_dir.display().to_string()),
        );

        enter_state(session, SandboxState::ValidateSamples);
        let report = SampleInspector::new(&self.config.policy, self.probe).inspect(
            &output_dir,
            domain,
            num_samples,
        );
        details.insert("generated_samples".to_string(), json!(report.sample_count));
        issues.extend(report.issues);
    }
}

/// Transition for a state that has no command attempt
fn enter_state(session: &mut SandboxSession<'_>, state: SandboxState) {
    if let Err(e) = session.enter(state) {
        log::error!(
            "Sandbox {} cannot enter {}: {}",
            session.run_id(),
            state,
            e
        );
    }
}

/// First existing, non-empty output candidate. A container candidate
/// descends into its first task directory when it has one.
pub fn locate_output(root: &Path, domain: Option<&str>, policy: &SubmissionPolicy) -> Option<PathBuf> {
    for candidate in &policy.output_candidates {
        let Some(relative) = candidate.resolve(domain) else {
            continue;
        };
        let path = root.join(relative);
        if !is_populated_dir(&path) {
            continue;
        }

        if candidate.container {
            let mut task_dirs: Vec<PathBuf> = fs::read_dir(&path)
                .into_iter()
                .flatten()
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| {
                    p.is_dir()
                        && p.file_name()
                            .is_some_and(|n| n.to_string_lossy().contains(&policy.container_marker))
                })
                .collect();
            task_dirs.sort();
            if let Some(first) = task_dirs.into_iter().next() {
                return Some(first);
            }
        }
        return Some(path);
    }
    None
}

fn is_populated_dir(path: &Path) -> bool {
    fs::read_dir(path)
        .map(|mut entries| entries.next().is_some())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::{ExecutionResult, ExecutionStatus, Result, Severity};
    use crate::exec::CommandSpec;
    use crate::sandbox::python::PythonVenvAdapter;
    use crate::validators::media::Mp4Probe;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingRunner {
        labels: Mutex<Vec<String>>,
    }

    impl CommandRunner for RecordingRunner {
        fn run(&self, spec: &CommandSpec) -> Result<ExecutionResult> {
            self.labels.lock().unwrap().push(spec.label.clone());
            Ok(ExecutionResult {
                exit_code: Some(0),
                status: ExecutionStatus::Ok,
                success: true,
                ..Default::default()
            })
        }
    }

    fn mkdirs(root: &Path, rel: &str) {
        fs::create_dir_all(root.join(rel)).unwrap();
    }

    #[test]
    fn test_questions_task_dir_preferred() {
        let root = tempfile::tempdir().unwrap();
        mkdirs(root.path(), "data/questions/maze_task/maze_0000");
        mkdirs(root.path(), "data/maze_task/maze_0000");
        let found = locate_output(root.path(), Some("maze"), &SubmissionPolicy::default());
        assert_eq!(found, Some(root.path().join("data/questions/maze_task")));
    }

    #[test]
    fn test_empty_candidate_is_skipped() {
        let root = tempfile::tempdir().unwrap();
        mkdirs(root.path(), "data/questions/maze_task");
        mkdirs(root.path(), "data/maze_task/maze_0000");
        let found = locate_output(root.path(), Some("maze"), &SubmissionPolicy::default());
        assert_eq!(found, Some(root.path().join("data/maze_task")));
    }

    #[test]
    fn test_container_descends_into_task_dir() {
        let root = tempfile::tempdir().unwrap();
        mkdirs(root.path(), "data/questions/labyrinth_task/labyrinth_0000");
        let found = locate_output(root.path(), Some("maze"), &SubmissionPolicy::default());
        assert_eq!(found, Some(root.path().join("data/questions/labyrinth_task")));
    }

    #[test]
    fn test_container_without_task_dir_is_itself() {
        let root = tempfile::tempdir().unwrap();
        mkdirs(root.path(), "data/maze_0000");
        let found = locate_output(root.path(), None, &SubmissionPolicy::default());
        assert_eq!(found, Some(root.path().join("data")));
    }

    #[test]
    fn test_nothing_generated() {
        let root = tempfile::tempdir().unwrap();
        mkdirs(root.path(), "data");
        assert_eq!(
            locate_output(root.path(), Some("maze"), &SubmissionPolicy::default()),
            None
        );
    }

    #[test]
    fn test_missing_entry_point_stops_before_execution() {
        let sandbox = tempfile::tempdir().unwrap();
        let submission = tempfile::tempdir().unwrap();
        let config = VerifierConfig {
            sandbox_root: sandbox.path().to_path_buf(),
            ..VerifierConfig::default()
        };
        let runner = RecordingRunner::default();
        let adapter = PythonVenvAdapter::from_config(&config);

        let step = OutputValidator::new(&config, &runner, &adapter, &Mp4Probe).validate(
            submission.path(),
            Some("maze"),
            5,
        );

        assert!(!step.passed());
        assert_eq!(step.issues().len(), 1);
        assert_eq!(step.issues()[0].severity(), Severity::Critical);
        assert_eq!(
            step.issues()[0].message(),
            "Cannot run generator - examples/generate.py not found"
        );
        assert_eq!(step.detail_str("final_state"), Some("EXECUTE_ENTRYPOINT"));
        assert_eq!(
            *runner.labels.lock().unwrap(),
            vec!["create virtual environment".to_string()]
        );
        assert!(fs::read_dir(sandbox.path()).unwrap().next().is_none());
    }
}
