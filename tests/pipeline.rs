//! End-to-end pipeline tests: real archives, fake process runner.

use genverify::config::loader::VerifierConfig;
use genverify::exec::{CommandRunner, CommandSpec};
use genverify::{ExecutionResult, ExecutionStatus, Result, Severity, StepKind, VerificationEngine};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

/// Pretends to be Python: records every command and, when the generator is
/// run, writes `samples` sample directories under the submission root.
struct FakeRunner {
    calls: Mutex<Vec<CommandSpec>>,
    samples: usize,
    fail_label: Option<&'static str>,
}

impl FakeRunner {
    fn new(samples: usize) -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            samples,
            fail_label: None,
        })
    }

    /// Fails the command with `label`; every other command succeeds
    fn failing(label: &'static str, samples: usize) -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            samples,
            fail_label: Some(label),
        })
    }

    fn labels(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|c| c.label.clone())
            .collect()
    }

    fn workdirs(&self) -> Vec<PathBuf> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|c| c.workdir.clone())
            .collect()
    }
}

impl CommandRunner for FakeRunner {
    fn run(&self, spec: &CommandSpec) -> Result<ExecutionResult> {
        self.calls.lock().unwrap().push(spec.clone());

        if self.fail_label == Some(spec.label.as_str()) {
            return Ok(ExecutionResult {
                exit_code: Some(1),
                status: ExecutionStatus::RuntimeError,
                stderr: "Traceback (most recent call last):\nModuleNotFoundError: No module named 'cv2'"
                    .to_string(),
                ..Default::default()
            });
        }

        if spec.label == "run generator" {
            let out = spec.workdir.join("data/questions/maze_task");
            for i in 0..self.samples {
                let sample = out.join(format!("maze_{:04}", i));
                fs::create_dir_all(&sample).unwrap();
                fs::write(sample.join("first_frame.png"), b"\x89PNG").unwrap();
                fs::write(sample.join("final_frame.png"), b"\x89PNG").unwrap();
                fs::write(sample.join("prompt.txt"), "Find the path to the exit.").unwrap();
            }
        }

        Ok(ExecutionResult {
            exit_code: Some(0),
            status: ExecutionStatus::Ok,
            success: true,
            ..Default::default()
        })
    }
}

fn submission_files() -> Vec<(&'static str, &'static str)> {
    vec![
        ("src/__init__.py", "from .generator import MazeGenerator\n"),
        ("src/generator.py", "class MazeGenerator:\n    pass\n"),
        (
            "src/config.py",
            "from pydantic import Field\n\nclass TaskConfig:\n    domain: str = Field(default=\"maze\")\n",
        ),
        ("src/prompts.py", "PROMPTS = ['Find the path to the exit.']\n"),
        (
            "examples/generate.py",
            "import argparse\n\ndef main():\n    pass\n\nif __name__ == '__main__':\n    main()\n",
        ),
        (
            "core/base_generator.py",
            "def ids(num_samples, domain):\n    return [f\"{domain}_{i:04d}\" for i in range(num_samples)]\n",
        ),
        (
            "core/output_writer.py",
            "FILES = ['first_frame.png', 'final_frame.png', 'prompt.txt', 'ground_truth.mp4']\n",
        ),
        ("requirements.txt", "numpy==1.26.4\npillow==10.3.0\n"),
        ("README.md", "# Maze generator\n"),
    ]
}

fn with_file(
    mut files: Vec<(&'static str, &'static str)>,
    name: &'static str,
    content: &'static str,
) -> Vec<(&'static str, &'static str)> {
    files.retain(|(existing, _)| *existing != name);
    files.push((name, content));
    files
}

fn write_zip(dir: &Path, name: &str, prefix: &str, files: &[(&str, &str)]) -> PathBuf {
    let path = dir.join(name);
    let mut writer = ZipWriter::new(fs::File::create(&path).unwrap());
    let options = SimpleFileOptions::default();
    for (file, content) in files {
        writer
            .start_file(format!("{}{}", prefix, file), options)
            .unwrap();
        writer.write_all(content.as_bytes()).unwrap();
    }
    writer.finish().unwrap();
    path
}

fn engine(sandbox_root: &Path, runner: Arc<FakeRunner>) -> VerificationEngine {
    let config = VerifierConfig {
        sandbox_root: sandbox_root.to_path_buf(),
        ..VerifierConfig::default()
    };
    VerificationEngine::with_runner(config, runner)
}

fn is_empty_dir(path: &Path) -> bool {
    fs::read_dir(path).map(|mut d| d.next().is_none()).unwrap_or(true)
}

#[test]
fn test_wrapped_submission_passes() {
    let dir = tempfile::tempdir().unwrap();
    let sandbox = tempfile::tempdir().unwrap();
    let archive = write_zip(dir.path(), "maze.zip", "maze_generator/", &submission_files());
    let runner = FakeRunner::new(5);

    let result = engine(sandbox.path(), runner.clone()).verify(&archive, 5);

    assert!(result.passed(), "{:#?}", result);
    assert_eq!(result.domain(), Some("maze"));
    assert_eq!(result.critical_issues(), 0);
    assert_eq!(result.steps().len(), 4);
    assert_eq!(
        result.step(StepKind::Extraction).unwrap().detail_str("layout"),
        Some("wrapped")
    );

    let output = result.step(StepKind::Output).unwrap();
    assert_eq!(output.details()["generated_samples"], 5);
    assert_eq!(output.detail_str("final_state"), Some("VALIDATE_SAMPLES"));
    assert_eq!(
        runner.labels(),
        vec!["create virtual environment", "install dependencies", "run generator"]
    );
}

#[test]
fn test_flat_submission_passes() {
    let dir = tempfile::tempdir().unwrap();
    let sandbox = tempfile::tempdir().unwrap();
    let archive = write_zip(dir.path(), "maze.zip", "", &submission_files());
    let runner = FakeRunner::new(5);

    let result = engine(sandbox.path(), runner).verify(&archive, 5);

    assert!(result.passed(), "{:#?}", result);
    assert_eq!(
        result.step(StepKind::Extraction).unwrap().detail_str("layout"),
        Some("flat")
    );
}

#[test]
fn test_structure_failure_runs_no_process() {
    let dir = tempfile::tempdir().unwrap();
    let sandbox = tempfile::tempdir().unwrap();
    let files: Vec<_> = submission_files()
        .into_iter()
        .filter(|(name, _)| *name != "README.md")
        .collect();
    let archive = write_zip(dir.path(), "maze.zip", "maze_generator/", &files);
    let runner = FakeRunner::new(5);

    let result = engine(sandbox.path(), runner.clone()).verify(&archive, 5);

    assert!(!result.passed());
    let structure = result.step(StepKind::Structure).unwrap();
    assert!(!structure.passed());
    assert!(structure
        .issues()
        .iter()
        .any(|i| i.message() == "Missing required file: README.md"));

    let output = result.step(StepKind::Output).unwrap();
    assert!(!output.passed());
    assert_eq!(output.issues().len(), 1);
    assert_eq!(output.issues()[0].severity(), Severity::Info);
    assert!(runner.labels().is_empty());
    assert!(is_empty_dir(sandbox.path()));
}

#[test]
fn test_missing_samples_is_warning_only() {
    let dir = tempfile::tempdir().unwrap();
    let sandbox = tempfile::tempdir().unwrap();
    let archive = write_zip(dir.path(), "maze.zip", "maze_generator/", &submission_files());
    let runner = FakeRunner::new(4);

    let result = engine(sandbox.path(), runner).verify(&archive, 5);

    assert!(result.passed(), "{:#?}", result);
    let output = result.step(StepKind::Output).unwrap();
    let warnings: Vec<_> = output
        .issues()
        .iter()
        .filter(|i| i.severity() == Severity::Warning)
        .collect();
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].message(), "Expected 5 samples, got 4");
}

#[test]
fn test_failed_dependency_install_stops_sandbox() {
    let dir = tempfile::tempdir().unwrap();
    let sandbox = tempfile::tempdir().unwrap();
    let archive = write_zip(dir.path(), "maze.zip", "maze_generator/", &submission_files());
    let runner = FakeRunner::failing("install dependencies", 5);

    let result = engine(sandbox.path(), runner.clone()).verify(&archive, 5);

    assert!(!result.passed());
    let output = result.step(StepKind::Output).unwrap();
    assert_eq!(
        output.issues()[0].message(),
        "Failed to install dependencies in isolated environment"
    );
    assert!(output.issues()[0]
        .details()
        .is_some_and(|d| d.contains("No module named 'cv2'")));
    assert_eq!(
        runner.labels(),
        vec!["create virtual environment", "install dependencies"]
    );
    assert!(is_empty_dir(sandbox.path()));
}

#[test]
fn test_temporary_directories_are_removed() {
    let dir = tempfile::tempdir().unwrap();
    let sandbox = tempfile::tempdir().unwrap();
    let archive = write_zip(dir.path(), "maze.zip", "maze_generator/", &submission_files());
    let runner = FakeRunner::new(5);

    let result = engine(sandbox.path(), runner.clone()).verify(&archive, 5);
    assert!(result.passed());

    let workdirs = runner.workdirs();
    assert!(!workdirs.is_empty());
    for workdir in workdirs {
        assert!(!workdir.exists(), "{} survived the run", workdir.display());
    }
    assert!(is_empty_dir(sandbox.path()));
}

#[test]
fn test_corrupt_archive_ends_after_extraction() {
    let dir = tempfile::tempdir().unwrap();
    let sandbox = tempfile::tempdir().unwrap();
    let archive = dir.path().join("broken.zip");
    fs::write(&archive, b"this is not a zip archive").unwrap();
    let runner = FakeRunner::new(5);

    let result = engine(sandbox.path(), runner.clone()).verify(&archive, 5);

    assert!(!result.passed());
    assert_eq!(result.steps().len(), 1);
    assert_eq!(result.steps()[0].step(), StepKind::Extraction);
    assert_eq!(result.critical_issues(), 1);
    assert!(runner.labels().is_empty());
}

#[test]
fn test_format_failure_runs_no_process() {
    let dir = tempfile::tempdir().unwrap();
    let sandbox = tempfile::tempdir().unwrap();
    let files = with_file(
        submission_files(),
        "src/config.py",
        "class TaskConfig:\n    domain: str = \"Maze\"\n",
    );
    let archive = write_zip(dir.path(), "maze.zip", "maze_generator/", &files);
    let runner = FakeRunner::new(5);

    let result = engine(sandbox.path(), runner.clone()).verify(&archive, 5);

    assert!(!result.passed());
    assert!(result.step(StepKind::Structure).unwrap().passed());
    let format = result.step(StepKind::Format).unwrap();
    assert!(!format.passed());
    assert!(format
        .issues()
        .iter()
        .any(|i| i.message() == "Invalid domain format: 'Maze'"));

    let output = result.step(StepKind::Output).unwrap();
    assert!(!output.passed());
    assert_eq!(output.issues().len(), 1);
    assert_eq!(output.issues()[0].severity(), Severity::Info);
    assert!(runner.labels().is_empty());
    assert!(is_empty_dir(sandbox.path()));
}

#[test]
fn test_failed_sandbox_creation_aborts() {
    let dir = tempfile::tempdir().unwrap();
    let sandbox = tempfile::tempdir().unwrap();
    let archive = write_zip(dir.path(), "maze.zip", "maze_generator/", &submission_files());
    let runner = FakeRunner::failing("create virtual environment", 5);

    let result = engine(sandbox.path(), runner.clone()).verify(&archive, 5);

    assert!(!result.passed());
    let output = result.step(StepKind::Output).unwrap();
    assert_eq!(output.count(Severity::Critical), 1);
    assert_eq!(
        output.issues()[0].message(),
        "Failed to create test virtual environment"
    );
    assert_eq!(output.detail_str("final_state"), Some("CREATE_SANDBOX"));
    assert_eq!(runner.labels(), vec!["create virtual environment"]);
    assert!(is_empty_dir(sandbox.path()));
}

#[test]
fn test_failed_package_install_is_warning_and_continues() {
    let dir = tempfile::tempdir().unwrap();
    let sandbox = tempfile::tempdir().unwrap();
    let files = with_file(
        submission_files(),
        "setup.py",
        "from setuptools import setup\n\nsetup(name='maze')\n",
    );
    let archive = write_zip(dir.path(), "maze.zip", "maze_generator/", &files);
    let runner = FakeRunner::failing("install package", 5);

    let result = engine(sandbox.path(), runner.clone()).verify(&archive, 5);

    assert!(result.passed(), "{:#?}", result);
    let output = result.step(StepKind::Output).unwrap();
    assert_eq!(output.count(Severity::Critical), 0);
    assert!(output.issues().iter().any(|i| {
        i.severity() == Severity::Warning
            && i.message() == "Failed to install generator package (setup.py)"
    }));
    assert_eq!(output.details()["generated_samples"], 5);
    assert_eq!(output.detail_str("final_state"), Some("VALIDATE_SAMPLES"));
    assert_eq!(
        runner.labels(),
        vec![
            "create virtual environment",
            "install dependencies",
            "install package",
            "run generator"
        ]
    );
}

#[test]
fn test_failed_generator_run_reports_output_tail() {
    let dir = tempfile::tempdir().unwrap();
    let sandbox = tempfile::tempdir().unwrap();
    let archive = write_zip(dir.path(), "maze.zip", "maze_generator/", &submission_files());
    let runner = FakeRunner::failing("run generator", 5);

    let result = engine(sandbox.path(), runner.clone()).verify(&archive, 5);

    assert!(!result.passed());
    let output = result.step(StepKind::Output).unwrap();
    assert_eq!(output.issues().len(), 1);
    let issue = &output.issues()[0];
    assert_eq!(issue.severity(), Severity::Critical);
    assert_eq!(issue.message(), "Generator execution failed");
    let details = issue.details().unwrap();
    assert!(details.contains("Exit code: 1"), "{}", details);
    assert!(details.contains("No module named 'cv2'"), "{}", details);
    assert_eq!(output.detail_str("final_state"), Some("EXECUTE_ENTRYPOINT"));
    assert_eq!(output.details()["generated_samples"], 0);
    assert_eq!(runner.labels().len(), 3);
    assert!(is_empty_dir(sandbox.path()));
}

#[test]
fn test_missing_output_directory_is_critical() {
    let dir = tempfile::tempdir().unwrap();
    let sandbox = tempfile::tempdir().unwrap();
    let archive = write_zip(dir.path(), "maze.zip", "maze_generator/", &submission_files());
    let runner = FakeRunner::new(0);

    let result = engine(sandbox.path(), runner.clone()).verify(&archive, 5);

    assert!(!result.passed());
    let output = result.step(StepKind::Output).unwrap();
    assert_eq!(output.issues().len(), 1);
    assert_eq!(output.issues()[0].severity(), Severity::Critical);
    assert_eq!(output.issues()[0].message(), "Could not find output directory");
    assert_eq!(output.detail_str("final_state"), Some("LOCATE_OUTPUT"));
    assert!(output.details().get("output_directory").is_none());
}
