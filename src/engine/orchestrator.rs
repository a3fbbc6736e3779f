/// Verification pipeline
///
/// Runs Extraction, Structure, Format and Output in that order. The Output
/// step is only attempted when Structure and Format both passed; otherwise a
/// skipped result stands in for it and no sandbox is created.
use crate::archive::extractor::{extraction_failure, ArchiveExtractor};
use crate::config::loader::VerifierConfig;
use crate::config::types::{
    Issue, Result, StepDetails, StepKind, StepResult, VerificationResult, VerifyError,
};
use crate::exec::executor::ProcessExecutor;
use crate::exec::CommandRunner;
use crate::observability::audit::events;
use crate::sandbox::adapter::SandboxAdapter;
use crate::sandbox::python::PythonVenvAdapter;
use crate::validators::format::{detected_domain, FormatValidator};
use crate::validators::media::{Mp4Probe, VideoProbe};
use crate::validators::output::OutputValidator;
use crate::validators::structure::StructureValidator;
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

pub const SKIP_REASON: &str = "Skipped due to previous failures";

pub struct VerificationEngine {
    config: VerifierConfig,
    runner: Arc<dyn CommandRunner>,
    adapter: Box<dyn SandboxAdapter>,
    probe: Box<dyn VideoProbe>,
}

impl VerificationEngine {
    /// Engine backed by real processes and the Python venv sandbox
    pub fn new(config: VerifierConfig) -> Self {
        let runner = Arc::new(ProcessExecutor::new(
            config.kill_grace(),
            config.output_capture_bytes,
        ));
        Self::with_runner(config, runner)
    }

    pub fn with_runner(config: VerifierConfig, runner: Arc<dyn CommandRunner>) -> Self {
        let adapter = Box::new(PythonVenvAdapter::from_config(&config));
        Self {
            config,
            runner,
            adapter,
            probe: Box::new(Mp4Probe),
        }
    }

    pub fn with_probe(mut self, probe: Box<dyn VideoProbe>) -> Self {
        self.probe = probe;
        self
    }

    pub fn config(&self) -> &VerifierConfig {
        &self.config
    }

    /// Verify one archive. Never fails: every problem ends up as an issue.
    pub fn verify(&self, archive: &Path, num_samples: usize) -> VerificationResult {
        let run_id = Uuid::new_v4().to_string();
        let generator = archive.display().to_string();
        events::verification_start(&run_id, archive);
        log::info!("Verifying {} (run {})", generator, run_id);

        let policy = &self.config.policy;
        let extracted = match ArchiveExtractor::new(policy).extract(archive) {
            Ok(extracted) => extracted,
            Err(e) => {
                log::error!("Extraction failed: {}", e);
                events::extraction_failure(&run_id, archive, &e.to_string());
                let result =
                    VerificationResult::aggregate(generator, None, vec![extraction_failure(&e)]);
                self.finish(&run_id, &result);
                return result;
            }
        };

        let root = extracted.root();
        let mut steps = vec![extracted.step_result()];
        record(&run_id, &steps[0]);

        let structure = StructureValidator::new(policy).validate(root);
        record(&run_id, &structure);

        let format = match FormatValidator::new(policy) {
            Ok(validator) => validator.validate(root),
            Err(e) => {
                log::error!("Format checks unavailable: {}", e);
                invalid_policy_step(StepKind::Format, &e)
            }
        };
        record(&run_id, &format);
        let domain = detected_domain(&format);

        let output = if structure.passed() && format.passed() {
            let output = OutputValidator::new(
                &self.config,
                self.runner.as_ref(),
                self.adapter.as_ref(),
                self.probe.as_ref(),
            )
            .validate(root, domain.as_deref(), num_samples);
            record(&run_id, &output);
            output
        } else {
            events::step_skipped(&run_id, StepKind::Output.key(), SKIP_REASON);
            StepResult::skipped(StepKind::Output, SKIP_REASON)
        };

        steps.extend([structure, format, output]);
        drop(extracted);

        let result = VerificationResult::aggregate(generator, domain, steps);
        self.finish(&run_id, &result);
        result
    }

    fn finish(&self, run_id: &str, result: &VerificationResult) {
        events::verification_end(
            run_id,
            result.passed(),
            result.critical_issues(),
            result.warning_issues(),
        );
        log::info!(
            "Verification {}: {} issues ({} critical, {} warnings)",
            if result.passed() { "passed" } else { "failed" },
            result.total_issues(),
            result.critical_issues(),
            result.warning_issues()
        );
    }
}

/// A step whose policy could not be loaded fails rather than passing unchecked
fn invalid_policy_step(step: StepKind, error: &VerifyError) -> StepResult {
    StepResult::from_issues(
        step,
        vec![Issue::critical(step, "Submission policy is invalid").with_details(error.to_string())],
        StepDetails::new(),
    )
}

fn record(run_id: &str, step: &StepResult) {
    events::step_completed(run_id, step.step().key(), step.passed(), step.issues().len());
}

/// Input checks done before a run is started
pub fn preflight(archive: &Path) -> Result<()> {
    if !archive.exists() {
        return Err(VerifyError::Archive(format!(
            "Generator file not found: {}",
            archive.display()
        )));
    }
    if archive.extension().and_then(|e| e.to_str()) != Some("zip") {
        return Err(VerifyError::Archive(
            "Generator must be a .zip file".to_string(),
        ));
    }
    Ok(())
}
