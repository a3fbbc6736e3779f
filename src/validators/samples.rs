/// Generated sample inspection
use crate::config::policy::SubmissionPolicy;
use crate::config::types::{Issue, StepKind};
use crate::validators::media::{ProbeError, VideoProbe};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

const STEP: StepKind = StepKind::Output;

/// Prompts are read at most this far
pub const MAX_PROMPT_BYTES: u64 = 64 * 1024;

/// What inspecting an output directory found
#[derive(Debug, Default)]
pub struct SampleReport {
    pub issues: Vec<Issue>,
    pub sample_count: usize,
}

pub struct SampleInspector<'a> {
    policy: &'a SubmissionPolicy,
    probe: &'a dyn VideoProbe,
}

impl<'a> SampleInspector<'a> {
    pub fn new(policy: &'a SubmissionPolicy, probe: &'a dyn VideoProbe) -> Self {
        Self { policy, probe }
    }

    /// Check the sample count, then inspect the first few samples in name order
    pub fn inspect(&self, output_dir: &Path, domain: Option<&str>, expected: usize) -> SampleReport {
        let mut report = SampleReport::default();
        let samples = sample_dirs(output_dir);
        report.sample_count = samples.len();

        if samples.is_empty() {
            report.issues.push(
                Issue::critical(STEP, "No task directories generated")
                    .with_file(output_dir.display().to_string()),
            );
            return report;
        }

        if samples.len() != expected {
            report.issues.push(Issue::warning(
                STEP,
                format!("Expected {} samples, got {}", expected, samples.len()),
            ));
        }

        for sample in samples.iter().take(self.policy.inspected_samples) {
            self.inspect_sample(sample, domain, &mut report.issues);
        }

        report
    }

    fn inspect_sample(&self, sample: &Path, domain: Option<&str>, issues: &mut Vec<Issue>) {
        let sample_ref = sample.display().to_string();
        let task_id = sample
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        if let Some(domain) = domain {
            check_task_id(&task_id, domain, &sample_ref, issues);
        }

        for required in &self.policy.sample_required_files {
            let path = sample.join(required);
            match fs::symlink_metadata(&path) {
                Ok(meta) if meta.file_type().is_symlink() => issues.push(
                    Issue::critical(STEP, format!("Symbolic link not allowed: {}", required))
                        .with_file(path.display().to_string()),
                ),
                Ok(meta) if meta.is_file() && meta.len() > 0 => {}
                Ok(meta) if meta.is_file() => issues.push(
                    Issue::critical(STEP, format!("Empty file: {}", required))
                        .with_file(path.display().to_string()),
                ),
                _ => issues.push(
                    Issue::critical(STEP, format!("Missing required file: {}", required))
                        .with_file(sample_ref.clone()),
                ),
            }
        }

        let has_goal = self
            .policy
            .goal_indicators
            .iter()
            .any(|name| sample.join(name).exists());
        if !has_goal && !self.policy.goal_indicators.is_empty() {
            issues.push(
                Issue::warning(STEP, "No goal indicator found")
                    .with_details(format!(
                        "Expected one of: {}",
                        self.policy.goal_indicators.join(", ")
                    ))
                    .with_file(sample_ref.clone()),
            );
        }

        self.check_prompt(&sample.join(&self.policy.prompt_filename), issues);

        let video = sample.join(&self.policy.video_filename);
        match fs::symlink_metadata(&video) {
            Ok(meta) if meta.file_type().is_symlink() => issues.push(
                Issue::warning(STEP, "Could not validate video: symbolic link")
                    .with_file(video.display().to_string()),
            ),
            Ok(meta) if meta.is_file() => self.check_video(&video, issues),
            _ => {}
        }
    }

    /// Only regular files are read, and never past `MAX_PROMPT_BYTES`
    fn check_prompt(&self, path: &Path, issues: &mut Vec<Issue>) {
        let Ok(meta) = fs::symlink_metadata(path) else {
            return;
        };
        if !meta.is_file() {
            return;
        }
        if meta.len() > MAX_PROMPT_BYTES {
            issues.push(
                Issue::warning(
                    STEP,
                    format!("Prompt too long: {} bytes (max {})", meta.len(), MAX_PROMPT_BYTES),
                )
                .with_file(path.display().to_string()),
            );
            return;
        }
        let mut bytes = Vec::new();
        let read = fs::File::open(path)
            .and_then(|file| file.take(MAX_PROMPT_BYTES).read_to_end(&mut bytes));
        if let Err(e) = read {
            log::warn!("Cannot read prompt {}: {}", path.display(), e);
            return;
        }
        let words = String::from_utf8_lossy(&bytes).split_whitespace().count();
        if words > self.policy.prompt_word_limit {
            issues.push(
                Issue::warning(
                    STEP,
                    format!(
                        "Prompt too long: {} words (max {})",
                        words, self.policy.prompt_word_limit
                    ),
                )
                .with_file(path.display().to_string()),
            );
        }
    }

    /// Best-effort: probe failures other than an unopenable file only warn
    fn check_video(&self, path: &Path, issues: &mut Vec<Issue>) {
        let file = path.display().to_string();
        match self.probe.probe(path) {
            Err(ProbeError::Unopenable(reason)) => issues.push(
                Issue::critical(STEP, "Cannot open video file")
                    .with_details(reason)
                    .with_file(file),
            ),
            Err(ProbeError::Failed(reason)) => issues.push(
                Issue::warning(STEP, format!("Could not validate video: {}", reason))
                    .with_file(file),
            ),
            Ok(info) => {
                let duration = info.duration_secs();
                if duration > self.policy.max_video_seconds {
                    issues.push(
                        Issue::warning(
                            STEP,
                            format!(
                                "Video too long: {:.1}s (max {}s)",
                                duration,
                                self.policy.max_video_seconds.trunc()
                            ),
                        )
                        .with_file(file.clone()),
                    );
                }
                if info.frame_count == 0 {
                    issues.push(Issue::critical(STEP, "Video has no frames").with_file(file));
                }
            }
        }
    }
}

fn check_task_id(task_id: &str, domain: &str, sample_ref: &str, issues: &mut Vec<Issue>) {
    let prefix = format!("{}_", domain);
    match task_id.strip_prefix(&prefix) {
        None => issues.push(
            Issue::critical(STEP, format!("Task ID doesn't match domain: {}", task_id))
                .with_details(format!("Expected prefix '{}'", prefix))
                .with_file(sample_ref.to_string()),
        ),
        Some(index) if index.is_empty() || !index.chars().all(|c| c.is_ascii_digit()) => issues
            .push(
                Issue::warning(STEP, format!("Task ID has non-standard format: {}", task_id))
                    .with_details(format!("Expected {}NNNN", prefix))
                    .with_file(sample_ref.to_string()),
            ),
        Some(_) => {}
    }
}

/// Immediate subdirectories, sorted by name
pub fn sample_dirs(output_dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(output_dir) else {
        return Vec::new();
    };
    let mut dirs: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_ok_and(|t| t.is_dir()))
        .map(|e| e.path())
        .collect();
    dirs.sort();
    dirs
}
