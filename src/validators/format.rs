/// Code format and naming validation
use crate::config::policy::SubmissionPolicy;
use crate::config::types::{Issue, Result, StepDetails, StepKind, StepResult, VerifyError};
use crate::validators::domain::extract_domain;
use regex::Regex;
use serde_json::Value;
use std::fs;
use std::path::Path;

const STEP: StepKind = StepKind::Format;

const DOMAIN_NAME: &str = r"^[a-z][a-z0-9_]*$";

/// Most unpinned manifest entries listed in one warning
const UNPINNED_LISTED: usize = 3;

pub struct FormatValidator<'a> {
    policy: &'a SubmissionPolicy,
    domain_name: Regex,
    off_by_one: Vec<Regex>,
}

impl<'a> FormatValidator<'a> {
    /// Compiles the policy's patterns; an invalid one is a configuration error
    pub fn new(policy: &'a SubmissionPolicy) -> Result<Self> {
        let domain_name = compile(DOMAIN_NAME, "domain name")?;
        let off_by_one = policy
            .off_by_one_patterns
            .iter()
            .map(|pattern| compile(pattern, "off_by_one"))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            policy,
            domain_name,
            off_by_one,
        })
    }

    /// Run every format check. The detected domain is carried in the
    /// `domain` detail (null when none was found).
    pub fn validate(&self, root: &Path) -> StepResult {
        let mut issues = Vec::new();

        let domain = self.extract_domain(root, &mut issues);
        if let Some(domain) = &domain {
            self.check_domain_naming(domain, &mut issues);
        }
        self.check_identifier_template(root, &mut issues);
        self.check_output_naming(root, &mut issues);
        self.check_manifest(root, &mut issues);

        let mut details = StepDetails::new();
        details.insert(
            "domain".to_string(),
            domain.map(Value::String).unwrap_or(Value::Null),
        );

        StepResult::from_issues(STEP, issues, details)
    }

    fn extract_domain(&self, root: &Path, issues: &mut Vec<Issue>) -> Option<String> {
        let config = &self.policy.config_source;
        let found = read_source(&root.join(config)).and_then(|source| extract_domain(&source));

        match found {
            Some(found) => {
                log::debug!("Domain '{}' found via {:?} extraction", found.value, found.strategy);
                Some(found.value)
            }
            None => {
                issues.push(
                    Issue::critical(STEP, format!("Could not extract 'domain' from {}", file_name(config)))
                        .with_file(config.clone()),
                );
                None
            }
        }
    }

    fn check_domain_naming(&self, domain: &str, issues: &mut Vec<Issue>) {
        let config = &self.policy.config_source;
        if !self.domain_name.is_match(domain) {
            issues.push(
                Issue::critical(STEP, format!("Invalid domain format: '{}'", domain))
                    .with_details(
                        "Domain must be lowercase with underscores (e.g., 'my_task', not 'MyTask')",
                    )
                    .with_file(config.clone()),
            );
        }

        if domain.starts_with('_') || domain.ends_with('_') {
            issues.push(
                Issue::warning(
                    STEP,
                    format!("Domain should not start/end with underscore: '{}'", domain),
                )
                .with_file(config.clone()),
            );
        }
    }

    fn check_identifier_template(&self, root: &Path, issues: &mut Vec<Issue>) {
        let base = &self.policy.base_generator_source;
        let Some(content) = read_source(&root.join(base)) else {
            issues.push(
                Issue::warning(
                    STEP,
                    format!("Cannot verify task_id format - {} not found", base),
                )
                .with_details("Expected format: {domain}_{i:04d} starting from 0000"),
            );
            return;
        };

        let spelled = self
            .policy
            .id_template_spellings
            .iter()
            .any(|spelling| content.contains(spelling.as_str()));
        if !spelled {
            issues.push(
                Issue::critical(
                    STEP,
                    format!("Incorrect task_id format in {}", file_name(base)),
                )
                .with_details("Should use format: {domain}_{i:04d} (e.g., maze_0000, maze_0001)")
                .with_file(base.clone()),
            );
        }

        if self.off_by_one.iter().any(|re| re.is_match(&content)) {
            issues.push(
                Issue::critical(STEP, "task_id should start from 0000, not 1")
                    .with_details("Use range(num_samples), not range(1, num_samples+1)")
                    .with_file(base.clone()),
            );
        }
    }

    fn check_output_naming(&self, root: &Path, issues: &mut Vec<Issue>) {
        let writer = &self.policy.output_writer_source;
        let Some(content) = read_source(&root.join(writer)) else {
            issues.push(Issue::info(
                STEP,
                format!("Cannot verify output file naming - {} not found", writer),
            ));
            return;
        };

        let video = &self.policy.video_filename;
        if !content.contains(video.as_str()) {
            issues.push(
                Issue::critical(STEP, format!("Video file must be named '{}'", video))
                    .with_file(writer.clone()),
            );
        }

        for filename in &self.policy.auxiliary_filenames {
            if !content.contains(filename.as_str()) {
                issues.push(
                    Issue::warning(
                        STEP,
                        format!("Expected output file '{}' not found in writer", filename),
                    )
                    .with_file(writer.clone()),
                );
            }
        }
    }

    fn check_manifest(&self, root: &Path, issues: &mut Vec<Issue>) {
        let manifest = &self.policy.dependency_manifest;
        let Some(content) = read_source(&root.join(manifest)) else {
            return;
        };

        let unpinned: Vec<&str> = manifest_entries(&content)
            .filter(|entry| !entry.contains("=="))
            .collect();

        if !unpinned.is_empty() {
            let listed: Vec<&str> = unpinned.iter().take(UNPINNED_LISTED).copied().collect();
            issues.push(
                Issue::warning(
                    STEP,
                    format!("Unpinned dependencies found: {}", listed.join(", ")),
                )
                .with_details("Consider pinning versions (e.g., package==1.2.3)")
                .with_file(manifest.clone()),
            );
        }
    }
}

/// Requirement entries: non-blank, non-comment, not a pip option line
fn manifest_entries(content: &str) -> impl Iterator<Item = &str> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#') && !line.starts_with('-'))
}

fn compile(pattern: &str, what: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| {
        VerifyError::Config(format!("invalid {} pattern '{}': {}", what, pattern, e))
    })
}

fn read_source(path: &Path) -> Option<String> {
    fs::read(path)
        .ok()
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
}

fn file_name(relative: &str) -> &str {
    relative.rsplit('/').next().unwrap_or(relative)
}

/// Domain recorded by a format step result
pub fn detected_domain(result: &StepResult) -> Option<String> {
    result.detail_str("domain").map(str::to_string)
}
