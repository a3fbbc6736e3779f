/// File structure validation
use crate::config::policy::SubmissionPolicy;
use crate::config::types::{Issue, StepDetails, StepKind, StepResult};
use serde_json::json;
use std::fs;
use std::path::Path;
use walkdir::{DirEntry, WalkDir};

const STEP: StepKind = StepKind::Structure;

pub struct StructureValidator<'a> {
    policy: &'a SubmissionPolicy,
}

impl<'a> StructureValidator<'a> {
    pub fn new(policy: &'a SubmissionPolicy) -> Self {
        Self { policy }
    }

    pub fn validate(&self, root: &Path) -> StepResult {
        let mut issues = Vec::new();

        let dirs_found = self.check_required_dirs(root, &mut issues);
        let files_found = self.check_required_files(root, &mut issues);
        self.check_template_residue(root, &mut issues);
        self.check_entry_point(root, &mut issues);

        let mut details = StepDetails::new();
        details.insert("required_files_found".to_string(), json!(files_found));
        details.insert("required_dirs_found".to_string(), json!(dirs_found));

        StepResult::from_issues(STEP, issues, details)
    }

    fn check_required_dirs(&self, root: &Path, issues: &mut Vec<Issue>) -> usize {
        let mut found = 0;
        for dir in &self.policy.required_dirs {
            let path = root.join(dir);
            if path.is_dir() {
                found += 1;
            } else {
                issues.push(
                    Issue::critical(STEP, format!("Missing required directory: {}", dir))
                        .with_file(path.display().to_string()),
                );
            }
        }
        found
    }

    fn check_required_files(&self, root: &Path, issues: &mut Vec<Issue>) -> usize {
        let mut found = 0;
        for file in &self.policy.required_files {
            let path = root.join(file);
            match fs::metadata(&path) {
                Ok(meta) if meta.is_file() => {
                    found += 1;
                    if meta.len() == 0 {
                        issues.push(
                            Issue::warning(STEP, format!("File is empty: {}", file))
                                .with_file(path.display().to_string()),
                        );
                    }
                }
                _ => issues.push(
                    Issue::critical(STEP, format!("Missing required file: {}", file))
                        .with_file(path.display().to_string()),
                ),
            }
        }
        found
    }

    /// One warning per (file, marker) pair, files in path order
    fn check_template_residue(&self, root: &Path, issues: &mut Vec<Issue>) {
        if self.policy.template_markers.is_empty() {
            return;
        }

        let sources = WalkDir::new(root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_hidden_or_cache(e))
            .filter_map(|e| match e {
                Ok(entry) => Some(entry),
                Err(err) => {
                    log::debug!("Skipping unreadable entry: {}", err);
                    None
                }
            })
            .filter(|e| e.file_type().is_file())
            .filter(|e| {
                e.path()
                    .extension()
                    .is_some_and(|ext| ext == self.policy.source_extension.as_str())
            });

        for entry in sources {
            let content = match fs::read(entry.path()) {
                Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
                Err(e) => {
                    log::debug!("Cannot read {}: {}", entry.path().display(), e);
                    continue;
                }
            };
            let relative = entry
                .path()
                .strip_prefix(root)
                .unwrap_or(entry.path())
                .display()
                .to_string();

            for marker in &self.policy.template_markers {
                if content.contains(marker.as_str()) {
                    issues.push(
                        Issue::warning(STEP, format!("Template keyword '{}' found in code", marker))
                            .with_details("May contain residual template content")
                            .with_file(relative.clone()),
                    );
                }
            }
        }
    }

    fn check_entry_point(&self, root: &Path, issues: &mut Vec<Issue>) {
        let path = root.join(&self.policy.entry_point);
        let Ok(bytes) = fs::read(&path) else {
            return;
        };
        if !String::from_utf8_lossy(&bytes).contains(self.policy.script_guard.as_str()) {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| self.policy.entry_point.clone());
            issues.push(
                Issue::warning(STEP, format!("{} missing __main__ entry point", name))
                    .with_file(path.display().to_string()),
            );
        }
    }
}

fn is_hidden_or_cache(entry: &DirEntry) -> bool {
    let name = entry.file_name().to_string_lossy();
    name.starts_with('.') || name == "__pycache__"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::Severity;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn complete_submission(root: &Path) {
        write(root, "src/generator.py", "class MazeGenerator: pass\n");
        write(root, "src/config.py", "class C:\n    domain: str = \"maze\"\n");
        write(root, "src/prompts.py", "PROMPTS = []\n");
        write(root, "src/__init__.py", "# package\n");
        write(root, "examples/generate.py", "if __name__ == \"__main__\":\n    main()\n");
        write(root, "requirements.txt", "numpy==1.26.4\n");
        write(root, "README.md", "# Maze\n");
        fs::create_dir_all(root.join("core")).unwrap();
    }

    #[test]
    fn test_complete_submission_passes() {
        let dir = tempfile::tempdir().unwrap();
        complete_submission(dir.path());
        let policy = SubmissionPolicy::default();
        let result = StructureValidator::new(&policy).validate(dir.path());
        assert!(result.passed());
        assert!(result.issues().is_empty());
        assert_eq!(result.details()["required_files_found"], json!(7));
        assert_eq!(result.details()["required_dirs_found"], json!(3));
    }

    #[test]
    fn test_missing_and_empty_files() {
        let dir = tempfile::tempdir().unwrap();
        complete_submission(dir.path());
        fs::remove_file(dir.path().join("src/prompts.py")).unwrap();
        fs::write(dir.path().join("README.md"), "").unwrap();
        fs::remove_dir_all(dir.path().join("core")).unwrap();

        let policy = SubmissionPolicy::default();
        let result = StructureValidator::new(&policy).validate(dir.path());
        assert!(!result.passed());
        assert_eq!(result.count(Severity::Critical), 2);
        assert_eq!(result.count(Severity::Warning), 1);
        assert!(result
            .issues()
            .iter()
            .any(|i| i.message() == "Missing required file: src/prompts.py"));
        assert!(result
            .issues()
            .iter()
            .any(|i| i.message() == "File is empty: README.md"));
        assert_eq!(result.details()["required_dirs_found"], json!(2));
    }

    #[test]
    fn test_template_marker_once_per_file_and_marker() {
        let dir = tempfile::tempdir().unwrap();
        complete_submission(dir.path());
        write(
            dir.path(),
            "src/generator.py",
            "# chess leftovers\nclass MazeGenerator:\n    name = 'chess'\n",
        );
        write(dir.path(), "src/__pycache__/generator.py", "chess\n");
        write(dir.path(), ".venv/lib/site.py", "chess\n");

        let policy = SubmissionPolicy::default();
        let result = StructureValidator::new(&policy).validate(dir.path());
        let chess: Vec<_> = result
            .issues()
            .iter()
            .filter(|i| i.message() == "Template keyword 'chess' found in code")
            .collect();
        assert_eq!(chess.len(), 1);
        assert_eq!(chess[0].file_path(), Some("src/generator.py"));
        assert!(result.passed());
    }

    #[test]
    fn test_missing_script_guard_warns() {
        let dir = tempfile::tempdir().unwrap();
        complete_submission(dir.path());
        write(dir.path(), "examples/generate.py", "main()\n");

        let policy = SubmissionPolicy::default();
        let result = StructureValidator::new(&policy).validate(dir.path());
        assert!(result.passed());
        assert_eq!(result.issues().len(), 1);
        assert_eq!(
            result.issues()[0].message(),
            "generate.py missing __main__ entry point"
        );
    }

    #[test]
    fn test_required_tables_come_from_policy() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "main.py", "if __name__ == '__main__': pass\n");
        let policy = SubmissionPolicy {
            required_dirs: vec![],
            required_files: vec!["main.py".to_string()],
            entry_point: "main.py".to_string(),
            ..Default::default()
        };
        let result = StructureValidator::new(&policy).validate(dir.path());
        assert!(result.passed());
        assert!(result.issues().is_empty());
    }
}
