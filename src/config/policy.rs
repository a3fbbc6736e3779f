/// Submission policy tables
///
/// Everything a submission is checked against lives here as data. Validators
/// read these tables; changing what is required never touches step logic.
use serde::{Deserialize, Serialize};

/// Candidate location for generated output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputCandidate {
    /// Path relative to the submission root; `{domain}` is substituted
    pub path: String,
    /// Candidate holds task directories rather than samples
    #[serde(default)]
    pub container: bool,
}

impl OutputCandidate {
    pub fn new(path: &str, container: bool) -> Self {
        Self {
            path: path.to_string(),
            container,
        }
    }

    /// True if the path needs a detected domain
    pub fn needs_domain(&self) -> bool {
        self.path.contains("{domain}")
    }

    /// Resolve against a domain; `None` when the domain is required but unknown
    pub fn resolve(&self, domain: Option<&str>) -> Option<String> {
        match (self.needs_domain(), domain) {
            (false, _) => Some(self.path.clone()),
            (true, Some(domain)) => Some(self.path.replace("{domain}", domain)),
            (true, None) => None,
        }
    }
}

/// Declarative submission contract
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SubmissionPolicy {
    pub required_dirs: Vec<String>,
    pub required_files: Vec<String>,
    /// Leftover template markers; one warning per (file, marker)
    pub template_markers: Vec<String>,
    /// Extension of source files scanned for template markers
    pub source_extension: String,
    pub entry_point: String,
    /// Text proving the entry point runs as a script
    pub script_guard: String,
    pub config_source: String,
    pub base_generator_source: String,
    /// Accepted spellings of the `{domain}_{index:04d}` identifier template
    pub id_template_spellings: Vec<String>,
    /// Regexes matching enumeration that starts at 1
    pub off_by_one_patterns: Vec<String>,
    pub output_writer_source: String,
    pub video_filename: String,
    pub auxiliary_filenames: Vec<String>,
    pub dependency_manifest: String,
    /// Marker that makes the submission installable as a package
    pub package_marker: String,
    pub output_candidates: Vec<OutputCandidate>,
    /// Substring identifying task directories inside a container
    pub container_marker: String,
    pub sample_required_files: Vec<String>,
    /// At least one of these should be present in every sample
    pub goal_indicators: Vec<String>,
    pub prompt_filename: String,
    pub prompt_word_limit: usize,
    pub max_video_seconds: f64,
    /// Number of sample directories inspected in depth
    pub inspected_samples: usize,
    /// Top-level archive names never taken as the submission root
    pub excluded_archive_names: Vec<String>,
}

impl Default for SubmissionPolicy {
    fn default() -> Self {
        Self {
            required_dirs: strings(&["src", "examples", "core"]),
            required_files: strings(&[
                "src/generator.py",
                "src/config.py",
                "src/prompts.py",
                "src/__init__.py",
                "examples/generate.py",
                "requirements.txt",
                "README.md",
            ]),
            template_markers: strings(&["chess", "ChessGenerator", "chess_task"]),
            source_extension: "py".to_string(),
            entry_point: "examples/generate.py".to_string(),
            script_guard: "if __name__".to_string(),
            config_source: "src/config.py".to_string(),
            base_generator_source: "core/base_generator.py".to_string(),
            id_template_spellings: strings(&["{domain}_{i:04d}", "{self.config.domain}_{i:04d}"]),
            off_by_one_patterns: strings(&[r"range\(\s*1\s*,\s*num_samples"]),
            output_writer_source: "core/output_writer.py".to_string(),
            video_filename: "ground_truth.mp4".to_string(),
            auxiliary_filenames: strings(&["first_frame.png", "final_frame.png", "prompt.txt"]),
            dependency_manifest: "requirements.txt".to_string(),
            package_marker: "setup.py".to_string(),
            output_candidates: vec![
                OutputCandidate::new("data/questions/{domain}_task", false),
                OutputCandidate::new("data/{domain}_task", false),
                OutputCandidate::new("data/questions", true),
                OutputCandidate::new("data", true),
            ],
            container_marker: "_task".to_string(),
            sample_required_files: strings(&["first_frame.png", "prompt.txt"]),
            goal_indicators: strings(&["final_frame.png", "goal.txt"]),
            prompt_filename: "prompt.txt".to_string(),
            prompt_word_limit: 200,
            max_video_seconds: 10.5,
            inspected_samples: 5,
            excluded_archive_names: strings(&["__MACOSX", "__pycache__"]),
        }
    }
}

impl SubmissionPolicy {
    /// True if a top-level archive entry must not be taken as the root
    pub fn is_excluded_archive_name(&self, name: &str) -> bool {
        name.starts_with('.') || self.excluded_archive_names.iter().any(|n| n == name)
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}
