/// Verifier configuration and JSON loading
use crate::config::policy::SubmissionPolicy;
use crate::config::types::{Result, VerifyError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variables forwarded into the sandbox by default
const DEFAULT_PRESERVED_ENV: &[&str] = &[
    "HTTP_PROXY",
    "HTTPS_PROXY",
    "NO_PROXY",
    "http_proxy",
    "https_proxy",
    "no_proxy",
    "PIP_INDEX_URL",
    "PIP_EXTRA_INDEX_URL",
    "SSL_CERT_FILE",
    "REQUESTS_CA_BUNDLE",
];

/// Full verifier configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifierConfig {
    /// Samples requested from the submission's entry point
    pub num_samples: usize,
    /// Host interpreter used to build the sandbox
    pub python: String,
    /// Directory under which run-scoped sandbox workspaces are created
    pub sandbox_root: PathBuf,
    pub create_timeout_secs: u64,
    pub install_timeout_secs: u64,
    pub package_timeout_secs: u64,
    pub execute_timeout_secs: u64,
    /// Grace period between SIGTERM and SIGKILL on timeout
    pub kill_grace_ms: u64,
    /// Characters of diagnostic output kept on failure issues
    pub diagnostic_tail_chars: usize,
    /// Bytes of stdout/stderr retained per process
    pub output_capture_bytes: usize,
    pub preserve_env: Vec<String>,
    pub policy: SubmissionPolicy,
}

impl VerifierConfig {
    /// Runtime root directory scoped by effective UID.
    pub fn runtime_root_dir() -> PathBuf {
        let euid = unsafe { libc::geteuid() };
        std::env::temp_dir().join(format!("genverify-uid-{}", euid))
    }

    /// Load configuration from a JSON file; absent fields take defaults
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            VerifyError::Config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;

        let config: VerifierConfig = serde_json::from_str(&content)
            .map_err(|e| VerifyError::Config(format!("Failed to parse config JSON: {}", e)))?;

        log::debug!("Loaded verifier configuration from {}", path.display());
        Ok(config)
    }

    pub fn create_timeout(&self) -> Duration {
        Duration::from_secs(self.create_timeout_secs)
    }

    pub fn install_timeout(&self) -> Duration {
        Duration::from_secs(self.install_timeout_secs)
    }

    pub fn package_timeout(&self) -> Duration {
        Duration::from_secs(self.package_timeout_secs)
    }

    pub fn execute_timeout(&self) -> Duration {
        Duration::from_secs(self.execute_timeout_secs)
    }

    pub fn kill_grace(&self) -> Duration {
        Duration::from_millis(self.kill_grace_ms)
    }
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            num_samples: 5,
            python: "python3".to_string(),
            sandbox_root: Self::runtime_root_dir(),
            create_timeout_secs: 120,
            install_timeout_secs: 300,
            package_timeout_secs: 120,
            execute_timeout_secs: 600,
            kill_grace_ms: 250,
            diagnostic_tail_chars: 500,
            output_capture_bytes: 256 * 1024,
            preserve_env: DEFAULT_PRESERVED_ENV.iter().map(|s| s.to_string()).collect(),
            policy: SubmissionPolicy::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_timeouts() {
        let config = VerifierConfig::default();
        assert_eq!(config.create_timeout(), Duration::from_secs(120));
        assert_eq!(config.install_timeout(), Duration::from_secs(300));
        assert_eq!(config.execute_timeout(), Duration::from_secs(600));
        assert_eq!(config.num_samples, 5);
        assert!(config.preserve_env.iter().any(|v| v == "HTTPS_PROXY"));
    }

    #[test]
    fn test_load_from_file_merges_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"num_samples": 3, "execute_timeout_secs": 60, "policy": {{"prompt_word_limit": 150}}}}"#
        )
        .unwrap();

        let config = VerifierConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.num_samples, 3);
        assert_eq!(config.execute_timeout_secs, 60);
        assert_eq!(config.install_timeout_secs, 300);
        assert_eq!(config.policy.prompt_word_limit, 150);
        assert_eq!(config.policy.entry_point, "examples/generate.py");
    }

    #[test]
    fn test_load_from_file_rejects_bad_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();
        let err = VerifierConfig::load_from_file(file.path()).unwrap_err();
        assert!(matches!(err, VerifyError::Config(_)));
    }

    #[test]
    fn test_load_missing_file() {
        let err = VerifierConfig::load_from_file("/nonexistent/genverify.json").unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
