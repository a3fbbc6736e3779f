// Config validation
// Fail fast at startup on configurations that cannot produce a meaningful run

use crate::config::loader::VerifierConfig;
use crate::config::types::{Result, VerifyError};
use regex::Regex;

/// Validation result with detailed errors
#[derive(Debug)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn add_error(&mut self, error: String) {
        self.valid = false;
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: String) {
        self.warnings.push(warning);
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }
}

impl Default for ValidationResult {
    fn default() -> Self {
        Self::new()
    }
}

/// Validate config at startup. Errors are fatal, warnings are returned.
pub fn validate_config(config: &VerifierConfig) -> Result<ValidationResult> {
    let mut result = ValidationResult::new();

    validate_limits(config, &mut result);
    validate_runtime(config, &mut result);
    validate_policy(config, &mut result);

    if !result.is_valid() {
        return Err(VerifyError::Config(format!(
            "Config validation failed:\n{}",
            result.errors.join("\n")
        )));
    }

    Ok(result)
}

fn validate_limits(config: &VerifierConfig, result: &mut ValidationResult) {
    if config.num_samples == 0 {
        result.add_error("num_samples cannot be zero".to_string());
    }

    for (name, value) in [
        ("create_timeout_secs", config.create_timeout_secs),
        ("install_timeout_secs", config.install_timeout_secs),
        ("package_timeout_secs", config.package_timeout_secs),
        ("execute_timeout_secs", config.execute_timeout_secs),
    ] {
        if value == 0 {
            result.add_error(format!("{} cannot be zero", name));
        }
    }

    if config.execute_timeout_secs < 30 {
        result.add_warning(format!(
            "execute_timeout_secs {} is very low, generators rendering video may not finish",
            config.execute_timeout_secs
        ));
    }

    if config.output_capture_bytes < config.diagnostic_tail_chars {
        result.add_warning(format!(
            "output_capture_bytes ({}) is smaller than diagnostic_tail_chars ({})",
            config.output_capture_bytes, config.diagnostic_tail_chars
        ));
    }
}

fn validate_runtime(config: &VerifierConfig, result: &mut ValidationResult) {
    if config.python.trim().is_empty() {
        result.add_error("python interpreter cannot be empty".to_string());
    }

    if !config.sandbox_root.is_absolute() {
        result.add_error(format!(
            "sandbox_root must be absolute path: {:?}",
            config.sandbox_root
        ));
    }

    for var in &config.preserve_env {
        if var.starts_with("LD_") {
            result.add_error(format!("refusing to forward loader variable {}", var));
        }
    }
}

fn validate_policy(config: &VerifierConfig, result: &mut ValidationResult) {
    let policy = &config.policy;

    if policy.entry_point.trim().is_empty() {
        result.add_error("policy.entry_point cannot be empty".to_string());
    }

    if policy.output_candidates.is_empty() {
        result.add_error("policy.output_candidates cannot be empty".to_string());
    }

    if policy.inspected_samples == 0 {
        result.add_warning("policy.inspected_samples is zero, no sample will be inspected".to_string());
    }

    if policy.required_files.is_empty() && policy.required_dirs.is_empty() {
        result.add_warning("policy requires no files or directories".to_string());
    }

    if policy.id_template_spellings.is_empty() {
        result.add_warning("policy.id_template_spellings is empty, every submission will fail the identifier check".to_string());
    }

    for pattern in &policy.off_by_one_patterns {
        if let Err(e) = Regex::new(pattern) {
            result.add_error(format!("invalid off_by_one pattern '{}': {}", pattern, e));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let result = validate_config(&VerifierConfig::default()).unwrap();
        assert!(result.is_valid());
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_zero_timeout_is_rejected() {
        let config = VerifierConfig {
            execute_timeout_secs: 0,
            ..Default::default()
        };
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("execute_timeout_secs cannot be zero"));
    }

    #[test]
    fn test_loader_variables_cannot_be_preserved() {
        let mut config = VerifierConfig::default();
        config.preserve_env.push("LD_PRELOAD".to_string());
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_invalid_off_by_one_regex() {
        let mut config = VerifierConfig::default();
        config.policy.off_by_one_patterns = vec!["range(".to_string()];
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("invalid off_by_one pattern"));
    }

    #[test]
    fn test_low_execute_timeout_warns() {
        let config = VerifierConfig {
            execute_timeout_secs: 5,
            ..Default::default()
        };
        let result = validate_config(&config).unwrap();
        assert_eq!(result.warnings.len(), 1);
    }
}
