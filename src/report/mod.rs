//! Verification reports
//!
//! A JSON document for machines and a `.txt` sibling for people. Both are
//! written atomically so a crash never leaves half a report behind.

use crate::config::types::{Result, Severity, VerificationResult, VerifyError};
use chrono::Local;
use serde_json::{json, Value};
use std::fs;
use std::io::Write;
use std::path::Path;

const RULE: &str = "============================================================";
const THIN_RULE: &str = "------------------------------------------------------------";

pub struct ReportGenerator;

impl ReportGenerator {
    /// Write `path` (JSON) and `path` with a `.txt` extension
    pub fn save(result: &VerificationResult, path: &Path) -> Result<()> {
        let report = Self::build_report(result);
        let json = serde_json::to_string_pretty(&report)
            .map_err(|e| VerifyError::Report(format!("Failed to serialize report: {}", e)))?;
        atomic_write(path, json.as_bytes())?;

        let text_path = path.with_extension("txt");
        atomic_write(&text_path, Self::build_text_report(result).as_bytes())?;

        log::info!("Report written to {}", path.display());
        Ok(())
    }

    pub fn build_report(result: &VerificationResult) -> Value {
        let steps: Vec<Value> = result
            .steps()
            .iter()
            .map(|step| {
                let issues: Vec<Value> = step
                    .issues()
                    .iter()
                    .map(|issue| {
                        json!({
                            "severity": issue.severity().as_str(),
                            "message": issue.message(),
                            "details": issue.details(),
                            "file": issue.file_path(),
                        })
                    })
                    .collect();
                json!({
                    "name": step.step_name(),
                    "passed": step.passed(),
                    "issues": issues,
                    "details": step.details(),
                })
            })
            .collect();

        json!({
            "timestamp": Local::now().to_rfc3339(),
            "generator": result.generator_path(),
            "domain": result.domain(),
            "status": status(result.passed()),
            "summary": {
                "total_issues": result.total_issues(),
                "critical_issues": result.critical_issues(),
                "warning_issues": result.warning_issues(),
            },
            "steps": steps,
        })
    }

    pub fn build_text_report(result: &VerificationResult) -> String {
        let mut lines = vec![
            RULE.to_string(),
            "VERIFICATION REPORT".to_string(),
            RULE.to_string(),
            format!("Generator: {}", result.generator_path()),
            format!("Domain: {}", result.domain().unwrap_or("N/A")),
            format!("Status: {}", status(result.passed())),
            format!("Timestamp: {}", Local::now().format("%Y-%m-%d %H:%M:%S")),
            String::new(),
            "SUMMARY".to_string(),
            THIN_RULE.to_string(),
            format!("Total Issues: {}", result.total_issues()),
            format!("  - Critical: {}", result.critical_issues()),
            format!("  - Warnings: {}", result.warning_issues()),
            String::new(),
        ];

        for step in result.steps() {
            lines.push(format!("\n{}", step.step_name()));
            lines.push(THIN_RULE.to_string());
            lines.push(format!("Status: {}", status(step.passed())));

            if step.issues().is_empty() {
                lines.push("  No issues found".to_string());
            } else {
                lines.push(format!("\nIssues ({}):", step.issues().len()));
                for issue in step.issues() {
                    lines.push(format!(
                        "  {} [{}] {}",
                        marker(issue.severity()),
                        issue.severity().as_str().to_uppercase(),
                        issue.message()
                    ));
                    if let Some(details) = issue.details() {
                        lines.push(format!("     Details: {}", details));
                    }
                    if let Some(file) = issue.file_path() {
                        lines.push(format!("     File: {}", file));
                    }
                }
            }

            if !step.details().is_empty() {
                let details = serde_json::to_string(step.details()).unwrap_or_default();
                lines.push(format!("\nDetails: {}", details));
            }
        }

        lines.push(format!("\n{}", RULE));
        lines.join("\n")
    }
}

fn status(passed: bool) -> &'static str {
    if passed {
        "PASS"
    } else {
        "FAIL"
    }
}

fn marker(severity: Severity) -> &'static str {
    match severity {
        Severity::Critical => "[x]",
        Severity::Warning => "[!]",
        Severity::Info => "[i]",
    }
}

/// Write to a temp file in the same directory, fsync, then rename over the target.
fn atomic_write(target: &Path, content: &[u8]) -> Result<()> {
    let report_err = |e: std::io::Error| {
        VerifyError::Report(format!("Failed to write {}: {}", target.display(), e))
    };
    let parent = match target.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let file_name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp_path = parent.join(format!(".{}.tmp.{}", file_name, std::process::id()));

    {
        let mut f = fs::File::create(&temp_path).map_err(report_err)?;
        f.write_all(content).map_err(report_err)?;
        f.sync_all().map_err(report_err)?;
    }
    fs::rename(&temp_path, target).map_err(report_err)?;

    if let Ok(dir) = fs::File::open(parent) {
        let _ = dir.sync_all();
    }
    Ok(())
}
