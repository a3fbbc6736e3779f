/// Submission archive extraction
///
/// Archives are unpacked into a fresh temporary directory owned by the
/// returned [`ExtractedArchive`]; dropping it deletes everything.
use crate::config::policy::SubmissionPolicy;
use crate::config::types::{Issue, Result, StepDetails, StepKind, StepResult, VerifyError};
use serde::Serialize;
use serde_json::json;
use std::fs::{self, File};
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use zip::ZipArchive;

const S_IFMT: u32 = 0o170000;
const S_IFLNK: u32 = 0o120000;

/// How the submission was packed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Layout {
    /// Everything inside one top-level folder
    Wrapped,
    /// Project files at the archive root
    Flat,
}

impl Layout {
    pub fn as_str(&self) -> &'static str {
        match self {
            Layout::Wrapped => "wrapped",
            Layout::Flat => "flat",
        }
    }
}

#[derive(Debug)]
pub struct ExtractedArchive {
    temp: TempDir,
    root: PathBuf,
    layout: Layout,
    entries: usize,
}

impl ExtractedArchive {
    /// Resolved submission root
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    /// Temporary directory holding the extracted tree
    pub fn temp_path(&self) -> &Path {
        self.temp.path()
    }

    pub fn entries(&self) -> usize {
        self.entries
    }

    /// Successful extraction step
    pub fn step_result(&self) -> StepResult {
        let mut details = StepDetails::new();
        details.insert("root".to_string(), json!(self.root.display().to_string()));
        details.insert("layout".to_string(), json!(self.layout.as_str()));
        details.insert("entries".to_string(), json!(self.entries));
        StepResult::from_issues(StepKind::Extraction, Vec::new(), details)
    }
}

/// Failed extraction step; the run ends with it
pub fn extraction_failure(error: &VerifyError) -> StepResult {
    StepResult::from_issues(
        StepKind::Extraction,
        vec![Issue::critical(StepKind::Extraction, "Failed to extract zip file")
            .with_details(error.to_string())],
        StepDetails::new(),
    )
}

pub struct ArchiveExtractor<'a> {
    policy: &'a SubmissionPolicy,
}

impl<'a> ArchiveExtractor<'a> {
    pub fn new(policy: &'a SubmissionPolicy) -> Self {
        Self { policy }
    }

    pub fn extract(&self, archive: &Path) -> Result<ExtractedArchive> {
        let temp = tempfile::Builder::new()
            .prefix("genverify-extract-")
            .tempdir()
            .map_err(|e| VerifyError::Workspace(format!("Failed to create temp dir: {}", e)))?;

        let entries = unpack(archive, temp.path())?;
        let (root, layout) = self.resolve_root(temp.path())?;
        log::debug!(
            "Extracted {} entries from {} ({} layout)",
            entries,
            archive.display(),
            layout.as_str()
        );

        Ok(ExtractedArchive {
            temp,
            root,
            layout,
            entries,
        })
    }

    /// A single remaining top-level directory is the root; otherwise the
    /// extraction directory itself is.
    fn resolve_root(&self, dir: &Path) -> Result<(PathBuf, Layout)> {
        let mut kept = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if self.policy.is_excluded_archive_name(&name) {
                continue;
            }
            kept.push(entry.path());
        }

        match kept.as_slice() {
            [only] if only.is_dir() => Ok((only.clone(), Layout::Wrapped)),
            _ => Ok((dir.to_path_buf(), Layout::Flat)),
        }
    }
}

/// Unpack every entry below `dest`, refusing entries that would land outside it
fn unpack(archive: &Path, dest: &Path) -> Result<usize> {
    let file = File::open(archive).map_err(|e| {
        VerifyError::Archive(format!("Cannot open {}: {}", archive.display(), e))
    })?;
    let mut zip = ZipArchive::new(file).map_err(|e| VerifyError::Archive(e.to_string()))?;

    for i in 0..zip.len() {
        let mut entry = zip
            .by_index(i)
            .map_err(|e| VerifyError::Archive(e.to_string()))?;

        let Some(relative) = entry.enclosed_name() else {
            return Err(VerifyError::Archive(format!(
                "Entry escapes extraction root: {}",
                entry.name()
            )));
        };
        let target = dest.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&target)?;
            continue;
        }

        let mode = entry.unix_mode();
        if mode.is_some_and(|m| m & S_IFMT == S_IFLNK) {
            log::warn!("Skipping symbolic link entry: {}", entry.name());
            continue;
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&target)?;
        io::copy(&mut entry, &mut out).map_err(|e| {
            VerifyError::Archive(format!("Failed to extract {}: {}", entry.name(), e))
        })?;

        if let Some(mode) = mode {
            // Keep execute bits, drop setuid/setgid/sticky
            fs::set_permissions(&target, fs::Permissions::from_mode((mode & 0o755) | 0o600))?;
        }
    }

    Ok(zip.len())
}
