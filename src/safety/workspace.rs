/// Run-scoped sandbox workspace
///
/// Each output validation gets its own directory under the sandbox root,
/// named by a fresh run id. The virtual environment, HOME and TMPDIR of the
/// sandboxed processes all live inside it, so removing the directory removes
/// every trace of the run.
use crate::config::types::{Result, VerifyError};
use crate::observability::audit::events;
use crate::utils::env_hygiene::set_owner_only;
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

pub struct Workspace {
    run_id: String,
    run_dir: PathBuf,
    cleaned: bool,
}

impl Workspace {
    /// Create a new workspace below `base_dir`
    pub fn new(base_dir: &Path) -> Result<Self> {
        let run_id = Uuid::new_v4().to_string();
        let run_dir = base_dir.join(&run_id);

        fs::create_dir_all(&run_dir).map_err(|e| {
            VerifyError::Workspace(format!(
                "Failed to create workspace directory {}: {}",
                run_dir.display(),
                e
            ))
        })?;
        set_owner_only(&run_dir)?;

        let workspace = Self {
            run_id,
            run_dir,
            cleaned: false,
        };

        for dir in [workspace.home_dir(), workspace.tmp_dir()] {
            fs::create_dir_all(&dir).map_err(|e| {
                VerifyError::Workspace(format!("Failed to create {}: {}", dir.display(), e))
            })?;
        }

        log::debug!("Created workspace {}", workspace.run_dir.display());
        Ok(workspace)
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    pub fn venv_dir(&self) -> PathBuf {
        self.run_dir.join("venv")
    }

    pub fn home_dir(&self) -> PathBuf {
        self.run_dir.join("home")
    }

    pub fn tmp_dir(&self) -> PathBuf {
        self.run_dir.join("tmp")
    }

    /// Remove the workspace (idempotent, best-effort)
    pub fn cleanup(&mut self) {
        if self.cleaned {
            return;
        }
        self.cleaned = true;

        if !self.run_dir.exists() {
            return;
        }

        match fs::remove_dir_all(&self.run_dir) {
            Ok(()) => events::cleanup_success(&self.run_dir),
            Err(e) => {
                // Swallowed: a stale directory must not change the verdict
                events::cleanup_failure(&self.run_dir, &e.to_string());
            }
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        self.cleanup();
    }
}
