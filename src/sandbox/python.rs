use crate::config::loader::VerifierConfig;
use crate::exec::CommandSpec;
use crate::safety::workspace::Workspace;
use crate::sandbox::adapter::SandboxAdapter;
use crate::utils::env_hygiene::{EnvHygiene, EnvPolicy};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Python virtual environment sandbox
#[derive(Debug, Clone)]
pub struct PythonVenvAdapter {
    python: PathBuf,
    preserve_env: Vec<String>,
    entry_point: String,
    dependency_manifest: String,
    package_marker: String,
    create_timeout: Duration,
    install_timeout: Duration,
    package_timeout: Duration,
    execute_timeout: Duration,
}

impl PythonVenvAdapter {
    pub fn from_config(config: &VerifierConfig) -> Self {
        Self {
            python: resolve_program(&config.python),
            preserve_env: config.preserve_env.clone(),
            entry_point: config.policy.entry_point.clone(),
            dependency_manifest: config.policy.dependency_manifest.clone(),
            package_marker: config.policy.package_marker.clone(),
            create_timeout: config.create_timeout(),
            install_timeout: config.install_timeout(),
            package_timeout: config.package_timeout(),
            execute_timeout: config.execute_timeout(),
        }
    }

    fn venv_python(workspace: &Workspace) -> PathBuf {
        workspace.venv_dir().join("bin").join("python")
    }

    fn environment(&self, workspace: &Workspace) -> BTreeMap<String, String> {
        let policy = EnvPolicy::new(workspace.home_dir(), workspace.tmp_dir())
            .with_preserved(&self.preserve_env)
            .with_path_prefix(workspace.venv_dir().join("bin"));
        let mut env = EnvHygiene::new(policy).sanitize_environment();
        env.insert(
            "VIRTUAL_ENV".to_string(),
            workspace.venv_dir().display().to_string(),
        );
        env
    }
}

impl SandboxAdapter for PythonVenvAdapter {
    fn runtime(&self) -> &'static str {
        "python-venv"
    }

    fn create_command(&self, workspace: &Workspace, root: &Path) -> CommandSpec {
        let mut env = self.environment(workspace);
        // The venv does not exist yet
        env.remove("VIRTUAL_ENV");
        CommandSpec::new("create virtual environment", &self.python, root)
            .args(["-m", "venv"])
            .arg(workspace.venv_dir().display().to_string())
            .env(env)
            .timeout(self.create_timeout)
    }

    fn install_deps_command(&self, workspace: &Workspace, root: &Path) -> Option<CommandSpec> {
        if !root.join(&self.dependency_manifest).is_file() {
            return None;
        }
        Some(
            CommandSpec::new("install dependencies", Self::venv_python(workspace), root)
                .args(["-m", "pip", "install", "--quiet", "-r"])
                .arg(self.dependency_manifest.as_str())
                .env(self.environment(workspace))
                .timeout(self.install_timeout),
        )
    }

    fn install_package_command(&self, workspace: &Workspace, root: &Path) -> Option<CommandSpec> {
        if !root.join(&self.package_marker).is_file() {
            return None;
        }
        Some(
            CommandSpec::new("install package", Self::venv_python(workspace), root)
                .args(["-m", "pip", "install", "--quiet", "-e", "."])
                .env(self.environment(workspace))
                .timeout(self.package_timeout),
        )
    }

    fn execute_command(
        &self,
        workspace: &Workspace,
        root: &Path,
        num_samples: usize,
    ) -> CommandSpec {
        CommandSpec::new("run generator", Self::venv_python(workspace), root)
            .arg(self.entry_point.as_str())
            .arg("--num-samples")
            .arg(num_samples.to_string())
            .env(self.environment(workspace))
            .timeout(self.execute_timeout)
    }

    fn entry_point(&self) -> &str {
        &self.entry_point
    }
}

/// Resolve a bare interpreter name against the host PATH.
///
/// Sandboxed commands run with a cleared environment, so the lookup has to
/// happen here. Unresolvable names are returned unchanged and fail at spawn.
fn resolve_program(program: &str) -> PathBuf {
    if program.contains('/') {
        return PathBuf::from(program);
    }
    std::env::var_os("PATH")
        .and_then(|paths| {
            std::env::split_paths(&paths)
                .map(|dir| dir.join(program))
                .find(|candidate| candidate.is_file())
        })
        .unwrap_or_else(|| PathBuf::from(program))
}
