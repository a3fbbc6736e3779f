/// Environment hygiene for sandboxed processes
///
/// Sandboxed commands never inherit the host environment. The environment is
/// rebuilt from an explicit allow-list plus a fixed set of deterministic
/// variables pointing into the run-scoped workspace.
use crate::config::types::{Result, VerifyError};
use std::collections::BTreeMap;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

/// Loader variables that are never forwarded, whatever the allow-list says
const LOADER_VARS: &[&str] = &[
    "LD_PRELOAD",
    "LD_LIBRARY_PATH",
    "LD_AUDIT",
    "LD_BIND_NOW",
    "LD_DEBUG",
    "LD_PROFILE",
    "LD_USE_LOAD_BIAS",
    "LD_DYNAMIC_WEAK",
];

const BASE_PATH: &str = "/usr/local/bin:/usr/bin:/bin";

/// Environment sanitization policy
#[derive(Debug, Clone)]
pub struct EnvPolicy {
    /// Host variables copied through unchanged when present
    pub preserve: Vec<String>,
    /// Directories prepended to the deterministic PATH
    pub path_prefix: Vec<PathBuf>,
    pub home: PathBuf,
    pub tmpdir: PathBuf,
}

impl EnvPolicy {
    pub fn new(home: PathBuf, tmpdir: PathBuf) -> Self {
        Self {
            preserve: Vec::new(),
            path_prefix: Vec::new(),
            home,
            tmpdir,
        }
    }

    pub fn with_preserved(mut self, vars: &[String]) -> Self {
        self.preserve.extend(vars.iter().cloned());
        self
    }

    pub fn with_path_prefix(mut self, dir: PathBuf) -> Self {
        self.path_prefix.push(dir);
        self
    }
}

/// Environment hygiene manager
pub struct EnvHygiene {
    policy: EnvPolicy,
}

impl EnvHygiene {
    pub fn new(policy: EnvPolicy) -> Self {
        Self { policy }
    }

    /// Sanitized environment built from the current process environment
    pub fn sanitize_environment(&self) -> BTreeMap<String, String> {
        self.sanitize_from(std::env::vars())
    }

    /// Sanitized environment built from an explicit variable source
    pub fn sanitize_from<I>(&self, vars: I) -> BTreeMap<String, String>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut env_map = BTreeMap::new();

        for (key, value) in vars {
            if !self.policy.preserve.iter().any(|p| p == &key) {
                continue;
            }
            if is_loader_var(&key) {
                log::warn!("Refusing to forward loader variable: {}", key);
                continue;
            }
            env_map.insert(key, value);
        }

        let mut path_parts: Vec<String> = self
            .policy
            .path_prefix
            .iter()
            .map(|p| p.display().to_string())
            .collect();
        path_parts.push(BASE_PATH.to_string());
        env_map.insert("PATH".to_string(), path_parts.join(":"));

        let home = self.policy.home.display().to_string();
        let tmp = self.policy.tmpdir.display().to_string();
        env_map.insert("HOME".to_string(), home);
        env_map.insert("TMPDIR".to_string(), tmp.clone());
        env_map.insert("TEMP".to_string(), tmp.clone());
        env_map.insert("TMP".to_string(), tmp);

        for (key, value) in [
            ("LANG", "C.UTF-8"),
            ("LC_ALL", "C.UTF-8"),
            ("PYTHONDONTWRITEBYTECODE", "1"),
            ("PYTHONNOUSERSITE", "1"),
            ("PYTHONUNBUFFERED", "1"),
            ("PIP_DISABLE_PIP_VERSION_CHECK", "1"),
            ("PIP_NO_INPUT", "1"),
            ("MPLBACKEND", "Agg"),
        ] {
            env_map.insert(key.to_string(), value.to_string());
        }

        env_map
    }
}

pub fn is_loader_var(name: &str) -> bool {
    LOADER_VARS.contains(&name) || name.starts_with("LD_")
}

/// Restrict a workspace directory to its owner
pub fn set_owner_only(path: &Path) -> Result<()> {
    fs::set_permissions(path, fs::Permissions::from_mode(0o700)).map_err(|e| {
        VerifyError::Workspace(format!(
            "Failed to set permissions on {}: {}",
            path.display(),
            e
        ))
    })
}
