use crate::exec::CommandSpec;
use crate::safety::workspace::Workspace;
use std::path::Path;

/// Runtime adapter contract for the sandbox stages.
///
/// The state machine stays runtime-agnostic; adapters turn each stage into a
/// concrete command. A stage the submission does not need yields `None`.
pub trait SandboxAdapter: Send + Sync {
    fn runtime(&self) -> &'static str;
    fn create_command(&self, workspace: &Workspace, root: &Path) -> CommandSpec;
    fn install_deps_command(&self, workspace: &Workspace, root: &Path) -> Option<CommandSpec>;
    fn install_package_command(&self, workspace: &Workspace, root: &Path) -> Option<CommandSpec>;
    fn execute_command(&self, workspace: &Workspace, root: &Path, num_samples: usize)
        -> CommandSpec;
    /// Entry point path relative to the submission root
    fn entry_point(&self) -> &str;
}
