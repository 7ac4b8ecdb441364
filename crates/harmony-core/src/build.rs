//! Build wrapper operations: clean and assemble.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::info;

use crate::constants::BUILD_OUTPUT_LINES;
use crate::error::HarmonyError;
use crate::exec::{self, CommandSpec, ExecutionResult};
use crate::locate::{resolve_tool, Toolchain};
use crate::target::{assemble_args, clean_args, AssembleParams, BuildTarget};

/// A resolved build wrapper executable, always run from within the
/// project directory.
#[derive(Debug, Clone)]
pub struct BuildWrapper {
    executable: PathBuf,
}

impl BuildWrapper {
    pub fn locate(configured: &str) -> Result<Self, HarmonyError> {
        let executable = resolve_tool(Toolchain::BuildWrapper, configured)?;
        Ok(Self { executable })
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }

    pub async fn run(
        &self,
        args: Vec<String>,
        project_dir: &Path,
        timeout: Duration,
    ) -> Result<ExecutionResult, HarmonyError> {
        if !project_dir.is_dir() {
            return Err(HarmonyError::InvalidArgument(format!(
                "project directory '{}' does not exist or is not a directory",
                project_dir.display()
            )));
        }

        let spec = CommandSpec::new(self.executable.clone(), args, timeout, BUILD_OUTPUT_LINES)
            .current_dir(project_dir.to_path_buf());
        exec::run(spec).await
    }

    /// Removes build outputs.
    pub async fn clean(
        &self,
        project_dir: &Path,
        no_daemon: bool,
        timeout: Duration,
    ) -> Result<ExecutionResult, HarmonyError> {
        self.run(clean_args(no_daemon), project_dir, timeout).await
    }

    /// Builds the given target kind. Argument shaping is validated before
    /// the process starts; an unsupported kind never spawns anything.
    pub async fn assemble(
        &self,
        project_dir: &Path,
        target: BuildTarget,
        params: &AssembleParams,
        timeout: Duration,
    ) -> Result<ExecutionResult, HarmonyError> {
        let args = assemble_args(target, params);
        info!("assembling {} in {}", target, project_dir.display());
        self.run(args, project_dir, timeout).await
    }
}
