//! Resolves loosely-specified tool locations to concrete executables.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::constants::{BUILD_TOOL_NAME, DEVICE_TOOL_NAME};
use crate::error::HarmonyError;

/// The two external toolchains this crate wraps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Toolchain {
    DeviceBridge,
    BuildWrapper,
}

impl Toolchain {
    pub fn primary_name(self) -> &'static str {
        match self {
            Self::DeviceBridge => DEVICE_TOOL_NAME,
            Self::BuildWrapper => BUILD_TOOL_NAME,
        }
    }
}

/// Resolves a configured path to an absolute executable path.
///
/// A bare command name (no path separator) is looked up on `PATH`, so the
/// default `hdc` works out of the box when the SDK is installed normally.
/// An executable file path is used as-is. A directory is probed for
/// `<dir>/<name>` then `<dir>/bin/<name>`; the first existing executable
/// wins. Anything else fails with [`HarmonyError::ToolNotFound`] naming
/// every probed candidate. Resolution never executes anything and is safe
/// to repeat, which is why callers re-resolve on each top-level operation
/// instead of caching in shared state.
pub fn resolve_tool(toolchain: Toolchain, configured: &str) -> Result<PathBuf, HarmonyError> {
    let name = toolchain.primary_name();

    if !configured.contains(std::path::MAIN_SEPARATOR) && !configured.starts_with('~') {
        let path_var = std::env::var_os("PATH").unwrap_or_default();
        return match find_on_path(configured, &path_var) {
            Some(found) => {
                debug!("resolved {} to {} via PATH", name, found.display());
                Ok(found)
            }
            None => Err(HarmonyError::ToolNotFound {
                tool: name,
                configured: configured.to_string(),
                candidates: std::env::split_paths(&path_var)
                    .map(|dir| dir.join(configured))
                    .collect(),
            }),
        };
    }

    let expanded = expand_home(configured);
    if is_executable_file(&expanded) {
        debug!("resolved {} to configured file {}", name, expanded.display());
        return Ok(expanded);
    }

    let candidates = vec![expanded.join(name), expanded.join("bin").join(name)];
    if expanded.is_dir() {
        for candidate in &candidates {
            if is_executable_file(candidate) {
                debug!("resolved {} to {}", name, candidate.display());
                return Ok(candidate.clone());
            }
        }
    }

    Err(HarmonyError::ToolNotFound {
        tool: name,
        configured: configured.to_string(),
        candidates,
    })
}

fn find_on_path(name: &str, path_var: &std::ffi::OsStr) -> Option<PathBuf> {
    std::env::split_paths(path_var)
        .map(|dir| dir.join(name))
        .find(|candidate| is_executable_file(candidate))
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

#[cfg(unix)]
fn is_executable_file(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable_file(path: &Path) -> bool {
    path.is_file()
}
