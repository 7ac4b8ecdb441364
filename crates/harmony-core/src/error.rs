use std::path::PathBuf;

use thiserror::Error;

/// Errors that prevent an operation from even touching an external process.
///
/// Non-zero exit codes and timeouts are *not* errors — they are reported as
/// data inside [`crate::exec::ExecutionResult`].
#[derive(Debug, Error)]
pub enum HarmonyError {
    #[error(
        "{} not found: '{}' is not an executable file or a directory containing one (probed: {})",
        .tool,
        .configured,
        probed_list(.candidates)
    )]
    ToolNotFound {
        tool: &'static str,
        configured: String,
        candidates: Vec<PathBuf>,
    },

    #[error("invalid build target '{0}': must be one of hap, hsp, har, app")]
    InvalidTarget(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("failed to start '{}': {}", .command_line, .source)]
    Spawn {
        command_line: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to create directory '{}': {}", .path.display(), .source)]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn probed_list(candidates: &[PathBuf]) -> String {
    candidates
        .iter()
        .map(|c| c.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
