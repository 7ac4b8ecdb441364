//! Core logic for the Harmony Tools workspace.
//!
//! This crate wraps two external toolchains — the `hdc` device bridge and
//! the `hvigorw` build wrapper — as typed operations returning structured,
//! serializable results. Process failures and timeouts are data in those
//! results; only configuration problems (missing tool, invalid parameters)
//! surface as errors.

pub mod artifact;
pub mod build;
pub mod config;
pub mod constants;
pub mod device;
pub mod error;
pub mod exec;
pub mod locate;
pub mod target;
pub mod workflow;

pub use artifact::{find_output, ArtifactQuery, ArtifactReport};
pub use build::BuildWrapper;
pub use config::HarmonyConfig;
pub use device::{
    DeviceBridge, InstallOutcome, InstallRequest, ScreenshotOutcome, ScreenshotRequest,
};
pub use error::HarmonyError;
pub use exec::{split_arguments, CommandSpec, ExecutionResult};
pub use target::{assemble_args, clean_args, AssembleParams, BuildTarget};
pub use workflow::{StepKind, WorkflowRecorder, WorkflowStep};
