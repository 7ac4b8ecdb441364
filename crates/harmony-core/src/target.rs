//! Build target kinds and the flag vocabulary of the build wrapper.
//!
//! Everything the external tool's "assemble" and "clean" operations expect
//! is centralized here: a change in its flag vocabulary touches this file
//! and nothing else.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::Serialize;

use crate::error::HarmonyError;

/// The closed set of artifact kinds the build wrapper can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildTarget {
    /// Application package, installable on a device.
    Hap,
    /// Shared package (dynamic library bundle).
    Hsp,
    /// Static package (archive consumed at build time).
    Har,
    /// Full application bundle for store submission.
    App,
}

/// One row of the target table: the tool-specific shape of each kind.
struct TargetRow {
    kind: BuildTarget,
    name: &'static str,
    task: &'static str,
    mode: &'static str,
    suffix: &'static str,
    takes_product: bool,
}

/// New kinds are added as rows here, not as new code paths.
const TARGET_TABLE: &[TargetRow] = &[
    TargetRow {
        kind: BuildTarget::Hap,
        name: "hap",
        task: "assembleHap",
        mode: "module",
        suffix: ".hap",
        takes_product: false,
    },
    TargetRow {
        kind: BuildTarget::Hsp,
        name: "hsp",
        task: "assembleHsp",
        mode: "module",
        suffix: ".hsp",
        takes_product: false,
    },
    TargetRow {
        kind: BuildTarget::Har,
        name: "har",
        task: "assembleHar",
        mode: "module",
        suffix: ".har",
        takes_product: false,
    },
    TargetRow {
        kind: BuildTarget::App,
        name: "app",
        task: "assembleApp",
        mode: "project",
        suffix: ".app",
        takes_product: true,
    },
];

impl BuildTarget {
    fn row(self) -> &'static TargetRow {
        TARGET_TABLE
            .iter()
            .find(|row| row.kind == self)
            .expect("every BuildTarget has a table row")
    }

    pub fn as_str(self) -> &'static str {
        self.row().name
    }

    pub fn task_name(self) -> &'static str {
        self.row().task
    }

    /// Output filename suffix for this kind.
    pub fn suffix(self) -> &'static str {
        self.row().suffix
    }

    /// Whether the kind is built per-module (as opposed to project-wide).
    pub fn is_module_scoped(self) -> bool {
        self.row().mode == "module"
    }
}

impl Display for BuildTarget {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for BuildTarget {
    type Err = HarmonyError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        TARGET_TABLE
            .iter()
            .find(|row| row.name == value.to_ascii_lowercase())
            .map(|row| row.kind)
            .ok_or_else(|| HarmonyError::InvalidTarget(value.to_string()))
    }
}

/// Named parameters of an assemble invocation. Values are passed as
/// discrete arguments, never shell-interpreted.
#[derive(Debug, Clone)]
pub struct AssembleParams {
    pub module: Option<String>,
    pub product: String,
    pub build_mode: String,
    pub no_daemon: bool,
}

impl Default for AssembleParams {
    fn default() -> Self {
        Self {
            module: None,
            product: "default".to_string(),
            build_mode: "debug".to_string(),
            no_daemon: true,
        }
    }
}

/// Produces the exact flag sequence for the assemble task of `target`.
///
/// Module and build-mode flags apply to every kind; the product flag only
/// to the bundle kind. `--no-daemon` is a standalone flag, not key-value.
pub fn assemble_args(target: BuildTarget, params: &AssembleParams) -> Vec<String> {
    let row = target.row();
    let mut args = vec![
        row.task.to_string(),
        "--mode".to_string(),
        row.mode.to_string(),
    ];

    if let Some(module) = &params.module {
        args.push("-p".to_string());
        args.push(format!("module={module}"));
    }
    args.push("-p".to_string());
    args.push(format!("buildMode={}", params.build_mode));
    if row.takes_product {
        args.push("-p".to_string());
        args.push(format!("product={}", params.product));
    }
    if params.no_daemon {
        args.push("--no-daemon".to_string());
    }

    args
}

/// Argument list for the (much simpler) clean operation.
pub fn clean_args(no_daemon: bool) -> Vec<String> {
    let mut args = vec!["clean".to_string()];
    if no_daemon {
        args.push("--no-daemon".to_string());
    }
    args
}
