//! The multi-step workflow engine.
//!
//! Workflows are strict linear step sequences. The engine, not each
//! workflow, enforces the failure rule: once a required step fails, no
//! later non-cleanup step runs; cleanup steps still run (gated by the
//! caller on their setup step having succeeded) and their failures are
//! advisory only.

use std::time::Instant;

use serde::Serialize;
use tracing::{info, warn};

use crate::exec::ExecutionResult;

/// How a step participates in the failure semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepKind {
    /// Failure aborts every later non-cleanup step.
    Required,
    /// Failure is recorded but the workflow continues.
    BestEffort,
    /// Always attempted once its setup succeeded; failure never flips an
    /// otherwise-successful workflow.
    Cleanup,
}

/// One executed step with its structured outcome.
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowStep {
    pub name: &'static str,
    pub kind: StepKind,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ExecutionResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Accumulates steps for one workflow invocation and tracks whether a
/// required step has failed.
#[derive(Debug)]
pub struct WorkflowRecorder {
    steps: Vec<WorkflowStep>,
    failed: bool,
    started: Instant,
}

impl WorkflowRecorder {
    pub fn new() -> Self {
        Self {
            steps: Vec::new(),
            failed: false,
            started: Instant::now(),
        }
    }

    /// Whether the next non-cleanup step may run. Cleanup steps bypass
    /// this; they are gated only on their own setup step.
    pub fn should_run(&self) -> bool {
        !self.failed
    }

    /// Records a process invocation, deriving `ok` from the result.
    pub fn record_command(
        &mut self,
        name: &'static str,
        kind: StepKind,
        result: ExecutionResult,
    ) -> bool {
        let ok = result.ok();
        self.record_command_with(name, kind, result, ok)
    }

    /// Records a process invocation with a caller-evaluated verdict, for
    /// tools that exit zero while printing failure markers.
    pub fn record_command_with(
        &mut self,
        name: &'static str,
        kind: StepKind,
        result: ExecutionResult,
        ok: bool,
    ) -> bool {
        self.push(WorkflowStep {
            name,
            kind,
            ok,
            result: Some(result),
            note: None,
        })
    }

    /// Records a step that did not spawn a process (e.g. local resolution).
    pub fn record_note(
        &mut self,
        name: &'static str,
        kind: StepKind,
        ok: bool,
        note: impl Into<String>,
    ) -> bool {
        self.push(WorkflowStep {
            name,
            kind,
            ok,
            result: None,
            note: Some(note.into()),
        })
    }

    fn push(&mut self, step: WorkflowStep) -> bool {
        let ok = step.ok;
        if ok {
            info!("step {} ok", step.name);
        } else {
            warn!("step {} failed (kind={:?})", step.name, step.kind);
        }
        if !ok && step.kind == StepKind::Required {
            self.failed = true;
        }
        self.steps.push(step);
        ok
    }

    pub fn succeeded(&self) -> bool {
        !self.failed
    }

    pub fn elapsed_seconds(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }

    pub fn finish(self) -> (bool, f64, Vec<WorkflowStep>) {
        (!self.failed, self.started.elapsed().as_secs_f64(), self.steps)
    }
}

impl Default for WorkflowRecorder {
    fn default() -> Self {
        Self::new()
    }
}
