//! Single-process invocation: spawn, timeout, bounded capture.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tokio::io::AsyncReadExt;
use tokio::process::Child;
use tracing::{debug, warn};

use crate::constants::TIMEOUT_EXIT_CODE;
use crate::error::HarmonyError;

/// Terminal color sequences leak into captured output on both toolchains
/// and break downstream JSON consumers.
static ANSI_ESCAPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\x1b\[[0-9;]*m").expect("ANSI pattern is valid"));

/// A fully-specified external command, immutable once built and consumed
/// by a single [`run`] call.
#[derive(Debug)]
pub struct CommandSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub timeout: Duration,
    pub max_output_lines: usize,
}

impl CommandSpec {
    pub fn new(
        program: PathBuf,
        args: Vec<String>,
        timeout: Duration,
        max_output_lines: usize,
    ) -> Self {
        Self {
            program,
            args,
            cwd: None,
            timeout,
            max_output_lines,
        }
    }

    pub fn current_dir(mut self, cwd: PathBuf) -> Self {
        self.cwd = Some(cwd);
        self
    }

    fn command_vec(&self) -> Vec<String> {
        let mut parts = vec![self.program.display().to_string()];
        parts.extend(self.args.iter().cloned());
        parts
    }
}

/// The uniform record every invocation produces, success or not.
///
/// Failure lives in the fields (`returncode`, `timed_out`), never in an
/// `Err`; only conditions that prevent the process from starting at all
/// surface as [`HarmonyError`].
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    pub command: Vec<String>,
    pub command_line: String,
    pub stdout: String,
    pub stderr: String,
    pub returncode: i32,
    pub timed_out: bool,
}

impl ExecutionResult {
    pub fn ok(&self) -> bool {
        self.returncode == 0 && !self.timed_out
    }
}

/// Executes the command, enforcing the timeout ourselves rather than
/// trusting the external tool. On timeout the whole process group is
/// killed and `timed_out = true` is recorded with the sentinel exit code.
pub async fn run(spec: CommandSpec) -> Result<ExecutionResult, HarmonyError> {
    let command = spec.command_vec();
    let command_line = render_command_line(&command);

    if let Some(cwd) = &spec.cwd {
        if !cwd.is_dir() {
            return Err(HarmonyError::InvalidArgument(format!(
                "working directory '{}' does not exist or is not a directory",
                cwd.display()
            )));
        }
    }

    debug!("executing: {} (timeout={:?})", command_line, spec.timeout);

    let mut cmd = tokio::process::Command::new(&spec.program);
    cmd.args(&spec.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(cwd) = &spec.cwd {
        cmd.current_dir(cwd);
    }
    #[cfg(unix)]
    cmd.process_group(0);

    let mut child = cmd.spawn().map_err(|source| HarmonyError::Spawn {
        command_line: command_line.clone(),
        source,
    })?;

    // Drain both pipes concurrently so a chatty tool cannot deadlock the
    // wait below on a full pipe buffer.
    let stdout_pipe = child.stdout.take();
    let stderr_pipe = child.stderr.take();
    let stdout_task = tokio::spawn(drain(stdout_pipe));
    let stderr_task = tokio::spawn(drain(stderr_pipe));

    let (returncode, timed_out) = match tokio::time::timeout(spec.timeout, child.wait()).await {
        Ok(Ok(status)) => (exit_code(status), false),
        Ok(Err(err)) => {
            warn!("wait failed for {}: {}", command_line, err);
            (TIMEOUT_EXIT_CODE, false)
        }
        Err(_) => {
            warn!("timeout after {:?}: {}", spec.timeout, command_line);
            terminate(&mut child).await;
            (TIMEOUT_EXIT_CODE, true)
        }
    };

    // Killing the group closes the pipes, so these complete promptly even
    // on the timeout path.
    let raw_stdout = stdout_task.await.unwrap_or_default();
    let mut raw_stderr = stderr_task.await.unwrap_or_default();

    if timed_out && raw_stderr.trim().is_empty() {
        raw_stderr = format!(
            "timeout waiting for {}",
            spec.program
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| spec.program.display().to_string())
        );
    }

    let result = ExecutionResult {
        command,
        command_line,
        stdout: sanitize_output(&raw_stdout, spec.max_output_lines),
        stderr: sanitize_output(&raw_stderr, spec.max_output_lines),
        returncode,
        timed_out,
    };

    if !result.ok() {
        warn!(
            "command failed: returncode={}, timed_out={}, cmd={}",
            result.returncode, result.timed_out, result.command_line
        );
    } else {
        debug!("command succeeded: {}", result.command_line);
    }

    Ok(result)
}

async fn drain(pipe: Option<impl tokio::io::AsyncRead + Unpin>) -> String {
    let mut buffer = Vec::new();
    if let Some(mut pipe) = pipe {
        let _ = pipe.read_to_end(&mut buffer).await;
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

/// Kills the child's whole process group, then the child itself, and reaps
/// it so control returns within a bounded grace period.
async fn terminate(child: &mut Child) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;

        // The child was spawned as its own group leader, so pgid == pid.
        let _ = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL);
    }

    let _ = child.kill().await;
    let _ = child.wait().await;
}

#[cfg(unix)]
fn exit_code(status: std::process::ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;

    status
        .code()
        .or_else(|| status.signal().map(|sig| -sig))
        .unwrap_or(TIMEOUT_EXIT_CODE)
}

#[cfg(not(unix))]
fn exit_code(status: std::process::ExitStatus) -> i32 {
    status.code().unwrap_or(TIMEOUT_EXIT_CODE)
}

/// Strips color escapes, trims, and keeps only the last `max_lines` lines,
/// prepending an explicit marker when anything was dropped.
fn sanitize_output(output: &str, max_lines: usize) -> String {
    let clean = ANSI_ESCAPE.replace_all(output, "");
    let clean = clean.trim();
    if clean.is_empty() {
        return String::new();
    }

    let lines: Vec<&str> = clean.lines().collect();
    if lines.len() <= max_lines {
        return clean.to_string();
    }

    let kept = &lines[lines.len() - max_lines..];
    format!(
        "[Output truncated: showing last {} of {} lines]\n{}",
        max_lines,
        lines.len(),
        kept.join("\n")
    )
}

/// Renders argv for diagnostics, quoting anything the shell would mangle.
pub fn render_command_line(parts: &[String]) -> String {
    parts.iter().map(|p| quote(p)).collect::<Vec<_>>().join(" ")
}

fn quote(part: &str) -> String {
    let safe = !part.is_empty()
        && part
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "@%+=:,./_-".contains(c));
    if safe {
        return part.to_string();
    }
    format!("'{}'", part.replace('\'', r"'\''"))
}

/// Splits a human-typed command string into discrete arguments, honoring
/// single quotes, double quotes, and backslash escapes. Device-shell
/// commands arrive as one string, so embedded whitespace must survive as a
/// single logical argument.
pub fn split_arguments(input: &str) -> Result<Vec<String>, HarmonyError> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut chars = input.chars();

    while let Some(c) = chars.next() {
        match c {
            '\'' => {
                in_word = true;
                loop {
                    match chars.next() {
                        Some('\'') => break,
                        Some(inner) => current.push(inner),
                        None => {
                            return Err(HarmonyError::InvalidArgument(
                                "unterminated single quote in command string".to_string(),
                            ))
                        }
                    }
                }
            }
            '"' => {
                in_word = true;
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some(escaped @ ('"' | '\\' | '$' | '`')) => current.push(escaped),
                            Some(other) => {
                                current.push('\\');
                                current.push(other);
                            }
                            None => {
                                return Err(HarmonyError::InvalidArgument(
                                    "unterminated double quote in command string".to_string(),
                                ))
                            }
                        },
                        Some(inner) => current.push(inner),
                        None => {
                            return Err(HarmonyError::InvalidArgument(
                                "unterminated double quote in command string".to_string(),
                            ))
                        }
                    }
                }
            }
            '\\' => match chars.next() {
                Some(escaped) => {
                    in_word = true;
                    current.push(escaped);
                }
                None => {
                    return Err(HarmonyError::InvalidArgument(
                        "trailing backslash in command string".to_string(),
                    ))
                }
            },
            c if c.is_whitespace() => {
                if in_word {
                    args.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            other => {
                in_word = true;
                current.push(other);
            }
        }
    }

    if in_word {
        args.push(current);
    }

    Ok(args)
}
