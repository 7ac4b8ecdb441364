//! Device bridge operations: single commands and multi-step workflows.

use std::path::{Path, PathBuf};
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::constants::{
    CLEANUP_TIMEOUT, DEFAULT_DEVICE_TIMEOUT, DEVICE_OUTPUT_LINES, LIST_TARGETS_TIMEOUT,
    REMOTE_TMP_DIR, SCREENSHOT_TIMEOUT,
};
use crate::error::HarmonyError;
use crate::exec::{self, split_arguments, CommandSpec, ExecutionResult};
use crate::locate::{resolve_tool, Toolchain};
use crate::workflow::{StepKind, WorkflowRecorder, WorkflowStep};

/// The packed application config is commonly stored uncompressed, so the
/// bundle identity can be recovered with a plain byte scan.
static BUNDLE_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""bundleName"\s*:\s*"([^"]+)""#).expect("bundle pattern is valid"));

/// A resolved device bridge executable. Cheap to construct; callers
/// re-locate per top-level operation rather than caching process-wide.
#[derive(Debug, Clone)]
pub struct DeviceBridge {
    executable: PathBuf,
}

impl DeviceBridge {
    pub fn locate(configured: &str) -> Result<Self, HarmonyError> {
        let executable = resolve_tool(Toolchain::DeviceBridge, configured)?;
        Ok(Self { executable })
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }

    /// Runs one device-tool command, inserting `-t <device>` when a device
    /// id is given.
    pub async fn run(
        &self,
        args: Vec<String>,
        device: Option<&str>,
        timeout: Duration,
    ) -> Result<ExecutionResult, HarmonyError> {
        let mut full = Vec::new();
        if let Some(device) = device {
            full.push("-t".to_string());
            full.push(device.to_string());
        }
        full.extend(args);

        let spec = CommandSpec::new(self.executable.clone(), full, timeout, DEVICE_OUTPUT_LINES);
        exec::run(spec).await
    }

    /// Lists connected devices and emulators.
    pub async fn list_targets(&self) -> Result<ExecutionResult, HarmonyError> {
        self.run(
            vec!["list".to_string(), "targets".to_string()],
            None,
            LIST_TARGETS_TIMEOUT,
        )
        .await
    }

    /// Runs a device shell command given as one human-typed string.
    pub async fn shell(
        &self,
        command: &str,
        device: Option<&str>,
        timeout: Duration,
    ) -> Result<ExecutionResult, HarmonyError> {
        let tokens = split_arguments(command)?;
        if tokens.is_empty() {
            return Err(HarmonyError::InvalidArgument(
                "shell command cannot be empty".to_string(),
            ));
        }

        let mut args = vec!["shell".to_string()];
        args.extend(tokens);
        self.run(args, device, timeout).await
    }

    /// Installs (and optionally launches) an application package the way
    /// the IDE does: stage into a fresh remote directory, install from
    /// there, always clean the staging directory back up.
    pub async fn install_app(&self, req: &InstallRequest) -> Result<InstallOutcome, HarmonyError> {
        if !req.package_path.is_file() {
            return Err(HarmonyError::InvalidArgument(format!(
                "package '{}' does not exist or is not a file",
                req.package_path.display()
            )));
        }

        // A fresh name per invocation keeps concurrent installs against
        // the same device from clobbering each other's staging area.
        let remote_dir = format!("{REMOTE_TMP_DIR}/{}", Uuid::new_v4().simple());
        let device = req.device.as_deref();
        let mut rec = WorkflowRecorder::new();

        info!(
            "installing {} (staging dir {})",
            req.package_path.display(),
            remote_dir
        );

        let bundle = match &req.bundle_name {
            Some(name) => Some(name.clone()),
            None => match resolve_bundle_name(&req.package_path) {
                Some(name) => {
                    rec.record_note("resolve_bundle", StepKind::BestEffort, true, name.clone());
                    Some(name)
                }
                None => {
                    rec.record_note(
                        "resolve_bundle",
                        StepKind::BestEffort,
                        false,
                        "bundle name not found in package; stop and launch will be skipped",
                    );
                    None
                }
            },
        };

        if req.force_stop {
            if let Some(bundle) = &bundle {
                let result = self
                    .run(
                        shell_args(&["aa", "force-stop", bundle]),
                        device,
                        req.timeout,
                    )
                    .await?;
                rec.record_command("force_stop", StepKind::BestEffort, result);
            }
        }

        if rec.should_run() {
            let result = self
                .run(shell_args(&["mkdir", &remote_dir]), device, req.timeout)
                .await?;
            rec.record_command("create_remote_dir", StepKind::Required, result);
        }

        let mut transfer_ok = false;
        if rec.should_run() {
            let result = self
                .run(
                    vec![
                        "file".to_string(),
                        "send".to_string(),
                        req.package_path.display().to_string(),
                        remote_dir.clone(),
                    ],
                    device,
                    req.timeout,
                )
                .await?;
            transfer_ok = rec.record_command("transfer", StepKind::Required, result);
        }

        if rec.should_run() {
            let result = self
                .run(
                    shell_args(&["bm", "install", "-p", &remote_dir]),
                    device,
                    req.timeout,
                )
                .await?;
            rec.record_command("install", StepKind::Required, result);
        }

        // Cleanup is attempted whenever the package actually landed on the
        // device, even if the install itself failed.
        if transfer_ok {
            let result = self
                .run(
                    shell_args(&["rm", "-rf", &remote_dir]),
                    device,
                    CLEANUP_TIMEOUT,
                )
                .await?;
            rec.record_command("cleanup", StepKind::Cleanup, result);
        }

        if req.auto_start && rec.should_run() {
            if let Some(bundle) = &bundle {
                let result = self
                    .run(
                        shell_args(&["aa", "start", "-a", &req.ability_name, "-b", bundle]),
                        device,
                        req.timeout,
                    )
                    .await?;
                // Overall success reflects the install itself. A launch
                // failure is visible in the step record but the app is
                // still on the device.
                rec.record_command("launch", StepKind::BestEffort, result);
            }
        }

        let (success, elapsed_seconds, steps) = rec.finish();
        Ok(InstallOutcome {
            success,
            elapsed_seconds,
            package_path: req.package_path.display().to_string(),
            bundle_name: bundle,
            remote_dir,
            steps,
        })
    }

    /// Captures a screenshot on the device and retrieves it into the
    /// project directory.
    pub async fn screenshot(
        &self,
        req: &ScreenshotRequest,
    ) -> Result<ScreenshotOutcome, HarmonyError> {
        if !req.project_dir.is_dir() {
            return Err(HarmonyError::InvalidArgument(format!(
                "project directory '{}' does not exist",
                req.project_dir.display()
            )));
        }

        let filename = normalize_filename(req.filename.as_deref());
        let local_dir = match &req.output_dir {
            Some(sub) => req.project_dir.join(sub),
            None => req.project_dir.clone(),
        };
        std::fs::create_dir_all(&local_dir).map_err(|source| HarmonyError::CreateDir {
            path: local_dir.clone(),
            source,
        })?;
        let local_path = local_dir.join(&filename);
        let remote_path = format!("{REMOTE_TMP_DIR}/screenshot_{}.jpeg", Uuid::new_v4().simple());
        let device = req.device.as_deref();
        let mut rec = WorkflowRecorder::new();

        debug!(
            "capturing screenshot to {remote_path}, retrieving into {}",
            local_path.display()
        );

        let mut capture_ok = false;
        if rec.should_run() {
            let result = self
                .run(
                    shell_args(&["snapshot_display", "-f", &remote_path]),
                    device,
                    req.timeout,
                )
                .await?;
            // The capture tool reports some failures on stdout with a
            // zero exit code.
            let ok = result.ok() && !result.stdout.to_lowercase().contains("error:");
            capture_ok = rec.record_command_with("capture", StepKind::Required, result, ok);
        }

        if rec.should_run() {
            let result = self
                .run(
                    vec![
                        "file".to_string(),
                        "recv".to_string(),
                        remote_path.clone(),
                        local_path.display().to_string(),
                    ],
                    device,
                    req.timeout,
                )
                .await?;
            let lower = result.stdout.to_lowercase();
            let ok = result.ok() && !lower.contains("[fail]") && !lower.contains("error");
            rec.record_command_with("transfer", StepKind::Required, result, ok);
        }

        if capture_ok {
            let result = self
                .run(shell_args(&["rm", &remote_path]), device, CLEANUP_TIMEOUT)
                .await?;
            rec.record_command("cleanup", StepKind::Cleanup, result);
        }

        let (success, elapsed_seconds, steps) = rec.finish();
        let file_size_bytes = if success {
            local_path.metadata().ok().map(|m| m.len())
        } else {
            None
        };
        if success && file_size_bytes.is_none() {
            warn!("transfer reported success but {} is missing", local_path.display());
        }

        Ok(ScreenshotOutcome {
            success,
            elapsed_seconds,
            local_path: success.then(|| local_path.display().to_string()),
            filename,
            remote_path,
            file_size_bytes,
            steps,
        })
    }
}

fn shell_args(parts: &[&str]) -> Vec<String> {
    let mut args = vec!["shell".to_string()];
    args.extend(parts.iter().map(|p| (*p).to_string()));
    args
}

fn resolve_bundle_name(package_path: &Path) -> Option<String> {
    let bytes = std::fs::read(package_path).ok()?;
    let text = String::from_utf8_lossy(&bytes);
    let name = BUNDLE_NAME
        .captures(&text)
        .map(|caps| caps[1].to_string())?;
    debug!("resolved bundle name '{}' from {}", name, package_path.display());
    Some(name)
}

/// Generates a timestamped name when absent and coerces the extension to
/// what the capture tool produces.
fn normalize_filename(requested: Option<&str>) -> String {
    let name = match requested {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => chrono::Local::now()
            .format("screenshot_%Y%m%d_%H%M%S.jpeg")
            .to_string(),
    };

    let lower = name.to_lowercase();
    if lower.ends_with(".jpeg") || lower.ends_with(".jpg") {
        return name;
    }
    match name.rsplit_once('.') {
        Some((base, _)) => format!("{base}.jpeg"),
        None => format!("{name}.jpeg"),
    }
}

/// Parameters of the install-and-launch workflow.
#[derive(Debug, Clone)]
pub struct InstallRequest {
    pub package_path: PathBuf,
    pub bundle_name: Option<String>,
    pub ability_name: String,
    pub auto_start: bool,
    pub force_stop: bool,
    pub device: Option<String>,
    pub timeout: Duration,
}

impl InstallRequest {
    pub fn new(package_path: PathBuf) -> Self {
        Self {
            package_path,
            bundle_name: None,
            ability_name: "EntryAbility".to_string(),
            auto_start: true,
            force_stop: true,
            device: None,
            timeout: DEFAULT_DEVICE_TIMEOUT,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct InstallOutcome {
    pub success: bool,
    pub elapsed_seconds: f64,
    pub package_path: String,
    pub bundle_name: Option<String>,
    pub remote_dir: String,
    pub steps: Vec<WorkflowStep>,
}

/// Parameters of the screenshot workflow.
#[derive(Debug, Clone)]
pub struct ScreenshotRequest {
    pub project_dir: PathBuf,
    /// Destination directory relative to the project directory.
    pub output_dir: Option<PathBuf>,
    pub filename: Option<String>,
    pub device: Option<String>,
    pub timeout: Duration,
}

impl ScreenshotRequest {
    pub fn new(project_dir: PathBuf) -> Self {
        Self {
            project_dir,
            output_dir: None,
            filename: None,
            device: None,
            timeout: SCREENSHOT_TIMEOUT,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ScreenshotOutcome {
    pub success: bool,
    pub elapsed_seconds: f64,
    pub local_path: Option<String>,
    pub filename: String,
    pub remote_path: String,
    pub file_size_bytes: Option<u64>,
    pub steps: Vec<WorkflowStep>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    /// Writes an executable stub standing in for the device tool. The stub
    /// appends every invocation to a log file and fails (exit 1) whenever
    /// its arguments contain `fail_on`.
    fn stub_tool(dir: &TempDir, log: &Path, fail_on: &str, extra: &str) -> DeviceBridge {
        let path = dir.path().join("hdc");
        let script = format!(
            r#"#!/bin/sh
echo "$@" >> "{log}"
{extra}
case "$*" in
  *"{fail_on}"*) exit 1 ;;
esac
exit 0
"#,
            log = log.display(),
            fail_on = if fail_on.is_empty() { "__never-match__" } else { fail_on },
            extra = extra,
        );
        fs::write(&path, script).unwrap();
        let mut perms = fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&path, perms).unwrap();

        DeviceBridge::locate(path.to_str().unwrap()).expect("stub should resolve")
    }

    fn write_package(dir: &TempDir, content: &[u8]) -> PathBuf {
        let path = dir.path().join("demo.hap");
        fs::write(&path, content).unwrap();
        path
    }

    fn step_names(steps: &[WorkflowStep]) -> Vec<&'static str> {
        steps.iter().map(|s| s.name).collect()
    }

    fn quick(mut req: InstallRequest) -> InstallRequest {
        req.timeout = Duration::from_secs(10);
        req
    }

    #[tokio::test]
    async fn install_runs_the_full_sequence_on_success() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("invocations.log");
        let bridge = stub_tool(&dir, &log, "", "");
        let package = write_package(&dir, b"payload");

        let mut req = InstallRequest::new(package);
        req.bundle_name = Some("com.example.demo".to_string());
        let out = bridge.install_app(&quick(req)).await.expect("workflow runs");

        assert!(out.success);
        assert_eq!(
            step_names(&out.steps),
            vec!["force_stop", "create_remote_dir", "transfer", "install", "cleanup", "launch"]
        );
        let logged = fs::read_to_string(&log).unwrap();
        assert!(logged.contains("aa force-stop com.example.demo"));
        assert!(logged.contains(&format!("shell rm -rf {}", out.remote_dir)));
        assert!(logged.contains("aa start -a EntryAbility -b com.example.demo"));
    }

    #[tokio::test]
    async fn launch_failure_leaves_install_successful() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("invocations.log");
        let bridge = stub_tool(&dir, &log, "aa start", "");
        let package = write_package(&dir, b"payload");

        let mut req = InstallRequest::new(package);
        req.bundle_name = Some("com.example.demo".to_string());
        let out = bridge.install_app(&quick(req)).await.expect("workflow runs");

        // The package was installed; a failed launch surfaces in its own
        // step without failing the operation.
        assert!(out.success);
        let launch = out.steps.iter().find(|s| s.name == "launch").expect("launch recorded");
        assert!(!launch.ok);
        assert_eq!(launch.kind, StepKind::BestEffort);
    }

    #[tokio::test]
    async fn install_failure_still_cleans_up_but_skips_launch() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("invocations.log");
        let bridge = stub_tool(&dir, &log, "bm install", "");
        let package = write_package(&dir, b"payload");

        let mut req = InstallRequest::new(package);
        req.bundle_name = Some("com.example.demo".to_string());
        let out = bridge.install_app(&quick(req)).await.expect("workflow runs");

        assert!(!out.success);
        assert_eq!(
            step_names(&out.steps),
            vec!["force_stop", "create_remote_dir", "transfer", "install", "cleanup"]
        );
        let cleanup = out.steps.last().unwrap();
        assert_eq!(cleanup.kind, StepKind::Cleanup);
        assert!(cleanup.ok);
        let logged = fs::read_to_string(&log).unwrap();
        assert!(!logged.contains("aa start"));
    }

    #[tokio::test]
    async fn transfer_failure_leaves_nothing_to_clean() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("invocations.log");
        let bridge = stub_tool(&dir, &log, "file send", "");
        let package = write_package(&dir, b"payload");

        let mut req = InstallRequest::new(package);
        req.bundle_name = Some("com.example.demo".to_string());
        let out = bridge.install_app(&quick(req)).await.expect("workflow runs");

        assert!(!out.success);
        assert_eq!(
            step_names(&out.steps),
            vec!["force_stop", "create_remote_dir", "transfer"]
        );
        let logged = fs::read_to_string(&log).unwrap();
        assert!(!logged.contains("rm -rf"));
        assert!(!logged.contains("bm install"));
    }

    #[tokio::test]
    async fn force_stop_failure_does_not_abort_the_install() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("invocations.log");
        let bridge = stub_tool(&dir, &log, "force-stop", "");
        let package = write_package(&dir, b"payload");

        let mut req = InstallRequest::new(package);
        req.bundle_name = Some("com.example.demo".to_string());
        let out = bridge.install_app(&quick(req)).await.expect("workflow runs");

        assert!(out.success);
        assert!(!out.steps[0].ok);
        assert_eq!(out.steps[0].kind, StepKind::BestEffort);
    }

    #[tokio::test]
    async fn bundle_identity_is_resolved_from_the_package() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("invocations.log");
        let bridge = stub_tool(&dir, &log, "", "");
        let package = write_package(
            &dir,
            br#"PK..module.json{"app":{"bundleName": "com.example.pkg"}}"#,
        );

        let req = InstallRequest::new(package);
        let out = bridge.install_app(&quick(req)).await.expect("workflow runs");

        assert!(out.success);
        assert_eq!(out.bundle_name.as_deref(), Some("com.example.pkg"));
        assert_eq!(out.steps[0].name, "resolve_bundle");
        assert!(out.steps[0].ok);
        let logged = fs::read_to_string(&log).unwrap();
        assert!(logged.contains("aa force-stop com.example.pkg"));
    }

    #[tokio::test]
    async fn unresolvable_bundle_skips_stop_and_launch() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("invocations.log");
        let bridge = stub_tool(&dir, &log, "", "");
        let package = write_package(&dir, b"opaque compressed bytes");

        let req = InstallRequest::new(package);
        let out = bridge.install_app(&quick(req)).await.expect("workflow runs");

        assert!(out.success);
        assert_eq!(out.bundle_name, None);
        assert_eq!(
            step_names(&out.steps),
            vec!["resolve_bundle", "create_remote_dir", "transfer", "install", "cleanup"]
        );
        assert!(!out.steps[0].ok);
    }

    #[tokio::test]
    async fn missing_package_is_a_hard_error() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("invocations.log");
        let bridge = stub_tool(&dir, &log, "", "");

        let req = InstallRequest::new(dir.path().join("missing.hap"));
        let err = bridge.install_app(&req).await.expect_err("must fail");
        assert!(matches!(err, HarmonyError::InvalidArgument(_)));
        assert!(!log.exists());
    }

    #[tokio::test]
    async fn screenshot_retrieves_the_captured_file() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("invocations.log");
        // On `file recv` the stub writes bytes to the local destination
        // (the last argument), standing in for the real transfer.
        let extra = r#"if [ "$1" = "file" ] && [ "$2" = "recv" ]; then
  for last; do :; done
  printf 'jpeg-bytes' > "$last"
fi"#;
        let bridge = stub_tool(&dir, &log, "", extra);
        let project = dir.path().join("project");
        fs::create_dir(&project).unwrap();

        let mut req = ScreenshotRequest::new(project.clone());
        req.output_dir = Some(PathBuf::from("shots"));
        req.filename = Some("home.png".to_string());
        let out = bridge.screenshot(&req).await.expect("workflow runs");

        assert!(out.success);
        assert_eq!(out.filename, "home.jpeg");
        assert_eq!(out.file_size_bytes, Some(10));
        let local = out.local_path.expect("local path on success");
        assert!(Path::new(&local).is_file());
        assert!(out.remote_path.starts_with("/data/local/tmp/screenshot_"));
        assert_eq!(step_names(&out.steps), vec!["capture", "transfer", "cleanup"]);
    }

    #[tokio::test]
    async fn failed_capture_claims_no_local_file() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("invocations.log");
        let bridge = stub_tool(&dir, &log, "snapshot_display", "");
        let project = dir.path().join("project");
        fs::create_dir(&project).unwrap();

        let out = bridge
            .screenshot(&ScreenshotRequest::new(project.clone()))
            .await
            .expect("workflow runs");

        assert!(!out.success);
        assert_eq!(out.local_path, None);
        assert_eq!(out.file_size_bytes, None);
        assert_eq!(step_names(&out.steps), vec!["capture"]);
        // The transfer never ran, so no file appeared either.
        assert_eq!(fs::read_dir(&project).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn capture_error_marker_fails_the_step_despite_exit_zero() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("invocations.log");
        let extra = r#"case "$*" in
  *snapshot_display*) echo "error: access denied" ;;
esac"#;
        let bridge = stub_tool(&dir, &log, "", extra);
        let project = dir.path().join("project");
        fs::create_dir(&project).unwrap();

        let out = bridge
            .screenshot(&ScreenshotRequest::new(project))
            .await
            .expect("workflow runs");

        assert!(!out.success);
        // The step failed despite exit zero, so nothing was captured and
        // there is nothing to clean.
        assert_eq!(step_names(&out.steps), vec!["capture"]);
        assert!(!out.steps[0].ok);
    }

    #[tokio::test]
    async fn shell_preserves_quoted_arguments() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("invocations.log");
        let extra = r#"for a; do printf '%s\n' "$a"; done"#;
        let bridge = stub_tool(&dir, &log, "", extra);

        let result = bridge
            .shell(r#"aa start -a "Entry Ability""#, None, Duration::from_secs(10))
            .await
            .expect("shell runs");

        let lines: Vec<&str> = result.stdout.lines().collect();
        assert_eq!(lines, vec!["shell", "aa", "start", "-a", "Entry Ability"]);
    }

    #[tokio::test]
    async fn empty_shell_command_is_rejected_before_spawning() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("invocations.log");
        let bridge = stub_tool(&dir, &log, "", "");

        let err = bridge
            .shell("   ", None, Duration::from_secs(10))
            .await
            .expect_err("must fail");
        assert!(matches!(err, HarmonyError::InvalidArgument(_)));
        assert!(!log.exists());
    }

    #[tokio::test]
    async fn device_id_is_inserted_before_the_subcommand() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("invocations.log");
        let bridge = stub_tool(&dir, &log, "", "");

        bridge
            .shell("echo hi", Some("emulator-5554"), Duration::from_secs(10))
            .await
            .expect("shell runs");

        let logged = fs::read_to_string(&log).unwrap();
        assert!(logged.starts_with("-t emulator-5554 shell echo hi"));
    }

    #[test]
    fn filenames_are_timestamped_and_coerced_to_jpeg() {
        assert!(normalize_filename(None).starts_with("screenshot_"));
        assert!(normalize_filename(None).ends_with(".jpeg"));
        assert_eq!(normalize_filename(Some("shot.png")), "shot.jpeg");
        assert_eq!(normalize_filename(Some("shot.JPG")), "shot.JPG");
        assert_eq!(normalize_filename(Some("shot")), "shot.jpeg");
    }
}
