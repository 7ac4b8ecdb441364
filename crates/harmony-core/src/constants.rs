//! Constants shared across the Harmony Tools workspace.

use std::time::Duration;

/// The filename for Harmony Tools' primary configuration.
pub const CONFIG_FILE: &str = "harmony.toml";

/// Primary executable name of the device bridge tool.
pub const DEVICE_TOOL_NAME: &str = "hdc";

/// Primary executable name of the build wrapper.
pub const BUILD_TOOL_NAME: &str = "hvigorw";

/// Scratch space on the device for per-invocation temporary files.
pub const REMOTE_TMP_DIR: &str = "/data/local/tmp";

/// Device-tool output is short (shell, bm, aa); build logs run far longer,
/// so the build cap is tighter to keep serialized results small.
pub const DEVICE_OUTPUT_LINES: usize = 500;
pub const BUILD_OUTPUT_LINES: usize = 100;

pub const DEFAULT_DEVICE_TIMEOUT: Duration = Duration::from_secs(120);
pub const DEFAULT_BUILD_TIMEOUT: Duration = Duration::from_secs(900);
pub const LIST_TARGETS_TIMEOUT: Duration = Duration::from_secs(15);
pub const SCREENSHOT_TIMEOUT: Duration = Duration::from_secs(30);
pub const CLEANUP_TIMEOUT: Duration = Duration::from_secs(10);

/// Exit-code sentinel recorded when the invoker had to terminate a process.
pub const TIMEOUT_EXIT_CODE: i32 = -1;
