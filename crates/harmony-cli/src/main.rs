use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::debug;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use harmony_core::{
    find_output, ArtifactQuery, AssembleParams, BuildTarget, BuildWrapper, DeviceBridge,
    HarmonyConfig, InstallRequest, ScreenshotRequest,
};

mod styles;

#[allow(unused_imports)]
use styles as s;

/// The command-line interface for Harmony Tools.
#[derive(Debug, Parser)]
#[command(name = "hmt")]
#[command(version)]
#[command(styles = s::get_clap_styles())]
#[command(about = "HarmonyOS device and build automation")]
#[command(
    long_about = "Harmony Tools wraps the hdc device bridge and the hvigorw build wrapper
as structured operations. Every command prints a JSON record describing
what was executed and how it went; process failures are reported inside
that record rather than as crashes.

Tool locations come from harmony.toml ([tools] hdc / hvigorw) and can be
overridden with the HDC_PATH and HVIGORW_PATH environment variables."
)]
pub(crate) struct Cli {
    /// Path to the Harmony Tools config file.
    #[arg(long, default_value = harmony_core::constants::CONFIG_FILE)]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List connected devices and emulators.
    ListTargets,
    /// Run a device shell command (quoting is respected).
    Shell {
        /// The command line to run on the device, as one string.
        command: String,
        /// Target device id (hdc -t).
        #[arg(long)]
        device: Option<String>,
        /// Timeout in seconds.
        #[arg(long, default_value_t = 120)]
        timeout: u64,
    },
    /// Remove build outputs via the build wrapper.
    Clean {
        project_dir: PathBuf,
        /// Keep the build daemon alive between invocations.
        #[arg(long)]
        daemon: bool,
        #[arg(long, default_value_t = 900)]
        timeout: u64,
    },
    /// Build an application package (hap/hsp/har/app).
    Assemble {
        project_dir: PathBuf,
        /// Target kind: hap, hsp, har, or app.
        #[arg(long)]
        target: String,
        #[arg(long)]
        module: Option<String>,
        #[arg(long, default_value = "default")]
        product: String,
        #[arg(long, default_value = "debug")]
        build_mode: String,
        /// Keep the build daemon alive between invocations.
        #[arg(long)]
        daemon: bool,
        #[arg(long, default_value_t = 900)]
        timeout: u64,
    },
    /// Locate a build output on disk without building.
    FindOutput {
        project_dir: PathBuf,
        #[arg(long, default_value = "hap")]
        target: String,
        #[arg(long, default_value = "entry")]
        module: String,
        #[arg(long, default_value = "debug")]
        build_mode: String,
        #[arg(long, default_value = "default")]
        product: String,
    },
    /// Capture a device screenshot into the project directory.
    Screenshot {
        project_dir: PathBuf,
        /// Destination directory, relative to the project directory.
        #[arg(long)]
        output_dir: Option<PathBuf>,
        /// Local filename (a .jpeg extension is enforced).
        #[arg(long)]
        filename: Option<String>,
        #[arg(long)]
        device: Option<String>,
        #[arg(long, default_value_t = 30)]
        timeout: u64,
    },
    /// Install an application package and launch it.
    Install {
        package: PathBuf,
        /// Bundle name; resolved from the package when omitted.
        #[arg(long)]
        bundle: Option<String>,
        #[arg(long, default_value = "EntryAbility")]
        ability: String,
        /// Skip launching the app after installing.
        #[arg(long)]
        no_start: bool,
        /// Skip force-stopping a running instance first.
        #[arg(long)]
        no_stop: bool,
        #[arg(long)]
        device: Option<String>,
        #[arg(long, default_value_t = 120)]
        timeout: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let cli = Cli::parse();
    debug!("parsed cli arguments: {:?}", cli);

    let cfg = HarmonyConfig::load(&cli.config)
        .with_context(|| format!("unable to load config '{}'", cli.config))?;

    execute(&cfg, cli.command).await
}

async fn execute(cfg: &HarmonyConfig, command: Command) -> Result<()> {
    match command {
        Command::ListTargets => {
            let bridge = DeviceBridge::locate(&cfg.tools.hdc)?;
            print_json(&bridge.list_targets().await?)
        }
        Command::Shell {
            command,
            device,
            timeout,
        } => {
            let bridge = DeviceBridge::locate(&cfg.tools.hdc)?;
            let result = bridge
                .shell(&command, device.as_deref(), Duration::from_secs(timeout))
                .await?;
            print_json(&result)
        }
        Command::Clean {
            project_dir,
            daemon,
            timeout,
        } => {
            let wrapper = BuildWrapper::locate(&cfg.tools.hvigorw)?;
            let result = wrapper
                .clean(&project_dir, !daemon, Duration::from_secs(timeout))
                .await?;
            print_json(&result)
        }
        Command::Assemble {
            project_dir,
            target,
            module,
            product,
            build_mode,
            daemon,
            timeout,
        } => {
            let target = BuildTarget::from_str(&target)?;
            let wrapper = BuildWrapper::locate(&cfg.tools.hvigorw)?;
            let params = AssembleParams {
                module,
                product,
                build_mode,
                no_daemon: !daemon,
            };
            let result = wrapper
                .assemble(&project_dir, target, &params, Duration::from_secs(timeout))
                .await?;
            print_json(&result)
        }
        Command::FindOutput {
            project_dir,
            target,
            module,
            build_mode,
            product,
        } => {
            let target = BuildTarget::from_str(&target)?;
            let query = ArtifactQuery {
                project_dir,
                target,
                module,
                build_mode,
                product,
            };
            print_json(&find_output(&query))
        }
        Command::Screenshot {
            project_dir,
            output_dir,
            filename,
            device,
            timeout,
        } => {
            let bridge = DeviceBridge::locate(&cfg.tools.hdc)?;
            let req = ScreenshotRequest {
                project_dir,
                output_dir,
                filename,
                device,
                timeout: Duration::from_secs(timeout),
            };
            print_json(&bridge.screenshot(&req).await?)
        }
        Command::Install {
            package,
            bundle,
            ability,
            no_start,
            no_stop,
            device,
            timeout,
        } => {
            let bridge = DeviceBridge::locate(&cfg.tools.hdc)?;
            let req = InstallRequest {
                package_path: package,
                bundle_name: bundle,
                ability_name: ability,
                auto_start: !no_start,
                force_stop: !no_stop,
                device,
                timeout: Duration::from_secs(timeout),
            };
            print_json(&bridge.install_app(&req).await?)
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("failed to serialize result")?;
    println!("{text}");
    Ok(())
}
