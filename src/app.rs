use std::io;
use std::sync::Arc;

use anyhow::Result;
use bon::Builder;
use tracing::{debug, instrument};

use crate::cli::{Command, FakeArgs, LogLevel, OutputFormat};
use crate::hw::{RadioAdapter, fake_radio_adapter as build_fake_radio_adapter};
use crate::permission::{CapabilityProbe, StaticProbe};
use crate::session::{SessionConfig, SessionCoordinator};
use crate::telemetry;
use crate::terminal::{SystemTerminalClient, TerminalClient};

/// Creates a radio adapter backed by the host's BLE stack.
///
/// # Errors
///
/// Returns an error if the platform BLE manager cannot be opened.
pub async fn real_radio_adapter() -> Result<Arc<dyn RadioAdapter>> {
    Ok(crate::hw::real_radio_adapter().await?)
}

/// Creates a radio adapter and capability probe from fake fixtures.
#[must_use]
pub fn fake_clients(fake_args: &FakeArgs) -> (Arc<dyn RadioAdapter>, Arc<dyn CapabilityProbe>) {
    let radio: Arc<dyn RadioAdapter> = build_fake_radio_adapter(fake_args.radio_config());
    (radio, fake_args.probe())
}

/// Capability probe for desktop BLE stacks, which grant at the OS level.
#[must_use]
pub fn host_capability_probe() -> Arc<dyn CapabilityProbe> {
    debug!("host BLE stack has no per-capability grants; treating all as granted");
    Arc::new(StaticProbe::granting_all())
}

/// Settings for one CLI run.
#[derive(Debug, Clone, Builder)]
pub struct RunSettings {
    #[builder(default)]
    config: SessionConfig,
    log_level: Option<LogLevel>,
    #[builder(default = OutputFormat::Pretty)]
    output_format: OutputFormat,
}

/// Runs the CLI command with default settings.
///
/// ```
/// # async fn run() -> anyhow::Result<()> {
/// use clap::Parser;
///
/// let args = saber_builder::Args::try_parse_from([
///     "saber-builder",
///     "--fake",
///     "--fake-scan",
///     "AA:01|Saber",
///     "permissions",
/// ])?;
/// let (command, maybe_fake_args) = args.into_command_and_fake_args()?;
/// let (radio, probe) = match maybe_fake_args {
///     Some(fake_args) => saber_builder::fake_clients(&fake_args),
///     None => (
///         saber_builder::real_radio_adapter().await?,
///         saber_builder::host_capability_probe(),
///     ),
/// };
/// let mut out = Vec::new();
/// saber_builder::run(command, &mut out, radio, probe).await?;
/// # Ok(())
/// # }
/// ```
///
/// # Errors
///
/// Returns an error if tracing initialisation fails, a session operation fails,
/// or output writing fails.
pub async fn run<W>(
    command: Command,
    out: &mut W,
    radio: Arc<dyn RadioAdapter>,
    probe: Arc<dyn CapabilityProbe>,
) -> Result<()>
where
    W: io::Write,
{
    run_with_settings(command, out, radio, probe, RunSettings::builder().build()).await
}

/// Runs the CLI command with explicit settings.
///
/// # Errors
///
/// Returns an error if tracing initialisation fails, a session operation fails,
/// or output writing fails.
pub async fn run_with_settings<W>(
    command: Command,
    out: &mut W,
    radio: Arc<dyn RadioAdapter>,
    probe: Arc<dyn CapabilityProbe>,
    settings: RunSettings,
) -> Result<()>
where
    W: io::Write,
{
    run_with_clients(command, out, &SystemTerminalClient, radio, probe, settings).await
}

/// Runs the CLI command with injected clients and explicit settings.
///
/// ```
/// # async fn run() -> anyhow::Result<()> {
/// use clap::Parser;
///
/// struct FakeTerminal;
/// impl saber_builder::TerminalClient for FakeTerminal {
///     fn stdout_is_terminal(&self) -> bool { false }
///     fn stderr_is_terminal(&self) -> bool { false }
/// }
///
/// let args = saber_builder::Args::try_parse_from([
///     "saber-builder",
///     "--log-level",
///     "debug",
///     "--fake",
///     "--fake-scan",
///     "AA:01|Saber",
///     "classify",
///     "7d0a7103-7699-494e-b638-deadbeef0000",
/// ])?;
/// let settings = saber_builder::RunSettings::builder()
///     .config(args.session_config()?)
///     .maybe_log_level(args.log_level())
///     .output_format(saber_builder::OutputFormat::Json)
///     .build();
/// let (command, maybe_fake_args) = args.into_command_and_fake_args()?;
/// let fake_args = maybe_fake_args.expect("fake mode was requested");
/// let (radio, probe) = saber_builder::fake_clients(&fake_args);
/// let mut out = Vec::new();
/// saber_builder::run_with_clients(command, &mut out, &FakeTerminal, radio, probe, settings)
///     .await?;
/// # Ok(())
/// # }
/// ```
///
/// # Errors
///
/// Returns an error if tracing initialisation fails, a session operation fails,
/// or output writing fails.
#[instrument(
    skip(out, terminal_client, radio, probe, settings),
    level = "info",
    fields(command = %command_name(&command), log_level = ?settings.log_level)
)]
pub async fn run_with_clients<W>(
    command: Command,
    out: &mut W,
    terminal_client: &dyn TerminalClient,
    radio: Arc<dyn RadioAdapter>,
    probe: Arc<dyn CapabilityProbe>,
    settings: RunSettings,
) -> Result<()>
where
    W: io::Write,
{
    telemetry::initialise_tracing(
        "saber-builder",
        terminal_client.stderr_is_terminal(),
        settings.log_level.map(LogLevel::as_level_filter),
    )?;

    let RunSettings {
        config,
        output_format,
        ..
    } = settings;
    let scan_period = config.scan_period();
    let capabilities = config.capabilities().clone();
    let names = config.module_names().clone();

    let coordinator = move || SessionCoordinator::new(radio, probe, &config);
    match command {
        Command::Scan(args) => {
            crate::cli::scan::run(&coordinator(), &args, out, terminal_client, output_format).await
        }
        Command::Modules(args) => {
            crate::cli::modules::run(
                &coordinator(),
                &args,
                scan_period,
                out,
                terminal_client,
                output_format,
            )
            .await
        }
        Command::Classify(args) => {
            crate::cli::classify::run(&names, &args, out, terminal_client, output_format)
        }
        Command::Permissions => crate::cli::permissions::run(
            &coordinator(),
            &capabilities,
            out,
            terminal_client,
            output_format,
        ),
    }
}

fn command_name(command: &Command) -> &'static str {
    match command {
        Command::Scan(_args) => "scan",
        Command::Modules(_args) => "modules",
        Command::Classify(_args) => "classify",
        Command::Permissions => "permissions",
    }
}
