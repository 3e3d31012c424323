use std::io;
use std::time::Duration;

use anyhow::{Result, bail};
use clap::Args;
use owo_colors::OwoColorize;
use serde::Serialize;
use tokio::time::timeout;
use tracing::{Span, debug, instrument, warn};
use tracing_indicatif::span_ext::IndicatifSpanExt;

use crate::cli::OutputFormat;
use crate::cli::command::parse_duration;
use crate::error::SessionError;
use crate::hw::DiscoveredDevice;
use crate::session::{EnumerationOutcome, SessionCoordinator};
use crate::terminal::TerminalClient;

use super::ui::{ModuleListView, Painter};

/// Arguments for the `modules` command.
#[derive(Debug, Args)]
pub struct ModulesArgs {
    /// Radio address of the saber, as printed by `scan`.
    address: String,
    /// Give up if the device is not seen within this long (defaults to the scan period).
    #[arg(long, value_parser = parse_duration)]
    find_timeout: Option<Duration>,
}

impl ModulesArgs {
    #[must_use]
    pub fn new(address: impl Into<String>, find_timeout: Option<Duration>) -> Self {
        Self {
            address: address.into(),
            find_timeout,
        }
    }
}

/// A device and the outcome of enumerating its modules.
#[derive(Debug, Serialize)]
pub(crate) struct ModuleReport {
    pub(crate) device: DiscoveredDevice,
    pub(crate) outcome: EnumerationOutcome,
}

/// Executes the `modules` command.
#[instrument(skip_all, level = "info", fields(address = %args.address, ?output_format))]
pub(crate) async fn run<W>(
    coordinator: &SessionCoordinator,
    args: &ModulesArgs,
    scan_period: Duration,
    out: &mut W,
    terminal_client: &dyn TerminalClient,
    output_format: OutputFormat,
) -> Result<()>
where
    W: io::Write,
{
    let span = Span::current();
    span.pb_set_message(&format!("Looking for {}", args.address));
    coordinator
        .start_scan(|_device: &DiscoveredDevice| {})
        .await?;

    let find_timeout = args.find_timeout.unwrap_or(scan_period);
    let mut snapshots = coordinator.scan().subscribe();
    let seen = matches!(
        timeout(
            find_timeout,
            snapshots.wait_for(|snapshot| snapshot.registry().contains(&args.address)),
        )
        .await,
        Ok(Ok(_))
    );
    if !seen {
        if let Err(error) = coordinator.reset().await {
            debug!(?error, "reset after missed device failed");
        }
        bail!(
            "device `{}` was not seen within {}",
            args.address,
            humantime::format_duration(find_timeout)
        );
    }

    let device = coordinator.pick_device(&args.address).await?;
    span.pb_set_message(&format!("Enumerating modules on {}", device.display_name()));
    let outcome = match coordinator.load_modules().await {
        Ok(()) => coordinator.wait_for_modules().await?,
        Err(SessionError::NotConnectable { .. }) => coordinator.enumeration().outcome(),
        Err(error) => return Err(error.into()),
    };
    if let Err(error) = coordinator.reset().await {
        warn!(?error, "disconnect after enumeration failed");
    }

    let finish_message = match &outcome {
        EnumerationOutcome::Ready(modules) => {
            format!("{} Found {} module(s)", "✓".green(), modules.len())
        }
        _ => format!("{} No modules listed", "✗".red()),
    };
    span.pb_set_finish_message(&finish_message);

    let report = ModuleReport { device, outcome };
    match output_format {
        OutputFormat::Pretty => {
            let painter = Painter::new(terminal_client.stdout_is_terminal());
            writeln!(out, "{}", ModuleListView::new(&report, &painter))?;
        }
        OutputFormat::Json => {
            serde_json::to_writer_pretty(&mut *out, &report)?;
            writeln!(out)?;
        }
    }

    Ok(())
}
