use std::io;
use std::time::Duration;

use anyhow::Result;
use clap::Args;
use owo_colors::OwoColorize;
use tokio::time::sleep;
use tracing::{Span, info, instrument};
use tracing_indicatif::span_ext::IndicatifSpanExt;

use crate::cli::OutputFormat;
use crate::cli::command::parse_duration;
use crate::hw::DiscoveredDevice;
use crate::session::{ScanState, SessionCoordinator};
use crate::terminal::TerminalClient;

use super::ui::{DeviceListView, Painter};

/// Arguments for the `scan` command.
#[derive(Debug, Args)]
pub struct ScanArgs {
    /// Stop after this long instead of the full scan period (e.g. `10s`).
    #[arg(long, value_parser = parse_duration)]
    duration: Option<Duration>,
}

impl ScanArgs {
    #[must_use]
    pub fn new(duration: Option<Duration>) -> Self {
        Self { duration }
    }
}

/// Executes the `scan` command.
#[instrument(skip_all, level = "info", fields(?output_format))]
pub(crate) async fn run<W>(
    coordinator: &SessionCoordinator,
    args: &ScanArgs,
    out: &mut W,
    terminal_client: &dyn TerminalClient,
    output_format: OutputFormat,
) -> Result<()>
where
    W: io::Write,
{
    let span = Span::current();
    span.pb_set_message("Scanning for sabers");
    let mut found = 0usize;
    coordinator
        .start_scan(move |device: &DiscoveredDevice| {
            found += 1;
            span.pb_set_message(&format!(
                "Scanning for sabers ({found} found, latest {})",
                device.display_name()
            ));
        })
        .await?;

    wait_for_scan_end(coordinator, args.duration).await?;
    if coordinator.scan().is_scanning() {
        coordinator.stop_scan().await?;
    }

    let devices = coordinator.scan().devices();
    info!(device_count = devices.len(), "scan finished");
    Span::current().pb_set_finish_message(&format!(
        "{} Found {} device(s)",
        "✓".green(),
        devices.len()
    ));

    match output_format {
        OutputFormat::Pretty => {
            let painter = Painter::new(terminal_client.stdout_is_terminal());
            writeln!(out, "{}", DeviceListView::new(&devices, &painter))?;
        }
        OutputFormat::Json => {
            serde_json::to_writer_pretty(&mut *out, &devices)?;
            writeln!(out)?;
        }
    }

    Ok(())
}

/// Waits for auto-stop, the optional duration, or Ctrl+C, whichever comes first.
async fn wait_for_scan_end(
    coordinator: &SessionCoordinator,
    duration: Option<Duration>,
) -> Result<()> {
    let mut snapshots = coordinator.scan().subscribe();
    let limit = async {
        match duration {
            Some(duration) => sleep(duration).await,
            None => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        signal = tokio::signal::ctrl_c() => signal?,
        stopped = snapshots.wait_for(|snapshot| snapshot.state() == ScanState::NotScanning) => {
            stopped?;
        }
        () = limit => {}
    }
    Ok(())
}
