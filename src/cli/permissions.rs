use std::io;

use anyhow::Result;
use serde::Serialize;

use crate::cli::OutputFormat;
use crate::permission::{CapabilitySet, CapabilityProfile};
use crate::session::SessionCoordinator;
use crate::terminal::TerminalClient;

use super::ui::{Painter, PermissionView};

/// Required and missing capabilities for one host.
#[derive(Debug, Serialize)]
pub(crate) struct PermissionReport<'a> {
    pub(crate) profile: &'a CapabilityProfile,
    pub(crate) missing_scan: CapabilitySet,
    pub(crate) missing_connect: CapabilitySet,
    pub(crate) denied: CapabilitySet,
    pub(crate) scanner_supported: bool,
}

/// Executes the `permissions` command.
pub(crate) fn run<W>(
    coordinator: &SessionCoordinator,
    profile: &CapabilityProfile,
    out: &mut W,
    terminal_client: &dyn TerminalClient,
    output_format: OutputFormat,
) -> Result<()>
where
    W: io::Write,
{
    let report = PermissionReport {
        profile,
        missing_scan: coordinator.missing_scan_capabilities(),
        missing_connect: coordinator.missing_connect_capabilities(),
        denied: coordinator.denied_capabilities(),
        scanner_supported: coordinator.scan().supported(),
    };

    match output_format {
        OutputFormat::Pretty => {
            let painter = Painter::new(terminal_client.stdout_is_terminal());
            writeln!(out, "{}", PermissionView::new(&report, &painter))?;
        }
        OutputFormat::Json => {
            serde_json::to_writer_pretty(&mut *out, &report)?;
            writeln!(out)?;
        }
    }
    Ok(())
}
