use std::io;

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use uuid::Uuid;

use crate::classifier::ModuleClassifier;
use crate::cli::OutputFormat;
use crate::hw::number_service_instances;
use crate::module_names::ModuleNameTable;
use crate::terminal::TerminalClient;

use super::ui::{ClassificationView, Painter};

/// Arguments for the `classify` command.
#[derive(Debug, Args)]
pub struct ClassifyArgs {
    /// Service UUIDs in reported order.
    #[arg(required = true)]
    uuids: Vec<Uuid>,
}

impl ClassifyArgs {
    #[must_use]
    pub fn new(uuids: Vec<Uuid>) -> Self {
        Self { uuids }
    }
}

/// One classified service UUID.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub(crate) struct Classification {
    pub(crate) uuid: Uuid,
    pub(crate) instance_id: u32,
    pub(crate) module: Option<String>,
}

/// Executes the `classify` command.
pub(crate) fn run<W>(
    names: &ModuleNameTable,
    args: &ClassifyArgs,
    out: &mut W,
    terminal_client: &dyn TerminalClient,
    output_format: OutputFormat,
) -> Result<()>
where
    W: io::Write,
{
    let classifier = ModuleClassifier::new(names.clone());
    let classifications: Vec<Classification> = number_service_instances(args.uuids.iter().copied())
        .iter()
        .map(|service| Classification {
            uuid: service.uuid(),
            instance_id: service.instance_id(),
            module: ModuleClassifier::is_module(service)
                .then(|| classifier.classify(service).display_name().to_string()),
        })
        .collect();

    match output_format {
        OutputFormat::Pretty => {
            let painter = Painter::new(terminal_client.stdout_is_terminal());
            writeln!(out, "{}", ClassificationView::new(&classifications, &painter))?;
        }
        OutputFormat::Json => {
            serde_json::to_writer_pretty(&mut *out, &classifications)?;
            writeln!(out)?;
        }
    }
    Ok(())
}
