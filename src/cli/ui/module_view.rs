use std::fmt::{self, Display, Formatter};

use crate::cli::classify::Classification;
use crate::cli::modules::ModuleReport;
use crate::session::EnumerationOutcome;

use super::painter::{Painter, Tone};
use super::table::Table;

/// Renders an enumeration outcome for one device.
pub(crate) struct ModuleListView<'a> {
    report: &'a ModuleReport,
    painter: &'a Painter,
}

impl<'a> ModuleListView<'a> {
    pub(crate) fn new(report: &'a ModuleReport, painter: &'a Painter) -> Self {
        Self { report, painter }
    }
}

impl Display for ModuleListView<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let device = &self.report.device;
        writeln!(
            f,
            "{} {} [{}]",
            self.painter.heading("Modules on"),
            self.painter
                .value(format!("{} ({})", device.display_name(), device.address())),
            self.painter.outcome(&self.report.outcome)
        )?;

        match &self.report.outcome {
            EnumerationOutcome::Ready(modules) if modules.is_empty() => write!(
                f,
                "{}",
                self.painter.paint(
                    Tone::Caution,
                    "The device answered but exposes no recognised modules."
                )
            ),
            EnumerationOutcome::Ready(modules) => {
                let rows = modules
                    .iter()
                    .map(|module| {
                        vec![
                            self.painter.value(module.display_name()),
                            module.uuid().to_string(),
                            module.instance_id().to_string(),
                        ]
                    })
                    .collect();
                let table = Table::grid(["module", "uuid", "instance"], rows).numeric(2);
                write!(f, "{table}")
            }
            EnumerationOutcome::TimedOut => write!(
                f,
                "{}",
                self.painter.paint(
                    Tone::Caution,
                    "Timed out waiting for the device's services. Try again."
                )
            ),
            EnumerationOutcome::Failed(reason) => {
                write!(f, "{} {reason}", self.painter.paint(Tone::Bad, "Failed:"))
            }
            EnumerationOutcome::Pending => write!(f, "{}", self.painter.muted("Still loading.")),
        }
    }
}

/// Renders offline classification results.
pub(crate) struct ClassificationView<'a> {
    classifications: &'a [Classification],
    painter: &'a Painter,
}

impl<'a> ClassificationView<'a> {
    pub(crate) fn new(classifications: &'a [Classification], painter: &'a Painter) -> Self {
        Self {
            classifications,
            painter,
        }
    }
}

impl Display for ClassificationView<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let rows = self
            .classifications
            .iter()
            .map(|classification| {
                vec![
                    classification.uuid.to_string(),
                    classification.instance_id.to_string(),
                    self.painter.yes_no(classification.module.is_some()),
                    classification
                        .module
                        .as_deref()
                        .map_or_else(|| self.painter.placeholder(), |name| self.painter.value(name)),
                ]
            })
            .collect();
        let table = Table::grid(["uuid", "instance", "module", "name"], rows).numeric(1);
        write!(f, "{table}")
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use uuid::Uuid;

    use super::*;
    use crate::hw::{DiscoveredDevice, GattService, PeripheralHandle, RawPeripheral};
    use crate::session::FailureReason;
    use crate::ModuleClassifier;

    fn report(outcome: EnumerationOutcome) -> ModuleReport {
        ModuleReport {
            device: DiscoveredDevice::from(
                RawPeripheral::new("AA:01", Some("Saber".into()))
                    .with_handle(PeripheralHandle::new("AA:01")),
            ),
            outcome,
        }
    }

    #[test]
    fn ready_outcome_lists_modules_in_order() {
        let classifier = ModuleClassifier::default();
        let modules = classifier.classify_all(&[
            GattService::new(Uuid::from_u128(0x7d0a309f_7699_494e_b638_deadbeef0000), 0),
            GattService::new(Uuid::from_u128(0x7d0a7103_7699_494e_b638_deadbeef0000), 0),
        ]);
        let painter = Painter::new(false);

        let rendered = ModuleListView::new(&report(EnumerationOutcome::Ready(modules)), &painter)
            .to_string();

        assert!(rendered.contains("Saber (AA:01) [ready]"));
        assert!(rendered.find("Mixer Service") < rendered.find("Blade LED"));
    }

    #[rstest]
    #[case::empty(EnumerationOutcome::Ready(Vec::new()), "no recognised modules")]
    #[case::timed_out(EnumerationOutcome::TimedOut, "Timed out")]
    #[case::failed(
        EnumerationOutcome::Failed(FailureReason::Transport("link lost".into())),
        "Failed: transport failure: link lost"
    )]
    fn non_ready_outcomes_explain_themselves(
        #[case] outcome: EnumerationOutcome,
        #[case] expected: &str,
    ) {
        let painter = Painter::new(false);
        let rendered = ModuleListView::new(&report(outcome), &painter).to_string();

        assert!(rendered.contains(expected), "{rendered}");
    }

    #[test]
    fn classification_marks_modules() {
        let classifications = vec![
            Classification {
                uuid: Uuid::from_u128(0x7d0a7103_7699_494e_b638_deadbeef0000),
                instance_id: 0,
                module: Some("Blade LED".into()),
            },
            Classification {
                uuid: Uuid::from_u128(0x0000180f_0000_1000_8000_00805f9b34fb),
                instance_id: 0,
                module: None,
            },
        ];
        let painter = Painter::new(false);

        let rendered = ClassificationView::new(&classifications, &painter).to_string();

        assert!(rendered.contains("Blade LED"));
        assert!(rendered.contains("0000180f-0000-1000-8000-00805f9b34fb"));
    }
}
