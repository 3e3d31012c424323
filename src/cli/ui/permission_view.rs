use std::fmt::{self, Display, Formatter};

use crate::cli::permissions::PermissionReport;

use super::painter::Painter;
use super::table::Table;

/// Renders required and missing capabilities.
pub(crate) struct PermissionView<'a> {
    report: &'a PermissionReport<'a>,
    painter: &'a Painter,
}

impl<'a> PermissionView<'a> {
    pub(crate) fn new(report: &'a PermissionReport<'a>, painter: &'a Painter) -> Self {
        Self { report, painter }
    }
}

impl Display for PermissionView<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let profile = self.report.profile;
        writeln!(f, "{}", self.painter.heading("Permissions"))?;
        let table = Table::key_value(
            self.painter,
            vec![
                ("api level", self.painter.value(profile.api_level().to_string())),
                ("scanner supported", self.painter.yes_no(self.report.scanner_supported)),
                ("scan requires", profile.scan().to_string()),
                ("scan missing", self.painter.missing(&self.report.missing_scan)),
                ("connect requires", profile.connect().to_string()),
                ("connect missing", self.painter.missing(&self.report.missing_connect)),
                ("host denies", self.painter.missing(&self.report.denied)),
            ],
        );
        write!(f, "{table}")
    }
}
