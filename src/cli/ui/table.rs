use std::collections::BTreeSet;
use std::fmt::{self, Display, Formatter};

use tabled::builder::Builder;
use tabled::settings::object::Columns;
use tabled::settings::{Alignment, Style};

use super::painter::Painter;

/// Rounded table rendered through `Display`, with optional right-aligned columns.
#[derive(Debug, Default)]
pub(crate) struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
    numeric_columns: BTreeSet<usize>,
}

impl Table {
    pub(crate) fn grid(
        headers: impl IntoIterator<Item = impl Into<String>>,
        rows: Vec<Vec<String>>,
    ) -> Self {
        Self {
            headers: headers.into_iter().map(Into::into).collect(),
            rows,
            numeric_columns: BTreeSet::new(),
        }
    }

    /// Two columns of muted labels and their values.
    pub(crate) fn key_value(painter: &Painter, rows: Vec<(&str, String)>) -> Self {
        let rows = rows
            .into_iter()
            .map(|(label, value)| vec![painter.muted(label), value])
            .collect();
        Self::grid(["field", "value"], rows)
    }

    /// Right-aligns the column at `index`, such as instance ordinals.
    #[must_use]
    pub(crate) fn numeric(mut self, index: usize) -> Self {
        self.numeric_columns.insert(index);
        self
    }
}

impl Display for Table {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut builder = Builder::default();
        builder.push_record(self.headers.iter().map(String::as_str));
        for row in &self.rows {
            builder.push_record(row.iter().map(String::as_str));
        }

        let mut table = builder.build();
        table.with(Style::rounded());
        for &index in &self.numeric_columns {
            table.modify(Columns::new(index..=index), Alignment::right());
        }
        write!(f, "{table}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_render_below_headers_in_order() {
        let rendered = Table::grid(
            ["module", "instance"],
            vec![
                vec!["Blade LED".into(), "0".into()],
                vec!["Mixer Service".into(), "1".into()],
            ],
        )
        .numeric(1)
        .to_string();

        let header = rendered.find("module").expect("header should render");
        let blade = rendered.find("Blade LED").expect("first row should render");
        let mixer = rendered.find("Mixer Service").expect("second row should render");
        assert!(header < blade && blade < mixer);
        assert!(rendered.starts_with('╭'));
    }

    #[test]
    fn key_value_rows_keep_labels() {
        let painter = Painter::new(false);
        let rendered = Table::key_value(&painter, vec![("api level", "31".into())]).to_string();

        assert!(rendered.contains("field"));
        assert!(rendered.contains("api level"));
        assert!(rendered.contains("31"));
    }
}
