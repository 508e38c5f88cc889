//! Column Mapper
//!
//! Renders a [`NormalizedRecord`] into one [`OutputRow`] following the
//! column table. Mapping never fails: absent data is an empty cell.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::{NormalizedRecord, OutputRow, RowStatus};
use crate::schema::{ColumnDef, Combine, OutputSchema, ValuePolicy};

static URI_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^https?://\S+").expect("valid regex"));

/// Map one record to one row, in schema order.
///
/// Columns whose policy dropped values are listed in
/// [`OutputRow::lossy_columns`].
pub fn map_row(record: &NormalizedRecord, schema: &OutputSchema) -> OutputRow {
    let mut cells = Vec::with_capacity(schema.len());
    let mut lossy_columns = Vec::new();

    for (index, column) in schema.columns().iter().enumerate() {
        let values = source_values(record, column);
        let (cell, lossy) = render(column.policy, &values, schema, index);
        if lossy {
            lossy_columns.push(index);
        }
        cells.push(cell);
    }

    OutputRow {
        identifier: record.first("mms_id").unwrap_or_default().to_string(),
        cells,
        status: RowStatus::Active,
        lossy_columns,
    }
}

/// Map a batch of records, preserving order.
pub fn map_rows<'a, I>(records: I, schema: &OutputSchema) -> Vec<OutputRow>
where
    I: IntoIterator<Item = &'a NormalizedRecord>,
{
    records.into_iter().map(|r| map_row(r, schema)).collect()
}

/// Values feeding a column after applying its combination rule.
fn source_values<'r>(record: &'r NormalizedRecord, column: &ColumnDef) -> Vec<&'r str> {
    match column.combine {
        Combine::Fallback => column
            .sources
            .iter()
            .map(|key| record.values(key))
            .find(|values| !values.is_empty())
            .unwrap_or(&[])
            .iter()
            .map(String::as_str)
            .collect(),
        Combine::Concat => column
            .sources
            .iter()
            .flat_map(|key| record.values(key))
            .map(String::as_str)
            .collect(),
    }
}

/// Cell text and whether values were dropped.
fn render(
    policy: ValuePolicy,
    values: &[&str],
    schema: &OutputSchema,
    index: usize,
) -> (String, bool) {
    match policy {
        ValuePolicy::Single => (first(values), values.len() > 1),
        ValuePolicy::FirstOnly => (first(values), false),
        ValuePolicy::Join => (values.join(schema.join_delimiter()), false),
        ValuePolicy::Nth(n) => {
            let cell = values.get(n).map(|v| v.to_string()).unwrap_or_default();
            let lossy = schema.is_series_tail(index) && values.len() > n + 1;
            (cell, lossy)
        }
        ValuePolicy::FirstUri => {
            let uri = values
                .iter()
                .find(|v| URI_PATTERN.is_match(v))
                .map(|v| v.to_string())
                .unwrap_or_default();
            (uri, false)
        }
    }
}

fn first(values: &[&str]) -> String {
    values.first().map(|v| v.to_string()).unwrap_or_default()
}
