use tracing::debug;

use super::{Column, ColumnType};

/// For each header cell, look at that column's cells across the sample rows
/// and commit the narrowest type that fits every non-empty value, under
/// INTEGER > REAL > TEXT precedence:
///  - every value parses as i64 -> INTEGER
///  - every value parses as f64, at least one not as i64 -> REAL
///  - any value fails a numeric parse -> TEXT, short-circuiting the scan
///  - no non-empty values at all -> TEXT
///
/// Column names are taken verbatim from the header. Rows shorter than the
/// header simply contribute no sample for the missing columns.
pub fn infer_columns(header: &[String], sample_rows: &[Vec<String>]) -> Vec<Column> {
    header
        .iter()
        .enumerate()
        .map(|(idx, name)| {
            let ty = infer_type(
                sample_rows
                    .iter()
                    .filter_map(|row| row.get(idx).map(String::as_str)),
            );
            if ty == ColumnType::Text && !sample_rows.is_empty() {
                debug!(column = %name, "no numeric sample, defaulting to TEXT");
            }
            Column::new(name.clone(), ty)
        })
        .collect()
}

/// Infer a single column's type from its sampled values. Empty cells are
/// ignored; a column sampled only as empty defaults to TEXT.
pub fn infer_type<'a, I>(samples: I) -> ColumnType
where
    I: IntoIterator<Item = &'a str>,
{
    let mut seen_value = false;
    let mut all_integral = true;

    for raw in samples {
        let value = raw.trim();
        if value.is_empty() {
            continue;
        }
        seen_value = true;

        if value.parse::<i64>().is_ok() {
            continue;
        }
        if value.parse::<f64>().is_ok() {
            all_integral = false;
            continue;
        }
        // Non-numeric value: the whole column degrades to TEXT.
        return ColumnType::Text;
    }

    match (seen_value, all_integral) {
        (false, _) => ColumnType::Text,
        (true, true) => ColumnType::Integer,
        (true, false) => ColumnType::Real,
    }
}
