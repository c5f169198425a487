// src/ingest/mod.rs
use csv::ReaderBuilder;
use std::io::{Cursor, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};
use zip::ZipArchive;

use crate::schema::infer_columns;
use crate::store::SqliteStore;

pub mod report;

pub use report::{LoadReport, TableReport};

/// The input blob could not be opened as a ZIP archive. This is the only
/// fatal condition of a load; everything past the open is accounted for in
/// the report instead of propagated.
#[derive(Debug, Error)]
#[error("failed to open archive: {0}")]
pub struct ArchiveError(#[from] zip::result::ZipError);

/// Shared cancellation flag, checked between table iterations and between
/// row inserts. Cancelling an in-flight load yields a partial report; it
/// never rolls back tables already populated.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// Data rows examined per column before committing a type. The original
    /// system sampled a single row; widening the sample trades inference
    /// cost against fewer false INTEGER/REAL verdicts.
    pub sample_rows: usize,
    pub cancel: CancelFlag,
}

impl Default for LoadOptions {
    fn default() -> Self {
        LoadOptions {
            sample_rows: 1,
            cancel: CancelFlag::new(),
        }
    }
}

/// Load every `.csv` entry of the ZIP in `bytes` into `store`, one table
/// per entry, and report what happened.
///
/// Entry names not ending in `.csv` are skipped. The table name is the
/// entry name with only the trailing `.csv` stripped. Each table is dropped
/// if it already exists and recreated from the inferred columns, so loading
/// the same archive twice replaces rather than unions. A row that fails to
/// insert is tallied and skipped; a table that fails to set up is recorded
/// and the remaining entries still run. Only a blob that is not a ZIP at
/// all aborts the call.
///
/// Callers serialize loads per store: two concurrent calls would race on
/// the drop/create of identically named tables.
#[instrument(level = "info", skip_all, fields(bytes = bytes.len()))]
pub fn load_archive(
    store: &mut SqliteStore,
    bytes: &[u8],
    options: &LoadOptions,
) -> Result<LoadReport, ArchiveError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;
    let mut report = LoadReport::default();

    for i in 0..archive.len() {
        if options.cancel.is_cancelled() {
            info!("load cancelled between tables");
            report.cancelled = true;
            break;
        }

        let mut entry = match archive.by_index(i) {
            Ok(entry) => entry,
            Err(err) => {
                warn!(index = i, "unreadable archive entry: {err}");
                continue;
            }
        };
        let entry_name = entry.name().to_string();
        let table_name = match entry_name.strip_suffix(".csv") {
            Some(name) if entry.is_file() => name.to_string(),
            _ => continue,
        };

        let mut buf = Vec::with_capacity(entry.size() as usize);
        if let Err(err) = entry.read_to_end(&mut buf) {
            warn!(entry = %entry_name, "failed to read entry: {err}");
            report
                .tables
                .push(TableReport::failed(table_name, format!("read: {err}")));
            continue;
        }
        drop(entry);

        let (table, cancelled) = ingest_entry(store, &table_name, &buf, options);
        report.tables.push(table);
        if cancelled {
            report.cancelled = true;
            break;
        }
    }

    info!(
        tables = report.tables.len(),
        inserted = report.total_inserted(),
        failed_rows = report.total_failed_rows(),
        cancelled = report.cancelled,
        "load finished"
    );
    Ok(report)
}

/// Ingest one CSV entry: tokenize, infer columns from the header plus the
/// first `sample_rows` data rows, drop-and-recreate the table, then insert
/// row by row. Returns the table's report and whether cancellation was
/// observed mid-table.
fn ingest_entry(
    store: &mut SqliteStore,
    table_name: &str,
    data: &[u8],
    options: &LoadOptions,
) -> (TableReport, bool) {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(Cursor::new(data));

    // Line 0 is the header; everything after is data. A malformed line
    // surfaces as a per-row failure below, not a parse abort.
    let mut header: Option<Vec<String>> = None;
    let mut rows: Vec<Result<Vec<String>, csv::Error>> = Vec::new();
    for result in reader.records() {
        match result {
            Ok(record) => {
                let fields: Vec<String> = record.iter().map(str::to_string).collect();
                match header {
                    None => header = Some(fields),
                    Some(_) => rows.push(Ok(fields)),
                }
            }
            Err(err) => match header {
                None => {
                    return (
                        TableReport::failed(table_name, format!("malformed header: {err}")),
                        false,
                    )
                }
                Some(_) => rows.push(Err(err)),
            },
        }
    }
    let header = match header {
        Some(h) => h,
        None => {
            return (
                TableReport::failed(table_name, "entry has no header row"),
                false,
            )
        }
    };

    let sample: Vec<Vec<String>> = rows
        .iter()
        .filter_map(|r| r.as_ref().ok().cloned())
        .take(options.sample_rows)
        .collect();
    let columns = infer_columns(&header, &sample);

    let mut table = TableReport::new(table_name, columns.clone());
    let setup = match store.drop_table_if_exists(table_name) {
        Ok(()) => store.create_table(table_name, &columns),
        Err(err) => Err(err),
    };
    if let Err(err) = setup {
        // Table-level failure: record it, skip this entry's rows, let the
        // remaining entries run.
        warn!(table = table_name, "table setup failed: {err}");
        table.error = Some(err.to_string());
        return (table, false);
    }

    for result in rows {
        if options.cancel.is_cancelled() {
            info!(table = table_name, "load cancelled between rows");
            return (table, true);
        }
        table.rows += 1;
        match result {
            Ok(fields) => match store.insert_row(table_name, &fields) {
                Ok(()) => table.inserted += 1,
                Err(err) => {
                    debug!(table = table_name, row = table.rows, "row rejected: {err}");
                    table.failed_rows += 1;
                }
            },
            Err(err) => {
                debug!(table = table_name, row = table.rows, "malformed line: {err}");
                table.failed_rows += 1;
            }
        }
    }

    debug!(
        table = table_name,
        rows = table.rows,
        inserted = table.inserted,
        failed = table.failed_rows,
        "table loaded"
    );
    (table, false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ColumnType;
    use anyhow::Result;
    use std::io::Write;
    use tracing_subscriber::{EnvFilter, FmtSubscriber};
    use zip::write::FileOptions;
    use zip::CompressionMethod;

    fn init_test_logging() {
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(
                EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| EnvFilter::new("info,merchant_ingest::ingest=debug")),
            )
            .with_test_writer()
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    }

    /// Build an in-memory ZIP from (entry name, contents) pairs.
    fn build_zip(entries: &[(&str, &str)]) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        {
            let mut zip = zip::ZipWriter::new(Cursor::new(&mut buf));
            for (name, contents) in entries {
                let options: FileOptions<'_, ()> =
                    FileOptions::default().compression_method(CompressionMethod::Stored);
                zip.start_file(*name, options)?;
                zip.write_all(contents.as_bytes())?;
            }
            zip.finish()?;
        }
        Ok(buf)
    }

    #[test]
    fn invalid_blob_is_an_archive_error() {
        init_test_logging();
        let mut store = SqliteStore::open_in_memory().unwrap();
        let err = load_archive(&mut store, b"definitely not a zip", &LoadOptions::default());
        assert!(err.is_err());
    }

    #[test]
    fn archive_without_csv_entries_yields_empty_report() -> Result<()> {
        init_test_logging();
        let zip = build_zip(&[("readme.txt", "hello"), ("data.json", "{}")])?;
        let mut store = SqliteStore::open_in_memory()?;
        let report = load_archive(&mut store, &zip, &LoadOptions::default())?;
        assert!(report.tables.is_empty());
        assert!(!report.cancelled);
        Ok(())
    }

    #[test]
    fn header_only_entry_creates_empty_text_table() -> Result<()> {
        init_test_logging();
        let zip = build_zip(&[("empty.csv", "id,name\n")])?;
        let mut store = SqliteStore::open_in_memory()?;
        let report = load_archive(&mut store, &zip, &LoadOptions::default())?;

        assert_eq!(report.tables.len(), 1);
        let table = &report.tables[0];
        assert_eq!(table.name, "empty");
        assert_eq!(table.rows, 0);
        // No data row to sample: both columns default to TEXT.
        assert!(table.columns.iter().all(|c| c.ty == ColumnType::Text));
        assert_eq!(store.row_count("empty")?, 0);
        Ok(())
    }

    #[test]
    fn types_are_fixed_from_the_first_data_row() -> Result<()> {
        init_test_logging();
        let zip = build_zip(&[("orders.csv", "id,total,note\n1,9.99,first\n2,3.50,second\n")])?;
        let mut store = SqliteStore::open_in_memory()?;
        let report = load_archive(&mut store, &zip, &LoadOptions::default())?;

        let table = &report.tables[0];
        assert_eq!(table.name, "orders");
        assert_eq!(table.columns[0].ty, ColumnType::Integer);
        assert_eq!(table.columns[1].ty, ColumnType::Real);
        assert_eq!(table.columns[2].ty, ColumnType::Text);
        assert_eq!(table.inserted, 2);
        assert_eq!(table.failed_rows, 0);
        Ok(())
    }

    #[test]
    fn row_failures_are_isolated() -> Result<()> {
        init_test_logging();
        // First row commits INTEGER for `id`; the second row then fails to
        // coerce but must not take the table (or the archive) down.
        let zip = build_zip(&[("t.csv", "id\n1\nnot-a-number\n")])?;
        let mut store = SqliteStore::open_in_memory()?;
        let report = load_archive(&mut store, &zip, &LoadOptions::default())?;

        let table = &report.tables[0];
        assert_eq!(table.rows, 2);
        assert_eq!(table.inserted, 1);
        assert_eq!(table.failed_rows, 1);
        assert!(table.error.is_none());
        assert_eq!(store.row_count("t")?, 1);
        Ok(())
    }

    #[test]
    fn field_count_mismatch_is_a_row_failure() -> Result<()> {
        init_test_logging();
        let zip = build_zip(&[("t.csv", "a,b\n1,2\n1,2,3\n4,5\n")])?;
        let mut store = SqliteStore::open_in_memory()?;
        let report = load_archive(&mut store, &zip, &LoadOptions::default())?;

        let table = &report.tables[0];
        assert_eq!(table.inserted, 2);
        assert_eq!(table.failed_rows, 1);
        Ok(())
    }

    #[test]
    fn only_the_trailing_csv_suffix_is_stripped() -> Result<()> {
        init_test_logging();
        let zip = build_zip(&[("orders.csv", "id\n1\n"), ("a.b.csv", "id\n2\n")])?;
        let mut store = SqliteStore::open_in_memory()?;
        let report = load_archive(&mut store, &zip, &LoadOptions::default())?;

        let names: Vec<&str> = report.tables.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["orders", "a.b"]);
        assert_eq!(store.row_count("a.b")?, 1);
        Ok(())
    }

    #[test]
    fn reloading_replaces_tables_instead_of_unioning() -> Result<()> {
        init_test_logging();
        let zip = build_zip(&[("t.csv", "id\n1\n2\n3\n")])?;
        let mut store = SqliteStore::open_in_memory()?;

        load_archive(&mut store, &zip, &LoadOptions::default())?;
        load_archive(&mut store, &zip, &LoadOptions::default())?;
        assert_eq!(store.row_count("t")?, 3);
        Ok(())
    }

    #[test]
    fn quoted_commas_stay_in_one_field() -> Result<()> {
        init_test_logging();
        let zip = build_zip(&[("t.csv", "id,name\n1,\"Widget, deluxe\"\n")])?;
        let mut store = SqliteStore::open_in_memory()?;
        let report = load_archive(&mut store, &zip, &LoadOptions::default())?;

        assert_eq!(report.tables[0].inserted, 1);
        assert_eq!(report.tables[0].failed_rows, 0);
        Ok(())
    }

    #[test]
    fn wider_sample_widens_the_column_type() -> Result<()> {
        init_test_logging();
        let zip = build_zip(&[("t.csv", "v\n1\n1.5\n")])?;
        let mut store = SqliteStore::open_in_memory()?;

        let options = LoadOptions {
            sample_rows: 2,
            ..LoadOptions::default()
        };
        let report = load_archive(&mut store, &zip, &options)?;

        let table = &report.tables[0];
        assert_eq!(table.columns[0].ty, ColumnType::Real);
        assert_eq!(table.inserted, 2);
        assert_eq!(table.failed_rows, 0);
        Ok(())
    }

    #[test]
    fn table_setup_failure_skips_rows_but_not_later_tables() -> Result<()> {
        init_test_logging();
        // Duplicate column names make CREATE TABLE fail for the first entry.
        let zip = build_zip(&[("bad.csv", "id,id\n1,2\n"), ("good.csv", "id\n1\n")])?;
        let mut store = SqliteStore::open_in_memory()?;
        let report = load_archive(&mut store, &zip, &LoadOptions::default())?;

        assert_eq!(report.tables.len(), 2);
        assert!(report.tables[0].error.is_some());
        assert_eq!(report.tables[0].inserted, 0);
        assert!(report.tables[1].error.is_none());
        assert_eq!(store.row_count("good")?, 1);
        Ok(())
    }

    #[test]
    fn cancellation_stops_before_the_next_table() -> Result<()> {
        init_test_logging();
        let zip = build_zip(&[("t.csv", "id\n1\n")])?;
        let mut store = SqliteStore::open_in_memory()?;

        let options = LoadOptions::default();
        options.cancel.cancel();
        let report = load_archive(&mut store, &zip, &options)?;

        assert!(report.cancelled);
        assert!(report.tables.is_empty());
        Ok(())
    }
}
