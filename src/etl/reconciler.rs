//! Consolidated/individual reconciliation of yearly statement tables.
//!
//! For every year the consolidated rows of an entity win. Individual rows are used
//! only for entities with no consolidated rows at all in that year; a partially
//! populated consolidated report still suppresses the individual one.

use anyhow::{Context, Result};
use csv::{StringRecord, WriterBuilder};
use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

use super::archive::{YearTables, YearlySource};
use crate::models::StatementType;
use crate::utils::{parse_code, RawTable};

const CODE_COLUMN: &str = "CD_CVM";

/// Reconciled rows sharing one header, appended year by year
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconciledTable {
    pub headers: Option<StringRecord>,
    pub records: Vec<StringRecord>,
}

impl ReconciledTable {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Append a year's block, aligning it to the first header seen
    pub fn append(&mut self, block: RawTable) {
        let headers = self.headers.get_or_insert_with(|| block.headers.clone());
        let aligned = align_records(headers, &block);
        self.records.extend(aligned);
    }
}

/// Summary of one statement type's ETL pass
#[derive(Debug, Clone, PartialEq)]
pub struct ReconcileOutcome {
    pub statement_type: StatementType,
    pub output_path: PathBuf,
    pub years_written: Vec<i32>,
    pub rows_written: usize,
}

impl ReconcileOutcome {
    pub fn is_empty(&self) -> bool {
        self.rows_written == 0
    }
}

/// Keep rows whose entity code parses and is in `filter`; the code cell is rewritten in integer form
fn restrict_to_codes(table: RawTable, filter: &HashSet<i64>) -> (RawTable, HashSet<i64>) {
    let Some(code_idx) = table.column_index(CODE_COLUMN) else {
        warn!("Sub-table without {} column ignored", CODE_COLUMN);
        return (RawTable::new(table.headers, Vec::new()), HashSet::new());
    };

    let mut codes = HashSet::new();
    let records = table
        .records
        .into_iter()
        .filter_map(|record| {
            let code = record.get(code_idx).and_then(parse_code)?;
            if !filter.contains(&code) {
                return None;
            }
            codes.insert(code);
            let code_text = code.to_string();
            Some(
                record
                    .iter()
                    .enumerate()
                    .map(|(i, field)| if i == code_idx { code_text.as_str() } else { field })
                    .collect::<StringRecord>(),
            )
        })
        .collect();

    (RawTable::new(table.headers, records), codes)
}

/// Map records of `block` onto `headers` by column name; missing columns are left blank
fn align_records(headers: &StringRecord, block: &RawTable) -> Vec<StringRecord> {
    if &block.headers == headers {
        return block.records.clone();
    }

    let positions: Vec<Option<usize>> = headers
        .iter()
        .map(|header| block.column_index(header))
        .collect();

    block
        .records
        .iter()
        .map(|record| {
            positions
                .iter()
                .map(|position| position.and_then(|i| record.get(i)).unwrap_or(""))
                .collect::<StringRecord>()
        })
        .collect()
}

/// Reconcile one year: consolidated rows first, then individual rows of entities absent from consolidated
pub fn reconcile_year(tables: YearTables, filter: &HashSet<i64>) -> Option<RawTable> {
    let consolidated = tables
        .consolidated
        .map(|table| restrict_to_codes(table, filter));
    let individual = tables
        .individual
        .map(|table| restrict_to_codes(table, filter).0);

    let (mut combined, consolidated_codes) = match consolidated {
        Some((table, codes)) => (Some(table), codes),
        None => (None, HashSet::new()),
    };

    if let Some(individual) = individual {
        let code_idx = individual.column_index(CODE_COLUMN);
        let fallback: Vec<StringRecord> = individual
            .records
            .iter()
            .filter(|record| {
                code_idx
                    .and_then(|i| record.get(i))
                    .and_then(parse_code)
                    .map_or(false, |code| !consolidated_codes.contains(&code))
            })
            .cloned()
            .collect();
        let fallback = RawTable::new(individual.headers, fallback);

        match combined.as_mut() {
            Some(table) => {
                let aligned = align_records(&table.headers, &fallback);
                table.records.extend(aligned);
            }
            None => combined = Some(fallback),
        }
    }

    combined.filter(|table| !table.is_empty())
}

/// Append-only CSV output: header once, then one block per year
pub struct IncrementalCsvWriter {
    path: PathBuf,
    headers: Option<StringRecord>,
    rows_written: usize,
}

impl IncrementalCsvWriter {
    /// Start a fresh output, removing any previous file at `path`
    pub fn create(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if path.exists() {
            std::fs::remove_file(&path)
                .with_context(|| format!("Failed to remove old output {}", path.display()))?;
        }
        Ok(Self {
            path,
            headers: None,
            rows_written: 0,
        })
    }

    pub fn append_block(&mut self, block: &RawTable) -> Result<()> {
        let header_written = self.headers.is_some();
        let file = if header_written {
            OpenOptions::new().append(true).open(&self.path)?
        } else {
            File::create(&self.path)?
        };
        let mut writer = WriterBuilder::new().delimiter(b',').from_writer(file);

        let headers = self.headers.get_or_insert_with(|| block.headers.clone());
        if !header_written {
            writer.write_record(headers.iter())?;
        }

        for record in align_records(headers, block) {
            writer.write_record(&record)?;
            self.rows_written += 1;
        }
        writer.flush()?;
        Ok(())
    }

    /// Close the output; with no rows appended the file holds `fallback_headers` alone
    pub fn finish(self, fallback_headers: Option<&StringRecord>) -> Result<usize> {
        if self.headers.is_none() {
            let mut writer = WriterBuilder::new()
                .delimiter(b',')
                .from_writer(File::create(&self.path)?);
            if let Some(headers) = fallback_headers {
                writer.write_record(headers.iter())?;
            }
            writer.flush()?;
        }
        Ok(self.rows_written)
    }
}

/// Per-statement-type reconciliation over a range of years
pub struct StatementReconciler<S: YearlySource> {
    source: S,
}

impl<S: YearlySource> StatementReconciler<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }

    /// Visit each year's reconciled block in order; unreadable years are logged and skipped
    ///
    /// Returns the first sub-table header seen, even when every row was filtered out.
    fn for_each_year<F>(
        &self,
        statement_type: StatementType,
        years: impl IntoIterator<Item = i32>,
        filter: &HashSet<i64>,
        mut sink: F,
    ) -> Result<Option<StringRecord>>
    where
        F: FnMut(i32, RawTable) -> Result<()>,
    {
        let mut first_headers = None;
        for year in years {
            let tables = match self.source.load_year(statement_type, year) {
                Ok(Some(tables)) => tables,
                Ok(None) => {
                    warn!("--- Skipping {} {}: no archive for this year ---", statement_type, year);
                    continue;
                }
                Err(e) => {
                    error!("❌ Failed to read {} data for {}: {}", statement_type, year, e);
                    continue;
                }
            };

            if first_headers.is_none() {
                first_headers = tables
                    .consolidated
                    .as_ref()
                    .or(tables.individual.as_ref())
                    .map(|table| table.headers.clone());
            }
            if tables.is_empty() {
                warn!("No consolidated or individual data for {} in {}", statement_type, year);
                continue;
            }

            if let Some(block) = reconcile_year(tables, filter) {
                let rows = block.len();
                sink(year, block)?;
                info!("  -> {} rows of {} for {} appended", rows, statement_type, year);
            }
        }
        Ok(first_headers)
    }

    /// Reconcile into memory
    pub fn reconcile(
        &self,
        statement_type: StatementType,
        years: impl IntoIterator<Item = i32>,
        filter: &HashSet<i64>,
    ) -> Result<ReconciledTable> {
        let mut table = ReconciledTable::default();
        let first_headers = self.for_each_year(statement_type, years, filter, |_, block| {
            table.append(block);
            Ok(())
        })?;
        if table.headers.is_none() {
            table.headers = first_headers;
        }

        if table.is_empty() {
            warn!("❌ No data was reconciled for {}", statement_type);
        }
        Ok(table)
    }

    /// Reconcile straight to disk, one year at a time
    pub fn reconcile_to_file(
        &self,
        statement_type: StatementType,
        years: impl IntoIterator<Item = i32>,
        filter: &HashSet<i64>,
        output_path: &Path,
    ) -> Result<ReconcileOutcome> {
        info!("=== Processing {} ===", statement_type);

        let mut writer = IncrementalCsvWriter::create(output_path)?;
        let mut years_written = Vec::new();

        let first_headers = self.for_each_year(statement_type, years, filter, |year, block| {
            writer
                .append_block(&block)
                .with_context(|| format!("Failed to append {} {} to {}", statement_type, year, output_path.display()))?;
            years_written.push(year);
            Ok(())
        })?;

        let rows_written = writer.finish(first_headers.as_ref())?;
        if rows_written == 0 {
            warn!("❌ No data processed or saved for {}", statement_type);
        } else {
            info!("✅ {} written to {} ({} rows)", statement_type, output_path.display(), rows_written);
        }

        Ok(ReconcileOutcome {
            statement_type,
            output_path: output_path.to_path_buf(),
            years_written,
            rows_written,
        })
    }
}
