use chrono::NaiveDate;
use std::path::Path;
use tracing::{debug, info, warn};

use super::{FinancialStatements, StatementTable};
use crate::error::{DataError, DataResult};
use crate::models::{EstimateOrder, StatementRow, StatementType};
use crate::utils::{load_table_robust, parse_amount, parse_code, RawTable};

/// Regulator values are published in thousands
pub const VALUE_SCALE: f64 = 1000.0;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Column positions of the fields the valuation reads
struct StatementColumns {
    cvm_code: usize,
    account_code: usize,
    reference_date: usize,
    estimate_order: usize,
    value: usize,
}

impl StatementColumns {
    fn locate(table: &RawTable, source: &Path) -> DataResult<Self> {
        Ok(Self {
            cvm_code: table.require_column("CD_CVM", source)?,
            account_code: table.require_column("CD_CONTA", source)?,
            reference_date: table.require_column("DT_REFER", source)?,
            estimate_order: table.require_column("ORDEM_EXERC", source)?,
            value: table.require_column("VL_CONTA", source)?,
        })
    }
}

/// Convert a raw table into typed rows, scaling values to full currency units
pub fn statement_table_from_raw(table: &RawTable, source: &Path) -> DataResult<StatementTable> {
    let columns = StatementColumns::locate(table, source)?;
    let mut statement_table = StatementTable::default();
    let mut dropped = 0usize;

    for record in &table.records {
        let cvm_code = record.get(columns.cvm_code).and_then(parse_code);
        let reference_date = record
            .get(columns.reference_date)
            .and_then(|d| NaiveDate::parse_from_str(d.trim(), DATE_FORMAT).ok());

        let (Some(cvm_code), Some(reference_date)) = (cvm_code, reference_date) else {
            dropped += 1;
            continue;
        };

        statement_table.push(StatementRow {
            cvm_code,
            reference_date,
            account_code: record.get(columns.account_code).unwrap_or("").trim().to_string(),
            value: parse_amount(record.get(columns.value).unwrap_or("")) * VALUE_SCALE,
            estimate_order: EstimateOrder::parse(record.get(columns.estimate_order).unwrap_or("")),
        });
    }

    if dropped > 0 {
        debug!("Dropped {} rows with unparseable code or date from {}", dropped, source.display());
    }

    Ok(statement_table)
}

/// Load one reconciled table from disk
pub fn load_statement_table(path: &Path) -> DataResult<StatementTable> {
    let table = load_table_robust(path)?;
    statement_table_from_raw(&table, path)
}

/// Load every statement table the valuation needs from the data directory
pub fn load_financial_statements(data_dir: &Path) -> DataResult<FinancialStatements> {
    let mut statements = FinancialStatements::new();

    for statement_type in StatementType::all() {
        let path = data_dir.join(statement_type.output_file_name());

        if !path.exists() {
            if statement_type.is_required() {
                return Err(DataError::MissingInput(format!(
                    "essential data file not found: {}",
                    path.display()
                )));
            }
            warn!("Optional table {} not found, continuing without it", path.display());
            statements.insert(statement_type, StatementTable::default());
            continue;
        }

        let table = match load_statement_table(&path) {
            Ok(table) => table,
            Err(e) if !statement_type.is_required() => {
                warn!("Optional table {} unreadable ({}), continuing without it", path.display(), e);
                StatementTable::default()
            }
            Err(e) => return Err(e),
        };
        info!(
            "📊 Loaded {} rows for {} companies from {}",
            table.len(),
            table.company_count(),
            path.display()
        );
        statements.insert(statement_type, table);
    }

    Ok(statements)
}
