use std::collections::HashSet;
use std::path::Path;
use tracing::{error, info};

use crate::error::{DataError, DataResult};
use crate::models::Company;
use crate::utils::{load_table_robust, parse_code};

const CODE_COLUMN: &str = "CD_CVM";
const TICKER_COLUMN: &str = "TICKER";
const NAME_COLUMN: &str = "NOME_EMPRESA";

/// Load the regulator-code → ticker mapping, in file order
///
/// Rows without a numeric code or a ticker are dropped. Duplicate tickers are kept
/// here; the orchestrator decides which occurrence wins.
pub fn load_ticker_map(path: &Path) -> DataResult<Vec<Company>> {
    let mut table = load_table_robust(path).map_err(|e| {
        error!("Failed to load ticker mapping '{}': {}", path.display(), e);
        e
    })?;
    table.normalize_headers();

    let missing: Vec<&str> = [CODE_COLUMN, TICKER_COLUMN, NAME_COLUMN]
        .into_iter()
        .filter(|column| table.column_index(column).is_none())
        .collect();
    if !missing.is_empty() {
        return Err(DataError::malformed(
            path,
            format!("required columns {:?} not found", missing),
        ));
    }

    let code_idx = table.require_column(CODE_COLUMN, path)?;
    let ticker_idx = table.require_column(TICKER_COLUMN, path)?;
    let name_idx = table.require_column(NAME_COLUMN, path)?;

    let companies: Vec<Company> = table
        .records
        .iter()
        .filter_map(|record| {
            let cvm_code = record.get(code_idx).and_then(parse_code)?;
            let ticker = record.get(ticker_idx).map(str::trim).unwrap_or("");
            if ticker.is_empty() {
                return None;
            }
            Some(Company {
                cvm_code,
                ticker: ticker.to_string(),
                name: record.get(name_idx).unwrap_or("").trim().to_string(),
            })
        })
        .collect();

    info!("✅ Ticker mapping loaded: {} companies", companies.len());
    Ok(companies)
}

/// Set of regulator codes the ETL keeps
pub fn load_cvm_codes(path: &Path) -> DataResult<HashSet<i64>> {
    let mut table = load_table_robust(path)?;
    table.normalize_headers();
    let code_idx = table.require_column(CODE_COLUMN, path)?;

    let codes: HashSet<i64> = table
        .records
        .iter()
        .filter_map(|record| record.get(code_idx).and_then(parse_code))
        .collect();

    info!("✅ Mapping loaded: {} unique regulator codes to process", codes.len());
    Ok(codes)
}
