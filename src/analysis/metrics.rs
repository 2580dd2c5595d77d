//! Account series extraction from a company's reconciled statement rows.

use chrono::NaiveDate;

use crate::models::StatementRow;

/// Regulator account codes read by the valuation
pub mod accounts {
    pub const EBIT: &str = "3.05";
    pub const FINANCIAL_EXPENSES: &str = "3.07";
    pub const PRE_TAX_INCOME: &str = "3.09";
    pub const INCOME_TAX: &str = "3.10";

    pub const CASH_AND_EQUIVALENTS: &str = "1.01.01";
    pub const RECEIVABLES: &str = "1.01.03";
    pub const INVENTORIES: &str = "1.01.04";
    pub const NON_CURRENT_ASSETS: &str = "1.02";

    pub const SUPPLIERS: &str = "2.01.02";
    pub const SHORT_TERM_DEBT: &str = "2.01.04";
    pub const LONG_TERM_DEBT: &str = "2.02.01";
}

/// `(date, value)` pairs of the latest-estimate rows for `account_code`, ascending by date
pub fn latest_estimate_series(rows: &[StatementRow], account_code: &str) -> Vec<(NaiveDate, f64)> {
    let mut series: Vec<(NaiveDate, f64)> = rows
        .iter()
        .filter(|row| row.account_code == account_code && row.estimate_order.is_latest())
        .map(|row| (row.reference_date, row.value))
        .collect();
    // stable: equal dates keep file order
    series.sort_by_key(|(date, _)| *date);
    series
}

/// Last value of the series, or 0 when there is none
///
/// Zero doubles as "no data"; callers must not divide by it.
pub fn latest_value(rows: &[StatementRow], account_code: &str) -> f64 {
    latest_estimate_series(rows, account_code)
        .last()
        .map(|(_, value)| *value)
        .unwrap_or(0.0)
}

/// Sum of the series over all available periods
pub fn series_sum(rows: &[StatementRow], account_code: &str) -> f64 {
    latest_estimate_series(rows, account_code)
        .iter()
        .map(|(_, value)| value)
        .sum()
}
