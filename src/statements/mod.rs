//! Reconciled statement tables as used by the valuation step.

pub mod loader;
pub mod mapping;

use std::collections::HashMap;

use crate::models::{StatementRow, StatementType};

pub use loader::{load_financial_statements, load_statement_table, VALUE_SCALE};
pub use mapping::{load_cvm_codes, load_ticker_map};

/// Rows of one statement type, grouped by company code in file order
#[derive(Debug, Clone, Default)]
pub struct StatementTable {
    rows_by_company: HashMap<i64, Vec<StatementRow>>,
    row_count: usize,
}

impl StatementTable {
    pub fn from_rows(rows: impl IntoIterator<Item = StatementRow>) -> Self {
        let mut table = StatementTable::default();
        for row in rows {
            table.push(row);
        }
        table
    }

    pub fn push(&mut self, row: StatementRow) {
        self.rows_by_company.entry(row.cvm_code).or_default().push(row);
        self.row_count += 1;
    }

    pub fn company_rows(&self, cvm_code: i64) -> &[StatementRow] {
        self.rows_by_company
            .get(&cvm_code)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.row_count
    }

    pub fn is_empty(&self) -> bool {
        self.row_count == 0
    }

    pub fn company_count(&self) -> usize {
        self.rows_by_company.len()
    }
}

/// All statement tables loaded for one analysis run
#[derive(Debug, Clone, Default)]
pub struct FinancialStatements {
    tables: HashMap<StatementType, StatementTable>,
}

impl FinancialStatements {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, statement_type: StatementType, table: StatementTable) {
        self.tables.insert(statement_type, table);
    }

    pub fn with_table(mut self, statement_type: StatementType, table: StatementTable) -> Self {
        self.insert(statement_type, table);
        self
    }

    pub fn table(&self, statement_type: StatementType) -> Option<&StatementTable> {
        self.tables.get(&statement_type)
    }

    pub fn company(&self, cvm_code: i64) -> CompanyStatements<'_> {
        let rows = |statement_type| {
            self.table(statement_type)
                .map(|table| table.company_rows(cvm_code))
                .unwrap_or(&[])
        };

        CompanyStatements {
            income: rows(StatementType::IncomeStatement),
            assets: rows(StatementType::AssetBalance),
            liabilities: rows(StatementType::LiabilityEquityBalance),
        }
    }
}

/// One company's view across the statements the valuation reads
#[derive(Debug, Clone, Copy)]
pub struct CompanyStatements<'a> {
    pub income: &'a [StatementRow],
    pub assets: &'a [StatementRow],
    pub liabilities: &'a [StatementRow],
}

impl<'a> CompanyStatements<'a> {
    /// Income, asset and liability statements all have rows
    pub fn is_complete(&self) -> bool {
        !self.income.is_empty() && !self.assets.is_empty() && !self.liabilities.is_empty()
    }
}
