//! Guard and clamp properties of the valuation, swept over input ranges

use assert_matches::assert_matches;
use chrono::{Duration, NaiveDate};
use pretty_assertions::assert_eq;
use test_log::test;

use crate::common::logging::{init_test_logging, log_test_data, log_test_step};
use eva_valuation::analysis::beta::estimate_beta;
use eva_valuation::analysis::metrics::accounts;
use eva_valuation::analysis::valuation::{self, effective_tax_rate, SkipReason, MAX_TAX_RATE};
use eva_valuation::models::{
    Company, EstimateOrder, MarketAssumptions, MarketSnapshot, PricePoint, StatementRow, StatementType,
};
use eva_valuation::statements::{FinancialStatements, StatementTable};

const CODE: i64 = 4170;

fn row(account: &str, value: f64) -> StatementRow {
    StatementRow {
        cvm_code: CODE,
        reference_date: NaiveDate::from_ymd_opt(2024, 12, 31).unwrap(),
        account_code: account.to_string(),
        value,
        estimate_order: EstimateOrder::Latest,
    }
}

struct Inputs {
    income: Vec<StatementRow>,
    assets: Vec<StatementRow>,
    liabilities: Vec<StatementRow>,
}

impl Inputs {
    fn healthy() -> Self {
        Self {
            income: vec![
                row(accounts::EBIT, 1_000.0),
                row(accounts::FINANCIAL_EXPENSES, -120.0),
                row(accounts::PRE_TAX_INCOME, 900.0),
                row(accounts::INCOME_TAX, -270.0),
            ],
            assets: vec![
                row(accounts::CASH_AND_EQUIVALENTS, 500.0),
                row(accounts::RECEIVABLES, 800.0),
                row(accounts::INVENTORIES, 400.0),
                row(accounts::NON_CURRENT_ASSETS, 4_000.0),
            ],
            liabilities: vec![
                row(accounts::SUPPLIERS, 200.0),
                row(accounts::SHORT_TERM_DEBT, 400.0),
                row(accounts::LONG_TERM_DEBT, 600.0),
            ],
        }
    }

    fn set(rows: &mut Vec<StatementRow>, account: &str, value: f64) {
        rows.retain(|r| r.account_code != account);
        rows.push(row(account, value));
    }

    fn statements(&self) -> FinancialStatements {
        FinancialStatements::new()
            .with_table(StatementType::IncomeStatement, StatementTable::from_rows(self.income.clone()))
            .with_table(StatementType::AssetBalance, StatementTable::from_rows(self.assets.clone()))
            .with_table(
                StatementType::LiabilityEquityBalance,
                StatementTable::from_rows(self.liabilities.clone()),
            )
    }
}

fn company() -> Company {
    Company {
        cvm_code: CODE,
        ticker: "VALE3".to_string(),
        name: "VALE".to_string(),
    }
}

fn quote() -> MarketSnapshot {
    MarketSnapshot {
        short_name: Some("VALE ON NM".to_string()),
        price: Some(10.0),
        shares_outstanding: Some(500.0),
        market_cap: Some(5_000.0),
    }
}

fn assumptions(growth: f64) -> MarketAssumptions {
    MarketAssumptions {
        risk_free_rate: 0.10,
        market_risk_premium: 0.08,
        perpetual_growth: growth,
        inflation_display: "N/A".to_string(),
        exchange_rate_display: "N/A".to_string(),
        benchmark_history: Vec::new(),
    }
}

fn run(inputs: &Inputs, growth: f64) -> Result<eva_valuation::models::ValuationResult, SkipReason> {
    let statements = inputs.statements();
    valuation::try_valuate(&company(), &statements.company(CODE), &quote(), &[], &assumptions(growth))
}

#[test]
fn test_non_positive_capital_employed_never_values() {
    init_test_logging();
    log_test_step("Sweeping capital employed through zero");

    // working capital need is 1_000; non-current assets move capital employed to <= 0
    for non_current in [-1_000.0, -1_001.0, -5_000.0, -1.0e9] {
        let mut inputs = Inputs::healthy();
        Inputs::set(&mut inputs.assets, accounts::NON_CURRENT_ASSETS, non_current);

        let outcome = run(&inputs, 0.03);
        log_test_data("outcome", &outcome);
        assert_matches!(outcome, Err(SkipReason::NonPositiveCapitalEmployed(ce)) if ce <= 0.0);

        let statements = inputs.statements();
        assert!(valuation::valuate(&company(), &statements.company(CODE), &quote(), &[], &assumptions(0.03)).is_none());
    }
}

#[test]
fn test_wacc_not_above_growth_never_values() {
    let inputs = Inputs::healthy();
    let wacc = run(&inputs, 0.03).unwrap().wacc;

    for growth in [wacc, wacc + 1e-9, 0.25, 0.9] {
        assert_matches!(run(&inputs, growth), Err(SkipReason::WaccNotAboveGrowth { .. }));
    }
    assert!(run(&inputs, wacc - 1e-6).is_ok());
}

#[test]
fn test_tax_rate_is_always_clamped() {
    let pre_tax_values = [1e-9, 0.5, -0.5, 900.0, -1.0e6, 1.0e6];
    let tax_values = [-1.0e6, -270.0, 0.0, 3.0, 1.0e6];

    for pre_tax in pre_tax_values {
        for tax in tax_values {
            let income = vec![row(accounts::PRE_TAX_INCOME, pre_tax), row(accounts::INCOME_TAX, tax)];
            let (rate, defaulted) = effective_tax_rate(&income);
            assert!((0.0..=MAX_TAX_RATE).contains(&rate), "rate {} for {}/{}", rate, tax, pre_tax);
            assert!(!defaulted);
        }
    }
}

#[test]
fn test_zero_latest_ebit_never_values() {
    let mut inputs = Inputs::healthy();
    Inputs::set(&mut inputs.income, accounts::EBIT, 0.0);
    assert_matches!(run(&inputs, 0.03), Err(SkipReason::ZeroEbit));
}

#[test]
fn test_no_debt_and_no_financial_expense_uses_fraction_of_cost_of_equity() {
    let mut inputs = Inputs::healthy();
    Inputs::set(&mut inputs.liabilities, accounts::SHORT_TERM_DEBT, 0.0);
    Inputs::set(&mut inputs.liabilities, accounts::LONG_TERM_DEBT, 0.0);
    Inputs::set(&mut inputs.income, accounts::FINANCIAL_EXPENSES, 0.0);

    let result = run(&inputs, 0.03).unwrap();
    let diagnostics = &result.diagnostics;
    assert!(diagnostics.cost_of_debt_defaulted);
    assert_eq!(diagnostics.cost_of_debt, 0.7 * diagnostics.cost_of_equity);
}

fn prices(len: usize) -> Vec<PricePoint> {
    let start = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
    (0..len)
        .map(|i| PricePoint {
            date: start + Duration::days(i as i64),
            adj_close: Some(100.0 + (i % 5) as f64 + i as f64 * 0.1),
        })
        .collect()
}

#[test]
fn test_beta_is_exactly_neutral_without_enough_data() {
    let long = prices(300);

    assert_eq!(estimate_beta(&long, &[]), 1.0);
    assert_eq!(estimate_beta(&prices(59), &long), 1.0);

    // 300 company prices, but only 45 overlapping benchmark days
    let short_benchmark: Vec<PricePoint> = long.iter().copied().take(45).collect();
    assert_eq!(estimate_beta(&long, &short_benchmark), 1.0);

    // identical series regress to a slope of one
    let beta = estimate_beta(&long, &long);
    assert!((beta - 1.0).abs() < 1e-9);
}
