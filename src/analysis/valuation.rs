//! EVA-perpetuity valuation of a single company.
//!
//! The computation is split in two: [`prepare`] works from statements and the live
//! quote alone, [`complete`] adds beta and the macro assumptions. The orchestrator
//! only fetches price history for companies that survive the first half.

use std::fmt;

use super::beta::{self, BetaEstimate};
use super::metrics::{accounts, latest_estimate_series, latest_value, series_sum};
use crate::models::{
    Company, MarketAssumptions, MarketSnapshot, PricePoint, ValuationDiagnostics, ValuationResult,
};
use crate::statements::CompanyStatements;

/// Used when cumulative pre-tax income is exactly zero
pub const DEFAULT_TAX_RATE: f64 = 0.34;
pub const MAX_TAX_RATE: f64 = 0.45;
/// Cap on the implied cost of debt (financial expense / debt)
pub const MAX_COST_OF_DEBT: f64 = 0.35;
/// Cost of debt as a fraction of cost of equity when debt or financial expense is missing
pub const COST_OF_DEBT_TO_EQUITY_RATIO: f64 = 0.7;
pub const NAME_MAX_CHARS: usize = 30;

/// Why a company produced no valuation
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    IncompleteStatements,
    InvalidMarketSnapshot,
    ZeroEbit,
    NonPositiveCapitalEmployed(f64),
    NonPositiveEnterpriseValue(f64),
    WaccNotAboveGrowth { wacc: f64, growth: f64 },
    NonFinite(&'static str),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::IncompleteStatements => write!(f, "missing income, asset or liability statements"),
            SkipReason::InvalidMarketSnapshot => write!(f, "market cap, price or share count missing or non-positive"),
            SkipReason::ZeroEbit => write!(f, "latest EBIT is missing or zero"),
            SkipReason::NonPositiveCapitalEmployed(value) => {
                write!(f, "capital employed is not positive ({:.0})", value)
            }
            SkipReason::NonPositiveEnterpriseValue(value) => {
                write!(f, "enterprise value is not positive ({:.0})", value)
            }
            SkipReason::WaccNotAboveGrowth { wacc, growth } => {
                write!(f, "WACC {:.4} does not exceed perpetual growth {:.4}", wacc, growth)
            }
            SkipReason::NonFinite(field) => write!(f, "{} is not a finite number", field),
        }
    }
}

/// Statement- and quote-derived figures, before cost of capital
#[derive(Debug, Clone, PartialEq)]
pub struct OperatingProfile {
    pub short_name: Option<String>,
    pub price: f64,
    pub shares_outstanding: f64,
    pub market_cap: f64,
    pub ebit: f64,
    pub effective_tax_rate: f64,
    pub tax_rate_defaulted: bool,
    pub nopat: f64,
    pub capital_employed: f64,
    pub roic: f64,
    pub total_debt: f64,
    pub financial_expense: f64,
    pub cash: f64,
}

/// `|Σ tax| / Σ pre-tax income` over every period, clamped to `[0, MAX_TAX_RATE]`
pub fn effective_tax_rate(income: &[crate::models::StatementRow]) -> (f64, bool) {
    let tax = series_sum(income, accounts::INCOME_TAX);
    let pre_tax = series_sum(income, accounts::PRE_TAX_INCOME);

    let (rate, defaulted) = if pre_tax != 0.0 {
        (tax.abs() / pre_tax, false)
    } else {
        (DEFAULT_TAX_RATE, true)
    };

    (rate.clamp(0.0, MAX_TAX_RATE), defaulted)
}

/// Cost of debt and whether it fell back to a fraction of the cost of equity
pub fn cost_of_debt(total_debt: f64, financial_expense: f64, cost_of_equity: f64) -> (f64, bool) {
    if total_debt > 0.0 && financial_expense > 0.0 {
        ((financial_expense / total_debt).min(MAX_COST_OF_DEBT), false)
    } else {
        (COST_OF_DEBT_TO_EQUITY_RATIO * cost_of_equity, true)
    }
}

fn positive(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite() && *v > 0.0)
}

fn finite(value: f64, field: &'static str) -> Result<f64, SkipReason> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(SkipReason::NonFinite(field))
    }
}

/// Steps that need only the statements and the live quote
pub fn prepare(
    statements: &CompanyStatements<'_>,
    snapshot: &MarketSnapshot,
) -> Result<OperatingProfile, SkipReason> {
    if !statements.is_complete() {
        return Err(SkipReason::IncompleteStatements);
    }

    let (Some(market_cap), Some(price), Some(shares_outstanding)) = (
        positive(snapshot.market_cap),
        positive(snapshot.price),
        positive(snapshot.shares_outstanding),
    ) else {
        return Err(SkipReason::InvalidMarketSnapshot);
    };

    let ebit = match latest_estimate_series(statements.income, accounts::EBIT).last() {
        Some((_, value)) if *value != 0.0 => *value,
        _ => return Err(SkipReason::ZeroEbit),
    };

    let (effective_tax_rate, tax_rate_defaulted) = effective_tax_rate(statements.income);
    let nopat = finite(ebit * (1.0 - effective_tax_rate), "NOPAT")?;

    let working_capital_need = latest_value(statements.assets, accounts::RECEIVABLES)
        + latest_value(statements.assets, accounts::INVENTORIES)
        - latest_value(statements.liabilities, accounts::SUPPLIERS);
    let capital_employed = finite(
        working_capital_need + latest_value(statements.assets, accounts::NON_CURRENT_ASSETS),
        "capital employed",
    )?;
    if capital_employed <= 0.0 {
        return Err(SkipReason::NonPositiveCapitalEmployed(capital_employed));
    }

    let roic = finite(nopat / capital_employed, "ROIC")?;

    Ok(OperatingProfile {
        short_name: snapshot.short_name.clone(),
        price,
        shares_outstanding,
        market_cap,
        ebit,
        effective_tax_rate,
        tax_rate_defaulted,
        nopat,
        capital_employed,
        roic,
        total_debt: latest_value(statements.liabilities, accounts::SHORT_TERM_DEBT)
            + latest_value(statements.liabilities, accounts::LONG_TERM_DEBT),
        financial_expense: latest_value(statements.income, accounts::FINANCIAL_EXPENSES).abs(),
        cash: latest_value(statements.assets, accounts::CASH_AND_EQUIVALENTS),
    })
}

/// Cost of capital, EVA and the perpetuity value
pub fn complete(
    company: &Company,
    profile: &OperatingProfile,
    beta: BetaEstimate,
    assumptions: &MarketAssumptions,
) -> Result<ValuationResult, SkipReason> {
    let growth = assumptions.perpetual_growth;
    let tax_rate = profile.effective_tax_rate;

    let cost_of_equity = assumptions.risk_free_rate + beta.beta * assumptions.market_risk_premium;
    let (cost_of_debt, cost_of_debt_defaulted) =
        cost_of_debt(profile.total_debt, profile.financial_expense, cost_of_equity);

    let enterprise_value = profile.market_cap + profile.total_debt;
    if enterprise_value <= 0.0 {
        return Err(SkipReason::NonPositiveEnterpriseValue(enterprise_value));
    }
    let equity_weight = profile.market_cap / enterprise_value;
    let debt_weight = 1.0 - equity_weight;

    let wacc = finite(
        equity_weight * cost_of_equity + debt_weight * cost_of_debt * (1.0 - tax_rate),
        "WACC",
    )?;
    if wacc <= growth {
        return Err(SkipReason::WaccNotAboveGrowth { wacc, growth });
    }

    let spread = profile.roic - wacc;
    let eva = finite(spread * profile.capital_employed, "EVA")?;
    let firm_value = finite(
        profile.capital_employed + eva * (1.0 + growth) / (wacc - growth),
        "firm value",
    )?;

    let net_debt = profile.total_debt - profile.cash;
    let equity_value = firm_value - net_debt;
    let fair_price = finite(equity_value / profile.shares_outstanding, "fair price")?;
    let upside = if profile.price > 0.0 {
        finite(fair_price / profile.price - 1.0, "upside")?
    } else {
        0.0
    };

    let current_wealth = if wacc > 0.0 { eva / wacc } else { 0.0 };
    let expected_future_wealth = profile.market_cap - profile.capital_employed;
    let efv = expected_future_wealth - current_wealth;
    let efv_percent = if profile.market_cap > 0.0 {
        finite(efv / profile.market_cap, "EFV%")?
    } else {
        0.0
    };

    let ticker = company.ticker.trim().to_uppercase();
    let name: String = profile
        .short_name
        .as_deref()
        .filter(|name| !name.trim().is_empty())
        .unwrap_or(&ticker)
        .chars()
        .take(NAME_MAX_CHARS)
        .collect();

    Ok(ValuationResult {
        name,
        ticker,
        upside,
        roic: profile.roic,
        wacc,
        spread,
        eva_percent: spread,
        efv_percent,
        current_price: profile.price,
        fair_price,
        market_cap: profile.market_cap,
        eva,
        capital_employed: profile.capital_employed,
        nopat: profile.nopat,
        diagnostics: ValuationDiagnostics {
            beta: beta.beta,
            beta_defaulted: beta.is_default(),
            effective_tax_rate: tax_rate,
            tax_rate_defaulted: profile.tax_rate_defaulted,
            cost_of_equity,
            cost_of_debt,
            cost_of_debt_defaulted,
        },
    })
}

/// Value one company end to end
pub fn try_valuate(
    company: &Company,
    statements: &CompanyStatements<'_>,
    snapshot: &MarketSnapshot,
    price_history: &[PricePoint],
    assumptions: &MarketAssumptions,
) -> Result<ValuationResult, SkipReason> {
    let profile = prepare(statements, snapshot)?;
    let beta = beta::estimate(price_history, &assumptions.benchmark_history);
    complete(company, &profile, beta, assumptions)
}

/// `None` for every guarded condition; no partial results
pub fn valuate(
    company: &Company,
    statements: &CompanyStatements<'_>,
    snapshot: &MarketSnapshot,
    price_history: &[PricePoint],
    assumptions: &MarketAssumptions,
) -> Option<ValuationResult> {
    try_valuate(company, statements, snapshot, price_history, assumptions).ok()
}
