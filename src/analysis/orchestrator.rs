//! One analysis pass over the company universe.

use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::fmt;
use tracing::{debug, info, warn};

use super::beta;
use super::valuation::{self, SkipReason};
use crate::api::MarketDataProvider;
use crate::models::{Company, Config, MarketAssumptions, ValuationResult};
use crate::statements::FinancialStatements;

/// Banks and the exchange operator; their balance sheets do not fit the capital employed model
pub const EXCLUDED_TICKERS: [&str; 5] = ["ITUB4", "BBDC4", "BBAS3", "SANB11", "B3SA3"];

/// Open bounds a result must fall within to be reported
pub const WACC_BOUNDS: (f64, f64) = (0.01, 0.40);
pub const UPSIDE_BOUNDS: (f64, f64) = (-0.99, 10.0);

fn ticker_key(ticker: &str) -> String {
    ticker.trim().to_uppercase()
}

pub fn is_excluded(ticker: &str) -> bool {
    let key = ticker_key(ticker);
    EXCLUDED_TICKERS.contains(&key.as_str())
}

/// First occurrence of each ticker, in input order, minus the exclusion list
pub fn dedupe_universe(companies: &[Company]) -> Vec<Company> {
    let mut seen = HashSet::new();
    companies
        .iter()
        .filter(|company| seen.insert(ticker_key(&company.ticker)))
        .filter(|company| !is_excluded(&company.ticker))
        .cloned()
        .collect()
}

pub fn passes_sanity_filter(result: &ValuationResult) -> bool {
    let within = |value: f64, (low, high): (f64, f64)| value > low && value < high;
    within(result.wacc, WACC_BOUNDS) && within(result.upside, UPSIDE_BOUNDS)
}

/// Why an entity produced no result
#[derive(Debug)]
enum EntitySkip {
    Guard(SkipReason),
    QuoteUnavailable(anyhow::Error),
}

impl fmt::Display for EntitySkip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntitySkip::Guard(reason) => write!(f, "{}", reason),
            EntitySkip::QuoteUnavailable(e) => write!(f, "quote unavailable: {:#}", e),
        }
    }
}

impl From<SkipReason> for EntitySkip {
    fn from(reason: SkipReason) -> Self {
        EntitySkip::Guard(reason)
    }
}

/// Counts and results of one pass
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub results: Vec<ValuationResult>,
    /// Companies left after deduplication and exclusion
    pub universe_size: usize,
    /// Companies that produced a structurally valid result
    pub computed: usize,
    /// Tickers dropped by the sanity filter
    pub rejected: Vec<String>,
}

impl RunReport {
    pub fn skipped(&self) -> usize {
        self.universe_size - self.computed
    }
}

pub struct RunOrchestrator<'a> {
    market: &'a dyn MarketDataProvider,
    config: &'a Config,
}

impl<'a> RunOrchestrator<'a> {
    pub fn new(market: &'a dyn MarketDataProvider, config: &'a Config) -> Self {
        Self { market, config }
    }

    /// Value every company of the universe; output follows the deduplicated universe order
    pub async fn run_all(
        &self,
        universe: &[Company],
        statements: &FinancialStatements,
        assumptions: &MarketAssumptions,
    ) -> RunReport {
        let companies = dedupe_universe(universe);
        info!(
            "🚀 Analysis started for {} companies ({} listed)",
            companies.len(),
            universe.len()
        );

        let outcomes: Vec<(&Company, Result<ValuationResult, EntitySkip>)> = stream::iter(&companies)
            .map(|company| async move {
                (company, self.evaluate(company, statements, assumptions).await)
            })
            .buffered(self.config.max_concurrency.max(1))
            .collect()
            .await;

        let mut report = RunReport {
            universe_size: companies.len(),
            ..RunReport::default()
        };

        for (company, outcome) in outcomes {
            match outcome {
                Ok(result) => {
                    report.computed += 1;
                    if passes_sanity_filter(&result) {
                        report.results.push(result);
                    } else {
                        warn!(
                            "⚠️  Filtering {} for extreme results: WACC={:.2}%, Upside={:.2}%",
                            result.ticker,
                            result.wacc * 100.0,
                            result.upside * 100.0
                        );
                        report.rejected.push(result.ticker);
                    }
                }
                Err(skip) => debug!("⏭️  Skipping {} ({}): {}", company.ticker, company.cvm_code, skip),
            }
        }

        info!(
            "✅ Analysis finished: {} of {} companies passed the filter",
            report.results.len(),
            report.computed
        );
        report
    }

    async fn evaluate(
        &self,
        company: &Company,
        statements: &FinancialStatements,
        assumptions: &MarketAssumptions,
    ) -> Result<ValuationResult, EntitySkip> {
        let company_statements = statements.company(company.cvm_code);
        if !company_statements.is_complete() {
            return Err(SkipReason::IncompleteStatements.into());
        }

        let symbol = self.config.market_symbol(&company.ticker);
        let snapshot = self
            .market
            .get_quote(&symbol)
            .await
            .map_err(EntitySkip::QuoteUnavailable)?;

        let profile = valuation::prepare(&company_statements, &snapshot)?;

        let history = match self
            .market
            .get_price_history(&symbol, &self.config.price_history_range)
            .await
        {
            Ok(history) => history,
            Err(e) => {
                warn!("⚠️  No price history for {}, using neutral beta: {:#}", symbol, e);
                Vec::new()
            }
        };
        let beta = beta::estimate(&history, &assumptions.benchmark_history);

        Ok(valuation::complete(company, &profile, beta, assumptions)?)
    }
}
