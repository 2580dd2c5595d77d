//! Regression beta of a company against the benchmark index, shrunk toward 1.0.

use chrono::NaiveDate;
use std::collections::BTreeMap;

use crate::models::PricePoint;

/// Returned whenever the regression cannot be trusted or computed
pub const NEUTRAL_BETA: f64 = 1.0;
/// Company histories shorter than this are not regressed
pub const MIN_PRICE_OBSERVATIONS: usize = 60;
/// Aligned return pairs required for a regression
pub const MIN_RETURN_OBSERVATIONS: usize = 50;
/// Weight of the raw slope; the remainder goes to `NEUTRAL_BETA`
pub const SLOPE_WEIGHT: f64 = 0.67;
const PRIOR_WEIGHT: f64 = 0.33;

/// Beta plus how it was obtained
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BetaEstimate {
    pub beta: f64,
    pub raw_slope: Option<f64>,
    pub return_observations: usize,
}

impl BetaEstimate {
    fn neutral(return_observations: usize) -> Self {
        Self {
            beta: NEUTRAL_BETA,
            raw_slope: None,
            return_observations,
        }
    }

    /// The neutral default was used instead of a regression
    pub fn is_default(&self) -> bool {
        self.raw_slope.is_none()
    }
}

fn valid_prices(history: &[PricePoint]) -> BTreeMap<NaiveDate, f64> {
    history
        .iter()
        .filter_map(|point| point.adj_close.map(|price| (point.date, price)))
        .filter(|(_, price)| price.is_finite())
        .collect()
}

/// Inner join on dates with missing values dropped, as `(benchmark, company)` price pairs
fn align(company: &[PricePoint], benchmark: &[PricePoint]) -> Vec<(f64, f64)> {
    let benchmark = valid_prices(benchmark);
    valid_prices(company)
        .into_iter()
        .filter_map(|(date, price)| benchmark.get(&date).map(|index| (*index, price)))
        .collect()
}

/// Simple period returns of consecutive aligned rows
fn period_returns(aligned: &[(f64, f64)]) -> Vec<(f64, f64)> {
    aligned
        .windows(2)
        .map(|pair| {
            let (prev_x, prev_y) = pair[0];
            let (x, y) = pair[1];
            (x / prev_x - 1.0, y / prev_y - 1.0)
        })
        .collect()
}

/// Ordinary least squares slope of y on x; `None` when degenerate
pub fn ols_slope(pairs: &[(f64, f64)]) -> Option<f64> {
    if pairs.len() < 2 {
        return None;
    }

    let n = pairs.len() as f64;
    let mean_x = pairs.iter().map(|(x, _)| x).sum::<f64>() / n;
    let mean_y = pairs.iter().map(|(_, y)| y).sum::<f64>() / n;

    let (cov, var_x) = pairs.iter().fold((0.0, 0.0), |(cov, var), (x, y)| {
        let dx = x - mean_x;
        (cov + dx * (y - mean_y), var + dx * dx)
    });

    if var_x == 0.0 {
        return None;
    }

    Some(cov / var_x).filter(|slope| slope.is_finite())
}

/// Full estimate with the reason for any fallback encoded in `raw_slope`
pub fn estimate(company: &[PricePoint], benchmark: &[PricePoint]) -> BetaEstimate {
    if benchmark.is_empty() || company.len() < MIN_PRICE_OBSERVATIONS {
        return BetaEstimate::neutral(0);
    }

    let returns = period_returns(&align(company, benchmark));
    if returns.len() < MIN_RETURN_OBSERVATIONS {
        return BetaEstimate::neutral(returns.len());
    }

    match ols_slope(&returns) {
        Some(slope) => {
            let beta = SLOPE_WEIGHT * slope + PRIOR_WEIGHT * NEUTRAL_BETA;
            if beta.is_finite() {
                BetaEstimate {
                    beta,
                    raw_slope: Some(slope),
                    return_observations: returns.len(),
                }
            } else {
                BetaEstimate::neutral(returns.len())
            }
        }
        None => BetaEstimate::neutral(returns.len()),
    }
}

/// Shrunk beta, or exactly 1.0 when the inputs do not support a regression
pub fn estimate_beta(company: &[PricePoint], benchmark: &[PricePoint]) -> f64 {
    estimate(company, benchmark).beta
}
