//! Macro inputs for one analysis run, with per-source fallbacks.

use tracing::{error, info, warn};

use crate::api::{EconomicDataProvider, MarketDataProvider};
use crate::models::{Config, EconomicSeries, MarketAssumptions, MarketInfoEntry};

pub const NOT_AVAILABLE: &str = "N/A";

/// Assumptions built from configuration only, as used when every fetch fails
pub fn default_assumptions(config: &Config) -> MarketAssumptions {
    MarketAssumptions {
        risk_free_rate: config.default_risk_free_rate,
        market_risk_premium: config.market_risk_premium,
        perpetual_growth: config.perpetual_growth,
        inflation_display: NOT_AVAILABLE.to_string(),
        exchange_rate_display: NOT_AVAILABLE.to_string(),
        benchmark_history: Vec::new(),
    }
}

/// Fetch rates and the benchmark series; no failure is propagated
pub async fn fetch_market_assumptions(
    economic: &dyn EconomicDataProvider,
    market: &dyn MarketDataProvider,
    config: &Config,
) -> MarketAssumptions {
    let mut assumptions = default_assumptions(config);

    match economic.latest_observation(EconomicSeries::Selic).await {
        Ok(selic) => assumptions.risk_free_rate = selic.value / 100.0,
        Err(e) => warn!(
            "⚠️  Could not fetch {}, keeping default risk-free rate {:.2}%: {:#}",
            EconomicSeries::Selic,
            config.default_risk_free_rate * 100.0,
            e
        ),
    }

    match economic.latest_observation(EconomicSeries::Ipca).await {
        Ok(ipca) => {
            assumptions.inflation_display =
                format!("{}% (ref. {})", ipca.value, ipca.date.format("%m/%Y"))
        }
        Err(e) => warn!("⚠️  Could not fetch {}: {:#}", EconomicSeries::Ipca, e),
    }

    match economic.latest_observation(EconomicSeries::UsdBrl).await {
        Ok(usd) => assumptions.exchange_rate_display = format!("R$ {}", usd.value),
        Err(e) => warn!("⚠️  Could not fetch {}: {:#}", EconomicSeries::UsdBrl, e),
    }

    match market
        .get_price_history(&config.benchmark_symbol, &config.price_history_range)
        .await
    {
        Ok(history) if !history.is_empty() => assumptions.benchmark_history = history,
        Ok(_) => error!(
            "❌ Benchmark {} returned no prices, beta will default to 1.0",
            config.benchmark_symbol
        ),
        Err(e) => error!(
            "❌ Benchmark {} download failed, beta will default to 1.0: {:#}",
            config.benchmark_symbol, e
        ),
    }

    info!(
        "📈 Market assumptions: rf={:.2}%, MRP={:.2}%, g={:.2}%, {} benchmark prices",
        assumptions.risk_free_rate * 100.0,
        assumptions.market_risk_premium * 100.0,
        assumptions.perpetual_growth * 100.0,
        assumptions.benchmark_history.len()
    );
    assumptions
}

fn percent(value: f64) -> String {
    format!("{:.2}%", value * 100.0)
}

/// Ordered display lines for the market assumptions panel
pub fn display_entries(assumptions: &MarketAssumptions) -> Vec<MarketInfoEntry> {
    let entry = |label: &str, value: String| MarketInfoEntry {
        label: label.to_string(),
        value,
    };

    vec![
        entry("Risk-free rate (Selic)", percent(assumptions.risk_free_rate)),
        entry("Inflation (IPCA)", assumptions.inflation_display.clone()),
        entry("Exchange rate (USD/BRL)", assumptions.exchange_rate_display.clone()),
        entry("Market risk premium", percent(assumptions.market_risk_premium)),
        entry("Perpetual growth (g)", percent(assumptions.perpetual_growth)),
    ]
}
