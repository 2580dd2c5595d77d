use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Listed company as known to the regulator and the exchange
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Company {
    pub cvm_code: i64,
    pub ticker: String,
    pub name: String,
}

/// Standardized statement families published in the yearly archives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatementType {
    /// DRE
    IncomeStatement,
    /// BPA
    AssetBalance,
    /// BPP
    LiabilityEquityBalance,
    /// DFC_MI
    CashFlow,
}

impl StatementType {
    pub fn all() -> [StatementType; 4] {
        [
            StatementType::IncomeStatement,
            StatementType::AssetBalance,
            StatementType::LiabilityEquityBalance,
            StatementType::CashFlow,
        ]
    }

    /// Code used by the regulator in archive member names
    pub fn code(&self) -> &'static str {
        match self {
            StatementType::IncomeStatement => "DRE",
            StatementType::AssetBalance => "BPA",
            StatementType::LiabilityEquityBalance => "BPP",
            StatementType::CashFlow => "DFC_MI",
        }
    }

    /// Tables the valuation cannot run without
    pub fn is_required(&self) -> bool {
        !matches!(self, StatementType::CashFlow)
    }

    /// File name of the reconciled output table
    pub fn output_file_name(&self) -> String {
        format!("{}_consolidated.csv", self.code().to_lowercase())
    }
}

impl std::fmt::Display for StatementType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

impl std::str::FromStr for StatementType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "DRE" => Ok(StatementType::IncomeStatement),
            "BPA" => Ok(StatementType::AssetBalance),
            "BPP" => Ok(StatementType::LiabilityEquityBalance),
            "DFC_MI" => Ok(StatementType::CashFlow),
            other => Err(anyhow::anyhow!("Unknown statement type: {}", other)),
        }
    }
}

/// Which estimate of a reference date a row carries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EstimateOrder {
    Latest,
    Prior(String),
}

impl EstimateOrder {
    pub const LATEST_TAG: &'static str = "ÚLTIMO";

    pub fn parse(tag: &str) -> Self {
        let tag = tag.trim();
        if tag == Self::LATEST_TAG {
            EstimateOrder::Latest
        } else {
            EstimateOrder::Prior(tag.to_string())
        }
    }

    pub fn is_latest(&self) -> bool {
        matches!(self, EstimateOrder::Latest)
    }
}

/// One reported account value, already scaled to full currency units
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatementRow {
    pub cvm_code: i64,
    pub reference_date: NaiveDate,
    pub account_code: String,
    pub value: f64,
    pub estimate_order: EstimateOrder,
}

/// Daily adjusted close; `None` marks a gap in the source series
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub adj_close: Option<f64>,
}

/// Live quote fields for one company
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub short_name: Option<String>,
    pub price: Option<f64>,
    pub shares_outstanding: Option<f64>,
    pub market_cap: Option<f64>,
}

/// Latest observation of a central bank time series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EconomicObservation {
    pub date: NaiveDate,
    pub value: f64,
}

/// Central bank SGS series read by the analysis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EconomicSeries {
    /// Selic, percent per year
    Selic,
    /// IPCA, monthly percent change
    Ipca,
    /// USD/BRL commercial rate
    UsdBrl,
}

impl EconomicSeries {
    pub fn code(&self) -> u32 {
        match self {
            EconomicSeries::Selic => 432,
            EconomicSeries::Ipca => 433,
            EconomicSeries::UsdBrl => 1,
        }
    }
}

impl std::fmt::Display for EconomicSeries {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            EconomicSeries::Selic => "Selic",
            EconomicSeries::Ipca => "IPCA",
            EconomicSeries::UsdBrl => "USD/BRL",
        };
        write!(f, "{} (SGS {})", name, self.code())
    }
}

/// Macro inputs shared by every company in one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketAssumptions {
    pub risk_free_rate: f64,
    pub market_risk_premium: f64,
    pub perpetual_growth: f64,
    /// Display only, e.g. "0.48% (ref. 08/2025)"
    pub inflation_display: String,
    /// Display only, e.g. "R$ 5.43"
    pub exchange_rate_display: String,
    pub benchmark_history: Vec<PricePoint>,
}

/// Which inputs of a valuation fell back to a default
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValuationDiagnostics {
    pub beta: f64,
    pub beta_defaulted: bool,
    pub effective_tax_rate: f64,
    pub tax_rate_defaulted: bool,
    pub cost_of_equity: f64,
    pub cost_of_debt: f64,
    pub cost_of_debt_defaulted: bool,
}

/// Outcome of valuing one company
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValuationResult {
    pub name: String,
    pub ticker: String,
    pub upside: f64,
    pub roic: f64,
    pub wacc: f64,
    pub spread: f64,
    pub eva_percent: f64,
    pub efv_percent: f64,
    pub current_price: f64,
    pub fair_price: f64,
    pub market_cap: f64,
    pub eva: f64,
    pub capital_employed: f64,
    pub nopat: f64,
    pub diagnostics: ValuationDiagnostics,
}

/// One labelled line of the market assumptions panel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketInfoEntry {
    pub label: String,
    pub value: String,
}

/// Configuration for the application
#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    pub ticker_map_path: PathBuf,
    pub archive_dir: PathBuf,
    pub history_years: i32,
    pub benchmark_symbol: String,
    pub price_history_range: String,
    pub ticker_suffix: String,
    pub http_timeout: Duration,
    pub rates_timeout: Duration,
    pub default_risk_free_rate: f64,
    pub market_risk_premium: f64,
    pub perpetual_growth: f64,
    pub rate_limit_per_minute: u32,
    pub max_concurrency: usize,
    pub assumptions_max_age: Duration,
    pub yahoo_base_url: String,
    /// Page that hands out the Yahoo session cookie
    pub yahoo_cookie_url: String,
    pub bcb_base_url: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("consolidated_data"),
            ticker_map_path: PathBuf::from("ticker_mapping.csv"),
            archive_dir: PathBuf::from("cvm_data"),
            history_years: 2,
            benchmark_symbol: "^BVSP".to_string(),
            price_history_range: "5y".to_string(),
            ticker_suffix: ".SA".to_string(),
            http_timeout: Duration::from_secs(15),
            rates_timeout: Duration::from_secs(10),
            default_risk_free_rate: 0.105,
            market_risk_premium: 0.08,
            perpetual_growth: 0.03,
            rate_limit_per_minute: 120,
            max_concurrency: 1,
            assumptions_max_age: Duration::from_secs(3600),
            yahoo_base_url: "https://query1.finance.yahoo.com".to_string(),
            yahoo_cookie_url: "https://fc.yahoo.com".to_string(),
            bcb_base_url: "https://api.bcb.gov.br".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok(); // Load .env file if it exists

        let defaults = Config::default();

        Ok(Config {
            data_dir: env_path("DATA_DIR", defaults.data_dir),
            ticker_map_path: env_path("TICKER_MAP_PATH", defaults.ticker_map_path),
            archive_dir: env_path("ARCHIVE_DIR", defaults.archive_dir),
            history_years: env_parse("HISTORY_YEARS", defaults.history_years),
            benchmark_symbol: std::env::var("BENCHMARK_SYMBOL")
                .unwrap_or(defaults.benchmark_symbol),
            price_history_range: std::env::var("PRICE_HISTORY_RANGE")
                .unwrap_or(defaults.price_history_range),
            ticker_suffix: std::env::var("TICKER_SUFFIX").unwrap_or(defaults.ticker_suffix),
            http_timeout: Duration::from_secs(env_parse("HTTP_TIMEOUT_SECS", 15)),
            rates_timeout: Duration::from_secs(env_parse("RATES_TIMEOUT_SECS", 10)),
            default_risk_free_rate: env_parse("RISK_FREE_RATE", defaults.default_risk_free_rate),
            market_risk_premium: env_parse("MARKET_RISK_PREMIUM", defaults.market_risk_premium),
            perpetual_growth: env_parse("PERPETUAL_GROWTH", defaults.perpetual_growth),
            rate_limit_per_minute: env_parse("RATE_LIMIT_PER_MINUTE", defaults.rate_limit_per_minute),
            max_concurrency: env_parse("MAX_CONCURRENCY", defaults.max_concurrency).max(1),
            assumptions_max_age: Duration::from_secs(env_parse("ASSUMPTIONS_MAX_AGE_SECS", 3600)),
            yahoo_base_url: std::env::var("YAHOO_BASE_URL").unwrap_or(defaults.yahoo_base_url),
            yahoo_cookie_url: std::env::var("YAHOO_COOKIE_URL").unwrap_or(defaults.yahoo_cookie_url),
            bcb_base_url: std::env::var("BCB_BASE_URL").unwrap_or(defaults.bcb_base_url),
        })
    }

    /// Exchange symbol used by the quote provider, e.g. "PETR4" -> "PETR4.SA"
    pub fn market_symbol(&self, ticker: &str) -> String {
        format!("{}{}", ticker.trim().to_uppercase(), self.ticker_suffix)
    }
}

fn env_path(key: &str, default: PathBuf) -> PathBuf {
    std::env::var(key).map(PathBuf::from).unwrap_or(default)
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or(default)
}
