pub mod assumptions;
pub mod beta;
pub mod metrics;
pub mod orchestrator;
pub mod valuation;

pub use assumptions::{default_assumptions, display_entries, fetch_market_assumptions};
pub use beta::{estimate_beta, BetaEstimate};
pub use metrics::{latest_estimate_series, latest_value};
pub use orchestrator::{RunOrchestrator, RunReport, EXCLUDED_TICKERS};
pub use valuation::{try_valuate, valuate, SkipReason};
