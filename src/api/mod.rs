use anyhow::Result;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use std::num::NonZeroU32;

use crate::models::{EconomicObservation, EconomicSeries, MarketSnapshot, PricePoint};

pub mod bcb_client;
pub mod yahoo_client;
pub use bcb_client::BcbClient;
pub use yahoo_client::YahooClient;

/// Paces outgoing requests to a per-minute quota
pub struct ApiRateLimiter {
    limiter: DefaultDirectRateLimiter,
}

impl ApiRateLimiter {
    pub fn new(requests_per_minute: u32) -> Self {
        let quota = NonZeroU32::new(requests_per_minute).unwrap_or(NonZeroU32::MIN);
        Self {
            limiter: RateLimiter::direct(Quota::per_minute(quota)),
        }
    }

    pub async fn wait(&self) {
        self.limiter.until_ready().await;
    }
}

/// Live quotes and daily price history for exchange symbols
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait MarketDataProvider: Send + Sync {
    async fn get_quote(&self, symbol: &str) -> Result<MarketSnapshot>;
    /// Daily adjusted closes over a provider range such as "5y", ascending by date
    async fn get_price_history(&self, symbol: &str, range: &str) -> Result<Vec<PricePoint>>;
}

/// Macroeconomic time series
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait EconomicDataProvider: Send + Sync {
    async fn latest_observation(&self, series: EconomicSeries) -> Result<EconomicObservation>;
}
