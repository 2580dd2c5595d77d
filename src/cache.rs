//! Per-process cache of loaded inputs, owned by the service context.

use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::Mutex as AsyncMutex;
use tracing::info;

use crate::analysis::fetch_market_assumptions;
use crate::api::{EconomicDataProvider, MarketDataProvider};
use crate::error::DataResult;
use crate::models::{Company, Config, MarketAssumptions};
use crate::statements::{load_financial_statements, load_ticker_map, FinancialStatements};

struct CachedAssumptions {
    fetched_at: Instant,
    value: Arc<MarketAssumptions>,
}

/// Statement tables, ticker map and market assumptions, loaded at most once until invalidated
pub struct DataCache {
    config: Config,
    statements: Mutex<Option<Arc<FinancialStatements>>>,
    companies: Mutex<Option<Arc<Vec<Company>>>>,
    assumptions: AsyncMutex<Option<CachedAssumptions>>,
}

fn get_or_load<T>(
    slot: &Mutex<Option<Arc<T>>>,
    load: impl FnOnce() -> DataResult<T>,
) -> DataResult<Arc<T>> {
    let mut guard = slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    if let Some(value) = guard.as_ref() {
        return Ok(Arc::clone(value));
    }
    let value = Arc::new(load()?);
    *guard = Some(Arc::clone(&value));
    Ok(value)
}

impl DataCache {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            statements: Mutex::new(None),
            companies: Mutex::new(None),
            assumptions: AsyncMutex::new(None),
        }
    }

    pub fn statements(&self) -> DataResult<Arc<FinancialStatements>> {
        get_or_load(&self.statements, || {
            info!("📂 Loading statement tables from {}", self.config.data_dir.display());
            load_financial_statements(&self.config.data_dir)
        })
    }

    pub fn companies(&self) -> DataResult<Arc<Vec<Company>>> {
        get_or_load(&self.companies, || {
            info!("📂 Loading ticker map from {}", self.config.ticker_map_path.display());
            load_ticker_map(&self.config.ticker_map_path)
        })
    }

    /// `statements()` on the blocking pool, keeping file parsing off the runtime workers
    pub async fn load_statements(self: &Arc<Self>) -> DataResult<Arc<FinancialStatements>> {
        let cache = Arc::clone(self);
        tokio::task::spawn_blocking(move || cache.statements()).await?
    }

    pub async fn load_companies(self: &Arc<Self>) -> DataResult<Arc<Vec<Company>>> {
        let cache = Arc::clone(self);
        tokio::task::spawn_blocking(move || cache.companies()).await?
    }

    /// Cached assumptions, refetched once older than `assumptions_max_age`
    pub async fn assumptions(
        &self,
        economic: &dyn EconomicDataProvider,
        market: &dyn MarketDataProvider,
    ) -> Arc<MarketAssumptions> {
        let mut guard = self.assumptions.lock().await;
        if let Some(cached) = guard.as_ref() {
            if cached.fetched_at.elapsed() < self.config.assumptions_max_age {
                return Arc::clone(&cached.value);
            }
        }

        let value = Arc::new(fetch_market_assumptions(economic, market, &self.config).await);
        *guard = Some(CachedAssumptions {
            fetched_at: Instant::now(),
            value: Arc::clone(&value),
        });
        value
    }

    /// Drop the on-disk tables so the next access reloads them
    pub fn invalidate(&self) {
        *self.statements.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = None;
        *self.companies.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = None;
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}
