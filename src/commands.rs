//! Operations exposed to the presentation layer; errors are rendered as strings.

use anyhow::Result;
use std::sync::Arc;
use tracing::{error, info};

use crate::analysis::{display_entries, RunOrchestrator};
use crate::api::{BcbClient, EconomicDataProvider, MarketDataProvider, YahooClient};
use crate::cache::DataCache;
use crate::models::{Config, MarketInfoEntry, ValuationResult};

/// Providers plus the input cache shared by every command
pub struct AppContext {
    cache: Arc<DataCache>,
    market: Arc<dyn MarketDataProvider>,
    economic: Arc<dyn EconomicDataProvider>,
}

impl AppContext {
    /// Context backed by the live Yahoo Finance and Central Bank clients
    pub fn new(config: Config) -> Result<Self> {
        let market = Arc::new(YahooClient::new(&config)?);
        let economic = Arc::new(BcbClient::new(&config)?);
        Ok(Self::with_providers(config, market, economic))
    }

    pub fn with_providers(
        config: Config,
        market: Arc<dyn MarketDataProvider>,
        economic: Arc<dyn EconomicDataProvider>,
    ) -> Self {
        Self {
            cache: Arc::new(DataCache::new(config)),
            market,
            economic,
        }
    }

    pub fn config(&self) -> &Config {
        self.cache.config()
    }
}

/// Current market assumptions as ordered display lines
pub async fn get_market_info(ctx: &AppContext) -> Result<Vec<MarketInfoEntry>, String> {
    let assumptions = ctx
        .cache
        .assumptions(ctx.economic.as_ref(), ctx.market.as_ref())
        .await;
    Ok(display_entries(&assumptions))
}

/// Full analysis pass; on-disk tables are always reloaded first
pub async fn run_analysis(ctx: &AppContext) -> Result<Vec<ValuationResult>, String> {
    info!("🚀 Analysis requested");
    ctx.cache.invalidate();

    let statements = ctx.cache.load_statements().await.map_err(|e| {
        error!("❌ Failed to load statement tables: {}", e);
        format!("Failed to load prepared statement data: {}", e)
    })?;
    let companies = ctx.cache.load_companies().await.map_err(|e| {
        error!("❌ Failed to load ticker map: {}", e);
        format!("Failed to load ticker mapping: {}", e)
    })?;

    // one snapshot for the whole run
    let assumptions = ctx
        .cache
        .assumptions(ctx.economic.as_ref(), ctx.market.as_ref())
        .await;

    let orchestrator = RunOrchestrator::new(ctx.market.as_ref(), ctx.config());
    let report = orchestrator
        .run_all(&companies, &statements, &assumptions)
        .await;

    Ok(report.results)
}
