use anyhow::{anyhow, Result};
use chrono::DateTime;
use reqwest::header::REFERER;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, warn};

use super::{ApiRateLimiter, MarketDataProvider};
use crate::error::DataError;
use crate::models::{Config, MarketSnapshot, PricePoint};

const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) eva-valuation/0.1";

/// `/v7/finance/quote` response
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuoteEnvelope {
    quote_response: QuoteResponse,
}

#[derive(Debug, Deserialize)]
struct QuoteResponse {
    #[serde(default)]
    result: Vec<QuoteRecord>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuoteRecord {
    symbol: String,
    short_name: Option<String>,
    long_name: Option<String>,
    regular_market_price: Option<f64>,
    regular_market_previous_close: Option<f64>,
    shares_outstanding: Option<f64>,
    market_cap: Option<f64>,
}

impl From<QuoteRecord> for MarketSnapshot {
    fn from(record: QuoteRecord) -> Self {
        MarketSnapshot {
            short_name: record.short_name.or(record.long_name),
            price: record
                .regular_market_price
                .or(record.regular_market_previous_close),
            shares_outstanding: record.shares_outstanding,
            market_cap: record.market_cap,
        }
    }
}

/// `/v8/finance/chart` response
#[derive(Debug, Deserialize)]
struct ChartEnvelope {
    chart: ChartBody,
}

#[derive(Debug, Deserialize)]
struct ChartBody {
    result: Option<Vec<ChartResult>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    #[serde(default)]
    adjclose: Vec<AdjCloseSeries>,
    #[serde(default)]
    quote: Vec<CloseSeries>,
}

#[derive(Debug, Deserialize)]
struct AdjCloseSeries {
    #[serde(default)]
    adjclose: Vec<Option<f64>>,
}

#[derive(Debug, Deserialize)]
struct CloseSeries {
    #[serde(default)]
    close: Vec<Option<f64>>,
}

impl ChartResult {
    /// Adjusted closes, or raw closes when the adjusted series is absent
    fn into_price_points(self) -> Vec<PricePoint> {
        let closes = match self.indicators.adjclose.into_iter().next() {
            Some(series) if !series.adjclose.is_empty() => series.adjclose,
            _ => self
                .indicators
                .quote
                .into_iter()
                .next()
                .map(|series| series.close)
                .unwrap_or_default(),
        };

        let mut points: Vec<PricePoint> = self
            .timestamp
            .iter()
            .enumerate()
            .filter_map(|(i, ts)| {
                let date = DateTime::from_timestamp(*ts, 0)?.date_naive();
                Some(PricePoint {
                    date,
                    adj_close: closes.get(i).copied().flatten(),
                })
            })
            .collect();

        points.sort_by_key(|point| point.date);
        points.dedup_by_key(|point| point.date);
        points
    }
}

/// Crumbs are reused for an hour before a fresh session is opened
const CRUMB_TTL: Duration = Duration::from_secs(3600);
const REFERER_URL: &str = "https://finance.yahoo.com/";

struct CachedCrumb {
    value: String,
    fetched_at: Instant,
}

/// Cookie and crumb pair required by the quote endpoint
///
/// The cookie lives in the client's jar; the crumb goes into the query string.
struct YahooSession {
    cookie_url: String,
    crumb_url: String,
    crumb: AsyncMutex<Option<CachedCrumb>>,
}

impl YahooSession {
    fn new(config: &Config, base_url: &str) -> Self {
        Self {
            cookie_url: config.yahoo_cookie_url.clone(),
            crumb_url: format!("{}/v1/test/getcrumb", base_url),
            crumb: AsyncMutex::new(None),
        }
    }

    /// Cached crumb, or a new session when none is cached or it expired
    async fn crumb(&self, client: &Client) -> Result<String> {
        let mut guard = self.crumb.lock().await;
        if let Some(cached) = guard.as_ref() {
            if cached.fetched_at.elapsed() < CRUMB_TTL {
                return Ok(cached.value.clone());
            }
        }

        let value = self.open(client).await?;
        *guard = Some(CachedCrumb {
            value: value.clone(),
            fetched_at: Instant::now(),
        });
        Ok(value)
    }

    /// Drop the cached crumb and open a new session
    async fn refresh(&self, client: &Client) -> Result<String> {
        self.crumb.lock().await.take();
        self.crumb(client).await
    }

    async fn open(&self, client: &Client) -> Result<String> {
        debug!("🍪 Opening Yahoo session via {}", self.cookie_url);
        // the cookie page answers 404 but still sets the session cookie
        client
            .get(&self.cookie_url)
            .header(REFERER, REFERER_URL)
            .send()
            .await
            .map_err(DataError::from)?;

        let response = client
            .get(&self.crumb_url)
            .header(REFERER, REFERER_URL)
            .send()
            .await
            .map_err(DataError::from)?;

        if !response.status().is_success() {
            return Err(DataError::DataUnavailable(format!(
                "Yahoo crumb request failed with status {}",
                response.status()
            ))
            .into());
        }

        let body = response.text().await.map_err(DataError::from)?;
        valid_crumb(&body)
            .map(str::to_string)
            .ok_or_else(|| anyhow!(DataError::DataUnavailable("unexpected Yahoo crumb response".to_string())))
    }
}

/// A crumb is a short token; HTML pages and rate-limit messages are rejected
fn valid_crumb(body: &str) -> Option<&str> {
    let crumb = body.trim();
    let plausible = !crumb.is_empty()
        && crumb.len() < 100
        && !crumb.contains(char::is_whitespace)
        && !crumb.contains('<');
    plausible.then_some(crumb)
}

/// Yahoo Finance quotes and daily history
pub struct YahooClient {
    client: Client,
    base_url: String,
    session: YahooSession,
    rate_limiter: Arc<ApiRateLimiter>,
}

impl YahooClient {
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.http_timeout)
            .user_agent(USER_AGENT)
            .cookie_store(true)
            .build()?;
        let base_url = config.yahoo_base_url.trim_end_matches('/').to_string();

        Ok(Self {
            client,
            session: YahooSession::new(config, &base_url),
            base_url,
            rate_limiter: Arc::new(ApiRateLimiter::new(config.rate_limit_per_minute)),
        })
    }

    async fn send(&self, url: &str, query: &[(&str, &str)]) -> Result<Response> {
        self.rate_limiter.wait().await;
        debug!("🌐 GET {}", url);

        Ok(self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(DataError::from)?)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str, query: &[(&str, &str)]) -> Result<T> {
        let response = self.send(url, query).await?;
        read_json(response).await
    }
}

async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T> {
    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(DataError::DataUnavailable(format!(
            "Yahoo request failed with status {}: {}",
            status,
            body.chars().take(200).collect::<String>()
        ))
        .into());
    }

    Ok(response.json::<T>().await.map_err(DataError::from)?)
}

fn path_symbol(symbol: &str) -> String {
    symbol.trim().replace('^', "%5E")
}

#[async_trait::async_trait]
impl MarketDataProvider for YahooClient {
    async fn get_quote(&self, symbol: &str) -> Result<MarketSnapshot> {
        let url = format!("{}/v7/finance/quote", self.base_url);

        let crumb = self.session.crumb(&self.client).await?;
        let mut response = self.send(&url, &[("symbols", symbol), ("crumb", crumb.as_str())]).await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            warn!("🔑 Yahoo rejected the session crumb, refreshing");
            let crumb = self.session.refresh(&self.client).await?;
            response = self.send(&url, &[("symbols", symbol), ("crumb", crumb.as_str())]).await?;
        }
        let envelope: QuoteEnvelope = read_json(response).await?;

        envelope
            .quote_response
            .result
            .into_iter()
            .find(|record| record.symbol.eq_ignore_ascii_case(symbol))
            .map(MarketSnapshot::from)
            .ok_or_else(|| anyhow!(DataError::DataUnavailable(format!("no quote for {}", symbol))))
    }

    async fn get_price_history(&self, symbol: &str, range: &str) -> Result<Vec<PricePoint>> {
        let url = format!("{}/v8/finance/chart/{}", self.base_url, path_symbol(symbol));
        let envelope: ChartEnvelope = self
            .get_json(&url, &[("range", range), ("interval", "1d"), ("events", "div,splits")])
            .await?;

        if let Some(error) = envelope.chart.error {
            return Err(DataError::DataUnavailable(format!(
                "chart for {} failed: {} ({})",
                symbol, error.description, error.code
            ))
            .into());
        }

        let points = envelope
            .chart
            .result
            .and_then(|results| results.into_iter().next())
            .map(ChartResult::into_price_points)
            .unwrap_or_default();

        if points.is_empty() {
            warn!("⚠️  Empty price history for {}", symbol);
        }
        Ok(points)
    }
}
