use anyhow::{anyhow, Context, Result};
use chrono::NaiveDate;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use super::EconomicDataProvider;
use crate::error::DataError;
use crate::models::{Config, EconomicObservation, EconomicSeries};

/// One SGS observation; both fields arrive as strings
#[derive(Debug, Deserialize)]
struct SgsObservation {
    data: String,
    valor: String,
}

impl SgsObservation {
    fn parse(&self) -> Result<EconomicObservation> {
        let date = NaiveDate::parse_from_str(self.data.trim(), "%d/%m/%Y")
            .with_context(|| format!("invalid SGS date '{}'", self.data))?;
        let value = self
            .valor
            .trim()
            .parse::<f64>()
            .with_context(|| format!("invalid SGS value '{}'", self.valor))?;
        Ok(EconomicObservation { date, value })
    }
}

/// Central Bank of Brazil time series (SGS) client
pub struct BcbClient {
    client: Client,
    base_url: String,
}

impl BcbClient {
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder().timeout(config.rates_timeout).build()?;

        Ok(Self {
            client,
            base_url: config.bcb_base_url.trim_end_matches('/').to_string(),
        })
    }

    fn latest_url(&self, series: EconomicSeries) -> String {
        format!(
            "{}/dados/serie/bcdata.sgs.{}/dados/ultimos/1",
            self.base_url,
            series.code()
        )
    }
}

#[async_trait::async_trait]
impl EconomicDataProvider for BcbClient {
    async fn latest_observation(&self, series: EconomicSeries) -> Result<EconomicObservation> {
        let url = self.latest_url(series);
        debug!("🌐 GET {}", url);

        let response = self
            .client
            .get(&url)
            .query(&[("formato", "json")])
            .send()
            .await
            .map_err(DataError::from)?;

        if !response.status().is_success() {
            return Err(DataError::DataUnavailable(format!(
                "{} request failed with status {}",
                series,
                response.status()
            ))
            .into());
        }

        let observations: Vec<SgsObservation> = response.json().await.map_err(DataError::from)?;
        observations
            .last()
            .ok_or_else(|| anyhow!(DataError::DataUnavailable(format!("{} returned no data", series))))?
            .parse()
    }
}
