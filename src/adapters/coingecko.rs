//! CoinGecko-compatible REST adapter for ranked coin lists and price history.

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::MarketConfig;
use crate::domain::{Coin, PricePoint};
use crate::error::{LedgerError, Result};
use crate::exchange::MarketData;

/// Row of `/coins/markets`
#[derive(Debug, Clone, Deserialize)]
pub struct MarketRow {
    pub id: String,
    pub symbol: String,
    pub name: String,
    #[serde(default)]
    pub current_price: Option<Decimal>,
    #[serde(default)]
    pub market_cap: Option<Decimal>,
}

/// Body of `/coins/{id}/market_chart`
#[derive(Debug, Clone, Deserialize)]
pub struct MarketChartResponse {
    /// `[timestamp_ms, price]` pairs
    #[serde(default)]
    pub prices: Vec<(f64, Decimal)>,
}

#[derive(Clone)]
pub struct CoinGeckoClient {
    http: Client,
    base_url: String,
    vs_currency: String,
    top_n: u32,
    history_days: u32,
}

impl CoinGeckoClient {
    pub fn new(config: &MarketConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        if let Some(key) = config.api_key.as_deref().filter(|k| !k.is_empty()) {
            let value = HeaderValue::from_str(key)
                .map_err(|e| LedgerError::Validation(format!("invalid market api key: {}", e)))?;
            headers.insert(HeaderName::from_static("x-cg-pro-api-key"), value);
        }

        let http = Client::builder()
            .user_agent("coinledger/0.1")
            .timeout(config.request_timeout())
            .default_headers(headers)
            .build()
            .map_err(|e| {
                LedgerError::Internal(format!("failed to build market HTTP client: {}", e))
            })?;

        Ok(Self {
            http,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            vs_currency: config.vs_currency.clone(),
            top_n: config.top_n,
            history_days: config.history_days,
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .http
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(|e| LedgerError::Retrieval(format!("GET {path}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LedgerError::Retrieval(format!(
                "GET {path} returned {status}: {}",
                body.chars().take(200).collect::<String>()
            )));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| LedgerError::Retrieval(format!("GET {path}: malformed body: {e}")))
    }
}

/// Convert market rows into snapshot coins.
///
/// Rows without a price are dropped; a missing market cap becomes zero.
/// Negative values mean the payload is malformed.
pub fn coins_from_rows(rows: Vec<MarketRow>) -> Result<Vec<Coin>> {
    let mut coins = Vec::with_capacity(rows.len());

    for row in rows {
        let Some(current_price) = row.current_price else {
            warn!(coin_id = %row.id, "Dropping coin without a current price");
            continue;
        };
        let market_cap = row.market_cap.unwrap_or(Decimal::ZERO);

        if current_price < Decimal::ZERO || market_cap < Decimal::ZERO {
            return Err(LedgerError::Retrieval(format!(
                "negative price or market cap for {}",
                row.id
            )));
        }

        coins.push(Coin {
            coin_id: row.id,
            symbol: row.symbol,
            name: row.name,
            current_price,
            market_cap,
        });
    }

    Ok(coins)
}

/// Convert a market chart into time-ordered price points
pub fn price_points_from_chart(coin_id: &str, chart: MarketChartResponse) -> Result<Vec<PricePoint>> {
    let mut points = chart
        .prices
        .into_iter()
        .map(|(ts_ms, price)| -> Result<PricePoint> {
            let timestamp = Utc.timestamp_millis_opt(ts_ms as i64).single().ok_or_else(|| {
                LedgerError::Retrieval(format!("bad timestamp {ts_ms} in history of {coin_id}"))
            })?;
            Ok(PricePoint::new(timestamp, price))
        })
        .collect::<Result<Vec<_>>>()?;

    points.sort_by_key(|p| p.timestamp);
    Ok(points)
}

#[async_trait]
impl MarketData for CoinGeckoClient {
    async fn list_ranked_coins(&self) -> Result<Vec<Coin>> {
        let rows: Vec<MarketRow> = self
            .get_json(
                "/coins/markets",
                &[
                    ("vs_currency", self.vs_currency.clone()),
                    ("order", "market_cap_desc".to_string()),
                    ("per_page", self.top_n.to_string()),
                    ("page", "1".to_string()),
                ],
            )
            .await?;

        let coins = coins_from_rows(rows)?;
        debug!("Fetched {} ranked coins", coins.len());
        Ok(coins)
    }

    async fn get_price_history(&self, coin_id: &str) -> Result<Vec<PricePoint>> {
        let chart: MarketChartResponse = self
            .get_json(
                &format!("/coins/{coin_id}/market_chart"),
                &[
                    ("vs_currency", self.vs_currency.clone()),
                    ("days", self.history_days.to_string()),
                ],
            )
            .await?;

        price_points_from_chart(coin_id, chart)
    }
}
