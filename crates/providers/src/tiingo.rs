//! Tiingo adapter (`https://api.tiingo.com`, `Authorization: Token` auth).
//!
//! Some Tiingo deployments reject header auth with a 403; those calls are
//! retried once with `token=` query authentication before giving up.

use std::collections::BTreeMap;

use {async_trait::async_trait, chrono::DateTime, tracing::debug};

use finmux_common::{Operation, ProviderKind};

use crate::{
    ProviderAdapter, UpstreamError, loose_f64, read_json,
    records::{Candle, NewsItem, NewsQuery, OutputSize, Quote},
    shared_http_client,
};

const DEFAULT_BASE_URL: &str = "https://api.tiingo.com";
const COMPACT_LOOKBACK_DAYS: i64 = 140;
const FULL_HISTORY_START: &str = "1980-01-01";
const NEWS_LIMIT: usize = 50;

const OPERATIONS: &[Operation] = &[Operation::Quote, Operation::DailyPrices, Operation::News];

pub struct TiingoAdapter {
    base_url: String,
    client: reqwest::Client,
}

impl TiingoAdapter {
    #[must_use]
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    #[must_use]
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: shared_http_client().clone(),
        }
    }

    /// Header auth first, query-param auth as the 403 fallback.
    async fn get(
        &self,
        operation: Operation,
        key: &str,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<serde_json::Value, UpstreamError> {
        let url = format!("{}{path}", self.base_url);
        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Token {key}"))
            .query(query)
            .send()
            .await
            .map_err(|e| UpstreamError::transport(ProviderKind::Tiingo, &e))?;

        if response.status().as_u16() == 403 {
            debug!(path = %path, "tiingo header auth rejected, retrying with query token");
            let mut query = query.to_vec();
            query.push(("token", key.to_string()));
            let response = self
                .client
                .get(&url)
                .query(&query)
                .send()
                .await
                .map_err(|e| UpstreamError::transport(ProviderKind::Tiingo, &e))?;
            return read_json(ProviderKind::Tiingo, operation, response).await;
        }
        read_json(ProviderKind::Tiingo, operation, response).await
    }
}

impl Default for TiingoAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProviderAdapter for TiingoAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Tiingo
    }

    fn operations(&self) -> &'static [Operation] {
        OPERATIONS
    }

    async fn quote(&self, key: &str, symbol: &str) -> Result<Quote, UpstreamError> {
        let body = self
            .get(Operation::Quote, key, "/iex/", &[("tickers", symbol.to_string())])
            .await?;
        let snapshot = body
            .as_array()
            .and_then(|rows| rows.first())
            .ok_or_else(|| {
                UpstreamError::api(
                    ProviderKind::Tiingo,
                    format!("no quote data for {symbol}"),
                )
            })?;

        let field = |name: &str| loose_f64(&snapshot[name]).unwrap_or(0.0);
        let current = if field("last") != 0.0 {
            field("last")
        } else {
            field("tngoLast")
        };
        let prev_close = field("prevClose");
        let change = current - prev_close;
        Ok(Quote {
            symbol: snapshot["ticker"].as_str().unwrap_or(symbol).to_string(),
            current,
            change,
            percent_change: if prev_close != 0.0 {
                change / prev_close * 100.0
            } else {
                0.0
            },
            day_high: field("high"),
            day_low: field("low"),
            day_open: field("open"),
            prev_close,
        })
    }

    async fn daily_prices(
        &self,
        key: &str,
        symbol: &str,
        size: OutputSize,
    ) -> Result<BTreeMap<String, Candle>, UpstreamError> {
        let start_date = match size {
            OutputSize::Compact => (chrono::Utc::now().date_naive()
                - chrono::Duration::days(COMPACT_LOOKBACK_DAYS))
            .format("%Y-%m-%d")
            .to_string(),
            OutputSize::Full => FULL_HISTORY_START.to_string(),
        };
        let path = format!("/tiingo/daily/{}/prices", symbol.to_ascii_lowercase());
        let body = self
            .get(Operation::DailyPrices, key, &path, &[(
                "startDate",
                start_date,
            )])
            .await?;
        let rows = body.as_array().ok_or_else(|| {
            UpstreamError::api(
                ProviderKind::Tiingo,
                format!("no price history for {symbol}"),
            )
        })?;

        let mut prices = BTreeMap::new();
        for row in rows {
            let Some(stamp) = row["date"].as_str() else { continue };
            // Timestamps arrive as RFC 3339; only the calendar date matters.
            let date = stamp.get(..10).unwrap_or(stamp).to_string();
            let field = |name: &str| loose_f64(&row[name]).unwrap_or(0.0);
            prices.insert(date.clone(), Candle {
                date,
                open: field("open"),
                high: field("high"),
                low: field("low"),
                close: field("close"),
                volume: field("volume"),
                adj_close: loose_f64(&row["adjClose"]),
            });
        }
        Ok(prices)
    }

    async fn news(&self, key: &str, query: &NewsQuery) -> Result<Vec<NewsItem>, UpstreamError> {
        let body = self
            .get(Operation::News, key, "/tiingo/news", &[
                ("tickers", query.symbol.to_ascii_lowercase()),
                ("limit", NEWS_LIMIT.to_string()),
            ])
            .await?;
        let rows = body.as_array().ok_or_else(|| {
            UpstreamError::api(
                ProviderKind::Tiingo,
                format!("no news for {}", query.symbol),
            )
        })?;

        let mut news: Vec<NewsItem> = rows
            .iter()
            .filter_map(|row| {
                Some(NewsItem {
                    id: row["id"].as_i64(),
                    headline: row["title"].as_str()?.to_string(),
                    summary: row["description"].as_str().map(ToString::to_string),
                    url: row["url"].as_str().map(ToString::to_string),
                    datetime: row["publishedDate"]
                        .as_str()
                        .and_then(|stamp| DateTime::parse_from_rfc3339(stamp).ok())
                        .map(|dt| dt.timestamp())
                        .unwrap_or(0),
                    source: row["source"].as_str().map(ToString::to_string),
                    category: None,
                    related: Some(query.symbol.clone()),
                })
            })
            .collect();
        if let Some(min_id) = query.min_id {
            news.retain(|item| item.id.is_none_or(|id| id > min_id));
        }
        Ok(news)
    }
}
