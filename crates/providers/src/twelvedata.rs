//! Twelve Data adapter (`https://api.twelvedata.com`).
//!
//! Twelve Data reports application errors as `{"status":"error","code":…}`
//! inside 2xx responses; the numeric code is embedded in the raised message
//! so a 429 still classifies as a rate limit.

use {async_trait::async_trait, tracing::debug};

use finmux_common::{Operation, ProviderKind};

use crate::{
    ProviderAdapter, UpstreamError, loose_f64, read_json,
    records::{Candle, CandleQuery, Indicator, IndicatorPoint, IndicatorQuery, Quote},
    shared_http_client,
};

const DEFAULT_BASE_URL: &str = "https://api.twelvedata.com";

const OPERATIONS: &[Operation] = &[
    Operation::Quote,
    Operation::Candles,
    Operation::TechnicalIndicator,
];

pub struct TwelveDataAdapter {
    base_url: String,
    client: reqwest::Client,
}

impl TwelveDataAdapter {
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

    async fn get(
        &self,
        operation: Operation,
        key: &str,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<serde_json::Value, UpstreamError> {
        let url = format!("{}{path}", self.base_url);
        let mut query = query.to_vec();
        query.push(("apikey", key.to_string()));

        let response = self
            .client
            .get(&url)
            .query(&query)
            .send()
            .await
            .map_err(|e| UpstreamError::transport(ProviderKind::TwelveData, &e))?;
        let body = read_json(ProviderKind::TwelveData, operation, response).await?;

        if body["status"].as_str() == Some("error") {
            let code = body["code"].as_i64().unwrap_or(0);
            let message = body["message"].as_str().unwrap_or("unknown error");
            return Err(UpstreamError::api(
                ProviderKind::TwelveData,
                format!("error {code}: {message}"),
            ));
        }
        Ok(body)
    }
}

impl Default for TwelveDataAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProviderAdapter for TwelveDataAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::TwelveData
    }

    fn operations(&self) -> &'static [Operation] {
        OPERATIONS
    }

    async fn quote(&self, key: &str, symbol: &str) -> Result<Quote, UpstreamError> {
        let body = self
            .get(Operation::Quote, key, "/quote", &[("symbol", symbol.to_string())])
            .await?;
        let field = |name: &str| loose_f64(&body[name]).unwrap_or(0.0);
        debug!(symbol = %symbol, "twelvedata quote");
        Ok(Quote {
            symbol: body["symbol"].as_str().unwrap_or(symbol).to_string(),
            current: field("close"),
            change: field("change"),
            percent_change: field("percent_change"),
            day_high: field("high"),
            day_low: field("low"),
            day_open: field("open"),
            prev_close: field("previous_close"),
        })
    }

    async fn candles(
        &self,
        key: &str,
        query: &CandleQuery,
    ) -> Result<Vec<Candle>, UpstreamError> {
        let body = self
            .get(Operation::Candles, key, "/time_series", &[
                ("symbol", query.symbol.clone()),
                ("interval", resolution_to_interval(&query.resolution)),
                ("start_date", query.from.clone()),
                ("end_date", query.to.clone()),
            ])
            .await?;
        let values = body["values"].as_array().ok_or_else(|| {
            UpstreamError::api(
                ProviderKind::TwelveData,
                format!("no time series for {}", query.symbol),
            )
        })?;

        // Values arrive newest-first; emit oldest-first.
        let mut candles: Vec<Candle> = values
            .iter()
            .filter_map(|bar| {
                let field = |name: &str| loose_f64(&bar[name]).unwrap_or(0.0);
                Some(Candle {
                    date: bar["datetime"].as_str()?.to_string(),
                    open: field("open"),
                    high: field("high"),
                    low: field("low"),
                    close: field("close"),
                    volume: field("volume"),
                    adj_close: None,
                })
            })
            .collect();
        candles.reverse();
        Ok(candles)
    }

    async fn technical_indicator(
        &self,
        key: &str,
        query: &IndicatorQuery,
    ) -> Result<Indicator, UpstreamError> {
        let endpoint = query.indicator.to_ascii_lowercase();
        let body = self
            .get(
                Operation::TechnicalIndicator,
                key,
                &format!("/{endpoint}"),
                &[
                    ("symbol", query.symbol.clone()),
                    ("interval", interval_to_upstream(&query.interval)),
                    ("time_period", query.time_period.to_string()),
                ],
            )
            .await?;
        let values = body["values"].as_array().ok_or_else(|| {
            UpstreamError::api(
                ProviderKind::TwelveData,
                format!("no {endpoint} series for {}", query.symbol),
            )
        })?;

        let mut series: Vec<IndicatorPoint> = values
            .iter()
            .filter_map(|point| {
                let value = loose_f64(&point[&endpoint])?;
                Some(IndicatorPoint {
                    timestamp: point["datetime"].as_str()?.to_string(),
                    value,
                })
            })
            .collect();
        series.reverse();
        Ok(Indicator {
            name: query.indicator.to_ascii_uppercase(),
            symbol: query.symbol.clone(),
            series,
        })
    }
}

/// Map gateway candle resolutions onto Twelve Data interval names.
fn resolution_to_interval(resolution: &str) -> String {
    match resolution {
        "D" | "d" => "1day".to_string(),
        "W" | "w" => "1week".to_string(),
        "M" => "1month".to_string(),
        "1" | "5" | "15" | "30" => format!("{resolution}min"),
        "60" => "1h".to_string(),
        other => other.to_string(),
    }
}

fn interval_to_upstream(interval: &str) -> String {
    match interval {
        "daily" => "1day".to_string(),
        "weekly" => "1week".to_string(),
        "monthly" => "1month".to_string(),
        other => other.to_string(),
    }
}
