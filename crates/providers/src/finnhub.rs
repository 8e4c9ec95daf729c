//! Finnhub adapter (`https://finnhub.io/api/v1`, `X-Finnhub-Token` auth).

use std::collections::BTreeMap;

use {async_trait::async_trait, chrono::NaiveDate, tracing::debug};

use finmux_common::{Operation, ProviderKind};

use crate::{
    ProviderAdapter, UpstreamError, loose_f64, read_json,
    records::{
        Candle, CandleQuery, CompanyInfo, Financials, NewsItem, NewsQuery, Quote,
    },
    shared_http_client,
};

const DEFAULT_BASE_URL: &str = "https://finnhub.io/api/v1";
const NEWS_LOOKBACK_DAYS: i64 = 30;

const OPERATIONS: &[Operation] = &[
    Operation::Quote,
    Operation::Candles,
    Operation::News,
    Operation::CompanyOverview,
    Operation::BasicFinancials,
    Operation::CompanyMetrics,
];

pub struct FinnhubAdapter {
    base_url: String,
    client: reqwest::Client,
}

impl FinnhubAdapter {
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
        let response = self
            .client
            .get(&url)
            .header("X-Finnhub-Token", key)
            .query(query)
            .send()
            .await
            .map_err(|e| UpstreamError::transport(ProviderKind::Finnhub, &e))?;
        read_json(ProviderKind::Finnhub, operation, response).await
    }
}

impl Default for FinnhubAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProviderAdapter for FinnhubAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Finnhub
    }

    fn operations(&self) -> &'static [Operation] {
        OPERATIONS
    }

    async fn quote(&self, key: &str, symbol: &str) -> Result<Quote, UpstreamError> {
        let body = self
            .get(Operation::Quote, key, "/quote", &[("symbol", symbol.to_string())])
            .await?;
        if let Some(error) = body.get("error").and_then(|e| e.as_str()) {
            return Err(UpstreamError::api(ProviderKind::Finnhub, error.to_string()));
        }

        let field = |name: &str| loose_f64(&body[name]).unwrap_or(0.0);
        let quote = Quote {
            symbol: symbol.to_string(),
            current: field("c"),
            change: field("d"),
            percent_change: field("dp"),
            day_high: field("h"),
            day_low: field("l"),
            day_open: field("o"),
            prev_close: field("pc"),
        };
        // Finnhub answers unknown symbols with an all-zero payload.
        if quote.current == 0.0 && quote.prev_close == 0.0 && quote.day_open == 0.0 {
            return Err(UpstreamError::api(
                ProviderKind::Finnhub,
                format!("no quote data for {symbol}"),
            ));
        }
        debug!(symbol = %symbol, price = quote.current, "finnhub quote");
        Ok(quote)
    }

    async fn candles(
        &self,
        key: &str,
        query: &CandleQuery,
    ) -> Result<Vec<Candle>, UpstreamError> {
        let malformed = |msg: &str| {
            UpstreamError::malformed(ProviderKind::Finnhub, Operation::Candles, msg.to_string())
        };
        let from = date_to_unix(&query.from, false)
            .ok_or_else(|| malformed("bad from date"))?;
        let to = date_to_unix(&query.to, true).ok_or_else(|| malformed("bad to date"))?;

        let body = self
            .get(Operation::Candles, key, "/stock/candle", &[
                ("symbol", query.symbol.clone()),
                ("resolution", query.resolution.clone()),
                ("from", from.to_string()),
                ("to", to.to_string()),
            ])
            .await?;

        match body["s"].as_str() {
            Some("ok") => {},
            Some("no_data") => {
                return Err(UpstreamError::api(
                    ProviderKind::Finnhub,
                    format!("no candle data for {}", query.symbol),
                ));
            },
            _ => return Err(malformed("missing status field")),
        }

        let series = |name: &str| -> Vec<serde_json::Value> {
            body[name].as_array().cloned().unwrap_or_default()
        };
        let (t, o, h, l, c, v) = (
            series("t"),
            series("o"),
            series("h"),
            series("l"),
            series("c"),
            series("v"),
        );
        let mut candles = Vec::with_capacity(t.len());
        for i in 0..t.len() {
            let Some(ts) = t[i].as_i64() else { continue };
            candles.push(Candle {
                date: unix_to_date(ts),
                open: o.get(i).and_then(loose_f64).unwrap_or(0.0),
                high: h.get(i).and_then(loose_f64).unwrap_or(0.0),
                low: l.get(i).and_then(loose_f64).unwrap_or(0.0),
                close: c.get(i).and_then(loose_f64).unwrap_or(0.0),
                volume: v.get(i).and_then(loose_f64).unwrap_or(0.0),
                adj_close: None,
            });
        }
        Ok(candles)
    }

    async fn news(&self, key: &str, query: &NewsQuery) -> Result<Vec<NewsItem>, UpstreamError> {
        let to = chrono::Utc::now().date_naive();
        let from = to - chrono::Duration::days(NEWS_LOOKBACK_DAYS);
        let body = self
            .get(Operation::News, key, "/company-news", &[
                ("symbol", query.symbol.clone()),
                ("from", from.format("%Y-%m-%d").to_string()),
                ("to", to.format("%Y-%m-%d").to_string()),
            ])
            .await?;

        let items = body.as_array().ok_or_else(|| {
            UpstreamError::malformed(
                ProviderKind::Finnhub,
                Operation::News,
                "expected a JSON array",
            )
        })?;

        let mut news: Vec<NewsItem> = items
            .iter()
            .filter_map(|item| {
                Some(NewsItem {
                    id: item["id"].as_i64(),
                    headline: item["headline"].as_str()?.to_string(),
                    summary: non_empty(&item["summary"]),
                    url: non_empty(&item["url"]),
                    datetime: item["datetime"].as_i64().unwrap_or(0),
                    source: non_empty(&item["source"]),
                    category: non_empty(&item["category"]),
                    related: non_empty(&item["related"]),
                })
            })
            .collect();
        if let Some(min_id) = query.min_id {
            news.retain(|item| item.id.is_none_or(|id| id > min_id));
        }
        if let Some(category) = &query.category {
            news.retain(|item| item.category.as_deref() == Some(category));
        }
        Ok(news)
    }

    async fn company_overview(
        &self,
        key: &str,
        symbol: &str,
    ) -> Result<CompanyInfo, UpstreamError> {
        let body = self
            .get(Operation::CompanyOverview, key, "/stock/profile2", &[(
                "symbol",
                symbol.to_string(),
            )])
            .await?;
        let name = body["name"].as_str().filter(|n| !n.is_empty()).ok_or_else(|| {
            UpstreamError::api(
                ProviderKind::Finnhub,
                format!("no company profile for {symbol}"),
            )
        })?;
        Ok(CompanyInfo {
            symbol: symbol.to_string(),
            name: name.to_string(),
            industry: non_empty(&body["finnhubIndustry"]),
            sector: None,
            market_cap: loose_f64(&body["marketCapitalization"]),
            shares_outstanding: loose_f64(&body["shareOutstanding"]),
            description: None,
            peers: None,
        })
    }

    async fn basic_financials(
        &self,
        key: &str,
        symbol: &str,
    ) -> Result<Financials, UpstreamError> {
        let body = self
            .get(Operation::BasicFinancials, key, "/stock/metric", &[
                ("symbol", symbol.to_string()),
                ("metric", "all".to_string()),
            ])
            .await?;
        let lines = metric_lines(&body["metric"]);
        if lines.is_empty() {
            return Err(UpstreamError::api(
                ProviderKind::Finnhub,
                format!("no financial metrics for {symbol}"),
            ));
        }
        let mut financials = Financials::empty(symbol);
        financials.income = Some(lines);
        Ok(financials)
    }

    async fn company_metrics(
        &self,
        key: &str,
        symbol: &str,
        metric_type: Option<&str>,
    ) -> Result<CompanyInfo, UpstreamError> {
        let metric = metric_type.unwrap_or("all").to_string();
        let body = self
            .get(Operation::CompanyMetrics, key, "/stock/metric", &[
                ("symbol", symbol.to_string()),
                ("metric", metric),
            ])
            .await?;
        let lines = &body["metric"];
        if !lines.is_object() {
            return Err(UpstreamError::api(
                ProviderKind::Finnhub,
                format!("no metrics for {symbol}"),
            ));
        }
        Ok(CompanyInfo {
            symbol: symbol.to_string(),
            name: symbol.to_string(),
            industry: None,
            sector: None,
            market_cap: loose_f64(&lines["marketCapitalization"]),
            shares_outstanding: loose_f64(&lines["shareOutstanding"]),
            description: None,
            peers: None,
        })
    }
}

fn non_empty(value: &serde_json::Value) -> Option<String> {
    value
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
}

fn metric_lines(value: &serde_json::Value) -> BTreeMap<String, f64> {
    value
        .as_object()
        .map(|obj| {
            obj.iter()
                .filter_map(|(name, v)| loose_f64(v).map(|n| (name.clone(), n)))
                .collect()
        })
        .unwrap_or_default()
}

fn date_to_unix(date: &str, end_of_day: bool) -> Option<i64> {
    let date = NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()?;
    let time = if end_of_day {
        date.and_hms_opt(23, 59, 59)?
    } else {
        date.and_hms_opt(0, 0, 0)?
    };
    Some(time.and_utc().timestamp())
}

fn unix_to_date(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d").to_string())
        .unwrap_or_default()
}
