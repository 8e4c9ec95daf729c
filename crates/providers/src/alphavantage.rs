//! Alpha Vantage adapter (`https://www.alphavantage.co/query?function=…`).
//!
//! Alpha Vantage signals throttling inside 2xx responses (`Note` /
//! `Information` payloads); those are surfaced with an explicit rate-limit
//! marker so classification treats them like an HTTP 429.

use std::collections::BTreeMap;

use {async_trait::async_trait, chrono::NaiveDateTime, tracing::debug};

use finmux_common::{Operation, ProviderKind};

use crate::{
    ProviderAdapter, UpstreamError, loose_f64, read_json,
    records::{
        Candle, CompanyInfo, Financials, Indicator, IndicatorPoint, IndicatorQuery, NewsItem,
        NewsQuery, OutputSize, Quote, StatementKind,
    },
    shared_http_client,
};

const DEFAULT_BASE_URL: &str = "https://www.alphavantage.co";

const OPERATIONS: &[Operation] = &[
    Operation::Quote,
    Operation::DailyPrices,
    Operation::News,
    Operation::CompanyOverview,
    Operation::IncomeStatement,
    Operation::BalanceSheet,
    Operation::CashFlow,
    Operation::TechnicalIndicator,
];

pub struct AlphaVantageAdapter {
    base_url: String,
    client: reqwest::Client,
}

impl AlphaVantageAdapter {
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

    async fn query(
        &self,
        operation: Operation,
        key: &str,
        function: &str,
        params: &[(&str, String)],
    ) -> Result<serde_json::Value, UpstreamError> {
        let url = format!("{}/query", self.base_url);
        let mut query: Vec<(&str, String)> = vec![("function", function.to_string())];
        query.extend_from_slice(params);
        query.push(("apikey", key.to_string()));

        let response = self
            .client
            .get(&url)
            .query(&query)
            .send()
            .await
            .map_err(|e| UpstreamError::transport(ProviderKind::AlphaVantage, &e))?;
        let body = read_json(ProviderKind::AlphaVantage, operation, response).await?;
        reject_error_payload(&body)?;
        Ok(body)
    }
}

impl Default for AlphaVantageAdapter {
    fn default() -> Self {
        Self::new()
    }
}

/// Alpha Vantage never uses HTTP status codes for application errors.
fn reject_error_payload(body: &serde_json::Value) -> Result<(), UpstreamError> {
    if let Some(message) = body["Error Message"].as_str() {
        return Err(UpstreamError::api(
            ProviderKind::AlphaVantage,
            message.to_string(),
        ));
    }
    for field in ["Note", "Information"] {
        if let Some(note) = body[field].as_str() {
            return Err(UpstreamError::api(
                ProviderKind::AlphaVantage,
                format!("rate limit: {note}"),
            ));
        }
    }
    Ok(())
}

#[async_trait]
impl ProviderAdapter for AlphaVantageAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::AlphaVantage
    }

    fn operations(&self) -> &'static [Operation] {
        OPERATIONS
    }

    async fn quote(&self, key: &str, symbol: &str) -> Result<Quote, UpstreamError> {
        let body = self
            .query(Operation::Quote, key, "GLOBAL_QUOTE", &[(
                "symbol",
                symbol.to_string(),
            )])
            .await?;
        let quote = &body["Global Quote"];
        if !quote.is_object() || quote.as_object().is_some_and(serde_json::Map::is_empty) {
            return Err(UpstreamError::api(
                ProviderKind::AlphaVantage,
                format!("no quote data for {symbol}"),
            ));
        }

        let field = |name: &str| loose_f64(&quote[name]).unwrap_or(0.0);
        debug!(symbol = %symbol, "alphavantage quote");
        Ok(Quote {
            symbol: quote["01. symbol"]
                .as_str()
                .unwrap_or(symbol)
                .to_string(),
            current: field("05. price"),
            change: field("09. change"),
            percent_change: field("10. change percent"),
            day_high: field("03. high"),
            day_low: field("04. low"),
            day_open: field("02. open"),
            prev_close: field("08. previous close"),
        })
    }

    async fn daily_prices(
        &self,
        key: &str,
        symbol: &str,
        size: OutputSize,
    ) -> Result<BTreeMap<String, Candle>, UpstreamError> {
        let body = self
            .query(Operation::DailyPrices, key, "TIME_SERIES_DAILY", &[
                ("symbol", symbol.to_string()),
                ("outputsize", size.tag().to_string()),
            ])
            .await?;
        let series = body["Time Series (Daily)"].as_object().ok_or_else(|| {
            UpstreamError::api(
                ProviderKind::AlphaVantage,
                format!("no daily series for {symbol}"),
            )
        })?;

        let mut prices = BTreeMap::new();
        for (date, bar) in series {
            let field = |name: &str| loose_f64(&bar[name]).unwrap_or(0.0);
            prices.insert(date.clone(), Candle {
                date: date.clone(),
                open: field("1. open"),
                high: field("2. high"),
                low: field("3. low"),
                close: field("4. close"),
                volume: field("5. volume"),
                adj_close: None,
            });
        }
        Ok(prices)
    }

    async fn news(&self, key: &str, query: &NewsQuery) -> Result<Vec<NewsItem>, UpstreamError> {
        let body = self
            .query(Operation::News, key, "NEWS_SENTIMENT", &[(
                "tickers",
                query.symbol.clone(),
            )])
            .await?;
        let feed = body["feed"].as_array().ok_or_else(|| {
            UpstreamError::api(
                ProviderKind::AlphaVantage,
                format!("no news feed for {}", query.symbol),
            )
        })?;

        Ok(feed
            .iter()
            .filter_map(|item| {
                Some(NewsItem {
                    id: None,
                    headline: item["title"].as_str()?.to_string(),
                    summary: item["summary"].as_str().map(ToString::to_string),
                    url: item["url"].as_str().map(ToString::to_string),
                    datetime: item["time_published"]
                        .as_str()
                        .and_then(parse_compact_datetime)
                        .unwrap_or(0),
                    source: item["source"].as_str().map(ToString::to_string),
                    category: item["category_within_source"]
                        .as_str()
                        .filter(|c| !c.is_empty() && *c != "n/a")
                        .map(ToString::to_string),
                    related: Some(query.symbol.clone()),
                })
            })
            .collect())
    }

    async fn company_overview(
        &self,
        key: &str,
        symbol: &str,
    ) -> Result<CompanyInfo, UpstreamError> {
        let body = self
            .query(Operation::CompanyOverview, key, "OVERVIEW", &[(
                "symbol",
                symbol.to_string(),
            )])
            .await?;
        let name = body["Name"].as_str().filter(|n| !n.is_empty()).ok_or_else(|| {
            UpstreamError::api(
                ProviderKind::AlphaVantage,
                format!("no company overview for {symbol}"),
            )
        })?;
        let text = |field: &str| {
            body[field]
                .as_str()
                .filter(|s| !s.is_empty() && *s != "None")
                .map(ToString::to_string)
        };
        Ok(CompanyInfo {
            symbol: symbol.to_string(),
            name: name.to_string(),
            industry: text("Industry"),
            sector: text("Sector"),
            market_cap: loose_f64(&body["MarketCapitalization"]),
            shares_outstanding: loose_f64(&body["SharesOutstanding"]),
            description: text("Description"),
            peers: None,
        })
    }

    async fn financial_statement(
        &self,
        key: &str,
        symbol: &str,
        kind: StatementKind,
    ) -> Result<Financials, UpstreamError> {
        let (function, operation) = match kind {
            StatementKind::Income => ("INCOME_STATEMENT", Operation::IncomeStatement),
            StatementKind::Balance => ("BALANCE_SHEET", Operation::BalanceSheet),
            StatementKind::CashFlow => ("CASH_FLOW", Operation::CashFlow),
        };
        let body = self
            .query(operation, key, function, &[("symbol", symbol.to_string())])
            .await?;
        let report = body["annualReports"]
            .as_array()
            .and_then(|reports| reports.first())
            .ok_or_else(|| {
                UpstreamError::api(
                    ProviderKind::AlphaVantage,
                    format!("no {function} data for {symbol}"),
                )
            })?;

        let lines: BTreeMap<String, f64> = report
            .as_object()
            .map(|obj| {
                obj.iter()
                    .filter_map(|(name, value)| loose_f64(value).map(|n| (name.clone(), n)))
                    .collect()
            })
            .unwrap_or_default();

        let mut financials = Financials::empty(symbol);
        financials.period = report["fiscalDateEnding"].as_str().map(ToString::to_string);
        match kind {
            StatementKind::Income => financials.income = Some(lines),
            StatementKind::Balance => financials.balance = Some(lines),
            StatementKind::CashFlow => financials.cash_flow = Some(lines),
        }
        Ok(financials)
    }

    async fn technical_indicator(
        &self,
        key: &str,
        query: &IndicatorQuery,
    ) -> Result<Indicator, UpstreamError> {
        let function = query.indicator.to_ascii_uppercase();
        let body = self
            .query(Operation::TechnicalIndicator, key, &function, &[
                ("symbol", query.symbol.clone()),
                ("interval", query.interval.clone()),
                ("time_period", query.time_period.to_string()),
                ("series_type", "close".to_string()),
            ])
            .await?;

        let series_key = format!("Technical Analysis: {function}");
        let series = body[&series_key].as_object().ok_or_else(|| {
            UpstreamError::api(
                ProviderKind::AlphaVantage,
                format!("no {function} data for {}", query.symbol),
            )
        })?;

        // serde_json keeps object keys sorted, so iteration is oldest-first.
        let points = series
            .iter()
            .filter_map(|(timestamp, values)| {
                let value = values
                    .as_object()
                    .and_then(|obj| obj.values().next())
                    .and_then(loose_f64)?;
                Some(IndicatorPoint {
                    timestamp: timestamp.clone(),
                    value,
                })
            })
            .collect();
        Ok(Indicator {
            name: function,
            symbol: query.symbol.clone(),
            series: points,
        })
    }
}

/// Parse Alpha Vantage's compact `YYYYMMDDTHHMMSS` stamps to unix seconds.
fn parse_compact_datetime(raw: &str) -> Option<i64> {
    NaiveDateTime::parse_from_str(raw, "%Y%m%dT%H%M%S")
        .ok()
        .map(|dt| dt.and_utc().timestamp())
}
