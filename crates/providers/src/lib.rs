//! Upstream provider adapters and the records they normalize into.
//!
//! One adapter per provider. Each declares the operations it supports and
//! translates the provider's wire format into the common record shapes;
//! everything else (routing, key selection, failover) lives above this crate.

pub mod alphavantage;
pub mod eastmoney;
pub mod error;
pub mod finnhub;
pub mod pacing;
pub mod records;
pub mod sina;
pub mod tiingo;
pub mod twelvedata;

use std::collections::BTreeMap;

use async_trait::async_trait;

use finmux_common::{Operation, ProviderKind};

pub use {
    alphavantage::AlphaVantageAdapter,
    eastmoney::EastMoneyAdapter,
    error::UpstreamError,
    finnhub::FinnhubAdapter,
    records::{
        Candle, CandleQuery, CompanyInfo, Financials, Indicator, IndicatorPoint, IndicatorQuery,
        NewsItem, NewsQuery, OutputSize, Quote, StatementKind,
    },
    sina::SinaAdapter,
    tiingo::TiingoAdapter,
    twelvedata::TwelveDataAdapter,
};

/// Shared HTTP client for all adapters.
///
/// Adapters without special client needs reuse this one to share connection
/// pools, DNS cache, and TLS sessions.
pub fn shared_http_client() -> &'static reqwest::Client {
    static CLIENT: std::sync::LazyLock<reqwest::Client> =
        std::sync::LazyLock::new(reqwest::Client::new);
    &CLIENT
}

/// A provider-specific translator between gateway operations and one
/// upstream API.
///
/// Adapters are stateless beyond pacing and safe to call concurrently. The
/// credential for a call is injected per invocation (the key pool owns
/// rotation). Every method defaults to an `Unsupported` error; adapters
/// override exactly the operations they list in [`operations`].
///
/// [`operations`]: ProviderAdapter::operations
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Capability set, fixed at construction.
    fn operations(&self) -> &'static [Operation];

    fn supports(&self, operation: Operation) -> bool {
        self.operations().contains(&operation)
    }

    async fn quote(&self, _key: &str, _symbol: &str) -> Result<Quote, UpstreamError> {
        Err(UpstreamError::unsupported(self.kind(), Operation::Quote))
    }

    async fn candles(
        &self,
        _key: &str,
        _query: &CandleQuery,
    ) -> Result<Vec<Candle>, UpstreamError> {
        Err(UpstreamError::unsupported(self.kind(), Operation::Candles))
    }

    async fn daily_prices(
        &self,
        _key: &str,
        _symbol: &str,
        _size: OutputSize,
    ) -> Result<BTreeMap<String, Candle>, UpstreamError> {
        Err(UpstreamError::unsupported(self.kind(), Operation::DailyPrices))
    }

    async fn news(&self, _key: &str, _query: &NewsQuery) -> Result<Vec<NewsItem>, UpstreamError> {
        Err(UpstreamError::unsupported(self.kind(), Operation::News))
    }

    async fn company_overview(
        &self,
        _key: &str,
        _symbol: &str,
    ) -> Result<CompanyInfo, UpstreamError> {
        Err(UpstreamError::unsupported(self.kind(), Operation::CompanyOverview))
    }

    async fn basic_financials(
        &self,
        _key: &str,
        _symbol: &str,
    ) -> Result<Financials, UpstreamError> {
        Err(UpstreamError::unsupported(self.kind(), Operation::BasicFinancials))
    }

    async fn company_metrics(
        &self,
        _key: &str,
        _symbol: &str,
        _metric_type: Option<&str>,
    ) -> Result<CompanyInfo, UpstreamError> {
        Err(UpstreamError::unsupported(self.kind(), Operation::CompanyMetrics))
    }

    async fn financial_statement(
        &self,
        _key: &str,
        _symbol: &str,
        kind: StatementKind,
    ) -> Result<Financials, UpstreamError> {
        let operation = match kind {
            StatementKind::Income => Operation::IncomeStatement,
            StatementKind::Balance => Operation::BalanceSheet,
            StatementKind::CashFlow => Operation::CashFlow,
        };
        Err(UpstreamError::unsupported(self.kind(), operation))
    }

    async fn technical_indicator(
        &self,
        _key: &str,
        _query: &IndicatorQuery,
    ) -> Result<Indicator, UpstreamError> {
        Err(UpstreamError::unsupported(self.kind(), Operation::TechnicalIndicator))
    }
}

const ERROR_BODY_CAP: usize = 400;

/// Check the HTTP status and parse the body as JSON.
pub(crate) async fn read_json(
    provider: ProviderKind,
    operation: Operation,
    response: reqwest::Response,
) -> Result<serde_json::Value, UpstreamError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(UpstreamError::http(
            provider,
            status.as_u16(),
            clip(&body),
        ));
    }
    response
        .json()
        .await
        .map_err(|e| UpstreamError::malformed(provider, operation, e.to_string()))
}

/// Cap upstream error bodies so log lines and messages stay bounded.
pub(crate) fn clip(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.len() <= ERROR_BODY_CAP {
        trimmed.to_string()
    } else {
        let mut end = ERROR_BODY_CAP;
        while !trimmed.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}…", &trimmed[..end])
    }
}

/// Read a numeric field that may arrive as a JSON number or a numeric string.
pub(crate) fn loose_f64(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().trim_end_matches('%').parse().ok(),
        _ => None,
    }
}
