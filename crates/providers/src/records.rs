//! Common record shapes every adapter normalizes into.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A real-time (or latest) price snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub symbol: String,
    pub current: f64,
    pub change: f64,
    pub percent_change: f64,
    pub day_high: f64,
    pub day_low: f64,
    pub day_open: f64,
    pub prev_close: f64,
}

/// One OHLCV bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// Bar date, `YYYY-MM-DD`.
    pub date: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adj_close: Option<f64>,
}

/// A single news article.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub headline: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Publication time, unix seconds.
    pub datetime: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related: Option<String>,
}

/// Company profile / metrics snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyInfo {
    pub symbol: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub industry: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sector: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub market_cap: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shares_outstanding: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peers: Option<Vec<String>>,
}

/// Named numeric lines from financial statements or metric endpoints.
///
/// Statement tools fill exactly one of `income`/`balance`/`cash_flow`.
/// Metric-style endpoints (Finnhub basic financials) normalize their flat
/// line map into `income`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Financials {
    pub symbol: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub income: Option<BTreeMap<String, f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub balance: Option<BTreeMap<String, f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cash_flow: Option<BTreeMap<String, f64>>,
}

impl Financials {
    #[must_use]
    pub fn empty(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            period: None,
            income: None,
            balance: None,
            cash_flow: None,
        }
    }
}

/// One point of a technical-indicator series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorPoint {
    pub timestamp: String,
    pub value: f64,
}

/// A technical-indicator series, ordered oldest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Indicator {
    pub name: String,
    pub symbol: String,
    pub series: Vec<IndicatorPoint>,
}

/// Which financial statement a statement operation asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Income,
    Balance,
    CashFlow,
}

impl StatementKind {
    #[must_use]
    pub fn tag(self) -> &'static str {
        match self {
            Self::Income => "income",
            Self::Balance => "balance",
            Self::CashFlow => "cash_flow",
        }
    }
}

/// Arguments for a candle-history request.
#[derive(Debug, Clone)]
pub struct CandleQuery {
    pub symbol: String,
    /// Bar resolution: `1`/`5`/`15`/`30`/`60` minutes, `D`, `W`, `M`.
    pub resolution: String,
    /// Range start, `YYYY-MM-DD`.
    pub from: String,
    /// Range end, `YYYY-MM-DD`.
    pub to: String,
}

/// Daily-price history depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputSize {
    #[default]
    Compact,
    Full,
}

impl OutputSize {
    #[must_use]
    pub fn tag(self) -> &'static str {
        match self {
            Self::Compact => "compact",
            Self::Full => "full",
        }
    }
}

/// Arguments for a news request.
#[derive(Debug, Clone)]
pub struct NewsQuery {
    pub symbol: String,
    pub category: Option<String>,
    pub min_id: Option<i64>,
}

/// Arguments for a technical-indicator request.
#[derive(Debug, Clone)]
pub struct IndicatorQuery {
    pub symbol: String,
    /// Indicator name, e.g. `RSI`, `SMA`, `EMA`.
    pub indicator: String,
    /// `daily`, `weekly`, or `monthly`.
    pub interval: String,
    pub time_period: u32,
}
