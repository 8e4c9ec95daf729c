//! Tag enums shared across the gateway: upstream providers, market venues,
//! and the canonical data operations.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::ParseTagError;

/// An upstream financial-data API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Finnhub,
    AlphaVantage,
    TwelveData,
    Tiingo,
    Sina,
    EastMoney,
}

impl ProviderKind {
    pub const ALL: [Self; 6] = [
        Self::Finnhub,
        Self::AlphaVantage,
        Self::TwelveData,
        Self::Tiingo,
        Self::Sina,
        Self::EastMoney,
    ];

    #[must_use]
    pub fn tag(self) -> &'static str {
        match self {
            Self::Finnhub => "finnhub",
            Self::AlphaVantage => "alphavantage",
            Self::TwelveData => "twelvedata",
            Self::Tiingo => "tiingo",
            Self::Sina => "sina",
            Self::EastMoney => "eastmoney",
        }
    }

    /// Providers that work without an API credential (IP-throttled public
    /// endpoints).
    #[must_use]
    pub fn is_keyless(self) -> bool {
        matches!(self, Self::Sina | Self::EastMoney)
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for ProviderKind {
    type Err = ParseTagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "finnhub" => Ok(Self::Finnhub),
            "alphavantage" => Ok(Self::AlphaVantage),
            "twelvedata" => Ok(Self::TwelveData),
            "tiingo" => Ok(Self::Tiingo),
            "sina" => Ok(Self::Sina),
            "eastmoney" => Ok(Self::EastMoney),
            _ => Err(ParseTagError::new("provider", s)),
        }
    }
}

/// Coarse tag of a symbol's venue, governing which providers can serve it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Market {
    Us,
    Sh,
    Sz,
    Bj,
    Hk,
    Unknown,
}

impl Market {
    pub const ALL: [Self; 6] = [
        Self::Us,
        Self::Sh,
        Self::Sz,
        Self::Bj,
        Self::Hk,
        Self::Unknown,
    ];

    #[must_use]
    pub fn tag(self) -> &'static str {
        match self {
            Self::Us => "US",
            Self::Sh => "SH",
            Self::Sz => "SZ",
            Self::Bj => "BJ",
            Self::Hk => "HK",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for Market {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for Market {
    type Err = ParseTagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "US" => Ok(Self::Us),
            "SH" => Ok(Self::Sh),
            "SZ" => Ok(Self::Sz),
            "BJ" => Ok(Self::Bj),
            "HK" => Ok(Self::Hk),
            "UNKNOWN" => Ok(Self::Unknown),
            _ => Err(ParseTagError::new("market", s)),
        }
    }
}

/// Canonical data operations the gateway can dispatch.
///
/// Tool aliases collapse onto one tag here (`get_quote` and `get_stock_quote`
/// are both [`Operation::Quote`]); the facade is the only layer that knows
/// tool names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Quote,
    Candles,
    DailyPrices,
    News,
    CompanyOverview,
    BasicFinancials,
    CompanyMetrics,
    IncomeStatement,
    BalanceSheet,
    CashFlow,
    TechnicalIndicator,
}

impl Operation {
    pub const ALL: [Self; 11] = [
        Self::Quote,
        Self::Candles,
        Self::DailyPrices,
        Self::News,
        Self::CompanyOverview,
        Self::BasicFinancials,
        Self::CompanyMetrics,
        Self::IncomeStatement,
        Self::BalanceSheet,
        Self::CashFlow,
        Self::TechnicalIndicator,
    ];

    #[must_use]
    pub fn tag(self) -> &'static str {
        match self {
            Self::Quote => "quote",
            Self::Candles => "candles",
            Self::DailyPrices => "daily_prices",
            Self::News => "news",
            Self::CompanyOverview => "company_overview",
            Self::BasicFinancials => "basic_financials",
            Self::CompanyMetrics => "company_metrics",
            Self::IncomeStatement => "income_statement",
            Self::BalanceSheet => "balance_sheet",
            Self::CashFlow => "cash_flow",
            Self::TechnicalIndicator => "technical_indicator",
        }
    }

    /// Resolve an exposed tool name to its canonical operation.
    #[must_use]
    pub fn from_tool_name(tool: &str) -> Option<Self> {
        TOOL_NAMES
            .iter()
            .find(|(name, _)| *name == tool)
            .map(|(_, op)| *op)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Exposed tool names and the operation each resolves to.
///
/// `get_stock_quote` precedes `get_quote` so that, where a single winner is
/// needed (for example per-tool priority overrides), the canonical name wins.
pub const TOOL_NAMES: &[(&str, Operation)] = &[
    ("get_stock_quote", Operation::Quote),
    ("get_quote", Operation::Quote),
    ("get_stock_candles", Operation::Candles),
    ("get_daily_prices", Operation::DailyPrices),
    ("get_news", Operation::News),
    ("get_company_overview", Operation::CompanyOverview),
    ("get_company_basic_financials", Operation::BasicFinancials),
    ("get_company_metrics", Operation::CompanyMetrics),
    ("get_income_statement", Operation::IncomeStatement),
    ("get_balance_sheet", Operation::BalanceSheet),
    ("get_cash_flow", Operation::CashFlow),
    ("get_technical_indicator", Operation::TechnicalIndicator),
];
