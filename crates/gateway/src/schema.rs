//! Static tool catalog answered from `tools/list`.

use serde::{Deserialize, Serialize};

/// One exposed tool and its argument schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDef {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

fn tool(name: &str, description: &str, input_schema: serde_json::Value) -> ToolDef {
    ToolDef {
        name: name.into(),
        description: description.into(),
        input_schema,
    }
}

fn symbol_only() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "symbol": {"type": "string", "description": "Ticker symbol, e.g. AAPL or 601899.SH"}
        },
        "required": ["symbol"]
    })
}

/// The full catalog, in presentation order.
#[must_use]
pub fn tool_catalog() -> Vec<ToolDef> {
    vec![
        tool(
            "get_stock_quote",
            "Real-time quote for a stock symbol",
            symbol_only(),
        ),
        tool(
            "get_quote",
            "Alias of get_stock_quote",
            symbol_only(),
        ),
        tool(
            "get_stock_candles",
            "OHLCV candles for a symbol over a date range",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "symbol": {"type": "string"},
                    "resolution": {"type": "string", "description": "1, 5, 15, 30, 60, D, W or M", "default": "D"},
                    "from": {"type": "string", "description": "Range start, YYYY-MM-DD"},
                    "to": {"type": "string", "description": "Range end, YYYY-MM-DD"}
                },
                "required": ["symbol"]
            }),
        ),
        tool(
            "get_daily_prices",
            "Daily price history keyed by date",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "symbol": {"type": "string"},
                    "outputsize": {"type": "string", "enum": ["compact", "full"], "default": "compact"}
                },
                "required": ["symbol"]
            }),
        ),
        tool(
            "get_news",
            "Recent news articles for a symbol",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "symbol": {"type": "string"},
                    "category": {"type": "string"},
                    "minId": {"type": "string", "description": "Only return articles with id greater than this"}
                },
                "required": ["symbol"]
            }),
        ),
        tool(
            "get_company_overview",
            "Company profile: name, industry, market cap",
            symbol_only(),
        ),
        tool(
            "get_company_basic_financials",
            "Key financial metrics for a company",
            symbol_only(),
        ),
        tool(
            "get_company_metrics",
            "Company metric snapshot",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "symbol": {"type": "string"},
                    "metricType": {"type": "string", "default": "all"}
                },
                "required": ["symbol"]
            }),
        ),
        tool(
            "get_income_statement",
            "Latest annual income statement",
            symbol_only(),
        ),
        tool(
            "get_balance_sheet",
            "Latest annual balance sheet",
            symbol_only(),
        ),
        tool(
            "get_cash_flow",
            "Latest annual cash-flow statement",
            symbol_only(),
        ),
        tool(
            "get_technical_indicator",
            "Technical indicator series (RSI, SMA, EMA, …)",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "symbol": {"type": "string"},
                    "indicator": {"type": "string", "description": "Indicator name, e.g. RSI"},
                    "interval": {"type": "string", "enum": ["daily", "weekly", "monthly"], "default": "daily"},
                    "time_period": {"type": "string", "default": "14"}
                },
                "required": ["symbol", "indicator"]
            }),
        ),
    ]
}
