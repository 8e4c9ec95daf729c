//! The tool facade: the only layer that knows tool names and argument
//! shapes. Validates input, binds an executor, hands it to the dispatcher,
//! and returns the bare record for the transport envelope.

use {chrono::NaiveDate, serde::Serialize, tracing::debug};

use {
    finmux_common::Operation,
    finmux_providers::{CandleQuery, IndicatorQuery, NewsQuery, OutputSize, StatementKind},
};

use crate::{context::GatewayContext, error::GatewayError};

const DEFAULT_RESOLUTION: &str = "D";
const DEFAULT_CANDLE_RANGE_DAYS: i64 = 365;
const DEFAULT_INDICATOR_INTERVAL: &str = "daily";
const DEFAULT_INDICATOR_PERIOD: u32 = 14;

/// Invoke one tool by its exposed name.
pub async fn call_tool(
    ctx: &GatewayContext,
    name: &str,
    arguments: &serde_json::Value,
) -> Result<serde_json::Value, GatewayError> {
    let operation = Operation::from_tool_name(name)
        .ok_or_else(|| GatewayError::UnknownTool(name.to_string()))?;
    let symbol = require_str(arguments, "symbol")?;
    debug!(tool = %name, operation = %operation, symbol = %symbol, "tool call");

    let dispatcher = &ctx.dispatcher;
    match operation {
        Operation::Quote => {
            let sym = symbol.clone();
            let outcome = dispatcher
                .dispatch(operation, Some(&symbol), move |handle, key| {
                    let symbol = sym.clone();
                    async move { handle.adapter.quote(&key, &symbol).await }
                })
                .await
                .map_err(|e| GatewayError::from_dispatch(name, e))?;
            to_json(&outcome.data)
        },
        Operation::Candles => {
            let to = match optional_str(arguments, "to") {
                Some(to) => parse_date("to", &to)?,
                None => chrono::Utc::now().date_naive(),
            };
            let from = match optional_str(arguments, "from") {
                Some(from) => parse_date("from", &from)?,
                None => to - chrono::Duration::days(DEFAULT_CANDLE_RANGE_DAYS),
            };
            if from > to {
                return Err(GatewayError::invalid_argument("from is after to"));
            }
            let query = CandleQuery {
                symbol: symbol.clone(),
                resolution: optional_str(arguments, "resolution")
                    .unwrap_or_else(|| DEFAULT_RESOLUTION.to_string()),
                from: from.format("%Y-%m-%d").to_string(),
                to: to.format("%Y-%m-%d").to_string(),
            };
            let outcome = dispatcher
                .dispatch(operation, Some(&symbol), move |handle, key| {
                    let query = query.clone();
                    async move { handle.adapter.candles(&key, &query).await }
                })
                .await
                .map_err(|e| GatewayError::from_dispatch(name, e))?;
            to_json(&outcome.data)
        },
        Operation::DailyPrices => {
            let size = match optional_str(arguments, "outputsize").as_deref() {
                None => OutputSize::Compact,
                Some("compact") => OutputSize::Compact,
                Some("full") => OutputSize::Full,
                Some(other) => {
                    return Err(GatewayError::invalid_argument(format!(
                        "outputsize must be compact or full, got {other:?}"
                    )));
                },
            };
            let sym = symbol.clone();
            let outcome = dispatcher
                .dispatch(operation, Some(&symbol), move |handle, key| {
                    let symbol = sym.clone();
                    async move { handle.adapter.daily_prices(&key, &symbol, size).await }
                })
                .await
                .map_err(|e| GatewayError::from_dispatch(name, e))?;
            to_json(&outcome.data)
        },
        Operation::News => {
            let query = NewsQuery {
                symbol: symbol.clone(),
                category: optional_str(arguments, "category"),
                min_id: optional_i64(arguments, "minId")?,
            };
            let outcome = dispatcher
                .dispatch(operation, Some(&symbol), move |handle, key| {
                    let query = query.clone();
                    async move { handle.adapter.news(&key, &query).await }
                })
                .await
                .map_err(|e| GatewayError::from_dispatch(name, e))?;
            to_json(&outcome.data)
        },
        Operation::CompanyOverview => {
            let sym = symbol.clone();
            let outcome = dispatcher
                .dispatch(operation, Some(&symbol), move |handle, key| {
                    let symbol = sym.clone();
                    async move { handle.adapter.company_overview(&key, &symbol).await }
                })
                .await
                .map_err(|e| GatewayError::from_dispatch(name, e))?;
            to_json(&outcome.data)
        },
        Operation::BasicFinancials => {
            let sym = symbol.clone();
            let outcome = dispatcher
                .dispatch(operation, Some(&symbol), move |handle, key| {
                    let symbol = sym.clone();
                    async move { handle.adapter.basic_financials(&key, &symbol).await }
                })
                .await
                .map_err(|e| GatewayError::from_dispatch(name, e))?;
            to_json(&outcome.data)
        },
        Operation::CompanyMetrics => {
            let metric_type = optional_str(arguments, "metricType");
            let sym = symbol.clone();
            let outcome = dispatcher
                .dispatch(operation, Some(&symbol), move |handle, key| {
                    let symbol = sym.clone();
                    let metric_type = metric_type.clone();
                    async move {
                        handle
                            .adapter
                            .company_metrics(&key, &symbol, metric_type.as_deref())
                            .await
                    }
                })
                .await
                .map_err(|e| GatewayError::from_dispatch(name, e))?;
            to_json(&outcome.data)
        },
        Operation::IncomeStatement | Operation::BalanceSheet | Operation::CashFlow => {
            let kind = match operation {
                Operation::IncomeStatement => StatementKind::Income,
                Operation::BalanceSheet => StatementKind::Balance,
                _ => StatementKind::CashFlow,
            };
            let sym = symbol.clone();
            let outcome = dispatcher
                .dispatch(operation, Some(&symbol), move |handle, key| {
                    let symbol = sym.clone();
                    async move {
                        handle.adapter.financial_statement(&key, &symbol, kind).await
                    }
                })
                .await
                .map_err(|e| GatewayError::from_dispatch(name, e))?;
            to_json(&outcome.data)
        },
        Operation::TechnicalIndicator => {
            let indicator = require_str(arguments, "indicator")?;
            let interval = optional_str(arguments, "interval")
                .unwrap_or_else(|| DEFAULT_INDICATOR_INTERVAL.to_string());
            if !matches!(interval.as_str(), "daily" | "weekly" | "monthly") {
                return Err(GatewayError::invalid_argument(format!(
                    "interval must be daily, weekly or monthly, got {interval:?}"
                )));
            }
            let time_period = optional_u32(arguments, "time_period")?
                .unwrap_or(DEFAULT_INDICATOR_PERIOD);
            if time_period == 0 {
                return Err(GatewayError::invalid_argument("time_period must be positive"));
            }
            let query = IndicatorQuery {
                symbol: symbol.clone(),
                indicator,
                interval,
                time_period,
            };
            let outcome = dispatcher
                .dispatch(operation, Some(&symbol), move |handle, key| {
                    let query = query.clone();
                    async move { handle.adapter.technical_indicator(&key, &query).await }
                })
                .await
                .map_err(|e| GatewayError::from_dispatch(name, e))?;
            to_json(&outcome.data)
        },
    }
}

fn require_str(args: &serde_json::Value, field: &str) -> Result<String, GatewayError> {
    match args.get(field).and_then(|v| v.as_str()) {
        Some(value) if !value.is_empty() => Ok(value.to_string()),
        Some(_) => Err(GatewayError::invalid_argument(format!(
            "{field} must not be empty"
        ))),
        None => Err(GatewayError::invalid_argument(format!(
            "missing required argument: {field}"
        ))),
    }
}

fn optional_str(args: &serde_json::Value, field: &str) -> Option<String> {
    args.get(field)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
}

/// Arguments arrive string-typed from JSON, but be liberal about numbers.
fn optional_i64(args: &serde_json::Value, field: &str) -> Result<Option<i64>, GatewayError> {
    match args.get(field) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::Number(n)) => Ok(n.as_i64()),
        Some(serde_json::Value::String(s)) if s.is_empty() => Ok(None),
        Some(serde_json::Value::String(s)) => s.parse().map(Some).map_err(|_| {
            GatewayError::invalid_argument(format!("{field} must be an integer, got {s:?}"))
        }),
        Some(_) => Err(GatewayError::invalid_argument(format!(
            "{field} must be an integer"
        ))),
    }
}

fn optional_u32(args: &serde_json::Value, field: &str) -> Result<Option<u32>, GatewayError> {
    optional_i64(args, field)?
        .map(|n| {
            u32::try_from(n).map_err(|_| {
                GatewayError::invalid_argument(format!("{field} must be a positive integer"))
            })
        })
        .transpose()
}

fn parse_date(field: &str, value: &str) -> Result<NaiveDate, GatewayError> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|_| {
        GatewayError::invalid_argument(format!("{field} must be YYYY-MM-DD, got {value:?}"))
    })
}

fn to_json<T: Serialize>(value: &T) -> Result<serde_json::Value, GatewayError> {
    serde_json::to_value(value).map_err(|e| GatewayError::Internal(e.to_string()))
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use std::{collections::BTreeMap, sync::Arc, time::Duration};

    use {async_trait::async_trait, secrecy::Secret};

    use {
        finmux_common::ProviderKind,
        finmux_config::Settings,
        finmux_dispatch::{
            CircuitBreaker, KeyPool, ProviderHandle, ProviderRegistry,
        },
        finmux_providers::{
            Financials, ProviderAdapter, Quote, StatementKind, UpstreamError,
        },
    };

    use super::*;

    struct FixedAdapter {
        kind: ProviderKind,
        operations: &'static [Operation],
    }

    #[async_trait]
    impl ProviderAdapter for FixedAdapter {
        fn kind(&self) -> ProviderKind {
            self.kind
        }

        fn operations(&self) -> &'static [Operation] {
            self.operations
        }

        async fn quote(&self, _key: &str, symbol: &str) -> Result<Quote, UpstreamError> {
            Ok(Quote {
                symbol: symbol.to_string(),
                current: 227.5,
                change: 2.25,
                percent_change: 1.0,
                day_high: 229.0,
                day_low: 225.1,
                day_open: 226.0,
                prev_close: 225.25,
            })
        }

        async fn financial_statement(
            &self,
            _key: &str,
            symbol: &str,
            kind: StatementKind,
        ) -> Result<Financials, UpstreamError> {
            let mut financials = Financials::empty(symbol);
            let lines: BTreeMap<String, f64> = [("totalRevenue".to_string(), 1.0)].into();
            match kind {
                StatementKind::Income => financials.income = Some(lines),
                StatementKind::Balance => financials.balance = Some(lines),
                StatementKind::CashFlow => financials.cash_flow = Some(lines),
            }
            Ok(financials)
        }
    }

    fn context_for(kind: ProviderKind, operations: &'static [Operation]) -> GatewayContext {
        let settings = Settings::default();
        let adapter = Arc::new(FixedAdapter { kind, operations });
        let handle = ProviderHandle::new(
            adapter,
            KeyPool::new(vec![Secret::new("k".into())], &settings.rotation).unwrap(),
            CircuitBreaker::new(settings.breaker.clone()),
            Duration::from_secs(30),
        );
        GatewayContext::with_registry(
            settings,
            Arc::new(ProviderRegistry::with_handles(vec![handle])),
        )
    }

    const QUOTE_OPS: &[Operation] = &[Operation::Quote];
    const STATEMENT_OPS: &[Operation] = &[Operation::IncomeStatement];

    fn context(operations: &'static [Operation]) -> GatewayContext {
        context_for(ProviderKind::Finnhub, operations)
    }

    #[tokio::test]
    async fn quote_round_trips_through_the_facade() {
        let ctx = context(QUOTE_OPS);
        let args = serde_json::json!({"symbol": "AAPL"});
        let value = call_tool(&ctx, "get_stock_quote", &args).await.unwrap();
        assert_eq!(value["symbol"], "AAPL");
        assert_eq!(value["current"], 227.5);
    }

    #[tokio::test]
    async fn quote_alias_resolves_to_same_operation() {
        let ctx = context(QUOTE_OPS);
        let args = serde_json::json!({"symbol": "AAPL"});
        let value = call_tool(&ctx, "get_quote", &args).await.unwrap();
        assert_eq!(value["symbol"], "AAPL");
    }

    #[tokio::test]
    async fn missing_symbol_is_an_invalid_argument() {
        let ctx = context(QUOTE_OPS);
        let err = call_tool(&ctx, "get_stock_quote", &serde_json::json!({}))
            .await
            .unwrap_err();
        match err {
            GatewayError::InvalidArgument(msg) => assert!(msg.contains("symbol")),
            other => panic!("expected invalid argument, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_symbol_is_rejected() {
        let ctx = context(QUOTE_OPS);
        let err = call_tool(&ctx, "get_stock_quote", &serde_json::json!({"symbol": ""}))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn unknown_tool_is_reported_by_name() {
        let ctx = context(QUOTE_OPS);
        let err = call_tool(&ctx, "get_weather", &serde_json::json!({"symbol": "AAPL"}))
            .await
            .unwrap_err();
        match err {
            GatewayError::UnknownTool(name) => assert_eq!(name, "get_weather"),
            other => panic!("expected unknown tool, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn bad_outputsize_enum_is_rejected() {
        let ctx = context(QUOTE_OPS);
        let args = serde_json::json!({"symbol": "AAPL", "outputsize": "huge"});
        let err = call_tool(&ctx, "get_daily_prices", &args).await.unwrap_err();
        assert!(matches!(err, GatewayError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn bad_candle_date_is_rejected() {
        let ctx = context(QUOTE_OPS);
        let args = serde_json::json!({"symbol": "AAPL", "from": "01/02/2024"});
        let err = call_tool(&ctx, "get_stock_candles", &args).await.unwrap_err();
        assert!(matches!(err, GatewayError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn indicator_requires_its_name() {
        let ctx = context(QUOTE_OPS);
        let args = serde_json::json!({"symbol": "AAPL"});
        let err = call_tool(&ctx, "get_technical_indicator", &args)
            .await
            .unwrap_err();
        match err {
            GatewayError::InvalidArgument(msg) => assert!(msg.contains("indicator")),
            other => panic!("expected invalid argument, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn no_capable_provider_is_service_unavailable() {
        // Registry only speaks quotes; income statements have no candidate.
        let ctx = context(QUOTE_OPS);
        let args = serde_json::json!({"symbol": "AAPL"});
        let err = call_tool(&ctx, "get_income_statement", &args).await.unwrap_err();
        match err {
            GatewayError::ServiceUnavailable { tool, .. } => {
                assert_eq!(tool, "get_income_statement");
            },
            other => panic!("expected service unavailable, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn statement_tool_reaches_the_statement_handler() {
        let ctx = context_for(ProviderKind::AlphaVantage, STATEMENT_OPS);
        let args = serde_json::json!({"symbol": "AAPL"});
        let value = call_tool(&ctx, "get_income_statement", &args).await.unwrap();
        assert_eq!(value["income"]["totalRevenue"], 1.0);
        assert!(value.get("balance").is_none());
    }
}
