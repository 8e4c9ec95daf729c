//! East Money adapter (`push2.eastmoney.com` quotes, `push2his` k-lines).
//!
//! Public IP-throttled endpoints covering the Chinese and Hong Kong markets.
//! Prices arrive pre-scaled floats (`fltt=2`), k-lines as comma-joined rows.

use std::collections::BTreeMap;

use {async_trait::async_trait, tracing::debug};

use {
    finmux_common::{Market, Operation, ProviderKind},
    finmux_routing::classify_symbol,
};

use crate::{
    ProviderAdapter, UpstreamError, loose_f64, pacing::Pacer, read_json,
    records::{Candle, CandleQuery, OutputSize, Quote},
    shared_http_client,
};

const DEFAULT_QUOTE_BASE_URL: &str = "https://push2.eastmoney.com";
const DEFAULT_HISTORY_BASE_URL: &str = "https://push2his.eastmoney.com";
const REFERER: &str = "https://quote.eastmoney.com/";

const QUOTE_FIELDS: &str = "f43,f44,f45,f46,f57,f58,f60,f169,f170";
const KLINE_FIELDS1: &str = "f1,f2,f3,f4,f5,f6";
const KLINE_FIELDS2: &str = "f51,f52,f53,f54,f55,f56,f57,f58";

const COMPACT_LOOKBACK_DAYS: i64 = 140;

const OPERATIONS: &[Operation] = &[Operation::Quote, Operation::Candles, Operation::DailyPrices];

pub struct EastMoneyAdapter {
    quote_base_url: String,
    history_base_url: String,
    client: reqwest::Client,
    pacer: Pacer,
}

impl EastMoneyAdapter {
    #[must_use]
    pub fn new() -> Self {
        Self::with_base_urls(DEFAULT_QUOTE_BASE_URL, DEFAULT_HISTORY_BASE_URL)
    }

    #[must_use]
    pub fn with_base_urls(
        quote_base_url: impl Into<String>,
        history_base_url: impl Into<String>,
    ) -> Self {
        Self {
            quote_base_url: quote_base_url.into(),
            history_base_url: history_base_url.into(),
            client: shared_http_client().clone(),
            pacer: Pacer::default(),
        }
    }

    async fn get(
        &self,
        operation: Operation,
        url: String,
        query: &[(&str, String)],
    ) -> Result<serde_json::Value, UpstreamError> {
        self.pacer.pace().await;
        let response = self
            .client
            .get(&url)
            .header("Referer", REFERER)
            .query(query)
            .send()
            .await
            .map_err(|e| UpstreamError::transport(ProviderKind::EastMoney, &e))?;
        read_json(ProviderKind::EastMoney, operation, response).await
    }

    async fn klines(
        &self,
        operation: Operation,
        symbol: &str,
        klt: &str,
        beg: &str,
        end: &str,
    ) -> Result<Vec<Candle>, UpstreamError> {
        let secid = secid(symbol).ok_or_else(|| unsupported_symbol(symbol))?;
        let body = self
            .get(
                operation,
                format!("{}/api/qt/stock/kline/get", self.history_base_url),
                &[
                    ("secid", secid),
                    ("klt", klt.to_string()),
                    ("fqt", "1".to_string()),
                    ("beg", beg.to_string()),
                    ("end", end.to_string()),
                    ("fields1", KLINE_FIELDS1.to_string()),
                    ("fields2", KLINE_FIELDS2.to_string()),
                ],
            )
            .await?;
        let rows = body["data"]["klines"].as_array().ok_or_else(|| {
            UpstreamError::api(
                ProviderKind::EastMoney,
                format!("no k-line data for {symbol}"),
            )
        })?;
        Ok(rows
            .iter()
            .filter_map(|row| parse_kline(row.as_str()?))
            .collect())
    }
}

impl Default for EastMoneyAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProviderAdapter for EastMoneyAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::EastMoney
    }

    fn operations(&self) -> &'static [Operation] {
        OPERATIONS
    }

    async fn quote(&self, _key: &str, symbol: &str) -> Result<Quote, UpstreamError> {
        let secid = secid(symbol).ok_or_else(|| unsupported_symbol(symbol))?;
        let body = self
            .get(
                Operation::Quote,
                format!("{}/api/qt/stock/get", self.quote_base_url),
                &[
                    ("secid", secid),
                    ("fltt", "2".to_string()),
                    ("invt", "2".to_string()),
                    ("fields", QUOTE_FIELDS.to_string()),
                ],
            )
            .await?;
        let data = &body["data"];
        if data.is_null() {
            return Err(UpstreamError::api(
                ProviderKind::EastMoney,
                format!("no quote data for {symbol}"),
            ));
        }

        let field = |name: &str| loose_f64(&data[name]).unwrap_or(0.0);
        debug!(symbol = %symbol, "eastmoney quote");
        Ok(Quote {
            symbol: symbol.to_string(),
            current: field("f43"),
            change: field("f169"),
            percent_change: field("f170"),
            day_high: field("f44"),
            day_low: field("f45"),
            day_open: field("f46"),
            prev_close: field("f60"),
        })
    }

    async fn candles(
        &self,
        _key: &str,
        query: &CandleQuery,
    ) -> Result<Vec<Candle>, UpstreamError> {
        self.klines(
            Operation::Candles,
            &query.symbol,
            resolution_to_klt(&query.resolution),
            &compact_date(&query.from),
            &compact_date(&query.to),
        )
        .await
    }

    async fn daily_prices(
        &self,
        _key: &str,
        symbol: &str,
        size: OutputSize,
    ) -> Result<BTreeMap<String, Candle>, UpstreamError> {
        let beg = match size {
            OutputSize::Compact => (chrono::Utc::now().date_naive()
                - chrono::Duration::days(COMPACT_LOOKBACK_DAYS))
            .format("%Y%m%d")
            .to_string(),
            OutputSize::Full => "19900101".to_string(),
        };
        let candles = self
            .klines(Operation::DailyPrices, symbol, "101", &beg, "20500101")
            .await?;
        Ok(candles
            .into_iter()
            .map(|candle| (candle.date.clone(), candle))
            .collect())
    }
}

/// East Money security id: `<market>.<code>`.
fn secid(symbol: &str) -> Option<String> {
    let code = symbol.split('.').next().unwrap_or(symbol);
    match classify_symbol(symbol) {
        Market::Sh => Some(format!("1.{code}")),
        Market::Sz | Market::Bj => Some(format!("0.{code}")),
        Market::Hk => Some(format!("116.{code}")),
        _ => None,
    }
}

fn unsupported_symbol(symbol: &str) -> UpstreamError {
    UpstreamError::api(
        ProviderKind::EastMoney,
        format!("unsupported symbol for eastmoney: {symbol}"),
    )
}

/// Rows are `date,open,close,high,low,volume,amount,…`.
fn parse_kline(row: &str) -> Option<Candle> {
    let mut parts = row.split(',');
    let date = parts.next()?.to_string();
    let mut num = || parts.next().and_then(|p| p.parse::<f64>().ok());
    let open = num()?;
    let close = num()?;
    let high = num()?;
    let low = num()?;
    let volume = num().unwrap_or(0.0);
    Some(Candle {
        date,
        open,
        high,
        low,
        close,
        volume,
        adj_close: None,
    })
}

fn resolution_to_klt(resolution: &str) -> &'static str {
    match resolution {
        "1" => "1",
        "5" => "5",
        "15" => "15",
        "30" => "30",
        "60" => "60",
        "W" | "w" => "102",
        "M" => "103",
        _ => "101",
    }
}

fn compact_date(date: &str) -> String {
    date.replace('-', "")
}
