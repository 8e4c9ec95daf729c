//! Sina quote adapter (`https://hq.sinajs.cn/list=<code>`).
//!
//! The endpoint is public but IP-throttled and GBK-encoded, and it requires
//! a finance.sina.com.cn referer. Quotes only.

use {async_trait::async_trait, tracing::debug};

use {
    finmux_common::{Market, Operation, ProviderKind},
    finmux_routing::classify_symbol,
};

use crate::{
    ProviderAdapter, UpstreamError, clip, pacing::Pacer, records::Quote, shared_http_client,
};

const DEFAULT_BASE_URL: &str = "https://hq.sinajs.cn";
const REFERER: &str = "https://finance.sina.com.cn/";

const OPERATIONS: &[Operation] = &[Operation::Quote];

pub struct SinaAdapter {
    base_url: String,
    client: reqwest::Client,
    pacer: Pacer,
}

impl SinaAdapter {
    #[must_use]
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    #[must_use]
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: shared_http_client().clone(),
            pacer: Pacer::default(),
        }
    }
}

impl Default for SinaAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProviderAdapter for SinaAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Sina
    }

    fn operations(&self) -> &'static [Operation] {
        OPERATIONS
    }

    async fn quote(&self, _key: &str, symbol: &str) -> Result<Quote, UpstreamError> {
        let code = sina_code(symbol).ok_or_else(|| {
            UpstreamError::api(
                ProviderKind::Sina,
                format!("unsupported symbol for sina: {symbol}"),
            )
        })?;

        self.pacer.pace().await;
        let url = format!("{}/list={code}", self.base_url);
        let response = self
            .client
            .get(&url)
            .header("Referer", REFERER)
            .send()
            .await
            .map_err(|e| UpstreamError::transport(ProviderKind::Sina, &e))?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| UpstreamError::transport(ProviderKind::Sina, &e))?;
        let (text, _, _) = encoding_rs::GBK.decode(&bytes);
        if !status.is_success() {
            return Err(UpstreamError::http(
                ProviderKind::Sina,
                status.as_u16(),
                clip(&text),
            ));
        }

        let fields = parse_payload(&text).ok_or_else(|| {
            UpstreamError::api(
                ProviderKind::Sina,
                format!("no quote data for {symbol}"),
            )
        })?;
        debug!(symbol = %symbol, code = %code, "sina quote");
        normalize(symbol, &code, &fields)
    }
}

/// Convert a routed symbol into sina's exchange-prefixed code.
fn sina_code(symbol: &str) -> Option<String> {
    if let Some((base, suffix)) = symbol.rsplit_once('.') {
        let prefix = match suffix.to_ascii_uppercase().as_str() {
            "SH" | "SS" => "sh",
            "SZ" => "sz",
            "BJ" => "bj",
            "HK" => "hk",
            _ => return None,
        };
        return Some(format!("{prefix}{base}"));
    }
    let prefix = match classify_symbol(symbol) {
        Market::Sh => "sh",
        Market::Sz => "sz",
        Market::Bj => "bj",
        Market::Hk => "hk",
        _ => return None,
    };
    Some(format!("{prefix}{symbol}"))
}

/// Extract the comma-separated field list from `var hq_str_<code>="…";`.
fn parse_payload(text: &str) -> Option<Vec<String>> {
    let start = text.find('"')? + 1;
    let end = text.rfind('"')?;
    let inner = text.get(start..end)?;
    if inner.trim().is_empty() {
        return None;
    }
    Some(inner.split(',').map(ToString::to_string).collect())
}

fn normalize(symbol: &str, code: &str, fields: &[String]) -> Result<Quote, UpstreamError> {
    let num = |idx: usize| {
        fields
            .get(idx)
            .and_then(|raw| raw.trim().parse::<f64>().ok())
            .unwrap_or(0.0)
    };

    // Hong Kong payloads lead with two name fields and shift the price block.
    let (open, prev_close, current, high, low) = if code.starts_with("hk") {
        (num(2), num(3), num(6), num(4), num(5))
    } else {
        (num(1), num(2), num(3), num(4), num(5))
    };
    if current == 0.0 && prev_close == 0.0 {
        return Err(UpstreamError::api(
            ProviderKind::Sina,
            format!("no quote data for {symbol}"),
        ));
    }

    let change = current - prev_close;
    Ok(Quote {
        symbol: symbol.to_string(),
        current,
        change,
        percent_change: if prev_close != 0.0 {
            change / prev_close * 100.0
        } else {
            0.0
        },
        day_high: high,
        day_low: low,
        day_open: open,
        prev_close,
    })
}
