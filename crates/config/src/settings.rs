use std::{
    collections::{HashMap, HashSet},
    time::Duration,
};

use {secrecy::Secret, tracing::warn};

use finmux_common::{Market, Operation, ProviderKind, TOOL_NAMES};

const DEFAULT_UPSTREAM_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_REQUEST_DEADLINE_MS: u64 = 30_000;

/// Same-provider retry envelope around a single upstream call.
#[derive(Debug, Clone)]
pub struct RetrySettings {
    pub enabled: bool,
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            enabled: false,
            max_attempts: 3,
            initial_delay_ms: 500,
            max_delay_ms: 5_000,
        }
    }
}

/// Per-provider circuit breaker tuning.
#[derive(Debug, Clone)]
pub struct CircuitBreakerSettings {
    pub enabled: bool,
    pub failure_threshold: u32,
    pub timeout_ms: u64,
    pub half_open_max_attempts: u32,
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            failure_threshold: 5,
            timeout_ms: 60_000,
            half_open_max_attempts: 1,
        }
    }
}

/// Cooldown behavior for rate-limited keys.
#[derive(Debug, Clone)]
pub struct KeyRotationSettings {
    pub enabled: bool,
    pub reset_window_ms: u64,
}

impl Default for KeyRotationSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            reset_window_ms: 60_000,
        }
    }
}

/// Process-wide gateway configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Credential pools per provider. Key-less providers never appear here.
    pub keys: HashMap<ProviderKind, Vec<Secret<String>>>,
    pub failover_enabled: bool,
    pub primary_source: Option<ProviderKind>,
    pub secondary_source: Option<ProviderKind>,
    pub retry: RetrySettings,
    pub upstream_timeout_ms: u64,
    pub provider_timeout_ms: HashMap<ProviderKind, u64>,
    pub request_deadline_ms: u64,
    pub breaker: CircuitBreakerSettings,
    pub rotation: KeyRotationSettings,
    pub source_priority: HashMap<Operation, Vec<ProviderKind>>,
    pub market_sources: HashMap<Market, Vec<ProviderKind>>,
    pub log_level: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            keys: HashMap::new(),
            failover_enabled: true,
            primary_source: None,
            secondary_source: None,
            retry: RetrySettings::default(),
            upstream_timeout_ms: DEFAULT_UPSTREAM_TIMEOUT_MS,
            provider_timeout_ms: HashMap::new(),
            request_deadline_ms: DEFAULT_REQUEST_DEADLINE_MS,
            breaker: CircuitBreakerSettings::default(),
            rotation: KeyRotationSettings::default(),
            source_priority: HashMap::new(),
            market_sources: HashMap::new(),
            log_level: "info".into(),
        }
    }
}

impl Settings {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build settings from an arbitrary variable lookup.
    ///
    /// Recognized variables: `<PROVIDER>_API_KEY` (comma-separated pools),
    /// `API_FAILOVER_ENABLED`, `PRIMARY_API_SOURCE`, `SECONDARY_API_SOURCE`,
    /// `RETRY_ENABLED`, `RETRY_MAX_ATTEMPTS`, `RETRY_INITIAL_DELAY_MS`,
    /// `RETRY_MAX_DELAY_MS`, `API_TIMEOUT_MS`, `FINNHUB_TIMEOUT_MS`,
    /// `ALPHAVANTAGE_TIMEOUT_MS`, `CIRCUIT_BREAKER_*`, `KEY_ROTATION_*`,
    /// `SOURCE_PRIORITY_<TOOL_NAME>`, `MARKET_SOURCES_<MARKET>`, `LOG_LEVEL`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut keys = HashMap::new();
        for kind in ProviderKind::ALL {
            if kind.is_keyless() {
                continue;
            }
            let var = format!("{}_API_KEY", kind.tag().to_ascii_uppercase());
            let pool = lookup(&var).map(|raw| split_credentials(&raw)).unwrap_or_default();
            if !pool.is_empty() {
                keys.insert(kind, pool);
            }
        }

        let retry = RetrySettings {
            enabled: bool_var(&lookup, "RETRY_ENABLED", RetrySettings::default().enabled),
            max_attempts: num_var(&lookup, "RETRY_MAX_ATTEMPTS", 3),
            initial_delay_ms: num_var(&lookup, "RETRY_INITIAL_DELAY_MS", 500),
            max_delay_ms: num_var(&lookup, "RETRY_MAX_DELAY_MS", 5_000),
        };

        let breaker = CircuitBreakerSettings {
            enabled: bool_var(&lookup, "CIRCUIT_BREAKER_ENABLED", true),
            failure_threshold: num_var(&lookup, "CIRCUIT_BREAKER_FAILURE_THRESHOLD", 5).max(1),
            timeout_ms: num_var(&lookup, "CIRCUIT_BREAKER_TIMEOUT_MS", 60_000),
            half_open_max_attempts: num_var(&lookup, "CIRCUIT_BREAKER_HALF_OPEN_ATTEMPTS", 1)
                .max(1),
        };

        let rotation = KeyRotationSettings {
            enabled: bool_var(&lookup, "KEY_ROTATION_ENABLED", true),
            reset_window_ms: num_var(&lookup, "KEY_ROTATION_RESET_WINDOW_MS", 60_000),
        };

        let mut provider_timeout_ms = HashMap::new();
        for (kind, var) in [
            (ProviderKind::Finnhub, "FINNHUB_TIMEOUT_MS"),
            (ProviderKind::AlphaVantage, "ALPHAVANTAGE_TIMEOUT_MS"),
        ] {
            if let Some(ms) = lookup(var).and_then(|v| v.trim().parse::<u64>().ok()) {
                provider_timeout_ms.insert(kind, ms);
            }
        }

        let mut source_priority = HashMap::new();
        for (tool, op) in TOOL_NAMES {
            let var = format!("SOURCE_PRIORITY_{}", tool.to_ascii_uppercase());
            if let Some(raw) = lookup(&var) {
                let list = parse_provider_list(&raw, &var);
                if !list.is_empty() {
                    source_priority.entry(*op).or_insert(list);
                }
            }
        }

        let mut market_sources = HashMap::new();
        for market in Market::ALL {
            let var = format!("MARKET_SOURCES_{}", market.tag());
            if let Some(raw) = lookup(&var) {
                let list = parse_provider_list(&raw, &var);
                if !list.is_empty() {
                    market_sources.insert(market, list);
                }
            }
        }

        Self {
            keys,
            failover_enabled: bool_var(&lookup, "API_FAILOVER_ENABLED", true),
            primary_source: provider_var(&lookup, "PRIMARY_API_SOURCE"),
            secondary_source: provider_var(&lookup, "SECONDARY_API_SOURCE"),
            retry,
            upstream_timeout_ms: num_var(&lookup, "API_TIMEOUT_MS", DEFAULT_UPSTREAM_TIMEOUT_MS),
            provider_timeout_ms,
            request_deadline_ms: DEFAULT_REQUEST_DEADLINE_MS,
            breaker,
            rotation,
            source_priority,
            market_sources,
            log_level: lookup("LOG_LEVEL")
                .map(|l| l.trim().to_ascii_lowercase())
                .filter(|l| !l.is_empty())
                .unwrap_or_else(|| "info".into()),
        }
    }

    /// Whether a provider can be dispatched to at all: key-less providers
    /// always, keyed providers only when at least one credential is set.
    #[must_use]
    pub fn is_provider_available(&self, kind: ProviderKind) -> bool {
        kind.is_keyless() || self.keys.get(&kind).is_some_and(|pool| !pool.is_empty())
    }

    #[must_use]
    pub fn available_providers(&self) -> HashSet<ProviderKind> {
        ProviderKind::ALL
            .into_iter()
            .filter(|kind| self.is_provider_available(*kind))
            .collect()
    }

    /// Timeout for one upstream call to the given provider.
    #[must_use]
    pub fn timeout_for(&self, kind: ProviderKind) -> Duration {
        let ms = self
            .provider_timeout_ms
            .get(&kind)
            .copied()
            .unwrap_or(self.upstream_timeout_ms);
        Duration::from_millis(ms)
    }

    /// Overall deadline for one gateway request (the whole cascade).
    #[must_use]
    pub fn request_deadline(&self) -> Duration {
        Duration::from_millis(self.request_deadline_ms)
    }
}

fn split_credentials(raw: &str) -> Vec<Secret<String>> {
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| Secret::new(part.to_string()))
        .collect()
}

fn parse_provider_list(raw: &str, var: &str) -> Vec<ProviderKind> {
    let mut seen = HashSet::new();
    let mut list = Vec::new();
    for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        match part.parse::<ProviderKind>() {
            Ok(kind) => {
                if seen.insert(kind) {
                    list.push(kind);
                }
            },
            Err(_) => warn!(var = %var, tag = %part, "ignoring unknown provider tag"),
        }
    }
    list
}

fn bool_var(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: bool) -> bool {
    match lookup(name) {
        Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => {
                warn!(var = %name, value = %raw, "unrecognized boolean, using default");
                default
            },
        },
        None => default,
    }
}

fn num_var<T: std::str::FromStr + Copy>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    default: T,
) -> T {
    lookup(name)
        .and_then(|raw| raw.trim().parse().ok())
        .unwrap_or(default)
}

fn provider_var(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
) -> Option<ProviderKind> {
    let raw = lookup(name)?;
    match raw.parse() {
        Ok(kind) => Some(kind),
        Err(_) => {
            warn!(var = %name, value = %raw, "ignoring unknown provider tag");
            None
        },
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use secrecy::ExposeSecret;

    use super::*;

    fn settings_from(vars: &[(&str, &str)]) -> Settings {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|name| map.get(name).cloned())
    }

    #[test]
    fn defaults_without_environment() {
        let s = settings_from(&[]);
        assert!(s.failover_enabled);
        assert!(!s.retry.enabled);
        assert!(s.breaker.enabled);
        assert_eq!(s.breaker.failure_threshold, 5);
        assert_eq!(s.upstream_timeout_ms, 30_000);
        assert_eq!(s.log_level, "info");
        assert!(s.keys.is_empty());
    }

    #[test]
    fn keyless_providers_are_always_available() {
        let s = settings_from(&[]);
        assert!(s.is_provider_available(ProviderKind::Sina));
        assert!(s.is_provider_available(ProviderKind::EastMoney));
        assert!(!s.is_provider_available(ProviderKind::Finnhub));
    }

    #[test]
    fn credential_pools_split_on_commas() {
        let s = settings_from(&[("FINNHUB_API_KEY", "one, two ,, three ")]);
        let pool = &s.keys[&ProviderKind::Finnhub];
        let values: Vec<&str> = pool.iter().map(|k| k.expose_secret().as_str()).collect();
        assert_eq!(values, vec!["one", "two", "three"]);
    }

    #[test]
    fn blank_credential_leaves_provider_unavailable() {
        let s = settings_from(&[("TIINGO_API_KEY", " , ")]);
        assert!(!s.is_provider_available(ProviderKind::Tiingo));
    }

    #[test]
    fn provider_timeout_overrides() {
        let s = settings_from(&[
            ("API_TIMEOUT_MS", "10000"),
            ("FINNHUB_TIMEOUT_MS", "2500"),
        ]);
        assert_eq!(s.timeout_for(ProviderKind::Finnhub), Duration::from_millis(2500));
        assert_eq!(
            s.timeout_for(ProviderKind::TwelveData),
            Duration::from_millis(10_000)
        );
    }

    #[test]
    fn source_priority_ignores_unknown_tags() {
        let s = settings_from(&[(
            "SOURCE_PRIORITY_GET_STOCK_QUOTE",
            "tiingo, bloomberg, finnhub",
        )]);
        assert_eq!(
            s.source_priority[&Operation::Quote],
            vec![ProviderKind::Tiingo, ProviderKind::Finnhub]
        );
    }

    #[test]
    fn canonical_quote_tool_wins_priority_conflict() {
        let s = settings_from(&[
            ("SOURCE_PRIORITY_GET_STOCK_QUOTE", "tiingo"),
            ("SOURCE_PRIORITY_GET_QUOTE", "finnhub"),
        ]);
        assert_eq!(s.source_priority[&Operation::Quote], vec![ProviderKind::Tiingo]);
    }

    #[test]
    fn market_source_overrides_parse() {
        let s = settings_from(&[("MARKET_SOURCES_HK", "eastmoney,sina")]);
        assert_eq!(
            s.market_sources[&Market::Hk],
            vec![ProviderKind::EastMoney, ProviderKind::Sina]
        );
    }

    #[test]
    fn failover_toggle_parses() {
        assert!(!settings_from(&[("API_FAILOVER_ENABLED", "false")]).failover_enabled);
        assert!(settings_from(&[("API_FAILOVER_ENABLED", "maybe")]).failover_enabled);
    }

    #[test]
    fn legacy_source_overrides_parse() {
        let s = settings_from(&[
            ("PRIMARY_API_SOURCE", "twelvedata"),
            ("SECONDARY_API_SOURCE", "nasdaq"),
        ]);
        assert_eq!(s.primary_source, Some(ProviderKind::TwelveData));
        assert_eq!(s.secondary_source, None);
    }
}
