//! Process-wide provider registry: adapter + key pool + circuit breaker per
//! provider, built once from settings.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::Duration,
};

use tracing::info;

use {
    finmux_common::{Operation, ProviderKind},
    finmux_config::Settings,
    finmux_providers::{
        AlphaVantageAdapter, EastMoneyAdapter, FinnhubAdapter, ProviderAdapter, SinaAdapter,
        TiingoAdapter, TwelveDataAdapter,
    },
};

use crate::{circuit::CircuitBreaker, key_pool::KeyPool};

/// Everything the dispatcher needs to drive one provider.
pub struct ProviderHandle {
    pub kind: ProviderKind,
    pub adapter: Arc<dyn ProviderAdapter>,
    pub keys: KeyPool,
    pub breaker: CircuitBreaker,
    pub timeout: Duration,
}

impl ProviderHandle {
    #[must_use]
    pub fn new(
        adapter: Arc<dyn ProviderAdapter>,
        keys: KeyPool,
        breaker: CircuitBreaker,
        timeout: Duration,
    ) -> Self {
        Self {
            kind: adapter.kind(),
            adapter,
            keys,
            breaker,
            timeout,
        }
    }
}

/// All configured providers, immutable after startup (the mutable state
/// lives inside each handle's pool and breaker).
pub struct ProviderRegistry {
    handles: HashMap<ProviderKind, Arc<ProviderHandle>>,
}

impl ProviderRegistry {
    /// Build handles for every provider the settings make available.
    #[must_use]
    pub fn from_settings(settings: &Settings) -> Self {
        let mut handles = Vec::new();
        for kind in ProviderKind::ALL {
            if !settings.is_provider_available(kind) {
                continue;
            }
            let adapter: Arc<dyn ProviderAdapter> = match kind {
                ProviderKind::Finnhub => Arc::new(FinnhubAdapter::new()),
                ProviderKind::AlphaVantage => Arc::new(AlphaVantageAdapter::new()),
                ProviderKind::TwelveData => Arc::new(TwelveDataAdapter::new()),
                ProviderKind::Tiingo => Arc::new(TiingoAdapter::new()),
                ProviderKind::Sina => Arc::new(SinaAdapter::new()),
                ProviderKind::EastMoney => Arc::new(EastMoneyAdapter::new()),
            };
            let keys = if kind.is_keyless() {
                KeyPool::keyless()
            } else {
                let Some(pool) = KeyPool::new(
                    settings.keys.get(&kind).cloned().unwrap_or_default(),
                    &settings.rotation,
                ) else {
                    continue;
                };
                pool
            };
            info!(provider = %kind, keys = keys.len(), "provider configured");
            handles.push(ProviderHandle::new(
                adapter,
                keys,
                CircuitBreaker::new(settings.breaker.clone()),
                settings.timeout_for(kind),
            ));
        }
        Self::with_handles(handles)
    }

    #[must_use]
    pub fn with_handles(handles: Vec<ProviderHandle>) -> Self {
        Self {
            handles: handles
                .into_iter()
                .map(|handle| (handle.kind, Arc::new(handle)))
                .collect(),
        }
    }

    #[must_use]
    pub fn get(&self, kind: ProviderKind) -> Option<Arc<ProviderHandle>> {
        self.handles.get(&kind).cloned()
    }

    /// Capability map for the router.
    #[must_use]
    pub fn capabilities(&self) -> HashMap<ProviderKind, Vec<Operation>> {
        self.handles
            .iter()
            .map(|(kind, handle)| (*kind, handle.adapter.operations().to_vec()))
            .collect()
    }

    /// Providers with a usable configuration.
    #[must_use]
    pub fn kinds(&self) -> HashSet<ProviderKind> {
        self.handles.keys().copied().collect()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}
