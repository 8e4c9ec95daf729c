//! Process-wide gateway context, constructed once at startup.

use std::sync::Arc;

use {
    finmux_config::Settings,
    finmux_dispatch::{Dispatcher, ProviderRegistry},
    finmux_routing::SourceRouter,
};

/// Everything a request handler needs: settings, provider registry, router
/// and dispatcher. Passed `Arc`-ed through the stack instead of living in
/// globals, so tests can build isolated instances.
pub struct GatewayContext {
    pub settings: Arc<Settings>,
    pub dispatcher: Dispatcher,
}

impl GatewayContext {
    #[must_use]
    pub fn new(settings: Settings) -> Self {
        let registry = Arc::new(ProviderRegistry::from_settings(&settings));
        Self::with_registry(settings, registry)
    }

    /// Build on a caller-supplied registry (tests inject scripted adapters).
    #[must_use]
    pub fn with_registry(settings: Settings, registry: Arc<ProviderRegistry>) -> Self {
        let router = SourceRouter::new(&settings, registry.capabilities(), registry.kinds());
        let dispatcher = Dispatcher::new(registry, router, &settings);
        Self {
            settings: Arc::new(settings),
            dispatcher,
        }
    }
}
