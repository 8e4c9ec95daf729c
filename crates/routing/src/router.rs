//! Ordered candidate-provider selection for one (operation, symbol) call.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use {
    finmux_common::{Market, Operation, ProviderKind},
    finmux_config::Settings,
};

use crate::market::classify_symbol;

/// Routes an operation to an ordered list of candidate providers.
///
/// Built once at startup; all tables are immutable afterwards.
pub struct SourceRouter {
    priority: HashMap<Operation, Vec<ProviderKind>>,
    coverage: HashMap<Market, Vec<ProviderKind>>,
    capabilities: HashMap<ProviderKind, Vec<Operation>>,
    available: HashSet<ProviderKind>,
}

impl SourceRouter {
    /// Build the router from settings plus the adapter capability map and the
    /// set of providers with usable credentials.
    #[must_use]
    pub fn new(
        settings: &Settings,
        capabilities: HashMap<ProviderKind, Vec<Operation>>,
        available: HashSet<ProviderKind>,
    ) -> Self {
        let mut priority = default_priority();
        for (op, list) in &settings.source_priority {
            priority.insert(*op, list.clone());
        }

        // Legacy single-source overrides jump the queue for every tool.
        let legacy: Vec<ProviderKind> = [settings.primary_source, settings.secondary_source]
            .into_iter()
            .flatten()
            .collect();
        if !legacy.is_empty() {
            for list in priority.values_mut() {
                let mut merged = legacy.clone();
                for kind in list.drain(..) {
                    if !merged.contains(&kind) {
                        merged.push(kind);
                    }
                }
                *list = merged;
            }
        }

        let mut coverage = default_coverage();
        for (market, list) in &settings.market_sources {
            coverage.insert(*market, list.clone());
        }

        Self {
            priority,
            coverage,
            capabilities,
            available,
        }
    }

    /// Ordered candidate providers for one call. Empty means no provider can
    /// serve this operation at all.
    #[must_use]
    pub fn route(&self, operation: Operation, symbol: Option<&str>) -> Vec<ProviderKind> {
        let mut candidates = self
            .priority
            .get(&operation)
            .cloned()
            .unwrap_or_else(|| vec![ProviderKind::Finnhub]);

        if let Some(symbol) = symbol {
            let market = classify_symbol(symbol);
            let coverage = self
                .coverage
                .get(&market)
                .cloned()
                .unwrap_or_else(|| ProviderKind::ALL.to_vec());
            let in_market: Vec<ProviderKind> = candidates
                .iter()
                .copied()
                .filter(|kind| coverage.contains(kind))
                .collect();
            candidates = if in_market.is_empty() { coverage } else { in_market };
            debug!(
                operation = %operation,
                symbol = %symbol,
                market = %market,
                candidates = ?candidates,
                "market-filtered candidates"
            );
        }

        candidates.retain(|kind| {
            self.available.contains(kind)
                && self
                    .capabilities
                    .get(kind)
                    .is_some_and(|ops| ops.contains(&operation))
        });
        candidates
    }

    #[must_use]
    pub fn coverage_for(&self, market: Market) -> &[ProviderKind] {
        self.coverage.get(&market).map_or(&[], Vec::as_slice)
    }
}

/// Default per-operation source priority.
fn default_priority() -> HashMap<Operation, Vec<ProviderKind>> {
    use {Operation as Op, ProviderKind as P};

    let table: [(Op, &[P]); 11] = [
        (Op::Quote, &[P::Finnhub, P::TwelveData, P::Tiingo, P::AlphaVantage, P::Sina, P::EastMoney]),
        (Op::Candles, &[P::Finnhub, P::TwelveData, P::EastMoney]),
        (Op::DailyPrices, &[P::AlphaVantage, P::Tiingo, P::EastMoney]),
        (Op::News, &[P::Finnhub, P::AlphaVantage, P::Tiingo]),
        (Op::CompanyOverview, &[P::Finnhub, P::AlphaVantage]),
        (Op::BasicFinancials, &[P::Finnhub]),
        (Op::CompanyMetrics, &[P::Finnhub]),
        (Op::IncomeStatement, &[P::AlphaVantage]),
        (Op::BalanceSheet, &[P::AlphaVantage]),
        (Op::CashFlow, &[P::AlphaVantage]),
        (Op::TechnicalIndicator, &[P::TwelveData, P::AlphaVantage]),
    ];
    table
        .into_iter()
        .map(|(op, list)| (op, list.to_vec()))
        .collect()
}

/// Canonical provider coverage per market, in fallback order.
fn default_coverage() -> HashMap<Market, Vec<ProviderKind>> {
    use ProviderKind as P;

    let cn: &[P] = &[P::Sina, P::EastMoney];
    let table: [(Market, &[P]); 6] = [
        (Market::Us, &[P::Finnhub, P::TwelveData, P::AlphaVantage, P::Tiingo]),
        (Market::Sh, cn),
        (Market::Sz, cn),
        (Market::Bj, cn),
        (Market::Hk, &[P::Sina, P::EastMoney, P::TwelveData]),
        (
            Market::Unknown,
            &[P::Finnhub, P::TwelveData, P::AlphaVantage, P::Tiingo, P::Sina, P::EastMoney],
        ),
    ];
    table
        .into_iter()
        .map(|(market, list)| (market, list.to_vec()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_capabilities() -> HashMap<ProviderKind, Vec<Operation>> {
        use {Operation as Op, ProviderKind as P};
        [
            (P::Finnhub, vec![
                Op::Quote,
                Op::Candles,
                Op::News,
                Op::CompanyOverview,
                Op::BasicFinancials,
                Op::CompanyMetrics,
            ]),
            (P::AlphaVantage, vec![
                Op::Quote,
                Op::DailyPrices,
                Op::News,
                Op::CompanyOverview,
                Op::IncomeStatement,
                Op::BalanceSheet,
                Op::CashFlow,
                Op::TechnicalIndicator,
            ]),
            (P::TwelveData, vec![Op::Quote, Op::Candles, Op::TechnicalIndicator]),
            (P::Tiingo, vec![Op::Quote, Op::DailyPrices, Op::News]),
            (P::Sina, vec![Op::Quote]),
            (P::EastMoney, vec![Op::Quote, Op::Candles, Op::DailyPrices]),
        ]
        .into_iter()
        .collect()
    }

    fn router_with(settings: &Settings, available: &[ProviderKind]) -> SourceRouter {
        SourceRouter::new(settings, all_capabilities(), available.iter().copied().collect())
    }

    #[test]
    fn us_quote_order_follows_priority() {
        let router = router_with(&Settings::default(), &ProviderKind::ALL);
        assert_eq!(
            router.route(Operation::Quote, Some("AAPL")),
            vec![
                ProviderKind::Finnhub,
                ProviderKind::TwelveData,
                ProviderKind::Tiingo,
                ProviderKind::AlphaVantage,
            ]
        );
    }

    #[test]
    fn chinese_symbol_routes_to_chinese_sources() {
        // No finnhub or twelvedata credentials configured.
        let available = [
            ProviderKind::Sina,
            ProviderKind::EastMoney,
            ProviderKind::AlphaVantage,
            ProviderKind::Tiingo,
        ];
        let router = router_with(&Settings::default(), &available);
        assert_eq!(
            router.route(Operation::Quote, Some("601899.SH")),
            vec![ProviderKind::Sina, ProviderKind::EastMoney]
        );
    }

    #[test]
    fn empty_intersection_falls_back_to_coverage_order() {
        let mut settings = Settings::default();
        settings
            .source_priority
            .insert(Operation::Quote, vec![ProviderKind::Tiingo]);
        let router = router_with(&settings, &ProviderKind::ALL);
        // Tiingo has no SH coverage, so the SH coverage list is used instead.
        assert_eq!(
            router.route(Operation::Quote, Some("601899.SH")),
            vec![ProviderKind::Sina, ProviderKind::EastMoney]
        );
    }

    #[test]
    fn capability_filter_drops_non_supporting_providers() {
        let router = router_with(&Settings::default(), &ProviderKind::ALL);
        // Sina covers SH but only supports quotes; candles go to eastmoney.
        assert_eq!(
            router.route(Operation::Candles, Some("601899.SH")),
            vec![ProviderKind::EastMoney]
        );
    }

    #[test]
    fn unavailable_providers_are_filtered() {
        let router = router_with(&Settings::default(), &[ProviderKind::TwelveData]);
        assert_eq!(
            router.route(Operation::Quote, Some("AAPL")),
            vec![ProviderKind::TwelveData]
        );
    }

    #[test]
    fn no_candidates_for_unserved_operation() {
        let router = router_with(&Settings::default(), &[ProviderKind::Sina]);
        assert!(router.route(Operation::CashFlow, Some("AAPL")).is_empty());
    }

    #[test]
    fn custom_priority_replaces_default() {
        let mut settings = Settings::default();
        settings.source_priority.insert(Operation::Quote, vec![
            ProviderKind::Tiingo,
            ProviderKind::Finnhub,
        ]);
        let router = router_with(&settings, &ProviderKind::ALL);
        assert_eq!(
            router.route(Operation::Quote, Some("AAPL")),
            vec![ProviderKind::Tiingo, ProviderKind::Finnhub]
        );
    }

    #[test]
    fn legacy_sources_jump_the_queue() {
        let mut settings = Settings::default();
        settings.primary_source = Some(ProviderKind::AlphaVantage);
        settings.secondary_source = Some(ProviderKind::Tiingo);
        let router = router_with(&settings, &ProviderKind::ALL);
        assert_eq!(
            router.route(Operation::Quote, Some("AAPL")),
            vec![
                ProviderKind::AlphaVantage,
                ProviderKind::Tiingo,
                ProviderKind::Finnhub,
                ProviderKind::TwelveData,
            ]
        );
    }

    #[test]
    fn market_coverage_override_applies() {
        let mut settings = Settings::default();
        settings
            .market_sources
            .insert(Market::Hk, vec![ProviderKind::EastMoney]);
        let router = router_with(&settings, &ProviderKind::ALL);
        assert_eq!(
            router.route(Operation::Quote, Some("0700.HK")),
            vec![ProviderKind::EastMoney]
        );
    }

    #[test]
    fn every_candidate_supports_operation_and_market() {
        // Property: for all (operation, symbol) pairs, every routed provider
        // supports the operation and appears in the symbol's market coverage.
        let router = router_with(&Settings::default(), &ProviderKind::ALL);
        let capabilities = all_capabilities();
        let symbols = ["AAPL", "601899.SH", "000001.SZ", "430047.BJ", "0700.HK", "??"];
        for op in Operation::ALL {
            for symbol in symbols {
                let market = classify_symbol(symbol);
                for kind in router.route(op, Some(symbol)) {
                    assert!(capabilities[&kind].contains(&op), "{kind} lacks {op}");
                    assert!(
                        router.coverage_for(market).contains(&kind),
                        "{kind} outside {market} coverage"
                    );
                }
            }
        }
    }
}
