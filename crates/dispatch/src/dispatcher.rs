//! Cascading-failover driver.
//!
//! Walks the router's candidate list in order; within a provider, walks the
//! key pool. Rate limits rotate keys, transient failures and upstream
//! timeouts move to the next provider, permanent failures abort the cascade.
//! Every physical upstream call (and every circuit-breaker skip) lands in
//! the attempt log.

use std::{future::Future, sync::Arc, time::Instant};

use {
    secrecy::ExposeSecret,
    serde::Serialize,
    tracing::{debug, info, warn},
};

use {
    finmux_common::{Operation, ProviderKind},
    finmux_config::Settings,
    finmux_providers::UpstreamError,
    finmux_routing::SourceRouter,
};

use crate::{
    classify::ErrorClass,
    error::DispatchError,
    registry::{ProviderHandle, ProviderRegistry},
    retry::RetryPolicy,
};

/// Audit record for one provider attempt.
#[derive(Debug, Clone, Serialize)]
pub struct Attempt {
    pub provider: ProviderKind,
    pub key_index: usize,
    /// Offset from dispatch start, milliseconds.
    pub start_offset_ms: u64,
    pub duration_ms: u64,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A successful dispatch: the record plus the audit trail.
#[derive(Debug)]
pub struct DispatchOutcome<T> {
    pub data: T,
    pub winning_provider: ProviderKind,
    pub attempts: Vec<Attempt>,
    pub total_duration_ms: u64,
}

pub struct Dispatcher {
    registry: Arc<ProviderRegistry>,
    router: SourceRouter,
    failover_enabled: bool,
    retry: RetryPolicy,
    deadline: std::time::Duration,
}

impl Dispatcher {
    #[must_use]
    pub fn new(registry: Arc<ProviderRegistry>, router: SourceRouter, settings: &Settings) -> Self {
        Self {
            registry,
            router,
            failover_enabled: settings.failover_enabled,
            retry: RetryPolicy::new(&settings.retry),
            deadline: settings.request_deadline(),
        }
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    #[must_use]
    pub fn router(&self) -> &SourceRouter {
        &self.router
    }

    /// Run one operation through the cascade. The executor binds the
    /// operation's arguments and performs the actual upstream call, keeping
    /// this driver oblivious to payload shapes.
    pub async fn dispatch<T, F, Fut>(
        &self,
        operation: Operation,
        symbol: Option<&str>,
        executor: F,
    ) -> Result<DispatchOutcome<T>, DispatchError>
    where
        F: Fn(Arc<ProviderHandle>, String) -> Fut,
        Fut: Future<Output = Result<T, UpstreamError>>,
    {
        let started = Instant::now();
        let deadline = started + self.deadline;

        let mut candidates = self.router.route(operation, symbol);
        if candidates.is_empty() {
            return Err(DispatchError::NoCandidates { operation });
        }
        if !self.failover_enabled {
            candidates.truncate(1);
        }
        debug!(operation = %operation, candidates = ?candidates, "dispatching");

        let mut attempts: Vec<Attempt> = Vec::new();
        let mut failures: Vec<String> = Vec::new();

        'providers: for kind in candidates {
            let Some(handle) = self.registry.get(kind) else {
                continue;
            };

            let pool_size = handle.keys.len();
            'keys: for _ in 0..pool_size {
                let Some(key) = handle.keys.acquire() else {
                    debug!(provider = %kind, "every key cooling down, skipping provider");
                    continue 'providers;
                };

                if handle.breaker.try_acquire().is_err() {
                    debug!(provider = %kind, "circuit open, skipping provider");
                    attempts.push(Attempt {
                        provider: kind,
                        key_index: key.index,
                        start_offset_ms: ms_since(started),
                        duration_ms: 0,
                        success: false,
                        error: Some("circuit breaker open".into()),
                    });
                    continue 'providers;
                }

                let credential = key.credential.expose_secret().clone();
                let mut physical_calls = 0_u32;
                loop {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(DispatchError::DeadlineExceeded {
                            operation,
                            elapsed_ms: ms_since(started),
                            attempts,
                        });
                    }
                    let remaining = deadline - now;
                    let budget = handle.timeout.min(remaining);
                    let deadline_bound = remaining <= handle.timeout;

                    physical_calls += 1;
                    let call_started = Instant::now();
                    let result = tokio::time::timeout(
                        budget,
                        executor(Arc::clone(&handle), credential.clone()),
                    )
                    .await;
                    let duration_ms = ms_since(call_started);

                    let error = match result {
                        Ok(Ok(data)) => {
                            attempts.push(Attempt {
                                provider: kind,
                                key_index: key.index,
                                start_offset_ms: ms_since(started).saturating_sub(duration_ms),
                                duration_ms,
                                success: true,
                                error: None,
                            });
                            handle.keys.record_success(key.index);
                            handle.breaker.on_success();
                            let total_duration_ms = ms_since(started);
                            info!(
                                operation = %operation,
                                provider = %kind,
                                attempts = attempts.len(),
                                total_duration_ms,
                                "dispatch succeeded"
                            );
                            return Ok(DispatchOutcome {
                                data,
                                winning_provider: kind,
                                attempts,
                                total_duration_ms,
                            });
                        },
                        Ok(Err(error)) => error,
                        Err(_elapsed) => {
                            if deadline_bound {
                                // Caller-initiated abort: the key is not
                                // poisoned and the breaker does not count it.
                                attempts.push(Attempt {
                                    provider: kind,
                                    key_index: key.index,
                                    start_offset_ms: ms_since(started).saturating_sub(duration_ms),
                                    duration_ms,
                                    success: false,
                                    error: Some("aborted at caller deadline".into()),
                                });
                                return Err(DispatchError::DeadlineExceeded {
                                    operation,
                                    elapsed_ms: ms_since(started),
                                    attempts,
                                });
                            }
                            UpstreamError::timeout(
                                kind,
                                format!("upstream call exceeded {} ms", budget.as_millis()),
                            )
                        },
                    };

                    attempts.push(Attempt {
                        provider: kind,
                        key_index: key.index,
                        start_offset_ms: ms_since(started).saturating_sub(duration_ms),
                        duration_ms,
                        success: false,
                        error: Some(error.to_string()),
                    });
                    handle.breaker.on_failure();

                    let class = ErrorClass::of(&error);
                    warn!(
                        operation = %operation,
                        provider = %kind,
                        class = ?class,
                        error = %error,
                        "provider attempt failed"
                    );
                    match class {
                        ErrorClass::RateLimit => {
                            handle.keys.mark_rate_limited(key.index);
                            failures.push(error.to_string());
                            if handle.keys.rotate() {
                                continue 'keys;
                            }
                            continue 'providers;
                        },
                        ErrorClass::Transient | ErrorClass::Timeout => {
                            if self.retry.should_retry(physical_calls)
                                && handle.breaker.try_acquire().is_ok()
                            {
                                let delay =
                                    self.retry.delay_before(physical_calls).min(remaining);
                                debug!(provider = %kind, delay_ms = delay.as_millis() as u64, "retrying after backoff");
                                tokio::time::sleep(delay).await;
                                continue;
                            }
                            failures.push(error.to_string());
                            continue 'providers;
                        },
                        ErrorClass::Permanent => {
                            return Err(DispatchError::Permanent {
                                error,
                                attempts,
                            });
                        },
                    }
                }
            }
        }

        if failures.is_empty() {
            Err(DispatchError::Unavailable {
                operation,
                attempts,
            })
        } else {
            Err(DispatchError::Exhausted {
                operation,
                summary: failures.join("; "),
                attempts,
            })
        }
    }
}

fn ms_since(instant: Instant) -> u64 {
    u64::try_from(instant.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use std::{
        collections::VecDeque,
        sync::{
            Mutex,
            atomic::{AtomicUsize, Ordering},
        },
    };

    use {async_trait::async_trait, secrecy::Secret};

    use finmux_providers::{ProviderAdapter, Quote};

    use super::*;
    use crate::{circuit::CircuitBreaker, key_pool::KeyPool};

    struct ScriptedAdapter {
        kind: ProviderKind,
        operations: &'static [Operation],
        script: Mutex<VecDeque<Result<Quote, UpstreamError>>>,
        calls: AtomicUsize,
        hang: bool,
    }

    impl ScriptedAdapter {
        fn new(
            kind: ProviderKind,
            operations: &'static [Operation],
            script: Vec<Result<Quote, UpstreamError>>,
        ) -> Arc<Self> {
            Arc::new(Self {
                kind,
                operations,
                script: Mutex::new(script.into()),
                calls: AtomicUsize::new(0),
                hang: false,
            })
        }

        fn hanging(kind: ProviderKind, operations: &'static [Operation]) -> Arc<Self> {
            Arc::new(Self {
                kind,
                operations,
                script: Mutex::new(VecDeque::new()),
                calls: AtomicUsize::new(0),
                hang: true,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ProviderAdapter for ScriptedAdapter {
        fn kind(&self) -> ProviderKind {
            self.kind
        }

        fn operations(&self) -> &'static [Operation] {
            self.operations
        }

        async fn quote(&self, _key: &str, symbol: &str) -> Result<Quote, UpstreamError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.hang {
                std::future::pending::<()>().await;
            }
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(UpstreamError::api(self.kind, format!("script exhausted for {symbol}"))))
        }
    }

    fn sample_quote(symbol: &str) -> Quote {
        Quote {
            symbol: symbol.into(),
            current: 227.5,
            change: 2.25,
            percent_change: 1.0,
            day_high: 229.0,
            day_low: 225.1,
            day_open: 226.0,
            prev_close: 225.25,
        }
    }

    fn handle_for(
        adapter: Arc<ScriptedAdapter>,
        keys: &[&str],
        settings: &Settings,
    ) -> ProviderHandle {
        let kind = adapter.kind();
        let pool = if keys.is_empty() {
            KeyPool::keyless()
        } else {
            KeyPool::new(
                keys.iter().map(|k| Secret::new(k.to_string())).collect(),
                &settings.rotation,
            )
            .unwrap()
        };
        ProviderHandle::new(
            adapter,
            pool,
            CircuitBreaker::new(settings.breaker.clone()),
            settings.timeout_for(kind),
        )
    }

    fn dispatcher_for(handles: Vec<ProviderHandle>, settings: &Settings) -> Dispatcher {
        let registry = Arc::new(ProviderRegistry::with_handles(handles));
        let router = SourceRouter::new(settings, registry.capabilities(), registry.kinds());
        Dispatcher::new(registry, router, settings)
    }

    async fn dispatch_quote(
        dispatcher: &Dispatcher,
        symbol: &'static str,
    ) -> Result<DispatchOutcome<Quote>, DispatchError> {
        dispatcher
            .dispatch(Operation::Quote, Some(symbol), |handle, key| async move {
                handle.adapter.quote(&key, symbol).await
            })
            .await
    }

    const QUOTE_ONLY: &[Operation] = &[Operation::Quote];
    const QUOTE_AND_INDICATOR: &[Operation] = &[Operation::Quote, Operation::TechnicalIndicator];

    #[tokio::test]
    async fn us_quote_happy_path() {
        let settings = Settings::default();
        let finnhub =
            ScriptedAdapter::new(ProviderKind::Finnhub, QUOTE_ONLY, vec![Ok(sample_quote("AAPL"))]);
        let dispatcher = dispatcher_for(
            vec![handle_for(Arc::clone(&finnhub), &["k1"], &settings)],
            &settings,
        );

        let outcome = dispatch_quote(&dispatcher, "AAPL").await.unwrap();
        assert_eq!(outcome.winning_provider, ProviderKind::Finnhub);
        assert_eq!(outcome.attempts.len(), 1);
        assert!(outcome.attempts[0].success);
        assert_eq!(outcome.data.symbol, "AAPL");
        assert_eq!(finnhub.calls(), 1);
    }

    #[tokio::test]
    async fn rate_limit_rotates_to_second_key() {
        let settings = Settings::default();
        let finnhub = ScriptedAdapter::new(ProviderKind::Finnhub, QUOTE_ONLY, vec![
            Err(UpstreamError::http(ProviderKind::Finnhub, 429, "too many requests")),
            Ok(sample_quote("AAPL")),
        ]);
        let dispatcher = dispatcher_for(
            vec![handle_for(Arc::clone(&finnhub), &["bad1", "good2"], &settings)],
            &settings,
        );

        let outcome = dispatch_quote(&dispatcher, "AAPL").await.unwrap();
        assert_eq!(outcome.winning_provider, ProviderKind::Finnhub);
        let indexes: Vec<usize> = outcome.attempts.iter().map(|a| a.key_index).collect();
        assert_eq!(indexes, vec![0, 1]);
        assert!(!outcome.attempts[0].success);
        assert!(outcome.attempts[1].success);

        let handle = dispatcher.registry().get(ProviderKind::Finnhub).unwrap();
        assert!(handle.keys.is_cooling(0));
        assert_eq!(handle.keys.usage_count(1), 1);
    }

    #[tokio::test]
    async fn transient_error_cascades_to_next_provider() {
        let settings = Settings::default();
        let finnhub = ScriptedAdapter::new(ProviderKind::Finnhub, QUOTE_ONLY, vec![Err(
            UpstreamError::http(ProviderKind::Finnhub, 500, "internal error"),
        )]);
        let twelvedata =
            ScriptedAdapter::new(ProviderKind::TwelveData, QUOTE_ONLY, vec![Ok(sample_quote("AAPL"))]);
        let dispatcher = dispatcher_for(
            vec![
                handle_for(Arc::clone(&finnhub), &["fk"], &settings),
                handle_for(Arc::clone(&twelvedata), &["tk"], &settings),
            ],
            &settings,
        );

        let outcome = dispatch_quote(&dispatcher, "AAPL").await.unwrap();
        assert_eq!(outcome.winning_provider, ProviderKind::TwelveData);
        let providers: Vec<ProviderKind> =
            outcome.attempts.iter().map(|a| a.provider).collect();
        assert_eq!(providers, vec![ProviderKind::Finnhub, ProviderKind::TwelveData]);

        let handle = dispatcher.registry().get(ProviderKind::Finnhub).unwrap();
        assert_eq!(handle.breaker.failure_count(), 1);
    }

    #[tokio::test]
    async fn chinese_market_routes_to_sina_first() {
        let settings = Settings::default();
        let sina = ScriptedAdapter::new(ProviderKind::Sina, QUOTE_ONLY, vec![Ok(sample_quote(
            "601899.SH",
        ))]);
        let eastmoney = ScriptedAdapter::new(ProviderKind::EastMoney, QUOTE_ONLY, vec![]);
        let dispatcher = dispatcher_for(
            vec![
                handle_for(Arc::clone(&sina), &[], &settings),
                handle_for(Arc::clone(&eastmoney), &[], &settings),
            ],
            &settings,
        );

        let outcome = dispatch_quote(&dispatcher, "601899.SH").await.unwrap();
        assert_eq!(outcome.winning_provider, ProviderKind::Sina);
        assert_eq!(eastmoney.calls(), 0);
    }

    #[tokio::test]
    async fn permanent_error_aborts_cascade() {
        let settings = Settings::default();
        let finnhub = ScriptedAdapter::new(ProviderKind::Finnhub, QUOTE_ONLY, vec![Err(
            UpstreamError::http(ProviderKind::Finnhub, 404, "symbol not found"),
        )]);
        let twelvedata =
            ScriptedAdapter::new(ProviderKind::TwelveData, QUOTE_ONLY, vec![Ok(sample_quote("X"))]);
        let dispatcher = dispatcher_for(
            vec![
                handle_for(Arc::clone(&finnhub), &["fk"], &settings),
                handle_for(Arc::clone(&twelvedata), &["tk"], &settings),
            ],
            &settings,
        );

        let err = dispatch_quote(&dispatcher, "NOSUCH").await.unwrap_err();
        match &err {
            DispatchError::Permanent { error, attempts } => {
                assert_eq!(error.status(), Some(404));
                assert_eq!(attempts.len(), 1);
            },
            other => panic!("expected permanent error, got {other:?}"),
        }
        assert_eq!(twelvedata.calls(), 0);
    }

    #[tokio::test]
    async fn exhausted_cascade_aggregates_failures() {
        let settings = Settings::default();
        let twelvedata = ScriptedAdapter::new(ProviderKind::TwelveData, QUOTE_AND_INDICATOR, vec![
            Err(UpstreamError::http(ProviderKind::TwelveData, 503, "unavailable")),
        ]);
        let alphavantage =
            ScriptedAdapter::new(ProviderKind::AlphaVantage, QUOTE_AND_INDICATOR, vec![Err(
                UpstreamError::http(ProviderKind::AlphaVantage, 503, "unavailable"),
            )]);
        let dispatcher = dispatcher_for(
            vec![
                handle_for(Arc::clone(&twelvedata), &["tk"], &settings),
                handle_for(Arc::clone(&alphavantage), &["ak"], &settings),
            ],
            &settings,
        );

        let err = dispatcher
            .dispatch(Operation::TechnicalIndicator, Some("AAPL"), |handle, key| async move {
                handle.adapter.quote(&key, "AAPL").await
            })
            .await
            .unwrap_err();
        match &err {
            DispatchError::Exhausted { summary, attempts, .. } => {
                assert_eq!(attempts.len(), 2);
                assert!(summary.contains("twelvedata"));
                assert!(summary.contains("alphavantage"));
            },
            other => panic!("expected exhaustion, got {other:?}"),
        }
        for kind in [ProviderKind::TwelveData, ProviderKind::AlphaVantage] {
            let handle = dispatcher.registry().get(kind).unwrap();
            assert_eq!(handle.breaker.failure_count(), 1);
        }
    }

    #[tokio::test]
    async fn failover_disabled_stops_after_first_candidate() {
        let mut settings = Settings::default();
        settings.failover_enabled = false;
        let finnhub = ScriptedAdapter::new(ProviderKind::Finnhub, QUOTE_ONLY, vec![Err(
            UpstreamError::http(ProviderKind::Finnhub, 503, "unavailable"),
        )]);
        let twelvedata =
            ScriptedAdapter::new(ProviderKind::TwelveData, QUOTE_ONLY, vec![Ok(sample_quote("X"))]);
        let dispatcher = dispatcher_for(
            vec![
                handle_for(Arc::clone(&finnhub), &["fk"], &settings),
                handle_for(Arc::clone(&twelvedata), &["tk"], &settings),
            ],
            &settings,
        );

        let err = dispatch_quote(&dispatcher, "AAPL").await.unwrap_err();
        assert!(matches!(err, DispatchError::Exhausted { .. }));
        assert_eq!(twelvedata.calls(), 0);
    }

    #[tokio::test]
    async fn open_circuit_skips_provider_without_calling_it() {
        let mut settings = Settings::default();
        settings.breaker.failure_threshold = 1;
        let finnhub = ScriptedAdapter::new(ProviderKind::Finnhub, QUOTE_ONLY, vec![Err(
            UpstreamError::http(ProviderKind::Finnhub, 503, "unavailable"),
        )]);
        let dispatcher = dispatcher_for(
            vec![handle_for(Arc::clone(&finnhub), &["fk"], &settings)],
            &settings,
        );

        // First dispatch records the failure and opens the breaker.
        let _ = dispatch_quote(&dispatcher, "AAPL").await.unwrap_err();
        assert_eq!(finnhub.calls(), 1);

        let err = dispatch_quote(&dispatcher, "AAPL").await.unwrap_err();
        match &err {
            DispatchError::Unavailable { attempts, .. } => {
                assert_eq!(attempts.len(), 1);
                assert!(attempts[0].error.as_deref().unwrap().contains("circuit"));
            },
            other => panic!("expected unavailable, got {other:?}"),
        }
        assert_eq!(finnhub.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn caller_deadline_aborts_without_poisoning_state() {
        let mut settings = Settings::default();
        settings.request_deadline_ms = 100;
        let finnhub = ScriptedAdapter::hanging(ProviderKind::Finnhub, QUOTE_ONLY);
        let dispatcher = dispatcher_for(
            vec![handle_for(Arc::clone(&finnhub), &["fk"], &settings)],
            &settings,
        );

        let err = dispatch_quote(&dispatcher, "AAPL").await.unwrap_err();
        match &err {
            DispatchError::DeadlineExceeded { attempts, .. } => {
                assert_eq!(attempts.len(), 1);
                assert!(!attempts[0].success);
            },
            other => panic!("expected deadline exceeded, got {other:?}"),
        }
        let handle = dispatcher.registry().get(ProviderKind::Finnhub).unwrap();
        assert_eq!(handle.breaker.failure_count(), 0);
        assert!(!handle.keys.is_cooling(0));
    }

    #[tokio::test(start_paused = true)]
    async fn upstream_timeout_counts_and_cascades() {
        let mut settings = Settings::default();
        settings.provider_timeout_ms.insert(ProviderKind::Finnhub, 50);
        let finnhub = ScriptedAdapter::hanging(ProviderKind::Finnhub, QUOTE_ONLY);
        let twelvedata =
            ScriptedAdapter::new(ProviderKind::TwelveData, QUOTE_ONLY, vec![Ok(sample_quote("AAPL"))]);
        let dispatcher = dispatcher_for(
            vec![
                handle_for(Arc::clone(&finnhub), &["fk"], &settings),
                handle_for(Arc::clone(&twelvedata), &["tk"], &settings),
            ],
            &settings,
        );

        let outcome = dispatch_quote(&dispatcher, "AAPL").await.unwrap();
        assert_eq!(outcome.winning_provider, ProviderKind::TwelveData);
        assert!(outcome.attempts[0]
            .error
            .as_deref()
            .unwrap()
            .contains("exceeded"));

        let handle = dispatcher.registry().get(ProviderKind::Finnhub).unwrap();
        assert_eq!(handle.breaker.failure_count(), 1);
    }

    #[tokio::test]
    async fn retry_envelope_repeats_same_provider() {
        let mut settings = Settings::default();
        settings.retry.enabled = true;
        settings.retry.max_attempts = 2;
        settings.retry.initial_delay_ms = 1;
        settings.retry.max_delay_ms = 2;
        let finnhub = ScriptedAdapter::new(ProviderKind::Finnhub, QUOTE_ONLY, vec![
            Err(UpstreamError::http(ProviderKind::Finnhub, 503, "blip")),
            Ok(sample_quote("AAPL")),
        ]);
        let dispatcher = dispatcher_for(
            vec![handle_for(Arc::clone(&finnhub), &["fk"], &settings)],
            &settings,
        );

        let outcome = dispatch_quote(&dispatcher, "AAPL").await.unwrap();
        assert_eq!(outcome.winning_provider, ProviderKind::Finnhub);
        assert_eq!(outcome.attempts.len(), 2);
        assert_eq!(finnhub.calls(), 2);
        // Both physical calls used the same key.
        assert_eq!(outcome.attempts[0].key_index, outcome.attempts[1].key_index);
    }

    #[tokio::test]
    async fn empty_candidate_list_is_no_candidates() {
        let settings = Settings::default();
        let dispatcher = dispatcher_for(Vec::new(), &settings);
        let err = dispatch_quote(&dispatcher, "AAPL").await.unwrap_err();
        assert!(matches!(err, DispatchError::NoCandidates { .. }));
    }
}
