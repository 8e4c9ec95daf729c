//! Per-provider credential pools with round-robin rotation and cooldown.

use std::{
    sync::{Mutex, MutexGuard, PoisonError},
    time::{Duration, Instant},
};

use {
    finmux_config::KeyRotationSettings,
    secrecy::Secret,
    tracing::debug,
};

/// One credential slot.
struct KeySlot {
    credential: Secret<String>,
    usage_count: u64,
    last_used: Option<Instant>,
    cooldown_until: Option<Instant>,
    last_rate_limited: Option<Instant>,
}

impl KeySlot {
    fn new(credential: Secret<String>) -> Self {
        Self {
            credential,
            usage_count: 0,
            last_used: None,
            cooldown_until: None,
            last_rate_limited: None,
        }
    }

    fn in_cooldown(&self, now: Instant) -> bool {
        self.cooldown_until.is_some_and(|until| until > now)
    }

    /// Expired cooldowns are cleared lazily on any access.
    fn sweep(&mut self, now: Instant) {
        if self.cooldown_until.is_some_and(|until| until <= now) {
            self.cooldown_until = None;
        }
    }
}

struct PoolState {
    slots: Vec<KeySlot>,
    current: usize,
}

/// A credential handed out for one upstream call.
pub struct AcquiredKey {
    pub index: usize,
    pub credential: Secret<String>,
}

/// Ordered credential pool for one provider.
///
/// Key-less providers get a pool of size one holding a synthetic empty
/// credential that never enters cooldown.
pub struct KeyPool {
    state: Mutex<PoolState>,
    rotation_enabled: bool,
    reset_window: Duration,
    keyless: bool,
}

impl KeyPool {
    /// Build a pool from parsed credentials. `None` when the list is empty
    /// (the provider is unavailable).
    #[must_use]
    pub fn new(keys: Vec<Secret<String>>, rotation: &KeyRotationSettings) -> Option<Self> {
        if keys.is_empty() {
            return None;
        }
        Some(Self {
            state: Mutex::new(PoolState {
                slots: keys.into_iter().map(KeySlot::new).collect(),
                current: 0,
            }),
            rotation_enabled: rotation.enabled,
            reset_window: Duration::from_millis(rotation.reset_window_ms),
            keyless: false,
        })
    }

    /// Pool for a provider that needs no credential.
    #[must_use]
    pub fn keyless() -> Self {
        Self {
            state: Mutex::new(PoolState {
                slots: vec![KeySlot::new(Secret::new(String::new()))],
                current: 0,
            }),
            rotation_enabled: false,
            reset_window: Duration::ZERO,
            keyless: true,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().slots.is_empty()
    }

    /// Current key if usable, else the next non-cooling key. `None` when the
    /// whole pool is cooling down.
    #[must_use]
    pub fn acquire(&self) -> Option<AcquiredKey> {
        self.acquire_at(Instant::now())
    }

    #[must_use]
    pub fn acquire_at(&self, now: Instant) -> Option<AcquiredKey> {
        let mut state = self.lock();
        let len = state.slots.len();
        for slot in &mut state.slots {
            slot.sweep(now);
        }
        // Scan at most two laps from the current position.
        for step in 0..len.saturating_mul(2) {
            let index = (state.current + step) % len;
            if !state.slots[index].in_cooldown(now) {
                state.current = index;
                return Some(AcquiredKey {
                    index,
                    credential: state.slots[index].credential.clone(),
                });
            }
        }
        None
    }

    /// Put a key on cooldown after an upstream rate limit.
    pub fn mark_rate_limited(&self, index: usize) {
        self.mark_rate_limited_at(index, Instant::now());
    }

    pub fn mark_rate_limited_at(&self, index: usize, now: Instant) {
        let mut state = self.lock();
        let Some(slot) = state.slots.get_mut(index) else {
            return;
        };
        slot.last_rate_limited = Some(now);
        // Synthetic credentials never cool down, and with rotation disabled
        // the single configured key must stay usable.
        if !self.keyless && self.rotation_enabled {
            slot.cooldown_until = Some(now + self.reset_window);
            debug!(key_index = index, window_ms = self.reset_window.as_millis() as u64, "key cooling down");
        }
    }

    pub fn record_success(&self, index: usize) {
        self.record_success_at(index, Instant::now());
    }

    pub fn record_success_at(&self, index: usize, now: Instant) {
        let mut state = self.lock();
        if let Some(slot) = state.slots.get_mut(index) {
            slot.usage_count += 1;
            slot.last_used = Some(now);
        }
    }

    /// Advance past the current key to the next usable one. Returns whether
    /// one exists.
    pub fn rotate(&self) -> bool {
        self.rotate_at(Instant::now())
    }

    pub fn rotate_at(&self, now: Instant) -> bool {
        if !self.rotation_enabled {
            return false;
        }
        let mut state = self.lock();
        let len = state.slots.len();
        for slot in &mut state.slots {
            slot.sweep(now);
        }
        for step in 1..=len {
            let index = (state.current + step) % len;
            if !state.slots[index].in_cooldown(now) {
                state.current = index;
                return true;
            }
        }
        false
    }

    #[must_use]
    pub fn is_cooling(&self, index: usize) -> bool {
        self.is_cooling_at(index, Instant::now())
    }

    #[must_use]
    pub fn is_cooling_at(&self, index: usize, now: Instant) -> bool {
        self.lock()
            .slots
            .get(index)
            .is_some_and(|slot| slot.in_cooldown(now))
    }

    #[must_use]
    pub fn usage_count(&self, index: usize) -> u64 {
        self.lock().slots.get(index).map_or(0, |slot| slot.usage_count)
    }

    #[must_use]
    pub fn last_used(&self, index: usize) -> Option<Instant> {
        self.lock().slots.get(index).and_then(|slot| slot.last_used)
    }

    #[must_use]
    pub fn last_rate_limited(&self, index: usize) -> Option<Instant> {
        self.lock()
            .slots
            .get(index)
            .and_then(|slot| slot.last_rate_limited)
    }

    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn secret(s: &str) -> Secret<String> {
        Secret::new(s.to_string())
    }

    fn pool(keys: &[&str]) -> KeyPool {
        KeyPool::new(
            keys.iter().map(|k| secret(k)).collect(),
            &KeyRotationSettings::default(),
        )
        .unwrap()
    }

    #[test]
    fn empty_credential_list_yields_no_pool() {
        assert!(KeyPool::new(Vec::new(), &KeyRotationSettings::default()).is_none());
    }

    #[test]
    fn acquire_returns_current_key_first() {
        let pool = pool(&["a", "b", "c"]);
        let now = Instant::now();
        assert_eq!(pool.acquire_at(now).map(|k| k.index), Some(0));
        assert_eq!(pool.acquire_at(now).map(|k| k.index), Some(0));
    }

    #[test]
    fn rate_limited_key_is_skipped() {
        let pool = pool(&["a", "b"]);
        let now = Instant::now();
        pool.mark_rate_limited_at(0, now);
        assert_eq!(pool.acquire_at(now).map(|k| k.index), Some(1));
    }

    #[test]
    fn exhausted_pool_returns_none_until_a_cooldown_expires() {
        let rotation = KeyRotationSettings {
            enabled: true,
            reset_window_ms: 1_000,
        };
        let pool = KeyPool::new(vec![secret("a"), secret("b"), secret("c")], &rotation).unwrap();
        let now = Instant::now();
        pool.mark_rate_limited_at(0, now);
        pool.mark_rate_limited_at(1, now);
        pool.mark_rate_limited_at(2, now);
        assert!(pool.acquire_at(now).is_none());

        // First cooldown expiry makes the pool usable again.
        let later = now + Duration::from_millis(1_001);
        assert!(pool.acquire_at(later).is_some());
    }

    #[test]
    fn cooldown_clears_lazily_on_access() {
        let rotation = KeyRotationSettings {
            enabled: true,
            reset_window_ms: 500,
        };
        let pool = KeyPool::new(vec![secret("a")], &rotation).unwrap();
        let now = Instant::now();
        pool.mark_rate_limited_at(0, now);
        assert!(pool.is_cooling_at(0, now));
        assert!(pool.acquire_at(now).is_none());
        let later = now + Duration::from_millis(501);
        assert_eq!(pool.acquire_at(later).map(|k| k.index), Some(0));
        assert!(!pool.is_cooling_at(0, later));
    }

    #[test]
    fn rotate_advances_past_cooling_keys() {
        let pool = pool(&["a", "b", "c"]);
        let now = Instant::now();
        pool.mark_rate_limited_at(1, now);
        assert!(pool.rotate_at(now));
        // Index 1 is cooling, so rotation lands on 2.
        assert_eq!(pool.acquire_at(now).map(|k| k.index), Some(2));
    }

    #[test]
    fn rotate_reports_exhaustion() {
        let pool = pool(&["a", "b"]);
        let now = Instant::now();
        pool.mark_rate_limited_at(0, now);
        pool.mark_rate_limited_at(1, now);
        assert!(!pool.rotate_at(now));
    }

    #[test]
    fn disabled_rotation_never_advances_or_cools() {
        let rotation = KeyRotationSettings {
            enabled: false,
            reset_window_ms: 60_000,
        };
        let pool = KeyPool::new(vec![secret("only")], &rotation).unwrap();
        let now = Instant::now();
        pool.mark_rate_limited_at(0, now);
        assert!(!pool.is_cooling_at(0, now));
        // The rate limit is still recorded even though no cooldown applies.
        assert_eq!(pool.last_rate_limited(0), Some(now));
        assert_eq!(pool.acquire_at(now).map(|k| k.index), Some(0));
        assert!(!pool.rotate_at(now));
    }

    #[test]
    fn keyless_pool_never_rate_limits() {
        let pool = KeyPool::keyless();
        let now = Instant::now();
        pool.mark_rate_limited_at(0, now);
        assert!(!pool.is_cooling_at(0, now));
        assert!(pool.acquire_at(now).is_some());
    }

    #[test]
    fn success_bumps_usage_count() {
        let pool = pool(&["a"]);
        let now = Instant::now();
        pool.record_success_at(0, now);
        pool.record_success_at(0, now);
        assert_eq!(pool.usage_count(0), 2);
        assert_eq!(pool.last_used(0), Some(now));
    }
}
