//! Cooperative request pacing for IP-throttled public endpoints.

use std::time::Duration;

use tokio::{sync::Mutex, time::Instant};

pub const DEFAULT_MIN_INTERVAL: Duration = Duration::from_millis(200);

/// Enforces a minimum interval between requests to one upstream.
///
/// Callers queue on the pacer's own async mutex, so pacing one adapter never
/// stalls calls to other providers.
pub struct Pacer {
    min_interval: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl Pacer {
    #[must_use]
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_request: Mutex::new(None),
        }
    }

    /// Wait until the next request slot, claiming it.
    pub async fn pace(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(previous) = *last {
            let next_slot = previous + self.min_interval;
            let now = Instant::now();
            if next_slot > now {
                tokio::time::sleep(next_slot - now).await;
            }
        }
        *last = Some(Instant::now());
    }
}

impl Default for Pacer {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_INTERVAL)
    }
}
