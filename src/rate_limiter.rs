use crate::errors::ServiceError;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Keyed fixed-window counter with TTL.
///
/// Explicitly constructed and shared through application state rather than
/// living in a process-wide static, so every consumer sees the same scoped
/// instance and tests can create isolated ones.
#[derive(Clone)]
pub struct CounterStore {
    windows: Arc<DashMap<String, Window>>,
}

#[derive(Clone, Copy)]
struct Window {
    started_at: Instant,
    count: u32,
}

impl Default for CounterStore {
    fn default() -> Self {
        Self {
            windows: Arc::new(DashMap::new()),
        }
    }
}

impl CounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Increments the counter for `key` and returns the count within the
    /// current window. Expired windows restart from one.
    pub fn hit(&self, key: &str, window: Duration) -> u32 {
        let now = Instant::now();
        let mut entry = self.windows.entry(key.to_string()).or_insert(Window {
            started_at: now,
            count: 0,
        });

        if now.duration_since(entry.started_at) >= window {
            entry.started_at = now;
            entry.count = 0;
        }
        entry.count += 1;
        entry.count
    }

    /// Drops windows older than `window`; called periodically by the sweeper.
    pub fn cleanup(&self, window: Duration) {
        let now = Instant::now();
        self.windows
            .retain(|_, w| now.duration_since(w.started_at) < window);
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}

/// Per-caller request limiter used by the HTTP layer.
#[derive(Clone)]
pub struct RateLimiter {
    store: CounterStore,
    limit: u32,
    window: Duration,
}

impl RateLimiter {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            store: CounterStore::new(),
            limit,
            window,
        }
    }

    pub fn check(&self, key: &str) -> Result<(), ServiceError> {
        if self.store.hit(key, self.window) > self.limit {
            return Err(ServiceError::RateLimitExceeded);
        }
        Ok(())
    }

    pub fn store(&self) -> &CounterStore {
        &self.store
    }

    pub fn window(&self) -> Duration {
        self.window
    }
}
