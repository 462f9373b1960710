use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tracing::debug;

/// Freshness window for a cached tweet detail.
pub const DETAIL_TTL_MS: i64 = 60_000;

pub trait Clock: Send + Sync {
    fn now_ms(&self) -> i64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Hand-driven clock for tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(start_ms: i64) -> Self {
        Self {
            now: AtomicI64::new(start_ms),
        }
    }

    pub fn advance(&self, ms: i64) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }

    pub fn set(&self, ms: i64) {
        self.now.store(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CachedDetail {
    pub detail: Value,
    pub cached_at_ms: i64,
}

pub struct DetailCache {
    entries: Mutex<HashMap<String, CachedDetail>>,
    clock: Arc<dyn Clock>,
}

impl DetailCache {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Fresh entry for `tweet_id`. A stale one is evicted on the way out.
    pub fn get(&self, tweet_id: &str) -> Option<Value> {
        let now = self.clock.now_ms();
        let mut entries = self.entries.lock();
        let cached = entries.get(tweet_id)?;
        if now - cached.cached_at_ms <= DETAIL_TTL_MS {
            debug!("detail cache hit for {}", tweet_id);
            return Some(cached.detail.clone());
        }
        debug!("detail cache entry for {} expired", tweet_id);
        entries.remove(tweet_id);
        None
    }

    pub fn set(&self, tweet_id: &str, detail: Value) {
        let cached = CachedDetail {
            detail,
            cached_at_ms: self.clock.now_ms(),
        };
        self.entries.lock().insert(tweet_id.to_string(), cached);
    }

    pub fn clear(&self, tweet_id: &str) {
        self.entries.lock().remove(tweet_id);
    }
}

impl Default for DetailCache {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}
