//! In-memory TTL cache for provider payloads.
//!
//! Values are stored type-erased behind `Arc` and are never mutated once
//! inserted; a newer fetch replaces the whole entry. Expiry is checked on every
//! `get`, the optional background sweep only reclaims memory.

use parking_lot::RwLock;
use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Default entry lifetime
pub const DEFAULT_TTL: Duration = Duration::from_secs(600);
/// Default period of the background sweep
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(120);

/// Payload family, used as the key prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataKind {
    Current,
    Forecast,
    Hourly,
    Geo,
}

impl DataKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Current => "current",
            Self::Forecast => "forecast",
            Self::Hourly => "hourly",
            Self::Geo => "geo",
        }
    }
}

impl std::fmt::Display for DataKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

struct CacheEntry {
    value: Arc<dyn Any + Send + Sync>,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

pub struct WeatherCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    ttl: Duration,
    shutdown: CancellationToken,
}

impl std::fmt::Debug for WeatherCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WeatherCache")
            .field("entries", &self.entries.read().len())
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl WeatherCache {
    /// A passive cache: expiry is enforced on read, nothing runs in the background.
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
            shutdown: CancellationToken::new(),
        }
    }

    /// A cache with a background sweep evicting expired entries every `sweep_interval`.
    ///
    /// Must be called from within a tokio runtime. The sweep stops on
    /// [`dispose`](Self::dispose) or when the last `Arc` is dropped. A zero
    /// `sweep_interval` disables the sweep; expired entries still read as absent.
    pub fn create(ttl: Duration, sweep_interval: Duration) -> Arc<Self> {
        let cache = Arc::new(Self::new(ttl));
        if sweep_interval.is_zero() {
            tracing::debug!(?ttl, "Weather cache created without sweep");
            return cache;
        }
        let weak = Arc::downgrade(&cache);
        let shutdown = cache.shutdown.clone();
        tokio::spawn(sweep_loop(weak, shutdown, sweep_interval));
        tracing::debug!(?ttl, ?sweep_interval, "Weather cache created with sweep");
        cache
    }

    /// Build the key for a coordinate: `"{kind}:{lat:.2}:{lon:.2}"`.
    ///
    /// Rounding to two decimals (~1.1 km) makes nearby requests share an entry.
    pub fn make_key(lat: f64, lon: f64, kind: DataKind) -> String {
        format!("{}:{:.2}:{:.2}", kind, round2(lat), round2(lon))
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Fetch a live entry. Expired entries, and entries of another type, read as absent.
    pub fn get<T>(&self, key: &str) -> Option<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        let now = Instant::now();
        {
            let entries = self.entries.read();
            let entry = entries.get(key)?;
            if !entry.is_expired(now) {
                return entry.value.downcast_ref::<T>().cloned();
            }
        }

        let mut entries = self.entries.write();
        if entries.get(key).is_some_and(|e| e.is_expired(now)) {
            entries.remove(key);
        }
        None
    }

    /// Insert or replace an entry; the TTL starts now.
    pub fn set<T>(&self, key: &str, value: T)
    where
        T: Send + Sync + 'static,
    {
        let entry = CacheEntry {
            value: Arc::new(value),
            expires_at: Instant::now() + self.ttl,
        };
        self.entries.write().insert(key.to_string(), entry);
    }

    pub fn clear(&self) {
        let mut entries = self.entries.write();
        let count = entries.len();
        entries.clear();
        tracing::info!("Cleared {} cache entries", count);
    }

    /// Number of unexpired entries
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .read()
            .values()
            .filter(|e| !e.is_expired(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every expired entry, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, e| !e.is_expired(now));
        before - entries.len()
    }

    /// Stop the background sweep and release all entries.
    pub fn dispose(&self) {
        self.shutdown.cancel();
        self.entries.write().clear();
        tracing::debug!("Weather cache disposed");
    }
}

impl Drop for WeatherCache {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

fn round2(value: f64) -> f64 {
    // `+ 0.0` folds -0.00 into 0.00 so both sides of the meridian share a key
    (value * 100.0).round() / 100.0 + 0.0
}

async fn sweep_loop(cache: Weak<WeatherCache>, shutdown: CancellationToken, period: Duration) {
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                let Some(cache) = cache.upgrade() else { break };
                let removed = cache.purge_expired();
                if removed > 0 {
                    tracing::debug!("Cache sweep evicted {} expired entries", removed);
                }
            }
        }
    }
    tracing::debug!("Cache sweep stopped");
}
