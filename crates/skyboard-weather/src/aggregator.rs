//! Cache-first weather lookups, bundle assembly and live feeds.

use parking_lot::Mutex;
use skyboard_core::WeatherError;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::cache::{DataKind, WeatherCache};
use crate::feed::{SubscriptionRegistry, UpdateClock, WeatherFeed, FEED_BUFFER};
use crate::geocode::normalize_query;
use crate::provider::WeatherSource;
use crate::types::{City, Coordinate, CurrentWeather, ForecastDay, HourlyForecast};

/// Default period between pushes to a live subscriber
pub const DEFAULT_UPDATE_INTERVAL: Duration = Duration::from_secs(600);
/// Shortest accepted period between pushes
pub const MIN_UPDATE_INTERVAL: Duration = Duration::from_millis(10);

/// Combined result for one coordinate. Each slot fails independently.
#[derive(Debug)]
pub struct WeatherBundle {
    pub current: Result<CurrentWeather, WeatherError>,
    pub forecast: Result<Vec<ForecastDay>, WeatherError>,
    pub hourly: Result<Vec<HourlyForecast>, WeatherError>,
}

impl WeatherBundle {
    /// Failed slots, by field name
    pub fn errors(&self) -> Vec<(&'static str, &WeatherError)> {
        let mut errors = Vec::new();
        if let Err(e) = &self.current {
            errors.push(("current", e));
        }
        if let Err(e) = &self.forecast {
            errors.push(("forecast", e));
        }
        if let Err(e) = &self.hourly {
            errors.push(("hourly", e));
        }
        errors
    }

    pub fn is_total_failure(&self) -> bool {
        self.current.is_err() && self.forecast.is_err() && self.hourly.is_err()
    }
}

/// Per-key gates so concurrent misses for one key make a single upstream call.
#[derive(Debug, Default)]
struct InFlight {
    gates: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl InFlight {
    fn enter(&self, key: &str) -> GateTicket<'_> {
        let gate = self.gates.lock().entry(key.to_string()).or_default().clone();
        GateTicket {
            inflight: self,
            key: key.to_string(),
            gate: Some(gate),
        }
    }
}

/// One holder's share of a gate. Dropping the last share removes the gate,
/// whether the lookup finished or was cancelled mid-await.
struct GateTicket<'a> {
    inflight: &'a InFlight,
    key: String,
    gate: Option<Arc<tokio::sync::Mutex<()>>>,
}

impl GateTicket<'_> {
    async fn lock(&self) -> Option<tokio::sync::MutexGuard<'_, ()>> {
        match &self.gate {
            Some(gate) => Some(gate.lock().await),
            None => None,
        }
    }
}

impl Drop for GateTicket<'_> {
    fn drop(&mut self) {
        // Release our share under the map lock so the count check is exact
        let mut gates = self.inflight.gates.lock();
        drop(self.gate.take());
        if gates.get(&self.key).is_some_and(|g| Arc::strong_count(g) == 1) {
            gates.remove(&self.key);
        }
    }
}

#[derive(Debug)]
pub struct WeatherAggregator {
    source: Arc<dyn WeatherSource>,
    cache: Arc<WeatherCache>,
    inflight: InFlight,
    subscriptions: Arc<SubscriptionRegistry>,
    update_interval: Duration,
}

impl WeatherAggregator {
    pub fn new(source: Arc<dyn WeatherSource>, cache: Arc<WeatherCache>) -> Self {
        Self {
            source,
            cache,
            inflight: InFlight::default(),
            subscriptions: Arc::new(SubscriptionRegistry::default()),
            update_interval: DEFAULT_UPDATE_INTERVAL,
        }
    }

    /// Set the live feed period. Periods below `MIN_UPDATE_INTERVAL` are raised to it.
    pub fn with_update_interval(mut self, interval: Duration) -> Self {
        if interval < MIN_UPDATE_INTERVAL {
            tracing::warn!(
                "Update interval {:?} too short, using {:?}",
                interval,
                MIN_UPDATE_INTERVAL
            );
        }
        self.update_interval = interval.max(MIN_UPDATE_INTERVAL);
        self
    }

    pub fn cache(&self) -> &WeatherCache {
        &self.cache
    }

    pub fn active_subscriptions(&self) -> usize {
        self.subscriptions.len()
    }

    /// Cancel a subscription by id. Dropping its feed has the same effect.
    pub fn unsubscribe(&self, id: u64) -> bool {
        self.subscriptions.cancel(id)
    }

    pub async fn current(&self, coord: Coordinate) -> Result<CurrentWeather, WeatherError> {
        self.cached(DataKind::Current, coord, || self.source.get_current_weather(coord))
            .await
    }

    pub async fn forecast(&self, coord: Coordinate) -> Result<Vec<ForecastDay>, WeatherError> {
        self.cached(DataKind::Forecast, coord, || self.source.get_forecast(coord))
            .await
    }

    pub async fn hourly(&self, coord: Coordinate) -> Result<Vec<HourlyForecast>, WeatherError> {
        self.cached(DataKind::Hourly, coord, || self.source.get_hourly_forecast(coord))
            .await
    }

    pub async fn reverse_geocode(&self, coord: Coordinate) -> Result<Option<City>, WeatherError> {
        self.cached(DataKind::Geo, coord, || self.source.reverse_geocode(coord))
            .await
    }

    /// City search is not cached; results depend on free text, not coordinates.
    pub async fn search_cities(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<City>, WeatherError> {
        let query = normalize_query(query)?;
        self.source.search_cities(query, limit).await
    }

    /// Fetch current, forecast and hourly concurrently.
    pub async fn bundle(&self, coord: Coordinate) -> WeatherBundle {
        let (current, forecast, hourly) =
            tokio::join!(self.current(coord), self.forecast(coord), self.hourly(coord));

        let bundle = WeatherBundle {
            current,
            forecast,
            hourly,
        };
        for (field, err) in bundle.errors() {
            tracing::warn!("Bundle for {}: {} failed: {}", coord, field, err);
        }
        bundle
    }

    /// Start a live feed: the current snapshot now, then a fresh one every interval.
    ///
    /// Fails if the initial snapshot can't be fetched. Later fetch failures are
    /// logged and that tick is skipped.
    pub async fn subscribe(
        self: &Arc<Self>,
        coord: Coordinate,
    ) -> Result<WeatherFeed, WeatherError> {
        let first = self.current(coord).await?;

        let (id, cancel) = self.subscriptions.register();
        let (tx, rx) = mpsc::channel(FEED_BUFFER);
        tokio::spawn(run_feed(Arc::clone(self), coord, id, cancel, tx, first));

        tracing::info!(
            "Subscription {} started for {} ({} active)",
            id,
            coord,
            self.subscriptions.len()
        );
        Ok(WeatherFeed::new(id, rx, Arc::clone(&self.subscriptions)))
    }

    async fn cached<T, F, Fut>(
        &self,
        kind: DataKind,
        coord: Coordinate,
        fetch: F,
    ) -> Result<T, WeatherError>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, WeatherError>>,
    {
        let key = WeatherCache::make_key(coord.lat(), coord.lon(), kind);
        if let Some(hit) = self.cache.get::<T>(&key) {
            tracing::debug!("Cache hit: {}", key);
            return Ok(hit);
        }

        let ticket = self.inflight.enter(&key);
        let _guard = ticket.lock().await;
        match self.cache.get::<T>(&key) {
            Some(hit) => {
                tracing::debug!("Cache filled by concurrent request: {}", key);
                Ok(hit)
            }
            None => {
                tracing::debug!("Cache miss: {}", key);
                let fresh = fetch().await;
                if let Ok(value) = &fresh {
                    self.cache.set(&key, value.clone());
                }
                fresh
            }
        }
    }
}

async fn run_feed(
    aggregator: Arc<WeatherAggregator>,
    coord: Coordinate,
    id: u64,
    cancel: CancellationToken,
    tx: mpsc::Sender<crate::types::WeatherUpdate>,
    first: CurrentWeather,
) {
    let period = aggregator.update_interval;
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut clock = UpdateClock::default();
    let mut pending = Some(first);

    loop {
        if let Some(current) = pending.take() {
            let update = clock.stamp(coord, current);
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                sent = tx.send(update) => {
                    if sent.is_err() {
                        break;
                    }
                }
            }
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let fetched = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            result = aggregator.current(coord) => result,
        };
        match fetched {
            Ok(current) => pending = Some(current),
            Err(e) => tracing::warn!("Subscription {} skipped an update: {}", id, e),
        }
    }

    aggregator.subscriptions.cancel(id);
    tracing::debug!("Subscription {} stopped", id);
}
