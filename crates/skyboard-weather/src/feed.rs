//! Live weather subscriptions.
//!
//! Every subscriber owns a [`WeatherFeed`]; the task pushing into it is keyed
//! by subscription id in a [`SubscriptionRegistry`] and torn down through its
//! cancellation token when the feed is dropped.

use chrono::{DateTime, Utc};
use futures::Stream;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::types::{Coordinate, CurrentWeather, WeatherUpdate};

/// Updates buffered per subscriber before the pushing task waits
pub(crate) const FEED_BUFFER: usize = 4;

#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    next_id: AtomicU64,
    active: Mutex<HashMap<u64, CancellationToken>>,
}

impl SubscriptionRegistry {
    pub(crate) fn register(&self) -> (u64, CancellationToken) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let token = CancellationToken::new();
        self.active.lock().insert(id, token.clone());
        (id, token)
    }

    /// Cancel and forget a subscription. Returns false if it was already gone.
    pub fn cancel(&self, id: u64) -> bool {
        match self.active.lock().remove(&id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.active.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Stream of [`WeatherUpdate`]s for one subscriber.
///
/// Dropping the feed stops its timer before the next push.
#[derive(Debug)]
pub struct WeatherFeed {
    id: u64,
    rx: mpsc::Receiver<WeatherUpdate>,
    registry: Arc<SubscriptionRegistry>,
}

impl WeatherFeed {
    pub(crate) fn new(
        id: u64,
        rx: mpsc::Receiver<WeatherUpdate>,
        registry: Arc<SubscriptionRegistry>,
    ) -> Self {
        Self { id, rx, registry }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Wait for the next update; `None` once the subscription has ended.
    pub async fn next_update(&mut self) -> Option<WeatherUpdate> {
        self.rx.recv().await
    }
}

impl Stream for WeatherFeed {
    type Item = WeatherUpdate;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for WeatherFeed {
    fn drop(&mut self) {
        if self.registry.cancel(self.id) {
            tracing::debug!("Subscription {} cancelled by subscriber", self.id);
        }
    }
}

/// Stamps snapshots with strictly increasing timestamps.
#[derive(Debug, Default)]
pub(crate) struct UpdateClock {
    last: Option<DateTime<Utc>>,
}

impl UpdateClock {
    pub(crate) fn stamp(&mut self, coord: Coordinate, current: CurrentWeather) -> WeatherUpdate {
        let mut now = Utc::now();
        if let Some(prev) = self.last {
            if now <= prev {
                now = prev + chrono::Duration::milliseconds(1);
            }
        }
        self.last = Some(now);

        WeatherUpdate {
            lat: coord.lat(),
            lon: coord.lon(),
            current,
            timestamp: now,
        }
    }
}
