//! Rider position fixes.
//!
//! Rider devices report fixes as location pings. Each delivery has a feed that
//! fans pings out to live watchers and retains the last-known fix for map
//! display. `best_fix` selects the most accurate fix a watcher can obtain
//! within a bounded window.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::time::{self, Duration};
use uuid::Uuid;

use crate::utils::geo::LatLng;

/// A single device position report.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionFix {
    pub point: LatLng,
    /// Reported accuracy radius in meters; lower is better.
    pub accuracy_m: f64,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy)]
pub struct AcquireOptions {
    pub timeout: Duration,
    pub desired_accuracy_m: f64,
}

impl Default for AcquireOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            desired_accuracy_m: 50.0,
        }
    }
}

/// Upper bound on the one-shot retry after an empty watch window.
const SINGLE_SHOT_CAP: Duration = Duration::from_secs(15);

const FEED_CAPACITY: usize = 32;

/// Fan-out feed of fixes for one delivery.
pub struct FixFeed {
    tx: broadcast::Sender<PositionFix>,
    last: RwLock<Option<PositionFix>>,
}

impl FixFeed {
    fn new() -> Self {
        let (tx, _) = broadcast::channel(FEED_CAPACITY);
        Self {
            tx,
            last: RwLock::new(None),
        }
    }

    pub fn publish(&self, fix: PositionFix) {
        *self.last.write().unwrap() = Some(fix);
        // No live watchers is fine; the fix is still retained above.
        let _ = self.tx.send(fix);
    }

    pub fn last_fix(&self) -> Option<PositionFix> {
        *self.last.read().unwrap()
    }

    pub fn watch(&self) -> FixWatch {
        FixWatch {
            rx: self.tx.subscribe(),
        }
    }
}

/// A live subscription to a feed. Dropping it releases the watch.
pub struct FixWatch {
    rx: broadcast::Receiver<PositionFix>,
}

impl FixWatch {
    /// Next fix from the feed, or `None` once the feed is gone.
    pub async fn recv(&mut self) -> Option<PositionFix> {
        loop {
            match self.rx.recv().await {
                Ok(fix) => return Some(fix),
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

enum AcquirePhase {
    Watching,
    TimedOut,
}

/// Best-available fix from `feed` within `opts.timeout`.
///
/// Buffers fixes from a watch; a fix at or under the desired accuracy wins
/// immediately. At the deadline the lowest-accuracy-value buffered fix wins.
/// If nothing arrived at all, waits for one more fix bounded by
/// `min(timeout, 15s)`. Every path releases its watch exactly once and the
/// result is final; absence of a fix is `None`, never an error.
pub async fn best_fix(feed: &FixFeed, opts: AcquireOptions) -> Option<PositionFix> {
    let mut watch = feed.watch();
    let deadline = time::sleep(opts.timeout);
    tokio::pin!(deadline);

    let mut best: Option<PositionFix> = None;
    let mut phase = AcquirePhase::Watching;

    while let AcquirePhase::Watching = phase {
        tokio::select! {
            fix = watch.recv() => match fix {
                Some(fix) => {
                    if fix.accuracy_m <= opts.desired_accuracy_m {
                        return Some(fix);
                    }
                    if best.is_none_or(|b| fix.accuracy_m < b.accuracy_m) {
                        best = Some(fix);
                    }
                }
                None => phase = AcquirePhase::TimedOut,
            },
            _ = &mut deadline => phase = AcquirePhase::TimedOut,
        }
    }
    drop(watch);

    if best.is_some() {
        return best;
    }

    // Nothing buffered: one more chance on a fresh watch.
    let mut retry = feed.watch();
    time::timeout(opts.timeout.min(SINGLE_SHOT_CAP), retry.recv())
        .await
        .ok()
        .flatten()
}

/// Per-delivery feeds, created on first use.
pub struct FixRegistry {
    feeds: Mutex<HashMap<Uuid, Arc<FixFeed>>>,
}

impl FixRegistry {
    pub fn new() -> Self {
        Self {
            feeds: Mutex::new(HashMap::new()),
        }
    }

    pub fn feed(&self, delivery_id: Uuid) -> Arc<FixFeed> {
        let mut feeds = self.feeds.lock().unwrap();
        feeds
            .entry(delivery_id)
            .or_insert_with(|| Arc::new(FixFeed::new()))
            .clone()
    }

    pub fn publish(&self, delivery_id: Uuid, fix: PositionFix) {
        self.feed(delivery_id).publish(fix);
    }

    pub fn last_fix(&self, delivery_id: Uuid) -> Option<PositionFix> {
        let feeds = self.feeds.lock().unwrap();
        feeds.get(&delivery_id).and_then(|feed| feed.last_fix())
    }
}

impl Default for FixRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fix(accuracy_m: f64) -> PositionFix {
        PositionFix {
            point: LatLng::new(17.4, 78.5),
            accuracy_m,
            recorded_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_early_exit_on_accurate_fix() {
        let feed = FixFeed::new();
        let opts = AcquireOptions {
            timeout: Duration::from_millis(200),
            desired_accuracy_m: 50.0,
        };

        let acquire = best_fix(&feed, opts);
        tokio::pin!(acquire);

        // Give the watcher a moment to subscribe before publishing.
        tokio::select! {
            _ = &mut acquire => panic!("resolved before any fix"),
            _ = time::sleep(Duration::from_millis(10)) => {}
        }
        feed.publish(fix(30.0));

        let got = acquire.await.unwrap();
        assert_eq!(got.accuracy_m, 30.0);
    }

    #[tokio::test]
    async fn test_best_buffered_fix_after_timeout() {
        let feed = FixFeed::new();
        let opts = AcquireOptions {
            timeout: Duration::from_millis(60),
            desired_accuracy_m: 10.0,
        };

        let acquire = best_fix(&feed, opts);
        tokio::pin!(acquire);

        tokio::select! {
            _ = &mut acquire => panic!("resolved before timeout"),
            _ = time::sleep(Duration::from_millis(10)) => {}
        }
        feed.publish(fix(120.0));
        feed.publish(fix(80.0));
        feed.publish(fix(95.0));

        let got = acquire.await.unwrap();
        assert_eq!(got.accuracy_m, 80.0);
    }

    #[tokio::test]
    async fn test_single_shot_fallback() {
        let feed = Arc::new(FixFeed::new());
        let opts = AcquireOptions {
            timeout: Duration::from_millis(40),
            desired_accuracy_m: 10.0,
        };

        let publisher = {
            let feed = feed.clone();
            tokio::spawn(async move {
                // Lands after the watch window but inside the one-shot retry.
                time::sleep(Duration::from_millis(55)).await;
                feed.publish(fix(200.0));
            })
        };

        let got = best_fix(&feed, opts).await.unwrap();
        assert_eq!(got.accuracy_m, 200.0);
        publisher.await.unwrap();
    }

    #[tokio::test]
    async fn test_no_fix_is_none() {
        let feed = FixFeed::new();
        let opts = AcquireOptions {
            timeout: Duration::from_millis(20),
            desired_accuracy_m: 10.0,
        };
        assert!(best_fix(&feed, opts).await.is_none());
    }

    #[tokio::test]
    async fn test_registry_retains_last_fix() {
        let registry = FixRegistry::new();
        let delivery = Uuid::new_v4();
        assert!(registry.last_fix(delivery).is_none());

        registry.publish(delivery, fix(45.0));
        assert_eq!(registry.last_fix(delivery).unwrap().accuracy_m, 45.0);
    }
}
