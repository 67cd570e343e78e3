// Broadcaster - Project Beacon
//
// Snapshot fan-out with a subscription-handle pattern: `subscribe` returns
// a handle that removes itself, so there are no index-based races under
// concurrent subscribe/unsubscribe. Each subscriber is isolated behind its
// own forwarding task: a slow or panicking callback can only hurt itself.

use crate::aggregate::Snapshot;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, watch, Notify};
use tokio::task::JoinHandle;
use tracing::debug;

type SubscriberMap = DashMap<u64, mpsc::UnboundedSender<Snapshot>>;

pub struct Broadcaster {
    subscribers: Arc<SubscriberMap>,
    next_id: AtomicU64,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self {
            subscribers: Arc::new(DashMap::new()),
            next_id: AtomicU64::new(0),
        }
    }

    /// Register a snapshot consumer. Must be called from within a tokio
    /// runtime. Delivery is best-effort: the callback runs on a dedicated
    /// task fed by an unbounded queue, so it never backpressures the
    /// broadcaster or its peers. Dropping the handle unsubscribes.
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionHandle
    where
        F: Fn(Snapshot) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, mut rx) = mpsc::unbounded_channel::<Snapshot>();

        tokio::spawn(async move {
            while let Some(snapshot) = rx.recv().await {
                callback(snapshot);
            }
        });

        self.subscribers.insert(id, tx);
        SubscriptionHandle {
            id,
            subscribers: Arc::downgrade(&self.subscribers),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Delivery timer: publish the current merged snapshot on a fixed tick
    /// and opportunistically when the aggregator signals a drained push
    /// burst. Burst deliveries skip snapshots already sent.
    pub fn spawn_delivery(
        &self,
        snapshot_rx: watch::Receiver<Snapshot>,
        burst: Arc<Notify>,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let subscribers = Arc::clone(&self.subscribers);
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(interval);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            let mut last_sent: Option<Snapshot> = None;

            loop {
                tokio::select! {
                    _ = tick.tick() => {
                        deliver(&subscribers, &snapshot_rx, &mut last_sent, true);
                    }
                    _ = burst.notified() => {
                        deliver(&subscribers, &snapshot_rx, &mut last_sent, false);
                    }
                    _ = shutdown.changed() => break,
                }
            }
            debug!("broadcaster stopped");
        })
    }
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new()
    }
}

fn deliver(
    subscribers: &SubscriberMap,
    snapshot_rx: &watch::Receiver<Snapshot>,
    last_sent: &mut Option<Snapshot>,
    force: bool,
) {
    let snapshot = snapshot_rx.borrow().clone();
    if snapshot.is_empty() {
        // The aggregator has not produced a merged view yet.
        return;
    }
    if !force {
        if let Some(previous) = last_sent {
            if Arc::ptr_eq(previous, &snapshot) {
                return;
            }
        }
    }
    *last_sent = Some(snapshot.clone());

    // A dead forwarding task (panicked callback, dropped handle) just
    // falls out of the registry.
    subscribers.retain(|_, tx| tx.send(snapshot.clone()).is_ok());
}

/// Opaque unsubscribe token returned by `subscribe`. Unsubscribes on drop.
pub struct SubscriptionHandle {
    id: u64,
    subscribers: Weak<SubscriberMap>,
}

impl SubscriptionHandle {
    pub fn unsubscribe(self) {
        // Drop does the work.
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        if let Some(subscribers) = self.subscribers.upgrade() {
            subscribers.remove(&self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Ticker, TickerSource};
    use std::sync::atomic::AtomicUsize;
    use tokio::time::sleep;

    fn snapshot_of(price: f64) -> Snapshot {
        Arc::from(vec![Ticker {
            venue: "binance".to_string(),
            pair: "BTC/USDT".to_string(),
            price,
            change24h: 0.0,
            volume: 1.0,
            high24h: price,
            low24h: price,
            timestamp: 1,
            source: TickerSource::Live,
        }])
    }

    #[tokio::test]
    async fn subscribers_receive_ticks_until_unsubscribed() {
        let broadcaster = Broadcaster::new();
        let (_snapshot_tx, snapshot_rx) = watch::channel(snapshot_of(97_000.0));
        let burst = Arc::new(Notify::new());
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);

        let seen = Arc::new(AtomicUsize::new(0));
        let seen_in_callback = Arc::clone(&seen);
        let handle = broadcaster.subscribe(move |snapshot| {
            assert!(!snapshot.is_empty());
            seen_in_callback.fetch_add(1, Ordering::Relaxed);
        });
        assert_eq!(broadcaster.subscriber_count(), 1);

        let delivery = broadcaster.spawn_delivery(
            snapshot_rx,
            Arc::clone(&burst),
            Duration::from_millis(10),
            shutdown_rx,
        );

        sleep(Duration::from_millis(100)).await;
        assert!(seen.load(Ordering::Relaxed) > 0);

        handle.unsubscribe();
        sleep(Duration::from_millis(20)).await;
        let after_unsubscribe = seen.load(Ordering::Relaxed);
        sleep(Duration::from_millis(60)).await;
        assert_eq!(seen.load(Ordering::Relaxed), after_unsubscribe);
        assert_eq!(broadcaster.subscriber_count(), 0);

        delivery.abort();
    }

    #[tokio::test]
    async fn burst_delivery_skips_already_sent_snapshots() {
        let broadcaster = Broadcaster::new();
        let (snapshot_tx, snapshot_rx) = watch::channel(snapshot_of(97_000.0));
        let burst = Arc::new(Notify::new());
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);

        let seen = Arc::new(AtomicUsize::new(0));
        let seen_in_callback = Arc::clone(&seen);
        let _handle = broadcaster.subscribe(move |_| {
            seen_in_callback.fetch_add(1, Ordering::Relaxed);
        });

        // Slow tick: only bursts can deliver within the test window.
        let delivery = broadcaster.spawn_delivery(
            snapshot_rx,
            Arc::clone(&burst),
            Duration::from_secs(3600),
            shutdown_rx,
        );
        // The immediate first tick delivers once.
        sleep(Duration::from_millis(50)).await;
        let baseline = seen.load(Ordering::Relaxed);

        // Burst without a new snapshot: nothing to do.
        burst.notify_one();
        sleep(Duration::from_millis(50)).await;
        assert_eq!(seen.load(Ordering::Relaxed), baseline);

        // Burst after a new snapshot: delivered.
        snapshot_tx.send_replace(snapshot_of(97_100.0));
        burst.notify_one();
        sleep(Duration::from_millis(50)).await;
        assert_eq!(seen.load(Ordering::Relaxed), baseline + 1);

        delivery.abort();
    }

    #[tokio::test]
    async fn panicking_subscriber_does_not_stall_the_rest() {
        let broadcaster = Broadcaster::new();
        let (_snapshot_tx, snapshot_rx) = watch::channel(snapshot_of(97_000.0));
        let burst = Arc::new(Notify::new());
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);

        let _bad = broadcaster.subscribe(|_| panic!("subscriber bug"));

        let seen = Arc::new(AtomicUsize::new(0));
        let seen_in_callback = Arc::clone(&seen);
        let _good = broadcaster.subscribe(move |_| {
            seen_in_callback.fetch_add(1, Ordering::Relaxed);
        });

        let delivery = broadcaster.spawn_delivery(
            snapshot_rx,
            burst,
            Duration::from_millis(10),
            shutdown_rx,
        );

        sleep(Duration::from_millis(100)).await;
        assert!(seen.load(Ordering::Relaxed) > 0);

        delivery.abort();
    }
}
