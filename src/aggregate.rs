// Aggregator - Project Beacon
//
// Single serialization point for the merged view. All push updates funnel
// through one actor task, so the cache write-back and snapshot composition
// never race between the per-venue tasks.

use crate::cache::TickerCache;
use crate::fallback::{FallbackSynthesizer, VenueProfile};
use crate::types::{now_millis, Ticker, UpdateOrigin};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Notify};
use tokio::task::JoinHandle;
use tracing::debug;

/// The merged, deduplicated set of latest tickers across all tracked pairs.
pub type Snapshot = Arc<[Ticker]>;

pub struct Aggregator {
    pub cache: Arc<TickerCache>,
    pub fallback: Arc<FallbackSynthesizer>,
    pub profiles: Vec<VenueProfile>,
    pub pairs: Vec<String>,
    pub snapshot_tx: Arc<watch::Sender<Snapshot>>,
    /// Nudges the broadcaster after a drained burst of push updates.
    pub burst: Arc<Notify>,
    pub rebuild_interval: Duration,
}

impl Aggregator {
    pub fn spawn(
        self,
        mut update_rx: mpsc::Receiver<Ticker>,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(self.rebuild_interval);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            let mut updates_open = true;

            loop {
                tokio::select! {
                    update = update_rx.recv(), if updates_open => match update {
                        Some(ticker) => {
                            let mut applied = self.cache.put(ticker, UpdateOrigin::Push);
                            // Drain the burst before rebuilding once.
                            while let Ok(ticker) = update_rx.try_recv() {
                                applied |= self.cache.put(ticker, UpdateOrigin::Push);
                            }
                            self.rebuild();
                            if applied {
                                self.burst.notify_one();
                            }
                        }
                        None => updates_open = false,
                    },
                    _ = tick.tick() => self.rebuild(),
                    _ = shutdown.changed() => break,
                }
            }
            debug!("aggregator stopped");
        })
    }

    /// Compose and publish the merged snapshot: for every configured
    /// (venue, pair), the fresh cache entry if one exists, otherwise a
    /// synthesized fallback, so the universe is always fully covered.
    fn rebuild(&self) {
        let now = now_millis();
        let mut merged = Vec::with_capacity(self.profiles.len() * self.pairs.len());

        for profile in &self.profiles {
            for pair in &self.pairs {
                if let Some(live) = self.cache.get(&profile.name, pair) {
                    merged.push(live);
                } else {
                    let continuity = self.cache.get_any(&profile.name, pair);
                    if let Some(synthetic) =
                        self.fallback
                            .synthesize(profile, pair, now, continuity.as_ref())
                    {
                        merged.push(synthetic);
                    }
                }
            }
        }

        self.snapshot_tx.send_replace(Arc::from(merged));
    }
}
