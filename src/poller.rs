use crate::backoff::BackoffPolicy;
use crate::cache::TickerCache;
use crate::error::EngineResult;
use crate::health::HealthMonitor;
use crate::types::UpdateOrigin;
use crate::validate::Validator;
use crate::venue::VenueAdapter;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Periodic REST snapshot poller for one venue. Pulls the full ticker
/// snapshot, parses it via the venue's adapter, validates each record, and
/// writes accepted ones into the cache. Failures never propagate to other
/// venues: exhausted retries mark the venue degraded and let its cache
/// entries age toward TTL expiry, at which point queries fall back to
/// synthesis.
pub struct RestPoller {
    pub adapter: Arc<dyn VenueAdapter>,
    pub client: reqwest::Client,
    pub cache: Arc<TickerCache>,
    pub validator: Arc<Validator>,
    pub health: Arc<HealthMonitor>,
    pub universe: Arc<HashSet<String>>,
    pub poll_interval: Duration,
    pub retries: u32,
    pub retry_backoff: BackoffPolicy,
}

impl RestPoller {
    pub fn spawn(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(self.poll_interval);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = tick.tick() => self.poll_once().await,
                    _ = shutdown.changed() => break,
                }
            }
            debug!(venue = self.adapter.name(), "rest poller stopped");
        })
    }

    /// One poll cycle: a bounded-timeout GET with up to `retries` retries
    /// and capped backoff between attempts.
    pub async fn poll_once(&self) {
        let venue = self.adapter.name();

        for attempt in 0..=self.retries {
            match self.fetch_and_store().await {
                Ok(accepted) => {
                    self.health.record_update(venue);
                    debug!(venue, accepted, "snapshot poll complete");
                    return;
                }
                Err(error) => {
                    warn!(venue, attempt, %error, "snapshot poll failed");
                    if attempt < self.retries {
                        tokio::time::sleep(self.retry_backoff.delay(attempt)).await;
                    }
                }
            }
        }

        self.health.mark_degraded(venue);
        warn!(venue, "snapshot poll retries exhausted; cache will age toward fallback");
    }

    async fn fetch_and_store(&self) -> EngineResult<usize> {
        let body = self
            .client
            .get(self.adapter.rest_url())
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        let venue = self.adapter.name();
        let mut accepted = 0;
        for ticker in self.adapter.parse_rest_snapshot(&body)? {
            if !self.universe.contains(&ticker.pair) {
                continue;
            }
            match self.validator.validate(&ticker, &self.cache) {
                Ok(()) => {
                    if self.cache.put(ticker, UpdateOrigin::Poll) {
                        accepted += 1;
                    }
                }
                Err(reason) => {
                    warn!(venue, pair = %ticker.pair, %reason, "polled tick rejected");
                }
            }
        }
        Ok(accepted)
    }
}
