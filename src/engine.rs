// Engine - Project Beacon
// "Light the beacons: every pair, every venue, one snapshot"

use crate::aggregate::{Aggregator, Snapshot};
use crate::backoff::BackoffPolicy;
use crate::broadcast::{Broadcaster, SubscriptionHandle};
use crate::cache::TickerCache;
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::fallback::{FallbackSynthesizer, VenueProfile};
use crate::health::{HealthMonitor, VenueReport};
use crate::poller::RestPoller;
use crate::socket::SocketSubscriber;
use crate::types::{now_millis, Ticker};
use crate::validate::Validator;
use crate::venue::{build_adapter, VenueAdapter};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch, Notify};
use tokio::task::JoinHandle;
use tracing::info;
use url::Url;

struct RunState {
    shutdown_tx: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

/// The live market-data aggregation engine: an explicitly constructed value
/// owning its cache, venue adapters, and subscriber registry, with no
/// process-wide globals. Construct with [`Engine::new`], drive with
/// `start`/`stop`, consume via `subscribe` or the pull queries.
///
/// `start` and `subscribe` must be called from within a tokio runtime.
pub struct Engine {
    config: EngineConfig,
    adapters: Vec<Arc<dyn VenueAdapter>>,
    profiles: Vec<VenueProfile>,
    cache: Arc<TickerCache>,
    validator: Arc<Validator>,
    fallback: Arc<FallbackSynthesizer>,
    health: Arc<HealthMonitor>,
    broadcaster: Broadcaster,
    snapshot_tx: Arc<watch::Sender<Snapshot>>,
    snapshot_rx: watch::Receiver<Snapshot>,
    burst: Arc<Notify>,
    universe: Arc<HashSet<String>>,
    run: Mutex<Option<RunState>>,
}

impl Engine {
    /// Build the engine, failing fast on configuration errors (unknown
    /// venue, malformed pair, bad endpoint URL) before any task spawns.
    pub fn new(config: EngineConfig) -> EngineResult<Self> {
        config.validate()?;

        let mut adapters = Vec::with_capacity(config.venues.len());
        let mut profiles = Vec::with_capacity(config.venues.len());
        for venue_config in &config.venues {
            let adapter = build_adapter(venue_config)?;
            if venue_config.use_socket {
                if let Some(ws_url) = adapter.ws_url() {
                    Url::parse(ws_url).map_err(|e| {
                        EngineError::invalid_config_value(
                            format!("{}.ws_url", venue_config.name),
                            format!("{ws_url}: {e}"),
                        )
                    })?;
                }
            }
            profiles.push(VenueProfile {
                name: adapter.name().to_string(),
                spread_bps: adapter.spread_bps(),
                liquidity_factor: adapter.liquidity_factor(),
            });
            adapters.push(adapter);
        }

        let health = Arc::new(HealthMonitor::new(config.heartbeat_timeout));
        for adapter in &adapters {
            health.register(adapter.name());
        }

        let (snapshot_tx, snapshot_rx) = watch::channel::<Snapshot>(Arc::from(Vec::new()));
        let universe: HashSet<String> = config.pairs.iter().cloned().collect();

        Ok(Self {
            cache: Arc::new(TickerCache::new(config.cache_ttl)),
            validator: Arc::new(Validator::new(config.max_deviation_pct, config.clock_skew)),
            fallback: Arc::new(FallbackSynthesizer::new(
                config.fallback_seed,
                config.poll_interval,
                config.baseline_prices.clone(),
            )),
            health,
            broadcaster: Broadcaster::new(),
            snapshot_tx: Arc::new(snapshot_tx),
            snapshot_rx,
            burst: Arc::new(Notify::new()),
            universe: Arc::new(universe),
            run: Mutex::new(None),
            adapters,
            profiles,
            config,
        })
    }

    /// Spawn every venue task, the aggregator actor, the health sweep, and
    /// the broadcast timer. Errors if already running.
    pub fn start(&self) -> EngineResult<()> {
        let mut run = self.lock_run();
        if run.is_some() {
            return Err(EngineError::AlreadyRunning);
        }

        // The only fallible step: build every venue's HTTP client before
        // any task spawns, so a failed start leaves nothing running.
        let mut clients = Vec::with_capacity(self.adapters.len());
        for _ in &self.adapters {
            clients.push(
                reqwest::Client::builder()
                    .timeout(self.config.rest_timeout)
                    .build()
                    .map_err(|e| EngineError::internal(format!("http client: {e}")))?,
            );
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (update_tx, update_rx) = mpsc::channel::<Ticker>(1024);
        let mut handles = Vec::new();

        handles.push(
            Aggregator {
                cache: Arc::clone(&self.cache),
                fallback: Arc::clone(&self.fallback),
                profiles: self.profiles.clone(),
                pairs: self.config.pairs.clone(),
                snapshot_tx: Arc::clone(&self.snapshot_tx),
                burst: Arc::clone(&self.burst),
                rebuild_interval: self.config.poll_interval,
            }
            .spawn(update_rx, shutdown_rx.clone()),
        );

        for ((adapter, venue_config), client) in
            self.adapters.iter().zip(&self.config.venues).zip(clients)
        {
            handles.push(
                RestPoller {
                    adapter: Arc::clone(adapter),
                    client,
                    cache: Arc::clone(&self.cache),
                    validator: Arc::clone(&self.validator),
                    health: Arc::clone(&self.health),
                    universe: Arc::clone(&self.universe),
                    poll_interval: self.config.poll_interval,
                    retries: self.config.rest_retries,
                    retry_backoff: BackoffPolicy::new(
                        self.config.rest_retry_backoff,
                        self.config.rest_retry_backoff * 4,
                        self.config.backoff_seed,
                    ),
                }
                .spawn(shutdown_rx.clone()),
            );

            if venue_config.use_socket && adapter.ws_url().is_some() {
                let (command_tx, command_rx) = mpsc::channel(1);
                self.health.register_reconnect(adapter.name(), command_tx);

                handles.push(
                    SocketSubscriber {
                        adapter: Arc::clone(adapter),
                        cache: Arc::clone(&self.cache),
                        validator: Arc::clone(&self.validator),
                        health: Arc::clone(&self.health),
                        universe: Arc::clone(&self.universe),
                        pairs: self.config.pairs.clone(),
                        update_tx: update_tx.clone(),
                        connect_timeout: self.config.connect_timeout,
                        heartbeat_timeout: self.config.heartbeat_timeout,
                        connection_lifetime: self.config.connection_lifetime,
                        backoff: BackoffPolicy::new(
                            self.config.backoff_base,
                            self.config.backoff_max,
                            self.config.backoff_seed,
                        ),
                    }
                    .spawn(shutdown_rx.clone(), command_rx),
                );
            }
        }

        let sweep_interval =
            (self.config.heartbeat_timeout / 4).max(Duration::from_millis(10));
        handles.push(self.health.spawn_sweep(sweep_interval, shutdown_rx.clone()));

        handles.push(self.broadcaster.spawn_delivery(
            self.snapshot_rx.clone(),
            Arc::clone(&self.burst),
            self.config.broadcast_interval,
            shutdown_rx,
        ));

        *run = Some(RunState {
            shutdown_tx,
            handles,
        });
        info!(
            venues = self.adapters.len(),
            pairs = self.config.pairs.len(),
            "🔥 engine started; the beacons are lit"
        );
        Ok(())
    }

    /// Graceful shutdown: signal every task, then await each with a grace
    /// window bounded by the per-request timeout; stragglers are aborted so
    /// no task or connection leaks.
    pub async fn stop(&self) -> EngineResult<()> {
        let state = self.lock_run().take().ok_or(EngineError::NotRunning)?;
        let _ = state.shutdown_tx.send(true);

        let grace = self.config.rest_timeout + Duration::from_secs(2);
        for mut handle in state.handles {
            if tokio::time::timeout(grace, &mut handle).await.is_err() {
                handle.abort();
            }
        }

        info!("🌙 engine stopped");
        Ok(())
    }

    /// Push-style consumption. The handle unsubscribes on drop.
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionHandle
    where
        F: Fn(Snapshot) + Send + Sync + 'static,
    {
        self.broadcaster.subscribe(callback)
    }

    /// Immediate read of the most recent merged view, without waiting for a
    /// new cycle. Empty until the first rebuild after `start`.
    pub fn get_last_snapshot(&self) -> Snapshot {
        self.snapshot_rx.borrow().clone()
    }

    /// Pull-style single lookup: the fresh cached value when one exists,
    /// otherwise a `Fallback`-tagged synthesized value. `None` strictly
    /// means the venue or pair is outside the configured universe.
    pub fn get_pair_ticker(&self, venue: &str, pair: &str) -> Option<Ticker> {
        let profile = self.profiles.iter().find(|p| p.name == venue)?;
        if !self.universe.contains(pair) {
            return None;
        }
        if let Some(live) = self.cache.get(venue, pair) {
            return Some(live);
        }
        let continuity = self.cache.get_any(venue, pair);
        self.fallback
            .synthesize(profile, pair, now_millis(), continuity.as_ref())
    }

    pub fn get_pair_price(&self, venue: &str, pair: &str) -> Option<f64> {
        self.get_pair_ticker(venue, pair).map(|t| t.price)
    }

    /// Observability only; aggregation correctness never depends on it.
    pub fn is_venue_healthy(&self, venue: &str) -> bool {
        self.health.is_venue_healthy(venue)
    }

    pub fn health_report(&self) -> Vec<VenueReport> {
        self.health.report()
    }

    fn lock_run(&self) -> std::sync::MutexGuard<'_, Option<RunState>> {
        match self.run.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
