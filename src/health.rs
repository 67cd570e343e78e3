// Health Monitoring - Project Beacon
// "The watchers on the wall, counting heartbeats"

use crate::types::{now_millis, ConnectionState};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Lock-free per-venue liveness state, written by the venue's tasks and
/// read by the sweep and by observability queries.
pub struct VenueHealth {
    state: AtomicU8,
    /// Unix millis of the last successful update (or state change to
    /// Connected); 0 means never.
    last_update_ms: AtomicI64,
    degraded: AtomicBool,
    reconnects: AtomicU64,
}

impl VenueHealth {
    fn new() -> Self {
        Self {
            state: AtomicU8::new(ConnectionState::Disconnected.as_u8()),
            last_update_ms: AtomicI64::new(0),
            degraded: AtomicBool::new(false),
            reconnects: AtomicU64::new(0),
        }
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Relaxed))
    }

    pub fn set_state(&self, state: ConnectionState) {
        if state == ConnectionState::Reconnecting {
            self.reconnects.fetch_add(1, Ordering::Relaxed);
        }
        if state == ConnectionState::Connected {
            // A fresh connection counts as activity so the sweep does not
            // immediately force-reconnect a socket that has no data yet.
            self.record_update_at(now_millis());
        }
        self.state.store(state.as_u8(), Ordering::Relaxed);
    }

    pub fn record_update_at(&self, at_ms: i64) {
        self.last_update_ms.store(at_ms, Ordering::Relaxed);
        self.degraded.store(false, Ordering::Relaxed);
    }

    pub fn mark_degraded(&self) {
        self.degraded.store(true, Ordering::Relaxed);
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Relaxed)
    }

    pub fn last_update_age_ms(&self, now: i64) -> Option<i64> {
        match self.last_update_ms.load(Ordering::Relaxed) {
            0 => None,
            at => Some(now - at),
        }
    }

    pub fn reconnects(&self) -> u64 {
        self.reconnects.load(Ordering::Relaxed)
    }
}

/// Point-in-time health view of one venue, for logging/observability only.
#[derive(Debug, Clone, Serialize)]
pub struct VenueReport {
    pub venue: String,
    pub state: ConnectionState,
    pub degraded: bool,
    pub last_update_age_ms: Option<i64>,
    pub reconnects: u64,
    pub healthy: bool,
}

/// Tracks per-venue connectivity and staleness. A venue that is `Connected`
/// but silent beyond the heartbeat window is commanded to reconnect; health
/// data is never consulted for aggregation correctness.
pub struct HealthMonitor {
    venues: DashMap<String, Arc<VenueHealth>>,
    reconnect_cmds: DashMap<String, mpsc::Sender<()>>,
    heartbeat_ms: i64,
}

impl HealthMonitor {
    pub fn new(heartbeat: Duration) -> Self {
        Self {
            venues: DashMap::new(),
            reconnect_cmds: DashMap::new(),
            heartbeat_ms: heartbeat.as_millis() as i64,
        }
    }

    pub fn register(&self, venue: &str) -> Arc<VenueHealth> {
        self.venues
            .entry(venue.to_string())
            .or_insert_with(|| Arc::new(VenueHealth::new()))
            .clone()
    }

    /// Register the command channel the sweep uses to force a venue's
    /// socket to reconnect.
    pub fn register_reconnect(&self, venue: &str, commands: mpsc::Sender<()>) {
        self.reconnect_cmds.insert(venue.to_string(), commands);
    }

    pub fn set_state(&self, venue: &str, state: ConnectionState) {
        self.register(venue).set_state(state);
    }

    pub fn record_update(&self, venue: &str) {
        self.register(venue).record_update_at(now_millis());
    }

    pub fn mark_degraded(&self, venue: &str) {
        self.register(venue).mark_degraded();
    }

    /// Observability query only; correctness never depends on it.
    pub fn is_venue_healthy(&self, venue: &str) -> bool {
        let Some(health) = self.venues.get(venue) else {
            return false;
        };
        if health.is_degraded() {
            return false;
        }
        health
            .last_update_age_ms(now_millis())
            .is_some_and(|age| age <= self.heartbeat_ms)
    }

    pub fn report(&self) -> Vec<VenueReport> {
        let now = now_millis();
        let mut reports: Vec<VenueReport> = self
            .venues
            .iter()
            .map(|entry| {
                let health = entry.value();
                VenueReport {
                    venue: entry.key().clone(),
                    state: health.state(),
                    degraded: health.is_degraded(),
                    last_update_age_ms: health.last_update_age_ms(now),
                    reconnects: health.reconnects(),
                    healthy: self.is_venue_healthy(entry.key()),
                }
            })
            .collect();
        reports.sort_by(|a, b| a.venue.cmp(&b.venue));
        reports
    }

    /// Periodic staleness sweep: command a reconnect for any venue that is
    /// nominally connected but silent past the heartbeat window.
    pub fn spawn_sweep(
        self: &Arc<Self>,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let monitor = Arc::clone(self);
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(interval);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = tick.tick() => monitor.sweep_once(),
                    _ = shutdown.changed() => break,
                }
            }
            debug!("health sweep stopped");
        })
    }

    fn sweep_once(&self) {
        let now = now_millis();
        for entry in self.venues.iter() {
            let health = entry.value();
            if health.state() != ConnectionState::Connected {
                continue;
            }
            let stale = health
                .last_update_age_ms(now)
                .is_some_and(|age| age > self.heartbeat_ms);
            if !stale {
                continue;
            }
            warn!(venue = %entry.key(), "connected but stale; commanding reconnect");
            if let Some(commands) = self.reconnect_cmds.get(entry.key()) {
                let _ = commands.try_send(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::timeout;

    #[test]
    fn reconnect_transitions_are_counted() {
        let monitor = HealthMonitor::new(Duration::from_secs(60));
        let health = monitor.register("binance");

        health.set_state(ConnectionState::Connecting);
        health.set_state(ConnectionState::Connected);
        health.set_state(ConnectionState::Disconnected);
        health.set_state(ConnectionState::Reconnecting);
        health.set_state(ConnectionState::Connecting);
        health.set_state(ConnectionState::Connected);

        assert_eq!(health.reconnects(), 1);
        assert_eq!(health.state(), ConnectionState::Connected);
    }

    #[test]
    fn healthy_requires_recent_updates_and_no_degradation() {
        let monitor = HealthMonitor::new(Duration::from_secs(60));
        assert!(!monitor.is_venue_healthy("unknown"));

        monitor.register("okx");
        // Never updated.
        assert!(!monitor.is_venue_healthy("okx"));

        monitor.record_update("okx");
        assert!(monitor.is_venue_healthy("okx"));

        monitor.mark_degraded("okx");
        assert!(!monitor.is_venue_healthy("okx"));

        // A later successful update clears degradation.
        monitor.record_update("okx");
        assert!(monitor.is_venue_healthy("okx"));
    }

    #[test]
    fn report_covers_every_registered_venue() {
        let monitor = HealthMonitor::new(Duration::from_secs(60));
        monitor.register("kraken");
        monitor.register("binance");
        monitor.set_state("binance", ConnectionState::Connected);

        let report = monitor.report();
        assert_eq!(report.len(), 2);
        assert_eq!(report[0].venue, "binance");
        assert_eq!(report[0].state, ConnectionState::Connected);
        assert_eq!(report[1].venue, "kraken");
        assert_eq!(report[1].state, ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn sweep_commands_reconnect_for_stale_connected_venues() {
        let monitor = Arc::new(HealthMonitor::new(Duration::from_millis(50)));
        let health = monitor.register("binance");
        let (cmd_tx, mut cmd_rx) = mpsc::channel(1);
        monitor.register_reconnect("binance", cmd_tx);

        health.set_state(ConnectionState::Connected);
        health.record_update_at(now_millis() - 10_000);

        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = monitor.spawn_sweep(Duration::from_millis(10), shutdown_rx);

        timeout(Duration::from_secs(2), cmd_rx.recv())
            .await
            .expect("sweep should command a reconnect")
            .expect("command channel open");

        handle.abort();
    }

    #[tokio::test]
    async fn sweep_leaves_fresh_connections_alone() {
        let monitor = Arc::new(HealthMonitor::new(Duration::from_secs(60)));
        let health = monitor.register("okx");
        let (cmd_tx, mut cmd_rx) = mpsc::channel(1);
        monitor.register_reconnect("okx", cmd_tx);

        health.set_state(ConnectionState::Connected);

        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = monitor.spawn_sweep(Duration::from_millis(10), shutdown_rx);

        assert!(timeout(Duration::from_millis(100), cmd_rx.recv())
            .await
            .is_err());

        handle.abort();
    }
}
