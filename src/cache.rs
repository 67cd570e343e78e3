use crate::types::{now_millis, venue_pair_key, Ticker, UpdateOrigin};
use dashmap::DashMap;
use std::time::Duration;

/// One cached observation. `inserted_at` (receipt time) drives the TTL;
/// `ticker.timestamp` (event time) drives the monotonic overwrite rule.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub ticker: Ticker,
    pub origin: UpdateOrigin,
    pub inserted_at: i64,
}

/// Latest-ticker store keyed by `venue:pair`. The only structure in the
/// engine with concurrent writers; per-key locking comes from the map's
/// sharding. TTL is a read-time filter, not an eager eviction: expired
/// entries remain until overwritten and still seed fallback continuity.
pub struct TickerCache {
    entries: DashMap<String, CacheEntry>,
    ttl_ms: i64,
}

impl TickerCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl_ms: ttl.as_millis() as i64,
        }
    }

    /// Insert or overwrite under the monotonic-per-key rule: strictly newer
    /// event timestamps win; an exact tie is applied only when it upgrades a
    /// Poll entry to a Push one. Returns whether the write was applied.
    /// Out-of-order and stale updates are silently dropped.
    pub fn put(&self, ticker: Ticker, origin: UpdateOrigin) -> bool {
        use dashmap::mapref::entry::Entry;

        let key = venue_pair_key(&ticker.venue, &ticker.pair);
        let entry = CacheEntry {
            ticker,
            origin,
            inserted_at: now_millis(),
        };

        match self.entries.entry(key) {
            Entry::Vacant(slot) => {
                slot.insert(entry);
                true
            }
            Entry::Occupied(mut slot) => {
                let existing = slot.get();
                let newer = entry.ticker.timestamp > existing.ticker.timestamp;
                let push_upgrade = entry.ticker.timestamp == existing.ticker.timestamp
                    && origin == UpdateOrigin::Push
                    && existing.origin == UpdateOrigin::Poll;

                if newer || push_upgrade {
                    slot.insert(entry);
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Latest ticker for a key, fresh entries only.
    pub fn get(&self, venue: &str, pair: &str) -> Option<Ticker> {
        let now = now_millis();
        self.entries
            .get(&venue_pair_key(venue, pair))
            .filter(|e| self.is_fresh(e, now))
            .map(|e| e.ticker.clone())
    }

    /// Latest ticker for a key regardless of freshness.
    pub fn get_any(&self, venue: &str, pair: &str) -> Option<Ticker> {
        self.entries
            .get(&venue_pair_key(venue, pair))
            .map(|e| e.ticker.clone())
    }

    /// All unexpired entries.
    pub fn fresh_snapshot(&self) -> Vec<(Ticker, UpdateOrigin)> {
        let now = now_millis();
        self.entries
            .iter()
            .filter(|e| self.is_fresh(e.value(), now))
            .map(|e| (e.value().ticker.clone(), e.value().origin))
            .collect()
    }

    /// Unexpired entries for one canonical pair across all venues.
    pub fn fresh_for_pair(&self, pair: &str) -> Vec<Ticker> {
        let now = now_millis();
        self.entries
            .iter()
            .filter(|e| e.value().ticker.pair == pair && self.is_fresh(e.value(), now))
            .map(|e| e.value().ticker.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn is_fresh(&self, entry: &CacheEntry, now: i64) -> bool {
        now - entry.inserted_at <= self.ttl_ms
    }
}
