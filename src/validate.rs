use crate::cache::TickerCache;
use crate::types::{now_millis, venue_pair_key, Ticker};
use dashmap::DashMap;
use std::fmt;
use std::time::Duration;

/// Why a tick was dropped. Logged alongside the venue and pair; rejected
/// ticks never reach the cache or the aggregator.
#[derive(Debug, Clone, PartialEq)]
pub enum RejectReason {
    PriceNotPositive { price: f64 },
    TimestampInFuture { ahead_ms: i64 },
    ExcessiveDeviation { deviation_pct: f64, last_good: f64 },
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::PriceNotPositive { price } => {
                write!(f, "price not positive: {price}")
            }
            RejectReason::TimestampInFuture { ahead_ms } => {
                write!(f, "timestamp {ahead_ms}ms in the future")
            }
            RejectReason::ExcessiveDeviation {
                deviation_pct,
                last_good,
            } => write!(
                f,
                "price deviates {deviation_pct:.1}% from last good {last_good}"
            ),
        }
    }
}

/// Anomaly filter for live ticks. Rules apply in order: non-positive price,
/// future-dated timestamp beyond the clock-skew window, then implausible
/// deviation from the last known good price unless a second venue
/// corroborates the new level.
pub struct Validator {
    max_deviation_pct: f64,
    clock_skew_ms: i64,
    last_good: DashMap<String, f64>,
}

impl Validator {
    pub fn new(max_deviation_pct: f64, clock_skew: Duration) -> Self {
        Self {
            max_deviation_pct,
            clock_skew_ms: clock_skew.as_millis() as i64,
            last_good: DashMap::new(),
        }
    }

    pub fn validate(&self, ticker: &Ticker, cache: &TickerCache) -> Result<(), RejectReason> {
        if !(ticker.price.is_finite() && ticker.price > 0.0) {
            return Err(RejectReason::PriceNotPositive {
                price: ticker.price,
            });
        }

        let ahead_ms = ticker.timestamp - now_millis();
        if ahead_ms > self.clock_skew_ms {
            return Err(RejectReason::TimestampInFuture { ahead_ms });
        }

        let key = venue_pair_key(&ticker.venue, &ticker.pair);
        if let Some(last_good) = self.last_good.get(&key).map(|v| *v) {
            let deviation_pct = (ticker.price - last_good).abs() / last_good * 100.0;
            if deviation_pct > self.max_deviation_pct && !self.corroborated(ticker, cache) {
                return Err(RejectReason::ExcessiveDeviation {
                    deviation_pct,
                    last_good,
                });
            }
        }

        self.last_good.insert(key, ticker.price);
        Ok(())
    }

    /// A large move is accepted when an independent venue already shows a
    /// fresh price within the deviation tolerance of the new level.
    fn corroborated(&self, ticker: &Ticker, cache: &TickerCache) -> bool {
        cache.fresh_for_pair(&ticker.pair).iter().any(|other| {
            other.venue != ticker.venue
                && other.price > 0.0
                && (ticker.price - other.price).abs() / other.price * 100.0
                    <= self.max_deviation_pct
        })
    }
}
