// Core Types - Project Beacon
// "One price, whatever the weather"

use serde::{Deserialize, Serialize};
use std::fmt;

/// Provenance of a ticker: observed live from a venue, or synthesized
/// because no live source was available.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TickerSource {
    Live,
    Fallback,
}

/// Delivery path of an update. Engine-internal: used only to break
/// equal-timestamp ties in the merge (push is assumed lower-latency).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOrigin {
    Poll,
    Push,
}

/// One normalized price observation for a (venue, pair) at a point in time.
///
/// Invariants: `price > 0` and `pair` is canonical `BASE/QUOTE`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticker {
    pub venue: String,
    pub pair: String,
    pub price: f64,
    pub change24h: f64,
    pub volume: f64,
    pub high24h: f64,
    pub low24h: f64,
    /// Unix milliseconds.
    pub timestamp: i64,
    pub source: TickerSource,
}

/// Per-venue connection lifecycle. Stored as an atomic u8 in the health
/// monitor so every task can read it lock-free.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum ConnectionState {
    Disconnected = 0,
    Connecting = 1,
    Connected = 2,
    Reconnecting = 3,
}

impl ConnectionState {
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => ConnectionState::Connecting,
            2 => ConnectionState::Connected,
            3 => ConnectionState::Reconnecting,
            _ => ConnectionState::Disconnected,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Reconnecting => write!(f, "reconnecting"),
        }
    }
}

/// Composite storage key (format: "venue:pair").
pub fn venue_pair_key(venue: &str, pair: &str) -> String {
    format!("{venue}:{pair}")
}

/// Parse venue and pair from a composite storage key.
pub fn parse_venue_pair_key(key: &str) -> Option<(&str, &str)> {
    key.split_once(':')
}

/// Current wall clock as unix milliseconds.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_state_round_trips_through_u8() {
        for state in [
            ConnectionState::Disconnected,
            ConnectionState::Connecting,
            ConnectionState::Connected,
            ConnectionState::Reconnecting,
        ] {
            assert_eq!(ConnectionState::from_u8(state.as_u8()), state);
        }
        // Unknown values degrade to Disconnected rather than panicking.
        assert_eq!(ConnectionState::from_u8(42), ConnectionState::Disconnected);
    }

    #[test]
    fn composite_key_round_trips() {
        let key = venue_pair_key("binance", "BTC/USDT");
        assert_eq!(key, "binance:BTC/USDT");
        assert_eq!(parse_venue_pair_key(&key), Some(("binance", "BTC/USDT")));
        assert_eq!(parse_venue_pair_key("no-separator"), None);
    }

    #[test]
    fn ticker_source_serializes_lowercase() {
        let json = serde_json::to_string(&TickerSource::Fallback).unwrap();
        assert_eq!(json, "\"fallback\"");
    }
}
