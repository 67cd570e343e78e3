// Venue Adapters - Project Beacon
//
// Adapters are pure parsing/mapping: they know a venue's endpoints, symbol
// conventions, and payload shapes, and they never perform I/O. That keeps
// every venue independently unit-testable against captured payloads.

mod binance;
mod kraken;
mod okx;

pub use binance::BinanceAdapter;
pub use kraken::KrakenAdapter;
pub use okx::OkxAdapter;

use crate::config::VenueConfig;
use crate::error::{EngineError, EngineResult};
use crate::types::Ticker;
use serde_json::Value;
use std::sync::Arc;

/// Per-venue contract: endpoint knowledge, symbol normalization, and payload
/// parsing into canonical [`Ticker`]s. Parsing failures for a single record
/// skip that record; they are never fatal to the batch.
pub trait VenueAdapter: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &'static str;

    fn rest_url(&self) -> &str;

    /// Push endpoint, if the venue has one.
    fn ws_url(&self) -> Option<&str>;

    /// Venue-native symbol to canonical `BASE/QUOTE`.
    fn normalize_symbol(&self, raw: &str) -> EngineResult<String>;

    /// Canonical `BASE/QUOTE` to venue-native symbol.
    fn venue_symbol(&self, pair: &str) -> String;

    /// Handshake frames to send after connecting. Empty for venues whose
    /// push feed needs no explicit subscribe.
    fn subscribe_messages(&self, pairs: &[String]) -> Vec<String>;

    /// Parse a full REST ticker snapshot body.
    fn parse_rest_snapshot(&self, body: &str) -> EngineResult<Vec<Ticker>>;

    /// Parse one inbound push frame. Control/ack frames and frames for
    /// other channels yield an empty vec.
    fn parse_push_frame(&self, frame: &str) -> Vec<Ticker>;

    /// Approximate liquidity multiplier relative to the largest venue.
    fn liquidity_factor(&self) -> f64;

    /// Typical quoted half-spread, in basis points.
    fn spread_bps(&self) -> f64;
}

/// Construct the adapter for a configured venue, applying endpoint
/// overrides. Unknown names fail fast.
pub fn build_adapter(config: &VenueConfig) -> EngineResult<Arc<dyn VenueAdapter>> {
    match config.name.as_str() {
        "binance" => Ok(Arc::new(BinanceAdapter::with_endpoints(
            config.rest_url.clone(),
            config.ws_url.clone(),
        ))),
        "okx" => Ok(Arc::new(OkxAdapter::with_endpoints(
            config.rest_url.clone(),
            config.ws_url.clone(),
        ))),
        "kraken" => Ok(Arc::new(KrakenAdapter::with_endpoints(
            config.rest_url.clone(),
            config.ws_url.clone(),
        ))),
        other => Err(EngineError::configuration(format!(
            "unknown venue: {other}"
        ))),
    }
}

/// Symbol-normalization rules for one venue: an alias table plus quote
/// suffixes in stripping order. Stablecoin suffixes come before major-coin
/// suffixes so `ETHBTC` resolves to `ETH/BTC` instead of tripping on a
/// `BTC` prefix match.
#[derive(Debug)]
pub struct SymbolRules {
    quote_suffixes: &'static [&'static str],
    aliases: &'static [(&'static str, &'static str)],
}

impl SymbolRules {
    pub const fn new(
        quote_suffixes: &'static [&'static str],
        aliases: &'static [(&'static str, &'static str)],
    ) -> Self {
        Self {
            quote_suffixes,
            aliases,
        }
    }

    /// Map a venue-native asset code to its canonical form.
    pub fn canonical_asset(&self, raw: &str) -> String {
        let upper = raw.to_uppercase();
        for (from, to) in self.aliases {
            if *from == upper {
                return (*to).to_string();
            }
        }
        upper
    }

    /// Map a canonical asset code back to the venue-native form.
    pub fn venue_asset(&self, canonical: &str) -> String {
        let upper = canonical.to_uppercase();
        for (from, to) in self.aliases {
            if *to == upper {
                return (*from).to_string();
            }
        }
        upper
    }

    /// Split a concatenated symbol (`BTCUSDT`) into canonical base/quote by
    /// trying quote suffixes in configured order.
    pub fn split_concatenated(&self, raw: &str) -> Option<(String, String)> {
        let upper = raw.to_uppercase();
        for suffix in self.quote_suffixes {
            if let Some(base) = upper.strip_suffix(suffix) {
                if base.len() >= 2 {
                    return Some((self.canonical_asset(base), self.canonical_asset(suffix)));
                }
            }
        }
        None
    }

    /// Split a delimited symbol (`BTC-USDT`, `XBT/USD`) into canonical
    /// base/quote.
    pub fn split_delimited(&self, raw: &str, delimiter: char) -> Option<(String, String)> {
        let (base, quote) = raw.split_once(delimiter)?;
        if base.is_empty() || quote.is_empty() {
            return None;
        }
        Some((self.canonical_asset(base), self.canonical_asset(quote)))
    }
}

/// Numeric field that may arrive as a JSON number or a string-encoded
/// number (venues disagree).
pub(crate) fn field_f64(value: &Value, key: &str) -> Option<f64> {
    match value.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

pub(crate) fn field_i64(value: &Value, key: &str) -> Option<i64> {
    match value.get(key)? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}
