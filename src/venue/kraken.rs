//! Kraken adapter: keyed-object REST snapshot with positional arrays,
//! positional-array push frames, `XBT`-style asset aliases.

use crate::error::{EngineError, EngineResult};
use crate::types::{now_millis, Ticker, TickerSource};
use crate::venue::{SymbolRules, VenueAdapter};
use serde_json::{json, Value};

const DEFAULT_REST_URL: &str = "https://api.kraken.com/0/public/Ticker";
const DEFAULT_WS_URL: &str = "wss://ws.kraken.com";

// REST keys concatenate classified codes (`XXBTZUSD`); websocket pairs are
// slash-delimited (`XBT/USD`). Stablecoins first, then classified/plain
// fiat, then majors.
const QUOTE_SUFFIXES: &[&str] = &[
    "USDT", "USDC", "ZUSD", "USD", "ZEUR", "EUR", "XXBT", "XBT", "XETH", "ETH",
];

const ALIASES: &[(&str, &str)] = &[
    ("XBT", "BTC"),
    ("XXBT", "BTC"),
    ("XETH", "ETH"),
    ("XXRP", "XRP"),
    ("XDG", "DOGE"),
    ("XXDG", "DOGE"),
    ("XXLM", "XLM"),
    ("XLTC", "LTC"),
    ("ZUSD", "USD"),
    ("ZEUR", "EUR"),
];

#[derive(Debug)]
pub struct KrakenAdapter {
    rest_url: String,
    ws_url: String,
    rules: SymbolRules,
}

impl KrakenAdapter {
    pub fn new() -> Self {
        Self::with_endpoints(None, None)
    }

    pub fn with_endpoints(rest_url: Option<String>, ws_url: Option<String>) -> Self {
        Self {
            rest_url: rest_url.unwrap_or_else(|| DEFAULT_REST_URL.to_string()),
            ws_url: ws_url.unwrap_or_else(|| DEFAULT_WS_URL.to_string()),
            rules: SymbolRules::new(QUOTE_SUFFIXES, ALIASES),
        }
    }

    /// Ticker payload fields are positional arrays: `c` = [last, lot],
    /// `v`/`h`/`l` = [today, last-24h].
    fn payload_to_ticker(&self, pair: String, payload: &Value) -> Option<Ticker> {
        let price = positional_f64(payload, "c", 0)?;
        let open = open_price(payload).unwrap_or(0.0);
        let change24h = if open > 0.0 {
            (price - open) / open * 100.0
        } else {
            0.0
        };

        Some(Ticker {
            venue: self.name().to_string(),
            pair,
            price,
            change24h,
            volume: positional_f64(payload, "v", 1).unwrap_or(0.0),
            high24h: positional_f64(payload, "h", 1).unwrap_or(price),
            low24h: positional_f64(payload, "l", 1).unwrap_or(price),
            // Kraken ticker payloads carry no event timestamp.
            timestamp: now_millis(),
            source: TickerSource::Live,
        })
    }
}

impl Default for KrakenAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl VenueAdapter for KrakenAdapter {
    fn name(&self) -> &'static str {
        "kraken"
    }

    fn rest_url(&self) -> &str {
        &self.rest_url
    }

    fn ws_url(&self) -> Option<&str> {
        Some(&self.ws_url)
    }

    fn normalize_symbol(&self, raw: &str) -> EngineResult<String> {
        let split = if raw.contains('/') {
            self.rules.split_delimited(raw, '/')
        } else {
            self.rules.split_concatenated(raw)
        };

        split
            .map(|(base, quote)| format!("{base}/{quote}"))
            .ok_or_else(|| EngineError::unknown_symbol(raw))
    }

    fn venue_symbol(&self, pair: &str) -> String {
        // Websocket pair format: slash-delimited, XBT/XDG for BTC/DOGE,
        // plain codes otherwise.
        pair.split('/')
            .map(|asset| match asset {
                "BTC" => "XBT",
                "DOGE" => "XDG",
                other => other,
            })
            .collect::<Vec<_>>()
            .join("/")
    }

    fn subscribe_messages(&self, pairs: &[String]) -> Vec<String> {
        let ws_pairs: Vec<String> = pairs.iter().map(|p| self.venue_symbol(p)).collect();

        vec![json!({
            "event": "subscribe",
            "pair": ws_pairs,
            "subscription": {"name": "ticker"}
        })
        .to_string()]
    }

    fn parse_rest_snapshot(&self, body: &str) -> EngineResult<Vec<Ticker>> {
        let value: Value = serde_json::from_str(body)?;

        if let Some(errors) = value.get("error").and_then(|e| e.as_array()) {
            if !errors.is_empty() {
                let joined: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
                return Err(EngineError::parse(format!(
                    "kraken snapshot error: {}",
                    joined.join(", ")
                )));
            }
        }

        let result = value
            .get("result")
            .and_then(|r| r.as_object())
            .ok_or_else(|| EngineError::parse("kraken snapshot missing result object"))?;

        Ok(result
            .iter()
            .filter_map(|(key, payload)| {
                let pair = self.normalize_symbol(key).ok()?;
                self.payload_to_ticker(pair, payload)
            })
            .collect())
    }

    fn parse_push_frame(&self, frame: &str) -> Vec<Ticker> {
        let Ok(value) = serde_json::from_str::<Value>(frame) else {
            return Vec::new();
        };

        // Event frames (heartbeat, systemStatus, subscriptionStatus) are
        // objects; data frames are positional arrays
        // [channelId, payload, channelName, pair].
        let Some(parts) = value.as_array() else {
            return Vec::new();
        };
        if parts.len() < 4 {
            return Vec::new();
        }
        if parts[2].as_str() != Some("ticker") {
            return Vec::new();
        }

        let Some(raw_pair) = parts[3].as_str() else {
            return Vec::new();
        };
        let Ok(pair) = self.normalize_symbol(raw_pair) else {
            return Vec::new();
        };

        self.payload_to_ticker(pair, &parts[1])
            .into_iter()
            .collect()
    }

    fn liquidity_factor(&self) -> f64 {
        0.4
    }

    fn spread_bps(&self) -> f64 {
        4.0
    }
}

fn positional_f64(payload: &Value, key: &str, index: usize) -> Option<f64> {
    let element = payload.get(key)?.as_array()?.get(index)?;
    match element {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// REST encodes `o` as a bare string (today's open); the websocket encodes
/// it as [today, last-24h].
fn open_price(payload: &Value) -> Option<f64> {
    match payload.get("o")? {
        Value::String(s) => s.parse().ok(),
        Value::Array(_) => {
            positional_f64(payload, "o", 1).or_else(|| positional_f64(payload, "o", 0))
        }
        Value::Number(n) => n.as_f64(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter() -> KrakenAdapter {
        KrakenAdapter::new()
    }

    #[test]
    fn normalizes_classified_rest_keys() {
        assert_eq!(adapter().normalize_symbol("XXBTZUSD").unwrap(), "BTC/USD");
        assert_eq!(adapter().normalize_symbol("XETHXXBT").unwrap(), "ETH/BTC");
        assert_eq!(adapter().normalize_symbol("ADAUSD").unwrap(), "ADA/USD");
        assert_eq!(adapter().normalize_symbol("SOLUSDT").unwrap(), "SOL/USDT");
    }

    #[test]
    fn normalizes_websocket_pairs() {
        assert_eq!(adapter().normalize_symbol("XBT/USD").unwrap(), "BTC/USD");
        assert_eq!(adapter().normalize_symbol("XDG/EUR").unwrap(), "DOGE/EUR");
        assert_eq!(adapter().normalize_symbol("ETH/USDT").unwrap(), "ETH/USDT");
    }

    #[test]
    fn venue_symbol_applies_reverse_aliases() {
        assert_eq!(adapter().venue_symbol("BTC/USD"), "XBT/USD");
        assert_eq!(adapter().venue_symbol("DOGE/USD"), "XDG/USD");
        assert_eq!(adapter().venue_symbol("ETH/USDT"), "ETH/USDT");
    }

    #[test]
    fn subscribe_message_requests_ticker_channel() {
        let msgs = adapter().subscribe_messages(&["BTC/USD".to_string()]);
        assert_eq!(msgs.len(), 1);
        let v: Value = serde_json::from_str(&msgs[0]).unwrap();
        assert_eq!(v["event"], "subscribe");
        assert_eq!(v["pair"][0], "XBT/USD");
        assert_eq!(v["subscription"]["name"], "ticker");
    }

    #[test]
    fn parses_keyed_rest_snapshot() {
        let body = r#"{"error":[],"result":{
            "XXBTZUSD":{"a":["97501.0","1","1.000"],"b":["97499.0","2","2.000"],
                        "c":["97500.0","0.01"],"v":["120.5","1400.2"],
                        "h":["98000.0","98200.0"],"l":["95000.0","94800.0"],"o":"96000.0"}
        }}"#;

        let tickers = adapter().parse_rest_snapshot(body).unwrap();
        assert_eq!(tickers.len(), 1);
        let t = &tickers[0];
        assert_eq!(t.pair, "BTC/USD");
        assert_eq!(t.price, 97500.0);
        assert_eq!(t.volume, 1400.2);
        assert_eq!(t.high24h, 98200.0);
        assert!((t.change24h - 1.5625).abs() < 1e-9);
    }

    #[test]
    fn rest_snapshot_surfaces_venue_errors() {
        let err = adapter()
            .parse_rest_snapshot(r#"{"error":["EQuery:Unknown asset pair"]}"#)
            .unwrap_err();
        assert!(err.to_string().contains("Unknown asset pair"));
    }

    #[test]
    fn parses_positional_push_frame() {
        let frame = r#"[340,
            {"a":["97511.0","1","1.000"],"b":["97509.0","1","1.000"],
             "c":["97510.0","0.02"],"v":["121.0","1401.0"],
             "h":["98000.0","98200.0"],"l":["95000.0","94800.0"],
             "o":["96500.0","96000.0"]},
            "ticker","XBT/USD"]"#;

        let tickers = adapter().parse_push_frame(frame);
        assert_eq!(tickers.len(), 1);
        let t = &tickers[0];
        assert_eq!(t.pair, "BTC/USD");
        assert_eq!(t.price, 97510.0);
        // Websocket `o` is positional; the 24h element is used.
        assert!((t.change24h - (97510.0 - 96000.0) / 96000.0 * 100.0).abs() < 1e-9);
    }

    #[test]
    fn push_frame_ignores_event_objects_and_other_channels() {
        assert!(adapter()
            .parse_push_frame(r#"{"event":"heartbeat"}"#)
            .is_empty());
        assert!(adapter()
            .parse_push_frame(r#"{"event":"systemStatus","status":"online"}"#)
            .is_empty());
        assert!(adapter()
            .parse_push_frame(r#"[42,{"b":[["97500.0","1.0"]]},"book-10","XBT/USD"]"#)
            .is_empty());
    }
}
