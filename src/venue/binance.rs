//! Binance adapter: flat JSON-array REST snapshot, `24hrTicker` push events.

use crate::error::{EngineError, EngineResult};
use crate::types::{now_millis, Ticker, TickerSource};
use crate::venue::{field_f64, field_i64, SymbolRules, VenueAdapter};
use serde_json::{json, Value};

const DEFAULT_REST_URL: &str = "https://api.binance.com/api/v3/ticker/24hr";
const DEFAULT_WS_URL: &str = "wss://stream.binance.com:9443/ws";

// Stablecoin quotes first, then majors, then fiat.
const QUOTE_SUFFIXES: &[&str] = &[
    "USDT", "FDUSD", "USDC", "TUSD", "BUSD", "DAI", "BTC", "ETH", "BNB", "EUR", "GBP", "TRY",
    "BRL", "USD",
];

#[derive(Debug)]
pub struct BinanceAdapter {
    rest_url: String,
    ws_url: String,
    rules: SymbolRules,
}

impl BinanceAdapter {
    pub fn new() -> Self {
        Self::with_endpoints(None, None)
    }

    pub fn with_endpoints(rest_url: Option<String>, ws_url: Option<String>) -> Self {
        Self {
            rest_url: rest_url.unwrap_or_else(|| DEFAULT_REST_URL.to_string()),
            ws_url: ws_url.unwrap_or_else(|| DEFAULT_WS_URL.to_string()),
            rules: SymbolRules::new(QUOTE_SUFFIXES, &[]),
        }
    }

    /// One ticker record, shared by the REST snapshot (long field names) and
    /// the `24hrTicker` stream event (single-letter field names).
    fn record_to_ticker(&self, record: &Value, rest_shape: bool) -> Option<Ticker> {
        let (symbol_key, price_key, change_key, volume_key, high_key, low_key, ts_key) =
            if rest_shape {
                ("symbol", "lastPrice", "priceChangePercent", "volume", "highPrice", "lowPrice", "closeTime")
            } else {
                ("s", "c", "P", "v", "h", "l", "E")
            };

        let raw_symbol = record.get(symbol_key)?.as_str()?;
        let pair = self.normalize_symbol(raw_symbol).ok()?;
        let price = field_f64(record, price_key)?;

        Some(Ticker {
            venue: self.name().to_string(),
            pair,
            price,
            change24h: field_f64(record, change_key).unwrap_or(0.0),
            volume: field_f64(record, volume_key).unwrap_or(0.0),
            high24h: field_f64(record, high_key).unwrap_or(price),
            low24h: field_f64(record, low_key).unwrap_or(price),
            timestamp: field_i64(record, ts_key).unwrap_or_else(now_millis),
            source: TickerSource::Live,
        })
    }
}

impl Default for BinanceAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl VenueAdapter for BinanceAdapter {
    fn name(&self) -> &'static str {
        "binance"
    }

    fn rest_url(&self) -> &str {
        &self.rest_url
    }

    fn ws_url(&self) -> Option<&str> {
        Some(&self.ws_url)
    }

    fn normalize_symbol(&self, raw: &str) -> EngineResult<String> {
        self.rules
            .split_concatenated(raw)
            .map(|(base, quote)| format!("{base}/{quote}"))
            .ok_or_else(|| EngineError::unknown_symbol(raw))
    }

    fn venue_symbol(&self, pair: &str) -> String {
        pair.replace('/', "")
    }

    fn subscribe_messages(&self, pairs: &[String]) -> Vec<String> {
        let params: Vec<String> = pairs
            .iter()
            .map(|p| format!("{}@ticker", self.venue_symbol(p).to_lowercase()))
            .collect();

        vec![json!({
            "method": "SUBSCRIBE",
            "params": params,
            "id": 1
        })
        .to_string()]
    }

    fn parse_rest_snapshot(&self, body: &str) -> EngineResult<Vec<Ticker>> {
        let value: Value = serde_json::from_str(body)?;
        let records = value
            .as_array()
            .ok_or_else(|| EngineError::parse("binance snapshot is not an array"))?;

        Ok(records
            .iter()
            .filter_map(|r| self.record_to_ticker(r, true))
            .collect())
    }

    fn parse_push_frame(&self, frame: &str) -> Vec<Ticker> {
        let Ok(value) = serde_json::from_str::<Value>(frame) else {
            return Vec::new();
        };

        // Combined streams wrap the event in a {stream, data} envelope.
        let event = match value.get("data") {
            Some(data) if value.get("stream").is_some() => data,
            _ => &value,
        };

        if event.get("e").and_then(|e| e.as_str()) != Some("24hrTicker") {
            return Vec::new();
        }

        self.record_to_ticker(event, false).into_iter().collect()
    }

    fn liquidity_factor(&self) -> f64 {
        1.0
    }

    fn spread_bps(&self) -> f64 {
        2.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter() -> BinanceAdapter {
        BinanceAdapter::new()
    }

    #[test]
    fn normalizes_concatenated_symbols() {
        assert_eq!(adapter().normalize_symbol("BTCUSDT").unwrap(), "BTC/USDT");
        assert_eq!(adapter().normalize_symbol("ETHBTC").unwrap(), "ETH/BTC");
        assert_eq!(adapter().normalize_symbol("solusdt").unwrap(), "SOL/USDT");
        assert!(adapter().normalize_symbol("???").is_err());
    }

    #[test]
    fn venue_symbol_strips_the_slash() {
        assert_eq!(adapter().venue_symbol("BTC/USDT"), "BTCUSDT");
    }

    #[test]
    fn subscribe_message_lists_lowercase_ticker_streams() {
        let msgs = adapter().subscribe_messages(&["BTC/USDT".to_string(), "ETH/BTC".to_string()]);
        assert_eq!(msgs.len(), 1);
        let v: Value = serde_json::from_str(&msgs[0]).unwrap();
        assert_eq!(v["method"], "SUBSCRIBE");
        assert_eq!(v["params"][0], "btcusdt@ticker");
        assert_eq!(v["params"][1], "ethbtc@ticker");
    }

    #[test]
    fn parses_rest_snapshot() {
        let body = r#"[
            {"symbol":"BTCUSDT","lastPrice":"97500.00","priceChangePercent":"2.5",
             "volume":"12345.6","highPrice":"98000.00","lowPrice":"95000.00","closeTime":1754300000000},
            {"symbol":"ETHBTC","lastPrice":"0.035","priceChangePercent":"-1.2",
             "volume":"800.0","highPrice":"0.036","lowPrice":"0.034","closeTime":1754300000001}
        ]"#;

        let tickers = adapter().parse_rest_snapshot(body).unwrap();
        assert_eq!(tickers.len(), 2);
        assert_eq!(tickers[0].pair, "BTC/USDT");
        assert_eq!(tickers[0].price, 97500.00);
        assert_eq!(tickers[0].change24h, 2.5);
        assert_eq!(tickers[0].timestamp, 1754300000000);
        assert_eq!(tickers[0].source, TickerSource::Live);
        assert_eq!(tickers[1].pair, "ETH/BTC");
    }

    #[test]
    fn rest_snapshot_skips_unparseable_records() {
        let body = r#"[
            {"symbol":"BTCUSDT","lastPrice":"97500.00","closeTime":1754300000000},
            {"symbol":"WEIRD123","lastPrice":"1.0"},
            {"lastPrice":"42.0"},
            {"symbol":"ETHUSDT","lastPrice":"not-a-number"}
        ]"#;

        let tickers = adapter().parse_rest_snapshot(body).unwrap();
        assert_eq!(tickers.len(), 1);
        assert_eq!(tickers[0].pair, "BTC/USDT");
    }

    #[test]
    fn rest_snapshot_rejects_non_array_body() {
        assert!(adapter().parse_rest_snapshot(r#"{"code":-1}"#).is_err());
        assert!(adapter().parse_rest_snapshot("not json").is_err());
    }

    #[test]
    fn parses_raw_push_frame() {
        let frame = r#"{"e":"24hrTicker","E":1754300001000,"s":"BTCUSDT",
            "c":"97510.00","P":"2.6","v":"12346.0","h":"98000.00","l":"95000.00"}"#;

        let tickers = adapter().parse_push_frame(frame);
        assert_eq!(tickers.len(), 1);
        assert_eq!(tickers[0].pair, "BTC/USDT");
        assert_eq!(tickers[0].price, 97510.00);
        assert_eq!(tickers[0].timestamp, 1754300001000);
    }

    #[test]
    fn parses_combined_stream_envelope() {
        let frame = r#"{"stream":"btcusdt@ticker","data":{"e":"24hrTicker","E":1754300002000,
            "s":"BTCUSDT","c":"97520.00","P":"2.7","v":"12347.0","h":"98000.00","l":"95000.00"}}"#;

        let tickers = adapter().parse_push_frame(frame);
        assert_eq!(tickers.len(), 1);
        assert_eq!(tickers[0].price, 97520.00);
    }

    #[test]
    fn push_frame_ignores_control_messages() {
        assert!(adapter().parse_push_frame(r#"{"result":null,"id":1}"#).is_empty());
        assert!(adapter().parse_push_frame("not json").is_empty());
        assert!(adapter()
            .parse_push_frame(r#"{"e":"trade","s":"BTCUSDT","p":"97500"}"#)
            .is_empty());
    }
}
