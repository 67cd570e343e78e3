//! OKX adapter: `{code, data:[...]}` REST wrapper, `{arg, data}` push frames.

use crate::error::{EngineError, EngineResult};
use crate::types::{now_millis, Ticker, TickerSource};
use crate::venue::{field_f64, field_i64, SymbolRules, VenueAdapter};
use serde_json::{json, Value};

const DEFAULT_REST_URL: &str = "https://www.okx.com/api/v5/market/tickers?instType=SPOT";
const DEFAULT_WS_URL: &str = "wss://ws.okx.com:8443/ws/v5/public";

#[derive(Debug)]
pub struct OkxAdapter {
    rest_url: String,
    ws_url: String,
    rules: SymbolRules,
}

impl OkxAdapter {
    pub fn new() -> Self {
        Self::with_endpoints(None, None)
    }

    pub fn with_endpoints(rest_url: Option<String>, ws_url: Option<String>) -> Self {
        Self {
            rest_url: rest_url.unwrap_or_else(|| DEFAULT_REST_URL.to_string()),
            ws_url: ws_url.unwrap_or_else(|| DEFAULT_WS_URL.to_string()),
            // Symbols are dash-delimited; no stripping or aliases needed.
            rules: SymbolRules::new(&[], &[]),
        }
    }

    fn record_to_ticker(&self, record: &Value) -> Option<Ticker> {
        let inst_id = record.get("instId")?.as_str()?;
        let pair = self.normalize_symbol(inst_id).ok()?;
        let price = field_f64(record, "last")?;

        // OKX reports the 24h open, not a percent change.
        let open24h = field_f64(record, "open24h").unwrap_or(0.0);
        let change24h = if open24h > 0.0 {
            (price - open24h) / open24h * 100.0
        } else {
            0.0
        };

        Some(Ticker {
            venue: self.name().to_string(),
            pair,
            price,
            change24h,
            volume: field_f64(record, "vol24h").unwrap_or(0.0),
            high24h: field_f64(record, "high24h").unwrap_or(price),
            low24h: field_f64(record, "low24h").unwrap_or(price),
            timestamp: field_i64(record, "ts").unwrap_or_else(now_millis),
            source: TickerSource::Live,
        })
    }
}

impl Default for OkxAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl VenueAdapter for OkxAdapter {
    fn name(&self) -> &'static str {
        "okx"
    }

    fn rest_url(&self) -> &str {
        &self.rest_url
    }

    fn ws_url(&self) -> Option<&str> {
        Some(&self.ws_url)
    }

    fn normalize_symbol(&self, raw: &str) -> EngineResult<String> {
        self.rules
            .split_delimited(raw, '-')
            .map(|(base, quote)| format!("{base}/{quote}"))
            .ok_or_else(|| EngineError::unknown_symbol(raw))
    }

    fn venue_symbol(&self, pair: &str) -> String {
        pair.replace('/', "-")
    }

    fn subscribe_messages(&self, pairs: &[String]) -> Vec<String> {
        let args: Vec<Value> = pairs
            .iter()
            .map(|p| json!({"channel": "tickers", "instId": self.venue_symbol(p)}))
            .collect();

        vec![json!({"op": "subscribe", "args": args}).to_string()]
    }

    fn parse_rest_snapshot(&self, body: &str) -> EngineResult<Vec<Ticker>> {
        let value: Value = serde_json::from_str(body)?;

        let code = value.get("code").and_then(|c| c.as_str()).unwrap_or("");
        if code != "0" {
            let msg = value.get("msg").and_then(|m| m.as_str()).unwrap_or("?");
            return Err(EngineError::parse(format!(
                "okx snapshot error code={code}: {msg}"
            )));
        }

        let records = value
            .get("data")
            .and_then(|d| d.as_array())
            .ok_or_else(|| EngineError::parse("okx snapshot missing data array"))?;

        Ok(records
            .iter()
            .filter_map(|r| self.record_to_ticker(r))
            .collect())
    }

    fn parse_push_frame(&self, frame: &str) -> Vec<Ticker> {
        let Ok(value) = serde_json::from_str::<Value>(frame) else {
            return Vec::new();
        };

        // Subscribe acks and errors come as {"event": ...} frames.
        if value.get("event").is_some() {
            return Vec::new();
        }

        let channel = value
            .get("arg")
            .and_then(|a| a.get("channel"))
            .and_then(|c| c.as_str());
        if channel != Some("tickers") {
            return Vec::new();
        }

        value
            .get("data")
            .and_then(|d| d.as_array())
            .map(|records| {
                records
                    .iter()
                    .filter_map(|r| self.record_to_ticker(r))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn liquidity_factor(&self) -> f64 {
        0.7
    }

    fn spread_bps(&self) -> f64 {
        3.0
    }
}
