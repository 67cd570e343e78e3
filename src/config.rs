use crate::error::{EngineError, EngineResult};
use crate::logging::LoggingConfig;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

/// Static configuration for one venue. `rest_url`/`ws_url` override the
/// adapter's built-in endpoints (used for regional mirrors and tests).
#[derive(Debug, Clone)]
pub struct VenueConfig {
    pub name: String,
    pub rest_url: Option<String>,
    pub ws_url: Option<String>,
    /// Disable the push connection while keeping REST polling.
    pub use_socket: bool,
}

impl VenueConfig {
    pub fn named<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            rest_url: None,
            ws_url: None,
            use_socket: true,
        }
    }
}

/// Full engine configuration. All tuned constants live here, never at use
/// sites; `Default` carries the documented design defaults.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Canonical `BASE/QUOTE` pairs the merged snapshot always covers.
    pub pairs: Vec<String>,
    pub venues: Vec<VenueConfig>,

    // REST polling
    pub poll_interval: Duration,
    pub rest_timeout: Duration,
    pub rest_retries: u32,
    pub rest_retry_backoff: Duration,

    // Cache
    pub cache_ttl: Duration,

    // Push connections
    pub connect_timeout: Duration,
    pub heartbeat_timeout: Duration,
    /// Proactive recycle before venue-side 24h connection limits.
    pub connection_lifetime: Duration,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
    pub backoff_seed: u64,

    // Validation
    pub max_deviation_pct: f64,
    pub clock_skew: Duration,

    // Broadcast
    pub broadcast_interval: Duration,

    // Fallback synthesis
    pub fallback_seed: u64,
    /// Approximate USD value per asset, used to derive baseline pair prices
    /// when no live or expired cache entry exists.
    pub baseline_prices: HashMap<String, f64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            pairs: vec!["BTC/USDT".to_string(), "ETH/USDT".to_string()],
            venues: vec![
                VenueConfig::named("binance"),
                VenueConfig::named("okx"),
                VenueConfig::named("kraken"),
            ],
            poll_interval: Duration::from_secs(5),
            rest_timeout: Duration::from_secs(3),
            rest_retries: 2,
            rest_retry_backoff: Duration::from_millis(500),
            cache_ttl: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(10),
            heartbeat_timeout: Duration::from_secs(60),
            connection_lifetime: Duration::from_secs(23 * 3600),
            backoff_base: Duration::from_secs(1),
            backoff_max: Duration::from_secs(30),
            backoff_seed: 17,
            max_deviation_pct: 20.0,
            clock_skew: Duration::from_secs(5),
            broadcast_interval: Duration::from_secs(5),
            fallback_seed: 71,
            baseline_prices: default_baseline_prices(),
        }
    }
}

impl EngineConfig {
    /// Fail-fast sanity checks, run before any task spawns.
    pub fn validate(&self) -> EngineResult<()> {
        if self.pairs.is_empty() {
            return Err(EngineError::configuration("pair universe is empty"));
        }
        for pair in &self.pairs {
            match pair.split_once('/') {
                Some((base, quote)) if !base.is_empty() && !quote.is_empty() => {}
                _ => {
                    return Err(EngineError::invalid_config_value("pairs", pair.clone()));
                }
            }
        }
        if self.venues.is_empty() {
            return Err(EngineError::configuration("no venues configured"));
        }
        let mut seen = std::collections::HashSet::new();
        for venue in &self.venues {
            if !seen.insert(venue.name.as_str()) {
                return Err(EngineError::invalid_config_value(
                    "venues",
                    format!("duplicate venue {}", venue.name),
                ));
            }
        }
        for (key, duration) in [
            ("poll_interval", self.poll_interval),
            ("rest_timeout", self.rest_timeout),
            ("cache_ttl", self.cache_ttl),
            ("heartbeat_timeout", self.heartbeat_timeout),
            ("broadcast_interval", self.broadcast_interval),
        ] {
            if duration.is_zero() {
                return Err(EngineError::invalid_config_value(key, "0ms"));
            }
        }
        if self.backoff_base > self.backoff_max {
            return Err(EngineError::invalid_config_value(
                "backoff_base",
                format!("{:?} exceeds backoff_max {:?}", self.backoff_base, self.backoff_max),
            ));
        }
        if !(self.max_deviation_pct > 0.0) {
            return Err(EngineError::invalid_config_value(
                "max_deviation_pct",
                self.max_deviation_pct.to_string(),
            ));
        }
        Ok(())
    }
}

fn default_baseline_prices() -> HashMap<String, f64> {
    [
        ("BTC", 97_000.0),
        ("ETH", 3_400.0),
        ("SOL", 200.0),
        ("BNB", 650.0),
        ("XRP", 2.2),
        ("DOGE", 0.32),
        ("ADA", 0.9),
        ("USDT", 1.0),
        ("USDC", 1.0),
        ("DAI", 1.0),
        ("USD", 1.0),
        ("EUR", 1.08),
    ]
    .into_iter()
    .map(|(asset, price)| (asset.to_string(), price))
    .collect()
}

/// Layered settings: `beacon.toml` (optional) overridden by `BEACON__`
/// environment variables, deserialized into millisecond-granularity fields
/// and converted into an [`EngineConfig`].
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    #[serde(default)]
    pub logging: LoggingConfig,
    pub engine: EngineSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EngineSettings {
    pub pairs: Vec<String>,
    #[serde(default)]
    pub venues: Vec<VenueSettings>,
    pub poll_interval_ms: Option<u64>,
    pub rest_timeout_ms: Option<u64>,
    pub rest_retries: Option<u32>,
    pub cache_ttl_ms: Option<u64>,
    pub heartbeat_timeout_ms: Option<u64>,
    pub backoff_base_ms: Option<u64>,
    pub backoff_max_ms: Option<u64>,
    pub max_deviation_pct: Option<f64>,
    pub broadcast_interval_ms: Option<u64>,
    #[serde(default)]
    pub baseline_prices: HashMap<String, f64>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct VenueSettings {
    pub name: String,
    pub rest_url: Option<String>,
    pub ws_url: Option<String>,
    #[serde(default = "default_true")]
    pub use_socket: bool,
}

fn default_true() -> bool {
    true
}

impl Settings {
    pub fn load() -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name("beacon").required(false))
            // e.g. `BEACON__ENGINE__REST_RETRIES=3`
            .add_source(Environment::with_prefix("beacon").separator("__"))
            .build()?;

        s.try_deserialize()
    }

    pub fn into_engine_config(self) -> EngineConfig {
        let mut cfg = EngineConfig {
            pairs: self.engine.pairs,
            ..EngineConfig::default()
        };
        if !self.engine.venues.is_empty() {
            cfg.venues = self
                .engine
                .venues
                .into_iter()
                .map(|v| VenueConfig {
                    name: v.name,
                    rest_url: v.rest_url,
                    ws_url: v.ws_url,
                    use_socket: v.use_socket,
                })
                .collect();
        }
        if let Some(ms) = self.engine.poll_interval_ms {
            cfg.poll_interval = Duration::from_millis(ms);
            cfg.broadcast_interval = Duration::from_millis(ms);
        }
        if let Some(ms) = self.engine.rest_timeout_ms {
            cfg.rest_timeout = Duration::from_millis(ms);
        }
        if let Some(n) = self.engine.rest_retries {
            cfg.rest_retries = n;
        }
        if let Some(ms) = self.engine.cache_ttl_ms {
            cfg.cache_ttl = Duration::from_millis(ms);
        }
        if let Some(ms) = self.engine.heartbeat_timeout_ms {
            cfg.heartbeat_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = self.engine.backoff_base_ms {
            cfg.backoff_base = Duration::from_millis(ms);
        }
        if let Some(ms) = self.engine.backoff_max_ms {
            cfg.backoff_max = Duration::from_millis(ms);
        }
        if let Some(pct) = self.engine.max_deviation_pct {
            cfg.max_deviation_pct = pct;
        }
        if let Some(ms) = self.engine.broadcast_interval_ms {
            cfg.broadcast_interval = Duration::from_millis(ms);
        }
        cfg.baseline_prices.extend(self.engine.baseline_prices);
        cfg
    }
}
