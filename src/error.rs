// Error Handling - Project Beacon
// "Venues fail; the engine does not"

use thiserror::Error;

/// Error types for the market-data aggregation engine.
#[derive(Error, Debug)]
pub enum EngineError {
    // Network errors
    #[error("Connection to {venue} failed: {message}")]
    Connection { venue: String, message: String },

    #[error("Timeout occurred: {operation} after {duration_ms}ms")]
    Timeout { operation: String, duration_ms: u64 },

    #[error("Subscription handshake failed: {message}")]
    Subscription { message: String },

    // Data errors
    #[error("Parse failed: {message}")]
    Parse { message: String },

    #[error("Unknown symbol: {symbol}")]
    UnknownSymbol { symbol: String },

    // Configuration errors
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Invalid configuration value: {key} = {value}")]
    InvalidConfigValue { key: String, value: String },

    // Lifecycle errors
    #[error("Engine is already running")]
    AlreadyRunning,

    #[error("Engine is not running")]
    NotRunning,

    #[error("Channel closed: {channel}")]
    ChannelClosed { channel: String },

    // Generic errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl EngineError {
    /// Create a connection error carrying the failing venue's identity.
    pub fn connection<V: Into<String>, M: Into<String>>(venue: V, message: M) -> Self {
        Self::Connection {
            venue: venue.into(),
            message: message.into(),
        }
    }

    /// Create a timeout error.
    pub fn timeout<S: Into<String>>(operation: S, duration_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration_ms,
        }
    }

    /// Create a subscription error.
    pub fn subscription<S: Into<String>>(message: S) -> Self {
        Self::Subscription {
            message: message.into(),
        }
    }

    /// Create a parse error.
    pub fn parse<S: Into<String>>(message: S) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }

    /// Create an unknown-symbol error.
    pub fn unknown_symbol<S: Into<String>>(symbol: S) -> Self {
        Self::UnknownSymbol {
            symbol: symbol.into(),
        }
    }

    /// Create a configuration error.
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an invalid config value error.
    pub fn invalid_config_value<K: Into<String>, V: Into<String>>(key: K, value: V) -> Self {
        Self::InvalidConfigValue {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Create a channel closed error.
    pub fn channel_closed<S: Into<String>>(channel: S) -> Self {
        Self::ChannelClosed {
            channel: channel.into(),
        }
    }

    /// Create an internal error.
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Get error category for logging.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Connection { .. } | Self::Timeout { .. } | Self::Subscription { .. } => "network",
            Self::Parse { .. } | Self::UnknownSymbol { .. } => "data",
            Self::Configuration { .. } | Self::InvalidConfigValue { .. } => "configuration",
            Self::AlreadyRunning | Self::NotRunning | Self::ChannelClosed { .. } => "lifecycle",
            Self::Internal { .. } => "general",
        }
    }

    /// Check if the failure is transient and worth retrying with backoff.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Connection { .. } | Self::Timeout { .. } | Self::Subscription { .. } => true,

            Self::Parse { .. }
            | Self::UnknownSymbol { .. }
            | Self::Configuration { .. }
            | Self::InvalidConfigValue { .. }
            | Self::AlreadyRunning
            | Self::NotRunning
            | Self::ChannelClosed { .. }
            | Self::Internal { .. } => false,
        }
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(error: serde_json::Error) -> Self {
        EngineError::parse(error.to_string())
    }
}

impl From<reqwest::Error> for EngineError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            EngineError::timeout("HTTP request", 0)
        } else {
            EngineError::connection(
                error
                    .url()
                    .map(|u| u.to_string())
                    .unwrap_or_else(|| "unknown".to_string()),
                error.to_string(),
            )
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for EngineError {
    fn from(error: tokio_tungstenite::tungstenite::Error) -> Self {
        EngineError::connection("websocket", error.to_string())
    }
}

impl From<std::io::Error> for EngineError {
    fn from(error: std::io::Error) -> Self {
        match error.kind() {
            std::io::ErrorKind::TimedOut => EngineError::timeout("IO operation", 0),
            std::io::ErrorKind::ConnectionRefused
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::ConnectionReset => {
                EngineError::connection("io", error.to_string())
            }
            _ => EngineError::internal(error.to_string()),
        }
    }
}

/// Result type alias for convenience.
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories_cover_every_variant() {
        assert_eq!(EngineError::connection("okx", "refused").category(), "network");
        assert_eq!(EngineError::parse("bad json").category(), "data");
        assert_eq!(EngineError::configuration("no pairs").category(), "configuration");
        assert_eq!(EngineError::AlreadyRunning.category(), "lifecycle");
        assert_eq!(EngineError::internal("boom").category(), "general");
    }

    #[test]
    fn only_network_failures_are_retryable() {
        assert!(EngineError::connection("okx", "refused").is_retryable());
        assert!(EngineError::timeout("poll", 3000).is_retryable());
        assert!(!EngineError::parse("bad json").is_retryable());
        assert!(!EngineError::configuration("no pairs").is_retryable());
        assert!(!EngineError::AlreadyRunning.is_retryable());
    }

    #[test]
    fn serde_errors_convert_to_parse() {
        let err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let engine_err: EngineError = err.into();
        assert!(matches!(engine_err, EngineError::Parse { .. }));
    }

    #[test]
    fn messages_name_the_failing_venue() {
        let err = EngineError::connection("kraken", "handshake rejected");
        assert_eq!(
            err.to_string(),
            "Connection to kraken failed: handshake rejected"
        );
    }
}
