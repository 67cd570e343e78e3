// Project Beacon - Core Library
// "The beacons are lit; the prices answer"

pub mod aggregate;
pub mod backoff;
pub mod broadcast;
pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod fallback;
pub mod health;
pub mod logging;
pub mod poller;
pub mod shutdown;
pub mod socket;
pub mod types;
pub mod validate;
pub mod venue;

// Re-export commonly used types
pub use aggregate::Snapshot;
pub use broadcast::SubscriptionHandle;
pub use crate::config::{EngineConfig, Settings, VenueConfig};
pub use engine::Engine;
pub use error::{EngineError, EngineResult};
pub use logging::LoggingConfig;
pub use types::{ConnectionState, Ticker, TickerSource};
