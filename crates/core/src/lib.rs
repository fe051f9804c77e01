pub mod config;
pub mod error;
pub mod types;

pub use config::AppConfig;
pub use error::{AttributionError, AttributionResult};
pub use types::{Chain, ChainRecord, ConcatenatedChain, Event, RawEvent};
