pub mod config;
pub mod error;
pub mod exchange;
pub mod interval;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
pub use exchange::{ExecutionLayer, MarketDataSource, PositionQuery};
pub use types::*;
