pub mod accumulator;
pub mod backfill;
pub mod binance;
pub mod executor;
pub mod lifecycle;

#[cfg(test)]
mod mock;

pub use accumulator::PartialIntervalAccumulator;
pub use backfill::backfill;
pub use binance::BinanceFuturesClient;
pub use executor::{ActionExecutor, Corroboration};
pub use lifecycle::{SyncCommand, SyncHandle, SyncSettings, Synchronizer};
