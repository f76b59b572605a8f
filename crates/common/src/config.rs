use std::time::Duration;

use crate::{Error, Result, Timeframe, TradingMode};

/// Process configuration loaded from environment variables at startup.
#[derive(Debug, Clone)]
pub struct Config {
    // Exchange credentials (live mode only)
    pub binance_api_key: Option<String>,
    pub binance_secret: Option<String>,

    // Trading
    pub trading_mode: TradingMode,
    pub symbol: String,
    pub timeframe: Timeframe,
    pub order_quantity: f64,
    pub paper_slippage_bps: f64,

    // Live loop
    pub fetch_timeout: Duration,
    pub settle_delay: Duration,

    // Strategy config file path
    pub strategy_config_path: String,
}

impl Config {
    /// Load configuration from the environment, reading `.env` if present.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv(); // ignore error if .env not present

        let trading_mode = match required_env("TRADING_MODE")?.to_lowercase().as_str() {
            "paper" => TradingMode::Paper,
            "live" => TradingMode::Live,
            other => {
                return Err(Error::Config(format!(
                    "TRADING_MODE must be 'paper' or 'live', got: '{other}'"
                )))
            }
        };

        let timeframe_minutes: u32 = parse_env("TIMEFRAME_MINUTES")?.unwrap_or(77);
        if timeframe_minutes == 0 {
            return Err(Error::Config("TIMEFRAME_MINUTES must be at least 1".into()));
        }

        let (binance_api_key, binance_secret) = match trading_mode {
            TradingMode::Live => (
                Some(required_env("BINANCE_API_KEY")?),
                Some(required_env("BINANCE_SECRET")?),
            ),
            TradingMode::Paper => (optional_env("BINANCE_API_KEY"), optional_env("BINANCE_SECRET")),
        };

        Ok(Config {
            binance_api_key,
            binance_secret,
            trading_mode,
            symbol: optional_env("SYMBOL").unwrap_or_else(|| "BTCUSDT".to_string()),
            timeframe: Timeframe::from_minutes(timeframe_minutes),
            order_quantity: parse_env("ORDER_QUANTITY")?.unwrap_or(0.001),
            paper_slippage_bps: parse_env("PAPER_SLIPPAGE_BPS")?.unwrap_or(10.0),
            fetch_timeout: Duration::from_secs(parse_env("FETCH_TIMEOUT_SECS")?.unwrap_or(20)),
            settle_delay: Duration::from_secs(parse_env("SETTLE_DELAY_SECS")?.unwrap_or(2)),
            strategy_config_path: optional_env("STRATEGY_CONFIG_PATH")
                .unwrap_or_else(|| "config/strategy.toml".to_string()),
        })
    }
}

fn required_env(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| {
        Error::Config(format!(
            "Required environment variable '{key}' is not set. Check your .env file."
        ))
    })
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Result<Option<T>> {
    match optional_env(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| Error::Config(format!("{key} has an invalid value: '{raw}'"))),
        None => Ok(None),
    }
}
