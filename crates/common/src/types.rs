use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// One fixed-duration OHLCV candle. `timestamp` is the interval's open time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Interval {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// A 1-minute sample of the interval that is still forming.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PartialSample {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Candle duration in whole minutes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timeframe(u32);

impl Timeframe {
    pub fn from_minutes(minutes: u32) -> Self {
        assert!(minutes >= 1, "timeframe must be at least one minute");
        Self(minutes)
    }

    pub fn minutes(&self) -> u32 {
        self.0
    }

    pub fn duration(&self) -> Duration {
        Duration::minutes(i64::from(self.0))
    }

    /// Binance kline interval code, if the exchange serves this timeframe natively.
    pub fn binance_code(&self) -> Option<&'static str> {
        match self.0 {
            1 => Some("1m"),
            3 => Some("3m"),
            5 => Some("5m"),
            15 => Some("15m"),
            30 => Some("30m"),
            60 => Some("1h"),
            120 => Some("2h"),
            240 => Some("4h"),
            360 => Some("6h"),
            480 => Some("8h"),
            _ => None,
        }
    }
}

impl std::fmt::Display for Timeframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}m", self.0)
    }
}

/// Exchange order side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "BUY"),
            OrderSide::Sell => write!(f, "SELL"),
        }
    }
}

/// Direction of an open position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Long,
    Short,
}

impl Side {
    /// Order side that opens a position in this direction.
    pub fn opening_order(&self) -> OrderSide {
        match self {
            Side::Long => OrderSide::Buy,
            Side::Short => OrderSide::Sell,
        }
    }

    /// Order side that closes a position in this direction.
    pub fn closing_order(&self) -> OrderSide {
        match self {
            Side::Long => OrderSide::Sell,
            Side::Short => OrderSide::Buy,
        }
    }

    /// Side implied by a signed position quantity. `None` when flat.
    pub fn from_quantity(quantity: f64) -> Option<Side> {
        if quantity > 0.0 {
            Some(Side::Long)
        } else if quantity < 0.0 {
            Some(Side::Short)
        } else {
            None
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Long => write!(f, "Long"),
            Side::Short => write!(f, "Short"),
        }
    }
}

/// Rule family a signal belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RuleId {
    Rule1,
    Rule2,
    Rule3,
}

impl RuleId {
    pub fn number(&self) -> u8 {
        match self {
            RuleId::Rule1 => 1,
            RuleId::Rule2 => 2,
            RuleId::Rule3 => 3,
        }
    }
}

impl std::fmt::Display for RuleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Rule {}", self.number())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignalKind {
    BuyEnter,
    BuyExit,
    ShortEnter,
    ShortExit,
    BuyStop,
    ShortStop,
}

impl SignalKind {
    /// Position side the signal refers to (the side entered or the side closed).
    pub fn side(&self) -> Side {
        match self {
            SignalKind::BuyEnter | SignalKind::BuyExit | SignalKind::BuyStop => Side::Long,
            SignalKind::ShortEnter | SignalKind::ShortExit | SignalKind::ShortStop => Side::Short,
        }
    }
}

impl std::fmt::Display for SignalKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SignalKind::BuyEnter => "Buy Enter",
            SignalKind::BuyExit => "Buy Exit",
            SignalKind::ShortEnter => "Short Enter",
            SignalKind::ShortExit => "Short Exit",
            SignalKind::BuyStop => "Buy Stop",
            SignalKind::ShortStop => "Short Stop",
        };
        write!(f, "{s}")
    }
}

/// A rule predicate that fired at a specific series index.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub kind: SignalKind,
    pub rule: RuleId,
    pub index: usize,
    pub timestamp: DateTime<Utc>,
    pub price: f64,
}

/// What the synchronizer believes the open position is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PositionState {
    pub side: Option<Side>,
    pub opening_rule: Option<RuleId>,
}

impl PositionState {
    pub fn flat() -> Self {
        Self::default()
    }

    pub fn opened(side: Side, rule: RuleId) -> Self {
        Self {
            side: Some(side),
            opening_rule: Some(rule),
        }
    }

    pub fn is_flat(&self) -> bool {
        self.side.is_none()
    }

    /// True when the external signed quantity points the same way as this state.
    pub fn agrees_with(&self, quantity: f64) -> bool {
        self.side == Side::from_quantity(quantity)
    }
}

impl std::fmt::Display for PositionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.side, self.opening_rule) {
            (None, _) => write!(f, "flat"),
            (Some(side), Some(rule)) => write!(f, "{side} ({rule})"),
            (Some(side), None) => write!(f, "{side} (unknown rule)"),
        }
    }
}

/// The single action the synchronizer hands to the execution layer per tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Action {
    Enter { side: Side, rule: RuleId },
    Exit { side: Side, rule: RuleId },
    Stop { side: Side, rule: RuleId, price_level: f64 },
}

impl Action {
    pub fn rule(&self) -> RuleId {
        match self {
            Action::Enter { rule, .. } | Action::Exit { rule, .. } | Action::Stop { rule, .. } => {
                *rule
            }
        }
    }

    pub fn side(&self) -> Side {
        match self {
            Action::Enter { side, .. } | Action::Exit { side, .. } | Action::Stop { side, .. } => {
                *side
            }
        }
    }

    /// Position state after this action is confirmed.
    pub fn resulting_position(&self) -> PositionState {
        match self {
            Action::Enter { side, rule } => PositionState::opened(*side, *rule),
            Action::Exit { .. } | Action::Stop { .. } => PositionState::flat(),
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Action::Enter { side, rule } => write!(f, "{side} Enter ({rule})"),
            Action::Exit { side, rule } => write!(f, "{side} Exit ({rule})"),
            Action::Stop {
                side,
                rule,
                price_level,
            } => write!(f, "{side} Stop @ {price_level} ({rule})"),
        }
    }
}

/// Confirmation returned by the execution layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub order_id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub fill_price: f64,
    pub quantity: f64,
    pub timestamp: DateTime<Utc>,
}

/// One line of the in-memory trade journal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalEntry {
    pub side: Side,
    pub action: Action,
    pub timestamp: DateTime<Utc>,
    pub price: f64,
    pub rule: RuleId,
}

/// Whether the bot is running against the real exchange or simulating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradingMode {
    Live,
    Paper,
}

impl std::fmt::Display for TradingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradingMode::Live => write!(f, "live"),
            TradingMode::Paper => write!(f, "paper"),
        }
    }
}

/// Current state of the live synchronizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    #[default]
    Idle,
    AccumulatingPartialInterval,
    IntervalClosing,
    Stopped,
}

impl std::fmt::Display for SyncState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncState::Idle => write!(f, "idle"),
            SyncState::AccumulatingPartialInterval => write!(f, "accumulating"),
            SyncState::IntervalClosing => write!(f, "closing"),
            SyncState::Stopped => write!(f, "stopped"),
        }
    }
}

/// Structured notifications published by the synchronizer.
#[derive(Debug, Clone)]
pub enum SyncEvent {
    StateChanged {
        symbol: String,
        state: SyncState,
    },
    SignalFired {
        symbol: String,
        signal: Signal,
    },
    ActionDispatched {
        symbol: String,
        action: Action,
        result: ExecutionResult,
    },
    ActionFailed {
        symbol: String,
        action: Action,
        error: String,
    },
    PositionMismatch {
        symbol: String,
        internal: PositionState,
        external_quantity: f64,
    },
    TickSkipped {
        symbol: String,
        reason: String,
    },
    PriceUpdate {
        symbol: String,
        price: f64,
        timestamp: DateTime<Utc>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn position_agreement_follows_sign() {
        let long = PositionState::opened(Side::Long, RuleId::Rule3);
        assert!(long.agrees_with(0.5));
        assert!(!long.agrees_with(-0.5));
        assert!(!long.agrees_with(0.0));
        assert!(PositionState::flat().agrees_with(0.0));
    }

    #[test]
    fn exits_and_stops_flatten() {
        let enter = Action::Enter {
            side: Side::Short,
            rule: RuleId::Rule2,
        };
        let stop = Action::Stop {
            side: Side::Short,
            rule: RuleId::Rule2,
            price_level: 101.5,
        };
        assert_eq!(
            enter.resulting_position(),
            PositionState::opened(Side::Short, RuleId::Rule2)
        );
        assert!(stop.resulting_position().is_flat());
        assert_eq!(stop.to_string(), "Short Stop @ 101.5 (Rule 2)");
    }

    #[test]
    fn native_binance_codes() {
        assert_eq!(Timeframe::from_minutes(60).binance_code(), Some("1h"));
        assert_eq!(Timeframe::from_minutes(77).binance_code(), None);
    }
}
