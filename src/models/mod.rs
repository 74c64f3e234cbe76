use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// OHLCV bar for one instrument on one timeframe
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Bar timeframes supported by the gateway
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Timeframe {
    M1,
    M5,
    M15,
    M30,
    H1,
    H4,
    D1,
}

impl Timeframe {
    pub fn minutes(self) -> i64 {
        match self {
            Timeframe::M1 => 1,
            Timeframe::M5 => 5,
            Timeframe::M15 => 15,
            Timeframe::M30 => 30,
            Timeframe::H1 => 60,
            Timeframe::H4 => 240,
            Timeframe::D1 => 1440,
        }
    }

    pub fn duration(self) -> chrono::Duration {
        chrono::Duration::minutes(self.minutes())
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Timeframe::M1 => "M1",
            Timeframe::M5 => "M5",
            Timeframe::M15 => "M15",
            Timeframe::M30 => "M30",
            Timeframe::H1 => "H1",
            Timeframe::H4 => "H4",
            Timeframe::D1 => "D1",
        };
        f.write_str(name)
    }
}

/// Trade direction
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// +1 for long, -1 for short
    pub fn sign(self) -> f64 {
        match self {
            Side::Buy => 1.0,
            Side::Sell => -1.0,
        }
    }

    pub fn opposite(self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => f.write_str("BUY"),
            Side::Sell => f.write_str("SELL"),
        }
    }
}

/// Which strategy produced a signal
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum StrategyTag {
    Swing,
    Scalp,
    Pullback,
    Smart,
    Streak,
    /// Position opened outside the engine
    Manual,
}

impl StrategyTag {
    /// Tag from an order comment such as "SCALP retry"
    pub fn from_comment(comment: &str) -> Option<Self> {
        match comment.split_whitespace().next()?.to_ascii_uppercase().as_str() {
            "SWING" => Some(StrategyTag::Swing),
            "SCALP" => Some(StrategyTag::Scalp),
            "PULLBACK" => Some(StrategyTag::Pullback),
            "SMART" => Some(StrategyTag::Smart),
            "STREAK" => Some(StrategyTag::Streak),
            "MANUAL" => Some(StrategyTag::Manual),
            _ => None,
        }
    }
}

impl fmt::Display for StrategyTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StrategyTag::Swing => "SWING",
            StrategyTag::Scalp => "SCALP",
            StrategyTag::Pullback => "PULLBACK",
            StrategyTag::Smart => "SMART",
            StrategyTag::Streak => "STREAK",
            StrategyTag::Manual => "MANUAL",
        };
        f.write_str(name)
    }
}

/// Entry candidate produced by a strategy.
///
/// Fields are private so a signal with stop/target on the wrong side of the
/// entry cannot be constructed. Use [`TradeSignal::new`] or
/// [`TradeSignal::from_atr`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TradeSignal {
    side: Side,
    entry: f64,
    stop: f64,
    target: f64,
    tag: StrategyTag,
    confidence: f64,
}

impl TradeSignal {
    /// Returns None unless stop < entry < target (long) or stop > entry > target (short)
    pub fn new(
        side: Side,
        entry: f64,
        stop: f64,
        target: f64,
        tag: StrategyTag,
        confidence: f64,
    ) -> Option<Self> {
        if !(entry.is_finite() && stop.is_finite() && target.is_finite()) {
            return None;
        }
        let ordered = match side {
            Side::Buy => stop < entry && entry < target,
            Side::Sell => stop > entry && entry > target,
        };
        if !ordered {
            return None;
        }

        Some(Self {
            side,
            entry,
            stop,
            target,
            tag,
            confidence: confidence.clamp(0.0, 1.0),
        })
    }

    /// Stop at `atr * stop_mult` from entry, target at `rr` times that distance
    ///
    /// # Arguments
    /// * `entry` - Entry price (usually the last close)
    /// * `atr` - Volatility used for the stop distance
    /// * `stop_mult` - ATR multiple for the stop
    /// * `rr` - Reward to risk ratio for the target
    pub fn from_atr(
        side: Side,
        entry: f64,
        atr: f64,
        stop_mult: f64,
        rr: f64,
        tag: StrategyTag,
        confidence: f64,
    ) -> Option<Self> {
        let distance = atr * stop_mult;
        if !distance.is_finite() || distance <= 0.0 || rr <= 0.0 {
            return None;
        }
        let stop = entry - side.sign() * distance;
        let target = entry + side.sign() * distance * rr;
        Self::new(side, entry, stop, target, tag, confidence)
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn entry(&self) -> f64 {
        self.entry
    }

    pub fn stop(&self) -> f64 {
        self.stop
    }

    pub fn target(&self) -> f64 {
        self.target
    }

    pub fn tag(&self) -> StrategyTag {
        self.tag
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn stop_distance(&self) -> f64 {
        (self.entry - self.stop).abs()
    }
}

/// Broker-side instrument metadata
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SymbolInfo {
    pub symbol: String,
    pub point: f64,
    pub tick_size: f64,
    pub tick_value: f64,
    pub volume_min: f64,
    pub volume_max: f64,
    pub volume_step: f64,
    /// Minimum stop distance from price, in points
    pub stops_level: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Tick {
    pub bid: f64,
    pub ask: f64,
    pub time: DateTime<Utc>,
}

impl Tick {
    /// Price at which a new position on `side` fills
    pub fn entry_price(&self, side: Side) -> f64 {
        match side {
            Side::Buy => self.ask,
            Side::Sell => self.bid,
        }
    }

    /// Price at which an existing position on `side` closes
    pub fn exit_price(&self, side: Side) -> f64 {
        match side {
            Side::Buy => self.bid,
            Side::Sell => self.ask,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct AccountInfo {
    pub balance: f64,
    pub equity: f64,
}

/// Open position as reported by the broker
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BrokerPosition {
    pub ticket: u64,
    pub symbol: String,
    pub side: Side,
    pub volume: f64,
    pub open_price: f64,
    /// 0.0 when unset
    pub stop: f64,
    /// 0.0 when unset
    pub target: f64,
    pub profit: f64,
    pub magic: u64,
    pub comment: String,
    pub open_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum DealEntry {
    In,
    Out,
}

/// Historical deal. `Out` deals close a position.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClosedDeal {
    pub deal: u64,
    /// Ticket of the position this deal belongs to
    pub position: u64,
    pub symbol: String,
    pub entry: DealEntry,
    pub price: f64,
    pub profit: f64,
    pub time: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: Side,
    pub volume: f64,
    pub price: f64,
    pub stop: f64,
    pub target: f64,
    pub magic: u64,
    pub comment: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum OrderStatus {
    Done,
    /// Broker refused the stop/target distances
    InvalidStops,
    Rejected,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderResult {
    pub status: OrderStatus,
    pub ticket: Option<u64>,
    pub code: u32,
    pub price: f64,
    pub comment: String,
}

impl OrderResult {
    pub fn is_done(&self) -> bool {
        self.status == OrderStatus::Done
    }
}
