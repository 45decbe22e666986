use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendState {
    Up,
    Down,
    Sideways,
}

impl TrendState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrendState::Up => "up",
            TrendState::Down => "down",
            TrendState::Sideways => "sideways",
        }
    }
}

impl FromStr for TrendState {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "up" => Ok(TrendState::Up),
            "down" => Ok(TrendState::Down),
            "sideways" => Ok(TrendState::Sideways),
            other => anyhow::bail!("unknown trend state: {other}"),
        }
    }
}

/// Ordered: `Low < Normal < High`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolatilityBucket {
    Low,
    Normal,
    High,
}

impl VolatilityBucket {
    pub fn as_str(&self) -> &'static str {
        match self {
            VolatilityBucket::Low => "low",
            VolatilityBucket::Normal => "normal",
            VolatilityBucket::High => "high",
        }
    }
}

impl FromStr for VolatilityBucket {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(VolatilityBucket::Low),
            "normal" => Ok(VolatilityBucket::Normal),
            "high" => Ok(VolatilityBucket::High),
            other => anyhow::bail!("unknown volatility bucket: {other}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FundamentalHealth {
    Healthy,
    Watch,
    Risky,
}

impl FundamentalHealth {
    pub fn as_str(&self) -> &'static str {
        match self {
            FundamentalHealth::Healthy => "healthy",
            FundamentalHealth::Watch => "watch",
            FundamentalHealth::Risky => "risky",
        }
    }
}

impl FromStr for FundamentalHealth {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "healthy" => Ok(FundamentalHealth::Healthy),
            "watch" => Ok(FundamentalHealth::Watch),
            "risky" => Ok(FundamentalHealth::Risky),
            other => anyhow::bail!("unknown fundamental health: {other}"),
        }
    }
}

/// Date range during which an upcoming event (earnings) is considered live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventWindow {
    pub opens_on: NaiveDate,
    pub closes_on: NaiveDate,
}

/// Point-in-time categorical state of a stock.
///
/// Snapshots are immutable once stored; change detection works on
/// Snapshot_T1 - Snapshot_T0 for the same symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockSnapshot {
    pub symbol: String,
    pub taken_at: DateTime<Utc>,

    pub trend_state: TrendState,
    /// 0..=1, how strong the trend is.
    pub trend_strength: f64,

    pub volatility_bucket: VolatilityBucket,
    /// 0..=100, ATR% percentile within the lookback window.
    pub volatility_percentile: f64,

    pub current_price: f64,
    /// Percent below the 52-week high.
    pub pct_below_52w_high: f64,
    /// Percent above the 52-week low.
    pub pct_above_52w_low: f64,

    pub upcoming_event_window: Option<EventWindow>,
    pub days_to_earnings: Option<i64>,

    pub pe_ratio: Option<f64>,
    pub market_cap: Option<f64>,
    pub fundamental_health: FundamentalHealth,
}

impl StockSnapshot {
    pub fn in_event_window(&self) -> bool {
        self.upcoming_event_window.is_some()
    }
}
