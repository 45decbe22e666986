use crate::domain::snapshot::FundamentalHealth;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    TrendReversal,
    VolatilitySpike,
    VolatilityDrop,
    EarningsApproaching,
    FundamentalShift,
    PriceBreakout,
    PriceBreakdown,
}

impl ChangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeType::TrendReversal => "trend_reversal",
            ChangeType::VolatilitySpike => "volatility_spike",
            ChangeType::VolatilityDrop => "volatility_drop",
            ChangeType::EarningsApproaching => "earnings_approaching",
            ChangeType::FundamentalShift => "fundamental_shift",
            ChangeType::PriceBreakout => "price_breakout",
            ChangeType::PriceBreakdown => "price_breakdown",
        }
    }
}

impl FromStr for ChangeType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "trend_reversal" => Ok(ChangeType::TrendReversal),
            "volatility_spike" => Ok(ChangeType::VolatilitySpike),
            "volatility_drop" => Ok(ChangeType::VolatilityDrop),
            "earnings_approaching" => Ok(ChangeType::EarningsApproaching),
            "fundamental_shift" => Ok(ChangeType::FundamentalShift),
            "price_breakout" => Ok(ChangeType::PriceBreakout),
            "price_breakdown" => Ok(ChangeType::PriceBreakdown),
            other => anyhow::bail!("unknown change type: {other}"),
        }
    }
}

/// Ordered: `Low < Medium < High < Critical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl ChangeSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeSeverity::Low => "low",
            ChangeSeverity::Medium => "medium",
            ChangeSeverity::High => "high",
            ChangeSeverity::Critical => "critical",
        }
    }
}

impl FromStr for ChangeSeverity {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(ChangeSeverity::Low),
            "medium" => Ok(ChangeSeverity::Medium),
            "high" => Ok(ChangeSeverity::High),
            "critical" => Ok(ChangeSeverity::Critical),
            other => anyhow::bail!("unknown change severity: {other}"),
        }
    }
}

/// A single field-level delta detected between two snapshots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotChange {
    pub change_type: ChangeType,
    pub severity: ChangeSeverity,
    pub description: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
}

/// The derived change record between two snapshots of the same symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotDiff {
    pub symbol: String,
    pub from_taken_at: DateTime<Utc>,
    pub to_taken_at: DateTime<Utc>,

    /// Deltas in the fixed check order (trend, volatility, earnings,
    /// fundamentals, price). Unchanged fields are omitted.
    pub changes: Vec<SnapshotChange>,

    pub has_material_change: bool,
    pub overall_severity: ChangeSeverity,
    pub summary: String,

    pub status_changed: bool,
    pub old_status: FundamentalHealth,
    pub new_status: FundamentalHealth,
}
