use crate::domain::change::{ChangeSeverity, ChangeType, SnapshotChange, SnapshotDiff};
use crate::domain::snapshot::{FundamentalHealth, StockSnapshot, TrendState, VolatilityBucket};
use chrono::{DateTime, Utc};
use std::fmt;

/// Percentile points the volatility percentile must move before it is
/// reported on its own (the bucket delta takes precedence when it fires).
const VOLATILITY_PERCENTILE_THRESHOLD: f64 = 30.0;
/// Percent move that counts as a breakout/breakdown.
const PRICE_CHANGE_THRESHOLD_PCT: f64 = 10.0;

/// Raised when two snapshots cannot be compared at all: different symbols,
/// or `taken_at` not strictly increasing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidComparison {
    SymbolMismatch {
        left: String,
        right: String,
    },
    NonIncreasingTimestamp {
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    },
}

impl fmt::Display for InvalidComparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvalidComparison::SymbolMismatch { left, right } => {
                write!(f, "cannot compare snapshots for different symbols: {left} vs {right}")
            }
            InvalidComparison::NonIncreasingTimestamp { from, to } => {
                write!(f, "snapshot timestamps must be strictly increasing: {from} -> {to}")
            }
        }
    }
}

impl std::error::Error for InvalidComparison {}

/// Compare two snapshots of the same symbol and return the change record.
///
/// `old` is T0, `new` is T1; `new.taken_at` must be strictly after
/// `old.taken_at`. Unchanged fields produce no delta.
pub fn compare(
    old: &StockSnapshot,
    new: &StockSnapshot,
) -> Result<SnapshotDiff, InvalidComparison> {
    if old.symbol != new.symbol {
        return Err(InvalidComparison::SymbolMismatch {
            left: old.symbol.clone(),
            right: new.symbol.clone(),
        });
    }
    if new.taken_at <= old.taken_at {
        return Err(InvalidComparison::NonIncreasingTimestamp {
            from: old.taken_at,
            to: new.taken_at,
        });
    }

    let mut changes: Vec<SnapshotChange> = Vec::new();

    if let Some(c) = check_trend(old, new) {
        changes.push(c);
    }
    if let Some(c) = check_volatility(old, new) {
        changes.push(c);
    }
    if let Some(c) = check_earnings(old, new) {
        changes.push(c);
    }
    if let Some(c) = check_fundamentals(old, new) {
        changes.push(c);
    }
    if let Some(c) = check_price(old, new) {
        changes.push(c);
    }

    let has_material_change = !changes.is_empty();
    let overall_severity = changes
        .iter()
        .map(|c| c.severity)
        .max()
        .unwrap_or(ChangeSeverity::Low);
    let summary = summarize(&new.symbol, &changes);

    Ok(SnapshotDiff {
        symbol: new.symbol.clone(),
        from_taken_at: old.taken_at,
        to_taken_at: new.taken_at,
        changes,
        has_material_change,
        overall_severity,
        summary,
        status_changed: old.fundamental_health != new.fundamental_health,
        old_status: old.fundamental_health,
        new_status: new.fundamental_health,
    })
}

fn check_trend(old: &StockSnapshot, new: &StockSnapshot) -> Option<SnapshotChange> {
    if old.trend_state == new.trend_state {
        return None;
    }

    // A full reversal between up and down is high-severity; lateral moves
    // through sideways are low-severity.
    let reversal = matches!(
        (old.trend_state, new.trend_state),
        (TrendState::Up, TrendState::Down) | (TrendState::Down, TrendState::Up)
    );
    let severity = if reversal {
        ChangeSeverity::High
    } else {
        ChangeSeverity::Low
    };

    Some(SnapshotChange {
        change_type: ChangeType::TrendReversal,
        severity,
        description: format!(
            "Trend changed from {} to {}",
            old.trend_state.as_str(),
            new.trend_state.as_str()
        ),
        old_value: Some(old.trend_state.as_str().to_string()),
        new_value: Some(new.trend_state.as_str().to_string()),
    })
}

fn check_volatility(old: &StockSnapshot, new: &StockSnapshot) -> Option<SnapshotChange> {
    if old.volatility_bucket != new.volatility_bucket {
        let escalation = new.volatility_bucket == VolatilityBucket::High;
        let (change_type, severity) = if escalation {
            (ChangeType::VolatilitySpike, ChangeSeverity::High)
        } else if new.volatility_bucket > old.volatility_bucket {
            (ChangeType::VolatilitySpike, ChangeSeverity::Low)
        } else {
            (ChangeType::VolatilityDrop, ChangeSeverity::Low)
        };

        return Some(SnapshotChange {
            change_type,
            severity,
            description: format!(
                "Volatility moved from {} to {}",
                old.volatility_bucket.as_str(),
                new.volatility_bucket.as_str()
            ),
            old_value: Some(old.volatility_bucket.as_str().to_string()),
            new_value: Some(new.volatility_bucket.as_str().to_string()),
        });
    }

    // Same bucket: still surface large percentile moves.
    let delta = new.volatility_percentile - old.volatility_percentile;
    if delta.abs() < VOLATILITY_PERCENTILE_THRESHOLD {
        return None;
    }

    if delta > 0.0 {
        Some(SnapshotChange {
            change_type: ChangeType::VolatilitySpike,
            severity: if delta < 40.0 {
                ChangeSeverity::Medium
            } else {
                ChangeSeverity::High
            },
            description: format!("Volatility increased significantly ({delta:.0} percentile points)"),
            old_value: Some(format!("{:.0}th percentile", old.volatility_percentile)),
            new_value: Some(format!("{:.0}th percentile", new.volatility_percentile)),
        })
    } else {
        Some(SnapshotChange {
            change_type: ChangeType::VolatilityDrop,
            severity: ChangeSeverity::Low,
            description: format!("Volatility decreased ({:.0} percentile points)", delta.abs()),
            old_value: Some(format!("{:.0}th percentile", old.volatility_percentile)),
            new_value: Some(format!("{:.0}th percentile", new.volatility_percentile)),
        })
    }
}

fn check_earnings(old: &StockSnapshot, new: &StockSnapshot) -> Option<SnapshotChange> {
    if old.in_event_window() || !new.in_event_window() {
        return None;
    }

    let days = new
        .days_to_earnings
        .map(|d| format!("{d} days to earnings"))
        .unwrap_or_else(|| "earnings window open".to_string());

    Some(SnapshotChange {
        change_type: ChangeType::EarningsApproaching,
        severity: ChangeSeverity::Medium,
        description: format!("Entering earnings window ({days})"),
        old_value: Some("outside earnings window".to_string()),
        new_value: Some(days),
    })
}

fn check_fundamentals(old: &StockSnapshot, new: &StockSnapshot) -> Option<SnapshotChange> {
    if old.fundamental_health == new.fundamental_health {
        return None;
    }

    let severity = if new.fundamental_health == FundamentalHealth::Risky {
        ChangeSeverity::Critical
    } else if old.fundamental_health == FundamentalHealth::Risky {
        // Improvement out of risky still deserves attention.
        ChangeSeverity::High
    } else {
        ChangeSeverity::Medium
    };

    Some(SnapshotChange {
        change_type: ChangeType::FundamentalShift,
        severity,
        description: format!(
            "Fundamental health changed from {} to {}",
            old.fundamental_health.as_str(),
            new.fundamental_health.as_str()
        ),
        old_value: Some(old.fundamental_health.as_str().to_string()),
        new_value: Some(new.fundamental_health.as_str().to_string()),
    })
}

fn check_price(old: &StockSnapshot, new: &StockSnapshot) -> Option<SnapshotChange> {
    if old.current_price <= 0.0 {
        return None;
    }
    let pct = (new.current_price - old.current_price) / old.current_price * 100.0;

    if pct >= PRICE_CHANGE_THRESHOLD_PCT {
        Some(SnapshotChange {
            change_type: ChangeType::PriceBreakout,
            severity: ChangeSeverity::High,
            description: format!("Price broke out +{pct:.1}%"),
            old_value: Some(format!("${:.2}", old.current_price)),
            new_value: Some(format!("${:.2}", new.current_price)),
        })
    } else if pct <= -PRICE_CHANGE_THRESHOLD_PCT {
        Some(SnapshotChange {
            change_type: ChangeType::PriceBreakdown,
            severity: ChangeSeverity::Critical,
            description: format!("Price broke down {pct:.1}%"),
            old_value: Some(format!("${:.2}", old.current_price)),
            new_value: Some(format!("${:.2}", new.current_price)),
        })
    } else {
        None
    }
}

fn summarize(symbol: &str, changes: &[SnapshotChange]) -> String {
    match changes {
        [] => format!("No material changes detected for {symbol}"),
        [only] => format!("{symbol}: {}", only.description),
        _ => {
            let top: Vec<&str> = changes
                .iter()
                .take(3)
                .map(|c| c.description.as_str())
                .collect();
            format!("{symbol}: {}", top.join("; "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn snapshot(symbol: &str, hour: u32) -> StockSnapshot {
        StockSnapshot {
            symbol: symbol.to_string(),
            taken_at: Utc.with_ymd_and_hms(2026, 1, 15, hour, 0, 0).unwrap(),
            trend_state: TrendState::Up,
            trend_strength: 0.7,
            volatility_bucket: VolatilityBucket::Normal,
            volatility_percentile: 50.0,
            current_price: 100.0,
            pct_below_52w_high: 5.0,
            pct_above_52w_low: 20.0,
            upcoming_event_window: None,
            days_to_earnings: None,
            pe_ratio: Some(25.0),
            market_cap: Some(1.0e12),
            fundamental_health: FundamentalHealth::Healthy,
        }
    }

    #[test]
    fn identical_snapshots_produce_empty_change_record() {
        let old = snapshot("AAPL", 0);
        let new = snapshot("AAPL", 12);

        let diff = compare(&old, &new).unwrap();
        assert!(diff.changes.is_empty());
        assert!(!diff.has_material_change);
        assert_eq!(diff.overall_severity, ChangeSeverity::Low);
        assert_eq!(diff.summary, "No material changes detected for AAPL");
    }

    #[test]
    fn trend_reversal_up_to_down_is_high_severity() {
        let old = snapshot("AAPL", 0);
        let mut new = snapshot("AAPL", 12);
        new.trend_state = TrendState::Down;

        let diff = compare(&old, &new).unwrap();
        assert_eq!(diff.changes.len(), 1);
        assert_eq!(diff.changes[0].change_type, ChangeType::TrendReversal);
        assert_eq!(diff.overall_severity, ChangeSeverity::High);
    }

    #[test]
    fn lateral_trend_move_is_low_severity() {
        let mut old = snapshot("AAPL", 0);
        old.trend_state = TrendState::Sideways;
        let new = snapshot("AAPL", 12);

        let diff = compare(&old, &new).unwrap();
        assert_eq!(diff.changes.len(), 1);
        assert_eq!(diff.changes[0].severity, ChangeSeverity::Low);
    }

    #[test]
    fn volatility_escalation_low_to_high_is_high_severity() {
        let mut old = snapshot("AAPL", 0);
        old.volatility_bucket = VolatilityBucket::Low;
        old.volatility_percentile = 10.0;
        let mut new = snapshot("AAPL", 12);
        new.volatility_bucket = VolatilityBucket::High;
        new.volatility_percentile = 90.0;

        let diff = compare(&old, &new).unwrap();
        assert_eq!(diff.changes.len(), 1);
        assert_eq!(diff.changes[0].change_type, ChangeType::VolatilitySpike);
        assert_eq!(diff.overall_severity, ChangeSeverity::High);
    }

    #[test]
    fn volatility_deescalation_is_low_severity() {
        let mut old = snapshot("AAPL", 0);
        old.volatility_bucket = VolatilityBucket::High;
        old.volatility_percentile = 90.0;
        let mut new = snapshot("AAPL", 12);
        new.volatility_bucket = VolatilityBucket::Normal;
        new.volatility_percentile = 50.0;

        let diff = compare(&old, &new).unwrap();
        assert_eq!(diff.changes[0].change_type, ChangeType::VolatilityDrop);
        assert_eq!(diff.changes[0].severity, ChangeSeverity::Low);
    }

    #[test]
    fn percentile_spike_within_bucket_is_reported() {
        let mut old = snapshot("AAPL", 0);
        old.volatility_percentile = 30.0;
        let mut new = snapshot("AAPL", 12);
        new.volatility_percentile = 72.0;

        let diff = compare(&old, &new).unwrap();
        assert_eq!(diff.changes.len(), 1);
        assert_eq!(diff.changes[0].change_type, ChangeType::VolatilitySpike);
        assert_eq!(diff.changes[0].severity, ChangeSeverity::High);
    }

    #[test]
    fn symbol_mismatch_is_invalid() {
        let old = snapshot("AAPL", 0);
        let new = snapshot("MSFT", 12);

        let err = compare(&old, &new).unwrap_err();
        assert!(matches!(err, InvalidComparison::SymbolMismatch { .. }));
    }

    #[test]
    fn non_increasing_timestamps_are_invalid() {
        let old = snapshot("AAPL", 12);
        let new = snapshot("AAPL", 0);
        let err = compare(&old, &new).unwrap_err();
        assert!(matches!(
            err,
            InvalidComparison::NonIncreasingTimestamp { .. }
        ));

        // Equal timestamps are rejected too.
        let same = snapshot("AAPL", 12);
        assert!(compare(&old, &same).is_err());
    }

    #[test]
    fn entering_earnings_window_is_medium() {
        let old = snapshot("AAPL", 0);
        let mut new = snapshot("AAPL", 12);
        new.upcoming_event_window = Some(crate::domain::snapshot::EventWindow {
            opens_on: chrono::NaiveDate::from_ymd_opt(2026, 1, 15).unwrap(),
            closes_on: chrono::NaiveDate::from_ymd_opt(2026, 1, 25).unwrap(),
        });
        new.days_to_earnings = Some(10);

        let diff = compare(&old, &new).unwrap();
        assert_eq!(diff.changes.len(), 1);
        assert_eq!(
            diff.changes[0].change_type,
            ChangeType::EarningsApproaching
        );
        assert_eq!(diff.changes[0].severity, ChangeSeverity::Medium);
    }

    #[test]
    fn shift_into_risky_is_critical_and_flags_status() {
        let old = snapshot("AAPL", 0);
        let mut new = snapshot("AAPL", 12);
        new.fundamental_health = FundamentalHealth::Risky;

        let diff = compare(&old, &new).unwrap();
        assert_eq!(diff.overall_severity, ChangeSeverity::Critical);
        assert!(diff.status_changed);
        assert_eq!(diff.new_status, FundamentalHealth::Risky);
    }

    #[test]
    fn price_breakdown_is_critical_breakout_is_high() {
        let old = snapshot("AAPL", 0);
        let mut down = snapshot("AAPL", 12);
        down.current_price = 88.0;
        let diff = compare(&old, &down).unwrap();
        assert_eq!(diff.changes[0].change_type, ChangeType::PriceBreakdown);
        assert_eq!(diff.overall_severity, ChangeSeverity::Critical);

        let mut up = snapshot("AAPL", 12);
        up.current_price = 112.0;
        let diff = compare(&old, &up).unwrap();
        assert_eq!(diff.changes[0].change_type, ChangeType::PriceBreakout);
        assert_eq!(diff.overall_severity, ChangeSeverity::High);
    }

    #[test]
    fn multiple_changes_keep_check_order_and_max_severity() {
        let mut old = snapshot("AAPL", 0);
        old.trend_state = TrendState::Sideways;
        let mut new = snapshot("AAPL", 12);
        new.trend_state = TrendState::Up;
        new.fundamental_health = FundamentalHealth::Watch;

        let diff = compare(&old, &new).unwrap();
        assert_eq!(diff.changes.len(), 2);
        assert_eq!(diff.changes[0].change_type, ChangeType::TrendReversal);
        assert_eq!(diff.changes[1].change_type, ChangeType::FundamentalShift);
        assert_eq!(diff.overall_severity, ChangeSeverity::Medium);
        assert!(diff.summary.starts_with("AAPL: "));
    }
}
