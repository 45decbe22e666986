use uuid::Uuid;
use watchdesk_core::compare;
use watchdesk_core::domain::change::{ChangeSeverity, SnapshotDiff};

#[derive(Debug, Default)]
pub struct DetectRunSummary {
    pub compared: usize,
    pub with_material_change: usize,
    pub high_or_critical: usize,
}

/// Compare the latest two snapshots per symbol and persist each change
/// record. Symbols with fewer than two snapshots are skipped (first run).
pub async fn run(pool: &sqlx::PgPool, symbols: &[String]) -> Vec<(Uuid, SnapshotDiff)> {
    let mut out = Vec::new();

    for symbol in symbols {
        match detect_for_symbol(pool, symbol).await {
            Ok(Some(entry)) => out.push(entry),
            Ok(None) => {
                tracing::debug!(symbol, "no previous snapshot; skipping comparison");
            }
            Err(err) => {
                tracing::error!(symbol, error = %err, "change detection failed");
            }
        }
    }

    out
}

async fn detect_for_symbol(
    pool: &sqlx::PgPool,
    symbol: &str,
) -> anyhow::Result<Option<(Uuid, SnapshotDiff)>> {
    let mut latest_two = watchdesk_core::storage::snapshots::fetch_latest_two(pool, symbol).await?;
    if latest_two.len() < 2 {
        return Ok(None);
    }

    // fetch_latest_two returns newest first.
    let new = latest_two.remove(0);
    let old = latest_two.remove(0);

    let diff = compare::compare(&old, &new)?;
    if diff.has_material_change {
        tracing::info!(
            symbol,
            severity = diff.overall_severity.as_str(),
            changes = diff.changes.len(),
            "material change detected"
        );
    }

    let diff_id = watchdesk_core::storage::diffs::persist_diff(pool, &diff).await?;
    Ok(Some((diff_id, diff)))
}

/// Keep only material diffs at or above `min_severity`.
pub fn filter_significant(
    diffs: Vec<(Uuid, SnapshotDiff)>,
    min_severity: ChangeSeverity,
) -> Vec<(Uuid, SnapshotDiff)> {
    diffs
        .into_iter()
        .filter(|(_, d)| d.has_material_change && d.overall_severity >= min_severity)
        .collect()
}

pub fn summarize_run<'a>(diffs: impl Iterator<Item = &'a SnapshotDiff>) -> DetectRunSummary {
    let mut summary = DetectRunSummary::default();
    for diff in diffs {
        summary.compared += 1;
        if diff.has_material_change {
            summary.with_material_change += 1;
        }
        if diff.overall_severity >= ChangeSeverity::High && diff.has_material_change {
            summary.high_or_critical += 1;
        }
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use watchdesk_core::domain::change::{ChangeType, SnapshotChange};
    use watchdesk_core::domain::snapshot::FundamentalHealth;

    fn diff(symbol: &str, severity: ChangeSeverity, material: bool) -> (Uuid, SnapshotDiff) {
        let changes = if material {
            vec![SnapshotChange {
                change_type: ChangeType::TrendReversal,
                severity,
                description: "Trend changed".to_string(),
                old_value: None,
                new_value: None,
            }]
        } else {
            Vec::new()
        };

        (
            Uuid::new_v4(),
            SnapshotDiff {
                symbol: symbol.to_string(),
                from_taken_at: Utc.with_ymd_and_hms(2026, 1, 14, 21, 0, 0).unwrap(),
                to_taken_at: Utc.with_ymd_and_hms(2026, 1, 15, 21, 0, 0).unwrap(),
                changes,
                has_material_change: material,
                overall_severity: if material { severity } else { ChangeSeverity::Low },
                summary: String::new(),
                status_changed: false,
                old_status: FundamentalHealth::Healthy,
                new_status: FundamentalHealth::Healthy,
            },
        )
    }

    #[test]
    fn filter_drops_quiet_and_low_severity_diffs() {
        let diffs = vec![
            diff("AAPL", ChangeSeverity::Low, true),
            diff("MSFT", ChangeSeverity::Medium, true),
            diff("NVDA", ChangeSeverity::Critical, true),
            diff("KO", ChangeSeverity::Low, false),
        ];

        let kept = filter_significant(diffs, ChangeSeverity::Medium);
        let symbols: Vec<&str> = kept.iter().map(|(_, d)| d.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["MSFT", "NVDA"]);
    }

    #[test]
    fn summarize_counts_material_and_high_severity() {
        let diffs = vec![
            diff("AAPL", ChangeSeverity::High, true),
            diff("MSFT", ChangeSeverity::Medium, true),
            diff("KO", ChangeSeverity::Low, false),
        ];

        let summary = summarize_run(diffs.iter().map(|(_, d)| d));
        assert_eq!(summary.compared, 3);
        assert_eq!(summary.with_material_change, 2);
        assert_eq!(summary.high_or_critical, 1);
    }
}
