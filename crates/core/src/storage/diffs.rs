use crate::domain::change::{ChangeSeverity, ChangeType, SnapshotChange, SnapshotDiff};
use crate::domain::snapshot::FundamentalHealth;
use anyhow::Context;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Persist a change record: header row plus one row per field delta, in a
/// single transaction.
pub async fn persist_diff(pool: &sqlx::PgPool, diff: &SnapshotDiff) -> anyhow::Result<Uuid> {
    let mut tx = pool.begin().await.context("begin transaction failed")?;

    let diff_id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO snapshot_diffs (id, symbol, from_taken_at, to_taken_at, \
             has_material_change, overall_severity, summary, \
             status_changed, old_status, new_status) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
    )
    .bind(diff_id)
    .bind(&diff.symbol)
    .bind(diff.from_taken_at)
    .bind(diff.to_taken_at)
    .bind(diff.has_material_change)
    .bind(diff.overall_severity.as_str())
    .bind(&diff.summary)
    .bind(diff.status_changed)
    .bind(diff.old_status.as_str())
    .bind(diff.new_status.as_str())
    .execute(&mut *tx)
    .await
    .context("insert snapshot_diffs failed")?;

    for (position, change) in diff.changes.iter().enumerate() {
        sqlx::query(
            "INSERT INTO snapshot_diff_changes (diff_id, position, change_type, severity, \
                 description, old_value, new_value) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(diff_id)
        .bind(position as i32)
        .bind(change.change_type.as_str())
        .bind(change.severity.as_str())
        .bind(&change.description)
        .bind(&change.old_value)
        .bind(&change.new_value)
        .execute(&mut *tx)
        .await
        .context("insert snapshot_diff_changes failed")?;
    }

    tx.commit().await.context("commit transaction failed")?;
    Ok(diff_id)
}

pub async fn fetch_latest_diff(
    pool: &sqlx::PgPool,
    symbol: &str,
) -> anyhow::Result<Option<(Uuid, SnapshotDiff)>> {
    let row = sqlx::query_as::<
        _,
        (
            Uuid,
            DateTime<Utc>,
            DateTime<Utc>,
            bool,
            String,
            String,
            bool,
            String,
            String,
        ),
    >(
        "SELECT id, from_taken_at, to_taken_at, has_material_change, overall_severity, \
             summary, status_changed, old_status, new_status \
         FROM snapshot_diffs \
         WHERE symbol = $1 \
         ORDER BY created_at DESC \
         LIMIT 1",
    )
    .bind(symbol)
    .fetch_optional(pool)
    .await
    .context("fetch latest snapshot_diffs failed")?;

    let Some((
        id,
        from_taken_at,
        to_taken_at,
        has_material_change,
        overall_severity,
        summary,
        status_changed,
        old_status,
        new_status,
    )) = row
    else {
        return Ok(None);
    };

    let changes = fetch_changes(pool, id).await?;

    Ok(Some((
        id,
        SnapshotDiff {
            symbol: symbol.to_string(),
            from_taken_at,
            to_taken_at,
            changes,
            has_material_change,
            overall_severity: overall_severity.parse::<ChangeSeverity>()?,
            summary,
            status_changed,
            old_status: old_status.parse::<FundamentalHealth>()?,
            new_status: new_status.parse::<FundamentalHealth>()?,
        },
    )))
}

async fn fetch_changes(pool: &sqlx::PgPool, diff_id: Uuid) -> anyhow::Result<Vec<SnapshotChange>> {
    let rows = sqlx::query_as::<_, (String, String, String, Option<String>, Option<String>)>(
        "SELECT change_type, severity, description, old_value, new_value \
         FROM snapshot_diff_changes \
         WHERE diff_id = $1 \
         ORDER BY position ASC",
    )
    .bind(diff_id)
    .fetch_all(pool)
    .await
    .context("fetch snapshot_diff_changes failed")?;

    let mut out = Vec::with_capacity(rows.len());
    for (change_type, severity, description, old_value, new_value) in rows {
        out.push(SnapshotChange {
            change_type: change_type.parse::<ChangeType>()?,
            severity: severity.parse::<ChangeSeverity>()?,
            description,
            old_value,
            new_value,
        });
    }
    Ok(out)
}
