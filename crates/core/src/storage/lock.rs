use anyhow::Context;
use chrono::{Datelike, NaiveDate};

// Advisory locks are scoped to the Postgres session. This is a best-effort
// guard: two snapshot runs for the same market date must not interleave,
// while runs for different dates may.
const RUN_LOCK_NAMESPACE: i64 = 0x5741_5443_4844; // "WATCHD" as hex-ish namespace.

/// One lock key per as-of market date.
fn run_lock_key(as_of_date: NaiveDate) -> i64 {
    RUN_LOCK_NAMESPACE ^ (as_of_date.num_days_from_ce() as i64)
}

/// Returns `false` when another run already holds the lock for this date.
pub async fn try_acquire_run_lock(
    pool: &sqlx::PgPool,
    as_of_date: NaiveDate,
) -> anyhow::Result<bool> {
    let key = run_lock_key(as_of_date);
    let acquired: (bool,) = sqlx::query_as("SELECT pg_try_advisory_lock($1)")
        .persistent(false)
        .bind(key)
        .fetch_one(pool)
        .await
        .with_context(|| format!("failed to acquire snapshot run lock (key={key})"))?;
    Ok(acquired.0)
}

pub async fn release_run_lock(pool: &sqlx::PgPool, as_of_date: NaiveDate) -> anyhow::Result<()> {
    let key = run_lock_key(as_of_date);
    sqlx::query("SELECT pg_advisory_unlock($1)")
        .persistent(false)
        .bind(key)
        .execute(pool)
        .await
        .with_context(|| format!("failed to release snapshot run lock (key={key})"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_is_stable_for_a_date() {
        let d = NaiveDate::from_ymd_opt(2026, 1, 15).unwrap();
        assert_eq!(run_lock_key(d), run_lock_key(d));
    }

    #[test]
    fn consecutive_dates_get_distinct_keys() {
        let mon = NaiveDate::from_ymd_opt(2026, 1, 12).unwrap();
        let tue = NaiveDate::from_ymd_opt(2026, 1, 13).unwrap();
        assert_ne!(run_lock_key(mon), run_lock_key(tue));
    }
}
