use crate::domain::snapshot::{
    EventWindow, FundamentalHealth, StockSnapshot, TrendState, VolatilityBucket,
};
use anyhow::Context;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

type SnapshotRow = (
    String,                // symbol
    DateTime<Utc>,         // taken_at
    String,                // trend_state
    f64,                   // trend_strength
    String,                // volatility_bucket
    f64,                   // volatility_percentile
    f64,                   // current_price
    f64,                   // pct_below_52w_high
    f64,                   // pct_above_52w_low
    Option<NaiveDate>,     // event_window_opens_on
    Option<NaiveDate>,     // event_window_closes_on
    Option<i64>,           // days_to_earnings
    Option<f64>,           // pe_ratio
    Option<f64>,           // market_cap
    String,                // fundamental_health
);

const SNAPSHOT_COLUMNS: &str = "symbol, taken_at, trend_state, trend_strength, \
     volatility_bucket, volatility_percentile, current_price, \
     pct_below_52w_high, pct_above_52w_low, \
     event_window_opens_on, event_window_closes_on, days_to_earnings, \
     pe_ratio, market_cap, fundamental_health";

/// Insert a snapshot, honoring snapshot immutability: an existing
/// `(symbol, taken_at)` row is left untouched and `false` is returned.
pub async fn insert_snapshot(
    pool: &sqlx::PgPool,
    snapshot: &StockSnapshot,
) -> anyhow::Result<bool> {
    let id = Uuid::new_v4();
    let res = sqlx::query(
        "INSERT INTO stock_snapshots (id, symbol, taken_at, trend_state, trend_strength, \
             volatility_bucket, volatility_percentile, current_price, \
             pct_below_52w_high, pct_above_52w_low, \
             event_window_opens_on, event_window_closes_on, days_to_earnings, \
             pe_ratio, market_cap, fundamental_health) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16) \
         ON CONFLICT (symbol, taken_at) DO NOTHING",
    )
    .persistent(false)
    .bind(id)
    .bind(&snapshot.symbol)
    .bind(snapshot.taken_at)
    .bind(snapshot.trend_state.as_str())
    .bind(snapshot.trend_strength)
    .bind(snapshot.volatility_bucket.as_str())
    .bind(snapshot.volatility_percentile)
    .bind(snapshot.current_price)
    .bind(snapshot.pct_below_52w_high)
    .bind(snapshot.pct_above_52w_low)
    .bind(snapshot.upcoming_event_window.map(|w| w.opens_on))
    .bind(snapshot.upcoming_event_window.map(|w| w.closes_on))
    .bind(snapshot.days_to_earnings)
    .bind(snapshot.pe_ratio)
    .bind(snapshot.market_cap)
    .bind(snapshot.fundamental_health.as_str())
    .execute(pool)
    .await
    .context("insert stock_snapshots failed")?;

    Ok(res.rows_affected() == 1)
}

pub async fn fetch_latest(
    pool: &sqlx::PgPool,
    symbol: &str,
) -> anyhow::Result<Option<StockSnapshot>> {
    let row = sqlx::query_as::<_, SnapshotRow>(&format!(
        "SELECT {SNAPSHOT_COLUMNS} FROM stock_snapshots \
         WHERE symbol = $1 ORDER BY taken_at DESC LIMIT 1"
    ))
    .bind(symbol)
    .fetch_optional(pool)
    .await
    .context("fetch latest snapshot failed")?;

    row.map(snapshot_from_row).transpose()
}

/// Latest two snapshots, newest first. Used by change detection.
pub async fn fetch_latest_two(
    pool: &sqlx::PgPool,
    symbol: &str,
) -> anyhow::Result<Vec<StockSnapshot>> {
    fetch_history(pool, symbol, 2).await
}

pub async fn fetch_history(
    pool: &sqlx::PgPool,
    symbol: &str,
    limit: i64,
) -> anyhow::Result<Vec<StockSnapshot>> {
    let rows = sqlx::query_as::<_, SnapshotRow>(&format!(
        "SELECT {SNAPSHOT_COLUMNS} FROM stock_snapshots \
         WHERE symbol = $1 ORDER BY taken_at DESC LIMIT $2"
    ))
    .bind(symbol)
    .bind(limit)
    .fetch_all(pool)
    .await
    .context("fetch snapshot history failed")?;

    rows.into_iter().map(snapshot_from_row).collect()
}

pub async fn tracked_symbols(pool: &sqlx::PgPool) -> anyhow::Result<Vec<String>> {
    let rows: Vec<(String,)> =
        sqlx::query_as("SELECT symbol FROM tracked_symbols ORDER BY symbol ASC")
            .fetch_all(pool)
            .await
            .context("fetch tracked_symbols failed")?;
    Ok(rows.into_iter().map(|(s,)| s).collect())
}

fn snapshot_from_row(row: SnapshotRow) -> anyhow::Result<StockSnapshot> {
    let (
        symbol,
        taken_at,
        trend_state,
        trend_strength,
        volatility_bucket,
        volatility_percentile,
        current_price,
        pct_below_52w_high,
        pct_above_52w_low,
        opens_on,
        closes_on,
        days_to_earnings,
        pe_ratio,
        market_cap,
        fundamental_health,
    ) = row;

    let upcoming_event_window = match (opens_on, closes_on) {
        (Some(opens_on), Some(closes_on)) => Some(EventWindow { opens_on, closes_on }),
        (None, None) => None,
        _ => anyhow::bail!("inconsistent event window columns for {symbol} at {taken_at}"),
    };

    Ok(StockSnapshot {
        symbol,
        taken_at,
        trend_state: trend_state.parse::<TrendState>()?,
        trend_strength,
        volatility_bucket: volatility_bucket.parse::<VolatilityBucket>()?,
        volatility_percentile,
        current_price,
        pct_below_52w_high,
        pct_above_52w_low,
        upcoming_event_window,
        days_to_earnings,
        pe_ratio,
        market_cap,
        fundamental_health: fundamental_health.parse::<FundamentalHealth>()?,
    })
}
