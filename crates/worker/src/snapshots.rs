use chrono::{DateTime, Utc};
use watchdesk_core::builder::SnapshotBuilder;
use watchdesk_core::domain::snapshot::StockSnapshot;
use watchdesk_core::ingest::provider::MarketDataClient;

#[derive(Debug, Default)]
pub struct SnapshotRunSummary {
    pub built: usize,
    pub already_present: usize,
    pub failed: usize,
}

/// Fetch market data and build one snapshot. No database involved.
pub async fn create_snapshot(
    provider: &dyn MarketDataClient,
    builder: &SnapshotBuilder,
    symbol: &str,
    now: DateTime<Utc>,
) -> anyhow::Result<StockSnapshot> {
    let data = provider.fetch_symbol_data(symbol).await?;
    builder.build(
        symbol,
        &data.bars,
        data.fundamentals.as_ref(),
        data.next_earnings_date,
        now,
    )
}

/// Build and persist snapshots for every symbol. A failing symbol is logged
/// and skipped; it never aborts the run.
pub async fn run(
    provider: &dyn MarketDataClient,
    builder: &SnapshotBuilder,
    pool: &sqlx::PgPool,
    symbols: &[String],
) -> SnapshotRunSummary {
    let now = Utc::now();
    let mut summary = SnapshotRunSummary::default();

    for symbol in symbols {
        let snapshot = match create_snapshot(provider, builder, symbol, now).await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                tracing::error!(symbol, error = %err, "snapshot build failed");
                summary.failed += 1;
                continue;
            }
        };

        match watchdesk_core::storage::snapshots::insert_snapshot(pool, &snapshot).await {
            Ok(true) => {
                tracing::info!(
                    symbol,
                    trend = snapshot.trend_state.as_str(),
                    volatility = snapshot.volatility_bucket.as_str(),
                    "snapshot persisted"
                );
                summary.built += 1;
            }
            Ok(false) => {
                // Immutable history: a snapshot for this instant already exists.
                tracing::debug!(symbol, taken_at = %snapshot.taken_at, "snapshot already present");
                summary.already_present += 1;
            }
            Err(err) => {
                tracing::error!(symbol, error = %err, "snapshot persist failed");
                summary.failed += 1;
            }
        }
    }

    summary
}
