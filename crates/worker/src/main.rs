use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use watchdesk_core::builder::SnapshotBuilder;
use watchdesk_core::domain::change::ChangeSeverity;
use watchdesk_core::ingest::provider::HttpJsonMarketData;
use watchdesk_core::llm::LlmClient;

mod detect;
mod snapshots;

#[derive(Debug, Parser)]
#[command(name = "watchdesk_worker")]
struct Args {
    /// Market as-of date (YYYY-MM-DD). Defaults to the last US trading day.
    #[arg(long)]
    as_of_date: Option<String>,

    /// Comma-separated symbols to process instead of the tracked universe.
    #[arg(long)]
    symbols: Option<String>,

    /// Fetch and build snapshots but skip every database write.
    #[arg(long)]
    dry_run: bool,

    /// Skip LLM explanations for detected changes.
    #[arg(long)]
    skip_insights: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = watchdesk_core::config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let args = Args::parse();

    let as_of_date = watchdesk_core::time::us_market::resolve_as_of_date(
        args.as_of_date.as_deref(),
        chrono::Utc::now(),
    )?;

    let provider = HttpJsonMarketData::from_settings(&settings)?;
    let builder = SnapshotBuilder::default();

    if args.dry_run {
        let symbols = parse_symbols(args.symbols.as_deref())
            .context("--symbols is required with --dry-run")?;
        return dry_run(&provider, &builder, &symbols, as_of_date).await;
    }

    let db_url = settings.require_database_url()?;
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(db_url)
        .await
        .context("connect DATABASE_URL failed")?;

    watchdesk_core::storage::migrate(&pool).await?;

    let acquired = watchdesk_core::storage::lock::try_acquire_run_lock(&pool, as_of_date).await?;
    if !acquired {
        tracing::warn!(%as_of_date, "run lock not acquired; another run in progress");
        return Ok(());
    }

    let run_result = run(&args, &settings, &provider, &builder, &pool, as_of_date).await;

    let _ = watchdesk_core::storage::lock::release_run_lock(&pool, as_of_date).await;

    if let Err(err) = &run_result {
        sentry_anyhow::capture_anyhow(err);
    }
    run_result
}

async fn run(
    args: &Args,
    settings: &watchdesk_core::config::Settings,
    provider: &HttpJsonMarketData,
    builder: &SnapshotBuilder,
    pool: &sqlx::PgPool,
    as_of_date: chrono::NaiveDate,
) -> anyhow::Result<()> {
    let symbols = match parse_symbols(args.symbols.as_deref()) {
        Some(symbols) => symbols,
        None => watchdesk_core::storage::snapshots::tracked_symbols(pool).await?,
    };
    if symbols.is_empty() {
        tracing::warn!(%as_of_date, "no tracked symbols; nothing to do");
        return Ok(());
    }

    let snapshot_summary = snapshots::run(provider, builder, pool, &symbols).await;
    tracing::info!(
        %as_of_date,
        built = snapshot_summary.built,
        already_present = snapshot_summary.already_present,
        failed = snapshot_summary.failed,
        "snapshot job complete"
    );

    let diffs = detect::run(pool, &symbols).await;
    let run_summary = detect::summarize_run(diffs.iter().map(|(_, d)| d));
    tracing::info!(
        %as_of_date,
        compared = run_summary.compared,
        with_material_change = run_summary.with_material_change,
        high_or_critical = run_summary.high_or_critical,
        "change detection complete"
    );

    if args.skip_insights {
        return Ok(());
    }

    let significant = detect::filter_significant(diffs, ChangeSeverity::Medium);
    if significant.is_empty() {
        return Ok(());
    }

    let llm = watchdesk_core::llm::anthropic::AnthropicClient::from_settings(settings)?;
    let provider_name = llm.provider().as_str();

    for (diff_id, diff) in significant {
        let symbol = diff.symbol.clone();
        let input = watchdesk_core::llm::ExplainInput { diff };

        match llm.explain_change_with_raw(input).await {
            Ok((explanation, raw)) => {
                let insight_id = watchdesk_core::storage::insights::persist_success(
                    pool,
                    &symbol,
                    diff_id,
                    &explanation,
                    provider_name,
                    Some(raw),
                )
                .await?;
                tracing::info!(symbol, %insight_id, "persisted change explanation");
            }
            Err(err) => {
                sentry_anyhow::capture_anyhow(&err);
                let mut raw_llm_response: Option<serde_json::Value> = None;
                if let Some(diag) =
                    err.downcast_ref::<watchdesk_core::llm::error::LlmDiagnosticsError>()
                {
                    if let Some(raw) = diag.raw_output.as_deref() {
                        raw_llm_response = serde_json::from_str(raw)
                            .ok()
                            .or_else(|| Some(serde_json::json!({"raw_text": raw})));
                    }
                }

                let insight_id = watchdesk_core::storage::insights::persist_failure(
                    pool,
                    &symbol,
                    diff_id,
                    provider_name,
                    &format!("{:#}", err),
                    raw_llm_response,
                )
                .await?;
                tracing::error!(symbol, %insight_id, error = %err, "change explanation failed");
            }
        }
    }

    Ok(())
}

async fn dry_run(
    provider: &HttpJsonMarketData,
    builder: &SnapshotBuilder,
    symbols: &[String],
    as_of_date: chrono::NaiveDate,
) -> anyhow::Result<()> {
    let now = chrono::Utc::now();
    for symbol in symbols {
        match snapshots::create_snapshot(provider, builder, symbol, now).await {
            Ok(snapshot) => tracing::info!(
                %as_of_date,
                symbol,
                dry_run = true,
                trend = snapshot.trend_state.as_str(),
                volatility = snapshot.volatility_bucket.as_str(),
                health = snapshot.fundamental_health.as_str(),
                "built snapshot (not persisted)"
            ),
            Err(err) => tracing::error!(symbol, error = %err, "snapshot build failed"),
        }
    }
    Ok(())
}

fn parse_symbols(arg: Option<&str>) -> Option<Vec<String>> {
    let raw = arg?;
    let symbols: Vec<String> = raw
        .split(',')
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .collect();
    if symbols.is_empty() {
        None
    } else {
        Some(symbols)
    }
}

fn init_sentry(settings: &watchdesk_core::config::Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
