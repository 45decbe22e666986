use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use watchdesk_core::domain::change::SnapshotDiff;
use watchdesk_core::domain::insight::ChangeExplanation;
use watchdesk_core::domain::snapshot::StockSnapshot;

const MAX_HISTORY_LIMIT: i64 = 50;
const DEFAULT_HISTORY_LIMIT: i64 = 10;

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

    let pool: Option<PgPool> = match settings.require_database_url() {
        Ok(db_url) => match sqlx::postgres::PgPoolOptions::new()
            .max_connections(5)
            .connect(db_url)
            .await
        {
            Ok(pool) => match watchdesk_core::storage::migrate(&pool).await {
                Ok(()) => Some(pool),
                Err(e) => {
                    sentry_anyhow::capture_anyhow(&e);
                    tracing::error!(error = %e, "db migrations failed; starting API in degraded mode");
                    None
                }
            },
            Err(e) => {
                let err = anyhow::Error::new(e);
                sentry_anyhow::capture_anyhow(&err);
                tracing::error!(error = %err, "db connect failed; starting API in degraded mode");
                None
            }
        },
        Err(e) => {
            sentry_anyhow::capture_anyhow(&e);
            tracing::error!(error = %e, "DATABASE_URL missing; starting API in degraded mode");
            None
        }
    };

    let state = AppState { pool };

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/snapshots/:symbol/latest", get(get_latest_snapshot))
        .route("/snapshots/:symbol/history", get(get_snapshot_history))
        .route("/changes/:symbol/latest", get(get_latest_change))
        .route("/insights/:symbol/latest", get(get_latest_insight))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3000);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!(%addr, "api listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Debug, Clone)]
struct AppState {
    pool: Option<PgPool>,
}

#[derive(Debug, Serialize)]
struct ApiSnapshot {
    snapshot: StockSnapshot,
}

#[derive(Debug, Serialize)]
struct ApiChange {
    diff_id: Uuid,
    diff: SnapshotDiff,
}

#[derive(Debug, Serialize)]
struct ApiInsight {
    insight_id: Uuid,
    generated_at: DateTime<Utc>,
    provider: String,
    explanation: ChangeExplanation,
}

#[derive(Debug, Deserialize)]
struct HistoryParams {
    limit: Option<i64>,
}

async fn get_latest_snapshot(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
) -> Result<Json<ApiSnapshot>, StatusCode> {
    let Some(pool) = &state.pool else {
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    };
    let symbol = normalize_symbol(&symbol)?;

    let snapshot = watchdesk_core::storage::snapshots::fetch_latest(pool, &symbol)
        .await
        .map_err(internal_error)?
        .ok_or(StatusCode::NOT_FOUND)?;

    Ok(Json(ApiSnapshot { snapshot }))
}

async fn get_snapshot_history(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<Vec<StockSnapshot>>, StatusCode> {
    let Some(pool) = &state.pool else {
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    };
    let symbol = normalize_symbol(&symbol)?;

    let limit = effective_history_limit(params.limit);
    let history = watchdesk_core::storage::snapshots::fetch_history(pool, &symbol, limit)
        .await
        .map_err(internal_error)?;

    Ok(Json(history))
}

async fn get_latest_change(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
) -> Result<Json<ApiChange>, StatusCode> {
    let Some(pool) = &state.pool else {
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    };
    let symbol = normalize_symbol(&symbol)?;

    let (diff_id, diff) = watchdesk_core::storage::diffs::fetch_latest_diff(pool, &symbol)
        .await
        .map_err(internal_error)?
        .ok_or(StatusCode::NOT_FOUND)?;

    Ok(Json(ApiChange { diff_id, diff }))
}

async fn get_latest_insight(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
) -> Result<Json<ApiInsight>, StatusCode> {
    let Some(pool) = &state.pool else {
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    };
    let symbol = normalize_symbol(&symbol)?;

    let (insight_id, generated_at, provider, explanation) =
        watchdesk_core::storage::insights::fetch_latest_success(pool, &symbol)
            .await
            .map_err(internal_error)?
            .ok_or(StatusCode::NOT_FOUND)?;

    Ok(Json(ApiInsight {
        insight_id,
        generated_at,
        provider,
        explanation,
    }))
}

/// Out-of-range limits are clamped, not rejected.
fn effective_history_limit(requested: Option<i64>) -> i64 {
    requested
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .clamp(1, MAX_HISTORY_LIMIT)
}

fn normalize_symbol(symbol: &str) -> Result<String, StatusCode> {
    let symbol = symbol.trim().to_uppercase();
    if symbol.is_empty() || symbol.len() > 16 {
        return Err(StatusCode::BAD_REQUEST);
    }
    Ok(symbol)
}

fn internal_error(e: anyhow::Error) -> StatusCode {
    sentry_anyhow::capture_anyhow(&e);
    StatusCode::INTERNAL_SERVER_ERROR
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_limit_defaults_and_clamps() {
        assert_eq!(effective_history_limit(None), DEFAULT_HISTORY_LIMIT);
        assert_eq!(effective_history_limit(Some(25)), 25);
        assert_eq!(effective_history_limit(Some(500)), MAX_HISTORY_LIMIT);
        assert_eq!(effective_history_limit(Some(0)), 1);
        assert_eq!(effective_history_limit(Some(-3)), 1);
    }

    #[test]
    fn symbols_are_trimmed_and_uppercased() {
        assert_eq!(normalize_symbol(" aapl ").unwrap(), "AAPL");
        assert!(normalize_symbol("   ").is_err());
        assert!(normalize_symbol("WAY_TOO_LONG_SYMBOL_NAME").is_err());
    }
}
