use crate::domain::insight::ChangeExplanation;
use anyhow::Context;
use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

pub async fn persist_success(
    pool: &sqlx::PgPool,
    symbol: &str,
    diff_id: Uuid,
    explanation: &ChangeExplanation,
    provider: &str,
    raw_llm_response: Option<Value>,
) -> anyhow::Result<Uuid> {
    let id = Uuid::new_v4();
    let generated_at: DateTime<Utc> = Utc::now();

    sqlx::query(
        "INSERT INTO change_insights (id, symbol, diff_id, provider, status, \
             what_changed, why_it_matters, what_to_watch, error, raw_llm_response, generated_at) \
         VALUES ($1, $2, $3, $4, 'success', $5, $6, $7, NULL, $8, $9)",
    )
    .bind(id)
    .bind(symbol)
    .bind(diff_id)
    .bind(provider)
    .bind(&explanation.what_changed)
    .bind(&explanation.why_it_matters)
    .bind(&explanation.what_to_watch)
    .bind(raw_llm_response)
    .bind(generated_at)
    .execute(pool)
    .await
    .context("insert change_insights failed")?;

    Ok(id)
}

pub async fn persist_failure(
    pool: &sqlx::PgPool,
    symbol: &str,
    diff_id: Uuid,
    provider: &str,
    error: &str,
    raw_llm_response: Option<Value>,
) -> anyhow::Result<Uuid> {
    let id = Uuid::new_v4();
    let generated_at: DateTime<Utc> = Utc::now();

    sqlx::query(
        "INSERT INTO change_insights (id, symbol, diff_id, provider, status, \
             what_changed, why_it_matters, what_to_watch, error, raw_llm_response, generated_at) \
         VALUES ($1, $2, $3, $4, 'error', NULL, NULL, NULL, $5, $6, $7)",
    )
    .bind(id)
    .bind(symbol)
    .bind(diff_id)
    .bind(provider)
    .bind(error)
    .bind(raw_llm_response)
    .bind(generated_at)
    .execute(pool)
    .await
    .context("insert error change_insights failed")?;

    Ok(id)
}

pub async fn fetch_latest_success(
    pool: &sqlx::PgPool,
    symbol: &str,
) -> anyhow::Result<Option<(Uuid, DateTime<Utc>, String, ChangeExplanation)>> {
    let row = sqlx::query_as::<_, (Uuid, DateTime<Utc>, String, String, String, String)>(
        "SELECT id, generated_at, provider, what_changed, why_it_matters, what_to_watch \
         FROM change_insights \
         WHERE symbol = $1 AND status = 'success' \
         ORDER BY generated_at DESC \
         LIMIT 1",
    )
    .bind(symbol)
    .fetch_optional(pool)
    .await
    .context("fetch latest change_insights failed")?;

    Ok(row.map(
        |(id, generated_at, provider, what_changed, why_it_matters, what_to_watch)| {
            (
                id,
                generated_at,
                provider,
                ChangeExplanation {
                    what_changed,
                    why_it_matters,
                    what_to_watch,
                },
            )
        },
    ))
}
