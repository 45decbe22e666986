use crate::config::Settings;
use crate::ingest::types::{
    DailyBar, DailyBarsResponse, EarningsInfo, FundamentalsData, SymbolMarketData,
};
use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderValue};
use serde::de::DeserializeOwned;
use std::time::Duration;

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_RETRIES: u32 = 3;
const DEFAULT_LOOKBACK_DAYS: u32 = 90;

#[async_trait::async_trait]
pub trait MarketDataClient: Send + Sync {
    fn provider_name(&self) -> &'static str;

    async fn fetch_symbol_data(&self, symbol: &str) -> Result<SymbolMarketData>;
}

/// Market data over a plain HTTP JSON provider, in the shape of
/// `GET {base}/v1/bars?symbol=...`, `/v1/fundamentals`, `/v1/earnings`.
#[derive(Debug, Clone)]
pub struct HttpJsonMarketData {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    lookback_days: u32,
    retries: u32,
}

impl HttpJsonMarketData {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let base_url = settings.require_market_data_base_url()?.to_string();
        let api_key = settings.market_data_api_key.clone();

        let timeout_secs = std::env::var("MARKET_DATA_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let retries = std::env::var("MARKET_DATA_RETRIES")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(DEFAULT_RETRIES);

        let lookback_days = std::env::var("MARKET_DATA_LOOKBACK_DAYS")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(DEFAULT_LOOKBACK_DAYS);

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("failed to build market data http client")?;

        Ok(Self {
            http,
            base_url,
            api_key,
            lookback_days,
            retries,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        if let Some(api_key) = &self.api_key {
            headers.insert("x-api-key", HeaderValue::from_str(api_key)?);
        }
        Ok(headers)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        let res = self
            .http
            .get(self.url(path))
            .headers(self.headers()?)
            .query(query)
            .send()
            .await
            .with_context(|| format!("market data request failed: {path}"))?;

        let status = res.status();
        let text = res
            .text()
            .await
            .context("failed to read market data response")?;

        if !status.is_success() {
            anyhow::bail!("market data provider HTTP {status} on {path}: {text}");
        }

        serde_json::from_str::<T>(&text)
            .with_context(|| format!("market data response is not valid JSON on {path}: {text}"))
    }

    async fn fetch_once(&self, symbol: &str) -> Result<SymbolMarketData> {
        let bars: DailyBarsResponse = self
            .get_json(
                "/v1/bars",
                &[
                    ("symbol", symbol.to_string()),
                    ("lookback_days", self.lookback_days.to_string()),
                ],
            )
            .await?;
        validate_bars(symbol, &bars)?;

        // Fundamentals and earnings are best-effort; a snapshot is still
        // useful without them.
        let fundamentals: Option<FundamentalsData> = match self
            .get_json("/v1/fundamentals", &[("symbol", symbol.to_string())])
            .await
        {
            Ok(f) => Some(f),
            Err(err) => {
                tracing::warn!(symbol, error = %err, "fundamentals fetch failed; continuing without");
                None
            }
        };

        let earnings: Option<EarningsInfo> = match self
            .get_json("/v1/earnings", &[("symbol", symbol.to_string())])
            .await
        {
            Ok(e) => Some(e),
            Err(err) => {
                tracing::warn!(symbol, error = %err, "earnings fetch failed; continuing without");
                None
            }
        };

        Ok(SymbolMarketData {
            bars: bars.bars,
            fundamentals,
            next_earnings_date: earnings.and_then(|e| e.next_earnings_date),
        })
    }
}

#[async_trait::async_trait]
impl MarketDataClient for HttpJsonMarketData {
    fn provider_name(&self) -> &'static str {
        "external_http_json"
    }

    async fn fetch_symbol_data(&self, symbol: &str) -> Result<SymbolMarketData> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match self.fetch_once(symbol).await {
                Ok(data) => return Ok(data),
                Err(err) => {
                    if attempt >= self.retries {
                        return Err(err);
                    }
                    let backoff = Duration::from_secs(1u64 << (attempt - 1));
                    tracing::warn!(symbol, attempt, ?backoff, error = %err, "market data fetch failed; retrying");
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }
}

fn validate_bars(symbol: &str, resp: &DailyBarsResponse) -> Result<()> {
    anyhow::ensure!(
        resp.symbol == symbol,
        "provider symbol mismatch: expected {symbol}, got {}",
        resp.symbol
    );
    anyhow::ensure!(!resp.bars.is_empty(), "provider returned no bars for {symbol}");
    for bar in &resp.bars {
        validate_bar(symbol, bar)?;
    }
    Ok(())
}

fn validate_bar(symbol: &str, bar: &DailyBar) -> Result<()> {
    anyhow::ensure!(
        bar.low <= bar.high,
        "bar low > high for {symbol} on {}",
        bar.date
    );
    anyhow::ensure!(
        bar.close > 0.0 && bar.open > 0.0,
        "non-positive price for {symbol} on {}",
        bar.date
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::json;

    #[test]
    fn parses_expected_bars_shape() {
        let v = json!({
            "symbol": "AAPL",
            "bars": [
                {
                    "date": "2026-01-14",
                    "open": 184.0,
                    "high": 186.2,
                    "low": 183.1,
                    "close": 185.5,
                    "volume": 48_000_000_i64
                }
            ]
        });

        let parsed: DailyBarsResponse = serde_json::from_value(v).unwrap();
        assert_eq!(parsed.symbol, "AAPL");
        assert_eq!(parsed.bars.len(), 1);
        assert_eq!(
            parsed.bars[0].date,
            NaiveDate::from_ymd_opt(2026, 1, 14).unwrap()
        );
        validate_bars("AAPL", &parsed).unwrap();
    }

    #[test]
    fn rejects_symbol_mismatch_and_empty_bars() {
        let resp = DailyBarsResponse {
            symbol: "MSFT".to_string(),
            bars: vec![],
        };
        assert!(validate_bars("AAPL", &resp).is_err());

        let resp = DailyBarsResponse {
            symbol: "AAPL".to_string(),
            bars: vec![],
        };
        assert!(validate_bars("AAPL", &resp).is_err());
    }

    #[test]
    fn rejects_inverted_bar_range() {
        let bar = DailyBar {
            date: NaiveDate::from_ymd_opt(2026, 1, 14).unwrap(),
            open: 100.0,
            high: 99.0,
            low: 101.0,
            close: 100.0,
            volume: 1,
        };
        assert!(validate_bar("AAPL", &bar).is_err());
    }
}
