use crate::analysis::{fundamentals, trend, volatility};
use crate::domain::snapshot::{EventWindow, StockSnapshot};
use crate::ingest::types::{DailyBar, FundamentalsData};
use anyhow::ensure;
use chrono::{DateTime, Duration, NaiveDate, Utc};

/// Days ahead of the earnings report during which the event window is open.
const EARNINGS_WINDOW_DAYS: i64 = 14;

/// Builds point-in-time state snapshots from recent daily bars.
#[derive(Debug, Clone)]
pub struct SnapshotBuilder {
    lookback_days: usize,
}

impl Default for SnapshotBuilder {
    fn default() -> Self {
        Self { lookback_days: 90 }
    }
}

impl SnapshotBuilder {
    pub fn new(lookback_days: usize) -> Self {
        Self { lookback_days }
    }

    /// Build a snapshot for `symbol` as of `now`.
    ///
    /// `bars` is daily OHLCV history; the most recent `lookback_days` bars
    /// are used for trend and volatility, the full slice for the 52-week
    /// position. Fails when no bars are provided.
    pub fn build(
        &self,
        symbol: &str,
        bars: &[DailyBar],
        fundamentals: Option<&FundamentalsData>,
        earnings_date: Option<NaiveDate>,
        now: DateTime<Utc>,
    ) -> anyhow::Result<StockSnapshot> {
        ensure!(!symbol.trim().is_empty(), "symbol must be non-empty");
        ensure!(!bars.is_empty(), "no price data provided for {symbol}");

        let mut bars: Vec<DailyBar> = bars.to_vec();
        bars.sort_by_key(|b| b.date);

        let recent_start = bars.len().saturating_sub(self.lookback_days);
        let recent = &bars[recent_start..];

        let closes: Vec<f64> = recent.iter().map(|b| b.close).collect();
        let (trend_state, trend_strength) = trend::classify(&closes);
        let (volatility_bucket, volatility_percentile) = volatility::classify(recent);

        let current_price = bars[bars.len() - 1].close;
        let (pct_below_52w_high, pct_above_52w_low) = yearly_position(&bars, current_price);

        let today = now.date_naive();
        let days_to_earnings = earnings_date.map(|d| (d - today).num_days());
        let upcoming_event_window = days_to_earnings
            .filter(|d| (0..=EARNINGS_WINDOW_DAYS).contains(d))
            .and_then(|_| earnings_date)
            .map(|report| EventWindow {
                opens_on: (report - Duration::days(EARNINGS_WINDOW_DAYS)).max(today),
                closes_on: report,
            });

        Ok(StockSnapshot {
            symbol: symbol.to_string(),
            taken_at: now,
            trend_state,
            trend_strength,
            volatility_bucket,
            volatility_percentile,
            current_price,
            pct_below_52w_high,
            pct_above_52w_low,
            upcoming_event_window,
            days_to_earnings,
            pe_ratio: fundamentals.and_then(|f| f.pe_ratio),
            market_cap: fundamentals.and_then(|f| f.market_cap),
            fundamental_health: fundamentals::assess(fundamentals),
        })
    }
}

/// Position vs the high/low of the available history (up to 52 weeks).
fn yearly_position(bars: &[DailyBar], current: f64) -> (f64, f64) {
    let high = bars.iter().map(|b| b.high).fold(f64::MIN, f64::max);
    let low = bars.iter().map(|b| b.low).fold(f64::MAX, f64::min);

    let below_high = if high > 0.0 {
        (high - current) / high * 100.0
    } else {
        0.0
    };
    let above_low = if low > 0.0 {
        (current - low) / low * 100.0
    } else {
        0.0
    };

    (below_high, above_low)
}
