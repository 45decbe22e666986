use crate::domain::snapshot::VolatilityBucket;
use crate::ingest::types::DailyBar;

const ATR_WINDOW: usize = 14;

/// ATR-based volatility classification.
///
/// Computes the 14-day ATR as a percentage of the close, then ranks the
/// latest reading against the full ATR% history of the window. Bucket cuts:
/// below the 25th percentile is low, above the 75th is high.
pub fn classify(bars: &[DailyBar]) -> (VolatilityBucket, f64) {
    let series = atr_pct_series(bars);
    let Some(&current) = series.last() else {
        return (VolatilityBucket::Normal, 50.0);
    };

    let below = series.iter().filter(|v| **v < current).count();
    let percentile = below as f64 / series.len() as f64 * 100.0;

    let bucket = if percentile < 25.0 {
        VolatilityBucket::Low
    } else if percentile > 75.0 {
        VolatilityBucket::High
    } else {
        VolatilityBucket::Normal
    };

    (bucket, percentile)
}

/// Rolling ATR% of close for each bar once a full ATR window is available.
fn atr_pct_series(bars: &[DailyBar]) -> Vec<f64> {
    if bars.len() <= ATR_WINDOW {
        return Vec::new();
    }

    let mut true_ranges = Vec::with_capacity(bars.len());
    for (i, bar) in bars.iter().enumerate() {
        let hl = bar.high - bar.low;
        let tr = if i == 0 {
            hl
        } else {
            let prev_close = bars[i - 1].close;
            hl.max((bar.high - prev_close).abs())
                .max((bar.low - prev_close).abs())
        };
        true_ranges.push(tr);
    }

    let mut out = Vec::with_capacity(bars.len() - ATR_WINDOW);
    for i in ATR_WINDOW..bars.len() {
        let atr = true_ranges[i + 1 - ATR_WINDOW..=i].iter().sum::<f64>() / ATR_WINDOW as f64;
        let close = bars[i].close;
        if close > 0.0 {
            out.push(atr / close * 100.0);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn bar(day: u32, close: f64, spread: f64) -> DailyBar {
        DailyBar {
            date: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap() + chrono::Duration::days(day as i64),
            open: close,
            high: close + spread,
            low: close - spread,
            close,
            volume: 1_000_000,
        }
    }

    #[test]
    fn widening_ranges_land_in_high_bucket() {
        // Calm history, then the spread blows out at the end.
        let mut bars: Vec<DailyBar> = (0..55).map(|d| bar(d, 100.0, 0.5)).collect();
        for d in 55..60 {
            bars.push(bar(d, 100.0, 5.0));
        }

        let (bucket, percentile) = classify(&bars);
        assert_eq!(bucket, VolatilityBucket::High);
        assert!(percentile > 75.0);
    }

    #[test]
    fn narrowing_ranges_land_in_low_bucket() {
        let mut bars: Vec<DailyBar> = (0..55).map(|d| bar(d, 100.0, 5.0)).collect();
        for d in 55..75 {
            bars.push(bar(d, 100.0, 0.2));
        }

        let (bucket, _) = classify(&bars);
        assert_eq!(bucket, VolatilityBucket::Low);
    }

    #[test]
    fn too_little_history_defaults_to_normal() {
        let bars: Vec<DailyBar> = (0..5).map(|d| bar(d, 100.0, 1.0)).collect();
        let (bucket, percentile) = classify(&bars);
        assert_eq!(bucket, VolatilityBucket::Normal);
        assert!((percentile - 50.0).abs() < f64::EPSILON);
    }
}
