use crate::domain::snapshot::TrendState;

const MA_SHORT: usize = 20;
const MA_LONG: usize = 50;
const SLOPE_LOOKBACK: usize = 10;

/// Classify the trend from a series of daily closes (oldest first).
///
/// With at least 50 closes: 20d vs 50d moving-average crossover plus the
/// slope of the 20d MA. Shorter histories fall back to total return over
/// the window with a +/-5% band. Returns the state and a 0..=1 strength.
pub fn classify(closes: &[f64]) -> (TrendState, f64) {
    if closes.len() < MA_LONG {
        return classify_short_history(closes);
    }

    let ma20 = trailing_mean(closes, MA_SHORT, 0);
    let ma50 = trailing_mean(closes, MA_LONG, 0);
    let ma20_prev = trailing_mean(closes, MA_SHORT, SLOPE_LOOKBACK);

    let ma_diff_pct = (ma20 - ma50) / ma50 * 100.0;
    let ma20_slope = (ma20 - ma20_prev) / ma20_prev * 100.0;

    if ma_diff_pct > 2.0 && ma20_slope > 0.0 {
        let strength = ((ma_diff_pct.abs() + ma20_slope.abs()) / 10.0).min(1.0);
        (TrendState::Up, strength)
    } else if ma_diff_pct < -2.0 && ma20_slope < 0.0 {
        let strength = ((ma_diff_pct.abs() + ma20_slope.abs()) / 10.0).min(1.0);
        (TrendState::Down, strength)
    } else {
        (TrendState::Sideways, 0.3)
    }
}

fn classify_short_history(closes: &[f64]) -> (TrendState, f64) {
    let (Some(first), Some(last)) = (closes.first(), closes.last()) else {
        return (TrendState::Sideways, 0.0);
    };
    if *first <= 0.0 {
        return (TrendState::Sideways, 0.0);
    }

    let change_pct = (last - first) / first * 100.0;
    if change_pct > 5.0 {
        (TrendState::Up, (change_pct.abs() / 20.0).min(1.0))
    } else if change_pct < -5.0 {
        (TrendState::Down, (change_pct.abs() / 20.0).min(1.0))
    } else {
        (TrendState::Sideways, 0.3)
    }
}

/// Mean of `window` values ending `offset` entries before the last close.
fn trailing_mean(closes: &[f64], window: usize, offset: usize) -> f64 {
    let end = closes.len() - offset;
    let start = end - window;
    let slice = &closes[start..end];
    slice.iter().sum::<f64>() / slice.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(from: f64, to: f64, n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| from + (to - from) * i as f64 / (n - 1) as f64)
            .collect()
    }

    #[test]
    fn steady_climb_classifies_up() {
        let closes = ramp(100.0, 140.0, 90);
        let (state, strength) = classify(&closes);
        assert_eq!(state, TrendState::Up);
        assert!(strength > 0.0 && strength <= 1.0);
    }

    #[test]
    fn steady_decline_classifies_down() {
        let closes = ramp(140.0, 100.0, 90);
        let (state, _) = classify(&closes);
        assert_eq!(state, TrendState::Down);
    }

    #[test]
    fn flat_series_classifies_sideways() {
        let closes = vec![100.0; 90];
        let (state, strength) = classify(&closes);
        assert_eq!(state, TrendState::Sideways);
        assert!((strength - 0.3).abs() < f64::EPSILON);
    }

    #[test]
    fn short_history_uses_total_return() {
        let (state, _) = classify(&ramp(100.0, 110.0, 30));
        assert_eq!(state, TrendState::Up);

        let (state, _) = classify(&ramp(100.0, 102.0, 30));
        assert_eq!(state, TrendState::Sideways);
    }

    #[test]
    fn empty_series_is_sideways_with_zero_strength() {
        assert_eq!(classify(&[]), (TrendState::Sideways, 0.0));
    }
}
