use crate::domain::snapshot::FundamentalHealth;
use crate::ingest::types::FundamentalsData;

/// Coarse fundamental health from a few cheap checks.
///
/// Negative earnings are risky, extreme valuations go on watch, and absent
/// data defaults to healthy rather than alarming the user.
pub fn assess(fundamentals: Option<&FundamentalsData>) -> FundamentalHealth {
    let Some(f) = fundamentals else {
        return FundamentalHealth::Healthy;
    };

    if let Some(pe) = f.pe_ratio {
        if pe < 0.0 {
            return FundamentalHealth::Risky;
        }
        if pe > 50.0 {
            return FundamentalHealth::Watch;
        }
    }

    FundamentalHealth::Healthy
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_pe(pe: Option<f64>) -> FundamentalsData {
        FundamentalsData {
            pe_ratio: pe,
            market_cap: Some(1.0e12),
        }
    }

    #[test]
    fn negative_pe_is_risky() {
        assert_eq!(assess(Some(&with_pe(Some(-4.0)))), FundamentalHealth::Risky);
    }

    #[test]
    fn stretched_valuation_is_watch() {
        assert_eq!(assess(Some(&with_pe(Some(72.0)))), FundamentalHealth::Watch);
    }

    #[test]
    fn missing_data_defaults_to_healthy() {
        assert_eq!(assess(None), FundamentalHealth::Healthy);
        assert_eq!(assess(Some(&with_pe(None))), FundamentalHealth::Healthy);
    }
}
