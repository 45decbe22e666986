use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DailyBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyBarsResponse {
    pub symbol: String,
    pub bars: Vec<DailyBar>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FundamentalsData {
    pub pe_ratio: Option<f64>,
    pub market_cap: Option<f64>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EarningsInfo {
    pub next_earnings_date: Option<NaiveDate>,
}

/// Everything the snapshot builder needs for one symbol.
#[derive(Debug, Clone)]
pub struct SymbolMarketData {
    pub bars: Vec<DailyBar>,
    pub fundamentals: Option<FundamentalsData>,
    pub next_earnings_date: Option<NaiveDate>,
}
