pub mod fundamentals;
pub mod trend;
pub mod volatility;
