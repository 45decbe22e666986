pub mod change;
pub mod contract;
pub mod insight;
pub mod snapshot;
