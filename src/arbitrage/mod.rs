// src/arbitrage/mod.rs
//! Cross-provider price comparison: timeline merge, greedy selection,
//! switch statistics and CSV export.

pub mod analysis;
pub mod export;
pub mod merger;
pub mod selector;
pub mod statistics;

pub use analysis::{BatchComparison, ComparisonRun, SpotPriceAnalyzer};
pub use merger::{merge, MergedTimeline};
pub use selector::{ArbitrageSelector, ArbitrageState, Decision};
pub use statistics::{analyze_switch_logs, RunSummary, SwitchStatistics};
