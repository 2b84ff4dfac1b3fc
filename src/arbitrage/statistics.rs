// src/arbitrage/statistics.rs
//! Switch statistics for single and repeated comparison runs.

use crate::pricing::ProviderId;
use chrono::{DateTime, Duration, Utc};
use itertools::{Itertools, MinMaxResult};
use serde::{Deserialize, Serialize};

/// Outcome of one selector run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub providers: Vec<ProviderId>,
    pub switch_count: u64,
    pub switch_timestamps: Vec<DateTime<Utc>>,
}

impl RunSummary {
    /// Gaps between consecutive switches.
    pub fn inter_switch_gaps(&self) -> Vec<Duration> {
        self.switch_timestamps
            .windows(2)
            .map(|w| w[1] - w[0])
            .collect()
    }

    /// Mean gap between consecutive switches. `None` with fewer than two.
    pub fn average_inter_switch_time(&self) -> Option<Duration> {
        let gaps = self.inter_switch_gaps();
        if gaps.is_empty() {
            return None;
        }
        let total: Duration = gaps.iter().fold(Duration::zero(), |acc, g| acc + *g);
        Some(total / gaps.len() as i32)
    }
}

/// Aggregate over several runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwitchStatistics {
    pub runs: usize,
    pub average_switches: f64,
    pub min_switches: u64,
    pub max_switches: u64,
    /// Total of all gaps over total gap count, pooled across runs.
    pub average_inter_switch_time: Option<Duration>,
}

pub fn analyze_switch_logs(runs: &[RunSummary]) -> Option<SwitchStatistics> {
    let (min_switches, max_switches) = match runs.iter().map(|r| r.switch_count).minmax() {
        MinMaxResult::NoElements => return None,
        MinMaxResult::OneElement(n) => (n, n),
        MinMaxResult::MinMax(lo, hi) => (lo, hi),
    };
    let total_switches: u64 = runs.iter().map(|r| r.switch_count).sum();

    let gaps: Vec<Duration> = runs.iter().flat_map(|r| r.inter_switch_gaps()).collect();
    let average_inter_switch_time = if gaps.is_empty() {
        None
    } else {
        let total = gaps.iter().fold(Duration::zero(), |acc, g| acc + *g);
        Some(total / gaps.len() as i32)
    };

    Some(SwitchStatistics {
        runs: runs.len(),
        average_switches: total_switches as f64 / runs.len() as f64,
        min_switches,
        max_switches,
        average_inter_switch_time,
    })
}
