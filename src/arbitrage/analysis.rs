// src/arbitrage/analysis.rs
//! Offline cost comparison: fetch every provider's history for a window,
//! merge it and replay it through a fresh selector.

use super::export::export_decisions_to_csv;
use super::merger::merge;
use super::selector::{ArbitrageSelector, Decision};
use super::statistics::{analyze_switch_logs, RunSummary, SwitchStatistics};
use crate::error::{ArbiterError, Result};
use crate::pricing::source::fetch_all;
use crate::pricing::{PriceSource, ProviderId};
use crate::utils::Timer;
use chrono::{DateTime, Utc};
use log::info;
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct ComparisonRun {
    pub providers: Vec<ProviderId>,
    pub decisions: Vec<Decision>,
    pub summary: RunSummary,
}

impl ComparisonRun {
    pub fn export_csv(&self, path: impl AsRef<Path>) -> Result<()> {
        export_decisions_to_csv(path, &self.providers, &self.decisions)
    }
}

pub struct SpotPriceAnalyzer {
    source: Arc<dyn PriceSource>,
    region: Option<String>,
}

impl SpotPriceAnalyzer {
    pub fn new(source: Arc<dyn PriceSource>, region: Option<String>) -> Self {
        Self { source, region }
    }

    pub async fn compare_costs(
        &self,
        providers: &[ProviderId],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<ComparisonRun> {
        if start > end {
            return Err(ArbiterError::InvalidInput(format!(
                "window start {} is after end {}",
                start, end
            )));
        }
        let mut selector = ArbitrageSelector::new(providers.to_vec())?;
        let mut timer = Timer::start("compare_costs");

        let series = fetch_all(
            self.source.as_ref(),
            providers,
            start,
            end,
            self.region.as_deref(),
        )
        .await?;
        timer.checkpoint("fetch");

        let decisions = selector.run(merge(&series));
        timer.checkpoint("replay");
        timer.finish();

        let summary = selector.summary();
        info!(
            "📊 {} observations over [{}, {}]: {} switch(es), avg gap {}",
            decisions.len(),
            start,
            end,
            summary.switch_count,
            summary
                .average_inter_switch_time()
                .map(|d| format!("{}s", d.num_seconds()))
                .unwrap_or_else(|| "n/a".to_string())
        );

        Ok(ComparisonRun {
            providers: providers.to_vec(),
            decisions,
            summary,
        })
    }

    /// Compares each provider set over the same window and aggregates the
    /// switch logs across them.
    pub async fn compare_many(
        &self,
        provider_sets: &[Vec<ProviderId>],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<BatchComparison> {
        let mut runs = Vec::with_capacity(provider_sets.len());
        for (i, providers) in provider_sets.iter().enumerate() {
            info!(
                "Comparison run {}/{}: {}",
                i + 1,
                provider_sets.len(),
                providers.iter().map(|p| p.as_str()).collect::<Vec<_>>().join(",")
            );
            runs.push(self.compare_costs(providers, start, end).await?);
        }
        let summaries: Vec<RunSummary> = runs.iter().map(|r| r.summary.clone()).collect();
        let statistics = analyze_switch_logs(&summaries);
        Ok(BatchComparison { runs, statistics })
    }
}

/// Every run of a multi-set comparison plus their aggregate statistics.
#[derive(Debug, Clone)]
pub struct BatchComparison {
    pub runs: Vec<ComparisonRun>,
    pub statistics: Option<SwitchStatistics>,
}

impl BatchComparison {
    /// The run with the most switches; the earliest one wins a tie.
    pub fn champion(&self) -> Option<&ComparisonRun> {
        self.runs.iter().rev().max_by_key(|r| r.summary.switch_count)
    }
}
