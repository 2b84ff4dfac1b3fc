//! The control loop: follow the cheapest provider, keep work flowing on it,
//! and checkpoint progress on a fixed cadence.

use super::config::SimulationConfig;
use super::task::{FailureKind, TaskExecutor, TaskOutcome};
use crate::arbitrage::merger::merge;
use crate::arbitrage::selector::ArbitrageSelector;
use crate::checkpoint::{CheckpointRecord, CheckpointSequencer, CheckpointStore, PeriodDelta};
use crate::compute::{run_command, wait_for_state, ComputeController, ProviderState};
use crate::error::{ArbiterError, Result};
use crate::pricing::source::fetch_all;
use crate::pricing::{PriceSource, ProviderId};
use crate::utils::{Clock, Timer};
use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Initializing,
    Running,
    Checkpointing,
    Terminated,
}

/// What a finished run did.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub resumed_from: u64,
    pub checkpoints: Vec<CheckpointRecord>,
    pub units_completed: u64,
    pub units_not_found: u64,
    pub connectivity_failures: u64,
    pub fatal_failures: u64,
    pub switch_count: u64,
    pub next_unit_id: u64,
    pub cancelled: bool,
}

/// Everything that changes while the loop runs. Owned by one `run` call.
struct RunState {
    selector: ArbitrageSelector,
    /// Newest observation already fed, per provider.
    price_watermarks: HashMap<ProviderId, DateTime<Utc>>,
    last_refresh: Option<DateTime<Utc>>,
    /// Provider confirmed running with its startup command done.
    running_provider: Option<ProviderId>,
    next_unit_id: u64,
    period_start: DateTime<Utc>,
    period_units: u64,
    /// Cost accrued by cadence ticks whose checkpoint has not been committed.
    pending_cost: Decimal,
    last_checkpoint_attempt: DateTime<Utc>,
    report: SimulationReport,
}

pub struct SimulationLoop {
    config: SimulationConfig,
    price_source: Arc<dyn PriceSource>,
    controller: Arc<dyn ComputeController>,
    executor: Arc<dyn TaskExecutor>,
    sequencer: CheckpointSequencer,
    clock: Arc<dyn Clock>,
    shutdown: Arc<AtomicBool>,
    state: LoopState,
}

impl SimulationLoop {
    pub fn new(
        config: SimulationConfig,
        price_source: Arc<dyn PriceSource>,
        controller: Arc<dyn ComputeController>,
        executor: Arc<dyn TaskExecutor>,
        store: Arc<dyn CheckpointStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let sequencer = CheckpointSequencer::new(store, config.conflict_max_attempts);
        Self {
            config,
            price_source,
            controller,
            executor,
            sequencer,
            clock,
            shutdown: Arc::new(AtomicBool::new(false)),
            state: LoopState::Initializing,
        }
    }

    /// Setting the returned flag stops the loop after its current step;
    /// the final checkpoint is still written.
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Runs until `end_time` or cancellation. Only configuration problems
    /// and an unreachable checkpoint store end the run with an error.
    pub async fn run(&mut self, end_time: DateTime<Utc>) -> Result<SimulationReport> {
        self.state = LoopState::Initializing;
        let mut run = self.initialize().await?;
        info!(
            "🚀 Simulation started at unit {} (resuming after checkpoint {}), ends at {}",
            run.next_unit_id, run.report.resumed_from, end_time
        );

        self.state = LoopState::Running;
        let mut fatal = None;
        loop {
            let now = self.clock.now();
            if now >= end_time {
                info!("⏰ End time {} reached", end_time);
                break;
            }
            if self.shutdown.load(Ordering::SeqCst) {
                info!("🛑 Shutdown requested");
                run.report.cancelled = true;
                break;
            }

            if self.elapsed_since(run.last_checkpoint_attempt) >= self.config.checkpoint_interval {
                self.state = LoopState::Checkpointing;
                if let Err(e) = self.checkpoint(&mut run, false).await {
                    fatal = Some(e);
                    break;
                }
                self.state = LoopState::Running;
            }

            let refresh_due = run
                .last_refresh
                .map_or(true, |at| self.elapsed_since(at) >= self.config.price_refresh_interval);
            if refresh_due {
                self.refresh_prices(&mut run).await;
            }

            let Some(target) = run.selector.active_provider().cloned() else {
                warn!("No provider has reported a price yet; waiting");
                self.clock.sleep(self.config.poll_interval).await;
                continue;
            };

            if !self.ensure_active(&mut run, &target).await {
                continue;
            }

            self.execute_next(&mut run).await;
        }

        // The provider is stopped whether or not the ledger can be written.
        self.release_provider(&run).await;
        if let Some(e) = fatal {
            self.state = LoopState::Terminated;
            return Err(e);
        }
        self.state = LoopState::Checkpointing;
        let flushed = self.checkpoint(&mut run, true).await;
        self.state = LoopState::Terminated;
        flushed?;

        run.report.finished_at = self.clock.now();
        run.report.switch_count = run.selector.switch_count();
        run.report.next_unit_id = run.next_unit_id;
        info!(
            "🏁 Simulation finished: {} unit(s) done, {} not found, {} checkpoint(s), {} switch(es)",
            run.report.units_completed,
            run.report.units_not_found,
            run.report.checkpoints.len(),
            run.report.switch_count
        );
        Ok(run.report)
    }

    async fn initialize(&self) -> Result<RunState> {
        let selector = ArbitrageSelector::new(self.config.providers.clone())
            .map_err(|e| ArbiterError::ConfigurationMissing(e.to_string()))?;

        let start_unit_id = self.config.start_unit_id;
        let resume = self
            .config
            .store_retry
            .execute(|| self.sequencer.resume_point(start_unit_id))
            .await
            .map_err(|e| {
                error!("Cannot read checkpoint ledger: {}", e);
                e
            })?;
        let next_unit_id = if resume.is_baseline() {
            resume.next_unit_id.max(start_unit_id)
        } else {
            resume.next_unit_id
        };

        let now = self.clock.now();
        Ok(RunState {
            selector,
            price_watermarks: HashMap::new(),
            last_refresh: None,
            running_provider: None,
            next_unit_id,
            period_start: now,
            period_units: 0,
            pending_cost: Decimal::ZERO,
            last_checkpoint_attempt: now,
            report: SimulationReport {
                started_at: now,
                finished_at: now,
                resumed_from: resume.id,
                checkpoints: Vec::new(),
                units_completed: 0,
                units_not_found: 0,
                connectivity_failures: 0,
                fatal_failures: 0,
                switch_count: 0,
                next_unit_id,
                cancelled: false,
            },
        })
    }

    fn elapsed_since(&self, at: DateTime<Utc>) -> std::time::Duration {
        (self.clock.now() - at).to_std().unwrap_or_default()
    }

    /// Pulls observations newer than each provider's watermark into the
    /// selector. A failed fetch keeps the previous decision.
    async fn refresh_prices(&self, run: &mut RunState) {
        let now = self.clock.now();
        run.last_refresh = Some(now);
        let lookback = chrono::Duration::from_std(self.config.price_lookback)
            .unwrap_or_else(|_| chrono::Duration::zero());
        // A provider that has never reported still gets the full lookback.
        let start = self
            .config
            .providers
            .iter()
            .map(|p| run.price_watermarks.get(p).copied().unwrap_or(now - lookback))
            .min()
            .unwrap_or(now - lookback);

        let mut series = match fetch_all(
            self.price_source.as_ref(),
            &self.config.providers,
            start,
            now,
            self.config.region.as_deref(),
        )
        .await
        {
            Ok(series) => series,
            Err(e) => {
                warn!("Price refresh from {} failed: {}", self.price_source.name(), e);
                return;
            }
        };
        for s in series.iter_mut() {
            if let Some(watermark) = run.price_watermarks.get(s.provider()) {
                s.retain_after(*watermark);
            }
        }

        let mut fed = 0usize;
        for observation in merge(&series) {
            if let Some(decision) = run.selector.observe(observation) {
                debug!(
                    "{} -> {} @ {}",
                    decision.timestamp, decision.active_provider, decision.selected_price
                );
            }
            fed += 1;
        }
        for s in &series {
            if let Some(latest) = s.latest() {
                run.price_watermarks.insert(s.provider().clone(), latest.timestamp());
            }
        }
        debug!("Fed {} new observation(s) into the selector", fed);
    }

    /// Makes `target` the running provider. Returns `false` when work cannot
    /// be issued yet; the next iteration tries again.
    async fn ensure_active(&self, run: &mut RunState, target: &ProviderId) -> bool {
        match self.try_activate(run, target).await {
            Ok(ready) => ready,
            Err(e) => {
                warn!("Activating {} failed: {}; backing off", target, e);
                self.clock.sleep(self.config.connectivity_backoff).await;
                false
            }
        }
    }

    async fn try_activate(&self, run: &mut RunState, target: &ProviderId) -> Result<bool> {
        let state = self.controller.state(target).await?;
        if state == ProviderState::Running && run.running_provider.as_ref() == Some(target) {
            return Ok(true);
        }

        if run.running_provider.as_ref() != Some(target) {
            info!(
                "🔀 Switching to {} (was {})",
                target,
                run.running_provider
                    .as_ref()
                    .map(|p| p.as_str())
                    .unwrap_or("none")
            );
            for other in self.config.providers.iter().filter(|p| *p != target) {
                match self.controller.state(other).await? {
                    ProviderState::Stopped => {}
                    _ => self.controller.deactivate(other).await?,
                }
            }
            run.running_provider = None;
        }

        if state != ProviderState::Running && state != ProviderState::Transitioning {
            self.controller.activate(target).await?;
        }

        let running = wait_for_state(
            self.controller.as_ref(),
            self.clock.as_ref(),
            target,
            ProviderState::Running,
            self.config.poll_interval,
            self.config.activation_timeout,
        )
        .await?;
        if !running {
            warn!(
                "{} not running after {:?}; retrying next iteration",
                target, self.config.activation_timeout
            );
            return Ok(false);
        }

        if let Some(command) = &self.config.startup_command {
            let output = run_command(
                self.controller.as_ref(),
                self.clock.as_ref(),
                target,
                command,
                self.config.poll_interval,
                self.config.command_timeout,
            )
            .await?;
            debug!("Startup command on {}: {}", target, output.trim());
        }

        info!("✅ {} is running", target);
        run.running_provider = Some(target.clone());
        Ok(true)
    }

    async fn execute_next(&self, run: &mut RunState) {
        let unit_id = run.next_unit_id;
        match self.executor.run(unit_id).await {
            TaskOutcome::Success(_) => {
                run.period_units += 1;
                run.report.units_completed += 1;
                run.next_unit_id += 1;
            }
            TaskOutcome::RecoverableFailure {
                kind: FailureKind::DataNotFound,
                detail,
            } => {
                debug!("Unit {} skipped: {}", unit_id, detail);
                run.report.units_not_found += 1;
                run.next_unit_id += 1;
            }
            TaskOutcome::RecoverableFailure {
                kind: FailureKind::TransientConnectivity,
                detail,
            } => {
                warn!(
                    "Unit {} unreachable: {}; retrying after {:?}",
                    unit_id, detail, self.config.connectivity_backoff
                );
                run.report.connectivity_failures += 1;
                self.clock.sleep(self.config.connectivity_backoff).await;
            }
            TaskOutcome::FatalFailure(detail) => {
                error!("Unit {} failed: {}; moving on", unit_id, detail);
                run.report.fatal_failures += 1;
                run.next_unit_id += 1;
            }
        }
    }

    async fn release_provider(&self, run: &RunState) {
        if let Some(provider) = &run.running_provider {
            if let Err(e) = self.controller.deactivate(provider).await {
                warn!("Failed to stop {} at shutdown: {}", provider, e);
            }
        }
    }

    /// Commits the current period. A non-final checkpoint that loses every
    /// id race, or hits a retryable store error, keeps its deltas for the
    /// next cadence. Store unavailability beyond the retry budget is fatal,
    /// and so is any failure of the final flush.
    async fn checkpoint(&self, run: &mut RunState, is_final: bool) -> Result<()> {
        let now = self.clock.now();
        run.last_checkpoint_attempt = now;

        let active = run
            .running_provider
            .clone()
            .or_else(|| run.selector.active_provider().cloned());
        let tick_cost = active
            .as_ref()
            .and_then(|p| run.selector.price_of(p))
            .and_then(Decimal::from_f64)
            .unwrap_or(Decimal::ZERO);
        run.pending_cost += tick_cost;

        let delta = PeriodDelta {
            start_time: run.period_start,
            end_time: now,
            active_provider: active,
            units_completed: run.period_units,
            period_cost: run.pending_cost,
            next_unit_id: run.next_unit_id,
        };

        let timer = Timer::start("checkpoint");
        let result = self
            .config
            .store_retry
            .execute(|| self.sequencer.allocate_and_commit(&delta))
            .await;
        timer.finish_with_threshold(1_000);

        match result {
            Ok(record) => {
                run.period_start = now;
                run.period_units = 0;
                run.pending_cost = Decimal::ZERO;
                run.report.checkpoints.push(record);
                Ok(())
            }
            Err(e) if is_final || e.is_fatal() => {
                error!("💥 Checkpoint failed: {}", e);
                Err(e)
            }
            Err(e) => {
                warn!("Checkpoint deferred to next cadence: {}", e);
                Ok(())
            }
        }
    }
}
