use crate::checkpoint::{CheckpointRecord, CheckpointStore, InMemoryCheckpointStore, PutOutcome};
use crate::compute::{CommandId, CommandStatus, ComputeController, DryRunController, ProviderState};
use crate::error::{ArbiterError, Result};
use crate::pricing::{PriceObservation, PriceSeries, PriceSource, ProviderId};
use crate::simulation::task::{TaskExecutor, TaskOutcome};
use crate::utils::ManualClock;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn locked<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

/// Seeded random-walk price history, one observation every `step`.
pub fn random_walk_series(
    provider: &str,
    start: DateTime<Utc>,
    step: Duration,
    count: usize,
    seed: u64,
) -> PriceSeries {
    let mut rng = StdRng::seed_from_u64(seed);
    let step = chrono::Duration::from_std(step).unwrap_or_else(|_| chrono::Duration::zero());
    let mut price: f64 = rng.gen_range(0.05..1.0);
    let observations = (0..count)
        .filter_map(|i| {
            price = (price * rng.gen_range(0.9..1.1)).max(0.001);
            PriceObservation::new(provider, price, start + step * i as i32).ok()
        })
        .collect();
    PriceSeries::new(provider, observations).unwrap_or_else(|_| PriceSeries::empty(provider))
}

/// Serves fixed per-provider histories, clipped to the requested window.
#[derive(Debug, Default)]
pub struct StaticPriceSource {
    series: HashMap<ProviderId, PriceSeries>,
    publication_delays: HashMap<ProviderId, chrono::Duration>,
    failures_left: AtomicU32,
}

impl StaticPriceSource {
    pub fn new(series: Vec<PriceSeries>) -> Self {
        Self {
            series: series.into_iter().map(|s| (s.provider().clone(), s)).collect(),
            ..Self::default()
        }
    }

    /// `provider`'s observations only become visible `delay` after their
    /// timestamp.
    pub fn with_publication_delay(mut self, provider: &str, delay: Duration) -> Self {
        let delay = chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero());
        self.publication_delays.insert(ProviderId::new(provider), delay);
        self
    }

    /// The next `n` fetches fail with a connectivity error.
    pub fn fail_next(&self, n: u32) {
        self.failures_left.store(n, Ordering::SeqCst);
    }
}

#[async_trait]
impl PriceSource for StaticPriceSource {
    fn name(&self) -> &str {
        "static"
    }

    async fn fetch(
        &self,
        provider: &ProviderId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        _region: Option<&str>,
    ) -> Result<PriceSeries> {
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(ArbiterError::TransientConnectivity("price API unreachable".into()));
        }
        let Some(series) = self.series.get(provider) else {
            return Ok(PriceSeries::empty(provider.clone()));
        };
        let delay = self
            .publication_delays
            .get(provider)
            .copied()
            .unwrap_or_else(chrono::Duration::zero);
        let inside = series
            .observations()
            .iter()
            .filter(|o| o.timestamp() >= start && o.timestamp() <= end)
            .filter(|o| o.timestamp() + delay <= end)
            .cloned()
            .collect();
        PriceSeries::new(provider.clone(), inside)
    }
}

/// Dry-run controller that records every control-plane call and can be told
/// to reject activations.
#[derive(Debug, Default)]
pub struct ScriptedController {
    inner: DryRunController,
    failing_activations: AtomicU32,
    calls: Mutex<Vec<String>>,
}

impl ScriptedController {
    pub fn new(transition_polls: u32) -> Self {
        Self {
            inner: DryRunController::new(transition_polls),
            ..Self::default()
        }
    }

    pub fn fail_activations(&self, n: u32) {
        self.failing_activations.store(n, Ordering::SeqCst);
    }

    /// `"activate <provider>"`, `"deactivate <provider>"` and
    /// `"command <provider> <cmd>"` entries in call order.
    pub fn calls(&self) -> Vec<String> {
        locked(&self.calls).clone()
    }

    pub fn activations(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| c.strip_prefix("activate ").map(str::to_string))
            .collect()
    }
}

#[async_trait]
impl ComputeController for ScriptedController {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn activate(&self, provider: &ProviderId) -> Result<()> {
        locked(&self.calls).push(format!("activate {}", provider));
        let rejected = self
            .failing_activations
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if rejected {
            return Err(ArbiterError::Provider(format!("capacity unavailable for {}", provider)));
        }
        self.inner.activate(provider).await
    }

    async fn deactivate(&self, provider: &ProviderId) -> Result<()> {
        locked(&self.calls).push(format!("deactivate {}", provider));
        self.inner.deactivate(provider).await
    }

    async fn state(&self, provider: &ProviderId) -> Result<ProviderState> {
        self.inner.state(provider).await
    }

    async fn submit_command(&self, provider: &ProviderId, command: &str) -> Result<CommandId> {
        locked(&self.calls).push(format!("command {} {}", provider, command));
        self.inner.submit_command(provider, command).await
    }

    async fn command_status(&self, provider: &ProviderId, id: &CommandId) -> Result<CommandStatus> {
        self.inner.command_status(provider, id).await
    }
}

/// Executor that advances a manual clock by `step` per unit and plays back
/// scripted outcomes; unscripted units succeed.
#[derive(Debug)]
pub struct ScriptedTaskExecutor {
    clock: Arc<ManualClock>,
    step: Duration,
    script: Mutex<HashMap<u64, VecDeque<TaskOutcome>>>,
    runs: Mutex<Vec<u64>>,
}

impl ScriptedTaskExecutor {
    pub fn new(clock: Arc<ManualClock>, step: Duration) -> Self {
        Self {
            clock,
            step,
            script: Mutex::new(HashMap::new()),
            runs: Mutex::new(Vec::new()),
        }
    }

    /// Queues `outcome` for the next run of `unit_id`.
    pub fn script(&self, unit_id: u64, outcome: TaskOutcome) {
        locked(&self.script).entry(unit_id).or_default().push_back(outcome);
    }

    pub fn runs(&self) -> Vec<u64> {
        locked(&self.runs).clone()
    }
}

#[async_trait]
impl TaskExecutor for ScriptedTaskExecutor {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn run(&self, unit_id: u64) -> TaskOutcome {
        self.clock.advance(self.step);
        locked(&self.runs).push(unit_id);
        locked(&self.script)
            .get_mut(&unit_id)
            .and_then(|queue| queue.pop_front())
            .unwrap_or_else(|| TaskOutcome::Success(format!("unit {}", unit_id)))
    }
}

/// In-memory store whose writes and counter reads can be made to fail.
#[derive(Debug, Default)]
pub struct FlakyCheckpointStore {
    inner: InMemoryCheckpointStore,
    failing_puts: AtomicU32,
    down: AtomicBool,
    counter_unreadable: AtomicBool,
}

impl FlakyCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next_puts(&self, n: u32) {
        self.failing_puts.store(n, Ordering::SeqCst);
    }

    /// Every call fails until cleared.
    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    pub fn set_counter_unreadable(&self, unreadable: bool) {
        self.counter_unreadable.store(unreadable, Ordering::SeqCst);
    }

    pub fn records(&self) -> Vec<CheckpointRecord> {
        self.inner.records()
    }

    fn check_up(&self) -> Result<()> {
        if self.down.load(Ordering::SeqCst) {
            Err(ArbiterError::StoreUnavailable("store is down".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl CheckpointStore for FlakyCheckpointStore {
    fn name(&self) -> &str {
        "flaky"
    }

    async fn get(&self, id: u64) -> Result<Option<CheckpointRecord>> {
        self.check_up()?;
        self.inner.get(id).await
    }

    async fn put_if_absent(&self, record: &CheckpointRecord) -> Result<PutOutcome> {
        self.check_up()?;
        let failing = self
            .failing_puts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(ArbiterError::StoreUnavailable("write throttled".into()));
        }
        self.inner.put_if_absent(record).await
    }

    async fn get_counter(&self) -> Result<Option<u64>> {
        self.check_up()?;
        if self.counter_unreadable.load(Ordering::SeqCst) {
            return Err(ArbiterError::StoreUnavailable("counter read failed".into()));
        }
        self.inner.get_counter().await
    }

    async fn put_counter(&self, id: u64) -> Result<()> {
        self.check_up()?;
        self.inner.put_counter(id).await
    }
}

/// In-memory store where a rival writer claims chosen ids just before our
/// write lands. The rival also advances the counter hint when asked to.
#[derive(Debug, Default)]
pub struct ConflictingCheckpointStore {
    inner: InMemoryCheckpointStore,
    contested: Mutex<HashSet<u64>>,
    rival_updates_counter: AtomicBool,
    put_attempts: Mutex<Vec<u64>>,
}

impl ConflictingCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contest(&self, id: u64) {
        locked(&self.contested).insert(id);
    }

    pub fn set_rival_updates_counter(&self, updates: bool) {
        self.rival_updates_counter.store(updates, Ordering::SeqCst);
    }

    /// Ids passed to `put_if_absent`, in call order.
    pub fn put_attempts(&self) -> Vec<u64> {
        locked(&self.put_attempts).clone()
    }

    pub fn records(&self) -> Vec<CheckpointRecord> {
        self.inner.records()
    }
}

#[async_trait]
impl CheckpointStore for ConflictingCheckpointStore {
    fn name(&self) -> &str {
        "conflicting"
    }

    async fn get(&self, id: u64) -> Result<Option<CheckpointRecord>> {
        self.inner.get(id).await
    }

    async fn put_if_absent(&self, record: &CheckpointRecord) -> Result<PutOutcome> {
        locked(&self.put_attempts).push(record.id);
        let contested = locked(&self.contested).remove(&record.id);
        if contested {
            let rival = CheckpointRecord {
                active_provider: Some(ProviderId::new("rival")),
                ..record.clone()
            };
            self.inner.put_if_absent(&rival).await?;
            if self.rival_updates_counter.load(Ordering::SeqCst) {
                self.inner.put_counter(record.id).await?;
            }
        }
        self.inner.put_if_absent(record).await
    }

    async fn get_counter(&self) -> Result<Option<u64>> {
        self.inner.get_counter().await
    }

    async fn put_counter(&self, id: u64) -> Result<()> {
        self.inner.put_counter(id).await
    }
}
