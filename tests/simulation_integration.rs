use chrono::{DateTime, TimeZone, Utc};
use pretty_assertions::assert_eq;
use rust_decimal::Decimal;
use spot_arbiter::checkpoint::{CheckpointRecord, CheckpointStore};
use spot_arbiter::error::RetryPolicy;
use spot_arbiter::pricing::{PriceObservation, PriceSeries, ProviderId};
use spot_arbiter::simulation::{LoopState, SimulationConfig, SimulationLoop, TaskOutcome};
use spot_arbiter::testing::{
    ConflictingCheckpointStore, FlakyCheckpointStore, ScriptedController, ScriptedTaskExecutor,
    random_walk_series, StaticPriceSource,
};
use spot_arbiter::utils::{Clock, ManualClock};
use spot_arbiter::ArbiterError;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

const T0: i64 = 1_704_067_200;

fn at(offset_secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(T0 + offset_secs, 0).unwrap()
}

fn series(provider: &str, points: &[(i64, f64)]) -> PriceSeries {
    PriceSeries::new(
        provider,
        points
            .iter()
            .map(|(t, p)| PriceObservation::new(provider, *p, at(*t)).unwrap())
            .collect(),
    )
    .unwrap()
}

/// aws is cheapest until azure drops at T0+300.
fn switching_prices() -> StaticPriceSource {
    StaticPriceSource::new(vec![
        series("aws", &[(-600, 0.25)]),
        series("azure", &[(-600, 0.5), (300, 0.125)]),
    ])
}

fn config(providers: &[&str]) -> SimulationConfig {
    let mut config = SimulationConfig::new(providers.iter().map(|p| ProviderId::new(*p)).collect());
    config.store_retry = RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(2));
    config
}

struct Harness {
    clock: Arc<ManualClock>,
    controller: Arc<ScriptedController>,
    executor: Arc<ScriptedTaskExecutor>,
}

impl Harness {
    fn new(clock: Arc<ManualClock>) -> Self {
        Self {
            executor: Arc::new(ScriptedTaskExecutor::new(clock.clone(), Duration::from_secs(10))),
            controller: Arc::new(ScriptedController::new(1)),
            clock,
        }
    }

    fn build(
        &self,
        config: SimulationConfig,
        prices: StaticPriceSource,
        store: Arc<dyn CheckpointStore>,
    ) -> SimulationLoop {
        SimulationLoop::new(
            config,
            Arc::new(prices),
            self.controller.clone(),
            self.executor.clone(),
            store,
            self.clock.clone(),
        )
    }
}

fn assert_ledger(records: &[CheckpointRecord]) {
    let ids: Vec<u64> = records.iter().map(|r| r.id).collect();
    assert_eq!(ids, (1..=records.len() as u64).collect::<Vec<_>>());
    if let Some(first) = records.first() {
        assert_eq!(first.cumulative_cost, first.period_cost);
        assert_eq!(first.cumulative_units, first.units_completed);
    }
    for pair in records.windows(2) {
        assert_eq!(pair[1].cumulative_cost, pair[0].cumulative_cost + pair[1].period_cost);
        assert_eq!(pair[1].cumulative_units, pair[0].cumulative_units + pair[1].units_completed);
    }
}

#[tokio::test]
async fn follows_the_cheapest_provider_and_checkpoints_on_cadence() {
    let harness = Harness::new(Arc::new(ManualClock::new(at(0))));
    let store = Arc::new(FlakyCheckpointStore::new());
    let mut sim = harness.build(config(&["aws", "azure"]), switching_prices(), store.clone());

    let report = sim.run(at(1200)).await.unwrap();
    assert_eq!(sim.state(), LoopState::Terminated);

    let records = store.records();
    assert_eq!(records, report.checkpoints);
    assert_eq!(records.len(), 4);
    assert_ledger(&records);

    assert_eq!(records[0].active_provider.as_ref().unwrap().as_str(), "aws");
    assert_eq!(records[0].units_completed, 30);
    assert_eq!(records[0].period_cost, Decimal::new(25, 2));
    for record in &records[1..] {
        assert_eq!(record.active_provider.as_ref().unwrap().as_str(), "azure");
        assert_eq!(record.period_cost, Decimal::new(125, 3));
    }

    let last = records.last().unwrap();
    assert_eq!(last.cumulative_units, 120);
    assert_eq!(last.cumulative_cost, Decimal::new(625, 3));
    assert_eq!(last.next_unit_id, 120);

    assert_eq!(report.units_completed, 120);
    assert_eq!(report.switch_count, 1);
    assert_eq!(report.next_unit_id, 120);
    assert!(!report.cancelled);
    assert_eq!(harness.executor.runs(), (0..120).collect::<Vec<u64>>());

    assert_eq!(harness.controller.activations(), vec!["aws", "azure"]);
    let calls = harness.controller.calls();
    assert!(calls.contains(&"deactivate aws".to_string()));
    assert_eq!(calls.last().unwrap(), "deactivate azure");
}

#[tokio::test]
async fn unit_failures_are_skipped_or_retried_and_work_resumes_after_restart() {
    let clock = Arc::new(ManualClock::new(at(0)));
    let store = Arc::new(FlakyCheckpointStore::new());

    let first = Harness::new(clock.clone());
    first.executor.script(3, TaskOutcome::not_found("unit 3 does not exist"));
    first.executor.script(5, TaskOutcome::unreachable("connection reset"));
    first.executor.script(7, TaskOutcome::FatalFailure("malformed page".into()));
    let mut sim = first.build(config(&["aws", "azure"]), switching_prices(), store.clone());
    let report1 = sim.run(at(600)).await.unwrap();

    assert_eq!(report1.units_not_found, 1);
    assert_eq!(report1.connectivity_failures, 1);
    assert_eq!(report1.fatal_failures, 1);
    let runs = first.executor.runs();
    assert_eq!(&runs[..9], &[0, 1, 2, 3, 4, 5, 5, 6, 7]);
    assert_eq!(report1.next_unit_id, *runs.last().unwrap() + 1);
    // Units 3 and 7 advanced the cursor without counting as completed.
    assert_eq!(report1.units_completed, report1.next_unit_id - 2);

    let second = Harness::new(clock.clone());
    let mut sim = second.build(config(&["aws", "azure"]), switching_prices(), store.clone());
    let report2 = sim.run(at(1200)).await.unwrap();

    assert_eq!(report2.resumed_from, report1.checkpoints.last().unwrap().id);
    assert_eq!(second.executor.runs()[0], report1.next_unit_id);

    let records = store.records();
    assert_ledger(&records);
    assert_eq!(
        records.last().unwrap().cumulative_units,
        report1.units_completed + report2.units_completed
    );
}

#[tokio::test]
async fn cancellation_still_flushes_a_final_checkpoint() {
    let harness = Harness::new(Arc::new(ManualClock::new(at(0))));
    let store = Arc::new(FlakyCheckpointStore::new());
    let mut sim = harness.build(config(&["aws", "azure"]), switching_prices(), store.clone());

    sim.shutdown_handle().store(true, Ordering::SeqCst);
    let report = sim.run(at(1200)).await.unwrap();

    assert!(report.cancelled);
    assert_eq!(report.units_completed, 0);
    assert_eq!(store.records().len(), 1);
    assert_eq!(store.records()[0].id, 1);
}

#[tokio::test]
async fn unreachable_store_is_fatal() {
    let harness = Harness::new(Arc::new(ManualClock::new(at(0))));
    let store = Arc::new(FlakyCheckpointStore::new());
    store.set_down(true);
    let mut sim = harness.build(config(&["aws"]), switching_prices(), store.clone());

    let err = sim.run(at(600)).await.unwrap_err();
    assert!(matches!(err, ArbiterError::StoreUnavailable(_)));
    assert!(harness.executor.runs().is_empty());
}

#[tokio::test]
async fn write_failures_beyond_the_retry_budget_end_the_run() {
    let harness = Harness::new(Arc::new(ManualClock::new(at(0))));
    let store = Arc::new(FlakyCheckpointStore::new());
    store.fail_next_puts(3);
    let mut sim = harness.build(config(&["aws"]), switching_prices(), store.clone());

    let err = sim.run(at(1200)).await.unwrap_err();
    assert!(matches!(err, ArbiterError::StoreUnavailable(_)));
    assert!(store.records().is_empty());
    // The first cadence tick was the fatal one.
    assert!(harness.clock.now() < at(320));
    assert_eq!(sim.state(), LoopState::Terminated);
    // The provider is released even though the ledger could not be written.
    assert_eq!(
        harness.controller.calls().last().map(String::as_str),
        Some("deactivate aws")
    );
}

#[tokio::test]
async fn write_failures_within_the_retry_budget_are_absorbed() {
    let harness = Harness::new(Arc::new(ManualClock::new(at(0))));
    let store = Arc::new(FlakyCheckpointStore::new());
    store.fail_next_puts(2);
    let mut sim = harness.build(config(&["aws"]), switching_prices(), store.clone());

    let report = sim.run(at(600)).await.unwrap();
    assert_eq!(report.checkpoints.len(), 2);
    assert_ledger(&store.records());
}

#[tokio::test]
async fn lost_id_races_defer_the_period_to_the_next_cadence() {
    let harness = Harness::new(Arc::new(ManualClock::new(at(0))));
    let store = Arc::new(ConflictingCheckpointStore::new());
    store.contest(1);
    store.set_rival_updates_counter(true);
    let mut cfg = config(&["aws"]);
    cfg.conflict_max_attempts = 1;
    let mut sim = harness.build(
        cfg,
        StaticPriceSource::new(vec![series("aws", &[(-600, 0.25)])]),
        store.clone(),
    );

    let report = sim.run(at(700)).await.unwrap();
    let ids: Vec<u64> = report.checkpoints.iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![2, 3]);

    let deferred = &report.checkpoints[0];
    assert_eq!(deferred.units_completed, 60);
    assert_eq!(deferred.period_cost, Decimal::new(50, 2));
    assert_eq!(deferred.start_time, at(0));
    assert_ledger(&store.records());
}

#[tokio::test]
async fn rejected_activation_backs_off_and_retries() {
    let harness = Harness::new(Arc::new(ManualClock::new(at(0))));
    harness.controller.fail_activations(1);
    let store = Arc::new(FlakyCheckpointStore::new());
    let mut sim = harness.build(config(&["aws", "azure"]), switching_prices(), store);

    let report = sim.run(at(200)).await.unwrap();
    assert_eq!(&harness.controller.activations()[..2], &["aws", "aws"]);
    assert_eq!(harness.executor.runs()[0], 0);
    // 2s of backoff, then one unit every 10s.
    assert_eq!(report.units_completed, 20);
}

#[tokio::test]
async fn startup_command_runs_after_each_activation() {
    let harness = Harness::new(Arc::new(ManualClock::new(at(0))));
    let store = Arc::new(FlakyCheckpointStore::new());
    let mut cfg = config(&["aws", "azure"]);
    cfg.startup_command = Some("./setup.sh".into());
    let mut sim = harness.build(cfg, switching_prices(), store);

    sim.run(at(600)).await.unwrap();
    let commands: Vec<String> = harness
        .controller
        .calls()
        .into_iter()
        .filter(|c| c.starts_with("command "))
        .collect();
    assert_eq!(commands, vec!["command aws ./setup.sh", "command azure ./setup.sh"]);
}

#[tokio::test]
async fn no_prices_means_no_work_but_a_final_record() {
    let harness = Harness::new(Arc::new(ManualClock::new(at(0))));
    let store = Arc::new(FlakyCheckpointStore::new());
    let prices = StaticPriceSource::new(vec![]);
    prices.fail_next(1);
    let mut sim = harness.build(config(&["aws", "azure"]), prices, store.clone());

    let report = sim.run(at(120)).await.unwrap();
    assert!(harness.executor.runs().is_empty());
    assert!(harness.controller.activations().is_empty());

    let records = store.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].active_provider, None);
    assert_eq!(records[0].period_cost, Decimal::ZERO);
    assert_eq!(report.switch_count, 0);
}

#[tokio::test]
async fn unreachable_store_at_the_final_flush_still_releases_the_provider() {
    let harness = Harness::new(Arc::new(ManualClock::new(at(0))));
    let store = Arc::new(FlakyCheckpointStore::new());
    let mut sim = harness.build(config(&["aws"]), switching_prices(), store.clone());

    // Ends before the first cadence tick, so only the final flush writes.
    store.fail_next_puts(3);
    let err = sim.run(at(100)).await.unwrap_err();
    assert!(matches!(err, ArbiterError::StoreUnavailable(_)));
    assert_eq!(sim.state(), LoopState::Terminated);
    assert_eq!(
        harness.controller.calls().last().map(String::as_str),
        Some("deactivate aws")
    );
}

#[tokio::test]
async fn late_published_prices_are_not_lost() {
    let harness = Harness::new(Arc::new(ManualClock::new(at(0))));
    let store = Arc::new(FlakyCheckpointStore::new());
    // azure's drop at T0+100 only shows up at T0+350, after aws has already
    // reported at T0+200.
    let prices = StaticPriceSource::new(vec![
        series("aws", &[(-600, 0.25), (200, 0.25)]),
        series("azure", &[(-600, 0.5), (100, 0.125)]),
    ])
    .with_publication_delay("azure", Duration::from_secs(250));
    let mut sim = harness.build(config(&["aws", "azure"]), prices, store);

    let report = sim.run(at(900)).await.unwrap();
    assert_eq!(report.switch_count, 1);
    assert_eq!(harness.controller.activations(), vec!["aws", "azure"]);
}

#[tokio::test]
async fn random_walk_prices_keep_the_ledger_consistent() {
    let harness = Harness::new(Arc::new(ManualClock::new(at(0))));
    let store = Arc::new(FlakyCheckpointStore::new());
    let step = Duration::from_secs(60);
    let prices = StaticPriceSource::new(vec![
        random_walk_series("aws", at(-3600), step, 180, 21),
        random_walk_series("azure", at(-3600), step, 180, 42),
    ]);
    let mut sim = harness.build(config(&["aws", "azure"]), prices, store.clone());

    let report = sim.run(at(7200)).await.unwrap();
    let records = store.records();
    assert_eq!(records, report.checkpoints);
    assert_eq!(records.len(), 24);
    assert_ledger(&records);

    let last = records.last().unwrap();
    assert_eq!(last.cumulative_units, report.units_completed);
    assert_eq!(report.units_completed, 720);
    assert!(records.iter().all(|r| r.period_cost > Decimal::ZERO));
    // Every activation after the first follows a switch.
    assert!(harness.controller.activations().len() as u64 <= report.switch_count + 1);
}
