use chrono::{DateTime, TimeZone, Utc};
use pretty_assertions::assert_eq;
use spot_arbiter::arbitrage::export::{import_decisions_from_csv, read_decisions, write_decisions};
use spot_arbiter::arbitrage::{analyze_switch_logs, merge, ArbitrageSelector, SpotPriceAnalyzer};
use spot_arbiter::pricing::{CsvPriceSource, PriceObservation, PriceSeries, ProviderId};
use spot_arbiter::testing::{random_walk_series, StaticPriceSource};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

fn ts(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_704_067_200 + secs, 0).unwrap()
}

fn series(provider: &str, points: &[(i64, f64)]) -> PriceSeries {
    PriceSeries::new(
        provider,
        points
            .iter()
            .map(|(t, p)| PriceObservation::new(provider, *p, ts(*t)).unwrap())
            .collect(),
    )
    .unwrap()
}

fn providers(ids: &[&str]) -> Vec<ProviderId> {
    ids.iter().map(|s| ProviderId::new(*s)).collect()
}

#[test]
fn two_provider_scenario_counts_every_argmin_change() {
    let input = vec![
        series("A", &[(0, 1.0), (2, 0.5)]),
        series("B", &[(1, 0.8), (3, 0.2)]),
    ];
    let mut selector = ArbitrageSelector::new(providers(&["A", "B"])).unwrap();
    let decisions = selector.run(merge(&input));

    let active: Vec<&str> = decisions.iter().map(|d| d.active_provider.as_str()).collect();
    assert_eq!(active, vec!["A", "B", "A", "B"]);
    assert_eq!(selector.switch_count(), 3);
    assert_eq!(selector.switch_timestamps(), &[ts(1), ts(2), ts(3)]);
}

#[test]
fn replaying_the_same_timeline_is_reproducible() {
    let input = vec![
        series("aws", &[(0, 0.3), (60, 0.2), (120, 0.2), (180, 0.4)]),
        series("azure", &[(0, 0.3), (90, 0.2), (180, 0.1)]),
        series("gcp", &[]),
    ];
    let all = providers(&["aws", "azure", "gcp"]);

    let mut first = ArbitrageSelector::new(all.clone()).unwrap();
    let mut second = ArbitrageSelector::new(all).unwrap();
    let a = first.run(merge(&input));
    let b = second.run(merge(&input));

    assert_eq!(a, b);
    assert_eq!(first.switch_count(), second.switch_count());
    // gcp never reports, so it is never selected.
    assert!(a.iter().all(|d| d.active_provider.as_str() != "gcp"));
}

#[tokio::test]
async fn analyzer_exports_a_round_trippable_table() {
    let source = StaticPriceSource::new(vec![
        series("aws", &[(0, 0.25), (120, 0.0625), (600, 0.5)]),
        series("azure", &[(60, 0.125), (240, 0.03125)]),
    ]);
    let analyzer = SpotPriceAnalyzer::new(Arc::new(source), Some("us-east-1".into()));
    let run = analyzer
        .compare_costs(&providers(&["aws", "azure"]), ts(0), ts(300))
        .await
        .unwrap();

    // The observation at t=600 lies outside the window.
    assert_eq!(run.decisions.len(), 4);
    assert_eq!(run.summary.switch_count, 3);

    let mut buf = Vec::new();
    write_decisions(&mut buf, &run.providers, &run.decisions).unwrap();
    let (cols, back) = read_decisions(buf.as_slice()).unwrap();
    assert_eq!(cols, run.providers);
    assert_eq!(back, run.decisions);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("switches.csv");
    run.export_csv(&path).unwrap();
    let (_, from_file) = import_decisions_from_csv(&path).unwrap();
    assert_eq!(from_file, run.decisions);
}

#[tokio::test]
async fn analyzer_compares_each_provider_set_and_exports_the_busiest() {
    let dir = tempfile::tempdir().unwrap();
    for (provider, rows) in [
        ("aws", "timestamp,price\n2024-01-01T00:00:00Z,0.30\n2024-01-01T00:10:00Z,0.10\n"),
        ("azure", "timestamp,price\n2024-01-01T00:05:00Z,0.20\n2024-01-01T00:20:00Z,0.05\n"),
        ("gcp", "timestamp,price\n2024-01-01T00:00:00Z,0.50\n"),
    ] {
        let mut file = std::fs::File::create(dir.path().join(format!("{}.csv", provider))).unwrap();
        file.write_all(rows.as_bytes()).unwrap();
    }

    let analyzer = SpotPriceAnalyzer::new(Arc::new(CsvPriceSource::new(dir.path())), None);
    let batch = analyzer
        .compare_many(
            &[providers(&["aws", "gcp"]), providers(&["aws", "azure"])],
            ts(0),
            ts(3600),
        )
        .await
        .unwrap();

    assert_eq!(batch.runs.len(), 2);
    // gcp is never cheaper than aws.
    assert_eq!(batch.runs[0].summary.switch_count, 0);
    // aws -> azure at 5m, -> aws at 10m, -> azure at 20m
    assert_eq!(batch.runs[1].summary.switch_count, 3);

    let stats = batch.statistics.clone().unwrap();
    assert_eq!(stats.runs, 2);
    assert_eq!(stats.min_switches, 0);
    assert_eq!(stats.max_switches, 3);
    assert_eq!(stats.average_switches, 1.5);
    assert_eq!(
        stats.average_inter_switch_time,
        Some(chrono::Duration::seconds(450))
    );
    assert_eq!(
        analyze_switch_logs(&[batch.runs[1].summary.clone()]).unwrap().average_switches,
        3.0
    );

    let champion = batch.champion().unwrap();
    assert_eq!(champion.providers, providers(&["aws", "azure"]));
    let out = dir.path().join("champion.csv");
    champion.export_csv(&out).unwrap();
    let header = std::fs::read_to_string(&out).unwrap();
    assert!(header.starts_with("provider,timestamp,selected_price,aws_price,azure_price"));
}

#[tokio::test]
async fn champion_prefers_the_earliest_run_on_equal_switches() {
    let prices = StaticPriceSource::new(vec![
        series("a", &[(0, 0.2)]),
        series("b", &[(0, 0.3)]),
        series("c", &[(0, 0.4)]),
    ]);
    let analyzer = SpotPriceAnalyzer::new(Arc::new(prices), None);
    let batch = analyzer
        .compare_many(&[providers(&["a", "b"]), providers(&["a", "c"])], ts(0), ts(60))
        .await
        .unwrap();

    assert_eq!(batch.champion().unwrap().providers, providers(&["a", "b"]));
    assert!(analyzer.compare_many(&[], ts(0), ts(60)).await.unwrap().champion().is_none());
}

#[tokio::test]
async fn inverted_window_is_rejected() {
    let analyzer = SpotPriceAnalyzer::new(Arc::new(StaticPriceSource::new(vec![])), None);
    assert!(analyzer
        .compare_costs(&providers(&["aws"]), ts(10), ts(0))
        .await
        .is_err());
}

#[tokio::test]
async fn random_walk_switch_log_matches_the_decision_stream() {
    let step = Duration::from_secs(60);
    let history = vec![
        random_walk_series("aws", ts(0), step, 500, 7),
        random_walk_series("azure", ts(0), step, 500, 11),
        random_walk_series("gcp", ts(0), step, 500, 13),
    ];
    let analyzer = SpotPriceAnalyzer::new(Arc::new(StaticPriceSource::new(history)), None);
    let run = analyzer
        .compare_costs(&providers(&["aws", "azure", "gcp"]), ts(0), ts(500 * 60))
        .await
        .unwrap();

    assert_eq!(run.decisions.len(), 1500);
    assert_eq!(run.summary.switch_count as usize, run.summary.switch_timestamps.len());
    let changes: Vec<DateTime<Utc>> = run
        .decisions
        .windows(2)
        .filter(|w| w[0].active_provider != w[1].active_provider)
        .map(|w| w[1].timestamp)
        .collect();
    assert_eq!(changes, run.summary.switch_timestamps);
    assert!(run
        .decisions
        .iter()
        .all(|d| d.prices.iter().flatten().all(|p| d.selected_price <= *p)));
}
