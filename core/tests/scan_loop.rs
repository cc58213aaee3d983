//! Scan loop: cycle contents, failure isolation, scheduling and shutdown.

mod common;

use common::{init_logging, snapshot, FlakyStore};
use equilibrate_core::{
    assessment::{FIELD_HARDSHIP_TYPE, FIELD_RISK_LEVEL, FIELD_RISK_SCORE},
    evaluator::evaluate,
    population,
    report::CycleReport,
    store::{MemoryStore, RecordStore, RetryPolicy, RetryingStore, SqliteStore},
    CycleOutcome, EngineConfig, HardshipType, RiskLevel, ScanLoop, ShutdownOutcome, TickPolicy,
};
use std::sync::mpsc;
use std::time::{Duration, Instant};

fn config(concurrency: usize) -> EngineConfig {
    EngineConfig {
        concurrency,
        ..EngineConfig::default_test()
    }
}

fn completed(outcome: CycleOutcome) -> CycleReport {
    match outcome {
        CycleOutcome::Completed(report) => report,
        other => panic!("expected a completed cycle, got {other}"),
    }
}

/// The four worked scenarios, keyed c-1..c-4.
fn scenario_store() -> MemoryStore {
    let store = MemoryStore::new();
    let mut critical = snapshot(0, 11, 5000.0, 1000.0, 60);
    critical.total_spend = 15_000.0;
    store.put_snapshot("c-1", &snapshot(0, 0, 0.0, 0.0, 0)).unwrap();
    store.put_snapshot("c-2", &snapshot(1, 12, 0.0, 0.0, 5)).unwrap();
    store.put_snapshot("c-3", &snapshot(2, 1, 0.0, 0.0, 1)).unwrap();
    store.put_snapshot("c-4", &critical).unwrap();
    store
}

// ── One cycle ────────────────────────────────────────────────────────────────

#[test]
fn cycle_assesses_every_customer_and_counts_tiers() {
    init_logging();
    let store = scenario_store();
    store.put_fields("c-3", &[("segment".into(), "retail".into())]).unwrap();
    let mut scan = ScanLoop::new(store, &config(2)).unwrap();

    let report = completed(scan.run_cycle());
    assert_eq!(report.cycle, 1);
    assert_eq!(report.instance_id, scan.instance_id);
    assert_eq!(report.population, 4);
    assert_eq!(report.assessed, 4);
    assert_eq!(report.tiers.critical, 1);
    assert_eq!(report.tiers.high, 0);
    assert_eq!(report.tiers.medium, 2);
    assert_eq!(report.tiers.low, 1);
    assert_eq!(report.hardship.get(HardshipType::IncomeShock), 1);
    assert_eq!(report.hardship.get(HardshipType::LiquidityStress), 1);
    assert_eq!(report.hardship.get(HardshipType::ExpenseCompression), 1);
    assert_eq!(report.hardship.get(HardshipType::None), 1);
    assert_eq!(report.skipped + report.failed + report.not_started, 0);

    let fields = scan.store().fields("c-4").unwrap().unwrap();
    assert_eq!(fields[FIELD_RISK_LEVEL], "CRITICAL");
    assert_eq!(fields[FIELD_RISK_SCORE], "10");
    assert_eq!(fields[FIELD_HARDSHIP_TYPE], "EXPENSE_COMPRESSION");

    let fields = scan.store().fields("c-3").unwrap().unwrap();
    assert_eq!(fields[FIELD_RISK_LEVEL], "LOW");
    assert_eq!(fields["segment"], "retail", "unrelated field must be kept");
}

#[test]
fn demo_population_matches_direct_evaluation() {
    let customers = population::generate(7, 200);
    let store = MemoryStore::new();
    let mut expected = [0usize; 4];
    for c in &customers {
        store.put_snapshot(&c.customer_id, &c.snapshot).unwrap();
        expected[evaluate(&c.snapshot).risk_level as usize] += 1;
    }

    let mut scan = ScanLoop::new(store, &config(4)).unwrap();
    let report = completed(scan.run_cycle());

    assert_eq!(report.population, 200);
    assert_eq!(report.assessed, 200);
    for level in RiskLevel::ALL {
        assert_eq!(
            report.tiers.get(level),
            expected[level as usize],
            "tier {level} count differs from direct evaluation"
        );
    }
}

#[test]
fn empty_store_completes_an_empty_cycle() {
    let mut scan = ScanLoop::new(MemoryStore::new(), &config(2)).unwrap();
    let report = completed(scan.run_cycle());
    assert_eq!(report.population, 0);
    assert_eq!(report.tiers.total(), 0);
}

#[test]
fn invalid_config_is_rejected() {
    assert!(ScanLoop::new(MemoryStore::new(), &config(0)).is_err());
    let mut bad = config(1);
    bad.tick_interval = 0.0;
    assert!(ScanLoop::new(MemoryStore::new(), &bad).is_err());
    for huge in [1e19, 1e20] {
        bad.tick_interval = huge;
        assert!(
            ScanLoop::new(MemoryStore::new(), &bad).is_err(),
            "tick_interval {huge} should be rejected, not panic"
        );
    }
}

// ── Failure isolation ────────────────────────────────────────────────────────

#[test]
fn one_failing_record_does_not_stop_the_others() {
    init_logging();
    let flaky = FlakyStore::with_customers(&[
        ("c-1", snapshot(2, 0, 0.0, 0.0, 4)),
        ("c-2", snapshot(0, 0, 0.0, 0.0, 4)),
        ("c-3", snapshot(1, 12, 0.0, 0.0, 5)),
    ]);
    flaky.fail_reads("c-2", usize::MAX);
    let mut scan = ScanLoop::new(flaky, &config(2)).unwrap();

    let report = completed(scan.run_cycle());
    assert_eq!(report.population, 3);
    assert_eq!(report.assessed, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(report.tiers.total(), 2);
    assert!(scan.store().inner.fields("c-2").unwrap().unwrap().get(FIELD_RISK_LEVEL).is_none());
}

#[test]
fn transient_write_failure_is_retried_within_the_cycle() {
    let flaky = FlakyStore::with_customers(&[
        ("c-1", snapshot(0, 0, 0.0, 0.0, 4)),
        ("c-2", snapshot(2, 0, 0.0, 0.0, 4)),
    ]);
    flaky.fail_writes("c-1", 2);
    let store = RetryingStore::new(flaky, RetryPolicy::immediate(3));
    let mut scan = ScanLoop::new(store, &config(2)).unwrap();

    let report = completed(scan.run_cycle());
    assert_eq!(report.assessed, 2);
    assert_eq!(report.failed, 0);
    let fields = scan.store().inner().inner.fields("c-1").unwrap().unwrap();
    assert_eq!(fields[FIELD_RISK_LEVEL], "MEDIUM");
}

#[test]
fn enumeration_failure_aborts_only_that_cycle() {
    let flaky = FlakyStore::with_customers(&[("c-1", snapshot(2, 0, 0.0, 0.0, 4))]);
    flaky.fail_list(1);
    let store = RetryingStore::new(flaky, RetryPolicy::immediate(1));
    let mut scan = ScanLoop::new(store, &config(1)).unwrap();

    let outcomes = scan.run_cycles(2);
    assert_eq!(outcomes.len(), 2);
    match &outcomes[0] {
        CycleOutcome::Aborted { cycle, reason, .. } => {
            assert_eq!(*cycle, 1);
            assert!(reason.contains("list_identifiers"), "reason: {reason}");
        }
        other => panic!("first cycle should abort, got {other}"),
    }
    let report = outcomes[1].report().expect("second cycle should complete");
    assert_eq!(report.cycle, 2);
    assert_eq!(report.assessed, 1);
}

#[test]
fn record_without_fields_is_skipped() {
    let store = scenario_store();
    store.put_fields("c-empty", &[]).unwrap();
    let mut scan = ScanLoop::new(store, &config(2)).unwrap();

    let report = completed(scan.run_cycle());
    assert_eq!(report.population, 5);
    assert_eq!(report.assessed, 4);
    assert_eq!(report.skipped, 1);
    assert_eq!(report.failed, 0);
    assert_eq!(report.tiers.total(), 4);
}

#[test]
fn record_removed_mid_cycle_is_not_resurrected() {
    let flaky = FlakyStore::with_customers(&[
        ("c-1", snapshot(2, 0, 0.0, 0.0, 4)),
        ("c-2", snapshot(0, 0, 0.0, 0.0, 4)),
    ]);
    flaky.remove_after_read("c-2");
    let mut scan = ScanLoop::new(flaky, &config(2)).unwrap();

    let report = completed(scan.run_cycle());
    assert_eq!(report.assessed, 1);
    assert_eq!(report.skipped, 1);
    assert_eq!(report.failed, 0);
    assert!(scan.store().inner.fields("c-2").unwrap().is_none());
}

// ── Across cycles ────────────────────────────────────────────────────────────

#[test]
fn changed_snapshot_replaces_the_stored_assessment() {
    let store = MemoryStore::new();
    store.put_snapshot("c-1", &snapshot(0, 11, 0.0, 0.0, 10)).unwrap();
    let mut scan = ScanLoop::new(store, &config(1)).unwrap();

    completed(scan.run_cycle());
    let fields = scan.store().fields("c-1").unwrap().unwrap();
    assert_eq!(fields[FIELD_RISK_LEVEL], "CRITICAL");

    scan.store().put_snapshot("c-1", &snapshot(2, 0, 0.0, 0.0, 10)).unwrap();
    let report = completed(scan.run_cycle());
    assert_eq!(report.cycle, 2);
    let fields = scan.store().fields("c-1").unwrap().unwrap();
    assert_eq!(fields[FIELD_RISK_LEVEL], "LOW");
    assert_eq!(fields[FIELD_RISK_SCORE], "0");
    assert_eq!(fields[FIELD_HARDSHIP_TYPE], "NONE");
    assert_eq!(fields["risk_reasons"], "[]");
}

#[test]
fn customer_added_between_cycles_is_picked_up() {
    let mut scan = ScanLoop::new(scenario_store(), &config(2)).unwrap();
    assert_eq!(completed(scan.run_cycle()).population, 4);

    scan.store().put_snapshot("c-5", &snapshot(0, 0, 0.0, 0.0, 4)).unwrap();
    let report = completed(scan.run_cycle());
    assert_eq!(report.population, 5);
    assert_eq!(report.assessed, 5);
    assert!(scan.store().fields("c-5").unwrap().unwrap().contains_key(FIELD_RISK_LEVEL));
}

#[test]
fn subscribers_receive_every_outcome_in_order() {
    let mut scan = ScanLoop::new(scenario_store(), &config(2)).unwrap();
    let rx = scan.subscribe();
    let outcomes = scan.run_cycles(3);

    let received: Vec<_> = rx.try_iter().collect();
    assert_eq!(received, outcomes);
    let cycles: Vec<_> = received.iter().map(|o| o.cycle()).collect();
    assert_eq!(cycles, vec![1, 2, 3]);
}

// ── Scheduling ───────────────────────────────────────────────────────────────

fn timed_run(policy: TickPolicy) -> Duration {
    let flaky = FlakyStore::with_customers(&[("c-1", snapshot(2, 0, 0.0, 0.0, 4))]);
    flaky.slow_reads(Duration::from_millis(30));
    let config = EngineConfig {
        tick_interval: 0.05,
        tick_policy: policy,
        ..config(1)
    };
    let mut scan = ScanLoop::new(flaky, &config).unwrap();
    let start = Instant::now();
    assert_eq!(scan.run_cycles(3).len(), 3);
    start.elapsed()
}

#[test]
fn fixed_rate_ticks_from_scan_start() {
    // Two full intervals between three scans, plus the last scan itself.
    let elapsed = timed_run(TickPolicy::FixedRate);
    assert!(elapsed >= Duration::from_millis(130), "ran in {elapsed:?}");
}

#[test]
fn fixed_delay_ticks_from_scan_end() {
    // Three scans of 30ms each, separated by two full intervals.
    let elapsed = timed_run(TickPolicy::FixedDelay);
    assert!(elapsed >= Duration::from_millis(190), "ran in {elapsed:?}");
}

// ── Background loop and shutdown ─────────────────────────────────────────────

#[test]
fn spawned_loop_drains_on_shutdown() {
    init_logging();
    let mut scan = ScanLoop::new(scenario_store(), &config(2)).unwrap();
    let rx = scan.subscribe();
    let handle = scan.spawn().unwrap();

    let first = rx.recv_timeout(Duration::from_secs(2)).expect("no cycle ran");
    assert_eq!(first.cycle(), 1);

    match handle.shutdown(Duration::from_secs(2)) {
        ShutdownOutcome::Drained { cycles } => assert!(cycles >= 1),
        other => panic!("expected drain, got {other:?}"),
    }
}

#[test]
fn shutdown_interrupts_a_long_idle_wait() {
    // The longest accepted interval still schedules without overflow.
    let config = EngineConfig {
        tick_interval: 86_400.0,
        ..config(1)
    };
    let mut scan = ScanLoop::new(scenario_store(), &config).unwrap();
    let rx = scan.subscribe();
    let handle = scan.spawn().unwrap();
    rx.recv_timeout(Duration::from_secs(2)).expect("no cycle ran");

    let start = Instant::now();
    let outcome = handle.shutdown(Duration::from_secs(2));
    assert_eq!(outcome, ShutdownOutcome::Drained { cycles: 1 });
    assert!(start.elapsed() < Duration::from_secs(1), "idle wait was not interrupted");
}

#[test]
fn shutdown_mid_cycle_finishes_in_flight_and_skips_the_rest() {
    let customers: Vec<_> = (0..20)
        .map(|i| (format!("c-{i:02}"), snapshot(2, 0, 0.0, 0.0, 4)))
        .collect();
    let flaky = FlakyStore::new();
    for (id, snap) in &customers {
        flaky.inner.put_snapshot(id, snap).unwrap();
    }
    flaky.slow_reads(Duration::from_millis(50));
    let (first_read_tx, first_read_rx) = mpsc::channel();
    flaky.notify_first_read(first_read_tx);

    let mut scan = ScanLoop::new(flaky, &config(1)).unwrap();
    let rx = scan.subscribe();
    let handle = scan.spawn().unwrap();

    first_read_rx
        .recv_timeout(Duration::from_secs(2))
        .expect("scan never started reading");
    let outcome = handle.shutdown(Duration::from_secs(5));
    assert_eq!(outcome, ShutdownOutcome::Drained { cycles: 1 });

    let report = completed(rx.recv_timeout(Duration::from_secs(1)).unwrap());
    assert!(report.interrupted());
    assert!(report.assessed >= 1, "in-flight record should finish");
    assert_eq!(report.assessed + report.not_started, report.population);
    assert_eq!(report.failed, 0);
}

// ── SQLite end to end ────────────────────────────────────────────────────────

#[test]
fn sqlite_store_reflects_the_cycle_report() {
    let store = SqliteStore::in_memory().unwrap();
    store.migrate().unwrap();
    for c in population::generate(11, 120) {
        store.put_snapshot(&c.customer_id, &c.snapshot).unwrap();
    }
    let store = RetryingStore::new(store, RetryPolicy::immediate(2));
    let mut scan = ScanLoop::new(store, &config(4)).unwrap();

    let report = completed(scan.run_cycle());
    assert_eq!(report.assessed, 120);

    let sqlite = scan.store().inner();
    assert_eq!(sqlite.customer_count().unwrap(), 120);
    for level in RiskLevel::ALL {
        assert_eq!(
            sqlite.risk_level_count(level.as_str()).unwrap() as usize,
            report.tiers.get(level),
            "stored {level} count differs from report"
        );
    }
    assert_eq!(scan.store().list_identifiers().unwrap().len(), 120);
}
