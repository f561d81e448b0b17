use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use perf_telemetry::{
    CallOutcome, ExportDestination, ExportOutcome, IssueKind, ManualClock, MemorySignal,
    NoMemorySignal, PressureLevel, Rating, RawMemoryReading, Telemetry, TelemetryConfig,
};

/// Replays `used_mb` values against a 100 MB limit, one per read.
fn scripted_heap(values: Vec<f64>) -> impl Fn() -> MemorySignal + Send + Sync {
    let next = AtomicUsize::new(0);
    move || {
        let i = next.fetch_add(1, Ordering::SeqCst).min(values.len() - 1);
        MemorySignal::Supported(RawMemoryReading {
            used_mb: values[i],
            total_mb: values[i],
            limit_mb: 100.0,
        })
    }
}

#[test]
fn test_full_session_report() {
    let config = TelemetryConfig::from_json(
        r#"{
            "thresholds": { "api_slow_ms": 500 },
            "alerts": { "error_rate_pct": 20 }
        }"#,
    )
    .unwrap();
    let clock = ManualClock::shared(1_700_000_000_000);
    let telemetry =
        Telemetry::with_clock(config, clock.clone(), Arc::new(NoMemorySignal)).unwrap();

    telemetry.vitals().record("LCP", 2000.0, 2000.0).unwrap();
    telemetry.vitals().record("CLS", 0.3, 0.3).unwrap();

    for i in 0..8 {
        let start = i as f64 * 1000.0;
        telemetry
            .api()
            .record_call(CallOutcome::success("/api/items", "GET", start, start + 100.0, 200));
    }
    telemetry
        .api()
        .record_call(CallOutcome::success("/api/export", "GET", 0.0, 800.0, 200));
    telemetry
        .api()
        .record_call(CallOutcome::failure("/api/items", "POST", 0.0, 50.0, 500, "server error"));

    telemetry.render().begin("Grid");
    clock.advance(30.0);
    telemetry.render().end("Grid");

    let report = telemetry.snapshot();

    let vitals = report.vitals.as_ref().unwrap();
    assert_eq!(vitals.overall, Rating::Poor);
    assert_eq!(vitals.per_metric["LCP"], Rating::Good);

    let api = report.api.as_ref().unwrap();
    assert_eq!(api.total_calls, 10);
    assert_eq!(api.failed_calls, 1);
    assert_eq!(api.error_rate, 10.0);
    assert!(!report.api_error_budget_exceeded);
    assert_eq!(api.slowest_call.as_ref().unwrap().url, "/api/export");

    let memory = report.memory.as_ref().unwrap();
    assert!(!memory.sampling);
    assert!(memory.latest.is_none());

    assert_eq!(report.render["Grid"].last_ms, 30.0);

    // newest first: render, api error, slow api
    let kinds: Vec<_> = report.issues.iter().map(|i| i.kind).collect();
    assert_eq!(
        kinds,
        vec![IssueKind::SlowRender, IssueKind::ApiError, IssueKind::SlowApi]
    );
}

#[test]
fn test_memory_pressure_and_leak_flow_into_issues() {
    let clock = ManualClock::shared(0);
    let source = scripted_heap(vec![40.0, 60.0, 75.0, 85.0, 95.0]);
    let telemetry =
        Telemetry::with_clock(TelemetryConfig::default(), clock.clone(), Arc::new(source)).unwrap();

    let mut pressures = Vec::new();
    for _ in 0..5 {
        let reading = telemetry.memory().tick().unwrap();
        pressures.push(reading.pressure);
        clock.advance(1000.0);
    }
    assert_eq!(
        pressures,
        vec![
            PressureLevel::Low,
            PressureLevel::Medium,
            PressureLevel::High,
            PressureLevel::High,
            PressureLevel::Critical,
        ]
    );
    assert!(telemetry.leak_detector().is_leaking());

    let issues = telemetry.issues().recent();
    let leaks = issues.iter().filter(|i| i.kind == IssueKind::MemoryLeak).count();
    let pressure = issues
        .iter()
        .filter(|i| i.kind == IssueKind::MemoryPressure)
        .count();
    assert_eq!(leaks, 1);
    assert_eq!(pressure, 3);

    let report = telemetry.snapshot();
    assert!(report.memory.unwrap().leaking);

    telemetry.clear();
    assert!(!telemetry.leak_detector().is_leaking());
    assert!(telemetry.issues().is_empty());
    assert!(telemetry.memory().latest().is_none());
}

#[tokio::test]
async fn test_alerts_and_user_timing_reach_the_report() {
    let clock = ManualClock::shared(0);
    let telemetry = Telemetry::with_clock(
        TelemetryConfig::default(),
        clock.clone(),
        Arc::new(NoMemorySignal),
    )
    .unwrap();

    let alerts = Arc::new(Mutex::new(Vec::new()));
    let a = alerts.clone();
    telemetry
        .vitals()
        .add_alert("LCP", 3000.0, move |sample| a.lock().push(sample.value))
        .unwrap();
    telemetry.vitals().record("LCP", 2000.0, 2000.0).unwrap();
    telemetry.vitals().record("LCP", 3500.0, 1500.0).unwrap();
    assert_eq!(*alerts.lock(), vec![3500.0]);

    telemetry.entries().record("/bundle.js", "resource", 1.0, 80.0);
    telemetry
        .entries()
        .measure_user_timing("load-contracts", async {
            clock.advance(45.0);
        })
        .await;

    let report = telemetry.snapshot();
    assert_eq!(report.user_timing["measure_load-contracts"], 45.0);
    let types: Vec<_> = report
        .performance_entries
        .iter()
        .map(|e| e.entry_type.as_str())
        .collect();
    assert_eq!(types, vec!["resource", "measure"]);

    telemetry.clear();
    telemetry.vitals().record("LCP", 3500.0, 0.0).unwrap();
    assert_eq!(alerts.lock().len(), 2);
}

#[test]
fn test_memory_export_matches_snapshot() {
    let telemetry = Telemetry::with_clock(
        TelemetryConfig::default(),
        ManualClock::shared(5_000),
        Arc::new(NoMemorySignal),
    )
    .unwrap();
    telemetry.mount().record("Dashboard", 250.0);

    let snapshot = telemetry.snapshot();
    match telemetry.reports().export(ExportDestination::Memory) {
        ExportOutcome::Report(report) => assert_eq!(*report, snapshot),
        other => panic!("unexpected outcome: {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_sampler_and_periodic_reports() {
    let clock = ManualClock::shared(0);
    let source = scripted_heap(vec![10.0, 11.0, 12.0, 13.0, 14.0, 15.0, 16.0]);
    let telemetry =
        Telemetry::with_clock(TelemetryConfig::default(), clock, Arc::new(source)).unwrap();

    let reports = Arc::new(Mutex::new(Vec::new()));
    let r = reports.clone();
    telemetry
        .reports()
        .subscribe(move |report| r.lock().push(report.memory.clone()));

    telemetry.start_memory_sampling().unwrap();
    assert!(telemetry.memory().is_sampling());
    let task = telemetry.spawn_reports(ExportDestination::Memory).unwrap();

    // memory every 5s, reports every 5s: ticks at 0, 5, 10
    tokio::time::sleep(Duration::from_millis(12_000)).await;
    assert_eq!(telemetry.memory().history().len(), 3);
    assert_eq!(reports.lock().len(), 3);

    task.stop();
    telemetry.stop_memory_sampling();
    tokio::time::sleep(Duration::from_millis(20_000)).await;

    assert!(!telemetry.memory().is_sampling());
    assert_eq!(telemetry.memory().history().len(), 3);
    assert_eq!(reports.lock().len(), 3);
}

#[test]
fn test_unsupported_memory_stays_idle() {
    let telemetry = Telemetry::new(TelemetryConfig::default()).unwrap();
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .unwrap();

    runtime.block_on(async {
        telemetry.start_memory_sampling().unwrap();
    });

    assert!(!telemetry.memory().is_sampling());
    assert!(!telemetry.memory().is_supported());
    let memory = telemetry.snapshot().memory.unwrap();
    assert!(!memory.supported);
}
