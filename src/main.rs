use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use perf_telemetry::{
    ExportDestination, ExportOutcome, MemorySignal, RawMemoryReading, SystemClock, Telemetry,
    TelemetryConfig,
};
use tracing_subscriber::EnvFilter;

mod load_generator;

/// Workers driving the synthetic load
const CONCURRENCY: u32 = 4;
const RUN_SECS: u64 = 12;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    println!();
    println!("╔══════════════════════════════════════════════════╗");
    println!("║   🔬  PERFORMANCE TELEMETRY DEMO                 ║");
    println!("╚══════════════════════════════════════════════════╝");
    println!();

    // ── 1. Load config ───────────────────────────────────────────
    let config = match std::env::args().nth(1) {
        Some(path) => {
            println!("📄 Loading config from {path}");
            TelemetryConfig::from_json(&std::fs::read_to_string(path)?)?
        }
        None => demo_config(),
    };

    // ── 2. Build telemetry ───────────────────────────────────────
    let telemetry = Telemetry::with_clock(config, SystemClock::shared(), Arc::new(leaky_heap()))?;
    telemetry.start_memory_sampling()?;
    let reports = telemetry.spawn_reports(ExportDestination::StructuredLog)?;
    telemetry.vitals().add_alert("LCP", 4_000.0, |sample| {
        tracing::warn!(metric = %sample.name, "LCP alert: {:.0}ms", sample.value);
    })?;

    // ── 3. Drive synthetic load ──────────────────────────────────
    println!("🚀 Running {CONCURRENCY} workers for {RUN_SECS}s (RUST_LOG=debug for detail)");
    println!();
    let running = Arc::new(AtomicBool::new(true));
    telemetry
        .entries()
        .measure_user_timing(
            "synthetic-load",
            load_generator::run(
                running,
                telemetry.vitals().clone(),
                telemetry.api().clone(),
                telemetry.render().clone(),
                telemetry.mount().clone(),
                CONCURRENCY,
                RUN_SECS,
            ),
        )
        .await;

    // ── 4. Final report ──────────────────────────────────────────
    reports.stop();
    telemetry.stop_memory_sampling();

    if let ExportOutcome::Report(report) = telemetry.reports().export(ExportDestination::Memory) {
        println!();
        println!("{}", serde_json::to_string_pretty(&report)?);
    }

    Ok(())
}

/// Faster cadence than the defaults so a short run shows several reports.
fn demo_config() -> TelemetryConfig {
    let mut config = TelemetryConfig::default();
    config.collection.memory_interval_ms = 1_000;
    config.collection.report_interval_ms = 3_000;
    config
}

/// Heap that grows 6 MB per read toward a 256 MB limit, so pressure and
/// leak heuristics trip partway through the run.
fn leaky_heap() -> impl Fn() -> MemorySignal + Send + Sync {
    let reads = AtomicU64::new(0);
    move || {
        let n = reads.fetch_add(1, Ordering::Relaxed) as f64;
        let used_mb = (96.0 + n * 6.0).min(250.0);
        MemorySignal::Supported(RawMemoryReading {
            used_mb,
            total_mb: used_mb + 16.0,
            limit_mb: 256.0,
        })
    }
}
