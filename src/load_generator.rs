use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use perf_telemetry::{ApiCallMonitor, MetricCollector, TimingTracker};

const ENDPOINTS: &[(&str, &str)] = &[
    ("GET", "/api/contracts"),
    ("GET", "/api/contracts/:id"),
    ("POST", "/api/contracts"),
    ("GET", "/api/tenants"),
    ("PUT", "/api/documents/:id"),
];

const COMPONENTS: &[&str] = &["ContractList", "DocumentEditor", "TenantTable", "Sidebar"];

#[derive(Debug, thiserror::Error)]
enum SimulatedError {
    #[error("upstream unavailable")]
    Unavailable,
    #[error("request timed out")]
    Timeout,
}

// ─── Public entry point ──────────────────────────────────────────

/// Feeds synthetic page-load vitals once, then spawns `concurrency` tasks
/// that issue fake API calls and renders until the deadline or until
/// `running` is cleared.
pub async fn run(
    running: Arc<AtomicBool>,
    vitals: Arc<MetricCollector>,
    api: Arc<ApiCallMonitor>,
    render: Arc<TimingTracker>,
    mount: Arc<TimingTracker>,
    concurrency: u32,
    duration_secs: u64,
) {
    page_load(&vitals, &mount);

    let deadline = Instant::now() + Duration::from_secs(duration_secs);
    let mut handles = Vec::with_capacity(concurrency as usize);

    for worker_id in 0..concurrency {
        let running = running.clone();
        let api = api.clone();
        let render = render.clone();

        handles.push(tokio::spawn(async move {
            worker(worker_id, running, api, render, deadline).await;
        }));
    }

    for h in handles {
        let _ = h.await;
    }

    running.store(false, Ordering::SeqCst);
}

// ─── Page load ───────────────────────────────────────────────────

fn page_load(vitals: &MetricCollector, mount: &TimingTracker) {
    let mut rng = StdRng::seed_from_u64(42);

    let samples = [
        ("TTFB", rng.gen_range(200.0..1200.0)),
        ("FCP", rng.gen_range(900.0..2400.0)),
        ("LCP", rng.gen_range(1800.0..4800.0)),
        ("FID", rng.gen_range(20.0..250.0)),
        ("CLS", rng.gen_range(0.01..0.3)),
    ];
    for (name, value) in samples {
        if let Err(e) = vitals.record(name, value, value) {
            tracing::warn!("dropping vital {name}: {e}");
        }
    }

    for component in COMPONENTS {
        mount.record(component, rng.gen_range(30.0..180.0));
    }
}

// ─── Worker loop ─────────────────────────────────────────────────

async fn worker(
    id: u32,
    running: Arc<AtomicBool>,
    api: Arc<ApiCallMonitor>,
    render: Arc<TimingTracker>,
    deadline: Instant,
) {
    // Each worker gets its own deterministic RNG seeded uniquely.
    let mut rng = StdRng::seed_from_u64(1000 + id as u64);

    while running.load(Ordering::Relaxed) && Instant::now() < deadline {
        if rng.gen_bool(0.7) {
            do_call(&mut rng, &api).await;
        } else {
            do_render(&mut rng, &render).await;
        }
    }
}

// ─── API call ────────────────────────────────────────────────────

async fn do_call(rng: &mut StdRng, api: &ApiCallMonitor) {
    let (method, url) = ENDPOINTS[rng.gen_range(0..ENDPOINTS.len())];

    // 5 % spikes past the slow threshold
    let latency_ms = if rng.gen_bool(0.05) {
        rng.gen_range(1_100..2_000u64)
    } else {
        rng.gen_range(15..350u64)
    };
    let failure = match rng.gen_range(0u8..100) {
        0..=3 => Some(SimulatedError::Unavailable),
        4 => Some(SimulatedError::Timeout),
        _ => None,
    };

    let result = api
        .track(url, method, async move {
            tokio::time::sleep(Duration::from_millis(latency_ms)).await;
            match failure {
                Some(e) => Err(e),
                None => Ok(()),
            }
        })
        .await;

    if let Err(e) = result {
        tracing::debug!(%url, %method, "simulated failure: {e}");
    }
}

// ─── Render ──────────────────────────────────────────────────────

async fn do_render(rng: &mut StdRng, render: &TimingTracker) {
    let component = COMPONENTS[rng.gen_range(0..COMPONENTS.len())];
    let frame_ms = if rng.gen_bool(0.1) {
        rng.gen_range(17..60u64)
    } else {
        rng.gen_range(2..14u64)
    };

    render.begin(component);
    tokio::time::sleep(Duration::from_millis(frame_ms)).await;
    render.end(component);
}
