use super::Report;
use crate::timing::TimingStats;

/// Render one aligned line per metric: `section  name  value`.
pub fn render_lines(report: &Report) -> Vec<String> {
    let mut lines = vec![row(
        "report",
        "captured_at",
        report.captured_at.to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
    )];

    // ── Vitals ──────────────────────────────────────────────────
    if let Some(summary) = &report.vitals {
        for sample in report.vital_samples.values() {
            lines.push(row(
                "vital",
                &sample.name,
                format!("{:.3} ({})", sample.value, sample.rating),
            ));
        }
        lines.push(row(
            "vital",
            "overall",
            format!("{} score={:.0}", summary.overall, summary.score),
        ));
    }

    // ── API calls ───────────────────────────────────────────────
    if let Some(api) = &report.api {
        lines.push(row(
            "api",
            "calls",
            format!(
                "{} ok={} failed={}",
                api.total_calls, api.successful_calls, api.failed_calls
            ),
        ));
        lines.push(row("api", "avg", ms(api.average_response_time)));
        lines.push(row("api", "p50", ms(api.p50)));
        lines.push(row("api", "p90", ms(api.p90)));
        lines.push(row("api", "p99", ms(api.p99)));
        lines.push(row(
            "api",
            "error_rate",
            format!(
                "{:.1}%{}",
                api.error_rate,
                if report.api_error_budget_exceeded { " (over budget)" } else { "" }
            ),
        ));
        lines.push(row("api", "throughput", format!("{:.1}/min", api.throughput)));
        lines.push(row("api", "bytes", api.total_data_transferred.to_string()));
        if let Some(slowest) = &api.slowest_call {
            lines.push(row(
                "api",
                "slowest",
                format!("{} {} {}", slowest.method, slowest.url, ms(slowest.duration)),
            ));
        }
        if report.api_malformed_samples > 0 {
            lines.push(row("api", "malformed", report.api_malformed_samples.to_string()));
        }
    }

    // ── Memory ──────────────────────────────────────────────────
    if let Some(memory) = &report.memory {
        match &memory.latest {
            Some(m) if memory.supported => {
                lines.push(row(
                    "memory",
                    "used",
                    format!("{:.1}MB of {:.1}MB ({:.1}%)", m.used_mb, m.limit_mb, m.usage_percent),
                ));
                lines.push(row("memory", "pressure", m.pressure.as_str().to_string()));
                lines.push(row("memory", "growth", format!("{:.3}MB/s", m.growth_rate)));
                lines.push(row("memory", "leaking", memory.leaking.to_string()));
            }
            _ if !memory.supported => lines.push(row("memory", "status", "unsupported".into())),
            _ => lines.push(row("memory", "status", "no samples".into())),
        }
    }

    // ── Render / mount ──────────────────────────────────────────
    for stats in report.render.values() {
        lines.push(timing_row("render", stats));
    }
    for stats in report.mount.values() {
        lines.push(timing_row("mount", stats));
    }

    // ── User timing / entries ───────────────────────────────────
    for (name, duration) in &report.user_timing {
        lines.push(row("timing", name, ms(*duration)));
    }
    if !report.performance_entries.is_empty() {
        let mut per_type = std::collections::BTreeMap::new();
        for entry in &report.performance_entries {
            *per_type.entry(entry.entry_type.as_str()).or_insert(0u32) += 1;
        }
        let counts: Vec<String> = per_type.iter().map(|(t, n)| format!("{t}={n}")).collect();
        lines.push(row(
            "entries",
            &report.performance_entries.len().to_string(),
            counts.join(" "),
        ));
    }

    // ── Issues ──────────────────────────────────────────────────
    for issue in &report.issues {
        lines.push(row("issue", &issue.kind.to_string(), issue.message.clone()));
    }

    lines
}

fn row(section: &str, name: &str, value: String) -> String {
    format!("{section:<8} {name:<28} {value}")
}

fn ms(v: f64) -> String {
    format!("{v:.2}ms")
}

fn timing_row(section: &str, stats: &TimingStats) -> String {
    row(
        section,
        &stats.name,
        format!(
            "last={} avg={} count={}{}",
            ms(stats.last_ms),
            ms(stats.average_ms),
            stats.count,
            if stats.is_slow { " SLOW" } else { "" }
        ),
    )
}
