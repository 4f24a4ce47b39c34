use serde::Serialize;
use sim_core::MetricsSnapshot;

use crate::run_result::{crit_rate, detect_stall};

type Extractor = (&'static str, fn(&MetricsSnapshot) -> f64);

/// Every per-seed metric summarized across a batch, in report order.
const EXTRACTORS: &[Extractor] = &[
    ("dps", |s| s.dps),
    ("total_damage", |s| s.total_damage),
    ("melee_damage", |s| s.melee_damage),
    ("spell_damage", |s| s.spell_damage),
    ("casts", |s| s.casts as f64),
    ("hits", |s| s.hits as f64),
    ("crits", |s| s.crits as f64),
    ("misses", |s| s.misses as f64),
    ("dodges", |s| s.dodges as f64),
    ("negated", |s| s.negated as f64),
    ("crit_rate", crit_rate),
    ("mana_gained", |s| s.mana_gained),
    ("mana_wasted", |s| s.mana_wasted),
    ("target_health_pct", |s| s.target_health_pct),
    ("active_auras", |s| f64::from(s.active_auras)),
];

#[derive(Debug, Serialize)]
pub struct SummaryStats {
    pub seed_count: usize,
    pub stalled_count: usize,
    pub metrics: Vec<MetricSummary>,
}

#[derive(Debug, Serialize)]
pub struct MetricSummary {
    pub name: String,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    pub stddev: f64,
}

pub fn compute_summary(snapshots: &[(u64, &MetricsSnapshot)]) -> SummaryStats {
    let stalled_count = snapshots
        .iter()
        .filter(|(_, s)| detect_stall(s).0)
        .count();

    let metrics = EXTRACTORS
        .iter()
        .map(|(name, extract)| {
            let values: Vec<f64> = snapshots.iter().map(|(_, s)| extract(s)).collect();
            compute_metric_summary(name, &values)
        })
        .collect();

    SummaryStats {
        seed_count: snapshots.len(),
        stalled_count,
        metrics,
    }
}

fn compute_metric_summary(name: &str, values: &[f64]) -> MetricSummary {
    let count = values.len() as f64;
    let mean = values.iter().sum::<f64>() / count;
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / count;

    MetricSummary {
        name: name.to_string(),
        mean,
        min,
        max,
        stddev: variance.sqrt(),
    }
}

/// `{ "dps": { "mean": .., "min": .., "max": .., "stddev": .. }, .. }`
pub fn build_aggregated_metrics(stats: &SummaryStats) -> serde_json::Value {
    let map = stats
        .metrics
        .iter()
        .map(|m| {
            (
                m.name.clone(),
                serde_json::json!({
                    "mean": m.mean,
                    "min": m.min,
                    "max": m.max,
                    "stddev": m.stddev,
                }),
            )
        })
        .collect();
    serde_json::Value::Object(map)
}

pub fn print_summary(scenario_name: &str, duration_ms: u64, stats: &SummaryStats) {
    println!(
        "\n=== {} ({} seeds, {:.1}s each) ===\n",
        scenario_name,
        stats.seed_count,
        duration_ms as f64 / 1000.0
    );
    println!(
        "{:<20} {:>10} {:>10} {:>10} {:>10}",
        "Metric", "Mean", "Min", "Max", "StdDev"
    );
    println!("{}", "-".repeat(64));
    for metric in &stats.metrics {
        println!(
            "{:<20} {:>10.2} {:>10.2} {:>10.2} {:>10.2}",
            metric.name, metric.mean, metric.min, metric.max, metric.stddev
        );
    }
    println!(
        "{:<20} {}/{}",
        "stall_rate", stats.stalled_count, stats.seed_count
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::run_result::sample_snapshot;

    #[test]
    fn test_summary_basic_stats() {
        let s1 = sample_snapshot(10, 1, 3000.0);
        let s2 = sample_snapshot(10, 3, 6000.0);
        let stats = compute_summary(&[(1, &s1), (2, &s2)]);

        assert_eq!(stats.seed_count, 2);
        assert_eq!(stats.stalled_count, 0);

        let dps = &stats.metrics[0];
        assert_eq!(dps.name, "dps");
        assert!((dps.mean - 75.0).abs() < 1e-9);
        assert!((dps.min - 50.0).abs() < 1e-9);
        assert!((dps.max - 100.0).abs() < 1e-9);
        assert!((dps.stddev - 25.0).abs() < 1e-9);
    }

    #[test]
    fn test_stalled_seeds_counted() {
        let stalled = sample_snapshot(0, 0, 0.0);
        let healthy = sample_snapshot(10, 2, 4000.0);
        let stats = compute_summary(&[(1, &stalled), (2, &healthy)]);
        assert_eq!(stats.stalled_count, 1);
    }

    #[test]
    fn test_stddev_zero_for_identical() {
        let s1 = sample_snapshot(8, 2, 2500.0);
        let s2 = sample_snapshot(8, 2, 2500.0);
        let stats = compute_summary(&[(1, &s1), (2, &s2)]);

        for metric in &stats.metrics {
            assert!(
                metric.stddev.abs() < 1e-10,
                "stddev for {} should be 0, got {}",
                metric.name,
                metric.stddev
            );
        }
    }

    #[test]
    fn test_aggregated_metrics_cover_every_extractor() {
        let s1 = sample_snapshot(10, 1, 3000.0);
        let s2 = sample_snapshot(12, 4, 5000.0);
        let agg = build_aggregated_metrics(&compute_summary(&[(1, &s1), (2, &s2)]));

        let obj = agg.as_object().unwrap();
        assert_eq!(obj.len(), EXTRACTORS.len());
        for (key, _) in EXTRACTORS {
            let entry = obj
                .get(*key)
                .unwrap_or_else(|| panic!("missing key: {key}"));
            for field in ["mean", "min", "max", "stddev"] {
                assert!(entry.get(field).is_some(), "missing {field} for {key}");
            }
        }
        assert!((agg["casts"]["mean"].as_f64().unwrap() - 11.0).abs() < 1e-9);
        assert!((agg["casts"]["max"].as_f64().unwrap() - 12.0).abs() < 1e-9);
    }
}
