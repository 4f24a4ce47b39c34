use serde::Serialize;
use sim_core::MetricsSnapshot;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

#[derive(Debug, Serialize)]
pub struct RunResult {
    pub run_schema_version: u32,
    pub run_status: String,
    pub run_id: String,
    pub git_sha: String,
    pub git_dirty: bool,
    pub seed: u64,
    pub encounter_id: String,
    pub scenario_name: String,
    pub scenario_params: serde_json::Value,
    pub duration_ms: u64,
    pub actions_executed: u64,
    /// Scheduler actions run per label.
    pub actions_by_label: BTreeMap<String, u64>,
    pub wall_time_ms: u64,
    pub sim_ms_per_wall_second: f64,
    pub summary_metrics: Option<SummaryMetrics>,
    pub stalled: bool,
    pub stall_reason: Option<String>,
    pub metrics_path: String,
    pub error_message: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SummaryMetrics {
    pub total_damage: f64,
    pub dps: f64,
    pub melee_damage: f64,
    pub spell_damage: f64,
    pub casts: u64,
    pub hits: u64,
    pub crits: u64,
    pub misses: u64,
    pub dodges: u64,
    pub negated: u64,
    pub crit_rate: f64,
    pub mana_gained: f64,
    pub mana_wasted: f64,
    pub target_health_pct: f64,
    pub active_auras: u32,
}

/// Crits over landed-or-avoided swings; negated resolutions are not rolls.
pub fn crit_rate(snapshot: &MetricsSnapshot) -> f64 {
    let rolled = snapshot.hits + snapshot.crits + snapshot.misses + snapshot.dodges;
    if rolled == 0 {
        0.0
    } else {
        snapshot.crits as f64 / rolled as f64
    }
}

impl SummaryMetrics {
    pub fn from_snapshot(snapshot: &MetricsSnapshot) -> Self {
        Self {
            total_damage: snapshot.total_damage,
            dps: snapshot.dps,
            melee_damage: snapshot.melee_damage,
            spell_damage: snapshot.spell_damage,
            casts: snapshot.casts,
            hits: snapshot.hits,
            crits: snapshot.crits,
            misses: snapshot.misses,
            dodges: snapshot.dodges,
            negated: snapshot.negated,
            crit_rate: crit_rate(snapshot),
            mana_gained: snapshot.mana_gained,
            mana_wasted: snapshot.mana_wasted,
            target_health_pct: snapshot.target_health_pct,
            active_auras: snapshot.active_auras,
        }
    }
}

impl RunResult {
    /// Write JSON atomically: write to `.tmp` then rename.
    pub fn write_atomic(&self, path: &Path) -> anyhow::Result<()> {
        let tmp_path = path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(self)?;
        let mut file = std::fs::File::create(&tmp_path)?;
        file.write_all(json.as_bytes())?;
        file.sync_all()?;
        std::fs::rename(&tmp_path, path)?;
        Ok(())
    }
}

/// A run is stalled when nothing was cast, or when every resolution was negated.
pub fn detect_stall(snapshot: &MetricsSnapshot) -> (bool, Option<String>) {
    if snapshot.casts == 0 {
        (true, Some("no casts succeeded".to_string()))
    } else if snapshot.negated == snapshot.casts {
        (true, Some("every resolution negated".to_string()))
    } else {
        (false, None)
    }
}

pub fn git_sha() -> String {
    env!("GIT_SHA").to_string()
}

pub fn git_dirty() -> bool {
    env!("GIT_DIRTY") == "true"
}

#[cfg(test)]
pub(crate) fn sample_snapshot(casts: u64, crits: u64, total_damage: f64) -> MetricsSnapshot {
    MetricsSnapshot {
        at_ms: 60_000,
        metrics_version: sim_core::metrics::METRICS_VERSION,
        total_damage,
        dps: total_damage / 60.0,
        melee_damage: total_damage,
        spell_damage: 0.0,
        casts,
        hits: casts - crits,
        crits,
        misses: 0,
        dodges: 0,
        negated: 0,
        mana_gained: 100.0 * casts as f64,
        mana_wasted: 0.0,
        target_health_pct: 0.99,
        active_auras: 2,
    }
}
