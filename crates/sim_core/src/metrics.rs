//! Per-ability damage and resource metrics, plus snapshots for time-series output.
//!
//! The ledger lives in `CombatState` and is written by damage application and
//! resource gains. `compute_metrics` samples it without mutating anything.

use serde::{Deserialize, Serialize};
use std::io::Write;

use crate::damage::HitOutcome;
use crate::{AbilityId, CombatState, ResourceTag, SimTime, UnitKind};

/// Current schema version. Bump when snapshot fields are added/removed/reordered.
pub const METRICS_VERSION: u32 = 1;

/// Bucket a hit is recorded under, picked from the ability's flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricsCategory {
    Melee,
    Spell,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionMetrics {
    pub ability: AbilityId,
    pub category: MetricsCategory,
    pub casts: u64,
    pub hits: u64,
    pub crits: u64,
    pub misses: u64,
    pub dodges: u64,
    pub negated: u64,
    pub total_damage: f64,
    pub total_threat: f64,
}

impl ActionMetrics {
    fn new(ability: AbilityId, category: MetricsCategory) -> Self {
        Self {
            ability,
            category,
            casts: 0,
            hits: 0,
            crits: 0,
            misses: 0,
            dodges: 0,
            negated: 0,
            total_damage: 0.0,
            total_threat: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceMetrics {
    pub tag: ResourceTag,
    pub events: u64,
    /// Requested amount, including any overflow past the pool's max.
    pub gain: f64,
    pub actual: f64,
}

impl ResourceMetrics {
    pub fn wasted(&self) -> f64 {
        self.gain - self.actual
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsLedger {
    actions: Vec<ActionMetrics>,
    resources: Vec<ResourceMetrics>,
}

impl MetricsLedger {
    fn action_mut(&mut self, ability: &AbilityId, category: MetricsCategory) -> &mut ActionMetrics {
        let index = match self
            .actions
            .iter()
            .position(|m| &m.ability == ability && m.category == category)
        {
            Some(index) => index,
            None => {
                self.actions.push(ActionMetrics::new(ability.clone(), category));
                self.actions.len() - 1
            }
        };
        &mut self.actions[index]
    }

    pub fn record_cast(&mut self, ability: &AbilityId, category: MetricsCategory) {
        self.action_mut(ability, category).casts += 1;
    }

    pub fn record_damage(
        &mut self,
        ability: &AbilityId,
        category: MetricsCategory,
        outcome: HitOutcome,
        amount: f64,
        threat: f64,
    ) {
        let metrics = self.action_mut(ability, category);
        match outcome {
            HitOutcome::Hit => metrics.hits += 1,
            HitOutcome::Crit => metrics.crits += 1,
            HitOutcome::Miss => metrics.misses += 1,
            HitOutcome::Dodge => metrics.dodges += 1,
        }
        metrics.total_damage += amount;
        metrics.total_threat += threat;
    }

    pub fn record_negated(&mut self, ability: &AbilityId, category: MetricsCategory) {
        self.action_mut(ability, category).negated += 1;
    }

    pub fn record_resource_gain(&mut self, tag: &ResourceTag, gain: f64, actual: f64) {
        let metrics = match self.resources.iter().position(|m| &m.tag == tag) {
            Some(index) => &mut self.resources[index],
            None => {
                self.resources.push(ResourceMetrics {
                    tag: tag.clone(),
                    events: 0,
                    gain: 0.0,
                    actual: 0.0,
                });
                let last = self.resources.len() - 1;
                &mut self.resources[last]
            }
        };
        metrics.events += 1;
        metrics.gain += gain;
        metrics.actual += actual;
    }

    pub fn action(
        &self,
        ability: &AbilityId,
        category: MetricsCategory,
    ) -> Option<&ActionMetrics> {
        self.actions
            .iter()
            .find(|m| &m.ability == ability && m.category == category)
    }

    pub fn resource(&self, tag: &ResourceTag) -> Option<&ResourceMetrics> {
        self.resources.iter().find(|m| &m.tag == tag)
    }

    pub fn actions(&self) -> &[ActionMetrics] {
        &self.actions
    }

    pub fn resources(&self) -> &[ResourceMetrics] {
        &self.resources
    }

    pub fn total_damage(&self) -> f64 {
        self.actions.iter().map(|m| m.total_damage).sum()
    }

    pub fn damage_in(&self, category: MetricsCategory) -> f64 {
        self.actions
            .iter()
            .filter(|m| m.category == category)
            .map(|m| m.total_damage)
            .sum()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub at_ms: u64,
    pub metrics_version: u32,

    // Damage
    pub total_damage: f64,
    pub dps: f64,
    pub melee_damage: f64,
    pub spell_damage: f64,

    // Outcomes
    pub casts: u64,
    pub hits: u64,
    pub crits: u64,
    pub misses: u64,
    pub dodges: u64,
    pub negated: u64,

    // Resources
    pub mana_gained: f64,
    pub mana_wasted: f64,

    // Units
    pub target_health_pct: f64,
    pub active_auras: u32,
}

#[allow(clippy::cast_possible_truncation)]
pub fn compute_metrics(state: &CombatState, now: SimTime) -> MetricsSnapshot {
    let ledger = &state.metrics;
    let total_damage = ledger.total_damage();
    let dps = if now.as_millis() > 0 {
        total_damage / now.as_secs_f64()
    } else {
        0.0
    };

    let mut casts = 0;
    let mut hits = 0;
    let mut crits = 0;
    let mut misses = 0;
    let mut dodges = 0;
    let mut negated = 0;
    for m in ledger.actions() {
        casts += m.casts;
        hits += m.hits;
        crits += m.crits;
        misses += m.misses;
        dodges += m.dodges;
        negated += m.negated;
    }

    let mana_gained = ledger.resources().iter().map(|m| m.actual).sum();
    let mana_wasted = ledger.resources().iter().map(ResourceMetrics::wasted).sum();

    let (health, max_health) = state
        .units
        .values()
        .filter(|unit| unit.kind == UnitKind::Target)
        .fold((0.0, 0.0), |(h, m), unit| (h + unit.health, m + unit.max_health));
    let target_health_pct = if max_health > 0.0 {
        health / max_health
    } else {
        0.0
    };

    let active_auras = state
        .units
        .values()
        .map(|unit| unit.auras.active_count())
        .sum::<usize>() as u32;

    MetricsSnapshot {
        at_ms: now.as_millis(),
        metrics_version: METRICS_VERSION,
        total_damage,
        dps,
        melee_damage: ledger.damage_in(MetricsCategory::Melee),
        spell_damage: ledger.damage_in(MetricsCategory::Spell),
        casts,
        hits,
        crits,
        misses,
        dodges,
        negated,
        mana_gained,
        mana_wasted,
        target_health_pct,
        active_auras,
    }
}

/// Write the CSV header row for metrics.
pub fn write_metrics_header(writer: &mut impl std::io::Write) -> std::io::Result<()> {
    writeln!(
        writer,
        "at_ms,metrics_version,\
         total_damage,dps,melee_damage,spell_damage,\
         casts,hits,crits,misses,dodges,negated,\
         mana_gained,mana_wasted,\
         target_health_pct,active_auras"
    )
}

/// Append a single metrics snapshot as a CSV row.
pub fn append_metrics_row(
    writer: &mut impl std::io::Write,
    snapshot: &MetricsSnapshot,
) -> std::io::Result<()> {
    writeln!(
        writer,
        "{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{}",
        snapshot.at_ms,
        snapshot.metrics_version,
        snapshot.total_damage,
        snapshot.dps,
        snapshot.melee_damage,
        snapshot.spell_damage,
        snapshot.casts,
        snapshot.hits,
        snapshot.crits,
        snapshot.misses,
        snapshot.dodges,
        snapshot.negated,
        snapshot.mana_gained,
        snapshot.mana_wasted,
        snapshot.target_health_pct,
        snapshot.active_auras,
    )
}

/// Write a collection of snapshots to a CSV file.
pub fn write_metrics_csv(
    path: &std::path::Path,
    snapshots: &[MetricsSnapshot],
) -> std::io::Result<()> {
    let mut file = std::io::BufWriter::new(std::fs::File::create(path)?);
    write_metrics_header(&mut file)?;
    for snapshot in snapshots {
        append_metrics_row(&mut file, snapshot)?;
    }
    file.flush()
}

/// Maximum data rows per CSV file before rotating to a new file.
const MAX_ROWS_PER_FILE: usize = 50_000;

/// Rotating metrics CSV writer. Splits into numbered files
/// (`metrics_000.csv`, `metrics_001.csv`, ...) after [`MAX_ROWS_PER_FILE`] rows each.
pub struct MetricsFileWriter {
    run_dir: std::path::PathBuf,
    file_index: u32,
    rows_in_current_file: usize,
    max_rows: usize,
    writer: std::io::BufWriter<std::fs::File>,
}

impl MetricsFileWriter {
    /// Create a new writer, opening the first CSV file with a header row.
    pub fn new(run_dir: std::path::PathBuf) -> std::io::Result<Self> {
        Self::with_max_rows(run_dir, MAX_ROWS_PER_FILE)
    }

    pub fn with_max_rows(run_dir: std::path::PathBuf, max_rows: usize) -> std::io::Result<Self> {
        let writer = open_csv_file(&run_dir, 0)?;
        Ok(Self {
            run_dir,
            file_index: 0,
            rows_in_current_file: 0,
            max_rows: max_rows.max(1),
            writer,
        })
    }

    /// Append one snapshot row, rotating to a new file if the current one is full.
    pub fn write_row(&mut self, snapshot: &MetricsSnapshot) -> std::io::Result<()> {
        if self.rows_in_current_file >= self.max_rows {
            self.writer.flush()?;
            self.file_index += 1;
            self.writer = open_csv_file(&self.run_dir, self.file_index)?;
            self.rows_in_current_file = 0;
        }
        append_metrics_row(&mut self.writer, snapshot)?;
        self.rows_in_current_file += 1;
        Ok(())
    }

    pub fn flush(&mut self) -> std::io::Result<()> {
        self.writer.flush()
    }

    pub fn files_written(&self) -> u32 {
        self.file_index + 1
    }
}

fn open_csv_file(
    run_dir: &std::path::Path,
    index: u32,
) -> std::io::Result<std::io::BufWriter<std::fs::File>> {
    let path = run_dir.join(format!("metrics_{index:03}.csv"));
    let file = std::fs::File::create(path)?;
    let mut writer = std::io::BufWriter::new(file);
    write_metrics_header(&mut writer)?;
    Ok(writer)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::{base_content, base_state};

    fn ability(name: &str) -> AbilityId {
        AbilityId(name.to_string())
    }

    #[test]
    fn damage_is_bucketed_by_category() {
        let mut ledger = MetricsLedger::default();
        let cs = ability("crusader_strike");
        ledger.record_damage(&cs, MetricsCategory::Melee, HitOutcome::Hit, 100.0, 100.0);
        ledger.record_damage(&cs, MetricsCategory::Spell, HitOutcome::Crit, 50.0, 50.0);
        ledger.record_damage(&cs, MetricsCategory::Melee, HitOutcome::Dodge, 0.0, 0.0);

        let melee = ledger.action(&cs, MetricsCategory::Melee).unwrap();
        assert_eq!(melee.hits, 1);
        assert_eq!(melee.dodges, 1);
        assert!((melee.total_damage - 100.0).abs() < 1e-9);

        let spell = ledger.action(&cs, MetricsCategory::Spell).unwrap();
        assert_eq!(spell.crits, 1);
        assert!((ledger.total_damage() - 150.0).abs() < 1e-9);
        assert!((ledger.damage_in(MetricsCategory::Spell) - 50.0).abs() < 1e-9);
    }

    #[test]
    fn resource_gain_tracks_waste() {
        let mut ledger = MetricsLedger::default();
        let tag = ResourceTag("crusader_strike:mana".to_string());
        ledger.record_resource_gain(&tag, 100.0, 100.0);
        ledger.record_resource_gain(&tag, 100.0, 0.0);
        let m = ledger.resource(&tag).unwrap();
        assert_eq!(m.events, 2);
        assert!((m.gain - 200.0).abs() < 1e-9);
        assert!((m.wasted() - 100.0).abs() < 1e-9);
    }

    #[test]
    fn snapshot_of_fresh_state_is_zeroed() {
        let content = base_content();
        let state = base_state(&content);
        let snapshot = compute_metrics(&state, SimTime::ZERO);
        assert_eq!(snapshot.metrics_version, METRICS_VERSION);
        assert_eq!(snapshot.casts, 0);
        assert!(snapshot.total_damage.abs() < f64::EPSILON);
        assert!(snapshot.dps.abs() < f64::EPSILON);
        assert!((snapshot.target_health_pct - 1.0).abs() < 1e-9);
    }

    #[test]
    fn snapshot_dps_divides_by_elapsed_seconds() {
        let content = base_content();
        let mut state = base_state(&content);
        state.metrics.record_damage(
            &ability("crusader_strike"),
            MetricsCategory::Melee,
            HitOutcome::Hit,
            900.0,
            900.0,
        );
        let snapshot = compute_metrics(&state, SimTime(3000));
        assert!((snapshot.dps - 300.0).abs() < 1e-9);
        assert!((snapshot.melee_damage - 900.0).abs() < 1e-9);
        assert_eq!(snapshot.hits, 1);
    }

    #[test]
    fn csv_has_one_row_per_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.csv");
        let content = base_content();
        let state = base_state(&content);
        let snapshots: Vec<_> = [1000, 2000]
            .into_iter()
            .map(|at| compute_metrics(&state, SimTime(at)))
            .collect();
        write_metrics_csv(&path, &snapshots).unwrap();

        let csv = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0].split(',').count(), lines[2].split(',').count());
        assert!(lines[2].starts_with("2000,1,"));
    }

    #[test]
    fn writer_rotates_after_max_rows() {
        let dir = tempfile::tempdir().unwrap();
        let content = base_content();
        let state = base_state(&content);
        let mut writer = MetricsFileWriter::with_max_rows(dir.path().to_path_buf(), 2).unwrap();
        for at in 0..5 {
            writer
                .write_row(&compute_metrics(&state, SimTime(at * 1000)))
                .unwrap();
        }
        writer.flush().unwrap();
        assert_eq!(writer.files_written(), 3);

        let first = std::fs::read_to_string(dir.path().join("metrics_000.csv")).unwrap();
        assert_eq!(first.lines().count(), 3);
        assert!(first.starts_with("at_ms,metrics_version,"));
        let last = std::fs::read_to_string(dir.path().join("metrics_002.csv")).unwrap();
        assert_eq!(last.lines().count(), 2);
    }
}
