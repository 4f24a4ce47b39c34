use super::*;
use crate::cast::{InvalidTargetReason, NotReadyReason};
use crate::metrics::MetricsCategory;
use crate::test_fixtures::{
    base_content, base_encounter, base_state, crusader_strike_id, judgement_id, paladin_id,
    target_id,
};
use std::sync::Arc;

mod scenario;
mod script;

// --- Shared test helpers ------------------------------------------------

/// Guaranteed plain hit for 381.6: (150 + 1400 / 14 * 3.3) * 0.75 * 1.06.
const CERTAIN_HIT_DAMAGE: f64 = 381.6;

fn setup() -> (Encounter, Scheduler<Encounter>) {
    base_encounter(base_content())
}

fn crusader_strike() -> CastRequest {
    CastRequest {
        ability: crusader_strike_id(),
        caster: paladin_id(),
        target: target_id(),
    }
}

fn judgement() -> CastRequest {
    CastRequest {
        ability: judgement_id(),
        caster: paladin_id(),
        target: target_id(),
    }
}

/// Fixed weapon roll, no miss/dodge/crit.
fn guarantee_hits(encounter: &mut Encounter) {
    let paladin = encounter.state.units.get_mut(&paladin_id()).unwrap();
    paladin.hit_chance = 1.0;
    paladin.crit_chance = 0.0;
    paladin.weapon.min_damage = 150.0;
    paladin.weapon.max_damage = 150.0;
    encounter.state.units.get_mut(&target_id()).unwrap().dodge_chance = 0.0;
}

fn set_mana(encounter: &mut Encounter, current: f64) {
    encounter
        .state
        .units
        .get_mut(&paladin_id())
        .unwrap()
        .mana
        .current = current;
}

fn mana(encounter: &Encounter) -> f64 {
    encounter.state.units[&paladin_id()].mana.current
}

fn target_health(encounter: &Encounter) -> f64 {
    encounter.state.units[&target_id()].health
}

fn target_max_health(encounter: &Encounter) -> f64 {
    encounter.state.units[&target_id()].max_health
}

fn aura(name: &str) -> AuraId {
    AuraId(name.to_string())
}

fn apply_to_target(
    encounter: &mut Encounter,
    scheduler: &mut Scheduler<Encounter>,
    name: &str,
) -> Expiry {
    apply_aura(encounter, scheduler, &target_id(), &aura(name)).unwrap()
}

fn target_aura(encounter: &Encounter, name: &str) -> crate::aura::Aura {
    encounter.state.units[&target_id()]
        .auras
        .get(&aura(name))
        .unwrap()
        .clone()
}

fn refund_tag() -> ResourceTag {
    ResourceTag("crusader_strike:mana".to_string())
}

fn refund_events(encounter: &Encounter) -> u64 {
    encounter
        .state
        .metrics
        .resource(&refund_tag())
        .map_or(0, |m| m.events)
}

fn melee_metrics(encounter: &Encounter) -> Option<&crate::metrics::ActionMetrics> {
    encounter
        .state
        .metrics
        .action(&crusader_strike_id(), MetricsCategory::Melee)
}

fn expect_cast(outcome: CastOutcome) -> CastReport {
    match outcome {
        CastOutcome::Cast(report) => report,
        other => panic!("expected a successful cast, got {other:?}"),
    }
}

fn script(entries: Vec<ScriptEntry>) -> CastScript {
    CastScript {
        name: "test".to_string(),
        entries,
    }
}

fn cast_entry(at_ms: u64, every_ms: Option<u64>, ability: AbilityId) -> ScriptEntry {
    ScriptEntry {
        at_ms,
        every_ms,
        action: ScriptAction::Cast {
            ability,
            caster: paladin_id(),
            target: target_id(),
        },
    }
}
