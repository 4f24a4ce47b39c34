//! Damage formulas, the outcome roll, and damage application.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::ability::{DamageFormula, OutcomeRoll, SpellFlags};
use crate::{emit, AbilityId, CombatState, Constants, Event, EventEnvelope, SimTime, Unit, UnitId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HitOutcome {
    Miss,
    Dodge,
    Hit,
    Crit,
}

impl HitOutcome {
    pub fn landed(self) -> bool {
        matches!(self, HitOutcome::Hit | HitOutcome::Crit)
    }
}

/// A fully rolled damage outcome, computed at cast time and applied later.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DamageResult {
    pub target: UnitId,
    pub amount: f64,
    pub outcome: HitOutcome,
    pub roll: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegationReason {
    UnknownAbility,
    UnknownTarget,
    TargetDead,
    TargetImmune,
}

impl std::fmt::Display for NegationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            NegationReason::UnknownAbility => "unknown ability",
            NegationReason::UnknownTarget => "unknown target",
            NegationReason::TargetDead => "target dead",
            NegationReason::TargetImmune => "target immune",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DamageApplication {
    Applied { amount: f64, killed: bool },
    Negated(NegationReason),
}

/// Rolled main-hand weapon damage plus `attack_power` at the weapon's normalized speed.
pub fn normalized_weapon_damage(
    unit: &Unit,
    attack_power: f64,
    constants: &Constants,
    rng: &mut impl Rng,
) -> f64 {
    let weapon = &unit.weapon;
    roll_between(weapon.min_damage, weapon.max_damage, rng)
        + attack_power / constants.attack_power_per_dps * weapon.kind.normalized_speed()
}

/// Pre-outcome damage for `formula`, before the ability multiplier.
pub fn base_damage(
    formula: DamageFormula,
    caster: &Unit,
    constants: &Constants,
    rng: &mut impl Rng,
) -> f64 {
    match formula {
        DamageFormula::NormalizedWeapon => {
            normalized_weapon_damage(caster, caster.attack_power, constants, rng)
        }
        DamageFormula::Flat { min, max } => roll_between(min, max, rng),
    }
}

fn roll_between(min: f64, max: f64, rng: &mut impl Rng) -> f64 {
    if max > min {
        rng.gen_range(min..=max)
    } else {
        min
    }
}

/// Roll hit/crit/miss on a single table and scale `amount` accordingly.
pub fn calc_outcome(
    amount: f64,
    attacker: &Unit,
    target: &Unit,
    roll_kind: OutcomeRoll,
    constants: &Constants,
    rng: &mut impl Rng,
) -> DamageResult {
    let (outcome, roll) = match roll_kind {
        OutcomeRoll::MeleeSpecialHitAndCrit => {
            let roll: f64 = rng.gen();
            let miss = (constants.melee_miss_chance - attacker.hit_chance).max(0.0);
            let dodge = miss + target.dodge_chance;
            let crit = dodge + attacker.crit_chance;
            let outcome = if roll < miss {
                HitOutcome::Miss
            } else if roll < dodge {
                HitOutcome::Dodge
            } else if roll < crit {
                HitOutcome::Crit
            } else {
                HitOutcome::Hit
            };
            (outcome, roll)
        }
        OutcomeRoll::SpellHitAndCrit => {
            let roll: f64 = rng.gen();
            let miss = (constants.spell_miss_chance - attacker.hit_chance).max(0.0);
            let crit = miss + attacker.crit_chance;
            let outcome = if roll < miss {
                HitOutcome::Miss
            } else if roll < crit {
                HitOutcome::Crit
            } else {
                HitOutcome::Hit
            };
            (outcome, roll)
        }
        OutcomeRoll::AlwaysHit => (HitOutcome::Hit, 0.0),
    };

    let crit_multiplier = match roll_kind {
        OutcomeRoll::MeleeSpecialHitAndCrit => constants.melee_crit_multiplier,
        OutcomeRoll::SpellHitAndCrit | OutcomeRoll::AlwaysHit => constants.spell_crit_multiplier,
    };
    let scaled = match outcome {
        HitOutcome::Miss | HitOutcome::Dodge => 0.0,
        HitOutcome::Hit => amount,
        HitOutcome::Crit => amount * crit_multiplier,
    };

    DamageResult {
        target: target.id.clone(),
        amount: scaled,
        outcome,
        roll,
    }
}

/// Apply a rolled result to its target and record metrics under the ability's
/// current flags. The damage is negated if the target died or became immune
/// since the roll.
pub fn deal_damage(
    state: &mut CombatState,
    ability_id: &AbilityId,
    result: &DamageResult,
    now: SimTime,
    events: &mut Vec<EventEnvelope>,
) -> DamageApplication {
    let Some(ability) = state.abilities.get(ability_id) else {
        return DamageApplication::Negated(NegationReason::UnknownAbility);
    };
    let category = ability.flags.metrics_category();
    let record_metrics = !ability.flags.contains(SpellFlags::NO_METRICS);
    let threat_multiplier = ability.threat_multiplier;

    let negation = match state.units.get(&result.target) {
        None => Some(NegationReason::UnknownTarget),
        Some(target) if !target.is_alive() => Some(NegationReason::TargetDead),
        Some(target) if target.immune => Some(NegationReason::TargetImmune),
        Some(_) => None,
    };
    if let Some(reason) = negation {
        if record_metrics {
            state.metrics.record_negated(ability_id, category);
        }
        events.push(emit(
            &mut state.counters,
            now,
            Event::DamageNegated {
                ability: ability_id.clone(),
                target: result.target.clone(),
                reason: reason.to_string(),
            },
        ));
        return DamageApplication::Negated(reason);
    }

    let Some(target) = state.units.get_mut(&result.target) else {
        return DamageApplication::Negated(NegationReason::UnknownTarget);
    };
    target.health = (target.health - result.amount).max(0.0);
    let killed = result.amount > 0.0 && !target.is_alive();

    if record_metrics {
        state.metrics.record_damage(
            ability_id,
            category,
            result.outcome,
            result.amount,
            result.amount * threat_multiplier,
        );
    }
    events.push(emit(
        &mut state.counters,
        now,
        Event::DamageResolved {
            ability: ability_id.clone(),
            target: result.target.clone(),
            amount: result.amount,
            outcome: result.outcome,
            category,
        },
    ));
    if killed {
        events.push(emit(
            &mut state.counters,
            now,
            Event::UnitDied {
                unit: result.target.clone(),
            },
        ));
    }

    DamageApplication::Applied {
        amount: result.amount,
        killed,
    }
}
