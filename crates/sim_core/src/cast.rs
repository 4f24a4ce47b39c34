//! The cast pipeline.
//!
//! Everything a cast does happens at the cast instant except damage, which is
//! rolled now and applied one batch window later by a low-priority scheduled
//! action. The resolution carries a copy of the ability's flags from cast time so
//! metrics land in the right bucket even if the shared ability changed meanwhile.

use std::sync::Arc;

use crate::ability::{Ability, GcdPolicy, SpellFlags};
use crate::aura::ExpiryExtension;
use crate::cooldown::gcd_timer;
use crate::damage::{
    base_damage, calc_outcome, deal_damage, DamageApplication, DamageResult, NegationReason,
};
use crate::engine::{apply_aura, Encounter};
use crate::resources::{add_resource, ResourceGain};
use crate::scheduler::{ActionPriority, Scheduler};
use crate::{
    emit, AbilityId, AuraId, CombatState, Event, EventEnvelope, EventLevel, SimTime, UnitId,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CastRequest {
    pub ability: AbilityId,
    pub caster: UnitId,
    pub target: UnitId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotReadyReason {
    UnknownAbility,
    NotCastersAbility,
    UnknownCaster,
    CasterDead,
    OnCooldown { ready_at: SimTime },
    GlobalCooldown { ready_at: SimTime },
    InsufficientMana,
}

impl std::fmt::Display for NotReadyReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotReadyReason::UnknownAbility => f.write_str("ability not registered"),
            NotReadyReason::NotCastersAbility => f.write_str("ability belongs to another unit"),
            NotReadyReason::UnknownCaster => f.write_str("unknown caster"),
            NotReadyReason::CasterDead => f.write_str("caster dead"),
            NotReadyReason::OnCooldown { ready_at } => write!(f, "on cooldown until {ready_at}"),
            NotReadyReason::GlobalCooldown { ready_at } => {
                write!(f, "global cooldown until {ready_at}")
            }
            NotReadyReason::InsufficientMana => f.write_str("not enough mana"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidTargetReason {
    Unknown,
    Dead,
    Immune,
}

impl std::fmt::Display for InvalidTargetReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            InvalidTargetReason::Unknown => "unknown target",
            InvalidTargetReason::Dead => "target dead",
            InvalidTargetReason::Immune => "target immune",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CastReport {
    pub resolves_at: SimTime,
    pub provisional: DamageResult,
    pub refund: Option<ResourceGain>,
    pub extended: Vec<(AuraId, ExpiryExtension)>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CastOutcome {
    Cast(CastReport),
    NotReady { reason: NotReadyReason },
    InvalidTarget { reason: InvalidTargetReason },
}

impl CastOutcome {
    pub fn is_cast(&self) -> bool {
        matches!(self, CastOutcome::Cast(_))
    }
}

/// Why `check_ready` turned a request down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rejection {
    NotReady(NotReadyReason),
    InvalidTarget(InvalidTargetReason),
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Rejection::NotReady(reason) => std::fmt::Display::fmt(reason, f),
            Rejection::InvalidTarget(reason) => std::fmt::Display::fmt(reason, f),
        }
    }
}

impl From<Rejection> for CastOutcome {
    fn from(rejection: Rejection) -> Self {
        match rejection {
            Rejection::NotReady(reason) => CastOutcome::NotReady { reason },
            Rejection::InvalidTarget(reason) => CastOutcome::InvalidTarget { reason },
        }
    }
}

/// One cast in flight: the rolled result and the flags it is attributed under.
#[derive(Debug, Clone)]
pub struct CastInstance {
    pub ability: AbilityId,
    pub caster: UnitId,
    pub target: UnitId,
    pub cast_at: SimTime,
    pub attribution_flags: SpellFlags,
    pub provisional: DamageResult,
}

impl CastInstance {
    /// Apply the provisional result with the cast-time flags swapped onto the
    /// shared ability, then put back whatever flags were live before.
    pub fn resolve(
        self,
        state: &mut CombatState,
        now: SimTime,
        events: &mut Vec<EventEnvelope>,
    ) -> DamageApplication {
        let Some(ability) = state.abilities.get_mut(&self.ability) else {
            return DamageApplication::Negated(NegationReason::UnknownAbility);
        };
        let live = std::mem::replace(&mut ability.flags, self.attribution_flags);

        let applied = deal_damage(state, &self.ability, &self.provisional, now, events);

        if let Some(ability) = state.abilities.get_mut(&self.ability) {
            ability.flags = live;
        }
        tracing::debug!(
            ability = %self.ability,
            target = %self.target,
            cast_at = self.cast_at.as_millis(),
            at = now.as_millis(),
            ?applied,
            "cast resolved"
        );
        applied
    }
}

fn check_ready(
    state: &CombatState,
    request: &CastRequest,
    now: SimTime,
) -> Result<Ability, Rejection> {
    let not_ready = |reason| Err(Rejection::NotReady(reason));

    let Some(ability) = state.abilities.get(&request.ability) else {
        return not_ready(NotReadyReason::UnknownAbility);
    };
    if ability.caster != request.caster {
        return not_ready(NotReadyReason::NotCastersAbility);
    }
    let Some(caster) = state.units.get(&request.caster) else {
        return not_ready(NotReadyReason::UnknownCaster);
    };
    if !caster.is_alive() {
        return not_ready(NotReadyReason::CasterDead);
    }
    if !caster.cooldowns.is_ready(&ability.cooldown_timer, now) {
        return not_ready(NotReadyReason::OnCooldown {
            ready_at: caster.cooldowns.ready_at(&ability.cooldown_timer),
        });
    }
    if ability.gcd == GcdPolicy::Default && !caster.cooldowns.is_ready(&gcd_timer(), now) {
        return not_ready(NotReadyReason::GlobalCooldown {
            ready_at: caster.cooldowns.ready_at(&gcd_timer()),
        });
    }
    if ability.mana_cost > caster.mana.current {
        return not_ready(NotReadyReason::InsufficientMana);
    }

    let invalid = |reason| Err(Rejection::InvalidTarget(reason));
    match state.units.get(&request.target) {
        None => invalid(InvalidTargetReason::Unknown),
        Some(target) if !target.is_alive() => invalid(InvalidTargetReason::Dead),
        Some(target) if target.immune => invalid(InvalidTargetReason::Immune),
        Some(_) => Ok(ability.clone()),
    }
}

/// Cast `request.ability` at the scheduler's current time.
///
/// A rejected cast leaves units, abilities, and metrics untouched.
#[allow(clippy::too_many_lines)]
pub fn cast(
    encounter: &mut Encounter,
    scheduler: &mut Scheduler<Encounter>,
    request: &CastRequest,
) -> CastOutcome {
    let now = scheduler.now();
    let ability = match check_ready(&encounter.state, request, now) {
        Ok(ability) => ability,
        Err(rejection) => {
            let reason = rejection.to_string();
            tracing::debug!(ability = %request.ability, at = now.as_millis(), %reason, "cast rejected");
            encounter.events.push(emit(
                &mut encounter.state.counters,
                now,
                Event::CastRejected {
                    ability: request.ability.clone(),
                    caster: request.caster.clone(),
                    target: request.target.clone(),
                    reason,
                },
            ));
            return rejection.into();
        }
    };
    let content = Arc::clone(&encounter.content);
    let constants = &content.constants;

    // Cooldown, GCD, and cost.
    if let Some(caster) = encounter.state.units.get_mut(&request.caster) {
        caster
            .cooldowns
            .start(&ability.cooldown_timer, now, ability.cooldown_ms);
        if ability.gcd == GcdPolicy::Default {
            caster.cooldowns.start(&gcd_timer(), now, constants.gcd_ms);
        }
        if ability.mana_cost > 0.0 && caster.mana.spend(ability.mana_cost) {
            encounter.events.push(emit(
                &mut encounter.state.counters,
                now,
                Event::ResourceSpent {
                    unit: request.caster.clone(),
                    tag: ability.mana_metrics.clone(),
                    amount: ability.mana_cost,
                },
            ));
        }
    }
    if !ability.flags.contains(SpellFlags::NO_METRICS) {
        encounter
            .state
            .metrics
            .record_cast(&ability.id, ability.flags.metrics_category());
    }

    // Provisional result, rolled in cast order.
    let provisional = {
        let units = &encounter.state.units;
        let (Some(caster), Some(target)) = (units.get(&request.caster), units.get(&request.target))
        else {
            return CastOutcome::InvalidTarget {
                reason: InvalidTargetReason::Unknown,
            };
        };
        let amount = base_damage(ability.damage, caster, constants, &mut encounter.rng)
            * ability.damage_multiplier;
        calc_outcome(amount, caster, target, ability.outcome, constants, &mut encounter.rng)
    };
    if encounter.event_level == EventLevel::Debug {
        encounter.events.push(emit(
            &mut encounter.state.counters,
            now,
            Event::OutcomeRolled {
                ability: ability.id.clone(),
                roll: provisional.roll,
                outcome: provisional.outcome,
            },
        ));
    }

    // Refund, whatever happens to the damage later.
    let refund = if ability.refund_fraction > 0.0 {
        let max_mana = encounter
            .state
            .units
            .get(&request.caster)
            .map_or(0.0, |caster| caster.mana.max);
        add_resource(
            &mut encounter.state,
            &request.caster,
            ability.refund_fraction * max_mana,
            &ability.mana_metrics,
            now,
            &mut encounter.events,
        )
    } else {
        None
    };

    // Deferred resolution.
    let resolves_at = now.after(constants.batch_window_ms);
    let instance = CastInstance {
        ability: ability.id.clone(),
        caster: request.caster.clone(),
        target: request.target.clone(),
        cast_at: now,
        attribution_flags: ability.flags,
        provisional: provisional.clone(),
    };
    scheduler.schedule_at(
        resolves_at,
        ActionPriority::Low,
        "resolve_cast",
        move |encounter: &mut Encounter, scheduler: &mut Scheduler<Encounter>| {
            instance.resolve(&mut encounter.state, scheduler.now(), &mut encounter.events);
        },
    );
    encounter.events.push(emit(
        &mut encounter.state.counters,
        now,
        Event::CastSucceeded {
            ability: ability.id.clone(),
            caster: request.caster.clone(),
            target: request.target.clone(),
            resolves_at,
        },
    ));

    let extended = extend_target_auras(encounter, &ability, &request.target, now);

    if let Some(aura) = &ability.applies_aura {
        apply_aura(encounter, scheduler, &request.target, aura);
    }

    tracing::debug!(
        ability = %ability.id,
        caster = %request.caster,
        target = %request.target,
        at = now.as_millis(),
        resolves_at = resolves_at.as_millis(),
        outcome = ?provisional.outcome,
        extended = extended.len(),
        "cast accepted"
    );

    CastOutcome::Cast(CastReport {
        resolves_at,
        provisional,
        refund,
        extended,
    })
}

/// Push every active, finite aura under the ability's extension tag out to
/// `now + duration`.
fn extend_target_auras(
    encounter: &mut Encounter,
    ability: &Ability,
    target: &UnitId,
    now: SimTime,
) -> Vec<(AuraId, ExpiryExtension)> {
    let Some(extension) = &ability.extends_auras else {
        return Vec::new();
    };
    let Some(unit) = encounter.state.units.get_mut(target) else {
        return Vec::new();
    };
    let new_expiry = now.after(extension.duration_ms);
    let candidates: Vec<AuraId> = unit
        .auras
        .with_tag(&extension.tag)
        .filter(|aura| aura.expires.is_finite())
        .map(|aura| aura.id.clone())
        .collect();

    let mut extended = Vec::new();
    for id in candidates {
        if let Some(ext) = unit.auras.extend_expiration(&id, new_expiry) {
            extended.push((id, ext));
        }
    }
    for (id, ext) in &extended {
        encounter.events.push(emit(
            &mut encounter.state.counters,
            now,
            Event::AuraExtended {
                unit: target.clone(),
                aura: id.clone(),
                from: ext.from,
                to: ext.to,
            },
        ));
    }
    extended
}
