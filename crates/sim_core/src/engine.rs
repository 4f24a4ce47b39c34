use std::sync::Arc;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::ability::SpellFlags;
use crate::cast::{cast, CastRequest};
use crate::metrics::{compute_metrics, MetricsSnapshot};
use crate::scheduler::{ActionPriority, Scheduler};
use crate::{
    emit, AbilityId, AuraId, CastScript, CombatContent, CombatState, Event, EventEnvelope,
    EventLevel, Expiry, ScriptAction, ScriptEntry, SimTime, UnitId,
};

/// Everything a scheduled action may touch during one encounter.
pub struct Encounter {
    pub content: Arc<CombatContent>,
    pub state: CombatState,
    pub rng: ChaCha8Rng,
    pub events: Vec<EventEnvelope>,
    pub event_level: EventLevel,
}

impl Encounter {
    pub fn new(
        content: Arc<CombatContent>,
        state: CombatState,
        seed: u64,
        event_level: EventLevel,
    ) -> Self {
        Self {
            content,
            state,
            rng: ChaCha8Rng::seed_from_u64(seed),
            events: Vec::new(),
            event_level,
        }
    }

    /// Drain the event log collected so far.
    pub fn take_events(&mut self) -> Vec<EventEnvelope> {
        std::mem::take(&mut self.events)
    }
}

/// Apply (or refresh) `aura` on `unit` and schedule its expiry check.
/// Returns the new expiry, or `None` if the unit or aura is unknown.
pub fn apply_aura(
    encounter: &mut Encounter,
    scheduler: &mut Scheduler<Encounter>,
    unit: &UnitId,
    aura: &AuraId,
) -> Option<Expiry> {
    let now = scheduler.now();
    let def = encounter.content.aura_def(aura)?;
    let expires = def.expiry_from(now);
    let tag = def.tag.clone();
    encounter
        .state
        .units
        .get_mut(unit)?
        .auras
        .apply(aura.clone(), tag, expires, now);

    encounter.events.push(emit(
        &mut encounter.state.counters,
        now,
        Event::AuraApplied {
            unit: unit.clone(),
            aura: aura.clone(),
            expires,
        },
    ));
    if let Expiry::At(at) = expires {
        arm_expiry_check(&mut encounter.state, scheduler, unit, aura, at);
    }
    Some(expires)
}

/// Deactivate `aura` on `unit` before its natural expiry.
pub fn remove_aura(encounter: &mut Encounter, now: SimTime, unit: &UnitId, aura: &AuraId) -> bool {
    let removed = encounter
        .state
        .units
        .get_mut(unit)
        .is_some_and(|u| u.auras.deactivate(aura));
    if removed {
        encounter.events.push(emit(
            &mut encounter.state.counters,
            now,
            Event::AuraRemoved {
                unit: unit.clone(),
                aura: aura.clone(),
            },
        ));
    }
    removed
}

/// Queue an expiry check for `aura` at `at` unless one is already queued at or
/// before it.
fn arm_expiry_check(
    state: &mut CombatState,
    scheduler: &mut Scheduler<Encounter>,
    unit: &UnitId,
    aura: &AuraId,
    at: SimTime,
) {
    let armed = state
        .units
        .get_mut(unit)
        .is_some_and(|u| u.auras.arm_expiry_check(aura, at));
    if armed {
        schedule_expiry_check(scheduler, unit.clone(), aura.clone(), at);
    }
}

/// Expiry checks run at high priority so an aura that runs out at `t` is gone
/// before anything else at `t` queries it. A check superseded by an earlier
/// one returns without doing anything.
fn schedule_expiry_check(
    scheduler: &mut Scheduler<Encounter>,
    unit: UnitId,
    aura: AuraId,
    at: SimTime,
) {
    scheduler.schedule_at(
        at,
        ActionPriority::High,
        "aura_expiry",
        move |encounter: &mut Encounter, scheduler: &mut Scheduler<Encounter>| {
            let now = scheduler.now();
            let Some(claimed) = encounter
                .state
                .units
                .get_mut(&unit)
                .and_then(|u| u.auras.claim_expiry_check(&aura, at))
                .filter(|a| a.is_active())
                .map(|a| a.expires)
            else {
                return;
            };
            match claimed {
                Expiry::At(due) if due <= now => {
                    if let Some(u) = encounter.state.units.get_mut(&unit) {
                        u.auras.deactivate(&aura);
                    }
                    tracing::debug!(unit = %unit, aura = %aura, at = now.as_millis(), "aura expired");
                    encounter.events.push(emit(
                        &mut encounter.state.counters,
                        now,
                        Event::AuraExpired { unit, aura },
                    ));
                }
                // Extended since this check was queued.
                Expiry::At(due) => {
                    arm_expiry_check(&mut encounter.state, scheduler, &unit, &aura, due);
                }
                Expiry::Never => {}
            }
        },
    );
}

fn update_flags(
    encounter: &mut Encounter,
    now: SimTime,
    ability: &AbilityId,
    change: impl FnOnce(&mut SpellFlags),
) {
    let Some(entry) = encounter.state.abilities.get_mut(ability) else {
        return;
    };
    change(&mut entry.flags);
    let flags = entry.flags;
    encounter.events.push(emit(
        &mut encounter.state.counters,
        now,
        Event::FlagsChanged {
            ability: ability.clone(),
            flags,
        },
    ));
}

fn run_script_action(
    encounter: &mut Encounter,
    scheduler: &mut Scheduler<Encounter>,
    action: &ScriptAction,
) {
    let now = scheduler.now();
    match action {
        ScriptAction::Cast {
            ability,
            caster,
            target,
        } => {
            cast(
                encounter,
                scheduler,
                &CastRequest {
                    ability: ability.clone(),
                    caster: caster.clone(),
                    target: target.clone(),
                },
            );
        }
        ScriptAction::ApplyAura { unit, aura } => {
            apply_aura(encounter, scheduler, unit, aura);
        }
        ScriptAction::RemoveAura { unit, aura } => {
            remove_aura(encounter, now, unit, aura);
        }
        ScriptAction::SetFlags { ability, flags } => {
            update_flags(encounter, now, ability, |live| live.insert(*flags));
        }
        ScriptAction::ClearFlags { ability, flags } => {
            update_flags(encounter, now, ability, |live| live.remove(*flags));
        }
    }
}

fn schedule_script_entry(scheduler: &mut Scheduler<Encounter>, entry: ScriptEntry, end: SimTime) {
    let due = SimTime(entry.at_ms);
    if due > end {
        return;
    }
    scheduler.schedule_at(
        due,
        ActionPriority::Normal,
        "script",
        move |encounter: &mut Encounter, scheduler: &mut Scheduler<Encounter>| {
            run_script_action(encounter, scheduler, &entry.action);
            if let Some(every) = entry.every_ms.filter(|ms| *ms > 0) {
                let next = ScriptEntry {
                    at_ms: scheduler.now().after(every).as_millis(),
                    ..entry
                };
                schedule_script_entry(scheduler, next, end);
            }
        },
    );
}

/// Queue every script entry that falls inside the encounter.
pub fn load_script(scheduler: &mut Scheduler<Encounter>, script: &CastScript, end: SimTime) {
    for entry in &script.entries {
        schedule_script_entry(scheduler, entry.clone(), end);
    }
}

/// Output of a finished encounter.
#[derive(Debug, Clone)]
pub struct EncounterOutput {
    pub state: CombatState,
    pub events: Vec<EventEnvelope>,
    pub snapshot: MetricsSnapshot,
    pub actions_executed: u64,
}

/// Drives one encounter forward in steps so callers can sample metrics between them.
pub struct EncounterRunner {
    pub encounter: Encounter,
    pub scheduler: Scheduler<Encounter>,
    end: SimTime,
}

impl EncounterRunner {
    pub fn new(
        content: Arc<CombatContent>,
        state: CombatState,
        script: &CastScript,
        seed: u64,
        duration_ms: u64,
        event_level: EventLevel,
    ) -> Self {
        let end = SimTime(duration_ms);
        let mut scheduler = Scheduler::new();

        let mut encounter = Encounter::new(content, state, seed, event_level);

        // Auras already on units at spawn still need their expiry checks.
        let mut initial = Vec::new();
        for unit in encounter.state.units.values() {
            for (aura, at) in unit.auras.finite_active() {
                initial.push((unit.id.clone(), aura, at));
            }
        }
        for (unit, aura, at) in initial {
            arm_expiry_check(&mut encounter.state, &mut scheduler, &unit, &aura, at);
        }
        load_script(&mut scheduler, script, end);

        Self {
            encounter,
            scheduler,
            end,
        }
    }

    pub fn now(&self) -> SimTime {
        self.scheduler.now()
    }

    pub fn end(&self) -> SimTime {
        self.end
    }

    pub fn is_finished(&self) -> bool {
        self.scheduler.now() >= self.end
    }

    /// Run every action due up to `until`, capped at the encounter end.
    pub fn advance_to(&mut self, until: SimTime) {
        let until = until.min(self.end).max(self.scheduler.now());
        self.scheduler.run_until(&mut self.encounter, until);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        compute_metrics(&self.encounter.state, self.scheduler.now())
    }

    pub fn finish(mut self) -> EncounterOutput {
        self.advance_to(self.end);
        let snapshot = self.snapshot();
        tracing::info!(
            encounter = %self.encounter.state.meta.encounter_id,
            seed = self.encounter.state.meta.seed,
            at = self.scheduler.now().as_millis(),
            total_damage = snapshot.total_damage,
            dps = snapshot.dps,
            "encounter finished"
        );
        EncounterOutput {
            actions_executed: self.scheduler.executed(),
            events: self.encounter.take_events(),
            state: self.encounter.state,
            snapshot,
        }
    }
}

/// Replay `script` against `state` for `duration_ms` with rolls seeded by `seed`.
pub fn simulate(
    content: Arc<CombatContent>,
    state: CombatState,
    script: &CastScript,
    seed: u64,
    duration_ms: u64,
    event_level: EventLevel,
) -> EncounterOutput {
    EncounterRunner::new(content, state, script, seed, duration_ms, event_level).finish()
}
