//! `sim_core`: deterministic combat encounter core.
//!
//! No IO outside the metrics CSV writer, no network. All randomness comes from the
//! encounter's seeded RNG.

pub mod ability;
pub mod aura;
pub mod cast;
mod clock;
pub mod cooldown;
pub mod damage;
mod engine;
mod id;
pub mod metrics;
pub mod resources;
pub mod scheduler;
mod types;

#[cfg(any(test, feature = "test-support"))]
pub mod test_fixtures;

pub use ability::{
    Ability, AbilityRegistry, ClassSpellMask, DamageFormula, GcdPolicy, OutcomeRoll, SpellFlags,
};
pub use cast::{cast, CastInstance, CastOutcome, CastReport, CastRequest};
pub use clock::SimClock;
pub use engine::{
    apply_aura, load_script, remove_aura, simulate, Encounter, EncounterOutput, EncounterRunner,
};
pub use id::{encounter_id, generate_uuid};
pub use metrics::{compute_metrics, write_metrics_csv, MetricsFileWriter, MetricsSnapshot};
pub use scheduler::{ActionPriority, DelayedAction, Scheduler};
pub use types::*;

pub(crate) fn emit(counters: &mut Counters, at: SimTime, event: Event) -> EventEnvelope {
    let id = EventId(format!("evt_{:06}", counters.next_event_id));
    counters.next_event_id += 1;
    EventEnvelope { id, at, event }
}

#[cfg(test)]
mod tests;
