//! Mana pools and the resource ledger.

use serde::{Deserialize, Serialize};

use crate::{emit, CombatState, Event, EventEnvelope, ResourceTag, SimTime, UnitId};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourcePool {
    pub current: f64,
    pub max: f64,
}

impl ResourcePool {
    pub fn full(max: f64) -> Self {
        Self { current: max, max }
    }

    /// Add up to `amount`, capped at `max`. Returns the amount actually gained.
    pub fn add(&mut self, amount: f64) -> f64 {
        let before = self.current;
        self.current = (self.current + amount).min(self.max);
        self.current - before
    }

    /// Spend `amount` if available.
    pub fn spend(&mut self, amount: f64) -> bool {
        if amount > self.current {
            return false;
        }
        self.current -= amount;
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResourceGain {
    pub amount: f64,
    pub actual: f64,
}

/// Credit mana to `unit` and record it under `tag`. Always succeeds for a known
/// unit; overflow past max is recorded as wasted.
pub fn add_resource(
    state: &mut CombatState,
    unit: &UnitId,
    amount: f64,
    tag: &ResourceTag,
    now: SimTime,
    events: &mut Vec<EventEnvelope>,
) -> Option<ResourceGain> {
    let actual = state.units.get_mut(unit)?.mana.add(amount);
    state.metrics.record_resource_gain(tag, amount, actual);
    events.push(emit(
        &mut state.counters,
        now,
        Event::ResourceGained {
            unit: unit.clone(),
            tag: tag.clone(),
            amount,
            actual,
        },
    ));
    Some(ResourceGain { amount, actual })
}
