use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{SimTime, TimerId};

/// Timer id of a unit's global cooldown.
pub fn gcd_timer() -> TimerId {
    TimerId("gcd".to_string())
}

/// Per-unit cooldown timers. A timer that was never started is ready.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CooldownTimers {
    ready_at: BTreeMap<TimerId, SimTime>,
}

impl CooldownTimers {
    pub fn start(&mut self, timer: &TimerId, now: SimTime, duration_ms: u64) {
        self.ready_at.insert(timer.clone(), now.after(duration_ms));
    }

    pub fn is_ready(&self, timer: &TimerId, now: SimTime) -> bool {
        self.ready_at(timer) <= now
    }

    pub fn ready_at(&self, timer: &TimerId) -> SimTime {
        self.ready_at.get(timer).copied().unwrap_or(SimTime::ZERO)
    }
}
