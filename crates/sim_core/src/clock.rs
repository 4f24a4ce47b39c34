use crate::SimTime;

/// Monotonic simulation clock. Only the scheduler moves it forward.
#[derive(Debug, Clone, Default)]
pub struct SimClock {
    now: SimTime,
}

impl SimClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now(&self) -> SimTime {
        self.now
    }

    /// Jump to `to`. Moving backwards is a causality violation.
    pub(crate) fn advance_to(&mut self, to: SimTime) {
        assert!(
            to >= self.now,
            "causality violation: clock asked to move back from {} to {}",
            self.now,
            to,
        );
        self.now = to;
    }
}
