//! Discrete-event scheduler.
//!
//! Pending actions live in a min-heap keyed by `(due_at, priority, sequence)`:
//! earliest time first, then higher priority, then insertion order. Callbacks run
//! to completion and may only schedule further actions at or after the current
//! time. There is no cancellation; an action that should not take effect checks
//! its own condition when it fires.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use serde::{Deserialize, Serialize};

use crate::clock::SimClock;
use crate::SimTime;

/// Tie-break for actions due at the same instant. `Low` runs last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionPriority {
    Low,
    Normal,
    High,
}

pub type ActionFn<S> = Box<dyn FnOnce(&mut S, &mut Scheduler<S>)>;

pub struct DelayedAction<S> {
    pub due_at: SimTime,
    pub priority: ActionPriority,
    /// Short name used in diagnostics and tracing.
    pub label: &'static str,
    callback: ActionFn<S>,
}

impl<S> DelayedAction<S> {
    pub fn new(
        due_at: SimTime,
        priority: ActionPriority,
        label: &'static str,
        callback: impl FnOnce(&mut S, &mut Scheduler<S>) + 'static,
    ) -> Self {
        Self {
            due_at,
            priority,
            label,
            callback: Box::new(callback),
        }
    }
}

impl<S> std::fmt::Debug for DelayedAction<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DelayedAction")
            .field("due_at", &self.due_at)
            .field("priority", &self.priority)
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

struct Queued<S> {
    sequence: u64,
    action: DelayedAction<S>,
}

impl<S> Queued<S> {
    fn key(&self) -> (SimTime, std::cmp::Reverse<ActionPriority>, u64) {
        (
            self.action.due_at,
            std::cmp::Reverse(self.action.priority),
            self.sequence,
        )
    }
}

impl<S> PartialEq for Queued<S> {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl<S> Eq for Queued<S> {}

impl<S> PartialOrd for Queued<S> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<S> Ord for Queued<S> {
    // BinaryHeap is a max-heap; the smallest key must compare greatest.
    fn cmp(&self, other: &Self) -> Ordering {
        other.key().cmp(&self.key())
    }
}

pub struct Scheduler<S> {
    clock: SimClock,
    queue: BinaryHeap<Queued<S>>,
    next_sequence: u64,
    executed: u64,
    #[cfg(feature = "instrumentation")]
    executed_by_label: std::collections::BTreeMap<&'static str, u64>,
}

impl<S> Default for Scheduler<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> Scheduler<S> {
    pub fn new() -> Self {
        Self {
            clock: SimClock::new(),
            queue: BinaryHeap::new(),
            next_sequence: 0,
            executed: 0,
            #[cfg(feature = "instrumentation")]
            executed_by_label: std::collections::BTreeMap::new(),
        }
    }

    pub fn now(&self) -> SimTime {
        self.clock.now()
    }

    /// Enqueue an action. Panics if it is due before the current time.
    pub fn schedule(&mut self, action: DelayedAction<S>) {
        let now = self.clock.now();
        assert!(
            action.due_at >= now,
            "causality violation: action '{}' scheduled for {} but clock is at {}",
            action.label,
            action.due_at,
            now,
        );
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.queue.push(Queued { sequence, action });
    }

    /// Shorthand for `schedule(DelayedAction::new(..))`.
    pub fn schedule_at(
        &mut self,
        due_at: SimTime,
        priority: ActionPriority,
        label: &'static str,
        callback: impl FnOnce(&mut S, &mut Scheduler<S>) + 'static,
    ) {
        self.schedule(DelayedAction::new(due_at, priority, label, callback));
    }

    /// Due time of the next pending action.
    pub fn peek_due(&self) -> Option<SimTime> {
        self.queue.peek().map(|queued| queued.action.due_at)
    }

    /// Pop and execute the next action, advancing the clock to its due time.
    /// Returns `false` when the queue is empty.
    pub fn run_next(&mut self, state: &mut S) -> bool {
        let Some(queued) = self.queue.pop() else {
            return false;
        };
        let action = queued.action;
        self.clock.advance_to(action.due_at);
        tracing::trace!(
            at = action.due_at.as_millis(),
            label = action.label,
            priority = ?action.priority,
            "running delayed action"
        );
        self.executed += 1;
        #[cfg(feature = "instrumentation")]
        {
            *self.executed_by_label.entry(action.label).or_insert(0) += 1;
        }
        (action.callback)(state, self);
        true
    }

    /// Run every action due at or before `until`, then park the clock at `until`.
    pub fn run_until(&mut self, state: &mut S, until: SimTime) {
        assert!(
            until >= self.clock.now(),
            "causality violation: run_until({until}) but clock is at {}",
            self.clock.now(),
        );
        while self.peek_due().is_some_and(|due| due <= until) {
            self.run_next(state);
        }
        self.clock.advance_to(until);
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Number of actions executed so far.
    pub fn executed(&self) -> u64 {
        self.executed
    }

    #[cfg(feature = "instrumentation")]
    pub fn executed_by_label(&self) -> &std::collections::BTreeMap<&'static str, u64> {
        &self.executed_by_label
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Trace = Vec<&'static str>;

    fn push(label: &'static str) -> impl FnOnce(&mut Trace, &mut Scheduler<Trace>) {
        move |trace: &mut Trace, _: &mut Scheduler<Trace>| trace.push(label)
    }

    #[test]
    fn runs_in_time_order() {
        let mut scheduler: Scheduler<Trace> = Scheduler::new();
        let mut trace = Trace::new();
        scheduler.schedule_at(SimTime(20), ActionPriority::Normal, "b", push("b"));
        scheduler.schedule_at(SimTime(10), ActionPriority::Normal, "a", push("a"));
        scheduler.run_until(&mut trace, SimTime(100));
        assert_eq!(trace, vec!["a", "b"]);
        assert_eq!(scheduler.now(), SimTime(100));
    }

    #[test]
    fn low_priority_runs_after_normal_at_same_instant() {
        let mut scheduler: Scheduler<Trace> = Scheduler::new();
        let mut trace = Trace::new();
        scheduler.schedule_at(SimTime(10), ActionPriority::Low, "low", push("low"));
        scheduler.schedule_at(SimTime(10), ActionPriority::Normal, "normal", push("normal"));
        scheduler.schedule_at(SimTime(10), ActionPriority::High, "high", push("high"));
        scheduler.run_until(&mut trace, SimTime(10));
        assert_eq!(trace, vec!["high", "normal", "low"]);
    }

    #[test]
    fn equal_keys_keep_insertion_order() {
        let mut scheduler: Scheduler<Trace> = Scheduler::new();
        let mut trace = Trace::new();
        for label in ["first", "second", "third"] {
            scheduler.schedule_at(SimTime(5), ActionPriority::Normal, label, push(label));
        }
        scheduler.run_until(&mut trace, SimTime(5));
        assert_eq!(trace, vec!["first", "second", "third"]);
    }

    #[test]
    fn run_until_leaves_later_actions_pending() {
        let mut scheduler: Scheduler<Trace> = Scheduler::new();
        let mut trace = Trace::new();
        scheduler.schedule_at(SimTime(10), ActionPriority::Normal, "a", push("a"));
        scheduler.schedule_at(SimTime(11), ActionPriority::Normal, "b", push("b"));
        scheduler.run_until(&mut trace, SimTime(10));
        assert_eq!(trace, vec!["a"]);
        assert_eq!(scheduler.len(), 1);
        assert_eq!(scheduler.peek_due(), Some(SimTime(11)));
    }

    #[test]
    fn callbacks_can_schedule_follow_ups_at_the_same_instant() {
        let mut scheduler: Scheduler<Trace> = Scheduler::new();
        let mut trace = Trace::new();
        scheduler.schedule_at(SimTime(10), ActionPriority::Normal, "outer", |trace, sched| {
            trace.push("outer");
            let now = sched.now();
            sched.schedule_at(now, ActionPriority::Low, "inner", push("inner"));
        });
        scheduler.run_until(&mut trace, SimTime(10));
        assert_eq!(trace, vec!["outer", "inner"]);
        assert_eq!(scheduler.executed(), 2);
    }

    #[test]
    fn run_next_reports_empty_queue() {
        let mut scheduler: Scheduler<Trace> = Scheduler::new();
        let mut trace = Trace::new();
        assert!(!scheduler.run_next(&mut trace));
        scheduler.schedule_at(SimTime(3), ActionPriority::Normal, "a", push("a"));
        assert!(scheduler.run_next(&mut trace));
        assert_eq!(scheduler.now(), SimTime(3));
        assert!(scheduler.is_empty());
    }

    #[test]
    #[should_panic(expected = "scheduled for 4ms but clock is at 5ms")]
    fn scheduling_in_the_past_panics() {
        let mut scheduler: Scheduler<Trace> = Scheduler::new();
        let mut trace = Trace::new();
        scheduler.run_until(&mut trace, SimTime(5));
        scheduler.schedule_at(SimTime(4), ActionPriority::Normal, "late", push("late"));
    }

    #[test]
    #[should_panic(expected = "causality violation")]
    fn scheduling_in_the_past_from_a_callback_panics() {
        let mut scheduler: Scheduler<Trace> = Scheduler::new();
        let mut trace = Trace::new();
        scheduler.schedule_at(SimTime(10), ActionPriority::Normal, "outer", |_, sched| {
            sched.schedule_at(SimTime(9), ActionPriority::Normal, "late", push("late"));
        });
        scheduler.run_until(&mut trace, SimTime(10));
    }

    #[test]
    #[should_panic(expected = "run_until(1ms)")]
    fn running_backwards_panics() {
        let mut scheduler: Scheduler<Trace> = Scheduler::new();
        let mut trace = Trace::new();
        scheduler.run_until(&mut trace, SimTime(2));
        scheduler.run_until(&mut trace, SimTime(1));
    }
}
