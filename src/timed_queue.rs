//! Time-bucketed queue of pending dwell-gated handler firings.
//!
//! Grounded on `knhk-workflow-engine/src/execution/queue.rs`'s work-queue
//! shape (items carrying their own dispatch metadata, processed by a single
//! owner) combined with the wake-timer coalescing idiom of
//! `knhk-workflow-engine/src/concurrency/cancel_token.rs` (cancel-then-
//! reschedule rather than one timer per item).

use std::collections::BTreeMap;

use crate::clock::{Clock, TimerCallback, TimerHandle};
use crate::registry::HandlerCallback;

/// A handler firing waiting for its switch to have dwelled long enough.
#[derive(Clone)]
pub struct TimedPending {
    pub switch_name: String,
    pub target_state: u8,
    pub dwell_ms: u64,
    pub callback: HandlerCallback,
}

/// Deadlines are rounded to the nearest microsecond so they can serve as a
/// `BTreeMap` key; `f64` has no total order (`NaN`) but switch-controller
/// deadlines are always `now + non_negative`, so this loses no precision
/// that matters at millisecond dwell granularity.
fn deadline_key(seconds: f64) -> i64 {
    (seconds * 1_000_000.0).round() as i64
}

/// Time-bucketed set of pending handler firings, with a single coalesced
/// wake timer covering the earliest deadline.
pub struct TimedQueue {
    buckets: BTreeMap<i64, Vec<TimedPending>>,
    wake_handle: Option<TimerHandle>,
}

impl Default for TimedQueue {
    fn default() -> Self {
        Self {
            buckets: BTreeMap::new(),
            wake_handle: None,
        }
    }
}

impl TimedQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// True if there is nothing pending.
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Insert a pending firing at `deadline_seconds`, rescheduling the wake
    /// timer if this changes the earliest deadline.
    pub fn insert(
        &mut self,
        clock: &dyn Clock,
        now: f64,
        deadline_seconds: f64,
        pending: TimedPending,
        on_due: TimerCallback,
    ) {
        let earliest_before = self.buckets.keys().next().copied();
        self.buckets
            .entry(deadline_key(deadline_seconds))
            .or_default()
            .push(pending);
        let earliest_after = self.buckets.keys().next().copied();
        if earliest_after != earliest_before {
            self.reschedule_wake(clock, now, on_due);
        }
    }

    /// Remove every pending entry matching `switch_name` and `target_state`,
    /// used when a switch leaves the state those entries were watching for.
    /// Reschedules the wake timer if this changes the earliest deadline.
    /// Returns the number of entries removed.
    pub fn cancel_matching(
        &mut self,
        clock: &dyn Clock,
        now: f64,
        switch_name: &str,
        target_state: u8,
        on_due: TimerCallback,
    ) -> usize {
        let earliest_before = self.buckets.keys().next().copied();
        let mut removed = 0;
        self.buckets.retain(|_, bucket| {
            let before = bucket.len();
            bucket.retain(|p| {
                !(p.switch_name.eq_ignore_ascii_case(switch_name) && p.target_state == target_state)
            });
            removed += before - bucket.len();
            !bucket.is_empty()
        });
        if removed > 0 && self.buckets.keys().next().copied() != earliest_before {
            self.reschedule_wake(clock, now, on_due);
        }
        removed
    }

    /// Remove every pending entry whose `(switch, state, dwell_ms, callback)`
    /// identity matches, used by [`crate::registry::HandlerRegistry::remove_handler`]'s
    /// counterpart at the controller level. Reschedules the wake timer if
    /// this changes the earliest deadline.
    pub fn cancel_by_identity(
        &mut self,
        clock: &dyn Clock,
        now: f64,
        switch_name: &str,
        target_state: u8,
        dwell_ms: u64,
        callback: &HandlerCallback,
        on_due: TimerCallback,
    ) -> usize {
        let earliest_before = self.buckets.keys().next().copied();
        let mut removed = 0;
        self.buckets.retain(|_, bucket| {
            let before = bucket.len();
            bucket.retain(|p| {
                !(p.switch_name.eq_ignore_ascii_case(switch_name)
                    && p.target_state == target_state
                    && p.dwell_ms == dwell_ms
                    && std::rc::Rc::ptr_eq(&p.callback, callback))
            });
            removed += before - bucket.len();
            !bucket.is_empty()
        });
        if removed > 0 && self.buckets.keys().next().copied() != earliest_before {
            self.reschedule_wake(clock, now, on_due);
        }
        removed
    }

    /// Remove every entry whose deadline is `<= now` and return them,
    /// without firing. Reschedules the wake timer for the next surviving
    /// deadline, if any.
    ///
    /// Split out from firing so a caller whose queue lives behind a
    /// `RefCell` (the controller) can drop its borrow before invoking
    /// callbacks that might call back into the same `RefCell`.
    pub fn take_due(&mut self, clock: &dyn Clock, now: f64, on_due: TimerCallback) -> Vec<TimedPending> {
        let due_keys: Vec<i64> = self
            .buckets
            .range(..=deadline_key(now))
            .map(|(k, _)| *k)
            .collect();

        let mut due = Vec::new();
        for key in due_keys {
            if let Some(bucket) = self.buckets.remove(&key) {
                due.extend(bucket);
            }
        }

        self.reschedule_wake(clock, now, on_due);
        due
    }

    /// Drain and fire every entry whose deadline is `<= now`. Firing
    /// continues past an error so later handlers still get their chance.
    /// Returns `(switch_name, error)` for every handler error encountered,
    /// in firing order.
    ///
    /// Callers whose queue is reachable from inside a handler callback
    /// (the controller) should use [`TimedQueue::take_due`] instead and
    /// fire the returned entries with no borrow held; this method is for
    /// standalone use and tests where no such reentrancy is possible.
    pub fn process_due(
        &mut self,
        clock: &dyn Clock,
        now: f64,
        on_due: TimerCallback,
    ) -> Vec<(String, anyhow::Error)> {
        let due = self.take_due(clock, now, on_due);
        let mut errors = Vec::new();
        for pending in due {
            if let Err(err) = (pending.callback)() {
                errors.push((pending.switch_name.clone(), err));
            }
        }
        errors
    }

    fn reschedule_wake(&mut self, clock: &dyn Clock, now: f64, on_due: TimerCallback) {
        if let Some(handle) = self.wake_handle.take() {
            clock.cancel(handle);
        }
        if let Some(&earliest) = self.buckets.keys().next() {
            let delay = (earliest as f64 / 1_000_000.0) - now;
            tracing::trace!(delay, "rescheduling timed-queue wake timer");
            self.wake_handle = Some(clock.schedule_once(on_due, delay.max(0.0)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FakeClock;

    fn pending(switch: &str, state: u8, dwell_ms: u64) -> TimedPending {
        TimedPending {
            switch_name: switch.to_string(),
            target_state: state,
            dwell_ms,
            callback: std::rc::Rc::new(|| Ok(())),
        }
    }

    #[test]
    fn fires_due_entries_and_reschedules() {
        let clock = FakeClock::new();
        let mut queue = TimedQueue::new();
        queue.insert(&clock, 0.0, 0.25, pending("flipper", 1, 250), std::rc::Rc::new(|| {}));
        assert!(!queue.is_empty());
        let errors = queue.process_due(&clock, 0.20, std::rc::Rc::new(|| {}));
        assert!(errors.is_empty());
        assert!(!queue.is_empty(), "deadline not yet due");
        let errors = queue.process_due(&clock, 0.25, std::rc::Rc::new(|| {}));
        assert!(errors.is_empty());
        assert!(queue.is_empty());
    }

    #[test]
    fn cancel_matching_drops_opposite_state_only() {
        let clock = FakeClock::new();
        let mut queue = TimedQueue::new();
        queue.insert(&clock, 0.0, 1.0, pending("flipper", 1, 0), std::rc::Rc::new(|| {}));
        queue.insert(&clock, 0.0, 1.0, pending("flipper", 0, 0), std::rc::Rc::new(|| {}));
        let removed = queue.cancel_matching(&clock, 0.0, "flipper", 1, std::rc::Rc::new(|| {}));
        assert_eq!(removed, 1);
        assert!(!queue.is_empty());
    }
}
