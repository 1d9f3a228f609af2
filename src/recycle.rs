//! Per-switch recycle (cool-down) gate: the only rate limiter in the
//! controller, applying to activations only.

/// Per-switch recycle bookkeeping.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecycleState {
    /// The earliest time at which another activation will be accepted.
    pub recycle_clear_time: f64,
    /// Count of activations rejected by the gate, for diagnostics.
    pub jitter_count: u64,
}

/// Tracks, per switch, the next time an activation will be accepted.
#[derive(Default)]
pub struct RecycleGate {
    states: crate::case_insensitive::CaseInsensitiveMap<RecycleState>,
}

impl RecycleGate {
    /// Create an empty gate; every switch starts clear (accepts immediately).
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a switch, clear from the start.
    pub fn register_switch(&mut self, name: &str) {
        if self.states.get(name).is_none() {
            self.states.insert(name, RecycleState::default());
        }
    }

    /// True if an activation at `now` would be accepted (`now >= recycle_clear_time`).
    /// If rejected, increments the jitter counter as a side effect, matching
    /// the reference's `_check_recycle_time`.
    pub fn check_and_record_jitter(&mut self, name: &str, now: f64) -> bool {
        let state = self.states.get_mut(name).expect("switch not registered");
        if now >= state.recycle_clear_time {
            true
        } else {
            state.jitter_count += 1;
            tracing::trace!(switch = %name, jitter_count = state.jitter_count, "recycle gate jitter");
            false
        }
    }

    /// Record an accepted activation, pushing the clear time out by
    /// `recycle_seconds`.
    pub fn record_accepted_activation(&mut self, name: &str, now: f64, recycle_seconds: f64) {
        let state = self.states.get_mut(name).expect("switch not registered");
        state.recycle_clear_time = now + recycle_seconds;
    }

    /// Current recycle_clear_time for `name`, used to schedule the deferred
    /// retry.
    pub fn recycle_clear_time(&self, name: &str) -> f64 {
        self.states.get(name).map(|s| s.recycle_clear_time).unwrap_or(0.0)
    }

    /// Jitter count for `name`, for diagnostics/tests.
    pub fn jitter_count(&self, name: &str) -> u64 {
        self.states.get(name).map(|s| s.jitter_count).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_when_clear_time_has_passed() {
        let mut gate = RecycleGate::new();
        gate.register_switch("pop");
        assert!(gate.check_and_record_jitter("pop", 0.0));
        gate.record_accepted_activation("pop", 0.0, 0.5);
        assert!(!gate.check_and_record_jitter("pop", 0.2));
        assert_eq!(gate.jitter_count("pop"), 1);
        assert!(gate.check_and_record_jitter("pop", 0.5));
    }
}
