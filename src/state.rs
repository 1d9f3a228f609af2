//! Authoritative store of every switch's current logical state and the time
//! it last changed. Grounded on the cache/store split in
//! `knhk-workflow-engine/src/state/store.rs`, with the `sled`-backed cold
//! storage dropped: switch state is in-memory-only and lives exactly as
//! long as the controller does (see DESIGN.md).

use crate::error::{SwitchError, SwitchResult};

/// Sentinel `last_change_time` used at registration so that a switch which
/// has never transitioned reports an effectively-infinite dwell time.
pub const SENTINEL_TIME: f64 = -100_000.0;

/// Current logical state and the time it was last set.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SwitchState {
    /// Logical state, 0 or 1.
    pub state: u8,
    /// Clock reading when `state` was last written.
    pub last_change_time: f64,
}

/// Authoritative mapping from switch name to its current logical state.
#[derive(Debug, Clone, Default)]
pub struct StateStore {
    states: crate::case_insensitive::CaseInsensitiveMap<SwitchState>,
}

impl StateStore {
    /// Create an empty state store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Write `(state, now)`, or `(state, SENTINEL_TIME)` if `reset_time` is
    /// set (used at switch registration and on hardware resync).
    pub fn set_state(&mut self, name: &str, state: u8, now: f64, reset_time: bool) {
        let last_change_time = if reset_time { SENTINEL_TIME } else { now };
        self.states.insert(
            name,
            SwitchState {
                state,
                last_change_time,
            },
        );
    }

    /// Read the current state, failing if `name` was never registered.
    pub fn get(&self, name: &str) -> SwitchResult<SwitchState> {
        self.states
            .get(name)
            .copied()
            .ok_or_else(|| SwitchError::UnknownSwitch {
                name: name.to_string(),
            })
    }

    /// True if `name` has been registered.
    pub fn contains(&self, name: &str) -> bool {
        self.states.contains(name)
    }

    /// Milliseconds elapsed since `name` last changed state, rounded
    /// half-away-from-zero to match the reference implementation's
    /// `round(x, 0)` behavior.
    pub fn ms_since_change(&self, name: &str, now: f64) -> SwitchResult<i64> {
        let entry = self.get(name)?;
        let ms = (now - entry.last_change_time) * 1000.0;
        Ok(round_half_away_from_zero(ms))
    }

    /// Iterate over every registered switch's current state.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &SwitchState)> {
        self.states.iter()
    }
}

fn round_half_away_from_zero(x: f64) -> i64 {
    if x >= 0.0 {
        (x + 0.5).floor() as i64
    } else {
        (x - 0.5).ceil() as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_switch_is_an_error() {
        let store = StateStore::new();
        assert!(store.get("nope").is_err());
    }

    #[test]
    fn sentinel_time_yields_large_dwell() {
        let mut store = StateStore::new();
        store.set_state("ball_1", 0, 0.0, true);
        let ms = store.ms_since_change("ball_1", 0.0).unwrap();
        assert!(ms > 1_000_000);
    }

    #[test]
    fn case_insensitive_lookup_preserves_case() {
        let mut store = StateStore::new();
        store.set_state("Ball_1", 1, 5.0, false);
        assert_eq!(store.get("ball_1").unwrap().state, 1);
        assert_eq!(store.get("BALL_1").unwrap().state, 1);
    }

    #[test]
    fn rounding_matches_half_away_from_zero() {
        assert_eq!(round_half_away_from_zero(0.5), 1);
        assert_eq!(round_half_away_from_zero(-0.5), -1);
        assert_eq!(round_half_away_from_zero(249.4), 249);
        assert_eq!(round_half_away_from_zero(249.5), 250);
    }
}
