//! Fake `Platform` for deterministic tests, mirroring [`crate::clock::FakeClock`].
//!
//! Built in-tree (rather than only inside `tests/`) so downstream crates
//! embedding a `SwitchController` can drive their own integration tests
//! against the same fake hardware this crate's own tests use — enable the
//! `testing` feature to pull it in outside `#[cfg(test)]`.

use std::cell::RefCell;
use std::collections::HashMap;

use crate::platform::{Platform, PlatformId};

/// An in-memory platform whose raw switch levels are set directly by the
/// test, with no real hardware underneath.
#[derive(Default)]
pub struct FakePlatform {
    id: PlatformId,
    states: RefCell<HashMap<u32, u8>>,
}

impl FakePlatform {
    /// Create a fake platform with the given id, reporting nothing until
    /// [`FakePlatform::set`] is called.
    pub fn new(id: PlatformId) -> Self {
        Self {
            id,
            states: RefCell::new(HashMap::new()),
        }
    }

    /// Set the raw (pre-inversion) wire level for a hardware number.
    pub fn set(&self, hardware_number: u32, raw_state: u8) {
        self.states.borrow_mut().insert(hardware_number, raw_state);
    }
}

impl Platform for FakePlatform {
    fn id(&self) -> PlatformId {
        self.id
    }

    fn read_all_states(&self) -> HashMap<u32, u8> {
        self.states.borrow().clone()
    }
}
