//! Hardware platform and switch configuration, consumed (never implemented)
//! by this crate. The controller owns the *logical* state of a switch; the
//! platform only ever hands back raw wire levels.

use std::collections::HashMap;

/// Opaque identity of a hardware platform, stable for the process lifetime.
/// Equality/identity is all the controller needs; it never dereferences a
/// platform beyond calling [`Platform::read_all_states`].
pub type PlatformId = u32;

/// Bulk hardware read, implemented by each platform driver.
pub trait Platform {
    /// Identity of this platform, matched against `SwitchConfig::platform`.
    fn id(&self) -> PlatformId;

    /// Read every switch this platform currently reports, keyed by hardware
    /// number, values being the raw (pre-inversion) wire level, 0 or 1.
    fn read_all_states(&self) -> HashMap<u32, u8>;
}

/// Static configuration of a single switch, supplied by the framework at
/// startup. Stable for the process lifetime; the controller never mutates
/// this, only the mutable runtime fields tracked alongside it (see
/// [`crate::state::StateStore`] and [`crate::recycle::RecycleGate`]).
#[derive(Debug, Clone)]
pub struct SwitchConfig {
    /// Case-preserved display name; looked up case-insensitively.
    pub name: String,
    /// Human-readable label, passed through to monitors.
    pub label: String,
    /// Hardware number as reported by the owning platform.
    pub hardware_number: u32,
    /// Platform that owns this switch's wiring.
    pub platform: PlatformId,
    /// `true` for normally-closed (NC) switches: physical-low means active.
    pub inverted: bool,
    /// Minimum seconds between accepted activations. `0.0` disables the
    /// recycle gate for this switch.
    pub recycle_seconds: f64,
}

impl SwitchConfig {
    /// Convenience constructor for a normally-open switch with no recycle
    /// window, the common case in tests and simple configurations.
    pub fn new(name: impl Into<String>, hardware_number: u32, platform: PlatformId) -> Self {
        let name = name.into();
        Self {
            label: name.clone(),
            name,
            hardware_number,
            platform,
            inverted: false,
            recycle_seconds: 0.0,
        }
    }

    /// Builder-style setter for `inverted`.
    pub fn inverted(mut self, inverted: bool) -> Self {
        self.inverted = inverted;
        self
    }

    /// Builder-style setter for `recycle_seconds`.
    pub fn recycle_seconds(mut self, recycle_seconds: f64) -> Self {
        self.recycle_seconds = recycle_seconds;
        self
    }

    /// Builder-style setter for `label`.
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }
}
