//! Monitors: observers of every accepted transition, including hits on
//! unconfigured hardware numbers.

use std::rc::Rc;

use crate::platform::PlatformId;

/// A single observed transition, posted to every monitor in registration
/// order.
#[derive(Debug, Clone)]
pub struct MonitoredChange {
    /// Switch name, or the stringified hardware number for unconfigured hits.
    pub name: String,
    /// Display label, or a synthesized `"<platform>-<number>"` for
    /// unconfigured hits.
    pub label: String,
    /// Owning platform, if known.
    pub platform: Option<PlatformId>,
    /// Hardware number.
    pub hardware_number: u32,
    /// The new logical state.
    pub new_state: u8,
}

/// A monitor callback.
pub type MonitorCallback = Rc<dyn Fn(&MonitoredChange)>;

/// Identity-deduplicated list of monitors, notified in registration order.
#[derive(Default)]
pub struct MonitorList {
    monitors: Vec<MonitorCallback>,
}

impl MonitorList {
    /// Create an empty monitor list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `monitor` unless an identical (by `Rc::ptr_eq`) one is
    /// already present.
    pub fn add(&mut self, monitor: MonitorCallback) {
        if !self.monitors.iter().any(|m| Rc::ptr_eq(m, &monitor)) {
            self.monitors.push(monitor);
        }
    }

    /// Remove `monitor` if present.
    pub fn remove(&mut self, monitor: &MonitorCallback) {
        self.monitors.retain(|m| !Rc::ptr_eq(m, monitor));
    }

    /// Notify every monitor, in registration order.
    pub fn notify(&self, change: &MonitoredChange) {
        for monitor in &self.monitors {
            monitor(change);
        }
    }

    /// Count of registered monitors, for tests.
    pub fn len(&self) -> usize {
        self.monitors.len()
    }

    /// True if no monitors are registered.
    pub fn is_empty(&self) -> bool {
        self.monitors.is_empty()
    }
}
