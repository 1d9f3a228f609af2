//! A realtime switch-event dispatcher: debounced, dwell-gated, single-
//! threaded event routing from raw hardware wire levels to the logical
//! switch transitions a pinball machine's rules run on.
//!
//! Start with [`controller::SwitchController`]; everything else in this
//! crate is a component it composes.

pub mod case_insensitive;
pub mod clock;
pub mod config;
pub mod controller;
pub mod error;
pub mod monitor;
pub mod platform;
pub mod recycle;
pub mod registry;
pub mod state;
pub mod timed_queue;
pub mod wait;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use clock::{Clock, FakeClock, LocalClock, TimerHandle};
pub use config::{AppConfig, ConfigLoader};
pub use controller::{EventSink, NoopEventSink, SwitchController};
pub use error::{SwitchError, SwitchResult};
pub use monitor::MonitoredChange;
pub use platform::{Platform, PlatformId, SwitchConfig};
pub use registry::{HandlerContext, HandlerKey};
pub use wait::WaitResult;
