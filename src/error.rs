//! Error types for the switch controller.
//!
//! Grounded on `knhk-workflow-engine/src/error/mod.rs`: a single `thiserror`
//! enum with a crate-wide `Result` alias, distinguishing conditions the
//! dispatcher itself can recover from (returned as `Ok` with a side-effect
//! logged) from conditions that indicate the framework violated one of the
//! controller's invariants and must not be swallowed.

use thiserror::Error;

/// Result type for switch controller operations.
pub type SwitchResult<T> = Result<T, SwitchError>;

/// Errors raised by the switch controller.
///
/// The "fatal" variants below are not fatal to the Rust process in the sense
/// of aborting it — they are returned as `Err` so the caller decides the
/// policy. They are fatal in the sense that the framework invariant they
/// represent ("every switch name comes from configuration", "hardware must
/// report every switch it was told to") has been violated and there is no
/// sensible way to continue processing the call that triggered them.
#[derive(Error, Debug)]
pub enum SwitchError {
    /// `process_switch` (or a query) was called with a name that was never
    /// passed to `register_switch`.
    #[error("unknown switch: {name}")]
    UnknownSwitch {
        /// The name that was looked up.
        name: String,
    },

    /// `refresh_from_hardware` queried a platform and it did not report a
    /// state for one of the switches configured against it.
    #[error("missing switch {hardware_number} in update from HW")]
    MissingHardwareNumber {
        /// The hardware number that went unreported.
        hardware_number: u32,
    },

    /// A registered handler returned an error while firing.
    #[error("handler for switch '{switch}' failed: {source}")]
    HandlerFailed {
        /// The switch whose handler failed.
        switch: String,
        /// The underlying error the handler returned.
        #[source]
        source: anyhow::Error,
    },

    /// Configuration failed to load or failed validation.
    #[error("invalid configuration: {reason}")]
    InvalidConfig {
        /// Human-readable reason the configuration was rejected.
        reason: String,
    },
}
