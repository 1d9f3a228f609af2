//! The dispatcher: registration, the switch-transition pipeline, hardware
//! synchronization, state queries, and the wait primitive, all wired
//! together behind a single cheaply-cloneable handle.
//!
//! Grounded on `knhk-workflow-engine/src/executor/mod.rs`'s `WorkflowEngine`
//! shape (one struct owning a state store plus a registry, exposing the
//! entry points the rest of the crate calls) and on the explicit-holder,
//! no-singleton guidance in this crate's own concurrency section: the
//! controller is `Rc<RefCell<_>>`, not a lock or a global.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::case_insensitive::CaseInsensitiveMap;
use crate::clock::{Clock, TimerCallback};
use crate::error::{SwitchError, SwitchResult};
use crate::monitor::{MonitorCallback, MonitorList, MonitoredChange};
use crate::platform::{Platform, PlatformId, SwitchConfig};
use crate::recycle::RecycleGate;
use crate::registry::{HandlerCallback, HandlerContext, HandlerKey, HandlerRegistry};
use crate::state::StateStore;
use crate::timed_queue::{TimedPending, TimedQueue};
use crate::wait::{WaitForAny, WaitResolver, WaitResult};

/// The event bus pump the controller kicks at the end of each timed-drain
/// pass, per the spec's "the event bus pump is an external concern but must
/// be kicked here" requirement. The controller never implements a bus; it
/// only calls this one method on whatever sink the framework supplies.
pub trait EventSink {
    /// Drain and dispatch whatever events handlers posted during the pass
    /// that just completed.
    fn process_event_queue(&self);
}

/// An `EventSink` that does nothing, for standalone use and tests.
pub struct NoopEventSink;

impl EventSink for NoopEventSink {
    fn process_event_queue(&self) {}
}

fn normalize(raw: u8) -> u8 {
    if raw != 0 {
        1
    } else {
        0
    }
}

struct Inner {
    clock: Rc<dyn Clock>,
    event_sink: Rc<dyn EventSink>,
    switches: CaseInsensitiveMap<SwitchConfig>,
    platforms: HashMap<PlatformId, Rc<dyn Platform>>,
    hw_states: CaseInsensitiveMap<u8>,
    state: StateStore,
    registry: HandlerRegistry,
    timed: TimedQueue,
    recycle: RecycleGate,
    monitors: MonitorList,
}

/// A cheaply-cloneable handle to the switch controller. All clones share
/// the same underlying state; this is the crate's explicit alternative to a
/// global singleton (see DESIGN.md).
#[derive(Clone)]
pub struct SwitchController {
    inner: Rc<RefCell<Inner>>,
}

impl SwitchController {
    /// Create an empty controller backed by `clock` and `event_sink`.
    pub fn new(clock: Rc<dyn Clock>, event_sink: Rc<dyn EventSink>) -> Self {
        Self {
            inner: Rc::new(RefCell::new(Inner {
                clock,
                event_sink,
                switches: CaseInsensitiveMap::new(),
                platforms: HashMap::new(),
                hw_states: CaseInsensitiveMap::new(),
                state: StateStore::new(),
                registry: HandlerRegistry::new(),
                timed: TimedQueue::new(),
                recycle: RecycleGate::new(),
                monitors: MonitorList::new(),
            })),
        }
    }

    /// Current clock reading.
    pub fn now(&self) -> f64 {
        self.inner.borrow().clock.now()
    }

    /// Register a platform so [`SwitchController::refresh_from_hardware`]
    /// knows how to reach it.
    pub fn register_platform(&self, platform: Rc<dyn Platform>) {
        self.inner.borrow_mut().platforms.insert(platform.id(), platform);
    }

    /// Register a switch, seeding its state at `(0, sentinel)` and creating
    /// its empty handler buckets. Call once per switch at startup, before
    /// any `process_switch*` call references it.
    pub fn register_switch(&self, config: SwitchConfig) {
        let mut inner = self.inner.borrow_mut();
        inner.registry.register_switch(&config.name);
        inner.recycle.register_switch(&config.name);
        inner.hw_states.insert(&config.name, 0);
        inner.state.set_state(&config.name, 0, 0.0, true);
        let name = config.name.clone();
        inner.switches.insert(&name, config);
    }

    // ---- handler registration ------------------------------------------

    /// Register `callback` to fire when `switch` transitions into `state`
    /// (default 1/active) and has dwelled there for `dwell_ms` (default 0,
    /// meaning "fire immediately"). If `return_info` is set, `callback` is
    /// invoked with a [`HandlerContext`] describing the switch/state/dwell
    /// that triggered it, in addition to `extra`.
    ///
    /// If `dwell_ms > 0` and the switch is already in `state` for less than
    /// `dwell_ms`, a pending firing is inserted immediately at the correct
    /// absolute deadline (the late-join rule).
    pub fn add_handler(
        &self,
        switch: &str,
        callback: impl Fn(&HandlerContext) -> anyhow::Result<()> + 'static,
        state: u8,
        dwell_ms: u64,
        return_info: bool,
        extra: serde_json::Value,
    ) -> SwitchResult<HandlerKey> {
        if !self.inner.borrow().switches.contains(switch) {
            return Err(SwitchError::UnknownSwitch {
                name: switch.to_string(),
            });
        }

        let context = if return_info {
            HandlerContext {
                switch: Some(switch.to_string()),
                state: Some(state),
                dwell_ms: Some(dwell_ms),
                extra,
            }
        } else {
            HandlerContext {
                extra,
                ..Default::default()
            }
        };
        let wrapped: HandlerCallback = Rc::new(move || callback(&context));

        let key = {
            let mut inner = self.inner.borrow_mut();
            inner.registry.add_handler(switch, wrapped, state, dwell_ms)
        };

        if dwell_ms > 0 {
            let now = self.now();
            let ms_since_change = {
                let inner = self.inner.borrow();
                inner.state.ms_since_change(switch, now)?
            };
            let current_state = { self.inner.borrow().state.get(switch)?.state };
            if current_state == state && (ms_since_change as u64) < dwell_ms {
                let deadline = now + ((dwell_ms - ms_since_change as u64) as f64) / 1000.0;
                self.enqueue_timed(switch, state, dwell_ms, key.callback.clone(), now, deadline);
            }
        }

        Ok(key)
    }

    /// Remove the first handler whose identity matches `key`, including any
    /// pending timed firing it spawned. Returns `true` if something was
    /// removed.
    pub fn remove_handler_by_key(&self, key: &HandlerKey) -> bool {
        self.remove_handler(&key.switch, &key.callback, key.state, key.dwell_ms)
    }

    /// Remove the first handler matching `(switch, callback, state,
    /// dwell_ms)` by identity, including any pending timed firing it
    /// spawned.
    pub fn remove_handler(
        &self,
        switch: &str,
        callback: &HandlerCallback,
        state: u8,
        dwell_ms: u64,
    ) -> bool {
        let mut inner = self.inner.borrow_mut();
        let removed_registered = inner.registry.remove_handler(switch, callback, state, dwell_ms);
        let clock = inner.clock.clone();
        let controller = self.clone();
        let on_due: TimerCallback = Rc::new(move || {
            let _ = controller.tick();
        });
        let now = clock.now();
        let removed_timed = inner
            .timed
            .cancel_by_identity(&*clock, now, switch, state, dwell_ms, callback, on_due)
            > 0;
        removed_registered || removed_timed
    }

    // ---- monitors --------------------------------------------------------

    /// Register a monitor, unless an identical one is already present.
    pub fn add_monitor(&self, monitor: MonitorCallback) {
        self.inner.borrow_mut().monitors.add(monitor);
    }

    /// Remove a monitor.
    pub fn remove_monitor(&self, monitor: &MonitorCallback) {
        self.inner.borrow_mut().monitors.remove(monitor);
    }

    /// Number of registered monitors, for tests/diagnostics.
    pub fn monitor_count(&self) -> usize {
        self.inner.borrow().monitors.len()
    }

    // ---- queries ----------------------------------------------------------

    /// True iff `name` is currently in `state` and has been for at least
    /// `dwell_ms`.
    pub fn is_state(&self, name: &str, state: u8, dwell_ms: u64) -> SwitchResult<bool> {
        let inner = self.inner.borrow();
        let current = inner.state.get(name)?;
        if current.state != state {
            return Ok(false);
        }
        let ms = inner.state.ms_since_change(name, inner.clock.now())?;
        Ok(ms >= dwell_ms as i64)
    }

    /// `is_state(name, 1, dwell_ms)`.
    pub fn is_active(&self, name: &str, dwell_ms: u64) -> SwitchResult<bool> {
        self.is_state(name, 1, dwell_ms)
    }

    /// `is_state(name, 0, dwell_ms)`.
    pub fn is_inactive(&self, name: &str, dwell_ms: u64) -> SwitchResult<bool> {
        self.is_state(name, 0, dwell_ms)
    }

    /// The conventional event name posted when `switch_name` becomes active.
    pub fn active_event_name(switch_name: &str) -> String {
        format!("{switch_name}_active")
    }

    // ---- transition pipeline ----------------------------------------------

    /// Process a transition for a switch looked up by name. Fails if `name`
    /// was never registered.
    pub fn process_switch(&self, name: &str, raw_state: u8, logical: bool) -> SwitchResult<()> {
        let switch = {
            let inner = self.inner.borrow();
            inner
                .switches
                .get(name)
                .cloned()
                .ok_or_else(|| SwitchError::UnknownSwitch { name: name.to_string() })?
        };
        self.process_switch_config(&switch, raw_state, logical)
    }

    /// Process a transition reported by hardware number on a given
    /// platform. If no configured switch matches, still notifies monitors
    /// with a synthetic name so unconfigured hits remain observable.
    pub fn process_switch_by_number(
        &self,
        hardware_number: u32,
        platform: PlatformId,
        raw_state: u8,
    ) -> SwitchResult<()> {
        let matched = {
            let inner = self.inner.borrow();
            inner
                .switches
                .iter()
                .find(|(_, cfg)| cfg.hardware_number == hardware_number && cfg.platform == platform)
                .map(|(_, cfg)| cfg.clone())
        };
        match matched {
            Some(switch) => self.process_switch_config(&switch, raw_state, false),
            None => {
                tracing::debug!(
                    hardware_number,
                    platform,
                    raw_state,
                    "switch change on unconfigured hardware number"
                );
                let change = MonitoredChange {
                    name: hardware_number.to_string(),
                    label: format!("{platform}-{hardware_number}"),
                    platform: Some(platform),
                    hardware_number,
                    new_state: normalize(raw_state),
                };
                self.inner.borrow().monitors.notify(&change);
                Ok(())
            }
        }
    }

    fn process_switch_config(&self, switch: &SwitchConfig, raw_state: u8, logical: bool) -> SwitchResult<()> {
        let _span = tracing::debug_span!("process_switch", switch = %switch.name).entered();
        tracing::debug!(raw_state, logical, "processing switch");

        let raw_state = normalize(raw_state);
        let mut hw_state = raw_state;
        let mut state = raw_state;
        if switch.inverted {
            if logical {
                hw_state ^= 1;
            } else {
                state ^= 1;
            }
        }

        let now = self.now();
        {
            let mut inner = self.inner.borrow_mut();
            inner.hw_states.insert(&switch.name, hw_state);
        }

        if state == 1 {
            let accepted = {
                let mut inner = self.inner.borrow_mut();
                inner.recycle.check_and_record_jitter(&switch.name, now)
            };
            if !accepted {
                self.schedule_recycle_retry(switch, raw_state, logical, hw_state, now);
                return Ok(());
            }
            let mut inner = self.inner.borrow_mut();
            inner.recycle.record_accepted_activation(&switch.name, now, switch.recycle_seconds);
        }

        let already_in_state = { self.inner.borrow().state.get(&switch.name)?.state == state };
        if already_in_state {
            if switch.recycle_seconds == 0.0 {
                tracing::warn!(
                    switch = %switch.name,
                    "duplicate switch state transition with no recycle window configured"
                );
            }
            return Ok(());
        }

        {
            let mut inner = self.inner.borrow_mut();
            inner.state.set_state(&switch.name, state, now, false);
        }

        self.call_handlers(&switch.name, state, now)?;

        {
            let mut inner = self.inner.borrow_mut();
            let clock = inner.clock.clone();
            let controller = self.clone();
            let on_due: TimerCallback = Rc::new(move || {
                let _ = controller.tick();
            });
            inner.timed.cancel_matching(&*clock, now, &switch.name, state ^ 1, on_due);
        }

        let change = MonitoredChange {
            name: switch.name.clone(),
            label: switch.label.clone(),
            platform: Some(switch.platform),
            hardware_number: switch.hardware_number,
            new_state: state,
        };
        self.inner.borrow().monitors.notify(&change);

        Ok(())
    }

    fn schedule_recycle_retry(
        &self,
        switch: &SwitchConfig,
        raw_state: u8,
        logical: bool,
        hw_state_at_schedule: u8,
        now: f64,
    ) {
        tracing::trace!(switch = %switch.name, "recycle gate rejected activation, scheduling retry");
        let clear_time = { self.inner.borrow().recycle.recycle_clear_time(&switch.name) };
        let delay = (clear_time - now).max(0.0);
        let controller = self.clone();
        let switch_name = switch.name.clone();
        let callback: TimerCallback = Rc::new(move || {
            let current_hw = { controller.inner.borrow().hw_states.get(&switch_name).copied() };
            if current_hw == Some(hw_state_at_schedule) {
                if let Err(err) = controller.process_switch(&switch_name, raw_state, logical) {
                    tracing::error!(switch = %switch_name, error = %err, "recycle retry failed");
                }
            }
        });
        let inner = self.inner.borrow();
        inner.clock.schedule_once(callback, delay);
    }

    fn call_handlers(&self, name: &str, state: u8, now: f64) -> SwitchResult<()> {
        let snapshot = { self.inner.borrow().registry.snapshot(name, state) };
        for (dwell_ms, callback) in snapshot {
            let still_present = { self.inner.borrow().registry.contains(name, state, dwell_ms, &callback) };
            if !still_present {
                continue;
            }
            if dwell_ms == 0 {
                callback().map_err(|source| SwitchError::HandlerFailed {
                    switch: name.to_string(),
                    source,
                })?;
            } else {
                let deadline = now + (dwell_ms as f64) / 1000.0;
                self.enqueue_timed(name, state, dwell_ms, callback, now, deadline);
            }
        }
        Ok(())
    }

    fn enqueue_timed(
        &self,
        name: &str,
        state: u8,
        dwell_ms: u64,
        callback: HandlerCallback,
        now: f64,
        deadline: f64,
    ) {
        let pending = TimedPending {
            switch_name: name.to_string(),
            target_state: state,
            dwell_ms,
            callback,
        };
        let mut inner = self.inner.borrow_mut();
        let clock = inner.clock.clone();
        let controller = self.clone();
        let on_due: TimerCallback = Rc::new(move || {
            let _ = controller.tick();
        });
        inner.timed.insert(&*clock, now, deadline, pending, on_due);
    }

    /// Drain every timed-handler firing whose deadline has passed, fire the
    /// platform event-queue pump, and reschedule the wake timer for the
    /// next surviving deadline. Called automatically by the clock when the
    /// wake timer fires; callers embedding the controller in a host loop
    /// without a `Clock::schedule_once` side channel may also call this
    /// directly.
    pub fn tick(&self) -> SwitchResult<()> {
        let _span = tracing::debug_span!("process_due").entered();
        let now = self.now();
        let controller = self.clone();
        let on_due: TimerCallback = Rc::new(move || {
            let _ = controller.tick();
        });

        // Pull due entries out and drop the borrow before firing: a fired
        // handler is free to call back into the controller (register
        // another handler, query state, even enqueue another timed
        // firing), and that would panic against an outstanding `RefCell`
        // borrow held across the callback.
        let due = {
            let mut inner = self.inner.borrow_mut();
            let clock = inner.clock.clone();
            inner.timed.take_due(&*clock, now, on_due)
        };

        let mut errors = Vec::new();
        for pending in due {
            if let Err(err) = (pending.callback)() {
                errors.push((pending.switch_name, err));
            }
        }

        {
            let inner = self.inner.borrow();
            inner.event_sink.process_event_queue();
        }
        for (switch, source) in &errors {
            tracing::error!(switch = %switch, error = %source, "timed handler failed");
        }
        if let Some((switch, source)) = errors.into_iter().next() {
            return Err(SwitchError::HandlerFailed { switch, source });
        }
        Ok(())
    }

    // ---- hardware synchronization ------------------------------------------

    /// Re-read every configured switch's state from its owning platform.
    /// Silent: does not post transitions or notify monitors, only updates
    /// the logical state store to match the hardware.
    pub fn refresh_from_hardware(&self) -> SwitchResult<()> {
        let now = self.now();
        let mut inner = self.inner.borrow_mut();
        let platform_reads: HashMap<PlatformId, HashMap<u32, u8>> = inner
            .platforms
            .iter()
            .map(|(id, platform)| (*id, platform.read_all_states()))
            .collect();

        let switches: Vec<SwitchConfig> = inner.switches.iter().map(|(_, cfg)| cfg.clone()).collect();
        for switch in switches {
            let reads = platform_reads.get(&switch.platform);
            let raw = reads
                .and_then(|r| r.get(&switch.hardware_number))
                .copied()
                .ok_or(SwitchError::MissingHardwareNumber {
                    hardware_number: switch.hardware_number,
                })?;
            let state = raw ^ (switch.inverted as u8);
            inner.hw_states.insert(&switch.name, raw);
            inner.state.set_state(&switch.name, state, now, true);
        }
        Ok(())
    }

    /// Snapshot current software states, refresh from hardware, and compare.
    /// Logs a warning per mismatch. Diagnostic only; never posts
    /// transitions. Returns `true` iff every switch matched.
    pub fn verify_against_hardware(&self) -> SwitchResult<bool> {
        let before: Vec<(String, u8)> = {
            let inner = self.inner.borrow();
            inner.state.iter().map(|(name, s)| (name.to_string(), s.state)).collect()
        };

        self.refresh_from_hardware()?;

        let mut ok = true;
        let inner = self.inner.borrow();
        for (name, prior_state) in before {
            let current = inner.state.get(&name)?.state;
            if current != prior_state {
                ok = false;
                tracing::warn!(
                    switch = %name,
                    hw_state = current,
                    software_state = prior_state,
                    "switch state mismatch between hardware and software"
                );
            }
        }
        Ok(ok)
    }

    // ---- wait primitive -----------------------------------------------------

    /// Build a future resolving with the first of `switches` to transition
    /// into `state` and dwell there for `dwell_ms`. If `only_on_change` is
    /// `false` and a listed switch already satisfies that condition, the
    /// future resolves immediately. Transient handlers are always cleaned
    /// up, whether the future resolves or is dropped before resolving.
    pub fn wait_for_any(
        &self,
        switches: &[&str],
        state: u8,
        only_on_change: bool,
        dwell_ms: u64,
    ) -> SwitchResult<WaitForAny> {
        if !only_on_change {
            for &name in switches {
                if self.is_state(name, state, dwell_ms)? {
                    return Ok(WaitForAny::ready(WaitResult {
                        switch: name.to_string(),
                        state,
                        dwell_ms,
                    }));
                }
            }
        }

        let resolver = WaitResolver::default();
        let mut keys = Vec::with_capacity(switches.len());
        for &name in switches {
            let resolver = resolver.clone();
            let switch_name = name.to_string();
            let key = self.add_handler(
                name,
                move |_ctx| {
                    resolver.resolve(WaitResult {
                        switch: switch_name.clone(),
                        state,
                        dwell_ms,
                    });
                    Ok(())
                },
                state,
                dwell_ms,
                false,
                serde_json::Value::Null,
            )?;
            keys.push(key);
        }

        let controller = self.clone();
        let cleanup = move || {
            for key in keys {
                controller.remove_handler_by_key(&key);
            }
        };
        Ok(WaitForAny::pending(resolver, cleanup))
    }
}
