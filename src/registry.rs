//! Handler registration: the mapping from `(switch, target_state)` to an
//! ordered list of callbacks, plus the late-join rule that lets a handler
//! registered mid-dwell still fire at the original absolute deadline.
//!
//! Grounded on the registry/lookup shape of
//! `knhk-workflow-engine/src/execution/hooks.rs` (`HookRegistry`, keyed
//! `HashMap<String, HookFn>`), adapted from an `Arc<RwLock<_>>` map to the
//! `Rc<RefCell<_>>` ownership this crate's single-threaded model calls for,
//! and from name-keyed single slots to the two-bucket-per-switch shape the
//! reference implementation actually uses.

use std::collections::HashMap;
use std::rc::Rc;

use serde_json::Value;

/// Extra context optionally baked into a handler callback at registration
/// time. Unlike the Python reference, which builds this via `functools.partial`
/// at call time, a Rust closure captures it once when [`crate::controller::SwitchController::add_handler`]
/// wraps the caller's function; [`HandlerContext`] only exists to describe
/// that capture, not to be threaded through at fire time.
#[derive(Debug, Clone, Default)]
pub struct HandlerContext {
    /// Present when the handler was registered with `return_info = true`.
    pub switch: Option<String>,
    /// Present when the handler was registered with `return_info = true`.
    pub state: Option<u8>,
    /// Present when the handler was registered with `return_info = true`.
    pub dwell_ms: Option<u64>,
    /// Caller-supplied payload, passed through unconditionally.
    pub extra: Value,
}

/// A handler callback, fully nullary: any context it needs was captured at
/// registration time. Fallible so handler errors can propagate to
/// `process_switch`'s caller per the error design.
pub type HandlerCallback = Rc<dyn Fn() -> anyhow::Result<()>>;

/// An opaque key identifying one registered handler, returned by
/// [`HandlerRegistry::add_handler`] and accepted by
/// [`HandlerRegistry::remove_handler_by_key`].
#[derive(Clone)]
pub struct HandlerKey {
    pub(crate) switch: String,
    pub(crate) state: u8,
    pub(crate) dwell_ms: u64,
    pub(crate) callback: HandlerCallback,
}

#[derive(Clone)]
struct Entry {
    dwell_ms: u64,
    callback: HandlerCallback,
}

/// Ordered, per-`(switch, state)` handler lists.
#[derive(Default)]
pub struct HandlerRegistry {
    buckets: HashMap<(String, u8), Vec<Entry>>,
}

impl HandlerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn key(name: &str, state: u8) -> (String, u8) {
        (name.to_ascii_lowercase(), state)
    }

    /// Create the empty `(name, 0)` / `(name, 1)` buckets for a newly
    /// configured switch. Idempotent.
    pub fn register_switch(&mut self, name: &str) {
        self.buckets.entry(Self::key(name, 0)).or_default();
        self.buckets.entry(Self::key(name, 1)).or_default();
    }

    /// Append a handler to the `(switch, state)` bucket and return its key.
    pub fn add_handler(
        &mut self,
        switch: &str,
        callback: HandlerCallback,
        state: u8,
        dwell_ms: u64,
    ) -> HandlerKey {
        self.buckets
            .entry(Self::key(switch, state))
            .or_default()
            .push(Entry {
                dwell_ms,
                callback: callback.clone(),
            });
        HandlerKey {
            switch: switch.to_string(),
            state,
            dwell_ms,
            callback,
        }
    }

    /// Remove the first handler whose `(dwell_ms, callback identity)`
    /// matches. Returns `true` if a handler was removed.
    pub fn remove_handler(
        &mut self,
        switch: &str,
        callback: &HandlerCallback,
        state: u8,
        dwell_ms: u64,
    ) -> bool {
        if let Some(bucket) = self.buckets.get_mut(&Self::key(switch, state)) {
            if let Some(pos) = bucket
                .iter()
                .position(|e| e.dwell_ms == dwell_ms && Rc::ptr_eq(&e.callback, callback))
            {
                bucket.remove(pos);
                return true;
            }
        }
        false
    }

    /// Remove the handler identified by a previously returned key.
    pub fn remove_handler_by_key(&mut self, key: &HandlerKey) -> bool {
        self.remove_handler(&key.switch, &key.callback, key.state, key.dwell_ms)
    }

    /// Snapshot the live bucket for `(switch, state)` at the moment of the
    /// call. Callers must re-check membership via [`HandlerRegistry::contains`]
    /// before invoking a snapshotted callback, since a prior callback in the
    /// same dispatch may have removed it.
    pub fn snapshot(&self, switch: &str, state: u8) -> Vec<(u64, HandlerCallback)> {
        self.buckets
            .get(&Self::key(switch, state))
            .map(|bucket| bucket.iter().map(|e| (e.dwell_ms, e.callback.clone())).collect())
            .unwrap_or_default()
    }

    /// True if a handler with this exact identity is still present in the
    /// live bucket.
    pub fn contains(&self, switch: &str, state: u8, dwell_ms: u64, callback: &HandlerCallback) -> bool {
        self.buckets
            .get(&Self::key(switch, state))
            .map(|bucket| {
                bucket
                    .iter()
                    .any(|e| e.dwell_ms == dwell_ms && Rc::ptr_eq(&e.callback, callback))
            })
            .unwrap_or(false)
    }
}
