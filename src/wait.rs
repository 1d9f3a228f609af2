//! The `wait_for_any` promise-like primitive: a single-fire future over a
//! set of `(switch, state, dwell)` watches, with guaranteed exactly-once
//! handler cleanup on resolution *or* cancellation.
//!
//! Grounded on the cancellation-token/cleanup-hook idiom of
//! `knhk-workflow-engine/src/concurrency/cancel_token.rs`, but implemented
//! as a hand-rolled `Future` (rather than `tokio::sync::Notify`) so the
//! cleanup closure can be guaranteed to run from `Drop` even if the future
//! is never polled at all — `Notify` alone has no hook for "never awaited."

use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

/// The outcome of a resolved [`WaitForAny`].
#[derive(Debug, Clone)]
pub struct WaitResult {
    /// The switch whose transition resolved the wait.
    pub switch: String,
    /// The state it transitioned into.
    pub state: u8,
    /// The dwell, in milliseconds, that was required.
    pub dwell_ms: u64,
}

#[derive(Default)]
struct Shared {
    result: Option<WaitResult>,
    waker: Option<Waker>,
}

/// A handle the controller uses to resolve a [`WaitForAny`] the first time
/// any of its watched switches fires. Cloned into each transient handler's
/// closure; only the first call that observes `result.is_none()` wins.
#[derive(Clone, Default)]
pub struct WaitResolver {
    shared: Rc<RefCell<Shared>>,
}

impl WaitResolver {
    /// Resolve with `result`, unless already resolved. Wakes the future's
    /// task if it has been polled at least once.
    pub fn resolve(&self, result: WaitResult) {
        let mut shared = self.shared.borrow_mut();
        if shared.result.is_none() {
            shared.result = Some(result);
            if let Some(waker) = shared.waker.take() {
                waker.wake();
            }
        }
    }
}

/// Single-fire future resolving with the first watched switch transition,
/// or immediately if constructed already-satisfied. Dropping the future
/// before it resolves runs the cleanup hook exactly as if it had resolved,
/// guaranteeing transient handlers are always unregistered.
pub struct WaitForAny {
    resolver: WaitResolver,
    cleanup: Option<Box<dyn FnOnce()>>,
}

impl WaitForAny {
    /// Construct a future that is immediately ready with `result`. Used for
    /// the `only_on_change = false` fast path where a watched switch is
    /// already in the target state.
    pub fn ready(result: WaitResult) -> Self {
        let resolver = WaitResolver::default();
        resolver.resolve(result);
        Self {
            resolver,
            cleanup: None,
        }
    }

    /// Construct a pending future backed by `resolver`, running `cleanup`
    /// exactly once when the future resolves or is dropped.
    pub fn pending(resolver: WaitResolver, cleanup: impl FnOnce() + 'static) -> Self {
        Self {
            resolver,
            cleanup: Some(Box::new(cleanup)),
        }
    }

    /// The resolver this future is watching, so the controller can clone it
    /// into each transient handler before the future itself is returned.
    pub fn resolver(&self) -> WaitResolver {
        self.resolver.clone()
    }
}

impl Future for WaitForAny {
    type Output = WaitResult;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let result = {
            let mut shared = this.resolver.shared.borrow_mut();
            if shared.result.is_some() {
                shared.result.take()
            } else {
                shared.waker = Some(cx.waker().clone());
                None
            }
        };
        match result {
            Some(result) => {
                if let Some(cleanup) = this.cleanup.take() {
                    cleanup();
                }
                Poll::Ready(result)
            }
            None => Poll::Pending,
        }
    }
}

impl Drop for WaitForAny {
    fn drop(&mut self) {
        if let Some(cleanup) = self.cleanup.take() {
            cleanup();
        }
    }
}
