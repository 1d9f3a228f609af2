//! Monotonic clock and one-shot timer scheduling.
//!
//! The controller never reads wall time directly; every time-sensitive
//! operation goes through a `Clock` so tests can drive dwell/recycle
//! behavior deterministically. Grounded on the cancellation/notification
//! style of `knhk-workflow-engine/src/concurrency/cancel_token.rs`, adapted
//! from a multi-threaded `Arc`/`parking_lot` token to the single-threaded
//! `Rc`/`RefCell` model this crate's concurrency section mandates.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// Opaque handle to a scheduled one-shot callback, usable with `Clock::cancel`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle(u64);

/// A nullary, non-fallible callback scheduled on the clock.
///
/// Timer callbacks cannot propagate errors to a caller (there is no caller;
/// they fire asynchronously off the clock), so any fallible work a timer
/// callback performs must handle its own errors, typically by logging them.
pub type TimerCallback = Rc<dyn Fn()>;

/// Monotonic time source plus one-shot timer scheduling, consumed by the
/// controller and implemented by the framework's event loop.
pub trait Clock {
    /// Current monotonic time, in fractional seconds, arbitrary epoch.
    fn now(&self) -> f64;

    /// Schedule `callback` to run once, `delay_seconds` from now. A
    /// non-positive delay fires on the next drive of the loop.
    fn schedule_once(&self, callback: TimerCallback, delay_seconds: f64) -> TimerHandle;

    /// Cancel a previously scheduled callback. Canceling a handle that has
    /// already fired or was already canceled is a no-op.
    fn cancel(&self, handle: TimerHandle);
}

/// A single-threaded, manually-driven clock for tests and for embedding in
/// a host loop that doesn't want a Tokio reactor.
///
/// Time only advances when the test calls [`FakeClock::advance`]; scheduled
/// callbacks whose deadline has passed fire at that point, in the order they
/// were scheduled, self-reentrantly (a callback firing may schedule another,
/// which will also be drained in the same `advance` if its delay is zero or
/// negative).
#[derive(Clone, Default)]
pub struct FakeClock {
    inner: Rc<RefCell<FakeClockInner>>,
}

#[derive(Default)]
struct FakeClockInner {
    now: f64,
    next_id: u64,
    pending: HashMap<u64, (f64, TimerCallback)>,
}

impl FakeClock {
    /// Create a fake clock starting at `t = 0.0`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance time by `delta_seconds`, firing every due callback along the
    /// way (including ones scheduled by other callbacks during this call).
    pub fn advance(&self, delta_seconds: f64) {
        let target = {
            let mut inner = self.inner.borrow_mut();
            inner.now += delta_seconds;
            inner.now
        };
        loop {
            let due = {
                let inner = self.inner.borrow();
                inner
                    .pending
                    .iter()
                    .filter(|(_, (deadline, _))| *deadline <= target)
                    .map(|(id, (deadline, _))| (*id, *deadline))
                    .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap())
                    .map(|(id, _)| id)
            };
            let Some(id) = due else { break };
            let callback = {
                let mut inner = self.inner.borrow_mut();
                inner.pending.remove(&id).map(|(_, cb)| cb)
            };
            if let Some(callback) = callback {
                callback();
            }
        }
    }
}

impl Clock for FakeClock {
    fn now(&self) -> f64 {
        self.inner.borrow().now
    }

    fn schedule_once(&self, callback: TimerCallback, delay_seconds: f64) -> TimerHandle {
        let mut inner = self.inner.borrow_mut();
        let id = inner.next_id;
        inner.next_id += 1;
        let deadline = inner.now + delay_seconds;
        inner.pending.insert(id, (deadline, callback));
        TimerHandle(id)
    }

    fn cancel(&self, handle: TimerHandle) {
        self.inner.borrow_mut().pending.remove(&handle.0);
    }
}

/// Production clock backed by `tokio::time`, meant to be driven inside a
/// single-threaded `tokio::task::LocalSet` so scheduled callbacks (which are
/// `Rc`-based and therefore `!Send`) can run via `spawn_local`.
#[derive(Clone, Default)]
pub struct LocalClock {
    inner: Rc<RefCell<LocalClockInner>>,
}

struct LocalClockInner {
    epoch: tokio::time::Instant,
    next_id: u64,
    handles: HashMap<u64, tokio::task::JoinHandle<()>>,
}

impl Default for LocalClockInner {
    fn default() -> Self {
        Self {
            epoch: tokio::time::Instant::now(),
            next_id: 0,
            handles: HashMap::new(),
        }
    }
}

impl LocalClock {
    /// Create a new local clock, pinning `t = 0.0` to the moment of
    /// construction. Must be used from within a `LocalSet`.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Clock for LocalClock {
    fn now(&self) -> f64 {
        let epoch = self.inner.borrow().epoch;
        tokio::time::Instant::now()
            .saturating_duration_since(epoch)
            .as_secs_f64()
    }

    fn schedule_once(&self, callback: TimerCallback, delay_seconds: f64) -> TimerHandle {
        let mut inner = self.inner.borrow_mut();
        let id = inner.next_id;
        inner.next_id += 1;
        let delay = std::time::Duration::from_secs_f64(delay_seconds.max(0.0));
        let join = tokio::task::spawn_local(async move {
            tokio::time::sleep(delay).await;
            callback();
        });
        inner.handles.insert(id, join);
        TimerHandle(id)
    }

    fn cancel(&self, handle: TimerHandle) {
        if let Some(join) = self.inner.borrow_mut().handles.remove(&handle.0) {
            join.abort();
        }
    }
}
