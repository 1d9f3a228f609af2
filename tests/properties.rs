//! Property tests over the universal invariants from the dispatcher's
//! testable-properties list, run against `FakeClock` for deterministic
//! dwell timing.

use std::cell::RefCell;
use std::rc::Rc;

use proptest::prelude::*;
use switchcore::{FakeClock, NoopEventSink, SwitchConfig, SwitchController};

const PLATFORM: u32 = 1;

fn fresh_controller(name: &str) -> (SwitchController, Rc<FakeClock>) {
    let clock = Rc::new(FakeClock::new());
    let controller = SwitchController::new(clock.clone(), Rc::new(NoopEventSink));
    controller.register_switch(SwitchConfig::new(name, 1, PLATFORM));
    (controller, clock)
}

proptest! {
    /// For any accepted (non-duplicate) transition, the state store
    /// immediately reflects it with zero dwell elapsed; a duplicate hit of
    /// the already-current state leaves the store untouched.
    #[test]
    fn accepted_transition_is_immediately_reflected(states in prop::collection::vec(0u8..=1, 1..20)) {
        let (controller, clock) = fresh_controller("switch_a");
        let mut current = 0u8; // registration seeds state 0
        for state in states {
            controller.process_switch("switch_a", state, true).unwrap();
            clock.advance(0.01);
            if state != current {
                prop_assert!(controller.is_state("switch_a", state, 0).unwrap());
                current = state;
            } else {
                prop_assert!(controller.is_state("switch_a", current, 0).unwrap());
            }
        }
    }

    /// A dwell-gated handler fires exactly once if the switch holds its
    /// target state for the full dwell, and never fires if it leaves early.
    #[test]
    fn dwell_handler_fires_iff_dwell_is_satisfied(dwell_ms in 10u64..500, hold_ms in 0u64..600) {
        let (controller, clock) = fresh_controller("switch_b");
        let fire_count = Rc::new(RefCell::new(0));
        let fire_count_clone = fire_count.clone();
        controller.add_handler(
            "switch_b",
            move |_ctx| {
                *fire_count_clone.borrow_mut() += 1;
                Ok(())
            },
            1,
            dwell_ms,
            false,
            serde_json::Value::Null,
        ).unwrap();

        controller.process_switch("switch_b", 1, true).unwrap();
        clock.advance((hold_ms as f64) / 1000.0);
        if hold_ms < dwell_ms {
            controller.process_switch("switch_b", 0, true).unwrap();
        }
        // drain whatever is due regardless of which branch ran
        clock.advance((dwell_ms as f64) / 1000.0 + 0.01);
        controller.tick().unwrap();

        if hold_ms < dwell_ms {
            prop_assert_eq!(*fire_count.borrow(), 0);
        } else {
            prop_assert_eq!(*fire_count.borrow(), 1);
        }
    }

    /// An inverted switch's logical state is always the opposite of the
    /// physical wire level it was fed, regardless of whether the caller
    /// labeled the input logical or physical.
    #[test]
    fn inverted_switch_always_flips_relative_to_physical_level(raw in 0u8..=1, logical in any::<bool>()) {
        let clock = Rc::new(FakeClock::new());
        let controller = SwitchController::new(clock, Rc::new(NoopEventSink));
        controller.register_switch(SwitchConfig::new("tilt", 1, PLATFORM).inverted(true));

        controller.process_switch("tilt", raw, logical).unwrap();

        if logical {
            // raw *is* the desired logical state already
            prop_assert_eq!(controller.is_state("tilt", raw, 0).unwrap(), true);
        } else {
            prop_assert_eq!(controller.is_state("tilt", raw ^ 1, 0).unwrap(), true);
        }
    }

    /// Monitor notifications are exactly one per accepted transition; a
    /// duplicate (same-state) hit with no recycle window produces no
    /// additional notification.
    #[test]
    fn monitor_count_matches_accepted_transition_count(states in prop::collection::vec(0u8..=1, 1..15)) {
        let (controller, _clock) = fresh_controller("switch_c");
        let count = Rc::new(RefCell::new(0));
        let count_clone = count.clone();
        controller.add_monitor(Rc::new(move |_change: &switchcore::MonitoredChange| {
            *count_clone.borrow_mut() += 1;
        }));

        let mut current = 0u8;
        let mut accepted = 0;
        for state in states {
            if state != current {
                accepted += 1;
            }
            current = state;
            controller.process_switch("switch_c", state, true).unwrap();
        }

        prop_assert_eq!(*count.borrow(), accepted);
    }
}
