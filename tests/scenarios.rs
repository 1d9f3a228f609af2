//! Integration tests for the six concrete dispatch scenarios, driven
//! against a `FakeClock` so dwell/recycle timing is exact and
//! deterministic.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use switchcore::{FakeClock, MonitoredChange, NoopEventSink, Platform, PlatformId, SwitchConfig, SwitchController};

const PLATFORM: PlatformId = 7;

struct FakePlatform {
    states: RefCell<HashMap<u32, u8>>,
}

impl FakePlatform {
    fn new() -> Rc<Self> {
        Rc::new(Self {
            states: RefCell::new(HashMap::new()),
        })
    }

    fn set(&self, number: u32, raw: u8) {
        self.states.borrow_mut().insert(number, raw);
    }
}

impl Platform for FakePlatform {
    fn id(&self) -> PlatformId {
        PLATFORM
    }

    fn read_all_states(&self) -> HashMap<u32, u8> {
        self.states.borrow().clone()
    }
}

fn controller() -> (SwitchController, Rc<FakeClock>) {
    let clock = Rc::new(FakeClock::new());
    let controller = SwitchController::new(clock.clone(), Rc::new(NoopEventSink));
    (controller, clock)
}

mod basic_activation {
    use super::*;

    #[test]
    fn activating_an_unwatched_switch_notifies_monitors_only() {
        // Arrange
        let (controller, _clock) = controller();
        controller.register_switch(SwitchConfig::new("ball_1", 1, PLATFORM));
        let seen: Rc<RefCell<Vec<MonitoredChange>>> = Rc::new(RefCell::new(Vec::new()));
        let seen_clone = seen.clone();
        controller.add_monitor(Rc::new(move |change: &MonitoredChange| {
            seen_clone.borrow_mut().push(change.clone());
        }));

        // Act
        controller.process_switch("ball_1", 1, true).unwrap();

        // Assert
        assert!(controller.is_active("ball_1", 0).unwrap());
        assert_eq!(seen.borrow().len(), 1);
        assert_eq!(seen.borrow()[0].new_state, 1);
    }
}

mod nc_inversion {
    use super::*;

    #[test]
    fn physical_low_on_inverted_switch_reads_as_active() {
        // Arrange
        let (controller, _clock) = controller();
        controller.register_switch(SwitchConfig::new("tilt", 1, PLATFORM).inverted(true));

        // Act: physical input, wire level 0
        controller.process_switch("tilt", 0, false).unwrap();

        // Assert: logical state flips to active
        assert!(controller.is_active("tilt", 0).unwrap());
    }
}

mod dwell_handler {
    use super::*;

    #[test]
    fn fires_only_after_full_dwell_and_is_cancelled_by_early_deactivation() {
        // Arrange
        let (controller, clock) = controller();
        controller.register_switch(SwitchConfig::new("flipper", 1, PLATFORM));
        let fired = Rc::new(RefCell::new(0));
        let fired_clone = fired.clone();
        controller
            .add_handler(
                "flipper",
                move |_ctx| {
                    *fired_clone.borrow_mut() += 1;
                    Ok(())
                },
                1,
                250,
                false,
                serde_json::Value::Null,
            )
            .unwrap();

        // Act: activate at t=0, check at t=0.20 (not due), then t=0.25 (due)
        controller.process_switch("flipper", 1, true).unwrap();
        clock.advance(0.20);
        controller.tick().unwrap();
        assert_eq!(*fired.borrow(), 0, "dwell not yet satisfied");

        clock.advance(0.05);
        controller.tick().unwrap();

        // Assert
        assert_eq!(*fired.borrow(), 1);
    }

    #[test]
    fn early_deactivation_cancels_the_pending_firing() {
        // Arrange
        let (controller, clock) = controller();
        controller.register_switch(SwitchConfig::new("flipper", 1, PLATFORM));
        let fired = Rc::new(RefCell::new(0));
        let fired_clone = fired.clone();
        controller
            .add_handler(
                "flipper",
                move |_ctx| {
                    *fired_clone.borrow_mut() += 1;
                    Ok(())
                },
                1,
                250,
                false,
                serde_json::Value::Null,
            )
            .unwrap();

        // Act
        controller.process_switch("flipper", 1, true).unwrap();
        clock.advance(0.20);
        controller.process_switch("flipper", 0, true).unwrap();
        clock.advance(0.10);
        controller.tick().unwrap();

        // Assert
        assert_eq!(*fired.borrow(), 0, "cancelled pending must never fire");
    }
}

mod late_join {
    use super::*;

    #[test]
    fn handler_registered_mid_dwell_still_fires_at_the_original_deadline() {
        // Arrange
        let (controller, clock) = controller();
        controller.register_switch(SwitchConfig::new("slingshot", 1, PLATFORM));
        controller.process_switch("slingshot", 1, true).unwrap();
        clock.advance(0.10);

        let fired = Rc::new(RefCell::new(0));
        let fired_clone = fired.clone();

        // Act: register a 300ms-dwell handler 100ms into the activation
        controller
            .add_handler(
                "slingshot",
                move |_ctx| {
                    *fired_clone.borrow_mut() += 1;
                    Ok(())
                },
                1,
                300,
                false,
                serde_json::Value::Null,
            )
            .unwrap();

        clock.advance(0.19);
        controller.tick().unwrap();
        assert_eq!(*fired.borrow(), 0, "not due until t=0.30");

        clock.advance(0.01);
        controller.tick().unwrap();

        // Assert
        assert_eq!(*fired.borrow(), 1);
    }
}

mod recycle_gate {
    use super::*;

    #[test]
    fn rejected_activation_is_retried_once_the_window_clears() {
        // Arrange
        let (controller, clock) = controller();
        let platform = FakePlatform::new();
        controller.register_platform(platform.clone());
        controller.register_switch(
            SwitchConfig::new("pop", 1, PLATFORM).recycle_seconds(0.5),
        );
        platform.set(1, 1);

        let activations = Rc::new(RefCell::new(0));
        let activations_clone = activations.clone();
        controller
            .add_handler(
                "pop",
                move |_ctx| {
                    *activations_clone.borrow_mut() += 1;
                    Ok(())
                },
                1,
                0,
                false,
                serde_json::Value::Null,
            )
            .unwrap();

        // Act: accepted at t=0
        controller.process_switch("pop", 1, true).unwrap();
        assert_eq!(*activations.borrow(), 1);

        // A re-hit at t=0.2 is within the recycle window and must be rejected
        clock.advance(0.2);
        controller.process_switch("pop", 1, true).unwrap();
        assert_eq!(*activations.borrow(), 1, "rejected hit must not fire handlers");

        // At t=0.5 the retry fires; "pop" never left state 1 in between, so
        // the retry is correctly suppressed as a duplicate, not a second
        // activation.
        clock.advance(0.3);

        // Assert
        assert_eq!(*activations.borrow(), 1);
    }

    #[test]
    fn retry_fires_the_handler_when_the_switch_genuinely_cycled() {
        // Arrange
        let (controller, clock) = controller();
        controller.register_switch(SwitchConfig::new("pop", 1, PLATFORM).recycle_seconds(0.5));
        let activations = Rc::new(RefCell::new(0));
        let activations_clone = activations.clone();
        controller
            .add_handler(
                "pop",
                move |_ctx| {
                    *activations_clone.borrow_mut() += 1;
                    Ok(())
                },
                1,
                0,
                false,
                serde_json::Value::Null,
            )
            .unwrap();

        // Act: activate at t=0 (accepted), deactivate at t=0.1, re-activate
        // at t=0.2 while still inside the recycle window (rejected, retry
        // scheduled for t=0.5).
        controller.process_switch("pop", 1, true).unwrap();
        clock.advance(0.1);
        controller.process_switch("pop", 0, true).unwrap();
        clock.advance(0.1);
        controller.process_switch("pop", 1, true).unwrap();
        assert_eq!(*activations.borrow(), 1, "rejected hit must not fire yet");

        clock.advance(0.3);

        // Assert: the retry re-activates, since the switch is genuinely
        // inactive-then-active rather than a duplicate.
        assert_eq!(*activations.borrow(), 2);
    }
}

mod wait_for_any {
    use super::*;

    #[tokio::test(flavor = "current_thread")]
    async fn resolves_with_the_first_switch_and_cleans_up_the_rest() {
        // Arrange
        let (controller, clock) = controller();
        controller.register_switch(SwitchConfig::new("a", 1, PLATFORM));
        controller.register_switch(SwitchConfig::new("b", 2, PLATFORM));

        let fut = controller.wait_for_any(&["a", "b"], 1, true, 0).unwrap();

        // Act: b wins
        clock.advance(0.1);
        controller.process_switch("b", 1, true).unwrap();
        let result = fut.await;

        // Assert
        assert_eq!(result.switch, "b");

        // A later hit on "a" must not find any surviving transient handler.
        let before = Rc::new(RefCell::new(0));
        let before_clone = before.clone();
        controller
            .add_handler(
                "a",
                move |_ctx| {
                    *before_clone.borrow_mut() += 1;
                    Ok(())
                },
                1,
                0,
                false,
                serde_json::Value::Null,
            )
            .unwrap();
        controller.process_switch("a", 1, true).unwrap();
        assert_eq!(*before.borrow(), 1, "only the freshly-added handler fires");
    }

    #[tokio::test(flavor = "current_thread")]
    async fn only_on_change_false_resolves_immediately_if_already_satisfied() {
        // Arrange
        let (controller, _clock) = controller();
        controller.register_switch(SwitchConfig::new("ball_in_play", 1, PLATFORM));
        controller.process_switch("ball_in_play", 1, true).unwrap();

        // Act
        let fut = controller.wait_for_any(&["ball_in_play"], 1, false, 0).unwrap();
        let result = fut.await;

        // Assert
        assert_eq!(result.switch, "ball_in_play");
    }
}

mod hardware_sync {
    use super::*;

    #[test]
    fn refresh_then_verify_agree_with_no_intervening_change() {
        // Arrange
        let (controller, _clock) = controller();
        let platform = FakePlatform::new();
        controller.register_platform(platform.clone());
        controller.register_switch(SwitchConfig::new("flipper_l", 1, PLATFORM));
        controller.register_switch(SwitchConfig::new("trough_1", 2, PLATFORM).inverted(true));
        platform.set(1, 1);
        platform.set(2, 0); // inverted, physical-low means active

        // Act
        controller.refresh_from_hardware().unwrap();

        // Assert
        assert!(controller.is_active("flipper_l", 0).unwrap());
        assert!(controller.is_active("trough_1", 0).unwrap());
        assert!(
            controller.verify_against_hardware().unwrap(),
            "hardware hasn't moved since the refresh, so verify must agree"
        );
    }

    #[test]
    fn verify_reports_false_once_hardware_drifts_from_software() {
        // Arrange
        let (controller, _clock) = controller();
        let platform = FakePlatform::new();
        controller.register_platform(platform.clone());
        controller.register_switch(SwitchConfig::new("flipper_l", 1, PLATFORM));
        platform.set(1, 0);
        controller.refresh_from_hardware().unwrap();

        // Act: hardware changes without going through process_switch.
        platform.set(1, 1);

        // Assert
        assert!(!controller.verify_against_hardware().unwrap());
    }
}
