use log::*;
use serde::{Deserialize, Serialize};

use super::ElanResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::IntoStaticStr)]
pub enum PowerState {
    Awake,
    Asleep,
}

/// Device side of a power transition
pub trait PowerHooks {
    /// Brings the device back into absolute reporting mode
    fn wake(&mut self) -> ElanResult<()>;

    /// Puts the device to sleep
    fn sleep(&mut self) -> ElanResult<()>;
}

/// Host power state tracking.
///
/// Transitions never fail: the recorded state always follows the host's
/// request, device errors are only logged.
pub struct PowerController {
    state: PowerState,
}

impl Default for PowerController {
    fn default() -> Self {
        Self {
            state: PowerState::Awake,
        }
    }
}

impl PowerController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> PowerState {
        self.state
    }

    /// Moves to `target`. Returns whether a transition took place.
    pub fn set_state(&mut self, target: PowerState, hooks: &mut impl PowerHooks) -> bool {
        if target == self.state {
            trace!("power state already {:?}", target);
            return false;
        }

        match target {
            PowerState::Asleep => {
                if let Err(e) = hooks.sleep() {
                    error!("failed to put touchpad to sleep: {}", e);
                }
            }
            PowerState::Awake => {
                if let Err(e) = hooks.wake() {
                    error!("failed to wake touchpad: {}", e);
                }
            }
        }
        self.transition(target)
    }

    /// Records a transition whose device side the caller takes care of.
    /// Returns whether the state changed.
    pub fn transition(&mut self, target: PowerState) -> bool {
        if target == self.state {
            trace!("power state already {:?}", target);
            return false;
        }

        info!("power state {:?} -> {:?}", self.state, target);
        self.state = target;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elan::ElanError;
    use crate::smbus::TransportError;

    #[derive(Default)]
    struct FakeHooks {
        wakes: usize,
        sleeps: usize,
        fail: bool,
    }

    impl PowerHooks for FakeHooks {
        fn wake(&mut self) -> ElanResult<()> {
            self.wakes += 1;
            if self.fail {
                return Err(ElanError::HandshakeFailed { hello: [0; 5] });
            }
            Ok(())
        }

        fn sleep(&mut self) -> ElanResult<()> {
            self.sleeps += 1;
            if self.fail {
                return Err(ElanError::Transport(TransportError::Nak));
            }
            Ok(())
        }
    }

    #[test]
    fn starts_awake() {
        assert_eq!(PowerController::new().state(), PowerState::Awake);
    }

    #[test]
    fn sleep_and_wake() {
        let mut p = PowerController::new();
        let mut h = FakeHooks::default();

        assert!(p.set_state(PowerState::Asleep, &mut h));
        assert_eq!(p.state(), PowerState::Asleep);
        assert_eq!((h.wakes, h.sleeps), (0, 1));

        assert!(p.set_state(PowerState::Awake, &mut h));
        assert_eq!(p.state(), PowerState::Awake);
        assert_eq!((h.wakes, h.sleeps), (1, 1));
    }

    #[test]
    fn same_state_is_noop() {
        let mut p = PowerController::new();
        let mut h = FakeHooks::default();

        assert!(!p.set_state(PowerState::Awake, &mut h));
        p.set_state(PowerState::Asleep, &mut h);
        assert!(!p.set_state(PowerState::Asleep, &mut h));
        assert_eq!((h.wakes, h.sleeps), (0, 1));
    }

    #[test]
    fn failures_still_transition() {
        let mut p = PowerController::new();
        let mut h = FakeHooks {
            fail: true,
            ..Default::default()
        };

        assert!(p.set_state(PowerState::Asleep, &mut h));
        assert_eq!(p.state(), PowerState::Asleep);
        assert!(p.set_state(PowerState::Awake, &mut h));
        assert_eq!(p.state(), PowerState::Awake);
    }

    #[test]
    fn transition_without_hooks() {
        let mut p = PowerController::new();

        assert!(!p.transition(PowerState::Awake));
        assert!(p.transition(PowerState::Asleep));
        assert_eq!(p.state(), PowerState::Asleep);
        assert!(p.transition(PowerState::Awake));
        assert_eq!(p.state(), PowerState::Awake);
    }
}
