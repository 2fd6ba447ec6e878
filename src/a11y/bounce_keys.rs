//! Bounce keys: ignore a repeated press of the same key within a short
//! window, for users whose fingers bounce on the switch.
//!
//! A single one-shot timer guards the most recently forwarded key; a press
//! of that key while the timer is live is swallowed together with its
//! release.

use crate::event::KeyState;

use super::KeyEvent;

#[derive(Debug, PartialEq, Eq)]
pub enum BounceEffect {
    /// Re-arm the per-seat debounce timer with the configured window.
    ArmTimer,
}

#[derive(Debug, Default)]
pub struct BounceKeys {
    guarded: Option<u32>,
    /// Keys whose press was swallowed; their release must be swallowed too.
    swallowed: Vec<u32>,
}

impl BounceKeys {
    /// Returns `(forward, effects)`; `forward == false` swallows the event.
    pub fn filter(&mut self, ev: &KeyEvent) -> (bool, Vec<BounceEffect>) {
        match ev.state {
            KeyState::Pressed => {
                if self.guarded == Some(ev.key) {
                    if !self.swallowed.contains(&ev.key) {
                        self.swallowed.push(ev.key);
                    }
                    return (false, vec![]);
                }
                self.guarded = Some(ev.key);
                (true, vec![BounceEffect::ArmTimer])
            }
            KeyState::Released => {
                if let Some(i) = self.swallowed.iter().position(|&k| k == ev.key) {
                    self.swallowed.swap_remove(i);
                    return (false, vec![]);
                }
                (true, vec![])
            }
        }
    }

    /// The debounce window elapsed.
    pub fn timer_fired(&mut self) {
        self.guarded = None;
    }

    pub fn reset(&mut self) {
        self.guarded = None;
        self.swallowed.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceId;

    fn ev(key: u32, state: KeyState) -> KeyEvent {
        KeyEvent {
            device: DeviceId::next(),
            time_us: 0,
            key,
            state,
        }
    }

    #[test]
    fn repeat_press_within_window_is_swallowed() {
        let mut bounce = BounceKeys::default();
        let (fwd, effects) = bounce.filter(&ev(30, KeyState::Pressed));
        assert!(fwd);
        assert_eq!(effects, vec![BounceEffect::ArmTimer]);
        assert!(bounce.filter(&ev(30, KeyState::Released)).0);

        // bounced press and its release both vanish
        assert!(!bounce.filter(&ev(30, KeyState::Pressed)).0);
        assert!(!bounce.filter(&ev(30, KeyState::Released)).0);
    }

    #[test]
    fn press_after_timer_passes() {
        let mut bounce = BounceKeys::default();
        bounce.filter(&ev(30, KeyState::Pressed));
        bounce.timer_fired();
        assert!(bounce.filter(&ev(30, KeyState::Pressed)).0);
    }

    #[test]
    fn different_key_replaces_guard() {
        let mut bounce = BounceKeys::default();
        bounce.filter(&ev(30, KeyState::Pressed));
        let (fwd, effects) = bounce.filter(&ev(31, KeyState::Pressed));
        assert!(fwd);
        assert_eq!(effects, vec![BounceEffect::ArmTimer]);
        // the old key is no longer guarded
        assert!(bounce.filter(&ev(30, KeyState::Pressed)).0);
    }
}
