//! Keyboard-driven toggling of accessibility features: five Shift taps in a
//! row toggle sticky keys, holding Shift for eight seconds toggles slow
//! keys.

use crate::event::KeyState;
use crate::keys;

use super::KeyEvent;

/// Maximum gap between Shift taps for them to count as one sequence.
const TAP_WINDOW_US: u64 = 500_000;
pub(super) const SLOW_HOLD_MS: u64 = 8_000;
const TAPS_FOR_STICKY: u32 = 5;

#[derive(Debug, Default)]
pub struct EnableKeys {
    taps: u32,
    last_tap_us: Option<u64>,
    hold_armed: bool,
}

#[derive(Debug, PartialEq, Eq)]
pub enum EnableKeysEffect {
    ToggleStickyKeys,
    ArmSlowHold,
    CancelSlowHold,
}

impl EnableKeys {
    /// Observe a key event (never consumes it) and report side effects.
    pub fn observe(&mut self, ev: &KeyEvent) -> Vec<EnableKeysEffect> {
        let mut effects = Vec::new();
        if keys::is_shift(ev.key) {
            match ev.state {
                KeyState::Pressed => {
                    let consecutive = self
                        .last_tap_us
                        .map(|last| ev.time_us.saturating_sub(last) <= TAP_WINDOW_US)
                        .unwrap_or(false);
                    self.taps = if consecutive { self.taps + 1 } else { 1 };
                    self.last_tap_us = Some(ev.time_us);
                    if self.taps >= TAPS_FOR_STICKY {
                        self.taps = 0;
                        self.last_tap_us = None;
                        effects.push(EnableKeysEffect::ToggleStickyKeys);
                    }
                    if !self.hold_armed {
                        self.hold_armed = true;
                        effects.push(EnableKeysEffect::ArmSlowHold);
                    }
                }
                KeyState::Released => {
                    if self.hold_armed {
                        self.hold_armed = false;
                        effects.push(EnableKeysEffect::CancelSlowHold);
                    }
                }
            }
        } else if ev.state == KeyState::Pressed {
            // any other key breaks both gestures
            self.taps = 0;
            self.last_tap_us = None;
            if self.hold_armed {
                self.hold_armed = false;
                effects.push(EnableKeysEffect::CancelSlowHold);
            }
        }
        effects
    }

    /// The slow-keys hold timer fired while Shift was still down.
    pub fn hold_fired(&mut self) {
        self.hold_armed = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceId;

    fn shift(time_us: u64, state: KeyState) -> KeyEvent {
        KeyEvent {
            device: DeviceId::next(),
            time_us,
            key: keys::KEY_LEFTSHIFT,
            state,
        }
    }

    fn tap(stage: &mut EnableKeys, at_us: u64) -> Vec<EnableKeysEffect> {
        let mut effects = stage.observe(&shift(at_us, KeyState::Pressed));
        effects.extend(stage.observe(&shift(at_us + 50_000, KeyState::Released)));
        effects
    }

    #[test]
    fn five_quick_taps_toggle_sticky() {
        let mut stage = EnableKeys::default();
        for i in 0..4 {
            let effects = tap(&mut stage, i * 200_000);
            assert!(!effects.contains(&EnableKeysEffect::ToggleStickyKeys));
        }
        let effects = tap(&mut stage, 4 * 200_000);
        assert!(effects.contains(&EnableKeysEffect::ToggleStickyKeys));
    }

    #[test]
    fn slow_taps_do_not_toggle() {
        let mut stage = EnableKeys::default();
        for i in 0..10 {
            let effects = tap(&mut stage, i * 2_000_000);
            assert!(!effects.contains(&EnableKeysEffect::ToggleStickyKeys));
        }
    }

    #[test]
    fn other_key_resets_tap_count() {
        let mut stage = EnableKeys::default();
        for i in 0..4 {
            tap(&mut stage, i * 200_000);
        }
        stage.observe(&KeyEvent {
            device: DeviceId::next(),
            time_us: 850_000,
            key: 30, // KEY_A
            state: KeyState::Pressed,
        });
        let effects = tap(&mut stage, 900_000);
        assert!(!effects.contains(&EnableKeysEffect::ToggleStickyKeys));
    }

    #[test]
    fn hold_timer_armed_on_press_cancelled_on_release() {
        let mut stage = EnableKeys::default();
        let effects = stage.observe(&shift(0, KeyState::Pressed));
        assert!(effects.contains(&EnableKeysEffect::ArmSlowHold));
        let effects = stage.observe(&shift(1_000_000, KeyState::Released));
        assert!(effects.contains(&EnableKeysEffect::CancelSlowHold));
    }
}
