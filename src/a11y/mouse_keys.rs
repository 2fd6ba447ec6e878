//! Mouse keys: the numeric keypad drives the pointer.
//!
//! Numpad digits 1-4 and 6-9 move the pointer in the eight compass
//! directions while held, 5 clicks the selected button, slash/asterisk/minus
//! select the left/middle/right button, 0 starts a drag and dot ends it.
//! Motion accelerates from zero towards a configured maximum. The whole
//! remap is bypassed while NumLock is on, so the keypad still types digits.

use crate::config::MouseKeysConfig;
use crate::event::{ButtonState, KeyState};
use crate::keys;

use super::KeyEvent;

/// Motion timer period.
pub(super) const TICK_MS: u64 = 16;

#[derive(Debug, PartialEq)]
pub enum MouseKeysEffect {
    /// Arm the motion timer with the configured initial delay.
    StartTick,
    StopTick,
    Button { button: u32, state: ButtonState },
}

#[derive(Debug)]
pub struct MouseKeys {
    cfg: MouseKeysConfig,
    /// Held motion key and its unit direction.
    motion: Option<(u32, (f64, f64))>,
    /// Timer fires since the motion key went down. Elapsed hold time is
    /// derived from this count; event timestamps and the timer run on
    /// different clocks and never mix here.
    ticks: u64,
    selected_button: u32,
    dragging: bool,
}

fn direction_for(key: u32) -> Option<(f64, f64)> {
    use crate::keys::*;
    let dir = match key {
        KEY_KP1 => (-1.0, 1.0),
        KEY_KP2 => (0.0, 1.0),
        KEY_KP3 => (1.0, 1.0),
        KEY_KP4 => (-1.0, 0.0),
        KEY_KP6 => (1.0, 0.0),
        KEY_KP7 => (-1.0, -1.0),
        KEY_KP8 => (0.0, -1.0),
        KEY_KP9 => (1.0, -1.0),
        _ => return None,
    };
    Some(dir)
}

impl MouseKeys {
    pub fn new(cfg: MouseKeysConfig) -> Self {
        Self {
            cfg,
            motion: None,
            ticks: 0,
            selected_button: keys::BTN_LEFT,
            dragging: false,
        }
    }

    pub fn set_config(&mut self, cfg: MouseKeysConfig) {
        self.cfg = cfg;
    }

    pub fn init_delay_ms(&self) -> u64 {
        u64::from(self.cfg.init_delay_ms)
    }

    /// Handle a key event. `None` means the key is not ours and must be
    /// forwarded; `Some(effects)` means the event is consumed.
    pub fn handle(&mut self, ev: &KeyEvent, numlock: bool) -> Option<Vec<MouseKeysEffect>> {
        if numlock {
            return None;
        }
        if let Some(dir) = direction_for(ev.key) {
            return Some(match ev.state {
                KeyState::Pressed => {
                    if self.motion.is_some() {
                        // second motion key while one is held replaces it,
                        // keeping the acceleration ramp
                        self.motion = Some((ev.key, dir));
                        vec![]
                    } else {
                        self.motion = Some((ev.key, dir));
                        self.ticks = 0;
                        vec![MouseKeysEffect::StartTick]
                    }
                }
                KeyState::Released => {
                    if matches!(self.motion, Some((key, _)) if key == ev.key) {
                        self.motion = None;
                        vec![MouseKeysEffect::StopTick]
                    } else {
                        vec![]
                    }
                }
            });
        }
        match ev.key {
            keys::KEY_KP5 => Some(vec![MouseKeysEffect::Button {
                button: self.selected_button,
                state: match ev.state {
                    KeyState::Pressed => ButtonState::Pressed,
                    KeyState::Released => ButtonState::Released,
                },
            }]),
            keys::KEY_KPSLASH | keys::KEY_KPASTERISK | keys::KEY_KPMINUS => {
                if ev.state == KeyState::Pressed {
                    self.selected_button = match ev.key {
                        keys::KEY_KPSLASH => keys::BTN_LEFT,
                        keys::KEY_KPASTERISK => keys::BTN_MIDDLE,
                        _ => keys::BTN_RIGHT,
                    };
                }
                Some(vec![])
            }
            keys::KEY_KP0 => {
                let mut effects = Vec::new();
                if ev.state == KeyState::Pressed && !self.dragging {
                    self.dragging = true;
                    effects.push(MouseKeysEffect::Button {
                        button: self.selected_button,
                        state: ButtonState::Pressed,
                    });
                }
                Some(effects)
            }
            keys::KEY_KPDOT => {
                let mut effects = Vec::new();
                if ev.state == KeyState::Pressed && self.dragging {
                    self.dragging = false;
                    effects.push(MouseKeysEffect::Button {
                        button: self.selected_button,
                        state: ButtonState::Released,
                    });
                }
                Some(effects)
            }
            _ => None,
        }
    }

    /// The motion timer fired; returns the pointer delta for this tick, or
    /// `None` when the motion key was released in the meantime. The first
    /// fire lands after the initial delay, the rest every [`TICK_MS`].
    pub fn tick(&mut self) -> Option<(f64, f64)> {
        let (_, (dx, dy)) = self.motion?;
        let elapsed_ms = (self.init_delay_ms() + self.ticks * TICK_MS) as f64;
        self.ticks += 1;
        let step = self.speed(elapsed_ms) * TICK_MS as f64 / 1000.0;
        let norm = if dx != 0.0 && dy != 0.0 {
            std::f64::consts::FRAC_1_SQRT_2
        } else {
            1.0
        };
        Some((dx * step * norm, dy * step * norm))
    }

    /// Pointer speed in pixels per second after `elapsed_ms` of held motion.
    /// Ramps as elapsed^1.05 so it feels linear but eases in, capped at the
    /// configured maximum.
    fn speed(&self, elapsed_ms: f64) -> f64 {
        let accel_time = self.cfg.accel_time_ms as f64;
        if accel_time <= 0.0 {
            return self.cfg.max_speed;
        }
        let factor = self.cfg.max_speed / accel_time.powf(1.05);
        (factor * elapsed_ms.max(0.0).powf(1.05)).min(self.cfg.max_speed)
    }

    /// Forget held state, used when the stage is disabled mid-motion.
    pub fn reset(&mut self) -> Vec<MouseKeysEffect> {
        let mut effects = Vec::new();
        if self.motion.take().is_some() {
            effects.push(MouseKeysEffect::StopTick);
        }
        if self.dragging {
            self.dragging = false;
            effects.push(MouseKeysEffect::Button {
                button: self.selected_button,
                state: ButtonState::Released,
            });
        }
        effects
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceId;

    fn ev(key: u32, state: KeyState, time_us: u64) -> KeyEvent {
        KeyEvent {
            device: DeviceId::next(),
            time_us,
            key,
            state,
        }
    }

    fn stage() -> MouseKeys {
        MouseKeys::new(MouseKeysConfig::default())
    }

    #[test]
    fn numlock_disables_remap() {
        let mut mk = stage();
        assert!(mk.handle(&ev(keys::KEY_KP8, KeyState::Pressed, 0), true).is_none());
    }

    /// Ticks until the acceleration ramp is pinned at the cap.
    fn tick_to_cap(mk: &mut MouseKeys) -> (f64, f64) {
        let mut last = (0.0, 0.0);
        for _ in 0..200 {
            last = mk.tick().unwrap();
        }
        last
    }

    #[test]
    fn motion_key_starts_and_stops_tick() {
        let mut mk = stage();
        let effects = mk.handle(&ev(keys::KEY_KP8, KeyState::Pressed, 0), false).unwrap();
        assert_eq!(effects, vec![MouseKeysEffect::StartTick]);
        let effects = mk.handle(&ev(keys::KEY_KP8, KeyState::Released, 100), false).unwrap();
        assert_eq!(effects, vec![MouseKeysEffect::StopTick]);
        assert!(mk.tick().is_none());
    }

    #[test]
    fn acceleration_ramps_and_caps() {
        let mut mk = stage();
        mk.handle(&ev(keys::KEY_KP6, KeyState::Pressed, 0), false).unwrap();

        let (early, _) = mk.tick().unwrap();
        let (later, _) = mk.tick().unwrap();
        assert!(early > 0.0);
        assert!(later > early);

        // far past accel_time the step is pinned at max_speed per second
        let (capped, _) = tick_to_cap(&mut mk);
        let expected = mk.cfg.max_speed * TICK_MS as f64 / 1000.0;
        assert!((capped - expected).abs() < 1e-9);
    }

    #[test]
    fn motion_ignores_device_timestamps() {
        let mut mk = stage();
        // device key timestamps count from boot and are far ahead of the
        // timer; a press stamped that way must still move the pointer
        let boot_relative = 8_000_000_000_000;
        mk.handle(&ev(keys::KEY_KP8, KeyState::Pressed, boot_relative), false)
            .unwrap();
        let (_, dy) = mk.tick().unwrap();
        assert!(dy < 0.0);
    }

    #[test]
    fn diagonal_motion_is_normalized() {
        let mut mk = stage();
        mk.handle(&ev(keys::KEY_KP6, KeyState::Pressed, 0), false).unwrap();
        let (straight, _) = tick_to_cap(&mut mk);
        mk.handle(&ev(keys::KEY_KP6, KeyState::Released, 1), false).unwrap();

        mk.handle(&ev(keys::KEY_KP3, KeyState::Pressed, 2), false).unwrap();
        let (dx, dy) = tick_to_cap(&mut mk);
        let magnitude = (dx * dx + dy * dy).sqrt();
        assert!((magnitude - straight).abs() < 1e-9);
    }

    #[test]
    fn kp5_clicks_selected_button() {
        let mut mk = stage();
        let effects = mk.handle(&ev(keys::KEY_KP5, KeyState::Pressed, 0), false).unwrap();
        assert_eq!(
            effects,
            vec![MouseKeysEffect::Button {
                button: keys::BTN_LEFT,
                state: ButtonState::Pressed
            }]
        );

        mk.handle(&ev(keys::KEY_KPMINUS, KeyState::Pressed, 1), false).unwrap();
        let effects = mk.handle(&ev(keys::KEY_KP5, KeyState::Pressed, 2), false).unwrap();
        assert_eq!(
            effects,
            vec![MouseKeysEffect::Button {
                button: keys::BTN_RIGHT,
                state: ButtonState::Pressed
            }]
        );
    }

    #[test]
    fn drag_with_kp0_and_kpdot() {
        let mut mk = stage();
        let effects = mk.handle(&ev(keys::KEY_KP0, KeyState::Pressed, 0), false).unwrap();
        assert_eq!(
            effects,
            vec![MouseKeysEffect::Button {
                button: keys::BTN_LEFT,
                state: ButtonState::Pressed
            }]
        );
        // repeated KP0 while dragging is a no-op
        let effects = mk.handle(&ev(keys::KEY_KP0, KeyState::Pressed, 1), false).unwrap();
        assert!(effects.is_empty());
        let effects = mk.handle(&ev(keys::KEY_KPDOT, KeyState::Pressed, 2), false).unwrap();
        assert_eq!(
            effects,
            vec![MouseKeysEffect::Button {
                button: keys::BTN_LEFT,
                state: ButtonState::Released
            }]
        );
    }

    #[test]
    fn letter_keys_are_forwarded() {
        let mut mk = stage();
        assert!(mk.handle(&ev(30, KeyState::Pressed, 0), false).is_none());
    }
}
