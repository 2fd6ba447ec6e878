//! Keyboard accessibility filter chain.
//!
//! Every key event passes through the chain before reaching xkb and the
//! compositor: enable-keys gesture detection first, then the mouse-keys
//! remap, then bounce keys, slow keys, and finally sticky keys. Stages are
//! plain state machines; anything time-driven is expressed as timer
//! requests which the seat maps onto calloop timers and feeds back through
//! [`FilterChain::timer_fired`].

mod bounce_keys;
mod enable_keys;
mod mouse_keys;
mod slow_keys;
mod sticky_keys;

use bitflags::bitflags;
use tracing::info;

use crate::config::{A11ySettings, MouseKeysConfig};
use crate::device::DeviceId;
use crate::event::{ButtonState, KeyState};

use bounce_keys::{BounceEffect, BounceKeys};
use enable_keys::{EnableKeys, EnableKeysEffect};
use mouse_keys::{MouseKeys, MouseKeysEffect};
use slow_keys::{SlowEffect, SlowKeys};
use sticky_keys::{StickyEffect, StickyKeys};

bitflags! {
    /// Currently enabled accessibility features, reported to the compositor
    /// whenever a keyboard gesture or a settings change flips one.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct A11yFlags: u32 {
        const STICKY_KEYS = 1 << 0;
        const SLOW_KEYS = 1 << 1;
        const BOUNCE_KEYS = 1 << 2;
        const MOUSE_KEYS = 1 << 3;
    }
}

/// Key event as seen by the filter chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub device: DeviceId,
    pub time_us: u64,
    pub key: u32,
    pub state: KeyState,
}

/// Timers the chain asks the seat to run. `SlowKey` is per key code, the
/// others are one per seat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// Shift held long enough to toggle slow keys.
    SlowHoldToggle,
    /// Bounce-keys debounce window.
    Bounce,
    /// Mouse-keys pointer motion tick.
    MouseKeysTick,
    /// Slow-keys hold delay for one key.
    SlowKey(u32),
}

/// What the seat must do as a result of feeding an event or timer into the
/// chain, in order.
#[derive(Debug, PartialEq)]
pub enum A11yAction {
    /// Deliver this key event downstream (xkb update, repeat, queue).
    Forward(KeyEvent),
    /// Rewrite the sticky-managed latched/locked modifier masks.
    SetMods { latched: u32, locked: u32 },
    /// Synthesized pointer motion from mouse keys.
    Pointer { dx: f64, dy: f64 },
    /// Synthesized button from mouse keys.
    Button { button: u32, state: ButtonState },
    Arm { timer: TimerKind, delay_ms: u64 },
    Cancel(TimerKind),
    FlagsChanged(A11yFlags),
}

pub struct FilterChain {
    settings: A11ySettings,
    enable: EnableKeys,
    mouse: MouseKeys,
    bounce: BounceKeys,
    slow: SlowKeys,
    sticky: StickyKeys,
}

impl FilterChain {
    pub fn new(settings: A11ySettings, mouse_cfg: MouseKeysConfig) -> Self {
        Self {
            settings,
            enable: EnableKeys::default(),
            mouse: MouseKeys::new(mouse_cfg),
            bounce: BounceKeys::default(),
            slow: SlowKeys::default(),
            sticky: StickyKeys::default(),
        }
    }

    pub fn flags(&self) -> A11yFlags {
        let mut flags = A11yFlags::empty();
        flags.set(A11yFlags::STICKY_KEYS, self.settings.sticky_keys);
        flags.set(A11yFlags::SLOW_KEYS, self.settings.slow_keys);
        flags.set(A11yFlags::BOUNCE_KEYS, self.settings.bounce_keys);
        flags.set(A11yFlags::MOUSE_KEYS, self.settings.mouse_keys);
        flags
    }

    pub fn settings(&self) -> &A11ySettings {
        &self.settings
    }

    /// Replace the settings, winding down stages that were switched off.
    pub fn set_settings(
        &mut self,
        settings: A11ySettings,
        mouse_cfg: MouseKeysConfig,
    ) -> Vec<A11yAction> {
        let old_flags = self.flags();
        let mut actions = Vec::new();
        if self.settings.mouse_keys && !settings.mouse_keys {
            actions.extend(self.mouse.reset().into_iter().map(map_mouse));
        }
        if self.settings.bounce_keys && !settings.bounce_keys {
            self.bounce.reset();
            actions.push(A11yAction::Cancel(TimerKind::Bounce));
        }
        if self.settings.slow_keys && !settings.slow_keys {
            actions.extend(self.slow.reset().into_iter().map(map_slow));
        }
        if self.settings.sticky_keys && !settings.sticky_keys {
            actions.extend(self.sticky.reset().into_iter().map(map_sticky));
        }
        self.mouse.set_config(mouse_cfg);
        self.settings = settings;
        let flags = self.flags();
        if flags != old_flags {
            actions.push(A11yAction::FlagsChanged(flags));
        }
        actions
    }

    /// Run a key event through the chain. `mod_mask` maps an evdev code to
    /// the xkb modifier mask it contributes (0 for non-modifiers).
    pub fn process(
        &mut self,
        ev: KeyEvent,
        numlock: bool,
        mod_mask: impl Fn(u32) -> u32,
    ) -> Vec<A11yAction> {
        let mut actions = Vec::new();

        if self.settings.enable_keys {
            for effect in self.enable.observe(&ev) {
                match effect {
                    EnableKeysEffect::ToggleStickyKeys => {
                        self.toggle_sticky(&mut actions);
                    }
                    EnableKeysEffect::ArmSlowHold => actions.push(A11yAction::Arm {
                        timer: TimerKind::SlowHoldToggle,
                        delay_ms: enable_keys::SLOW_HOLD_MS,
                    }),
                    EnableKeysEffect::CancelSlowHold => {
                        actions.push(A11yAction::Cancel(TimerKind::SlowHoldToggle))
                    }
                }
            }
        }

        if self.settings.mouse_keys {
            if let Some(effects) = self.mouse.handle(&ev, numlock) {
                actions.extend(effects.into_iter().map(map_mouse_arm(&self.mouse)));
                return actions;
            }
        }

        if self.settings.bounce_keys {
            let (forward, effects) = self.bounce.filter(&ev);
            for effect in effects {
                match effect {
                    BounceEffect::ArmTimer => actions.push(A11yAction::Arm {
                        timer: TimerKind::Bounce,
                        delay_ms: u64::from(self.settings.bounce_keys_delay_ms),
                    }),
                }
            }
            if !forward {
                return actions;
            }
        }

        if self.settings.slow_keys {
            let (forward, effects) = self.slow.filter(&ev);
            for effect in effects {
                actions.push(match effect {
                    SlowEffect::ArmTimer { key } => A11yAction::Arm {
                        timer: TimerKind::SlowKey(key),
                        delay_ms: u64::from(self.settings.slow_keys_delay_ms),
                    },
                    SlowEffect::CancelTimer { key } => {
                        A11yAction::Cancel(TimerKind::SlowKey(key))
                    }
                });
            }
            if !forward {
                return actions;
            }
        }

        self.deliver(ev, &mod_mask, &mut actions);
        actions
    }

    /// Final stage: sticky keys, then the forward itself.
    fn deliver(
        &mut self,
        ev: KeyEvent,
        mod_mask: &impl Fn(u32) -> u32,
        actions: &mut Vec<A11yAction>,
    ) {
        if self.settings.sticky_keys {
            let outcome = self.sticky.filter(&ev, mod_mask(ev.key));
            actions.extend(outcome.before.into_iter().map(map_sticky));
            actions.push(A11yAction::Forward(ev));
            actions.extend(outcome.after.into_iter().map(map_sticky));
        } else {
            actions.push(A11yAction::Forward(ev));
        }
    }

    /// One of the timers requested earlier fired.
    pub fn timer_fired(
        &mut self,
        timer: TimerKind,
        mod_mask: impl Fn(u32) -> u32,
    ) -> Vec<A11yAction> {
        let mut actions = Vec::new();
        match timer {
            TimerKind::SlowHoldToggle => {
                self.enable.hold_fired();
                self.toggle_slow(&mut actions);
            }
            TimerKind::Bounce => self.bounce.timer_fired(),
            TimerKind::MouseKeysTick => {
                if let Some((dx, dy)) = self.mouse.tick() {
                    actions.push(A11yAction::Pointer { dx, dy });
                    actions.push(A11yAction::Arm {
                        timer: TimerKind::MouseKeysTick,
                        delay_ms: mouse_keys::TICK_MS,
                    });
                }
            }
            TimerKind::SlowKey(key) => {
                if let Some(deferred) = self.slow.timer_fired(key) {
                    self.deliver(deferred, &mod_mask, &mut actions);
                }
            }
        }
        actions
    }

    fn toggle_sticky(&mut self, actions: &mut Vec<A11yAction>) {
        self.settings.sticky_keys = !self.settings.sticky_keys;
        info!(enabled = self.settings.sticky_keys, "sticky keys toggled by gesture");
        if !self.settings.sticky_keys {
            actions.extend(self.sticky.reset().into_iter().map(map_sticky));
        }
        actions.push(A11yAction::FlagsChanged(self.flags()));
    }

    fn toggle_slow(&mut self, actions: &mut Vec<A11yAction>) {
        self.settings.slow_keys = !self.settings.slow_keys;
        info!(enabled = self.settings.slow_keys, "slow keys toggled by gesture");
        if !self.settings.slow_keys {
            actions.extend(self.slow.reset().into_iter().map(map_slow));
        }
        actions.push(A11yAction::FlagsChanged(self.flags()));
    }
}

fn map_sticky(effect: StickyEffect) -> A11yAction {
    match effect {
        StickyEffect::SetMods { latched, locked } => A11yAction::SetMods { latched, locked },
    }
}

fn map_slow(effect: SlowEffect) -> A11yAction {
    match effect {
        SlowEffect::ArmTimer { .. } => unreachable!("reset only cancels"),
        SlowEffect::CancelTimer { key } => A11yAction::Cancel(TimerKind::SlowKey(key)),
    }
}

fn map_mouse(effect: MouseKeysEffect) -> A11yAction {
    match effect {
        MouseKeysEffect::StartTick | MouseKeysEffect::StopTick => {
            A11yAction::Cancel(TimerKind::MouseKeysTick)
        }
        MouseKeysEffect::Button { button, state } => A11yAction::Button { button, state },
    }
}

fn map_mouse_arm(mouse: &MouseKeys) -> impl Fn(MouseKeysEffect) -> A11yAction {
    let init_delay = mouse.init_delay_ms();
    move |effect| match effect {
        MouseKeysEffect::StartTick => A11yAction::Arm {
            timer: TimerKind::MouseKeysTick,
            delay_ms: init_delay,
        },
        MouseKeysEffect::StopTick => A11yAction::Cancel(TimerKind::MouseKeysTick),
        MouseKeysEffect::Button { button, state } => A11yAction::Button { button, state },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys;

    const SHIFT: u32 = 1 << 0;

    fn chain(settings: A11ySettings) -> FilterChain {
        FilterChain::new(settings, MouseKeysConfig::default())
    }

    fn ev(key: u32, state: KeyState, time_us: u64) -> KeyEvent {
        KeyEvent {
            device: DeviceId::next(),
            time_us,
            key,
            state,
        }
    }

    fn mask(key: u32) -> u32 {
        if keys::is_shift(key) {
            SHIFT
        } else {
            0
        }
    }

    #[test]
    fn disabled_chain_forwards_everything() {
        let mut chain = chain(A11ySettings::default());
        let event = ev(30, KeyState::Pressed, 0);
        let actions = chain.process(event, false, mask);
        assert_eq!(actions, vec![A11yAction::Forward(event)]);
    }

    #[test]
    fn slow_press_reappears_through_sticky() {
        let settings = A11ySettings {
            slow_keys: true,
            sticky_keys: true,
            ..Default::default()
        };
        let mut chain = chain(settings);

        // latch shift first; the slow stage defers the shift press too, so
        // its hold timer has to fire before the release counts as a tap
        chain.process(ev(keys::KEY_LEFTSHIFT, KeyState::Pressed, 0), false, mask);
        chain.timer_fired(TimerKind::SlowKey(keys::KEY_LEFTSHIFT), mask);
        let actions = chain.process(ev(keys::KEY_LEFTSHIFT, KeyState::Released, 301_000), false, mask);
        assert!(actions.contains(&A11yAction::SetMods {
            latched: SHIFT,
            locked: 0
        }));

        // a held letter key is deferred, then delivered by its timer
        let press = ev(30, KeyState::Pressed, 2);
        let actions = chain.process(press, false, mask);
        assert_eq!(
            actions,
            vec![A11yAction::Arm {
                timer: TimerKind::SlowKey(30),
                delay_ms: u64::from(chain.settings.slow_keys_delay_ms)
            }]
        );
        let actions = chain.timer_fired(TimerKind::SlowKey(30), mask);
        assert_eq!(actions, vec![A11yAction::Forward(press)]);

        // release clears the latch after the forward
        let release = ev(30, KeyState::Released, 500_000);
        let actions = chain.process(release, false, mask);
        assert_eq!(
            actions,
            vec![
                A11yAction::Forward(release),
                A11yAction::SetMods {
                    latched: 0,
                    locked: 0
                }
            ]
        );
    }

    #[test]
    fn mouse_keys_short_circuit_the_rest() {
        let settings = A11ySettings {
            mouse_keys: true,
            slow_keys: true,
            ..Default::default()
        };
        let mut chain = chain(settings);
        let actions = chain.process(ev(keys::KEY_KP8, KeyState::Pressed, 0), false, mask);
        assert_eq!(
            actions,
            vec![A11yAction::Arm {
                timer: TimerKind::MouseKeysTick,
                delay_ms: u64::from(MouseKeysConfig::default().init_delay_ms)
            }]
        );
        // no slow-keys timer was armed for the numpad key
        assert!(chain
            .timer_fired(TimerKind::SlowKey(keys::KEY_KP8), mask)
            .is_empty());
    }

    #[test]
    fn mouse_keys_tick_rearms_itself() {
        let settings = A11ySettings {
            mouse_keys: true,
            ..Default::default()
        };
        let mut chain = chain(settings);
        chain.process(ev(keys::KEY_KP6, KeyState::Pressed, 0), false, mask);
        let actions = chain.timer_fired(TimerKind::MouseKeysTick, mask);
        assert!(matches!(actions[0], A11yAction::Pointer { dx, .. } if dx > 0.0));
        assert_eq!(
            actions[1],
            A11yAction::Arm {
                timer: TimerKind::MouseKeysTick,
                delay_ms: 16
            }
        );
    }

    #[test]
    fn shift_tap_gesture_toggles_sticky() {
        let settings = A11ySettings {
            enable_keys: true,
            ..Default::default()
        };
        let mut chain = chain(settings);
        let mut toggled = false;
        for i in 0..5u64 {
            let t = i * 200_000;
            let actions = chain.process(ev(keys::KEY_LEFTSHIFT, KeyState::Pressed, t), false, mask);
            toggled |= actions
                .iter()
                .any(|a| matches!(a, A11yAction::FlagsChanged(f) if f.contains(A11yFlags::STICKY_KEYS)));
            chain.process(ev(keys::KEY_LEFTSHIFT, KeyState::Released, t + 50_000), false, mask);
        }
        assert!(toggled);
        assert!(chain.settings.sticky_keys);
    }

    #[test]
    fn hold_timer_toggles_slow_keys() {
        let settings = A11ySettings {
            enable_keys: true,
            ..Default::default()
        };
        let mut chain = chain(settings);
        let actions = chain.process(ev(keys::KEY_LEFTSHIFT, KeyState::Pressed, 0), false, mask);
        assert!(actions.contains(&A11yAction::Arm {
            timer: TimerKind::SlowHoldToggle,
            delay_ms: 8_000
        }));
        let actions = chain.timer_fired(TimerKind::SlowHoldToggle, mask);
        assert!(actions.contains(&A11yAction::FlagsChanged(A11yFlags::SLOW_KEYS)));
        assert!(chain.settings.slow_keys);
    }

    #[test]
    fn disabling_slow_keys_cancels_pending_timers() {
        let settings = A11ySettings {
            slow_keys: true,
            ..Default::default()
        };
        let mut chain = chain(settings);
        chain.process(ev(30, KeyState::Pressed, 0), false, mask);

        let actions = chain.set_settings(A11ySettings::default(), MouseKeysConfig::default());
        assert!(actions.contains(&A11yAction::Cancel(TimerKind::SlowKey(30))));
        assert!(actions.contains(&A11yAction::FlagsChanged(A11yFlags::empty())));
    }
}
