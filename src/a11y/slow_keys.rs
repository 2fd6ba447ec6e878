//! Slow keys: a press only registers after the key has been held for the
//! configured delay. Each pending press carries its own one-shot timer;
//! releasing before the timer fires cancels the press entirely.

use crate::event::KeyState;

use super::KeyEvent;

#[derive(Debug, PartialEq, Eq)]
pub enum SlowEffect {
    ArmTimer { key: u32 },
    CancelTimer { key: u32 },
}

#[derive(Debug, Default)]
pub struct SlowKeys {
    pending: Vec<KeyEvent>,
    /// Keys whose deferred press fired; their release passes through.
    accepted: Vec<u32>,
}

impl SlowKeys {
    /// Returns `(forward, effects)`; a swallowed press may later reappear
    /// through [`SlowKeys::timer_fired`].
    pub fn filter(&mut self, ev: &KeyEvent) -> (bool, Vec<SlowEffect>) {
        match ev.state {
            KeyState::Pressed => {
                if self.pending.iter().any(|p| p.key == ev.key) {
                    // duplicate press while one is already pending, e.g. a
                    // second keyboard; no second timer
                    return (false, vec![]);
                }
                self.pending.push(*ev);
                (false, vec![SlowEffect::ArmTimer { key: ev.key }])
            }
            KeyState::Released => {
                if let Some(i) = self.pending.iter().position(|p| p.key == ev.key) {
                    self.pending.swap_remove(i);
                    // press never registered, neither does the release
                    return (false, vec![SlowEffect::CancelTimer { key: ev.key }]);
                }
                if let Some(i) = self.accepted.iter().position(|&k| k == ev.key) {
                    self.accepted.swap_remove(i);
                }
                (true, vec![])
            }
        }
    }

    /// The hold timer for `key` fired; returns the deferred press, which
    /// continues down the chain.
    pub fn timer_fired(&mut self, key: u32) -> Option<KeyEvent> {
        let i = self.pending.iter().position(|p| p.key == key)?;
        let ev = self.pending.swap_remove(i);
        self.accepted.push(key);
        Some(ev)
    }

    /// Drop all pending presses, returning the keys whose timers must be
    /// cancelled.
    pub fn reset(&mut self) -> Vec<SlowEffect> {
        let effects = self
            .pending
            .drain(..)
            .map(|p| SlowEffect::CancelTimer { key: p.key })
            .collect();
        self.accepted.clear();
        effects
    }
}
