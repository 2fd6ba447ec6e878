//! Sticky keys: modifiers latch for one following key, and latch into a
//! lock when tapped twice.
//!
//! Tapping a modifier with no other key in between latches it. Tapping it
//! again locks it; a third tap clears the lock. A latched modifier applies
//! to exactly one non-modifier key press and is cleared when that key is
//! released. The stage never swallows events, it only rewrites the seat's
//! latched/locked modifier masks.

use crate::event::KeyState;

use super::KeyEvent;

#[derive(Debug, PartialEq, Eq)]
pub enum StickyEffect {
    /// Replace the sticky-managed latched/locked modifier masks.
    SetMods { latched: u32, locked: u32 },
}

/// Effects split around the event delivery: `before` effects apply ahead of
/// the event so its modifier snapshot reflects them, `after` effects apply
/// once the event went out (latch clearing must not strip the modifier off
/// the very event it decorated).
#[derive(Debug, Default, PartialEq, Eq)]
pub struct StickyOutcome {
    pub before: Vec<StickyEffect>,
    pub after: Vec<StickyEffect>,
}

#[derive(Debug, Default)]
pub struct StickyKeys {
    latched: u32,
    locked: u32,
    /// Physically held modifiers: key code, mask, and whether another key
    /// was pressed while it was down.
    held: Vec<(u32, u32, bool)>,
}

impl StickyKeys {
    #[cfg(test)]
    pub fn latched(&self) -> u32 {
        self.latched
    }

    #[cfg(test)]
    pub fn locked(&self) -> u32 {
        self.locked
    }

    fn set_mods(&self) -> StickyEffect {
        StickyEffect::SetMods {
            latched: self.latched,
            locked: self.locked,
        }
    }

    /// Observe a key event; `mod_mask` is the modifier mask the key
    /// contributes, 0 for non-modifier keys.
    pub fn filter(&mut self, ev: &KeyEvent, mod_mask: u32) -> StickyOutcome {
        let mut outcome = StickyOutcome::default();
        if mod_mask != 0 {
            match ev.state {
                KeyState::Pressed => {
                    self.held.push((ev.key, mod_mask, false));
                }
                KeyState::Released => {
                    let intervened = self
                        .held
                        .iter()
                        .position(|&(key, _, _)| key == ev.key)
                        .map(|i| self.held.swap_remove(i).2)
                        .unwrap_or(true);
                    if self.locked & mod_mask != 0 {
                        self.locked &= !mod_mask;
                        outcome.before.push(self.set_mods());
                    } else if self.latched & mod_mask != 0 {
                        self.latched &= !mod_mask;
                        self.locked |= mod_mask;
                        outcome.before.push(self.set_mods());
                    } else if !intervened {
                        self.latched |= mod_mask;
                        outcome.before.push(self.set_mods());
                    }
                }
            }
        } else {
            match ev.state {
                KeyState::Pressed => {
                    for held in &mut self.held {
                        held.2 = true;
                    }
                }
                KeyState::Released => {
                    if self.latched != 0 {
                        self.latched = 0;
                        outcome.after.push(self.set_mods());
                    }
                }
            }
        }
        outcome
    }

    pub fn reset(&mut self) -> Vec<StickyEffect> {
        self.held.clear();
        if self.latched != 0 || self.locked != 0 {
            self.latched = 0;
            self.locked = 0;
            vec![self.set_mods()]
        } else {
            vec![]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceId;
    use crate::keys;

    const SHIFT: u32 = 1 << 0;
    const CTRL: u32 = 1 << 2;

    fn ev(key: u32, state: KeyState) -> KeyEvent {
        KeyEvent {
            device: DeviceId::next(),
            time_us: 0,
            key,
            state,
        }
    }

    fn tap_shift(sticky: &mut StickyKeys) -> StickyOutcome {
        let mut out = sticky.filter(&ev(keys::KEY_LEFTSHIFT, KeyState::Pressed), SHIFT);
        let rel = sticky.filter(&ev(keys::KEY_LEFTSHIFT, KeyState::Released), SHIFT);
        out.before.extend(rel.before);
        out.after.extend(rel.after);
        out
    }

    #[test]
    fn tap_latches_then_locks_then_clears() {
        let mut sticky = StickyKeys::default();

        let out = tap_shift(&mut sticky);
        assert_eq!(
            out.before,
            vec![StickyEffect::SetMods {
                latched: SHIFT,
                locked: 0
            }]
        );

        let out = tap_shift(&mut sticky);
        assert_eq!(
            out.before,
            vec![StickyEffect::SetMods {
                latched: 0,
                locked: SHIFT
            }]
        );

        let out = tap_shift(&mut sticky);
        assert_eq!(
            out.before,
            vec![StickyEffect::SetMods {
                latched: 0,
                locked: 0
            }]
        );
    }

    #[test]
    fn latch_applies_to_one_key() {
        let mut sticky = StickyKeys::default();
        tap_shift(&mut sticky);
        assert_eq!(sticky.latched(), SHIFT);

        const KEY_A: u32 = 30;
        let out = sticky.filter(&ev(KEY_A, KeyState::Pressed), 0);
        assert!(out.before.is_empty() && out.after.is_empty());

        // the latch clears only after the decorated key went out
        let out = sticky.filter(&ev(KEY_A, KeyState::Released), 0);
        assert!(out.before.is_empty());
        assert_eq!(
            out.after,
            vec![StickyEffect::SetMods {
                latched: 0,
                locked: 0
            }]
        );
    }

    #[test]
    fn chorded_modifier_does_not_latch() {
        let mut sticky = StickyKeys::default();
        sticky.filter(&ev(keys::KEY_LEFTSHIFT, KeyState::Pressed), SHIFT);
        sticky.filter(&ev(30, KeyState::Pressed), 0);
        sticky.filter(&ev(30, KeyState::Released), 0);
        let out = sticky.filter(&ev(keys::KEY_LEFTSHIFT, KeyState::Released), SHIFT);
        assert!(out.before.is_empty());
        assert_eq!(sticky.latched(), 0);
    }

    #[test]
    fn independent_modifiers_latch_independently() {
        let mut sticky = StickyKeys::default();
        tap_shift(&mut sticky);
        sticky.filter(&ev(keys::KEY_LEFTCTRL, KeyState::Pressed), CTRL);
        let out = sticky.filter(&ev(keys::KEY_LEFTCTRL, KeyState::Released), CTRL);
        assert_eq!(
            out.before,
            vec![StickyEffect::SetMods {
                latched: SHIFT | CTRL,
                locked: 0
            }]
        );
    }

    #[test]
    fn reset_clears_everything() {
        let mut sticky = StickyKeys::default();
        tap_shift(&mut sticky);
        tap_shift(&mut sticky); // locked now
        let effects = sticky.reset();
        assert_eq!(
            effects,
            vec![StickyEffect::SetMods {
                latched: 0,
                locked: 0
            }]
        );
    }
}
