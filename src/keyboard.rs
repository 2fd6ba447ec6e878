//! Keyboard state: xkb keymap, modifier tracking, NumLock, and the repeat
//! configuration.
//!
//! Owned by the seat impl and mutated only on the input thread; the main
//! thread sees modifier snapshots through the shared seat state.

use tracing::{debug, warn};
use xkbcommon::xkb;

use crate::config::{KeyboardConfig, RepeatConfig};
use crate::error::InputError;
use crate::keys::XKB_KEYCODE_OFFSET;

const MOD_INDEX_INVALID: xkb::ModIndex = u32::MAX;

/// Snapshot of the xkb modifier masks plus the effective layout index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Modifiers {
    pub depressed: u32,
    pub latched: u32,
    pub locked: u32,
    pub effective: u32,
    pub layout: u32,
}

/// Keyboard LED state, resynchronized to devices on resume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LedState {
    pub numlock: bool,
    pub capslock: bool,
}

pub struct XkbKeyboard {
    context: xkb::Context,
    keymap: xkb::Keymap,
    state: xkb::State,
    pub repeat: RepeatConfig,
}

impl std::fmt::Debug for XkbKeyboard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("XkbKeyboard")
            .field("layouts", &self.layout_names())
            .field("repeat", &self.repeat)
            .finish()
    }
}

impl XkbKeyboard {
    pub fn new(config: &KeyboardConfig, repeat: RepeatConfig) -> Result<Self, InputError> {
        let context = xkb::Context::new(xkb::CONTEXT_NO_FLAGS);
        let keymap = Self::compile(
            &context,
            &config.layouts,
            &config.variants,
            config.options.clone(),
        )?;
        let state = xkb::State::new(&keymap);
        let mut keyboard = Self {
            context,
            keymap,
            state,
            repeat,
        };
        if config.numlock {
            keyboard.set_numlock(true);
        }
        Ok(keyboard)
    }

    fn compile(
        context: &xkb::Context,
        layouts: &str,
        variants: &str,
        options: Option<String>,
    ) -> Result<xkb::Keymap, InputError> {
        xkb::Keymap::new_from_names(
            context,
            "",
            "",
            layouts,
            variants,
            options,
            xkb::KEYMAP_COMPILE_NO_FLAGS,
        )
        .ok_or_else(|| InputError::Keymap {
            layouts: layouts.to_string(),
        })
    }

    /// Swap the keymap, retaining NumLock across the switch.
    pub fn set_keymap(
        &mut self,
        layouts: &str,
        variants: &str,
        options: Option<String>,
    ) -> Result<(), InputError> {
        let numlock = self.numlock_active();
        let keymap = Self::compile(&self.context, layouts, variants, options)?;
        debug!(layouts, variants, "keymap replaced");
        self.state = xkb::State::new(&keymap);
        self.keymap = keymap;
        if numlock {
            self.set_numlock(true);
        }
        Ok(())
    }

    pub fn layout_names(&self) -> Vec<String> {
        (0..self.keymap.num_layouts())
            .map(|i| self.keymap.layout_get_name(i).to_string())
            .collect()
    }

    pub fn num_layouts(&self) -> u32 {
        self.keymap.num_layouts()
    }

    pub fn active_layout(&self) -> u32 {
        self.state.serialize_layout(xkb::STATE_LAYOUT_EFFECTIVE)
    }

    pub fn set_layout_index(&mut self, index: u32) {
        if index >= self.keymap.num_layouts() {
            warn!(index, "layout index out of range, ignoring");
            return;
        }
        let mods = self.modifiers();
        self.state
            .update_mask(mods.depressed, mods.latched, mods.locked, 0, 0, index);
    }

    fn numlock_mask(&self) -> u32 {
        let idx = self.keymap.mod_get_index(xkb::MOD_NAME_NUM);
        if idx == MOD_INDEX_INVALID {
            0
        } else {
            1 << idx
        }
    }

    pub fn set_numlock(&mut self, on: bool) {
        let mask = self.numlock_mask();
        if mask == 0 {
            return;
        }
        let mods = self.modifiers();
        let locked = if on {
            mods.locked | mask
        } else {
            mods.locked & !mask
        };
        self.state
            .update_mask(mods.depressed, mods.latched, locked, 0, 0, mods.layout);
    }

    pub fn numlock_active(&self) -> bool {
        let mask = self.numlock_mask();
        mask != 0 && self.modifiers().locked & mask != 0
    }

    /// Feed a key state change through xkb, returning the new modifier
    /// snapshot.
    pub fn update_key(&mut self, evdev_code: u32, pressed: bool) -> Modifiers {
        let direction = if pressed {
            xkb::KeyDirection::Down
        } else {
            xkb::KeyDirection::Up
        };
        self.state
            .update_key(xkb::Keycode::new(evdev_code + XKB_KEYCODE_OFFSET), direction);
        self.modifiers()
    }

    pub fn modifiers(&self) -> Modifiers {
        Modifiers {
            depressed: self.state.serialize_mods(xkb::STATE_MODS_DEPRESSED),
            latched: self.state.serialize_mods(xkb::STATE_MODS_LATCHED),
            locked: self.state.serialize_mods(xkb::STATE_MODS_LOCKED),
            effective: self.state.serialize_mods(xkb::STATE_MODS_EFFECTIVE),
            layout: self.state.serialize_layout(xkb::STATE_LAYOUT_EFFECTIVE),
        }
    }

    /// Overwrite latched/locked masks, used by sticky keys to rewrite the
    /// effective modifier state.
    pub fn set_latched_locked(&mut self, latched: u32, locked: u32) -> Modifiers {
        let mods = self.modifiers();
        self.state
            .update_mask(mods.depressed, latched, locked, 0, 0, mods.layout);
        self.modifiers()
    }

    pub fn keysym(&self, evdev_code: u32) -> u32 {
        self.state
            .key_get_one_sym(xkb::Keycode::new(evdev_code + XKB_KEYCODE_OFFSET))
            .raw()
    }

    pub fn key_repeats(&self, evdev_code: u32) -> bool {
        self.keymap
            .key_repeats(xkb::Keycode::new(evdev_code + XKB_KEYCODE_OFFSET))
    }

    /// Modifier mask a key contributes when depressed, or 0 for
    /// non-modifier keys. Used by sticky keys.
    pub fn modifier_mask_for_key(&self, evdev_code: u32) -> u32 {
        use crate::keys::*;
        let name = match evdev_code {
            KEY_LEFTSHIFT | KEY_RIGHTSHIFT => xkb::MOD_NAME_SHIFT,
            KEY_LEFTCTRL | KEY_RIGHTCTRL => xkb::MOD_NAME_CTRL,
            KEY_LEFTALT | KEY_RIGHTALT => xkb::MOD_NAME_ALT,
            KEY_LEFTMETA | KEY_RIGHTMETA => xkb::MOD_NAME_LOGO,
            KEY_CAPSLOCK => xkb::MOD_NAME_CAPS,
            KEY_NUMLOCK => xkb::MOD_NAME_NUM,
            _ => return 0,
        };
        let idx = self.keymap.mod_get_index(name);
        if idx == MOD_INDEX_INVALID {
            0
        } else {
            1 << idx
        }
    }

    pub fn leds(&self) -> LedState {
        LedState {
            numlock: self.led_active(xkb::LED_NAME_NUM),
            capslock: self.led_active(xkb::LED_NAME_CAPS),
        }
    }

    fn led_active(&self, name: &str) -> bool {
        let idx = self.keymap.led_get_index(name);
        idx != MOD_INDEX_INVALID && self.state.led_index_is_active(idx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys;

    fn keyboard(layouts: &str) -> XkbKeyboard {
        XkbKeyboard::new(
            &KeyboardConfig {
                layouts: layouts.to_string(),
                ..Default::default()
            },
            RepeatConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn keymap_round_trip_preserves_layouts() {
        let mut kb = keyboard("us");
        kb.set_keymap("us,de", "", None).unwrap();
        assert_eq!(kb.num_layouts(), 2);
        let names = kb.layout_names();

        kb.set_keymap("us,de", "", None).unwrap();
        assert_eq!(kb.layout_names(), names);
    }

    #[test]
    fn bogus_layout_is_an_error() {
        let mut kb = keyboard("us");
        // xkbcommon falls back for unknown layouts only in some data sets;
        // an empty rules/model with garbage layout must not panic either way
        let _ = kb.set_keymap("definitely-not-a-layout", "", None);
        assert!(kb.num_layouts() >= 1);
    }

    #[test]
    fn shift_press_sets_depressed_mask() {
        let mut kb = keyboard("us");
        let shift = kb.modifier_mask_for_key(keys::KEY_LEFTSHIFT);
        assert_ne!(shift, 0);

        let mods = kb.update_key(keys::KEY_LEFTSHIFT, true);
        assert_ne!(mods.depressed & shift, 0);
        let mods = kb.update_key(keys::KEY_LEFTSHIFT, false);
        assert_eq!(mods.depressed & shift, 0);
    }

    #[test]
    fn numlock_is_a_locked_modifier() {
        let mut kb = keyboard("us");
        assert!(!kb.numlock_active());
        kb.set_numlock(true);
        assert!(kb.numlock_active());
        assert!(kb.leds().numlock);

        // survives a keymap swap
        kb.set_keymap("us", "", None).unwrap();
        assert!(kb.numlock_active());

        kb.set_numlock(false);
        assert!(!kb.numlock_active());
    }

    #[test]
    fn layout_switch_is_clamped() {
        let mut kb = keyboard("us");
        kb.set_keymap("us,de", "", None).unwrap();
        kb.set_layout_index(1);
        assert_eq!(kb.active_layout(), 1);
        kb.set_layout_index(5); // out of range, ignored
        assert_eq!(kb.active_layout(), 1);
    }

    #[test]
    fn letter_keys_repeat_modifiers_do_not() {
        let kb = keyboard("us");
        const KEY_A: u32 = 30;
        assert!(kb.key_repeats(KEY_A));
        assert!(!kb.key_repeats(keys::KEY_LEFTSHIFT));
    }
}
