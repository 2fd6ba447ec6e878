//! Input backend configuration.
//!
//! Loaded once by the compositor and handed to [`Seat::start`]; individual
//! pieces can be swapped at runtime through seat tasks (`set_repeat`,
//! `set_a11y_settings`, ...).
//!
//! [`Seat::start`]: crate::seat::Seat::start

use std::path::Path;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    pub keyboard: KeyboardConfig,
    pub repeat: RepeatConfig,
    pub a11y: A11ySettings,
    pub mouse_keys: MouseKeysConfig,
    pub pointer: PointerConfig,
}

impl InputConfig {
    pub fn from_toml(s: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(s)?)
    }

    pub fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyboardConfig {
    /// Comma-separated xkb layout names, e.g. `"us,de"`.
    pub layouts: String,
    pub variants: String,
    pub options: Option<String>,
    /// Initial NumLock state applied when the seat starts.
    pub numlock: bool,
}

impl Default for KeyboardConfig {
    fn default() -> Self {
        Self {
            layouts: "us".to_string(),
            variants: String::new(),
            options: None,
            numlock: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct RepeatConfig {
    pub enabled: bool,
    pub delay_ms: u32,
    pub interval_ms: u32,
}

impl Default for RepeatConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            delay_ms: 250,
            interval_ms: 33,
        }
    }
}

/// Keyboard accessibility toggles and timings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct A11ySettings {
    /// Allow the keyboard itself to toggle features (Shift held 8s toggles
    /// slow keys, Shift pressed five times in a row toggles sticky keys).
    pub enable_keys: bool,
    pub sticky_keys: bool,
    pub slow_keys: bool,
    pub slow_keys_delay_ms: u32,
    pub bounce_keys: bool,
    pub bounce_keys_delay_ms: u32,
    pub mouse_keys: bool,
}

impl Default for A11ySettings {
    fn default() -> Self {
        Self {
            enable_keys: false,
            sticky_keys: false,
            slow_keys: false,
            slow_keys_delay_ms: 300,
            bounce_keys: false,
            bounce_keys_delay_ms: 300,
            mouse_keys: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct MouseKeysConfig {
    /// Peak pointer speed in pixels per second.
    pub max_speed: f64,
    /// Time to reach peak speed, in milliseconds.
    pub accel_time_ms: u32,
    /// Delay before the first motion step after a numpad press.
    pub init_delay_ms: u32,
}

impl Default for MouseKeysConfig {
    fn default() -> Self {
        Self {
            max_speed: 600.0,
            accel_time_ms: 1200,
            init_delay_ms: 160,
        }
    }
}

/// Defaults pushed into libinput's per-device config on discovery.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct PointerConfig {
    /// Pointer acceleration bias in `[-1, 1]`.
    pub accel_speed: f64,
    pub natural_scroll: bool,
    /// Tap-to-click on touchpads that support it.
    pub tap_to_click: bool,
}

impl Default for PointerConfig {
    fn default() -> Self {
        Self {
            accel_speed: 0.0,
            natural_scroll: false,
            tap_to_click: true,
        }
    }
}
