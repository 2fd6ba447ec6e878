//! Device registry: wrappers around raw device handles, capability
//! classification, and per-device coordinate transforms.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};

use tracing::debug;

use crate::event::Pos;

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DeviceCapabilities: u32 {
        const POINTER     = 1 << 0;
        const KEYBOARD    = 1 << 1;
        const TOUCH       = 1 << 2;
        const TABLET_TOOL = 1 << 3;
        const TABLET_PAD  = 1 << 4;
        const SWITCH      = 1 << 5;
        const GESTURE     = 1 << 6;
    }
}

/// Stable identity of a device for the lifetime of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId(u32);

impl DeviceId {
    pub fn next() -> Self {
        static COUNTER: AtomicU32 = AtomicU32::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(&self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "device-{}", self.0)
    }
}

/// Coarse device type, derived from the capability set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    TabletPad,
    TabletTool,
    Touchscreen,
    Pointer,
    Keyboard,
    Switch,
}

impl DeviceKind {
    pub fn classify(caps: DeviceCapabilities) -> Self {
        if caps.contains(DeviceCapabilities::TABLET_PAD) {
            DeviceKind::TabletPad
        } else if caps.contains(DeviceCapabilities::TABLET_TOOL) {
            DeviceKind::TabletTool
        } else if caps.contains(DeviceCapabilities::TOUCH) {
            DeviceKind::Touchscreen
        } else if caps.contains(DeviceCapabilities::POINTER) {
            DeviceKind::Pointer
        } else if caps.contains(DeviceCapabilities::KEYBOARD) {
            DeviceKind::Keyboard
        } else {
            DeviceKind::Switch
        }
    }
}

/// Row-major 2x3 affine transform applied to normalized absolute
/// coordinates, matching libinput's calibration matrix convention.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub m: [f64; 6],
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Transform {
    pub const IDENTITY: Self = Self {
        m: [1.0, 0.0, 0.0, 0.0, 1.0, 0.0],
    };

    pub fn new(m: [f64; 6]) -> Self {
        Self { m }
    }

    pub fn apply(&self, pos: Pos) -> Pos {
        Pos {
            x: self.m[0] * pos.x + self.m[1] * pos.y + self.m[2],
            y: self.m[3] * pos.x + self.m[4] * pos.y + self.m[5],
        }
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::IDENTITY
    }
}

/// The raw handle behind a device wrapper. Exclusively owned by the
/// registry entry; it must be detached before the wrapper is dropped.
#[derive(Debug)]
pub enum DeviceHandle {
    #[cfg(feature = "libinput")]
    Libinput(input::Device),
    Virtual,
}

/// Mode-group mapping for tablet pad features.
#[derive(Debug, Clone, Default)]
pub struct PadFeatures {
    pub groups: Vec<PadGroup>,
    /// Per-feature group index, in feature order.
    pub buttons: Vec<u32>,
    pub rings: Vec<u32>,
    pub strips: Vec<u32>,
}

#[derive(Debug, Clone)]
pub struct PadGroup {
    pub n_modes: u32,
    pub current_mode: u32,
}

impl PadFeatures {
    pub fn group_for_button(&self, button: u32) -> u32 {
        self.buttons.get(button as usize).copied().unwrap_or(0)
    }

    pub fn group_for_ring(&self, number: u32) -> u32 {
        self.rings.get(number as usize).copied().unwrap_or(0)
    }

    pub fn group_for_strip(&self, number: u32) -> u32 {
        self.strips.get(number as usize).copied().unwrap_or(0)
    }

    pub fn set_mode(&mut self, group: u32, mode: u32) {
        if let Some(g) = self.groups.get_mut(group as usize) {
            g.current_mode = mode.min(g.n_modes.saturating_sub(1));
        }
    }

    pub fn mode(&self, group: u32) -> u32 {
        self.groups
            .get(group as usize)
            .map(|g| g.current_mode)
            .unwrap_or(0)
    }
}

/// One physical or virtual input source.
#[derive(Debug)]
pub struct InputDevice {
    pub id: DeviceId,
    pub name: String,
    pub capabilities: DeviceCapabilities,
    pub kind: DeviceKind,
    pub transform: Transform,
    /// Width/height ratio of the output the device is mapped to, kept so
    /// tablets can preserve aspect when mapping the full tablet area.
    pub aspect_ratio: Option<f64>,
    pub pad: Option<PadFeatures>,
    handle: Option<DeviceHandle>,
}

impl InputDevice {
    pub fn new(name: impl Into<String>, capabilities: DeviceCapabilities, handle: DeviceHandle) -> Self {
        Self {
            id: DeviceId::next(),
            name: name.into(),
            capabilities,
            kind: DeviceKind::classify(capabilities),
            transform: Transform::IDENTITY,
            aspect_ratio: None,
            pad: None,
            handle: Some(handle),
        }
    }

    pub fn is_attached(&self) -> bool {
        self.handle.is_some()
    }

    pub fn handle(&self) -> Option<&DeviceHandle> {
        self.handle.as_ref()
    }

    pub fn handle_mut(&mut self) -> Option<&mut DeviceHandle> {
        self.handle.as_mut()
    }

    /// Release the raw handle. Must be called exactly once before the
    /// wrapper is dropped; detaching twice is a contract violation.
    pub fn detach(&mut self) -> DeviceHandle {
        debug!(device = %self.id, name = %self.name, "detaching device handle");
        self.handle
            .take()
            .unwrap_or_else(|| panic!("{} detached twice", self.id))
    }

    pub fn apply_transform(&self, pos: Pos) -> Pos {
        self.transform.apply(pos)
    }
}

impl Drop for InputDevice {
    fn drop(&mut self) {
        // Raw handles are released through detach() so the seat controls
        // exactly when the fd side goes away. A panic in a destructor
        // aborts, so the check stands down while unwinding.
        if std::thread::panicking() {
            return;
        }
        assert!(
            self.handle.is_none(),
            "{} ({}) dropped while still attached",
            self.id,
            self.name
        );
    }
}

/// All devices currently owned by a seat, keyed by id.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: HashMap<DeviceId, InputDevice>,
}

impl DeviceRegistry {
    pub fn insert(&mut self, device: InputDevice) -> DeviceId {
        let id = device.id;
        debug!(device = %id, name = %device.name, caps = ?device.capabilities, "device added");
        let prev = self.devices.insert(id, device);
        assert!(prev.is_none(), "{id} inserted twice");
        id
    }

    pub fn remove(&mut self, id: DeviceId) -> Option<InputDevice> {
        self.devices.remove(&id)
    }

    pub fn get(&self, id: DeviceId) -> Option<&InputDevice> {
        self.devices.get(&id)
    }

    pub fn get_mut(&mut self, id: DeviceId) -> Option<&mut InputDevice> {
        self.devices.get_mut(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &InputDevice> {
        self.devices.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut InputDevice> {
        self.devices.values_mut()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Detach and drop every device, returning the removed ids. Used on
    /// suspend and teardown, where the raw handles must go away but seat
    /// state is retained.
    pub fn detach_all(&mut self) -> Vec<DeviceId> {
        let mut ids: Vec<_> = self.devices.keys().copied().collect();
        ids.sort();
        for id in &ids {
            if let Some(mut device) = self.devices.remove(id) {
                let _ = device.detach();
            }
        }
        ids
    }
}
