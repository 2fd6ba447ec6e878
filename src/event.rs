//! Raw and compositor-facing event types.
//!
//! `RawEvent` is what an [`EventSource`](crate::backend::EventSource)
//! produces on the input thread; `Event` is what the seat pushes onto the
//! queue consumed by the compositor. Raw events never cross threads, so they
//! may carry device handles; `Event` is plain data.

use crate::barrier::BarrierEvent;
use crate::device::{DeviceCapabilities, DeviceId, InputDevice};
use crate::keyboard::Modifiers;

/// Sub-pixel position or delta in logical coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Pos {
    pub x: f64,
    pub y: f64,
}

impl Pos {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

impl From<(f64, f64)> for Pos {
    fn from((x, y): (f64, f64)) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyState {
    Pressed,
    Released,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonState {
    Pressed,
    Released,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollSource {
    Wheel,
    Finger,
    Continuous,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchKind {
    Lid,
    TabletMode,
}

/// Identity of a tablet tool as reported by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ToolDescriptor {
    pub serial: u64,
    pub kind: ToolKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolKind {
    Pen,
    Eraser,
    Brush,
    Pencil,
    Airbrush,
    Mouse,
    Lens,
    Totem,
}

/// Typed raw device events, each stamped with the monotonic microsecond
/// timestamp reported by the device. Absolute coordinates are normalized to
/// `[0, 1]`; the seat scales them to the screen and applies the per-device
/// transform.
#[derive(Debug)]
pub enum RawEvent {
    DeviceAdded {
        device: InputDevice,
    },
    DeviceRemoved {
        device: DeviceId,
    },
    Key {
        device: DeviceId,
        time_us: u64,
        key: u32,
        state: KeyState,
    },
    PointerMotion {
        device: DeviceId,
        time_us: u64,
        delta: Pos,
        delta_unaccel: Pos,
    },
    PointerMotionAbsolute {
        device: DeviceId,
        time_us: u64,
        pos: Pos,
    },
    Button {
        device: DeviceId,
        time_us: u64,
        button: u32,
        state: ButtonState,
    },
    Scroll {
        device: DeviceId,
        time_us: u64,
        source: ScrollSource,
        delta: Pos,
        v120: Option<(f64, f64)>,
        stop_x: bool,
        stop_y: bool,
    },
    TouchDown {
        device: DeviceId,
        time_us: u64,
        slot: u32,
        pos: Pos,
    },
    TouchMotion {
        device: DeviceId,
        time_us: u64,
        slot: u32,
        pos: Pos,
    },
    TouchUp {
        device: DeviceId,
        time_us: u64,
        slot: u32,
    },
    TouchCancel {
        device: DeviceId,
        time_us: u64,
    },
    ToolAxis {
        device: DeviceId,
        time_us: u64,
        tool: ToolDescriptor,
        pos: Pos,
        pressure: Option<f64>,
        tilt: Option<(f64, f64)>,
        distance: Option<f64>,
        rotation: Option<f64>,
        slider: Option<f64>,
    },
    ToolProximity {
        device: DeviceId,
        time_us: u64,
        tool: ToolDescriptor,
        pos: Pos,
        in_proximity: bool,
    },
    ToolTip {
        device: DeviceId,
        time_us: u64,
        tool: ToolDescriptor,
        pos: Pos,
        down: bool,
    },
    ToolButton {
        device: DeviceId,
        time_us: u64,
        tool: ToolDescriptor,
        button: u32,
        state: ButtonState,
    },
    PadButton {
        device: DeviceId,
        time_us: u64,
        button: u32,
        state: ButtonState,
        mode: u32,
    },
    PadRing {
        device: DeviceId,
        time_us: u64,
        number: u32,
        /// `None` when the finger lifted off the ring.
        position: Option<f64>,
        mode: u32,
    },
    PadStrip {
        device: DeviceId,
        time_us: u64,
        number: u32,
        position: Option<f64>,
        mode: u32,
    },
    SwitchToggle {
        device: DeviceId,
        time_us: u64,
        switch: SwitchKind,
        on: bool,
    },
}

impl RawEvent {
    pub fn time_us(&self) -> u64 {
        match self {
            RawEvent::DeviceAdded { .. } | RawEvent::DeviceRemoved { .. } => 0,
            RawEvent::Key { time_us, .. }
            | RawEvent::PointerMotion { time_us, .. }
            | RawEvent::PointerMotionAbsolute { time_us, .. }
            | RawEvent::Button { time_us, .. }
            | RawEvent::Scroll { time_us, .. }
            | RawEvent::TouchDown { time_us, .. }
            | RawEvent::TouchMotion { time_us, .. }
            | RawEvent::TouchUp { time_us, .. }
            | RawEvent::TouchCancel { time_us, .. }
            | RawEvent::ToolAxis { time_us, .. }
            | RawEvent::ToolProximity { time_us, .. }
            | RawEvent::ToolTip { time_us, .. }
            | RawEvent::ToolButton { time_us, .. }
            | RawEvent::PadButton { time_us, .. }
            | RawEvent::PadRing { time_us, .. }
            | RawEvent::PadStrip { time_us, .. }
            | RawEvent::SwitchToggle { time_us, .. } => *time_us,
        }
    }
}

/// Compositor-facing events, delivered in order over the seat's event queue.
#[derive(Debug, Clone)]
pub enum Event {
    DeviceAdded {
        device: DeviceId,
        name: String,
        capabilities: DeviceCapabilities,
    },
    DeviceRemoved {
        device: DeviceId,
    },
    Motion {
        device: DeviceId,
        time_us: u64,
        pos: Pos,
        delta: Pos,
        delta_unaccel: Pos,
        modifiers: Modifiers,
    },
    Button {
        device: DeviceId,
        time_us: u64,
        button: u32,
        state: ButtonState,
        modifiers: Modifiers,
    },
    Key {
        device: DeviceId,
        time_us: u64,
        key: u32,
        keysym: u32,
        state: KeyState,
        modifiers: Modifiers,
        repeat: bool,
    },
    Scroll {
        device: DeviceId,
        time_us: u64,
        source: ScrollSource,
        delta: Pos,
        v120: Option<(f64, f64)>,
        stop_x: bool,
        stop_y: bool,
        modifiers: Modifiers,
    },
    TouchDown {
        device: DeviceId,
        time_us: u64,
        seat_slot: u32,
        pos: Pos,
    },
    TouchMotion {
        device: DeviceId,
        time_us: u64,
        seat_slot: u32,
        pos: Pos,
    },
    TouchUp {
        device: DeviceId,
        time_us: u64,
        seat_slot: u32,
    },
    TouchCancel {
        device: DeviceId,
        time_us: u64,
        seat_slot: u32,
    },
    ToolProximity {
        device: DeviceId,
        time_us: u64,
        tool: ToolDescriptor,
        in_proximity: bool,
    },
    ToolMotion {
        device: DeviceId,
        time_us: u64,
        tool: ToolDescriptor,
        pos: Pos,
        /// Pressure after applying the tool's calibration curve.
        pressure: Option<f64>,
        tilt: Option<(f64, f64)>,
        distance: Option<f64>,
        rotation: Option<f64>,
        slider: Option<f64>,
    },
    ToolTip {
        device: DeviceId,
        time_us: u64,
        tool: ToolDescriptor,
        pos: Pos,
        down: bool,
    },
    ToolButton {
        device: DeviceId,
        time_us: u64,
        tool: ToolDescriptor,
        button: u32,
        state: ButtonState,
    },
    PadButton {
        device: DeviceId,
        time_us: u64,
        button: u32,
        state: ButtonState,
        mode: u32,
        group: u32,
    },
    PadRing {
        device: DeviceId,
        time_us: u64,
        number: u32,
        position: Option<f64>,
        mode: u32,
        group: u32,
    },
    PadStrip {
        device: DeviceId,
        time_us: u64,
        number: u32,
        position: Option<f64>,
        mode: u32,
        group: u32,
    },
    SwitchToggle {
        device: DeviceId,
        time_us: u64,
        switch: SwitchKind,
        on: bool,
    },
    BarrierHit(BarrierEvent),
    BarrierLeft(BarrierEvent),
    A11yFlagsChanged(crate::a11y::A11yFlags),
}

/// Monotonic now, in microseconds. Used to stamp injected virtual events.
pub fn now_us() -> u64 {
    use std::time::Instant;
    use once_cell::sync::Lazy;
    static START: Lazy<Instant> = Lazy::new(Instant::now);
    START.elapsed().as_micros() as u64
}
