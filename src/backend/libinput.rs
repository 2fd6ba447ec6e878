//! libinput-backed event source.
//!
//! Owns the libinput udev context and the mapping from libinput devices to
//! seat [`DeviceId`]s. All coordinate-bearing events are normalized to
//! `[0, 1]` here so the seat never sees device units.

use std::fs::OpenOptions;
use std::io;
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::{AsRawFd, BorrowedFd, OwnedFd};
use std::path::Path;

use input::event::device::DeviceEvent;
use input::event::keyboard::{KeyboardEvent, KeyboardEventTrait};
use input::event::pointer::{Axis, PointerEvent, PointerScrollEvent};
use input::event::switch::{Switch, SwitchEvent, SwitchState};
use input::event::tablet_pad::TabletPadEvent;
use input::event::tablet_tool::{
    ProximityState, TabletToolEvent, TabletToolEventTrait, TipState,
};
use input::event::touch::{TouchEvent, TouchEventPosition, TouchEventSlot};
use input::event::EventTrait;
use input::{DeviceCapability, Libinput, LibinputInterface};
use tracing::{debug, info, warn};

use crate::device::{
    DeviceCapabilities, DeviceHandle, DeviceId, InputDevice, PadFeatures, PadGroup,
};
use crate::error::InputError;
use crate::event::{
    ButtonState, KeyState, Pos, RawEvent, ScrollSource, SwitchKind, ToolDescriptor, ToolKind,
};

use super::EventSource;

struct Interface;

impl LibinputInterface for Interface {
    fn open_restricted(&mut self, path: &Path, flags: i32) -> Result<OwnedFd, i32> {
        OpenOptions::new()
            .read(true)
            .write((flags & libc::O_WRONLY != 0) || (flags & libc::O_RDWR != 0))
            .custom_flags(flags & !libc::O_WRONLY & !libc::O_RDWR & !libc::O_RDONLY)
            .open(path)
            .map(OwnedFd::from)
            .map_err(|err| {
                warn!(?path, error = %err, "cannot open input device");
                err.raw_os_error().unwrap_or(-libc::ENOENT)
            })
    }

    fn close_restricted(&mut self, fd: OwnedFd) {
        drop(fd);
    }
}

pub struct LibinputSource {
    libinput: Libinput,
    /// libinput device to seat id, in discovery order.
    devices: Vec<(input::Device, DeviceId)>,
}

impl LibinputSource {
    pub fn new(seat_name: &str) -> Result<Self, InputError> {
        let mut libinput = Libinput::new_with_udev(Interface);
        libinput
            .udev_assign_seat(seat_name)
            .map_err(|()| InputError::Init(format!("cannot assign udev seat {seat_name:?}")))?;
        info!(seat = seat_name, "libinput context created");
        Ok(Self {
            libinput,
            devices: Vec::new(),
        })
    }

    fn id_for(&self, device: &input::Device) -> Option<DeviceId> {
        self.devices
            .iter()
            .find(|(dev, _)| dev == device)
            .map(|&(_, id)| id)
    }

    fn device_added(&mut self, device: input::Device) -> RawEvent {
        let mut caps = DeviceCapabilities::empty();
        for (libinput_cap, cap) in [
            (DeviceCapability::Pointer, DeviceCapabilities::POINTER),
            (DeviceCapability::Keyboard, DeviceCapabilities::KEYBOARD),
            (DeviceCapability::Touch, DeviceCapabilities::TOUCH),
            (DeviceCapability::TabletTool, DeviceCapabilities::TABLET_TOOL),
            (DeviceCapability::TabletPad, DeviceCapabilities::TABLET_PAD),
            (DeviceCapability::Switch, DeviceCapabilities::SWITCH),
            (DeviceCapability::Gesture, DeviceCapabilities::GESTURE),
        ] {
            if device.has_capability(libinput_cap) {
                caps |= cap;
            }
        }

        let mut wrapper = InputDevice::new(
            device.name().to_string(),
            caps,
            DeviceHandle::Libinput(device.clone()),
        );
        if let Some((width, height)) = device.size() {
            if height > 0.0 {
                wrapper.aspect_ratio = Some(width / height);
            }
        }
        if caps.contains(DeviceCapabilities::TABLET_PAD) {
            wrapper.pad = Some(pad_features(&device));
        }

        self.devices.push((device, wrapper.id));
        RawEvent::DeviceAdded { device: wrapper }
    }

    fn device_removed(&mut self, device: &input::Device) -> Option<RawEvent> {
        let index = self.devices.iter().position(|(dev, _)| dev == device)?;
        let (_, id) = self.devices.remove(index);
        debug!(device = %id, "libinput device removed");
        Some(RawEvent::DeviceRemoved { device: id })
    }

    fn translate(&mut self, event: input::Event) -> Option<RawEvent> {
        if let input::Event::Device(ref dev_event) = event {
            return match dev_event {
                DeviceEvent::Added(e) => Some(self.device_added(e.device())),
                DeviceEvent::Removed(e) => self.device_removed(&e.device()),
                _ => None,
            };
        }

        let device = self.id_for(&event.device())?;
        match event {
            input::Event::Keyboard(KeyboardEvent::Key(k)) => Some(RawEvent::Key {
                device,
                time_us: k.time_usec(),
                key: k.key(),
                state: match k.key_state() {
                    input::event::keyboard::KeyState::Pressed => KeyState::Pressed,
                    input::event::keyboard::KeyState::Released => KeyState::Released,
                },
            }),
            input::Event::Pointer(pointer) => self.translate_pointer(device, pointer),
            input::Event::Touch(touch) => translate_touch(device, touch),
            input::Event::Tablet(tool) => translate_tool(device, tool),
            input::Event::TabletPad(pad) => translate_pad(device, pad),
            input::Event::Switch(SwitchEvent::Toggle(t)) => {
                let kind = match t.switch()? {
                    Switch::Lid => SwitchKind::Lid,
                    Switch::TabletMode => SwitchKind::TabletMode,
                    _ => return None,
                };
                Some(RawEvent::SwitchToggle {
                    device,
                    time_us: t.time_usec(),
                    switch: kind,
                    on: t.switch_state() == SwitchState::On,
                })
            }
            _ => None,
        }
    }

    fn translate_pointer(&self, device: DeviceId, event: PointerEvent) -> Option<RawEvent> {
        match event {
            PointerEvent::Motion(m) => Some(RawEvent::PointerMotion {
                device,
                time_us: m.time_usec(),
                delta: Pos::new(m.dx(), m.dy()),
                delta_unaccel: Pos::new(m.dx_unaccelerated(), m.dy_unaccelerated()),
            }),
            PointerEvent::MotionAbsolute(m) => Some(RawEvent::PointerMotionAbsolute {
                device,
                time_us: m.time_usec(),
                pos: Pos::new(m.absolute_x_transformed(1), m.absolute_y_transformed(1)),
            }),
            PointerEvent::Button(b) => Some(RawEvent::Button {
                device,
                time_us: b.time_usec(),
                button: b.button(),
                state: match b.button_state() {
                    input::event::pointer::ButtonState::Pressed => ButtonState::Pressed,
                    input::event::pointer::ButtonState::Released => ButtonState::Released,
                },
            }),
            PointerEvent::ScrollWheel(s) => {
                let v120 = Some((
                    axis_value(&s, Axis::Horizontal, |s, a| s.scroll_value_v120(a)),
                    axis_value(&s, Axis::Vertical, |s, a| s.scroll_value_v120(a)),
                ));
                Some(scroll_event(device, &s, ScrollSource::Wheel, v120))
            }
            PointerEvent::ScrollFinger(s) => {
                Some(scroll_event(device, &s, ScrollSource::Finger, None))
            }
            PointerEvent::ScrollContinuous(s) => {
                Some(scroll_event(device, &s, ScrollSource::Continuous, None))
            }
            _ => None,
        }
    }
}

fn axis_value<E: PointerScrollEvent>(
    event: &E,
    axis: Axis,
    get: impl Fn(&E, Axis) -> f64,
) -> f64 {
    if event.has_axis(axis) {
        get(event, axis)
    } else {
        0.0
    }
}

fn scroll_event<E: PointerScrollEvent + input::event::pointer::PointerEventTrait>(
    device: DeviceId,
    event: &E,
    source: ScrollSource,
    v120: Option<(f64, f64)>,
) -> RawEvent {
    let dx = axis_value(event, Axis::Horizontal, |e, a| e.scroll_value(a));
    let dy = axis_value(event, Axis::Vertical, |e, a| e.scroll_value(a));
    RawEvent::Scroll {
        device,
        time_us: event.time_usec(),
        source,
        delta: Pos::new(dx, dy),
        v120,
        // a zero value on a present axis is the end-of-scroll marker
        stop_x: event.has_axis(Axis::Horizontal) && dx == 0.0,
        stop_y: event.has_axis(Axis::Vertical) && dy == 0.0,
    }
}

fn translate_touch(device: DeviceId, event: TouchEvent) -> Option<RawEvent> {
    match event {
        TouchEvent::Down(t) => Some(RawEvent::TouchDown {
            device,
            time_us: t.time_usec(),
            slot: t.slot().unwrap_or(0),
            pos: Pos::new(t.x_transformed(1), t.y_transformed(1)),
        }),
        TouchEvent::Motion(t) => Some(RawEvent::TouchMotion {
            device,
            time_us: t.time_usec(),
            slot: t.slot().unwrap_or(0),
            pos: Pos::new(t.x_transformed(1), t.y_transformed(1)),
        }),
        TouchEvent::Up(t) => Some(RawEvent::TouchUp {
            device,
            time_us: t.time_usec(),
            slot: t.slot().unwrap_or(0),
        }),
        TouchEvent::Cancel(t) => Some(RawEvent::TouchCancel {
            device,
            time_us: t.time_usec(),
        }),
        // frame boundaries are not forwarded; the seat emits per event
        _ => None,
    }
}

fn tool_descriptor(tool: &input::event::tablet_tool::TabletTool) -> ToolDescriptor {
    use input::event::tablet_tool::TabletToolType;
    let kind = match tool.tool_type() {
        TabletToolType::Pen => ToolKind::Pen,
        TabletToolType::Eraser => ToolKind::Eraser,
        TabletToolType::Brush => ToolKind::Brush,
        TabletToolType::Pencil => ToolKind::Pencil,
        TabletToolType::Airbrush => ToolKind::Airbrush,
        TabletToolType::Mouse => ToolKind::Mouse,
        TabletToolType::Lens => ToolKind::Lens,
        TabletToolType::Totem => ToolKind::Totem,
    };
    ToolDescriptor {
        serial: tool.serial(),
        kind,
    }
}

fn translate_tool(device: DeviceId, event: TabletToolEvent) -> Option<RawEvent> {
    match event {
        TabletToolEvent::Axis(e) => Some(RawEvent::ToolAxis {
            device,
            time_us: e.time_usec(),
            tool: tool_descriptor(&e.tool()),
            pos: Pos::new(e.x_transformed(1), e.y_transformed(1)),
            pressure: e.pressure_has_changed().then(|| e.pressure()),
            tilt: (e.tilt_x_has_changed() || e.tilt_y_has_changed())
                .then(|| (e.tilt_x(), e.tilt_y())),
            distance: e.distance_has_changed().then(|| e.distance()),
            rotation: e.rotation_has_changed().then(|| e.rotation()),
            slider: e.slider_has_changed().then(|| e.slider_position()),
        }),
        TabletToolEvent::Proximity(e) => Some(RawEvent::ToolProximity {
            device,
            time_us: e.time_usec(),
            tool: tool_descriptor(&e.tool()),
            pos: Pos::new(e.x_transformed(1), e.y_transformed(1)),
            in_proximity: e.proximity_state() == ProximityState::In,
        }),
        TabletToolEvent::Tip(e) => Some(RawEvent::ToolTip {
            device,
            time_us: e.time_usec(),
            tool: tool_descriptor(&e.tool()),
            pos: Pos::new(e.x_transformed(1), e.y_transformed(1)),
            down: e.tip_state() == TipState::Down,
        }),
        TabletToolEvent::Button(e) => Some(RawEvent::ToolButton {
            device,
            time_us: e.time_usec(),
            tool: tool_descriptor(&e.tool()),
            button: e.button(),
            state: match e.button_state() {
                input::event::tablet_tool::ButtonState::Pressed => ButtonState::Pressed,
                input::event::tablet_tool::ButtonState::Released => ButtonState::Released,
            },
        }),
        _ => None,
    }
}

fn translate_pad(device: DeviceId, event: TabletPadEvent) -> Option<RawEvent> {
    match event {
        TabletPadEvent::Button(e) => Some(RawEvent::PadButton {
            device,
            time_us: e.time_usec(),
            button: e.button_number(),
            state: match e.button_state() {
                input::event::tablet_pad::ButtonState::Pressed => ButtonState::Pressed,
                input::event::tablet_pad::ButtonState::Released => ButtonState::Released,
            },
            mode: e.mode(),
        }),
        TabletPadEvent::Ring(e) => Some(RawEvent::PadRing {
            device,
            time_us: e.time_usec(),
            number: e.number(),
            position: (e.position() >= 0.0).then(|| e.position()),
            mode: e.mode(),
        }),
        TabletPadEvent::Strip(e) => Some(RawEvent::PadStrip {
            device,
            time_us: e.time_usec(),
            number: e.number(),
            position: (e.position() >= 0.0).then(|| e.position()),
            mode: e.mode(),
        }),
        _ => None,
    }
}

/// Mode-group layout of a pad: which group each button/ring/strip belongs
/// to, and how many modes each group cycles through. Features not claimed
/// by any group land in group 0.
fn pad_features(device: &input::Device) -> PadFeatures {
    let mut features = PadFeatures::default();
    let n_buttons = device.tablet_pad_number_of_buttons().max(0) as usize;
    let n_rings = device.tablet_pad_number_of_rings().max(0) as usize;
    let n_strips = device.tablet_pad_number_of_strips().max(0) as usize;
    features.buttons = vec![0; n_buttons];
    features.rings = vec![0; n_rings];
    features.strips = vec![0; n_strips];

    let n_groups = device.tablet_pad_number_of_mode_groups().max(0) as u32;
    for index in 0..n_groups {
        let Some(group) = device.tablet_pad_mode_group(index) else {
            continue;
        };
        features.groups.push(PadGroup {
            n_modes: (group.number_of_modes() as u32).max(1),
            current_mode: group.mode() as u32,
        });
        for button in 0..n_buttons {
            if group.has_button(button as _) {
                features.buttons[button] = index;
            }
        }
        for ring in 0..n_rings {
            if group.has_ring(ring as _) {
                features.rings[ring] = index;
            }
        }
        for strip in 0..n_strips {
            if group.has_strip(strip as _) {
                features.strips[strip] = index;
            }
        }
    }
    if features.groups.is_empty() {
        features.groups.push(PadGroup {
            n_modes: 1,
            current_mode: 0,
        });
    }
    features
}

impl EventSource for LibinputSource {
    #[profiling::function]
    fn dispatch(&mut self, sink: &mut dyn FnMut(RawEvent)) -> io::Result<()> {
        self.libinput.dispatch()?;
        while let Some(event) = self.libinput.next() {
            if let Some(raw) = self.translate(event) {
                sink(raw);
            }
        }
        Ok(())
    }

    fn poll_fd(&self) -> Option<BorrowedFd<'_>> {
        // the fd stays valid for as long as the context lives
        Some(unsafe { BorrowedFd::borrow_raw(self.libinput.as_raw_fd()) })
    }

    fn suspend(&mut self) {
        debug!("suspending libinput context");
        self.libinput.suspend();
        self.devices.clear();
    }

    fn resume(&mut self) -> io::Result<()> {
        debug!("resuming libinput context");
        self.libinput
            .resume()
            .map_err(|()| io::Error::new(io::ErrorKind::Other, "libinput resume failed"))
    }
}
