//! The seat state machine living on the input thread.
//!
//! Everything here runs on the dedicated input thread inside its calloop
//! event loop: raw events from the backend source, tasks posted by the
//! compositor-side [`Seat`](crate::seat::Seat) handle, and timers (key
//! repeat, accessibility). Results cross back to the compositor as
//! [`Event`]s pushed onto the queue followed by a ping, and as updates to
//! the shared snapshot behind the seat's `RwLock`.

use std::collections::HashMap;
use std::sync::mpsc;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use calloop::ping::Ping;
use calloop::timer::{TimeoutAction, Timer};
use calloop::{LoopHandle, LoopSignal, RegistrationToken};
use tracing::{debug, info, warn};

use crate::a11y::{A11yAction, FilterChain, KeyEvent, TimerKind};
use crate::backend::EventSource;
use crate::barrier::{BarrierDef, BarrierId, BarrierManager, BarrierSignal};
use crate::config::{A11ySettings, InputConfig, MouseKeysConfig, PointerConfig, RepeatConfig};
use crate::device::{
    DeviceCapabilities, DeviceHandle, DeviceId, DeviceRegistry, InputDevice, Transform,
};
use crate::error::InputError;
use crate::event::{
    now_us, ButtonState, Event, KeyState, Pos, RawEvent, ScrollSource, SwitchKind,
};
use crate::keyboard::XkbKeyboard;
use crate::pointer::{ConstraintRegion, PointerState};
use crate::seat::{DeviceInfo, SharedState};
use crate::tablet::ToolCache;
use crate::touch::TouchTable;

pub(crate) struct SeatImpl {
    source: Box<dyn EventSource>,
    registry: DeviceRegistry,
    keyboard: XkbKeyboard,
    pointer: PointerState,
    touch: TouchTable,
    barriers: BarrierManager,
    a11y: FilterChain,
    tools: ToolCache,
    #[cfg_attr(not(feature = "libinput"), allow(dead_code))]
    pointer_cfg: PointerConfig,

    shared: Arc<RwLock<SharedState>>,
    events: mpsc::Sender<Event>,
    ping: Ping,
    handle: LoopHandle<'static, SeatImpl>,
    stop: LoopSignal,

    a11y_timers: HashMap<TimerKind, RegistrationToken>,
    repeat: Option<(RegistrationToken, DeviceId, u32)>,
    /// Sticky-managed locked bits currently applied to xkb, so a rewrite
    /// does not clobber real locks like NumLock.
    sticky_locked: u32,
    /// Virtual pointer that owns events synthesized by mouse keys.
    synth_pointer: Option<DeviceId>,
    suspended: bool,
}

impl SeatImpl {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        config: &InputConfig,
        source: Box<dyn EventSource>,
        tools: ToolCache,
        shared: Arc<RwLock<SharedState>>,
        events: mpsc::Sender<Event>,
        ping: Ping,
        handle: LoopHandle<'static, SeatImpl>,
        stop: LoopSignal,
    ) -> Result<Self, InputError> {
        let keyboard = XkbKeyboard::new(&config.keyboard, config.repeat)?;
        let a11y = FilterChain::new(config.a11y, config.mouse_keys);
        let seat = Self {
            source,
            registry: DeviceRegistry::default(),
            keyboard,
            pointer: PointerState::default(),
            touch: TouchTable::default(),
            barriers: BarrierManager::default(),
            a11y,
            tools,
            pointer_cfg: config.pointer,
            shared,
            events,
            ping,
            handle,
            stop,
            a11y_timers: HashMap::new(),
            repeat: None,
            sticky_locked: 0,
            synth_pointer: None,
            suspended: false,
        };
        seat.publish_keyboard_state();
        {
            let mut shared = seat.shared.write().unwrap();
            shared.a11y_flags = seat.a11y.flags();
        }
        Ok(seat)
    }

    fn emit(&self, event: Event) {
        // a dropped queue means the compositor is going away; nothing to do
        if self.events.send(event).is_ok() {
            self.ping.ping();
        }
    }

    fn publish_keyboard_state(&self) {
        let mut shared = self.shared.write().unwrap();
        shared.modifiers = self.keyboard.modifiers();
        shared.leds = self.keyboard.leds();
        shared.layouts = self.keyboard.layout_names();
        shared.active_layout = self.keyboard.active_layout();
    }

    /// Drain the backend source. Runs when its fd becomes readable.
    #[profiling::function]
    pub(crate) fn dispatch_source(&mut self) -> std::io::Result<()> {
        let mut batch = Vec::new();
        self.source.dispatch(&mut |raw| batch.push(raw))?;
        for raw in batch {
            self.handle_raw(raw);
        }
        Ok(())
    }

    /// Single entry point for raw events, from the backend and from
    /// virtual device injection alike.
    #[profiling::function]
    pub(crate) fn handle_raw(&mut self, raw: RawEvent) {
        match raw {
            RawEvent::DeviceAdded { device } => self.device_added(device),
            RawEvent::DeviceRemoved { device } => self.device_removed(device),
            RawEvent::Key {
                device,
                time_us,
                key,
                state,
            } => self.key_event(KeyEvent {
                device,
                time_us,
                key,
                state,
            }),
            RawEvent::PointerMotion {
                device,
                time_us,
                delta,
                delta_unaccel,
            } => {
                let prev = self.pointer.pos;
                let proposed = Pos::new(prev.x + delta.x, prev.y + delta.y);
                self.move_pointer(device, time_us, proposed, delta, delta_unaccel);
            }
            RawEvent::PointerMotionAbsolute {
                device,
                time_us,
                pos,
            } => {
                let target = self.to_screen(device, pos);
                let prev = self.pointer.pos;
                let delta = Pos::new(target.x - prev.x, target.y - prev.y);
                self.move_pointer(device, time_us, target, delta, delta);
            }
            RawEvent::Button {
                device,
                time_us,
                button,
                state,
            } => self.pointer_button(device, time_us, button, state),
            RawEvent::Scroll {
                device,
                time_us,
                source,
                delta,
                v120,
                stop_x,
                stop_y,
            } => self.scroll(device, time_us, source, delta, v120, stop_x, stop_y),
            RawEvent::TouchDown {
                device,
                time_us,
                slot,
                pos,
            } => {
                let pos = self.to_screen(device, pos);
                if let Some(seat_slot) = self.touch.down(device, slot, pos) {
                    self.shared.write().unwrap().touches.insert(seat_slot, pos);
                    self.emit(Event::TouchDown {
                        device,
                        time_us,
                        seat_slot,
                        pos,
                    });
                }
            }
            RawEvent::TouchMotion {
                device,
                time_us,
                slot,
                pos,
            } => {
                let pos = self.to_screen(device, pos);
                if let Some(seat_slot) = self.touch.motion(device, slot, pos) {
                    self.shared.write().unwrap().touches.insert(seat_slot, pos);
                    self.emit(Event::TouchMotion {
                        device,
                        time_us,
                        seat_slot,
                        pos,
                    });
                }
            }
            RawEvent::TouchUp {
                device,
                time_us,
                slot,
            } => {
                if let Some(seat_slot) = self.touch.up(device, slot) {
                    self.shared.write().unwrap().touches.remove(&seat_slot);
                    self.emit(Event::TouchUp {
                        device,
                        time_us,
                        seat_slot,
                    });
                }
            }
            RawEvent::TouchCancel { device, time_us } => {
                self.cancel_touches(device, time_us);
            }
            RawEvent::ToolAxis {
                device,
                time_us,
                tool,
                pos,
                pressure,
                tilt,
                distance,
                rotation,
                slider,
            } => {
                let pos = self.to_screen(device, pos);
                let pressure = pressure.map(|raw| self.tools.obtain(tool).pressure(raw));
                self.emit(Event::ToolMotion {
                    device,
                    time_us,
                    tool,
                    pos,
                    pressure,
                    tilt,
                    distance,
                    rotation,
                    slider,
                });
            }
            RawEvent::ToolProximity {
                device,
                time_us,
                tool,
                pos: _,
                in_proximity,
            } => {
                if in_proximity {
                    // warm the calibration cache on first sight
                    let _ = self.tools.obtain(tool);
                }
                self.emit(Event::ToolProximity {
                    device,
                    time_us,
                    tool,
                    in_proximity,
                });
            }
            RawEvent::ToolTip {
                device,
                time_us,
                tool,
                pos,
                down,
            } => {
                let pos = self.to_screen(device, pos);
                self.emit(Event::ToolTip {
                    device,
                    time_us,
                    tool,
                    pos,
                    down,
                });
            }
            RawEvent::ToolButton {
                device,
                time_us,
                tool,
                button,
                state,
            } => {
                let button = self.tools.obtain(tool).map_button(button);
                self.emit(Event::ToolButton {
                    device,
                    time_us,
                    tool,
                    button,
                    state,
                });
            }
            RawEvent::PadButton {
                device,
                time_us,
                button,
                state,
                mode,
            } => {
                let group = self.pad_group(device, mode, |pad| pad.group_for_button(button));
                self.emit(Event::PadButton {
                    device,
                    time_us,
                    button,
                    state,
                    mode,
                    group,
                });
            }
            RawEvent::PadRing {
                device,
                time_us,
                number,
                position,
                mode,
            } => {
                let group = self.pad_group(device, mode, |pad| pad.group_for_ring(number));
                self.emit(Event::PadRing {
                    device,
                    time_us,
                    number,
                    position,
                    mode,
                    group,
                });
            }
            RawEvent::PadStrip {
                device,
                time_us,
                number,
                position,
                mode,
            } => {
                let group = self.pad_group(device, mode, |pad| pad.group_for_strip(number));
                self.emit(Event::PadStrip {
                    device,
                    time_us,
                    number,
                    position,
                    mode,
                    group,
                });
            }
            RawEvent::SwitchToggle {
                device,
                time_us,
                switch,
                on,
            } => self.switch_toggle(device, time_us, switch, on),
        }
    }

    // ---- devices ------------------------------------------------------

    fn device_added(&mut self, device: InputDevice) {
        #[cfg(feature = "libinput")]
        let mut device = device;
        #[cfg(feature = "libinput")]
        let is_keyboard = device.capabilities.contains(DeviceCapabilities::KEYBOARD);
        #[cfg(feature = "libinput")]
        if device.capabilities.contains(DeviceCapabilities::POINTER) {
            if let Some(DeviceHandle::Libinput(dev)) = device.handle_mut() {
                configure_libinput_device(&self.pointer_cfg, dev);
            }
        }
        let info = DeviceInfo {
            id: device.id,
            name: device.name.clone(),
            capabilities: device.capabilities,
        };
        let id = self.registry.insert(device);
        self.shared.write().unwrap().devices.push(info.clone());
        self.emit(Event::DeviceAdded {
            device: id,
            name: info.name,
            capabilities: info.capabilities,
        });
        #[cfg(feature = "libinput")]
        if is_keyboard {
            self.sync_leds();
        }
    }

    fn device_removed(&mut self, id: DeviceId) {
        let Some(mut device) = self.registry.remove(id) else {
            warn!(device = %id, "removal of unknown device");
            return;
        };
        let _ = device.detach();
        drop(device);
        self.cancel_touches(id, now_us());
        if self.synth_pointer == Some(id) {
            self.synth_pointer = None;
        }
        self.shared.write().unwrap().devices.retain(|d| d.id != id);
        self.emit(Event::DeviceRemoved { device: id });
    }

    fn cancel_touches(&mut self, device: DeviceId, time_us: u64) {
        let slots = self.touch.cancel_device(device);
        let mut shared = self.shared.write().unwrap();
        for seat_slot in &slots {
            shared.touches.remove(seat_slot);
        }
        drop(shared);
        for seat_slot in slots {
            self.emit(Event::TouchCancel {
                device,
                time_us,
                seat_slot,
            });
        }
    }

    fn pad_group(
        &mut self,
        device: DeviceId,
        mode: u32,
        which: impl Fn(&crate::device::PadFeatures) -> u32,
    ) -> u32 {
        let Some(pad) = self.registry.get_mut(device).and_then(|d| d.pad.as_mut()) else {
            return 0;
        };
        let group = which(pad);
        pad.set_mode(group, mode);
        group
    }

    fn switch_toggle(&mut self, device: DeviceId, time_us: u64, switch: SwitchKind, on: bool) {
        debug!(device = %device, ?switch, on, "switch toggled");
        self.emit(Event::SwitchToggle {
            device,
            time_us,
            switch,
            on,
        });
    }

    /// Device id owning synthesized pointer events (mouse keys, warps),
    /// created on first use so idle seats never see it.
    fn synth_pointer(&mut self) -> DeviceId {
        if let Some(id) = self.synth_pointer {
            return id;
        }
        let device = InputDevice::new(
            "virtual core pointer",
            DeviceCapabilities::POINTER,
            DeviceHandle::Virtual,
        );
        let id = device.id;
        self.synth_pointer = Some(id);
        self.device_added(device);
        id
    }

    // ---- pointer ------------------------------------------------------

    /// Barrier clamp, then constraint confinement, then the screen clamp.
    fn move_pointer(
        &mut self,
        device: DeviceId,
        time_us: u64,
        proposed: Pos,
        delta: Pos,
        delta_unaccel: Pos,
    ) {
        let prev = self.pointer.pos;
        let (mut pos, signals) = self.barriers.clamp_motion(prev, proposed, time_us);
        if let Some(region) = &self.pointer.constraint {
            pos = region.confine(prev, pos);
        }
        pos = self.pointer.clamp_to_screen(pos);
        self.pointer.pos = pos;
        self.shared.write().unwrap().pointer = pos;
        self.emit(Event::Motion {
            device,
            time_us,
            pos,
            delta,
            delta_unaccel,
            modifiers: self.keyboard.modifiers(),
        });
        self.emit_barrier_signals(signals);
    }

    fn emit_barrier_signals(&self, signals: Vec<BarrierSignal>) {
        for signal in signals {
            self.emit(match signal {
                BarrierSignal::Hit(e) => Event::BarrierHit(e),
                BarrierSignal::Left(e) => Event::BarrierLeft(e),
            });
        }
    }

    fn pointer_button(
        &mut self,
        device: DeviceId,
        time_us: u64,
        button: u32,
        state: ButtonState,
    ) {
        let forward = match state {
            ButtonState::Pressed => self.pointer.press(button),
            ButtonState::Released => match self.pointer.release(button) {
                Some(last) => last,
                None => return,
            },
        };
        // only the first press and the last release are state changes
        if forward {
            self.emit(Event::Button {
                device,
                time_us,
                button,
                state,
                modifiers: self.keyboard.modifiers(),
            });
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn scroll(
        &mut self,
        device: DeviceId,
        time_us: u64,
        source: ScrollSource,
        delta: Pos,
        v120: Option<(f64, f64)>,
        stop_x: bool,
        stop_y: bool,
    ) {
        self.emit(Event::Scroll {
            device,
            time_us,
            source,
            delta,
            v120,
            stop_x,
            stop_y,
            modifiers: self.keyboard.modifiers(),
        });
    }

    /// Map a normalized `[0, 1]` position through the device calibration
    /// and onto the screen.
    fn to_screen(&self, device: DeviceId, pos: Pos) -> Pos {
        let pos = self
            .registry
            .get(device)
            .map(|d| d.apply_transform(pos))
            .unwrap_or(pos);
        match self.pointer.screen {
            Some((w, h)) => Pos::new(pos.x * w, pos.y * h),
            None => pos,
        }
    }

    // ---- keyboard -----------------------------------------------------

    fn key_event(&mut self, ev: KeyEvent) {
        let keyboard = &self.keyboard;
        let numlock = keyboard.numlock_active();
        let actions = self
            .a11y
            .process(ev, numlock, |key| keyboard.modifier_mask_for_key(key));
        self.apply_a11y_actions(actions);
    }

    fn apply_a11y_actions(&mut self, actions: Vec<A11yAction>) {
        for action in actions {
            match action {
                A11yAction::Forward(ev) => self.forward_key(ev),
                A11yAction::SetMods { latched, locked } => self.set_sticky_mods(latched, locked),
                A11yAction::Pointer { dx, dy } => {
                    let device = self.synth_pointer();
                    let prev = self.pointer.pos;
                    let proposed = Pos::new(prev.x + dx, prev.y + dy);
                    let delta = Pos::new(dx, dy);
                    self.move_pointer(device, now_us(), proposed, delta, delta);
                }
                A11yAction::Button { button, state } => {
                    let device = self.synth_pointer();
                    self.pointer_button(device, now_us(), button, state);
                }
                A11yAction::Arm { timer, delay_ms } => self.arm_a11y_timer(timer, delay_ms),
                A11yAction::Cancel(timer) => self.cancel_a11y_timer(timer),
                A11yAction::FlagsChanged(flags) => {
                    self.shared.write().unwrap().a11y_flags = flags;
                    self.emit(Event::A11yFlagsChanged(flags));
                }
            }
        }
    }

    fn set_sticky_mods(&mut self, latched: u32, locked: u32) {
        let real_locked = (self.keyboard.modifiers().locked & !self.sticky_locked) | locked;
        self.sticky_locked = locked;
        self.keyboard.set_latched_locked(latched, real_locked);
        self.publish_keyboard_state();
    }

    /// Deliver a key past the accessibility chain: xkb update, queue, and
    /// the repeat timer.
    fn forward_key(&mut self, ev: KeyEvent) {
        let pressed = ev.state == KeyState::Pressed;
        let modifiers = self.keyboard.update_key(ev.key, pressed);
        self.publish_keyboard_state();
        #[cfg(feature = "libinput")]
        self.sync_leds();
        self.emit(Event::Key {
            device: ev.device,
            time_us: ev.time_us,
            key: ev.key,
            keysym: self.keyboard.keysym(ev.key),
            state: ev.state,
            modifiers,
            repeat: false,
        });
        self.update_repeat(ev, pressed);
    }

    fn update_repeat(&mut self, ev: KeyEvent, pressed: bool) {
        if let Some((token, _, key)) = self.repeat {
            // any new press, and the release of the repeating key, stop it
            if pressed || key == ev.key {
                self.handle.remove(token);
                self.repeat = None;
            }
        }
        if !pressed || !self.keyboard.repeat.enabled || !self.keyboard.key_repeats(ev.key) {
            return;
        }
        let delay = Duration::from_millis(u64::from(self.keyboard.repeat.delay_ms));
        let (device, key) = (ev.device, ev.key);
        let timer = Timer::from_duration(delay);
        match self.handle.insert_source(timer, move |_, _, seat| {
            seat.repeat_fire(device, key)
        }) {
            Ok(token) => self.repeat = Some((token, device, key)),
            Err(err) => warn!(error = %err, "cannot arm repeat timer"),
        }
    }

    fn repeat_fire(&mut self, device: DeviceId, key: u32) -> TimeoutAction {
        if !matches!(self.repeat, Some((_, d, k)) if d == device && k == key) {
            return TimeoutAction::Drop;
        }
        self.emit(Event::Key {
            device,
            time_us: now_us(),
            key,
            keysym: self.keyboard.keysym(key),
            state: KeyState::Pressed,
            modifiers: self.keyboard.modifiers(),
            repeat: true,
        });
        TimeoutAction::ToDuration(Duration::from_millis(u64::from(
            self.keyboard.repeat.interval_ms,
        )))
    }

    fn arm_a11y_timer(&mut self, kind: TimerKind, delay_ms: u64) {
        self.cancel_a11y_timer(kind);
        let timer = Timer::from_duration(Duration::from_millis(delay_ms));
        match self.handle.insert_source(timer, move |_, _, seat| {
            seat.a11y_timer_fired(kind);
            TimeoutAction::Drop
        }) {
            Ok(token) => {
                self.a11y_timers.insert(kind, token);
            }
            Err(err) => warn!(error = %err, ?kind, "cannot arm accessibility timer"),
        }
    }

    fn cancel_a11y_timer(&mut self, kind: TimerKind) {
        if let Some(token) = self.a11y_timers.remove(&kind) {
            self.handle.remove(token);
        }
    }

    fn a11y_timer_fired(&mut self, kind: TimerKind) {
        self.a11y_timers.remove(&kind);
        let keyboard = &self.keyboard;
        let actions = self
            .a11y
            .timer_fired(kind, |key| keyboard.modifier_mask_for_key(key));
        self.apply_a11y_actions(actions);
    }

    #[cfg(feature = "libinput")]
    fn sync_leds(&mut self) {
        let leds = self.keyboard.leds();
        let mut flags = input::Led::empty();
        if leds.numlock {
            flags |= input::Led::NUMLOCK;
        }
        if leds.capslock {
            flags |= input::Led::CAPSLOCK;
        }
        for device in self.registry.iter_mut() {
            if !device.capabilities.contains(DeviceCapabilities::KEYBOARD) {
                continue;
            }
            if let Some(DeviceHandle::Libinput(dev)) = device.handle_mut() {
                dev.led_update(flags);
            }
        }
    }

    // ---- compositor-posted operations ---------------------------------

    pub(crate) fn set_keymap(
        &mut self,
        layouts: &str,
        variants: &str,
        options: Option<String>,
    ) -> Result<(), InputError> {
        self.keyboard.set_keymap(layouts, variants, options)?;
        self.sticky_locked = 0;
        self.publish_keyboard_state();
        #[cfg(feature = "libinput")]
        self.sync_leds();
        Ok(())
    }

    pub(crate) fn set_layout_index(&mut self, index: u32) {
        self.keyboard.set_layout_index(index);
        self.publish_keyboard_state();
    }

    pub(crate) fn set_numlock(&mut self, on: bool) {
        self.keyboard.set_numlock(on);
        self.publish_keyboard_state();
        #[cfg(feature = "libinput")]
        self.sync_leds();
    }

    pub(crate) fn set_repeat(&mut self, repeat: RepeatConfig) {
        self.keyboard.repeat = repeat;
        if !repeat.enabled {
            if let Some((token, _, _)) = self.repeat.take() {
                self.handle.remove(token);
            }
        }
    }

    pub(crate) fn set_pointer_config(&mut self, cfg: PointerConfig) {
        self.pointer_cfg = cfg;
        #[cfg(feature = "libinput")]
        for device in self.registry.iter_mut() {
            if !device.capabilities.contains(DeviceCapabilities::POINTER) {
                continue;
            }
            if let Some(DeviceHandle::Libinput(dev)) = device.handle_mut() {
                configure_libinput_device(&cfg, dev);
            }
        }
    }

    pub(crate) fn set_a11y(&mut self, settings: A11ySettings, mouse_keys: MouseKeysConfig) {
        let actions = self.a11y.set_settings(settings, mouse_keys);
        self.apply_a11y_actions(actions);
        self.shared.write().unwrap().a11y_flags = self.a11y.flags();
    }

    pub(crate) fn set_screen_extents(&mut self, extents: Option<(f64, f64)>) {
        self.pointer.screen = extents;
        let pos = self.pointer.clamp_to_screen(self.pointer.pos);
        self.pointer.pos = pos;
        self.shared.write().unwrap().pointer = pos;
    }

    pub(crate) fn warp_pointer(&mut self, pos: Pos) {
        let device = self.synth_pointer();
        let pos = self.pointer.clamp_to_screen(pos);
        self.pointer.pos = pos;
        self.shared.write().unwrap().pointer = pos;
        // warps jump over barriers on purpose; report zero delta
        self.emit(Event::Motion {
            device,
            time_us: now_us(),
            pos,
            delta: Pos::default(),
            delta_unaccel: Pos::default(),
            modifiers: self.keyboard.modifiers(),
        });
    }

    pub(crate) fn set_constraint(&mut self, region: Option<ConstraintRegion>) {
        self.pointer.constraint = region;
    }

    pub(crate) fn set_calibration(&mut self, device: DeviceId, transform: Transform) {
        match self.registry.get_mut(device) {
            Some(dev) => dev.transform = transform,
            None => warn!(device = %device, "calibration for unknown device"),
        }
    }

    pub(crate) fn add_barrier(&mut self, def: BarrierDef) -> Result<BarrierId, InputError> {
        self.barriers.add(def)
    }

    pub(crate) fn remove_barrier(&mut self, id: BarrierId) {
        if let Some(signal) = self.barriers.remove(id, now_us()) {
            self.emit_barrier_signals(vec![signal]);
        }
    }

    pub(crate) fn release_barrier(&mut self, id: BarrierId, event_id: u32) {
        self.barriers.release(id, event_id);
    }

    pub(crate) fn create_virtual_device(
        &mut self,
        name: String,
        capabilities: DeviceCapabilities,
    ) -> DeviceId {
        let device = InputDevice::new(name, capabilities, DeviceHandle::Virtual);
        let id = device.id;
        self.device_added(device);
        id
    }

    pub(crate) fn remove_virtual_device(&mut self, id: DeviceId) {
        self.device_removed(id);
    }

    // ---- lifecycle ----------------------------------------------------

    /// Release all devices, e.g. on VT switch away. Seat state (keymap,
    /// barriers, a11y) survives; devices come back on resume.
    pub(crate) fn suspend(&mut self) {
        if self.suspended {
            return;
        }
        info!("suspending input");
        self.suspended = true;
        self.source.suspend();
        if let Some((token, _, _)) = self.repeat.take() {
            self.handle.remove(token);
        }
        let contacts: Vec<DeviceId> = {
            let mut devices: Vec<DeviceId> = self.touch.iter().map(|c| c.device).collect();
            devices.sort_unstable();
            devices.dedup();
            devices
        };
        for device in contacts {
            self.cancel_touches(device, now_us());
        }
        self.synth_pointer = None;
        for id in self.registry.detach_all() {
            self.emit(Event::DeviceRemoved { device: id });
        }
        let mut shared = self.shared.write().unwrap();
        shared.devices.clear();
        shared.suspended = true;
    }

    pub(crate) fn resume(&mut self) {
        if !self.suspended {
            return;
        }
        info!("resuming input");
        match self.source.resume() {
            Ok(()) => {
                self.suspended = false;
                self.shared.write().unwrap().suspended = false;
                // devices re-announce themselves through the source; LEDs
                // resync as each keyboard arrives
            }
            Err(err) => warn!(error = %err, "resume failed, staying suspended"),
        }
    }

    pub(crate) fn shutdown(&mut self) {
        debug!("input thread shutting down");
        self.stop.stop();
    }

    /// Last thing to run on the input thread, after the loop has stopped.
    pub(crate) fn teardown(&mut self) {
        self.source.suspend();
        for _ in self.registry.detach_all() {}
    }
}

/// Push the seat-wide pointer defaults into one libinput device. Devices
/// without a given config option ignore the write.
#[cfg(feature = "libinput")]
fn configure_libinput_device(cfg: &PointerConfig, device: &mut input::Device) {
    let _ = device.config_accel_set_speed(cfg.accel_speed.clamp(-1.0, 1.0));
    let _ = device.config_scroll_set_natural_scroll_enabled(cfg.natural_scroll);
    if device.config_tap_finger_count() > 0 {
        let _ = device.config_tap_set_enabled(cfg.tap_to_click);
    }
}
