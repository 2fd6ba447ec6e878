//! Compositor-facing seat handle.
//!
//! [`Seat`] lives on the compositor thread. Reads come from a shared
//! snapshot kept current by the input thread; writes are posted as tasks
//! onto the input thread's loop. Events flow back through [`EventQueue`],
//! which plugs into the compositor's own calloop as an event source.

use std::collections::HashMap;
use std::sync::mpsc;
use std::sync::{Arc, Condvar, Mutex, RwLock};
use std::thread::JoinHandle;

use calloop::channel;
use calloop::ping::{make_ping, PingError, PingSource};
use calloop::{Poll, PostAction, Readiness, Token, TokenFactory};
use tracing::warn;

use crate::a11y::A11yFlags;
use crate::barrier::{BarrierDef, BarrierId};
use crate::config::{A11ySettings, InputConfig, MouseKeysConfig, PointerConfig, RepeatConfig};
use crate::device::{DeviceCapabilities, DeviceId, Transform};
use crate::error::InputError;
use crate::event::{
    now_us, ButtonState, Event, KeyState, Pos, RawEvent, ScrollSource,
    ToolDescriptor,
};
use crate::keyboard::{LedState, Modifiers};
use crate::pointer::ConstraintRegion;
use crate::seat_impl::SeatImpl;
use crate::tablet::{Tool, ToolCache};
use crate::thread::{self, Backend, Task};

/// Device facts mirrored for main-thread queries.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub id: DeviceId,
    pub name: String,
    pub capabilities: DeviceCapabilities,
}

/// Snapshot of seat state readable without a round trip to the input
/// thread. Written only by the input thread.
#[derive(Debug)]
pub struct SharedState {
    pub pointer: Pos,
    pub modifiers: Modifiers,
    pub leds: LedState,
    /// Live touch points keyed by seat slot.
    pub touches: HashMap<u32, Pos>,
    pub layouts: Vec<String>,
    pub active_layout: u32,
    pub a11y_flags: A11yFlags,
    pub devices: Vec<DeviceInfo>,
    pub suspended: bool,
}

impl Default for SharedState {
    fn default() -> Self {
        Self {
            pointer: Pos::default(),
            modifiers: Modifiers::default(),
            leds: LedState::default(),
            touches: HashMap::new(),
            layouts: Vec::new(),
            active_layout: 0,
            a11y_flags: A11yFlags::empty(),
            devices: Vec::new(),
            suspended: false,
        }
    }
}

/// Receiving end of the seat's event stream. Insert it into the
/// compositor's event loop; the callback runs once per queued [`Event`].
pub struct EventQueue {
    events: mpsc::Receiver<Event>,
    ping: PingSource,
}

impl EventQueue {
    /// Non-blocking pop, for consumers not driven by calloop.
    pub fn try_recv(&self) -> Option<Event> {
        self.events.try_recv().ok()
    }

    /// Blocking pop with a deadline, mainly for tests.
    pub fn recv_timeout(&self, timeout: std::time::Duration) -> Option<Event> {
        self.events.recv_timeout(timeout).ok()
    }
}

impl calloop::EventSource for EventQueue {
    type Event = Event;
    type Metadata = ();
    type Ret = ();
    type Error = PingError;

    fn process_events<F>(
        &mut self,
        readiness: Readiness,
        token: Token,
        mut callback: F,
    ) -> Result<PostAction, Self::Error>
    where
        F: FnMut(Self::Event, &mut Self::Metadata) -> Self::Ret,
    {
        let events = &self.events;
        self.ping.process_events(readiness, token, |_, _| {
            while let Ok(event) = events.try_recv() {
                callback(event, &mut ());
            }
        })
    }

    fn register(&mut self, poll: &mut Poll, factory: &mut TokenFactory) -> calloop::Result<()> {
        self.ping.register(poll, factory)
    }

    fn reregister(&mut self, poll: &mut Poll, factory: &mut TokenFactory) -> calloop::Result<()> {
        self.ping.reregister(poll, factory)
    }

    fn unregister(&mut self, poll: &mut Poll) -> calloop::Result<()> {
        self.ping.unregister(poll)
    }
}

/// Handle to the seat owned by the compositor thread. Dropping it shuts
/// the input thread down.
pub struct Seat {
    tasks: channel::Sender<Task>,
    shared: Arc<RwLock<SharedState>>,
    tools: ToolCache,
    join: Option<JoinHandle<()>>,
}

impl Seat {
    /// Spin up the input thread and open the backend. Fails synchronously
    /// when the backend or the initial keymap cannot be brought up.
    pub fn start(config: InputConfig, backend: Backend) -> Result<(Self, EventQueue), InputError> {
        let (event_tx, event_rx) = mpsc::channel();
        let (ping, ping_source) =
            make_ping().map_err(|e| InputError::Init(format!("event queue ping: {e}")))?;
        let parts = thread::spawn(config, backend, event_tx, ping)?;
        let seat = Self {
            tasks: parts.tasks,
            shared: parts.shared,
            tools: parts.tools,
            join: Some(parts.join),
        };
        let queue = EventQueue {
            events: event_rx,
            ping: ping_source,
        };
        Ok((seat, queue))
    }

    fn submit(&self, op: impl FnOnce(&mut SeatImpl) + Send + 'static) -> Result<(), InputError> {
        self.tasks
            .send(Task { op: Box::new(op) })
            .map_err(|_| InputError::SeatClosed)
    }

    /// Run `op` on the input thread and wait for its result. Must not be
    /// called from the input thread itself.
    fn submit_sync<T: Send + 'static>(
        &self,
        op: impl FnOnce(&mut SeatImpl) -> T + Send + 'static,
    ) -> Result<T, InputError> {
        let gate = Arc::new((Mutex::new(None::<T>), Condvar::new()));
        let task_gate = gate.clone();
        self.submit(move |seat| {
            let result = op(seat);
            let (lock, cvar) = &*task_gate;
            *lock.lock().unwrap() = Some(result);
            cvar.notify_one();
        })?;
        let (lock, cvar) = &*gate;
        let mut slot = lock.lock().unwrap();
        while slot.is_none() {
            slot = cvar.wait(slot).map_err(|_| InputError::SeatClosed)?;
        }
        slot.take().ok_or(InputError::SeatClosed)
    }

    // ---- queries ------------------------------------------------------

    pub fn pointer_position(&self) -> Pos {
        self.shared.read().unwrap().pointer
    }

    pub fn modifiers(&self) -> Modifiers {
        self.shared.read().unwrap().modifiers
    }

    pub fn leds(&self) -> LedState {
        self.shared.read().unwrap().leds
    }

    pub fn touch_points(&self) -> HashMap<u32, Pos> {
        self.shared.read().unwrap().touches.clone()
    }

    pub fn layouts(&self) -> Vec<String> {
        self.shared.read().unwrap().layouts.clone()
    }

    pub fn active_layout(&self) -> u32 {
        self.shared.read().unwrap().active_layout
    }

    pub fn a11y_flags(&self) -> A11yFlags {
        self.shared.read().unwrap().a11y_flags
    }

    pub fn devices(&self) -> Vec<DeviceInfo> {
        self.shared.read().unwrap().devices.clone()
    }

    pub fn is_suspended(&self) -> bool {
        self.shared.read().unwrap().suspended
    }

    // ---- keyboard -----------------------------------------------------

    /// Replace the keymap. Waits for compilation so invalid layouts are
    /// reported to the caller.
    pub fn set_keymap(
        &self,
        layouts: impl Into<String>,
        variants: impl Into<String>,
        options: Option<String>,
    ) -> Result<(), InputError> {
        let (layouts, variants) = (layouts.into(), variants.into());
        self.submit_sync(move |seat| seat.set_keymap(&layouts, &variants, options))?
    }

    pub fn set_layout_index(&self, index: u32) -> Result<(), InputError> {
        self.submit(move |seat| seat.set_layout_index(index))
    }

    pub fn set_numlock(&self, on: bool) -> Result<(), InputError> {
        self.submit(move |seat| seat.set_numlock(on))
    }

    pub fn set_repeat(&self, repeat: RepeatConfig) -> Result<(), InputError> {
        self.submit(move |seat| seat.set_repeat(repeat))
    }

    pub fn set_a11y(
        &self,
        settings: A11ySettings,
        mouse_keys: MouseKeysConfig,
    ) -> Result<(), InputError> {
        self.submit(move |seat| seat.set_a11y(settings, mouse_keys))
    }

    // ---- pointer ------------------------------------------------------

    /// Apply pointer defaults (acceleration, natural scroll, tap) to all
    /// current and future devices.
    pub fn set_pointer_config(&self, cfg: PointerConfig) -> Result<(), InputError> {
        self.submit(move |seat| seat.set_pointer_config(cfg))
    }

    pub fn set_screen_extents(&self, extents: Option<(f64, f64)>) -> Result<(), InputError> {
        self.submit(move |seat| seat.set_screen_extents(extents))
    }

    /// Jump the pointer to `pos`, ignoring barriers and constraints. Waits
    /// until the position is applied, so a query right after observes it.
    pub fn warp_pointer(&self, pos: Pos) -> Result<(), InputError> {
        self.submit_sync(move |seat| seat.warp_pointer(pos))
    }

    pub fn set_constraint(&self, region: Option<ConstraintRegion>) -> Result<(), InputError> {
        self.submit(move |seat| seat.set_constraint(region))
    }

    pub fn set_calibration(&self, device: DeviceId, transform: Transform) -> Result<(), InputError> {
        self.submit(move |seat| seat.set_calibration(device, transform))
    }

    // ---- barriers -----------------------------------------------------

    /// Install a pointer barrier. Waits for validation of the segment.
    pub fn add_barrier(&self, def: BarrierDef) -> Result<BarrierId, InputError> {
        self.submit_sync(move |seat| seat.add_barrier(def))?
    }

    /// Tear a barrier down. A barrier currently hit or held reports a
    /// final leave through the event queue.
    pub fn remove_barrier(&self, id: BarrierId) -> Result<(), InputError> {
        self.submit(move |seat| seat.remove_barrier(id))
    }

    /// Let the pointer pass through for the hit identified by `event_id`.
    pub fn release_barrier(&self, id: BarrierId, event_id: u32) -> Result<(), InputError> {
        self.submit(move |seat| seat.release_barrier(id, event_id))
    }

    // ---- tablet -------------------------------------------------------

    /// Calibration handle for a stylus; created on first use and shared
    /// with the input thread.
    pub fn tool(&self, descriptor: ToolDescriptor) -> Arc<Tool> {
        self.tools.obtain(descriptor)
    }

    // ---- lifecycle ----------------------------------------------------

    pub fn suspend(&self) -> Result<(), InputError> {
        self.submit(|seat| seat.suspend())
    }

    pub fn resume(&self) -> Result<(), InputError> {
        self.submit(|seat| seat.resume())
    }

    /// Register a compositor-driven device on the seat. Raw events are
    /// injected through the returned handle.
    pub fn create_virtual_device(
        &self,
        name: impl Into<String>,
        capabilities: DeviceCapabilities,
    ) -> Result<VirtualDevice, InputError> {
        let name = name.into();
        let id = self.submit_sync(move |seat| seat.create_virtual_device(name, capabilities))?;
        Ok(VirtualDevice {
            id,
            tasks: self.tasks.clone(),
        })
    }

    /// Stop the input thread and wait for it to exit.
    pub fn destroy(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        let Some(join) = self.join.take() else {
            return;
        };
        let _ = self.submit(|seat| seat.shutdown());
        if join.join().is_err() {
            warn!("input thread panicked during shutdown");
        }
    }
}

impl Drop for Seat {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// An input device fed by the compositor instead of hardware, e.g. for
/// remote desktop or tests. Events carry normalized coordinates like raw
/// hardware events do.
#[derive(Clone)]
pub struct VirtualDevice {
    id: DeviceId,
    tasks: channel::Sender<Task>,
}

impl std::fmt::Debug for VirtualDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VirtualDevice")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

impl VirtualDevice {
    pub fn id(&self) -> DeviceId {
        self.id
    }

    fn inject(
        &self,
        build: impl FnOnce(DeviceId, u64) -> RawEvent + Send + 'static,
    ) -> Result<(), InputError> {
        let id = self.id;
        self.tasks
            .send(Task {
                op: Box::new(move |seat| seat.handle_raw(build(id, now_us()))),
            })
            .map_err(|_| InputError::SeatClosed)
    }

    pub fn key(&self, key: u32, state: KeyState) -> Result<(), InputError> {
        self.inject(move |device, time_us| RawEvent::Key {
            device,
            time_us,
            key,
            state,
        })
    }

    pub fn motion(&self, dx: f64, dy: f64) -> Result<(), InputError> {
        self.inject(move |device, time_us| RawEvent::PointerMotion {
            device,
            time_us,
            delta: Pos::new(dx, dy),
            delta_unaccel: Pos::new(dx, dy),
        })
    }

    pub fn motion_absolute(&self, x: f64, y: f64) -> Result<(), InputError> {
        self.inject(move |device, time_us| RawEvent::PointerMotionAbsolute {
            device,
            time_us,
            pos: Pos::new(x, y),
        })
    }

    pub fn button(&self, button: u32, state: ButtonState) -> Result<(), InputError> {
        self.inject(move |device, time_us| RawEvent::Button {
            device,
            time_us,
            button,
            state,
        })
    }

    pub fn scroll(&self, source: ScrollSource, dx: f64, dy: f64) -> Result<(), InputError> {
        self.inject(move |device, time_us| RawEvent::Scroll {
            device,
            time_us,
            source,
            delta: Pos::new(dx, dy),
            v120: None,
            stop_x: false,
            stop_y: false,
        })
    }

    pub fn touch_down(&self, slot: u32, x: f64, y: f64) -> Result<(), InputError> {
        self.inject(move |device, time_us| RawEvent::TouchDown {
            device,
            time_us,
            slot,
            pos: Pos::new(x, y),
        })
    }

    pub fn touch_motion(&self, slot: u32, x: f64, y: f64) -> Result<(), InputError> {
        self.inject(move |device, time_us| RawEvent::TouchMotion {
            device,
            time_us,
            slot,
            pos: Pos::new(x, y),
        })
    }

    pub fn touch_up(&self, slot: u32) -> Result<(), InputError> {
        self.inject(move |device, time_us| RawEvent::TouchUp { device, time_us, slot })
    }

    pub fn touch_cancel(&self) -> Result<(), InputError> {
        self.inject(move |device, time_us| RawEvent::TouchCancel { device, time_us })
    }

    /// Remove the device from the seat. Live touches are cancelled.
    pub fn remove(self) -> Result<(), InputError> {
        let id = self.id;
        self.tasks
            .send(Task {
                op: Box::new(move |seat| seat.remove_virtual_device(id)),
            })
            .map_err(|_| InputError::SeatClosed)
    }
}
