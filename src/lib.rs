//! Native input backend for a Wayland compositor.
//!
//! Device I/O runs on a dedicated input thread: libinput (or a headless
//! stand-in) feeds raw events through the seat state machine, which owns
//! the xkb keyboard, touch slot table, tablet tool calibration, pointer
//! barriers, and the keyboard accessibility filter chain. The compositor
//! talks to the seat through [`Seat`]: queries read a lock-protected
//! snapshot, mutations are posted as tasks, and processed events come back
//! over an [`EventQueue`] that plugs into the compositor's calloop.
//!
//! ```no_run
//! use otto_input::{Backend, InputConfig, Seat};
//!
//! let config = InputConfig::default();
//! let (seat, queue) = Seat::start(config, Backend::Headless).unwrap();
//! seat.set_screen_extents(Some((1920.0, 1080.0))).unwrap();
//! // insert `queue` into the compositor event loop and drain events there
//! # drop(seat);
//! ```

pub mod a11y;
pub mod backend;
pub mod barrier;
pub mod config;
pub mod device;
pub mod error;
pub mod event;
pub mod keyboard;
pub mod keys;
pub mod pointer;
pub mod seat;
mod seat_impl;
pub mod tablet;
mod thread;
pub mod touch;

pub use crate::a11y::A11yFlags;
pub use crate::barrier::{BarrierDef, BarrierDirections, BarrierEvent, BarrierId};
pub use crate::config::{A11ySettings, InputConfig, MouseKeysConfig, PointerConfig, RepeatConfig};
pub use crate::device::{DeviceCapabilities, DeviceId, DeviceKind, Transform};
pub use crate::error::InputError;
pub use crate::event::{
    ButtonState, Event, KeyState, Pos, ScrollSource, SwitchKind, ToolDescriptor, ToolKind,
};
pub use crate::keyboard::{LedState, Modifiers};
pub use crate::pointer::{ConstraintRegion, Rect};
pub use crate::seat::{DeviceInfo, EventQueue, Seat, VirtualDevice};
pub use crate::tablet::{PressureCurve, Tool};
pub use crate::thread::Backend;
