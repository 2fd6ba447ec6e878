//! Raw event sources driven by the input thread's event loop.
//!
//! A source owns the device discovery side: it produces `DeviceAdded` and
//! `DeviceRemoved` events itself and stamps every raw event with the
//! [`DeviceId`](crate::device::DeviceId) it allocated for the device. The
//! libinput source is the real one; the headless source never produces
//! anything and exists for seats that are fed purely by virtual devices,
//! such as the test suite.

#[cfg(feature = "libinput")]
mod libinput;

#[cfg(feature = "libinput")]
pub use libinput::LibinputSource;

use std::io;
use std::os::unix::io::BorrowedFd;

use crate::event::RawEvent;

pub trait EventSource {
    /// Drain all pending raw events into `sink`. Called whenever the fd
    /// from [`EventSource::poll_fd`] becomes readable.
    fn dispatch(&mut self, sink: &mut dyn FnMut(RawEvent)) -> io::Result<()>;

    /// Fd to poll for readiness, or `None` for sources that never produce
    /// events on their own.
    fn poll_fd(&self) -> Option<BorrowedFd<'_>>;

    /// Stop delivering events and release the underlying device fds, e.g.
    /// when the session loses the VT.
    fn suspend(&mut self);

    /// Reacquire devices after a suspend. Devices present again are
    /// reported through fresh `DeviceAdded` events on the next dispatch.
    fn resume(&mut self) -> io::Result<()>;
}

/// Source with no devices behind it.
#[derive(Debug, Default)]
pub struct HeadlessSource;

impl EventSource for HeadlessSource {
    fn dispatch(&mut self, _sink: &mut dyn FnMut(RawEvent)) -> io::Result<()> {
        Ok(())
    }

    fn poll_fd(&self) -> Option<BorrowedFd<'_>> {
        None
    }

    fn suspend(&mut self) {}

    fn resume(&mut self) -> io::Result<()> {
        Ok(())
    }
}
