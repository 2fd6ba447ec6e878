use std::io;

/// Errors surfaced by the input backend.
///
/// Failures while processing a single raw event are never represented here;
/// they are logged and the event is dropped. Calling into a seat after
/// `destroy()` or detaching a device twice are contract violations and
/// assert instead of returning an error.
#[derive(Debug, thiserror::Error)]
pub enum InputError {
    /// The device context could not be created. Fatal to the seat; reported
    /// once through the startup handshake.
    #[error("failed to initialize input device context: {0}")]
    Init(String),

    /// A single device could not be opened. The device is skipped and the
    /// seat continues on the remaining ones.
    #[error("failed to open input device: {0}")]
    DeviceOpen(#[from] io::Error),

    /// Barrier definitions must be axis-aligned line segments.
    #[error("barrier ({x1},{y1})-({x2},{y2}) is not axis-aligned")]
    InvalidBarrier { x1: f64, y1: f64, x2: f64, y2: f64 },

    /// The xkb keymap could not be compiled from the requested layout names.
    #[error("failed to compile keymap for layouts {layouts:?}")]
    Keymap { layouts: String },

    /// The input thread is gone; the seat handle is stale.
    #[error("seat is closed")]
    SeatClosed,
}
