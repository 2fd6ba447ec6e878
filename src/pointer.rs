//! Seat pointer state: position, button reference counts, and the optional
//! pointer constraint region.

use std::collections::HashMap;

use tracing::warn;

use crate::event::Pos;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, w: f64, h: f64) -> Self {
        Self { x, y, w, h }
    }

    pub fn contains(&self, pos: Pos) -> bool {
        pos.x >= self.x && pos.x <= self.x + self.w && pos.y >= self.y && pos.y <= self.y + self.h
    }

    fn clamp(&self, pos: Pos) -> Pos {
        Pos {
            x: pos.x.clamp(self.x, self.x + self.w),
            y: pos.y.clamp(self.y, self.y + self.h),
        }
    }
}

/// Region the pointer is confined to while a constraint is active. Motion
/// leaving the region is projected back into the rect that contained the
/// previous position.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstraintRegion {
    pub rects: Vec<Rect>,
}

impl ConstraintRegion {
    pub fn new(rects: Vec<Rect>) -> Self {
        Self { rects }
    }

    pub fn contains(&self, pos: Pos) -> bool {
        self.rects.iter().any(|r| r.contains(pos))
    }

    pub fn confine(&self, prev: Pos, next: Pos) -> Pos {
        if self.contains(next) {
            return next;
        }
        if let Some(rect) = self.rects.iter().find(|r| r.contains(prev)) {
            return rect.clamp(next);
        }
        // the pointer never entered the region; leave the motion alone
        next
    }
}

#[derive(Debug, Default)]
pub struct PointerState {
    pub pos: Pos,
    /// Press reference count per button code; several devices may hold the
    /// same button.
    buttons: HashMap<u32, u32>,
    pub constraint: Option<ConstraintRegion>,
    /// Logical screen extents used to keep the cursor on screen; `None`
    /// until the compositor reports them.
    pub screen: Option<(f64, f64)>,
}

impl PointerState {
    /// Count a press, returning true when this is the first press of the
    /// code (the one to forward as a state change).
    pub fn press(&mut self, button: u32) -> bool {
        let count = self.buttons.entry(button).or_insert(0);
        *count += 1;
        *count == 1
    }

    /// Count a release, returning true when the code is fully released.
    /// A release with no matching press is a device/state inconsistency:
    /// it is reported as `None` and the caller drops the event.
    pub fn release(&mut self, button: u32) -> Option<bool> {
        match self.buttons.get_mut(&button) {
            Some(count) if *count > 0 => {
                *count -= 1;
                if *count == 0 {
                    self.buttons.remove(&button);
                    Some(true)
                } else {
                    Some(false)
                }
            }
            _ => {
                warn!(button, "button release without matching press, dropping");
                None
            }
        }
    }

    pub fn is_pressed(&self, button: u32) -> bool {
        self.buttons.get(&button).copied().unwrap_or(0) > 0
    }

    pub fn pressed_buttons(&self) -> impl Iterator<Item = u32> + '_ {
        self.buttons.keys().copied()
    }

    pub fn clamp_to_screen(&self, pos: Pos) -> Pos {
        match self.screen {
            Some((w, h)) => Pos {
                x: pos.x.clamp(0.0, w - 1.0),
                y: pos.y.clamp(0.0, h - 1.0),
            },
            None => pos,
        }
    }
}
