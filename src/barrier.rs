//! Pointer barriers: invisible axis-aligned line segments that block or
//! capture cursor motion.
//!
//! The manager owns every barrier of a seat and is consulted for each
//! pointer motion while the seat holds its writer lock. Notifications are
//! handed back to the seat, which forwards them to the compositor over the
//! event queue; nothing here calls back into compositor state.

use std::collections::BTreeMap;

use tracing::{debug, trace};

use crate::error::InputError;
use crate::event::Pos;

bitflags::bitflags! {
    /// Axis directions a barrier may block, or the coarse direction of a
    /// motion.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct BarrierDirections: u32 {
        const POSITIVE_X = 1 << 0;
        const POSITIVE_Y = 1 << 1;
        const NEGATIVE_X = 1 << 2;
        const NEGATIVE_Y = 1 << 3;
    }
}

impl BarrierDirections {
    pub fn opposite(self) -> Self {
        let mut out = Self::empty();
        if self.contains(Self::POSITIVE_X) {
            out |= Self::NEGATIVE_X;
        }
        if self.contains(Self::NEGATIVE_X) {
            out |= Self::POSITIVE_X;
        }
        if self.contains(Self::POSITIVE_Y) {
            out |= Self::NEGATIVE_Y;
        }
        if self.contains(Self::NEGATIVE_Y) {
            out |= Self::POSITIVE_Y;
        }
        out
    }

    const X_AXIS: Self = Self::POSITIVE_X.union(Self::NEGATIVE_X);
    const Y_AXIS: Self = Self::POSITIVE_Y.union(Self::NEGATIVE_Y);
}

/// Coarse direction of a motion as a bitmask, one bit per moving axis.
pub fn motion_directions(prev: Pos, next: Pos) -> BarrierDirections {
    let mut dirs = BarrierDirections::empty();
    if next.x > prev.x {
        dirs |= BarrierDirections::POSITIVE_X;
    } else if next.x < prev.x {
        dirs |= BarrierDirections::NEGATIVE_X;
    }
    if next.y > prev.y {
        dirs |= BarrierDirections::POSITIVE_Y;
    } else if next.y < prev.y {
        dirs |= BarrierDirections::NEGATIVE_Y;
    }
    dirs
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BarrierId(u32);

impl BarrierId {
    pub fn raw(&self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for BarrierId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "barrier-{}", self.0)
    }
}

/// Immutable geometric definition of a barrier.
#[derive(Debug, Clone, Copy)]
pub struct BarrierDef {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
    pub directions: BarrierDirections,
    pub sticky: bool,
}

impl BarrierDef {
    fn is_vertical(&self) -> bool {
        self.x1 == self.x2
    }

    /// The directions this barrier can block, restricted to its own axis.
    fn blockable(&self) -> BarrierDirections {
        if self.is_vertical() {
            self.directions & BarrierDirections::X_AXIS
        } else {
            self.directions & BarrierDirections::Y_AXIS
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Active,
    Hit,
    Held,
    Release,
    Left,
}

/// Notification payload for barrier "hit" and "left" signals.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BarrierEvent {
    pub barrier: BarrierId,
    /// Trigger serial recorded when the barrier was hit; a `release` call
    /// must present this id.
    pub event_id: u32,
    pub time_us: u64,
    /// Time since the previous event emitted for this barrier; zero for the
    /// first one of a trigger.
    pub dt_us: u64,
    pub pos: Pos,
    /// The attempted motion delta, before clamping.
    pub delta: Pos,
    /// True while the barrier holds the sticky pointer trap.
    pub grabbed: bool,
    /// True when the barrier was released programmatically rather than by
    /// the pointer leaving.
    pub released: bool,
}

#[derive(Debug, Clone)]
pub enum BarrierSignal {
    Hit(BarrierEvent),
    Left(BarrierEvent),
}

#[derive(Debug)]
struct Barrier {
    def: BarrierDef,
    state: State,
    trigger_serial: u32,
    last_event_us: Option<u64>,
    released_by_call: bool,
    /// Directions that would cross back over the line while this barrier
    /// traps the pointer.
    trap_return: BarrierDirections,
    last_pos: Pos,
    last_delta: Pos,
}

/// All barriers of one seat plus the single optional pointer trap.
#[derive(Debug, Default)]
pub struct BarrierManager {
    barriers: BTreeMap<BarrierId, Barrier>,
    trap: Option<BarrierId>,
    next_id: u32,
    next_serial: u32,
}

impl BarrierManager {
    /// Register a barrier. Only horizontal or vertical segments are valid.
    pub fn add(&mut self, def: BarrierDef) -> Result<BarrierId, InputError> {
        if def.x1 != def.x2 && def.y1 != def.y2 {
            return Err(InputError::InvalidBarrier {
                x1: def.x1,
                y1: def.y1,
                x2: def.x2,
                y2: def.y2,
            });
        }
        self.next_id += 1;
        let id = BarrierId(self.next_id);
        debug!(barrier = %id, ?def, "barrier added");
        self.barriers.insert(
            id,
            Barrier {
                def,
                state: State::Active,
                trigger_serial: 0,
                last_event_us: None,
                released_by_call: false,
                trap_return: BarrierDirections::empty(),
                last_pos: Pos::default(),
                last_delta: Pos::default(),
            },
        );
        Ok(id)
    }

    /// Unregister a barrier. If it was not in its rest state, a final "left"
    /// signal is returned so the consumer observes the teardown; any pointer
    /// trap it held is dropped.
    pub fn remove(&mut self, id: BarrierId, time_us: u64) -> Option<BarrierSignal> {
        let mut barrier = self.barriers.remove(&id)?;
        if self.trap == Some(id) {
            self.trap = None;
        }
        if barrier.state != State::Active {
            barrier.released_by_call = true;
            let event = Self::event_for(&mut barrier, id, time_us, false);
            return Some(BarrierSignal::Left(event));
        }
        None
    }

    /// Programmatic release of a held barrier. A stale `event_id` (not the
    /// serial recorded at hit time) is silently ignored, so a delayed call
    /// cannot affect a barrier that has been re-triggered since.
    pub fn release(&mut self, id: BarrierId, event_id: u32) {
        let Some(barrier) = self.barriers.get_mut(&id) else {
            return;
        };
        if barrier.state != State::Held || barrier.trigger_serial != event_id {
            trace!(barrier = %id, event_id, "ignoring stale barrier release");
            return;
        }
        debug!(barrier = %id, event_id, "barrier released");
        barrier.state = State::Release;
        barrier.released_by_call = true;
    }

    pub fn is_trapped(&self) -> bool {
        self.trap.is_some()
    }

    pub fn len(&self) -> usize {
        self.barriers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.barriers.is_empty()
    }

    /// Clamp a proposed motion `prev -> next` against every barrier that
    /// blocks it, returning the corrected destination and the signals to
    /// forward.
    pub fn clamp_motion(
        &mut self,
        prev: Pos,
        next: Pos,
        time_us: u64,
    ) -> (Pos, Vec<BarrierSignal>) {
        let attempted_delta = Pos::new(next.x - prev.x, next.y - prev.y);
        let mut clamped = next;
        let mut mask = motion_directions(prev, clamped);

        while !mask.is_empty() {
            let Some((id, hit_pos, consumed)) = self.closest_blocking(prev, clamped, mask) else {
                break;
            };
            let is_trap = self.trap == Some(id);
            let barrier = self.barriers.get_mut(&id).unwrap();
            if barrier.state == State::Active {
                self.next_serial = self.next_serial.wrapping_add(1).max(1);
                barrier.trigger_serial = self.next_serial;
                barrier.last_event_us = None;
            }
            barrier.state = State::Hit;
            // a hit reports the motion component beyond the line, not the
            // whole attempted delta
            barrier.last_delta = Pos::new(clamped.x - hit_pos.x, clamped.y - hit_pos.y);

            if barrier.def.sticky && !is_trap {
                // The pointer passes through and is captured behind the
                // line until released.
                barrier.trap_return = consumed.opposite();
                barrier.last_pos = clamped;
                self.trap = Some(id);
                break;
            }

            if consumed.intersects(BarrierDirections::X_AXIS) {
                clamped.x = hit_pos.x;
            } else {
                clamped.y = hit_pos.y;
            }
            barrier.last_pos = clamped;
            mask &= !consumed;
        }

        // Held barriers are released when the destination leaves the
        // segment or strays past the 2 px hit-box that absorbs hand tremor.
        for (id, barrier) in self.barriers.iter_mut() {
            if barrier.state != State::Held || self.trap == Some(*id) {
                continue;
            }
            if !Self::within_hold_box(&barrier.def, clamped) {
                barrier.state = State::Left;
                barrier.last_pos = clamped;
                barrier.last_delta = attempted_delta;
            }
        }

        let mut signals = Vec::new();
        for (id, barrier) in self.barriers.iter_mut() {
            match barrier.state {
                State::Active | State::Held => {}
                State::Hit => {
                    let grabbed = self.trap == Some(*id);
                    let event = Self::event_for(barrier, *id, time_us, grabbed);
                    barrier.state = State::Held;
                    signals.push(BarrierSignal::Hit(event));
                }
                State::Release | State::Left => {
                    if self.trap == Some(*id) {
                        self.trap = None;
                    }
                    let event = Self::event_for(barrier, *id, time_us, false);
                    barrier.state = State::Active;
                    barrier.released_by_call = false;
                    signals.push(BarrierSignal::Left(event));
                }
            }
        }

        (clamped, signals)
    }

    fn event_for(barrier: &mut Barrier, id: BarrierId, time_us: u64, grabbed: bool) -> BarrierEvent {
        let dt_us = barrier
            .last_event_us
            .map(|last| time_us.saturating_sub(last))
            .unwrap_or(0);
        barrier.last_event_us = Some(time_us);
        BarrierEvent {
            barrier: id,
            event_id: barrier.trigger_serial,
            time_us,
            dt_us,
            pos: barrier.last_pos,
            delta: barrier.last_delta,
            grabbed,
            released: barrier.released_by_call,
        }
    }

    /// Among barriers blocking one of the remaining directions and not in
    /// the release state, the one whose intersection with the motion is
    /// closest to `prev`.
    fn closest_blocking(
        &self,
        prev: Pos,
        next: Pos,
        mask: BarrierDirections,
    ) -> Option<(BarrierId, Pos, BarrierDirections)> {
        let mut best: Option<(BarrierId, Pos, BarrierDirections, f64)> = None;
        for (id, barrier) in self.barriers.iter() {
            if barrier.state == State::Release || barrier.state == State::Left {
                continue;
            }
            let blockable = if self.trap == Some(*id) {
                barrier.trap_return
            } else {
                barrier.def.blockable()
            };
            let consumed = blockable & mask;
            if consumed.is_empty() {
                continue;
            }
            let Some(hit) = Self::intersect(&barrier.def, prev, next, consumed) else {
                continue;
            };
            let dist2 = (hit.x - prev.x).powi(2) + (hit.y - prev.y).powi(2);
            let better = best.map(|(_, _, _, d)| dist2 < d).unwrap_or(true);
            if better {
                best = Some((*id, hit, consumed, dist2));
            }
        }
        best.map(|(id, hit, consumed, _)| (id, hit, consumed))
    }

    /// Intersection of the motion segment with the barrier's line, provided
    /// the motion actually crosses it in a blocked direction and the
    /// crossing point lies on the finite segment.
    fn intersect(
        def: &BarrierDef,
        prev: Pos,
        next: Pos,
        dirs: BarrierDirections,
    ) -> Option<Pos> {
        if def.is_vertical() {
            let bx = def.x1;
            let crossing = (dirs.contains(BarrierDirections::POSITIVE_X)
                && prev.x <= bx
                && next.x > bx)
                || (dirs.contains(BarrierDirections::NEGATIVE_X) && prev.x >= bx && next.x < bx);
            if !crossing {
                return None;
            }
            let t = (bx - prev.x) / (next.x - prev.x);
            let y = prev.y + t * (next.y - prev.y);
            let (y_min, y_max) = (def.y1.min(def.y2), def.y1.max(def.y2));
            (y_min..=y_max).contains(&y).then_some(Pos::new(bx, y))
        } else {
            let by = def.y1;
            let crossing = (dirs.contains(BarrierDirections::POSITIVE_Y)
                && prev.y <= by
                && next.y > by)
                || (dirs.contains(BarrierDirections::NEGATIVE_Y) && prev.y >= by && next.y < by);
            if !crossing {
                return None;
            }
            let t = (by - prev.y) / (next.y - prev.y);
            let x = prev.x + t * (next.x - prev.x);
            let (x_min, x_max) = (def.x1.min(def.x2), def.x1.max(def.x2));
            (x_min..=x_max).contains(&x).then_some(Pos::new(x, by))
        }
    }

    const HOLD_BOX: f64 = 2.0;

    fn within_hold_box(def: &BarrierDef, pos: Pos) -> bool {
        let blocked = def.blockable();
        if def.is_vertical() {
            let (y_min, y_max) = (def.y1.min(def.y2), def.y1.max(def.y2));
            if !(y_min..=y_max).contains(&pos.y) {
                return false;
            }
            let offset = pos.x - def.x1;
            let low = if blocked.contains(BarrierDirections::POSITIVE_X) {
                -Self::HOLD_BOX
            } else {
                0.0
            };
            let high = if blocked.contains(BarrierDirections::NEGATIVE_X) {
                Self::HOLD_BOX
            } else {
                0.0
            };
            (low..=high).contains(&offset)
        } else {
            let (x_min, x_max) = (def.x1.min(def.x2), def.x1.max(def.x2));
            if !(x_min..=x_max).contains(&pos.x) {
                return false;
            }
            let offset = pos.y - def.y1;
            let low = if blocked.contains(BarrierDirections::POSITIVE_Y) {
                -Self::HOLD_BOX
            } else {
                0.0
            };
            let high = if blocked.contains(BarrierDirections::NEGATIVE_Y) {
                Self::HOLD_BOX
            } else {
                0.0
            };
            (low..=high).contains(&offset)
        }
    }
}
