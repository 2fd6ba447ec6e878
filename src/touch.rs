//! Per-seat touch slot tracking.
//!
//! Device-local slots are renumbered into seat-wide slots so that several
//! touchscreens can coexist on one seat. A seat slot is unique while the
//! contact is live and freed on up/cancel.

use std::collections::HashMap;

use tracing::warn;

use crate::device::DeviceId;
use crate::event::Pos;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TouchState {
    pub device: DeviceId,
    pub device_slot: u32,
    pub seat_slot: u32,
    pub pos: Pos,
}

#[derive(Debug, Default)]
pub struct TouchTable {
    // keyed by seat slot; unique at any instant
    contacts: HashMap<u32, TouchState>,
}

impl TouchTable {
    /// Track a new contact, allocating the lowest free seat slot. A down on
    /// a slot that is already tracked is a protocol violation from the
    /// device; it is dropped rather than double-tracked.
    pub fn down(&mut self, device: DeviceId, device_slot: u32, pos: Pos) -> Option<u32> {
        if self.lookup(device, device_slot).is_some() {
            warn!(device = %device, device_slot, "touch-down on an already tracked slot, dropping");
            return None;
        }
        let seat_slot = (0..).find(|s| !self.contacts.contains_key(s))?;
        self.contacts.insert(
            seat_slot,
            TouchState {
                device,
                device_slot,
                seat_slot,
                pos,
            },
        );
        Some(seat_slot)
    }

    /// Update a live contact, returning its seat slot.
    pub fn motion(&mut self, device: DeviceId, device_slot: u32, pos: Pos) -> Option<u32> {
        let state = self
            .contacts
            .values_mut()
            .find(|c| c.device == device && c.device_slot == device_slot)?;
        state.pos = pos;
        Some(state.seat_slot)
    }

    /// Drop a contact, returning the freed seat slot.
    pub fn up(&mut self, device: DeviceId, device_slot: u32) -> Option<u32> {
        let seat_slot = self.lookup(device, device_slot)?.seat_slot;
        self.contacts.remove(&seat_slot);
        Some(seat_slot)
    }

    pub fn lookup(&self, device: DeviceId, device_slot: u32) -> Option<&TouchState> {
        self.contacts
            .values()
            .find(|c| c.device == device && c.device_slot == device_slot)
    }

    pub fn get(&self, seat_slot: u32) -> Option<&TouchState> {
        self.contacts.get(&seat_slot)
    }

    /// Drop every contact of one device (device removal or touch-cancel),
    /// returning the freed seat slots.
    pub fn cancel_device(&mut self, device: DeviceId) -> Vec<u32> {
        let mut slots: Vec<u32> = self
            .contacts
            .values()
            .filter(|c| c.device == device)
            .map(|c| c.seat_slot)
            .collect();
        slots.sort_unstable();
        for slot in &slots {
            self.contacts.remove(slot);
        }
        slots
    }

    pub fn iter(&self) -> impl Iterator<Item = &TouchState> {
        self.contacts.values()
    }

    pub fn len(&self) -> usize {
        self.contacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contacts.is_empty()
    }

    /// Positions keyed by seat slot, for the shared snapshot readable from
    /// the main thread.
    pub fn snapshot(&self) -> HashMap<u32, Pos> {
        self.contacts.values().map(|c| (c.seat_slot, c.pos)).collect()
    }
}
