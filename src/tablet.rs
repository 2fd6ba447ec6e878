//! Tablet tool identities, pressure calibration, and the process-wide tool
//! cache.
//!
//! A [`Tool`] is created lazily the first time a stylus serial comes into
//! proximity and lives for the rest of the process, so repeated proximity
//! events of the same physical pen share one calibration. The cache is the
//! one piece of tablet state shared across threads: the compositor edits
//! curves and button maps while the input thread resolves pressure values.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::event::ToolDescriptor;

const PRESSURE_LUT_LEN: usize = 256;

/// Two control points of a cubic Bezier from (0,0) to (1,1), both with
/// coordinates in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PressureCurve {
    pub p1: (f64, f64),
    pub p2: (f64, f64),
}

impl Default for PressureCurve {
    fn default() -> Self {
        // linear
        Self {
            p1: (0.0, 0.0),
            p2: (1.0, 1.0),
        }
    }
}

impl PressureCurve {
    fn coord(t: f64, c1: f64, c2: f64) -> f64 {
        let u = 1.0 - t;
        3.0 * u * u * t * c1 + 3.0 * u * t * t * c2 + t * t * t
    }

    /// Sample the curve into a lookup table indexed by raw pressure.
    /// `x(t)` is monotonic for control x in `[0, 1]`, so each entry is found
    /// by bisecting `t`.
    fn sample(&self) -> Vec<f64> {
        let (x1, y1) = self.p1;
        let (x2, y2) = self.p2;
        (0..PRESSURE_LUT_LEN)
            .map(|i| {
                let x = i as f64 / (PRESSURE_LUT_LEN - 1) as f64;
                let (mut lo, mut hi) = (0.0f64, 1.0f64);
                for _ in 0..32 {
                    let mid = (lo + hi) / 2.0;
                    if Self::coord(mid, x1, x2) < x {
                        lo = mid;
                    } else {
                        hi = mid;
                    }
                }
                Self::coord((lo + hi) / 2.0, y1, y2).clamp(0.0, 1.0)
            })
            .collect()
    }
}

#[derive(Debug)]
struct ToolInner {
    curve: PressureCurve,
    lut: Vec<f64>,
    button_map: HashMap<u32, u32>,
}

/// A tablet stylus identity with its calibration.
#[derive(Debug)]
pub struct Tool {
    pub descriptor: ToolDescriptor,
    inner: Mutex<ToolInner>,
}

impl Tool {
    fn new(descriptor: ToolDescriptor) -> Self {
        let curve = PressureCurve::default();
        Self {
            descriptor,
            inner: Mutex::new(ToolInner {
                lut: curve.sample(),
                curve,
                button_map: HashMap::new(),
            }),
        }
    }

    /// Map a raw pressure reading in `[0, 1]` through the calibration curve.
    pub fn pressure(&self, raw: f64) -> f64 {
        let inner = self.inner.lock().unwrap();
        let idx = (raw.clamp(0.0, 1.0) * (PRESSURE_LUT_LEN - 1) as f64).round() as usize;
        inner.lut[idx]
    }

    pub fn set_pressure_curve(&self, curve: PressureCurve) {
        let mut inner = self.inner.lock().unwrap();
        inner.lut = curve.sample();
        inner.curve = curve;
    }

    pub fn pressure_curve(&self) -> PressureCurve {
        self.inner.lock().unwrap().curve
    }

    /// Resolve a tool button through the remap table.
    pub fn map_button(&self, button: u32) -> u32 {
        self.inner
            .lock()
            .unwrap()
            .button_map
            .get(&button)
            .copied()
            .unwrap_or(button)
    }

    pub fn remap_button(&self, from: u32, to: u32) {
        self.inner.lock().unwrap().button_map.insert(from, to);
    }

    pub fn clear_button_map(&self) {
        self.inner.lock().unwrap().button_map.clear();
    }
}

/// Process-lifetime cache of tools keyed by (serial, type).
#[derive(Debug, Clone, Default)]
pub struct ToolCache {
    tools: Arc<Mutex<HashMap<ToolDescriptor, Arc<Tool>>>>,
}

impl ToolCache {
    /// Look up a tool, creating it on first sight of this serial.
    pub fn obtain(&self, descriptor: ToolDescriptor) -> Arc<Tool> {
        let mut tools = self.tools.lock().unwrap();
        tools
            .entry(descriptor)
            .or_insert_with(|| {
                debug!(serial = descriptor.serial, kind = ?descriptor.kind, "caching new tablet tool");
                Arc::new(Tool::new(descriptor))
            })
            .clone()
    }

    pub fn get(&self, descriptor: ToolDescriptor) -> Option<Arc<Tool>> {
        self.tools.lock().unwrap().get(&descriptor).cloned()
    }

    pub fn len(&self) -> usize {
        self.tools.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.lock().unwrap().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::ToolKind;

    fn pen(serial: u64) -> ToolDescriptor {
        ToolDescriptor {
            serial,
            kind: ToolKind::Pen,
        }
    }

    #[test]
    fn linear_curve_is_identity() {
        let tool = Tool::new(pen(1));
        for raw in [0.0, 0.25, 0.5, 0.75, 1.0] {
            assert!((tool.pressure(raw) - raw).abs() < 1e-2);
        }
    }

    #[test]
    fn curve_endpoints_and_monotonicity() {
        let curve = PressureCurve {
            p1: (0.8, 0.0),
            p2: (1.0, 0.4),
        };
        let lut = curve.sample();
        assert!(lut[0] < 1e-6);
        assert!((lut[PRESSURE_LUT_LEN - 1] - 1.0).abs() < 1e-6);
        for pair in lut.windows(2) {
            assert!(pair[1] >= pair[0] - 1e-9);
        }
        // a soft curve maps mid pressure below linear
        assert!(lut[PRESSURE_LUT_LEN / 2] < 0.5);
    }

    #[test]
    fn cache_shares_tools_by_serial() {
        let cache = ToolCache::default();
        let a = cache.obtain(pen(42));
        let b = cache.obtain(pen(42));
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.len(), 1);

        a.set_pressure_curve(PressureCurve {
            p1: (0.5, 0.0),
            p2: (1.0, 0.5),
        });
        // the edit is visible through the other handle
        assert_eq!(b.pressure_curve().p1, (0.5, 0.0));
    }

    #[test]
    fn button_remap() {
        let tool = Tool::new(pen(7));
        assert_eq!(tool.map_button(0x14b), 0x14b);
        tool.remap_button(0x14b, 0x14c);
        assert_eq!(tool.map_button(0x14b), 0x14c);
        tool.clear_button_map();
        assert_eq!(tool.map_button(0x14b), 0x14b);
    }
}
