//! Per-frame detections and distance readouts.

use std::collections::BTreeMap;
use std::fmt;

use crate::geometry::Quad;

/// What the categorizer found in one frame, keyed by category name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectionResult {
    pub frame_id: u64,
    pub objects: BTreeMap<String, Quad>,
}

impl DetectionResult {
    pub fn empty(frame_id: u64) -> Self {
        Self {
            frame_id,
            objects: BTreeMap::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn get(&self, category: &str) -> Option<&Quad> {
        self.objects.get(category)
    }

    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.objects.keys().map(String::as_str)
    }

    /// Drop detections whose category is not accepted by `known`.
    pub fn retain_known(&mut self, known: impl Fn(&str) -> bool) {
        self.objects.retain(|name, _| known(name));
    }
}

/// Mean depth of one detected object, in calibration units (the chessboard
/// square side length unit, millimetres by convention).
#[derive(Debug, Clone, PartialEq)]
pub struct DistanceMeasurement {
    pub category: String,
    pub depth: f64,
}

impl DistanceMeasurement {
    pub fn centimeters(&self) -> f64 {
        self.depth / 10.0
    }
}

impl fmt::Display for DistanceMeasurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {:.1} cm", self.category, self.centimeters())
    }
}
