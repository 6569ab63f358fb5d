//! One-shot distance estimation for a detected object.

use std::sync::Arc;

use tracing::debug;

use super::{EventSink, Job, Outcome, WorkerEvent, WorkerKind};
use crate::config::SgbmParams;
use crate::error::{Precondition, VisionError};
use crate::geometry::{reproject_to_3d, Quad};
use crate::model::{CalibrationModel, DistanceMeasurement, RectificationView};
use crate::vision::{Image, StereoBackend};

pub struct DisparityJob<B> {
    backend: Arc<B>,
    left: Image,
    right: Image,
    calibration: Arc<CalibrationModel>,
    category: String,
    outline: Quad,
    params: SgbmParams,
}

impl<B: StereoBackend> DisparityJob<B> {
    pub fn new(
        backend: Arc<B>,
        left: Image,
        right: Image,
        calibration: Arc<CalibrationModel>,
        category: impl Into<String>,
        outline: Quad,
        params: SgbmParams,
    ) -> Self {
        Self {
            backend,
            left,
            right,
            calibration,
            category: category.into(),
            outline,
            params,
        }
    }

    /// Mean depth inside the detection's bounding box.
    ///
    /// Unlike a plain mean over the crop, pixels at [`MISSING_DEPTH`](crate::geometry::MISSING_DEPTH) are left
    /// out, so unmatched regions do not inflate the readout.
    fn measure(&self, view: &RectificationView<'_>) -> Result<f64, VisionError> {
        let left = self.backend.remap(&self.left, &view.left_maps())?;
        let right = self.backend.remap(&self.right, &view.right_maps())?;
        let disparity = self.backend.compute_disparity(&left, &right, &self.params)?;
        let cloud = reproject_to_3d(disparity.size(), &disparity.to_pixels(), view.q, true)?;

        let bbox = self.outline.bounding_box();
        debug!(category = %self.category, ?bbox, "Measuring depth");
        cloud
            .mean_depth(&bbox)
            .ok_or_else(|| VisionError::Stereo(format!("no valid depth inside {}", self.category)))
    }
}

impl<B: StereoBackend + 'static> Job for DisparityJob<B> {
    const KIND: WorkerKind = WorkerKind::Disparity;

    fn run(self, sink: &EventSink) -> Outcome {
        let mut missing = Vec::new();
        if self.left.is_empty() {
            missing.push("left frame");
        }
        if self.right.is_empty() {
            missing.push("right frame");
        }
        if !missing.is_empty() {
            let refusal = Precondition::NoCalibrationData { missing };
            sink.message(refusal.to_string());
            return Outcome::Failed(refusal.to_string());
        }
        let view = match self.calibration.rectification() {
            Ok(view) => view,
            Err(refusal) => {
                sink.message(refusal.to_string());
                return Outcome::Failed(refusal.to_string());
            }
        };
        match self.measure(&view) {
            Ok(depth) => {
                let measurement = DistanceMeasurement {
                    category: self.category.clone(),
                    depth,
                };
                debug!(%measurement, "Measured distance");
                sink.deliver(WorkerEvent::Distance(measurement));
                Outcome::Completed
            }
            Err(e) => {
                sink.message(e.to_string());
                Outcome::Failed(e.to_string())
            }
        }
    }
}
