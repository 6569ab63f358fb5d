//! Per-frame categorization and localization.

use std::sync::Arc;

use tracing::{debug, trace};

use super::{EventSink, Job, Outcome, WorkerEvent, WorkerKind};
use crate::config::RecognitionParams;
use crate::error::{Precondition, VisionError};
use crate::geometry::Quad;
use crate::model::{Category, CategorySet, ClassifierModel, DetectionResult};
use crate::vision::{DMatch, FeatureBackend, FeatureSet, Image};

/// Lowe's ratio test over k=2 nearest-neighbour lists.
///
/// A match survives when its distance is below `ratio` times the distance
/// of the runner-up. Lists with fewer than two neighbours are rejected.
pub fn ratio_test(matches: &[Vec<DMatch>], ratio: f32) -> Vec<DMatch> {
    matches
        .iter()
        .filter_map(|m| match m.as_slice() {
            [best, second, ..] if best.distance < ratio * second.distance => Some(*best),
            _ => None,
        })
        .collect()
}

pub struct CategorizerJob<B> {
    backend: Arc<B>,
    frame_id: u64,
    frame: Image,
    classifiers: Arc<ClassifierModel>,
    categories: Arc<CategorySet>,
    params: RecognitionParams,
}

impl<B: FeatureBackend> CategorizerJob<B> {
    pub fn new(
        backend: Arc<B>,
        frame_id: u64,
        frame: Image,
        classifiers: Arc<ClassifierModel>,
        categories: Arc<CategorySet>,
        params: RecognitionParams,
    ) -> Self {
        Self {
            backend,
            frame_id,
            frame,
            classifiers,
            categories,
            params,
        }
    }

    /// Categories whose classifier puts the frame in the positive class.
    fn candidates(&self, frame: &FeatureSet, sink: &EventSink) -> Result<Vec<Arc<Category>>, VisionError> {
        let Some(vocabulary) = self.classifiers.vocabulary.as_ref() else {
            return Ok(Vec::new());
        };
        let bow = vocabulary.bag_of_words(&frame.descriptors)?;
        let mut candidates = Vec::new();
        for (name, classifier) in self.classifiers.usable() {
            let Some(category) = self.categories.get(name) else {
                continue;
            };
            match classifier.decision(&bow) {
                Ok(decision) if decision < self.params.decision_threshold => {
                    trace!(category = name, decision, "Candidate");
                    candidates.push(Arc::clone(category));
                }
                Ok(_) => {}
                Err(e) => sink.message(format!("{name}: {e}")),
            }
        }
        Ok(candidates)
    }

    /// Outline of `category` in frame coordinates, if it can be placed.
    fn localize(&self, category: &Category, frame: &FeatureSet) -> Result<Option<Quad>, VisionError> {
        let reference = &category.features;
        if reference.is_empty() {
            return Ok(None);
        }
        let matches = self.backend.knn_match(&reference.descriptors, &frame.descriptors, 2)?;
        let good = ratio_test(&matches, self.params.match_ratio);
        debug!(category = %category.name, matches = good.len(), "Ratio test");
        if good.len() < self.params.min_matches {
            return Ok(None);
        }

        let mut src = Vec::with_capacity(good.len());
        let mut dst = Vec::with_capacity(good.len());
        for m in &good {
            match (reference.keypoints.get(m.query_idx), frame.keypoints.get(m.train_idx)) {
                (Some(a), Some(b)) => {
                    src.push(a.pt);
                    dst.push(b.pt);
                }
                _ => {
                    return Err(VisionError::Matching(format!(
                        "match {} -> {} has no keypoint",
                        m.query_idx, m.train_idx
                    )))
                }
            }
        }
        let homography = self.backend.find_homography(&src, &dst)?;
        Ok(category.outline().project(&homography))
    }

    fn detect(&self, sink: &EventSink) -> Result<DetectionResult, VisionError> {
        let mut result = DetectionResult::empty(self.frame_id);
        let frame = self.backend.detect_and_compute(&self.frame)?;
        if frame.is_empty() {
            return Ok(result);
        }
        for category in self.candidates(&frame, sink)? {
            match self.localize(&category, &frame) {
                Ok(Some(quad)) => {
                    result.objects.insert(category.name.clone(), quad);
                }
                Ok(None) => {}
                Err(e) => sink.message(format!("{}: {e}", category.name)),
            }
        }
        Ok(result)
    }
}

impl<B: FeatureBackend + 'static> Job for CategorizerJob<B> {
    const KIND: WorkerKind = WorkerKind::Categorizer;

    fn run(self, sink: &EventSink) -> Outcome {
        if self.categories.is_empty() || !self.classifiers.is_ready() {
            sink.message(Precondition::NoRecognitionData.to_string());
            sink.deliver(WorkerEvent::Detections(DetectionResult::empty(self.frame_id)));
            return Outcome::Failed(Precondition::NoRecognitionData.to_string());
        }
        let (result, outcome) = match self.detect(sink) {
            Ok(result) => (result, Outcome::Completed),
            Err(e) => {
                sink.message(e.to_string());
                (DetectionResult::empty(self.frame_id), Outcome::Failed(e.to_string()))
            }
        };
        debug!(frame = self.frame_id, detections = result.objects.len(), "Categorized frame");
        sink.deliver(WorkerEvent::Detections(result));
        outcome
    }
}
