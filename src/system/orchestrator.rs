//! Orchestrator - owns the model stores and drives the workers.
//!
//! The orchestrator lives on the control thread. It never runs vision code
//! itself: every computation is handed to a job on its own thread together
//! with the snapshots valid at dispatch time, and results come back as
//! [`WorkerEvent`]s that [`Orchestrator::pump`] merges into the stores and
//! the [`LiveView`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::view::LiveView;
use crate::config::SordeConfig;
use crate::error::{PersistError, Precondition};
use crate::io::StereoFrame;
use crate::model::{CalibrationModel, Category, CategorySet, ClassifierModel, SnapshotStore};
use crate::persist;
use crate::persist::calibration::STEREO_FILE;
use crate::persist::dictionary::VOCABULARY_FILE;
use crate::vision::{Image, PatternSize, VisionBackend};
use crate::workers::{
    self, CalibrationJob, CancelToken, CategorizerJob, DictionaryJob, DisparityJob, Job, Outcome,
    WorkerContext, WorkerEvent, WorkerHandle, WorkerKind,
};

/// How often [`Orchestrator::wait_idle`] re-checks worker handles.
const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Counters for monitoring the control loop.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct OrchestratorStats {
    /// Frames passed to [`Orchestrator::on_frame`].
    pub frames_received: usize,
    /// Frames handed to a categorizer.
    pub frames_dispatched: usize,
    /// Frames dropped because the previous categorization was still running.
    pub frames_skipped: usize,
    /// Frames not categorized because no vocabulary, classifier or template is loaded.
    pub frames_unready: usize,
    /// Detection results merged into the overlay.
    pub results_applied: usize,
    /// Distance requests that started a disparity job.
    pub distance_requests: usize,
    /// Calibration models swapped in (from a worker or from disk).
    pub calibration_swaps: usize,
    /// Vocabulary and classifier bundles swapped in.
    pub dictionary_swaps: usize,
    /// Jobs that ended with [`Outcome::Failed`].
    pub jobs_failed: usize,
}

/// Owns the model stores and all worker threads.
pub struct Orchestrator<B: VisionBackend> {
    backend: Arc<B>,
    config: SordeConfig,

    calibration: SnapshotStore<CalibrationModel>,
    classifiers: SnapshotStore<ClassifierModel>,
    categories: SnapshotStore<CategorySet>,

    sender: Sender<WorkerEvent>,
    events: Receiver<WorkerEvent>,

    /// Per kind, indexed by [`WorkerKind::index`].
    cancel: [CancelToken; 4],
    locks: [Arc<Mutex<()>>; 4],
    handles: [Option<WorkerHandle>; 4],

    current_frame: Option<StereoFrame>,
    /// Set once the missing recognition data has been reported, cleared on the next dispatch.
    unready_reported: bool,
    view: LiveView,
    stats: OrchestratorStats,
}

impl<B: VisionBackend> Orchestrator<B> {
    /// Create an orchestrator with empty stores; nothing is loaded from disk yet.
    pub fn new(backend: Arc<B>, config: SordeConfig) -> Self {
        let (sender, events) = unbounded();
        Self {
            backend,
            config,
            calibration: SnapshotStore::default(),
            classifiers: SnapshotStore::default(),
            categories: SnapshotStore::default(),
            sender,
            events,
            cancel: Default::default(),
            locks: Default::default(),
            handles: Default::default(),
            current_frame: None,
            unready_reported: false,
            view: LiveView::new(),
            stats: OrchestratorStats::default(),
        }
    }

    pub fn config(&self) -> &SordeConfig {
        &self.config
    }

    pub fn view(&self) -> &LiveView {
        &self.view
    }

    pub fn stats(&self) -> OrchestratorStats {
        self.stats.clone()
    }

    pub fn current_frame(&self) -> Option<&StereoFrame> {
        self.current_frame.as_ref()
    }

    pub fn calibration(&self) -> Arc<CalibrationModel> {
        self.calibration.snapshot()
    }

    pub fn classifiers(&self) -> Arc<ClassifierModel> {
        self.classifiers.snapshot()
    }

    pub fn categories(&self) -> Arc<CategorySet> {
        self.categories.snapshot()
    }

    /// True while a job of `kind` has not yet delivered its last event.
    pub fn is_busy(&self, kind: WorkerKind) -> bool {
        self.handles[kind.index()]
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    pub fn is_idle(&self) -> bool {
        WorkerKind::ALL.iter().all(|&kind| !self.is_busy(kind))
    }

    /// Accept a new frame and categorize it if the previous cycle is done.
    ///
    /// Returns whether the frame was dispatched. Frames arriving while a
    /// categorization runs are kept for display and distance requests only.
    pub fn on_frame(&mut self, frame: StereoFrame) -> bool {
        self.pump();
        self.stats.frames_received += 1;
        let frame_id = frame.frame_id;
        let left = frame.left.clone();
        self.current_frame = Some(frame);

        if self.is_busy(WorkerKind::Categorizer) {
            self.stats.frames_skipped += 1;
            debug!(frame_id, "Categorizer busy, skipping frame");
            return false;
        }
        let classifiers = self.classifiers.snapshot();
        let categories = self.categories.snapshot();
        if categories.is_empty() || !classifiers.is_ready() {
            self.stats.frames_unready += 1;
            if !self.unready_reported {
                self.unready_reported = true;
                self.status(Precondition::NoRecognitionData.to_string());
            }
            return false;
        }
        self.unready_reported = false;

        let job = CategorizerJob::new(
            Arc::clone(&self.backend),
            frame_id,
            left,
            classifiers,
            categories,
            self.config.recognition.clone(),
        );
        match self.dispatch(job) {
            Ok(()) => {
                self.stats.frames_dispatched += 1;
                true
            }
            Err(refusal) => {
                self.refuse(refusal);
                false
            }
        }
    }

    /// Merge every pending worker event; returns how many were handled.
    pub fn pump(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.events.try_recv() {
            self.handle_event(event);
            handled += 1;
        }
        handled
    }

    /// Block until every worker has finished, merging events meanwhile.
    ///
    /// Returns false if `timeout` elapsed first.
    pub fn wait_idle(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.is_idle() {
                // Finished jobs have sent everything already.
                self.pump();
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                self.pump();
                return false;
            }
            match self.events.recv_timeout((deadline - now).min(IDLE_POLL_INTERVAL)) {
                Ok(event) => self.handle_event(event),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => return self.is_idle(),
            }
        }
    }

    /// Estimate the distance to a currently detected category.
    pub fn request_distance(&mut self, category: &str) -> Result<(), Precondition> {
        self.pump();
        let Some(outline) = self.view.overlay().get(category).copied() else {
            return Err(self.refuse(Precondition::NotDetected(category.to_string())));
        };
        let calibration = self.calibration.snapshot();
        if let Err(refusal) = calibration.rectification() {
            return Err(self.refuse(refusal));
        }
        if self.is_busy(WorkerKind::Disparity) {
            return Err(self.refuse(Precondition::WorkerBusy(WorkerKind::Disparity)));
        }
        let pair = self
            .current_frame
            .as_ref()
            .map(|f| (f.left.clone(), f.right.clone()));
        let Some((left, right)) = pair else {
            return Err(self.refuse(Precondition::NoFrame));
        };

        let job = DisparityJob::new(
            Arc::clone(&self.backend),
            left,
            right,
            calibration,
            category,
            outline,
            self.config.stereo.clone(),
        );
        self.dispatch(job).map_err(|refusal| self.refuse(refusal))?;
        self.stats.distance_requests += 1;
        info!(category, "Distance requested");
        Ok(())
    }

    /// Calibrate the stereo pair from the chessboard captures on disk.
    pub fn start_calibration(&mut self, pattern: PatternSize, square_size: f32) -> Result<(), Precondition> {
        if self.is_busy(WorkerKind::Calibration) {
            return Err(self.refuse(Precondition::WorkerBusy(WorkerKind::Calibration)));
        }
        let job = CalibrationJob::new(
            Arc::clone(&self.backend),
            self.config.paths.calib_data_dir.clone(),
            pattern,
            square_size,
        );
        self.dispatch(job).map_err(|refusal| self.refuse(refusal))
    }

    /// Rebuild the vocabulary with `clusters` centers and retrain every classifier.
    pub fn start_training(&mut self, clusters: usize) -> Result<(), Precondition> {
        if self.is_busy(WorkerKind::Dictionary) {
            return Err(self.refuse(Precondition::WorkerBusy(WorkerKind::Dictionary)));
        }
        let categories = self.categories.snapshot();
        if categories.is_empty() {
            return Err(self.refuse(Precondition::NoTemplates));
        }
        let job = DictionaryJob::new(
            Arc::clone(&self.backend),
            self.config.paths.svm_data_dir.clone(),
            categories,
            clusters,
            self.config.svm.clone(),
        );
        self.dispatch(job).map_err(|refusal| self.refuse(refusal))
    }

    /// Add or replace a category from a template image, then retrain.
    pub fn register_category(&mut self, name: &str, template: Image) -> Result<()> {
        let dir = self.config.paths.svm_data_dir.clone();
        let path = persist::save_template(&dir, name, &template, self.backend.as_ref())
            .with_context(|| format!("Failed to save template for {name}"))?;
        let features = self
            .backend
            .detect_and_compute(&template)
            .with_context(|| format!("Failed to compute features for {name}"))?;
        info!(category = name, path = %path.display(), keypoints = features.len(), "Registered category");

        let next = self.categories.snapshot().with(Category::new(name, template, features));
        self.categories.replace(next);
        self.start_training(self.config.recognition.vocabulary_size)?;
        Ok(())
    }

    /// Load the stereo calibration file; returns whether distance estimation is enabled.
    pub fn load_calibration(&mut self) -> Result<bool, PersistError> {
        let path = self.config.paths.calib_data_dir.join(STEREO_FILE);
        if !path.is_file() {
            self.status("could not find calibration file");
            return Ok(false);
        }
        let model = persist::calibration::load_model(&path)?;
        let complete = match model.rectification() {
            Ok(_) => {
                self.status("Loaded calibration data");
                true
            }
            Err(refusal) => {
                warn!(%refusal, path = %path.display(), "Incomplete calibration file");
                self.status(refusal.to_string());
                false
            }
        };
        self.calibration.replace(model);
        self.stats.calibration_swaps += 1;
        Ok(complete)
    }

    /// Load the vocabulary and every classifier file; returns whether
    /// categorization can run with them.
    pub fn load_dictionary(&mut self) -> Result<bool, PersistError> {
        let dir = self.config.paths.svm_data_dir.clone();
        if !dir.join(VOCABULARY_FILE).is_file() {
            self.status("could not find dictionary file");
            return Ok(false);
        }
        let loaded = persist::load_dictionary(&dir, self.backend.as_ref())?;
        for (path, reason) in &loaded.failures {
            self.message(format!("{}: {reason}", path.display()));
        }
        if loaded.model.entries.is_empty() {
            self.status("could not find SVM information");
        } else {
            self.status("Loaded dictionary");
        }
        let ready = loaded.model.is_ready();
        self.classifiers.replace(loaded.model);
        self.stats.dictionary_swaps += 1;
        Ok(ready)
    }

    /// Load and featurize every category template; returns how many loaded.
    pub fn load_templates(&mut self) -> Result<usize, PersistError> {
        let dir = self.config.paths.svm_data_dir.clone();
        if !dir.is_dir() {
            self.status(Precondition::NoTemplates.to_string());
            return Ok(0);
        }
        let loaded = persist::load_templates(&dir, self.backend.as_ref())?;
        for (name, reason) in &loaded.skipped {
            debug!(category = %name, %reason, "Template skipped");
        }
        let count = loaded.categories.len();
        if count == 0 {
            self.status(Precondition::NoTemplates.to_string());
        }
        self.categories.replace(loaded.categories);
        Ok(count)
    }

    /// Skip the next job of `kind` unless it has already started.
    pub fn stop(&self, kind: WorkerKind) {
        info!(worker = %kind, "Cancel requested");
        self.cancel[kind.index()].request();
    }

    /// Wait for all running jobs and merge what they delivered.
    pub fn shutdown(&mut self) {
        for slot in self.handles.iter_mut() {
            if let Some(handle) = slot.take() {
                debug!(worker = %handle.kind(), "Waiting for worker");
                handle.join();
            }
        }
        self.pump();
    }

    fn dispatch<J: Job>(&mut self, job: J) -> Result<(), Precondition> {
        let kind = J::KIND;
        let ctx = WorkerContext {
            sender: self.sender.clone(),
            cancel: self.cancel[kind.index()].clone(),
            run_lock: Arc::clone(&self.locks[kind.index()]),
            messages: self.config.messages.clone(),
        };
        let handle = workers::spawn(job, ctx).map_err(|e| Precondition::SpawnFailed {
            kind,
            reason: e.to_string(),
        })?;
        // Only finished handles are replaced here, so the join in their drop is immediate.
        self.handles[kind.index()] = Some(handle);
        Ok(())
    }

    fn handle_event(&mut self, event: WorkerEvent) {
        match event {
            WorkerEvent::Progress { kind, percent } => match kind {
                WorkerKind::Calibration | WorkerKind::Dictionary => self.view.set_progress(percent),
                _ => {}
            },
            WorkerEvent::Message { kind, text, timeout } => {
                info!(worker = %kind, "{text}");
                self.view.show_message(text, timeout, Instant::now());
            }
            WorkerEvent::Calibrated(model) => {
                let version = self.calibration.replace(*model);
                self.stats.calibration_swaps += 1;
                info!(version, "Calibration model swapped in");
            }
            WorkerEvent::DictionaryTrained(model) => {
                let version = self.classifiers.replace(*model);
                self.stats.dictionary_swaps += 1;
                info!(version, "Classifier model swapped in");
            }
            WorkerEvent::Detections(mut result) => {
                let categories = self.categories.snapshot();
                result.retain_known(|name| categories.contains(name));
                debug!(frame_id = result.frame_id, detected = result.objects.len(), "Detections");
                self.view.apply_detections(result);
                self.stats.results_applied += 1;
            }
            WorkerEvent::Distance(measurement) => {
                info!(%measurement, "Distance");
                self.view.set_distance(measurement);
            }
            WorkerEvent::Finished { kind, outcome } => {
                if let Outcome::Failed(reason) = &outcome {
                    self.stats.jobs_failed += 1;
                    debug!(worker = %kind, %reason, "Job failed");
                }
            }
        }
    }

    fn refuse(&mut self, refusal: Precondition) -> Precondition {
        warn!(%refusal, "Refused");
        self.message(refusal.to_string());
        refusal
    }

    fn message(&mut self, text: impl Into<String>) {
        let timeout = self.config.messages.transient();
        self.view.show_message(text, timeout, Instant::now());
    }

    fn status(&mut self, text: impl Into<String>) {
        let text = text.into();
        info!("{text}");
        let timeout = self.config.messages.status();
        self.view.show_message(text, timeout, Instant::now());
    }
}

impl<B: VisionBackend> Drop for Orchestrator<B> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::fs;

    use nalgebra::DMatrix;

    use super::*;
    use crate::model::{ClassifierEntry, Vocabulary};
    use crate::vision::fake::{labelled_image, one_hot_features, FakeClassifier, FakeVision};
    use crate::workers::disparity::tests::fake_calibration;

    const WAIT: Duration = Duration::from_secs(5);

    fn template_points() -> Vec<(f32, f32)> {
        (0..8).map(|i| (i as f32 * 5.0, i as f32 * 3.0 + (i % 2) as f32 * 7.0)).collect()
    }

    /// A backend where every frame labelled "frame" shows the Mug shifted by (10, 20).
    fn backend() -> Arc<FakeVision> {
        let backend = Arc::new(FakeVision::new());
        let ids: Vec<usize> = (0..8).collect();
        let shifted: Vec<_> = template_points().into_iter().map(|(x, y)| (x + 10.0, y + 20.0)).collect();
        backend.set_features("frame", one_hot_features(&ids, &shifted));
        backend
    }

    fn config(root: &std::path::Path) -> SordeConfig {
        let mut config = SordeConfig::default();
        config.paths.svm_data_dir = root.join("svm");
        config.paths.calib_data_dir = root.join("calib");
        config
    }

    fn ready(orchestrator: &mut Orchestrator<FakeVision>) {
        let ids: Vec<usize> = (0..8).collect();
        let mug = Category::new("Mug", labelled_image("mug template"), one_hot_features(&ids, &template_points()));
        orchestrator.categories.replace(CategorySet::from_categories([mug]));

        let vocabulary = Vocabulary::new(DMatrix::identity(8, 8) * 100.0);
        let tag = vocabulary.fingerprint();
        let mut entries = BTreeMap::new();
        entries.insert(
            "Mug".to_string(),
            ClassifierEntry::trained(Arc::new(FakeClassifier::new(-1.0)), tag, 10, 10),
        );
        orchestrator.classifiers.replace(ClassifierModel::new(vocabulary, entries));
    }

    fn frame(frame_id: u64) -> StereoFrame {
        StereoFrame {
            frame_id,
            timestamp_ns: frame_id * 50_000_000,
            left: labelled_image("frame"),
            right: labelled_image("frame right"),
        }
    }

    #[test]
    fn test_newer_frame_waits_for_running_categorization() {
        let dir = tempfile::tempdir().unwrap();
        let mut orchestrator = Orchestrator::new(backend(), config(dir.path()));
        ready(&mut orchestrator);

        let hold = Arc::clone(&orchestrator.locks[WorkerKind::Categorizer.index()]);
        let guard = hold.lock();
        assert!(orchestrator.on_frame(frame(1)));
        assert!(!orchestrator.on_frame(frame(2)));
        assert!(!orchestrator.on_frame(frame(3)));
        assert_eq!(orchestrator.current_frame().map(|f| f.frame_id), Some(3));
        assert_eq!(orchestrator.view().overlay().frame_id, 0);
        drop(guard);

        assert!(orchestrator.wait_idle(WAIT));
        assert_eq!(orchestrator.view().overlay().frame_id, 1);
        assert_eq!(orchestrator.view().detected_categories(), vec!["Mug"]);

        assert!(orchestrator.on_frame(frame(4)));
        assert!(orchestrator.wait_idle(WAIT));
        assert_eq!(orchestrator.view().overlay().frame_id, 4);

        let stats = orchestrator.stats();
        assert_eq!(stats.frames_received, 4);
        assert_eq!(stats.frames_dispatched, 2);
        assert_eq!(stats.frames_skipped, 2);
        assert_eq!(stats.results_applied, 2);
    }

    #[test]
    fn test_frames_are_not_categorized_without_models() {
        let dir = tempfile::tempdir().unwrap();
        let mut orchestrator = Orchestrator::new(backend(), config(dir.path()));
        assert!(!orchestrator.on_frame(frame(1)));
        assert_eq!(orchestrator.stats().frames_unready, 1);
        assert!(orchestrator.current_frame().is_some());

        let reported = orchestrator.view().last_status().cloned().expect("status message");
        assert_eq!(reported.text, Precondition::NoRecognitionData.to_string());

        // Reported once per unready stretch, not per frame.
        std::thread::sleep(Duration::from_millis(5));
        assert!(!orchestrator.on_frame(frame(2)));
        assert_eq!(orchestrator.stats().frames_unready, 2);
        assert_eq!(orchestrator.view().last_status(), Some(&reported));
    }

    #[test]
    fn test_failed_training_hides_progress() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path());
        config.recognition.vocabulary_size = 100_000;
        let mut orchestrator = Orchestrator::new(backend(), config);

        orchestrator.register_category("Mug", labelled_image("mug template")).unwrap();
        assert!(orchestrator.wait_idle(WAIT));
        assert_eq!(orchestrator.view().progress(), None);
        assert_eq!(orchestrator.stats().dictionary_swaps, 0);
        assert_eq!(orchestrator.stats().jobs_failed, 1);
    }

    #[test]
    fn test_detections_for_unknown_categories_are_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let mut orchestrator = Orchestrator::new(backend(), config(dir.path()));
        let mut result = crate::model::DetectionResult::empty(9);
        result
            .objects
            .insert("Ghost".into(), crate::geometry::Quad::from_size(crate::vision::ImageSize::new(4, 4)));
        orchestrator.sender.send(WorkerEvent::Detections(result)).unwrap();
        orchestrator.pump();
        assert_eq!(orchestrator.view().overlay().frame_id, 9);
        assert!(orchestrator.view().overlay().is_empty());
    }

    #[test]
    fn test_distance_refused_without_complete_calibration() {
        let dir = tempfile::tempdir().unwrap();
        let mut orchestrator = Orchestrator::new(backend(), config(dir.path()));
        assert_eq!(
            orchestrator.request_distance("Mug"),
            Err(Precondition::NotDetected("Mug".into()))
        );

        ready(&mut orchestrator);
        orchestrator.on_frame(frame(1));
        assert!(orchestrator.wait_idle(WAIT));
        assert!(orchestrator.view().can_request_distance());

        let mut partial = fake_calibration(&FakeVision::new());
        partial.map_r2 = None;
        orchestrator.calibration.replace(partial);
        let err = orchestrator.request_distance("Mug").unwrap_err();
        assert_eq!(err, Precondition::NoCalibrationData { missing: vec!["map_r2"] });
        assert_eq!(
            orchestrator.view().status_at(Instant::now()),
            Some("no calibration data (missing map_r2)")
        );
        assert!(orchestrator.handles[WorkerKind::Disparity.index()].is_none());
    }

    #[test]
    fn test_distance_flow() {
        let dir = tempfile::tempdir().unwrap();
        let backend = backend();
        let mut orchestrator = Orchestrator::new(Arc::clone(&backend), config(dir.path()));
        ready(&mut orchestrator);
        orchestrator.calibration.replace(fake_calibration(&backend));

        orchestrator.on_frame(frame(1));
        assert!(orchestrator.wait_idle(WAIT));
        orchestrator.request_distance("Mug").unwrap();
        assert!(orchestrator.wait_idle(WAIT));

        let distance = orchestrator.view().distance().expect("distance delivered");
        assert_eq!(distance.category, "Mug");
        assert!((distance.depth - 937.5).abs() < 1e-6);
        assert_eq!(orchestrator.stats().distance_requests, 1);

        // A frame with no detections clears the readout.
        orchestrator.on_frame(StereoFrame {
            left: labelled_image("blank"),
            ..frame(2)
        });
        assert!(orchestrator.wait_idle(WAIT));
        assert!(orchestrator.view().distance().is_none());
    }

    #[test]
    fn test_worker_results_swap_stores() {
        let dir = tempfile::tempdir().unwrap();
        let mut orchestrator = Orchestrator::new(backend(), config(dir.path()));
        let before = orchestrator.calibration();
        let model = fake_calibration(&FakeVision::new());

        orchestrator
            .sender
            .send(WorkerEvent::Progress {
                kind: WorkerKind::Calibration,
                percent: 90,
            })
            .unwrap();
        orchestrator.pump();
        assert_eq!(orchestrator.view().progress(), Some(90));

        orchestrator.sender.send(WorkerEvent::Calibrated(Box::new(model.clone()))).unwrap();
        orchestrator
            .sender
            .send(WorkerEvent::Progress {
                kind: WorkerKind::Calibration,
                percent: 100,
            })
            .unwrap();
        orchestrator.pump();

        assert!(!before.is_complete(), "earlier snapshot is untouched");
        assert_eq!(*orchestrator.calibration(), model);
        assert_eq!(orchestrator.view().progress(), None);
        assert_eq!(orchestrator.stats().calibration_swaps, 1);
    }

    #[test]
    fn test_register_category_persists_and_trains() {
        let dir = tempfile::tempdir().unwrap();
        let backend = backend();
        let mut config = config(dir.path());
        config.recognition.vocabulary_size = 8;
        let mut orchestrator = Orchestrator::new(Arc::clone(&backend), config);

        orchestrator.register_category("Mug", labelled_image("mug template")).unwrap();
        assert!(dir.path().join("svm/Mug/Mug.jpg").is_file());
        assert!(dir.path().join("svm/Mug/Training_Images").is_dir());
        assert!(orchestrator.categories().contains("Mug"));

        assert!(orchestrator.wait_idle(WAIT));
        assert_eq!(orchestrator.stats().dictionary_swaps, 1);
        let model = orchestrator.classifiers();
        assert_eq!(model.vocabulary.as_ref().map(|v| v.len()), Some(8));
        assert!(model.entries.contains_key("Mug"));
    }

    #[test]
    fn test_training_refused_without_templates() {
        let dir = tempfile::tempdir().unwrap();
        let mut orchestrator = Orchestrator::new(backend(), config(dir.path()));
        assert_eq!(orchestrator.start_training(50), Err(Precondition::NoTemplates));
        assert!(orchestrator.is_idle());
    }

    #[test]
    fn test_load_reports_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut orchestrator = Orchestrator::new(backend(), config(dir.path()));

        assert!(!orchestrator.load_calibration().unwrap());
        assert_eq!(
            orchestrator.view().last_status().map(|s| s.text.as_str()),
            Some("could not find calibration file")
        );
        assert!(!orchestrator.load_dictionary().unwrap());
        assert_eq!(
            orchestrator.view().last_status().map(|s| s.text.as_str()),
            Some("could not find dictionary file")
        );
        assert_eq!(orchestrator.load_templates().unwrap(), 0);
        assert_eq!(
            orchestrator.view().last_status().map(|s| s.text.as_str()),
            Some("no template images found")
        );
    }

    #[test]
    fn test_load_calibration_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let backend = backend();
        let mut orchestrator = Orchestrator::new(Arc::clone(&backend), config(dir.path()));
        let model = fake_calibration(&backend);
        persist::calibration::save_model(&dir.path().join("calib").join(STEREO_FILE), &model).unwrap();

        assert!(orchestrator.load_calibration().unwrap());
        assert!(orchestrator.calibration().is_complete());
        assert_eq!(orchestrator.stats().calibration_swaps, 1);
    }

    #[test]
    fn test_load_templates_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let svm = dir.path().join("svm");
        fs::create_dir_all(svm.join("Mug")).unwrap();
        fs::write(svm.join("Mug/Mug.jpg"), "mug template").unwrap();
        fs::create_dir_all(svm.join("Book")).unwrap();

        let mut orchestrator = Orchestrator::new(backend(), config(dir.path()));
        assert_eq!(orchestrator.load_templates().unwrap(), 1);
        assert!(orchestrator.categories().contains("Mug"));
        assert!(!orchestrator.categories().contains("Book"));
    }

    #[test]
    fn test_stop_skips_next_job() {
        let dir = tempfile::tempdir().unwrap();
        let mut orchestrator = Orchestrator::new(backend(), config(dir.path()));
        ready(&mut orchestrator);
        orchestrator.stop(WorkerKind::Categorizer);

        assert!(orchestrator.on_frame(frame(1)));
        assert!(orchestrator.wait_idle(WAIT));
        assert_eq!(orchestrator.stats().results_applied, 0);

        assert!(orchestrator.on_frame(frame(2)));
        assert!(orchestrator.wait_idle(WAIT));
        assert_eq!(orchestrator.view().overlay().frame_id, 2);
    }
}
