//! Vocabulary building and one-vs-rest classifier training.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use nalgebra::{DMatrix, DVector};
use tracing::{debug, info, warn};

use super::{EventSink, Job, Outcome, WorkerEvent, WorkerKind};
use crate::config::SvmParams;
use crate::error::{Precondition, VisionError};
use crate::model::{CategorySet, ClassifierEntry, ClassifierModel, Vocabulary};
use crate::persist::dictionary::{save_classifier, save_vocabulary, VOCABULARY_FILE};
use crate::persist::scan_training_set;
use crate::vision::{FeatureBackend, ImageIo, LearningBackend, ReadMode};

/// Training matrix for one category: positives first (label 1), then
/// negatives (label 0), one bag-of-words vector per row.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingSamples {
    pub samples: DMatrix<f32>,
    pub labels: Vec<i32>,
    pub positives: usize,
    pub negatives: usize,
}

/// Split labelled feature vectors into one training set per category.
///
/// A vector labelled A is a positive sample for A and a negative sample for
/// every other category in `categories`.
pub fn one_vs_rest(
    categories: &[String],
    features: &[(String, DVector<f32>)],
    width: usize,
) -> BTreeMap<String, TrainingSamples> {
    categories
        .iter()
        .map(|category| {
            let (positive, negative): (Vec<_>, Vec<_>) =
                features.iter().partition(|(label, _)| label == category);
            let rows: Vec<_> = positive
                .iter()
                .chain(&negative)
                .map(|(_, v)| v.transpose())
                .collect();
            let samples = if rows.is_empty() {
                DMatrix::zeros(0, width)
            } else {
                DMatrix::from_rows(&rows)
            };
            let labels = std::iter::repeat(1)
                .take(positive.len())
                .chain(std::iter::repeat(0).take(negative.len()))
                .collect();
            let set = TrainingSamples {
                samples,
                labels,
                positives: positive.len(),
                negatives: negative.len(),
            };
            (category.clone(), set)
        })
        .collect()
}

pub struct DictionaryJob<B> {
    backend: Arc<B>,
    dir: PathBuf,
    categories: Arc<CategorySet>,
    clusters: usize,
    svm: SvmParams,
}

impl<B: ImageIo + FeatureBackend + LearningBackend> DictionaryJob<B> {
    pub fn new(
        backend: Arc<B>,
        dir: impl Into<PathBuf>,
        categories: Arc<CategorySet>,
        clusters: usize,
        svm: SvmParams,
    ) -> Self {
        Self {
            backend,
            dir: dir.into(),
            categories,
            clusters,
            svm,
        }
    }

    fn build_vocabulary(&self) -> Result<Vocabulary, VisionError> {
        let descriptors = self.categories.stacked_descriptors()?;
        let centers = self.backend.cluster(&descriptors, self.clusters)?;
        Ok(Vocabulary::new(centers))
    }

    /// Bag-of-words vector of every readable training image.
    fn training_features(
        &self,
        vocabulary: &Vocabulary,
        training: &BTreeMap<String, Vec<PathBuf>>,
        sink: &EventSink,
    ) -> Vec<(String, DVector<f32>)> {
        let mut features = Vec::new();
        for (category, paths) in training {
            if !self.categories.contains(category) {
                debug!(category = %category, "Training images without a template count as negatives only");
            }
            for path in paths {
                let feature = self
                    .backend
                    .read_image(path, ReadMode::Grayscale)
                    .and_then(|image| self.backend.detect_and_compute(&image))
                    .and_then(|found| {
                        if found.is_empty() {
                            Ok(None)
                        } else {
                            vocabulary.bag_of_words(&found.descriptors).map(Some)
                        }
                    });
                match feature {
                    Ok(Some(v)) => features.push((category.clone(), v)),
                    Ok(None) => debug!(path = %path.display(), "No features in training image"),
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "Skipping training image");
                        sink.message(e.to_string());
                    }
                }
            }
        }
        features
    }

    fn train(&self, category: &str, set: &TrainingSamples, tag: u64, sink: &EventSink) -> ClassifierEntry {
        if set.positives == 0 || set.negatives == 0 {
            let reason = if set.positives == 0 {
                "no positive training samples"
            } else {
                "no negative training samples"
            };
            sink.message(format!("Not training {category}: {reason}"));
            return ClassifierEntry::unusable(reason, tag, set.positives, set.negatives);
        }
        let trained = self
            .backend
            .train_classifier(&set.samples, &set.labels, &self.svm)
            .map(|classifier| {
                if let Err(e) = save_classifier(&self.dir, category, classifier.as_ref()) {
                    warn!(category, error = %e, "Could not save classifier");
                    sink.message(e.to_string());
                }
                classifier
            });
        match trained {
            Ok(classifier) => {
                debug!(category, positives = set.positives, negatives = set.negatives, "Trained classifier");
                ClassifierEntry::trained(classifier, tag, set.positives, set.negatives)
            }
            Err(e) => {
                sink.message(format!("{category}: {e}"));
                ClassifierEntry::unusable(e.to_string(), tag, set.positives, set.negatives)
            }
        }
    }

    /// Every step except the final 100, which `run` sends on all exits.
    fn train_all(self, sink: &EventSink) -> Outcome {
        let training = match scan_training_set(&self.dir) {
            Ok(training) => training,
            Err(e) => {
                sink.message(e.to_string());
                return Outcome::Failed(e.to_string());
            }
        };
        sink.progress(5);

        if self.categories.is_empty() {
            let refusal = Precondition::NoTemplates;
            sink.message(refusal.to_string());
            return Outcome::Failed(refusal.to_string());
        }
        let vocabulary = match self.build_vocabulary() {
            Ok(vocabulary) => vocabulary,
            Err(e) => {
                sink.message(e.to_string());
                return Outcome::Failed(e.to_string());
            }
        };
        if let Err(e) = save_vocabulary(&self.dir.join(VOCABULARY_FILE), &vocabulary) {
            warn!(error = %e, "Could not save vocabulary");
            sink.message(e.to_string());
        }
        info!(words = vocabulary.len(), "Built vocabulary");
        sink.progress(50);

        let features = self.training_features(&vocabulary, &training, sink);
        let names: Vec<String> = self.categories.names().map(str::to_string).collect();
        let sets = one_vs_rest(&names, &features, vocabulary.len());
        sink.progress(75);

        let tag = vocabulary.fingerprint();
        let mut entries = BTreeMap::new();
        for (i, (category, set)) in sets.iter().enumerate() {
            entries.insert(category.clone(), self.train(category, set, tag, sink));
            if i + 1 < sets.len() {
                sink.progress((75 + 25 * (i + 1) / sets.len()) as u8);
            }
        }

        sink.status("Finished training");
        sink.deliver(WorkerEvent::DictionaryTrained(Box::new(ClassifierModel::new(vocabulary, entries))));
        Outcome::Completed
    }
}

impl<B: ImageIo + FeatureBackend + LearningBackend + 'static> Job for DictionaryJob<B> {
    const KIND: WorkerKind = WorkerKind::Dictionary;

    fn run(self, sink: &EventSink) -> Outcome {
        let outcome = self.train_all(sink);
        sink.progress(100);
        outcome
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use super::*;
    use crate::model::Category;
    use crate::persist::dictionary::{classifier_path, load_vocabulary};
    use crate::vision::fake::{FakeVision, TrainingCall};
    use crate::workers::tests::{messages_of, progress_of, test_sink};

    fn vector(x: f32) -> DVector<f32> {
        DVector::from_vec(vec![x, 1.0 - x])
    }

    #[test]
    fn test_one_vs_rest_counts() {
        let categories = vec!["A".to_string(), "B".to_string(), "C".to_string()];
        let features = vec![
            ("A".to_string(), vector(0.1)),
            ("B".to_string(), vector(0.2)),
            ("A".to_string(), vector(0.3)),
            ("C".to_string(), vector(0.4)),
        ];
        let sets = one_vs_rest(&categories, &features, 2);

        assert_eq!((sets["A"].positives, sets["A"].negatives), (2, 2));
        assert_eq!((sets["B"].positives, sets["B"].negatives), (1, 3));
        assert_eq!((sets["C"].positives, sets["C"].negatives), (1, 3));
        assert_eq!(sets["A"].labels, vec![1, 1, 0, 0]);
        assert_eq!(sets["A"].samples.row(1)[0], 0.3);
        assert_eq!(sets["B"].samples.row(0)[0], 0.2);
        for set in sets.values() {
            assert_eq!(set.samples.nrows(), features.len());
        }
    }

    #[test]
    fn test_one_vs_rest_without_samples() {
        let sets = one_vs_rest(&["A".to_string()], &[], 5);
        assert_eq!(sets["A"].samples.shape(), (0, 5));
        assert!(sets["A"].labels.is_empty());
    }

    fn write_training_set(dir: &Path, category: &str, images: usize) {
        let training = dir.join(category).join("Training_Images");
        fs::create_dir_all(&training).unwrap();
        for i in 0..images {
            fs::write(training.join(format!("{i:02}.jpg")), format!("{category} photo {i}")).unwrap();
        }
    }

    fn categories(backend: &FakeVision, names: &[&str]) -> Arc<CategorySet> {
        let categories = names.iter().map(|name| {
            let template = backend.labelled_image(&format!("{name} template"));
            let features = backend.detect_and_compute(&template).unwrap();
            Category::new(*name, template, features)
        });
        Arc::new(CategorySet::from_categories(categories))
    }

    fn run(job: DictionaryJob<FakeVision>) -> Vec<WorkerEvent> {
        let (sink, rx) = test_sink(WorkerKind::Dictionary);
        job.run(&sink);
        drop(sink);
        rx.iter().collect()
    }

    #[test]
    fn test_two_categories_ten_images_each() {
        let dir = tempfile::tempdir().unwrap();
        write_training_set(dir.path(), "Mug", 10);
        write_training_set(dir.path(), "Book", 10);
        let backend = Arc::new(FakeVision::new());
        let set = categories(&backend, &["Mug", "Book"]);

        let events = run(DictionaryJob::new(
            Arc::clone(&backend),
            dir.path(),
            set,
            50,
            SvmParams::default(),
        ));

        assert_eq!(progress_of(&events), vec![5, 50, 75, 87, 100]);
        let model = events
            .iter()
            .find_map(|e| match e {
                WorkerEvent::DictionaryTrained(model) => Some(model),
                _ => None,
            })
            .expect("dictionary result");
        let vocabulary = model.vocabulary.as_ref().unwrap();
        assert_eq!(vocabulary.len(), 50);
        assert_eq!(model.entries.len(), 2);
        for entry in model.entries.values() {
            assert_eq!((entry.positives, entry.negatives), (10, 10));
            assert_eq!(entry.vocabulary, vocabulary.fingerprint());
        }
        assert_eq!(
            *backend.training.lock(),
            vec![
                TrainingCall {
                    rows: 20,
                    positives: 10,
                    negatives: 10,
                    positives_first: true,
                };
                2
            ]
        );
        assert!(model.is_ready());

        let saved = load_vocabulary(&dir.path().join(VOCABULARY_FILE)).unwrap();
        assert_eq!(saved.fingerprint(), vocabulary.fingerprint());
        assert!(classifier_path(dir.path(), "Mug").is_file());
        assert!(classifier_path(dir.path(), "Book").is_file());
    }

    #[test]
    fn test_category_without_images_is_marked_unusable() {
        let dir = tempfile::tempdir().unwrap();
        write_training_set(dir.path(), "Mug", 4);
        fs::create_dir_all(dir.path().join("Lamp")).unwrap();
        let backend = Arc::new(FakeVision::new());
        let set = categories(&backend, &["Mug", "Lamp"]);

        let events = run(DictionaryJob::new(
            Arc::clone(&backend),
            dir.path(),
            set,
            10,
            SvmParams::default(),
        ));

        let model = events
            .iter()
            .find_map(|e| match e {
                WorkerEvent::DictionaryTrained(model) => Some(model),
                _ => None,
            })
            .unwrap();
        // Lamp has no positives, Mug has no negatives.
        assert!(model.entries.values().all(|e| e.classifier().is_none()));
        assert_eq!(model.usable().count(), 0);
        assert!(backend.training.lock().is_empty());
        assert!(messages_of(&events).iter().any(|m| m == "Not training Lamp: no positive training samples"));
        assert!(!classifier_path(dir.path(), "Lamp").exists());
    }

    #[test]
    fn test_refuses_without_templates() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(FakeVision::new());
        let events = run(DictionaryJob::new(
            backend,
            dir.path(),
            Arc::new(CategorySet::new()),
            10,
            SvmParams::default(),
        ));
        assert_eq!(progress_of(&events), vec![5, 100]);
        assert!(!events.iter().any(|e| matches!(e, WorkerEvent::DictionaryTrained(_))));
        assert_eq!(messages_of(&events), vec![Precondition::NoTemplates.to_string()]);
    }

    #[test]
    fn test_vocabulary_failure_still_completes_progress() {
        let dir = tempfile::tempdir().unwrap();
        write_training_set(dir.path(), "Mug", 2);
        let backend = Arc::new(FakeVision::new());
        let set = categories(&backend, &["Mug"]);

        let (sink, rx) = test_sink(WorkerKind::Dictionary);
        let outcome = DictionaryJob::new(backend, dir.path(), set, 100_000, SvmParams::default()).run(&sink);
        drop(sink);
        let events: Vec<WorkerEvent> = rx.iter().collect();

        assert!(matches!(outcome, Outcome::Failed(_)));
        assert_eq!(progress_of(&events), vec![5, 100]);
        assert!(!events.iter().any(|e| matches!(e, WorkerEvent::DictionaryTrained(_))));
        assert_eq!(messages_of(&events).len(), 1);
    }
}
