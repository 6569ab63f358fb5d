//! Per-category one-vs-rest classifiers and the vocabulary they belong to.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::model::Vocabulary;
use crate::vision::BinaryClassifier;

/// Whether a category's classifier can be consulted.
#[derive(Debug, Clone)]
pub enum ClassifierState {
    Trained(Arc<dyn BinaryClassifier>),
    /// Training was skipped, e.g. the category had no positive samples.
    Unusable { reason: String },
}

/// Classifier for one category, tagged with the vocabulary it was trained against.
#[derive(Debug, Clone)]
pub struct ClassifierEntry {
    pub state: ClassifierState,
    /// Fingerprint of the vocabulary the training features were computed with.
    pub vocabulary: u64,
    pub positives: usize,
    pub negatives: usize,
}

impl ClassifierEntry {
    pub fn trained(classifier: Arc<dyn BinaryClassifier>, vocabulary: u64, positives: usize, negatives: usize) -> Self {
        Self {
            state: ClassifierState::Trained(classifier),
            vocabulary,
            positives,
            negatives,
        }
    }

    pub fn unusable(reason: impl Into<String>, vocabulary: u64, positives: usize, negatives: usize) -> Self {
        Self {
            state: ClassifierState::Unusable {
                reason: reason.into(),
            },
            vocabulary,
            positives,
            negatives,
        }
    }

    pub fn classifier(&self) -> Option<&Arc<dyn BinaryClassifier>> {
        match &self.state {
            ClassifierState::Trained(c) => Some(c),
            ClassifierState::Unusable { .. } => None,
        }
    }
}

/// The vocabulary and the classifiers trained against it, swapped as one unit.
#[derive(Debug, Clone, Default)]
pub struct ClassifierModel {
    pub vocabulary: Option<Arc<Vocabulary>>,
    pub entries: BTreeMap<String, ClassifierEntry>,
}

impl ClassifierModel {
    pub fn new(vocabulary: Vocabulary, entries: BTreeMap<String, ClassifierEntry>) -> Self {
        Self {
            vocabulary: Some(Arc::new(vocabulary)),
            entries,
        }
    }

    /// Trained classifiers whose vocabulary tag matches the loaded vocabulary.
    ///
    /// Entries trained against another vocabulary are stale and skipped.
    pub fn usable(&self) -> impl Iterator<Item = (&str, &Arc<dyn BinaryClassifier>)> {
        let current = self.vocabulary.as_ref().map(|v| v.fingerprint());
        self.entries.iter().filter_map(move |(name, entry)| {
            if Some(entry.vocabulary) != current {
                return None;
            }
            entry.classifier().map(|c| (name.as_str(), c))
        })
    }

    pub fn is_ready(&self) -> bool {
        self.vocabulary.as_ref().is_some_and(|v| !v.is_empty()) && self.usable().next().is_some()
    }
}
