//! Vocabulary and per-category classifier files.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{PersistError, VisionError};
use crate::model::{ClassifierEntry, ClassifierModel, Vocabulary};
use crate::persist::records::{MatrixRecord, RecordFile};
use crate::vision::{BinaryClassifier, LearningBackend};

pub const VOCABULARY_FILE: &str = "vocab.yml";
pub const VOCABULARY_RECORD: &str = "vocabulary";
/// Appended to the category name to form a classifier file stem.
pub const CLASSIFIER_SUFFIX: &str = "SVM";
pub const CLASSIFIER_EXTENSION: &str = "xml";

pub fn save_vocabulary(path: &Path, vocabulary: &Vocabulary) -> Result<(), PersistError> {
    let mut file = RecordFile::new();
    file.insert(VOCABULARY_RECORD, MatrixRecord::from_dmatrix_f32(vocabulary.centers()));
    file.save(path)
}

pub fn load_vocabulary(path: &Path) -> Result<Vocabulary, PersistError> {
    let file = RecordFile::load(path)?;
    let centers = file
        .require(path, VOCABULARY_RECORD)?
        .to_dmatrix_f32(VOCABULARY_RECORD)?;
    Ok(Vocabulary::new(centers))
}

pub fn classifier_path(dir: &Path, category: &str) -> PathBuf {
    dir.join(format!("{category}{CLASSIFIER_SUFFIX}.{CLASSIFIER_EXTENSION}"))
}

/// Category name encoded in a classifier file name, if it is one.
pub fn category_from_classifier_file(path: &Path) -> Option<String> {
    if path.extension()?.to_str()? != CLASSIFIER_EXTENSION {
        return None;
    }
    let stem = path.file_stem()?.to_str()?;
    let name = stem.strip_suffix(CLASSIFIER_SUFFIX)?;
    (!name.is_empty()).then(|| name.to_string())
}

pub fn save_classifier(
    dir: &Path,
    category: &str,
    classifier: &dyn BinaryClassifier,
) -> Result<PathBuf, PersistError> {
    let path = classifier_path(dir, category);
    let text = classifier.to_text()?;
    fs::write(&path, text).map_err(|e| PersistError::io(&path, e))?;
    Ok(path)
}

/// Result of loading a dictionary directory.
#[derive(Debug, Default)]
pub struct LoadedDictionary {
    pub model: ClassifierModel,
    /// Classifier files that exist but could not be read.
    pub failures: Vec<(PathBuf, String)>,
}

/// Load `vocab.yml` and every classifier file from `dir`.
///
/// Loaded classifiers are tagged with the loaded vocabulary; without a
/// vocabulary the model holds no usable entries. The sample counts of
/// loaded entries are unknown and recorded as zero.
pub fn load_dictionary<B: LearningBackend + ?Sized>(
    dir: &Path,
    backend: &B,
) -> Result<LoadedDictionary, PersistError> {
    let vocab_path = dir.join(VOCABULARY_FILE);
    let vocabulary = if vocab_path.exists() {
        Some(load_vocabulary(&vocab_path)?)
    } else {
        warn!(path = %vocab_path.display(), "No vocabulary file");
        None
    };
    let tag = vocabulary.as_ref().map(Vocabulary::fingerprint).unwrap_or_default();

    let mut entries = BTreeMap::new();
    let mut failures = Vec::new();
    for path in sorted_entries(dir)? {
        let Some(category) = category_from_classifier_file(&path) else {
            continue;
        };
        let loaded = fs::read_to_string(&path)
            .map_err(|e| e.to_string())
            .and_then(|text| backend.load_classifier(&text).map_err(|e: VisionError| e.to_string()));
        match loaded {
            Ok(classifier) => {
                debug!(category = %category, "Loaded classifier");
                entries.insert(category, ClassifierEntry::trained(classifier, tag, 0, 0));
            }
            Err(reason) => {
                warn!(path = %path.display(), %reason, "Skipping unreadable classifier");
                failures.push((path, reason));
            }
        }
    }

    let model = ClassifierModel {
        vocabulary: vocabulary.map(Into::into),
        entries,
    };
    Ok(LoadedDictionary { model, failures })
}

fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>, PersistError> {
    let mut paths = fs::read_dir(dir)
        .map_err(|e| PersistError::io(dir, e))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .collect::<Vec<_>>();
    paths.sort();
    Ok(paths)
}
