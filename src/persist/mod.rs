//! On-disk artifacts: calibration records, the vocabulary, classifier
//! files and the category directory tree.

pub mod calibration;
pub mod categories;
pub mod dictionary;
pub mod records;

pub use categories::{load_templates, save_template, scan_training_set, LoadedTemplates};
pub use dictionary::{load_dictionary, LoadedDictionary};
pub use records::{MatrixData, MatrixRecord, RecordFile};
