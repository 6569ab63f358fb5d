//! Models shared between the orchestrator and the workers.
//!
//! All of them are replaced wholesale, never edited in place while a worker
//! may be reading them; see [`SnapshotStore`].

pub mod calibration;
pub mod category;
pub mod classifier;
pub mod detection;
pub mod snapshot;
pub mod vocabulary;

pub use calibration::{
    CalibrationModel, CameraIntrinsics, RectificationView, RectifyingTransforms, RemapPair,
    RemapTable, StereoExtrinsics, StereoRectification,
};
pub use category::{Category, CategorySet};
pub use classifier::{ClassifierEntry, ClassifierModel, ClassifierState};
pub use detection::{DetectionResult, DistanceMeasurement};
pub use snapshot::{SnapshotStore, Versioned};
pub use vocabulary::Vocabulary;
