//! Control-thread orchestration.
//!
//! [`Orchestrator`] owns the calibration, classifier and category stores,
//! dispatches worker jobs and merges their events into a [`LiveView`].

mod orchestrator;
pub mod view;

pub use orchestrator::{Orchestrator, OrchestratorStats};
pub use view::{LiveView, StatusMessage};
