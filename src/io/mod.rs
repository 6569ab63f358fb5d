//! Stereo frame acquisition.

pub mod euroc;

use anyhow::Result;

use crate::vision::Image;

pub use euroc::{EurocDataset, EurocReplay};

/// One synchronized left/right capture.
#[derive(Debug, Clone)]
pub struct StereoFrame {
    /// Monotonic within a source.
    pub frame_id: u64,
    pub timestamp_ns: u64,
    pub left: Image,
    pub right: Image,
}

/// Produces frames in capture order.
pub trait FrameSource {
    /// The next pair, `None` once the source is exhausted.
    fn next_frame(&mut self) -> Option<Result<StereoFrame>>;
}
