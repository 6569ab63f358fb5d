use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use csv::ReaderBuilder;
use tracing::debug;

use super::{FrameSource, StereoFrame};
use crate::vision::{ImageIo, ReadMode};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageEntry {
    pub timestamp_ns: u64,
    pub filename: String,
}

/// A recorded stereo sequence in the EuRoC layout:
/// `cam0/data.csv` + `cam0/data/` for the left camera, `cam1/...` for the right.
#[derive(Debug, Clone)]
pub struct EurocDataset {
    dataset_path: PathBuf,
    pub cam0_entries: Vec<ImageEntry>,
    pub cam1_entries: Vec<ImageEntry>,
}

impl EurocDataset {
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let cam0_entries = load_image_list(root.join("cam0/data.csv"))?;
        let cam1_entries = load_image_list(root.join("cam1/data.csv"))?;

        if cam0_entries.len() != cam1_entries.len() {
            bail!(
                "cam0 and cam1 have different number of frames ({} vs {})",
                cam0_entries.len(),
                cam1_entries.len()
            );
        }

        Ok(Self {
            dataset_path: root,
            cam0_entries,
            cam1_entries,
        })
    }

    pub fn len(&self) -> usize {
        self.cam0_entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cam0_entries.is_empty()
    }

    pub fn frame_timestamp(&self, idx: usize) -> Option<u64> {
        self.cam0_entries.get(idx).map(|e| e.timestamp_ns)
    }

    /// Decode the pair at `idx`; `frame_id` is the index.
    pub fn stereo_pair<B: ImageIo + ?Sized>(&self, idx: usize, io: &B) -> Result<StereoFrame> {
        let left_entry = self
            .cam0_entries
            .get(idx)
            .with_context(|| format!("No left frame at index {}", idx))?;
        let right_entry = self
            .cam1_entries
            .get(idx)
            .with_context(|| format!("No right frame at index {}", idx))?;

        // Expect synchronized timestamps
        let timestamp_ns = left_entry.timestamp_ns;

        let left_path = self.dataset_path.join("cam0/data").join(&left_entry.filename);
        let right_path = self.dataset_path.join("cam1/data").join(&right_entry.filename);

        let left = io
            .read_image(&left_path, ReadMode::Color)
            .with_context(|| format!("Failed to read left image {:?}", left_path))?;
        let right = io
            .read_image(&right_path, ReadMode::Color)
            .with_context(|| format!("Failed to read right image {:?}", right_path))?;

        Ok(StereoFrame {
            frame_id: idx as u64,
            timestamp_ns,
            left,
            right,
        })
    }

    /// Replay every pair in order.
    pub fn replay<B: ImageIo + ?Sized>(self, io: Arc<B>) -> EurocReplay<B> {
        EurocReplay {
            dataset: self,
            io,
            next: 0,
        }
    }
}

/// [`FrameSource`] over a recorded sequence.
pub struct EurocReplay<B: ?Sized> {
    dataset: EurocDataset,
    io: Arc<B>,
    next: usize,
}

impl<B: ImageIo + ?Sized> FrameSource for EurocReplay<B> {
    fn next_frame(&mut self) -> Option<Result<StereoFrame>> {
        if self.next >= self.dataset.len() {
            return None;
        }
        let idx = self.next;
        self.next += 1;
        debug!(frame = idx, "Replaying frame");
        Some(self.dataset.stereo_pair(idx, self.io.as_ref()))
    }
}

fn load_image_list(csv_path: PathBuf) -> Result<Vec<ImageEntry>> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(false)
        .comment(Some(b'#'))
        .from_path(&csv_path)
        .with_context(|| format!("Failed to open {}", csv_path.display()))?;

    let mut entries = Vec::new();
    for rec in rdr.records() {
        let rec = rec?;
        if rec.len() < 2 {
            continue;
        }
        let ts: u64 = rec[0]
            .trim()
            .parse()
            .with_context(|| format!("Bad timestamp {:?} in {}", &rec[0], csv_path.display()))?;
        let filename = rec[1].trim().to_string();
        entries.push(ImageEntry {
            timestamp_ns: ts,
            filename,
        });
    }
    Ok(entries)
}
