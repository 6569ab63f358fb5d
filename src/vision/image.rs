//! Owned 8-bit image buffer shared between the control thread and workers.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::VisionError;

/// Width and height in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

impl ImageSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn area(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

/// Interleaved 8-bit pixels, row-major.
///
/// The pixel buffer is reference counted: cloning an `Image` to hand it to
/// a worker does not copy pixels.
#[derive(Clone, PartialEq, Eq)]
pub struct Image {
    size: ImageSize,
    channels: u8,
    data: Arc<[u8]>,
}

impl Image {
    pub fn new(width: u32, height: u32, channels: u8, data: Vec<u8>) -> Result<Self, VisionError> {
        let expected = width as usize * height as usize * channels as usize;
        if data.len() != expected {
            return Err(VisionError::Layout(format!(
                "{}x{}x{} image needs {} bytes, got {}",
                width,
                height,
                channels,
                expected,
                data.len()
            )));
        }
        Ok(Self {
            size: ImageSize::new(width, height),
            channels,
            data: data.into(),
        })
    }

    /// A zero-sized image, standing in for a frame that was not captured.
    pub fn empty() -> Self {
        Self {
            size: ImageSize::new(0, 0),
            channels: 1,
            data: Arc::from(Vec::new()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.size.area() == 0
    }

    pub fn size(&self) -> ImageSize {
        self.size
    }

    pub fn width(&self) -> u32 {
        self.size.width
    }

    pub fn height(&self) -> u32 {
        self.size.height
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

impl fmt::Debug for Image {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Image")
            .field("width", &self.size.width)
            .field("height", &self.size.height)
            .field("channels", &self.channels)
            .finish()
    }
}
