//! Visual vocabulary and bag-of-words quantisation.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use nalgebra::{DMatrix, DVector};

use crate::error::VisionError;

/// Cluster centers, one per row, used to quantise local descriptors.
///
/// The fingerprint identifies the exact set of centers; classifiers record
/// the fingerprint of the vocabulary they were trained against.
#[derive(Debug, Clone, PartialEq)]
pub struct Vocabulary {
    centers: DMatrix<f32>,
    fingerprint: u64,
}

impl Vocabulary {
    pub fn new(centers: DMatrix<f32>) -> Self {
        let fingerprint = fingerprint(&centers);
        Self {
            centers,
            fingerprint,
        }
    }

    pub fn centers(&self) -> &DMatrix<f32> {
        &self.centers
    }

    /// Number of visual words.
    pub fn len(&self) -> usize {
        self.centers.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.centers.nrows() == 0
    }

    pub fn descriptor_len(&self) -> usize {
        self.centers.ncols()
    }

    pub fn fingerprint(&self) -> u64 {
        self.fingerprint
    }

    /// Index of the nearest center (squared Euclidean distance).
    pub fn quantize(&self, descriptor: &[f32]) -> Option<usize> {
        let mut best = None;
        let mut best_dist = f32::INFINITY;
        for (word, center) in self.centers.row_iter().enumerate() {
            let dist: f32 = center
                .iter()
                .zip(descriptor)
                .map(|(c, d)| (c - d) * (c - d))
                .sum();
            if dist < best_dist {
                best_dist = dist;
                best = Some(word);
            }
        }
        best
    }

    /// Bag-of-words feature: word occurrence counts divided by the number
    /// of descriptors. A frame without descriptors yields the zero vector.
    pub fn bag_of_words(&self, descriptors: &DMatrix<f32>) -> Result<DVector<f32>, VisionError> {
        let mut histogram = DVector::zeros(self.len());
        if descriptors.nrows() == 0 {
            return Ok(histogram);
        }
        if descriptors.ncols() != self.descriptor_len() {
            return Err(VisionError::Layout(format!(
                "descriptor width {} does not match vocabulary width {}",
                descriptors.ncols(),
                self.descriptor_len()
            )));
        }
        let mut row = vec![0.0f32; descriptors.ncols()];
        for r in 0..descriptors.nrows() {
            for (c, value) in row.iter_mut().enumerate() {
                *value = descriptors[(r, c)];
            }
            if let Some(word) = self.quantize(&row) {
                histogram[word] += 1.0;
            }
        }
        histogram /= descriptors.nrows() as f32;
        Ok(histogram)
    }
}

fn fingerprint(centers: &DMatrix<f32>) -> u64 {
    let mut hasher = DefaultHasher::new();
    centers.nrows().hash(&mut hasher);
    centers.ncols().hash(&mut hasher);
    for value in centers.iter() {
        value.to_bits().hash(&mut hasher);
    }
    hasher.finish()
}
