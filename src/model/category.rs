//! Recognizable object categories and their reference templates.

use std::collections::BTreeMap;
use std::sync::Arc;

use nalgebra::DMatrix;

use crate::error::VisionError;
use crate::geometry::Quad;
use crate::vision::{FeatureSet, Image};

/// One object class: its reference template and the template's features.
#[derive(Debug, Clone)]
pub struct Category {
    pub name: String,
    pub template: Image,
    pub features: FeatureSet,
}

impl Category {
    pub fn new(name: impl Into<String>, template: Image, features: FeatureSet) -> Self {
        Self {
            name: name.into(),
            template,
            features,
        }
    }

    /// Template outline in template coordinates.
    pub fn outline(&self) -> Quad {
        Quad::from_size(self.template.size())
    }
}

/// All known categories, keyed by unique name.
///
/// Treated as an immutable snapshot: adding a category produces a new set.
#[derive(Debug, Clone, Default)]
pub struct CategorySet {
    categories: BTreeMap<String, Arc<Category>>,
}

impl CategorySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_categories(categories: impl IntoIterator<Item = Category>) -> Self {
        let mut set = Self::new();
        for category in categories {
            set.categories.insert(category.name.clone(), Arc::new(category));
        }
        set
    }

    /// A copy of this set with `category` added or replaced.
    pub fn with(&self, category: Category) -> Self {
        let mut next = self.clone();
        next.categories.insert(category.name.clone(), Arc::new(category));
        next
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Category>> {
        self.categories.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.categories.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.categories.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Category>> {
        self.categories.values()
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    /// True when every category has at least one template descriptor.
    pub fn has_features(&self) -> bool {
        !self.is_empty() && self.iter().all(|c| !c.features.is_empty())
    }

    /// All template descriptors stacked row-wise, in category name order.
    pub fn stacked_descriptors(&self) -> Result<DMatrix<f32>, VisionError> {
        let parts: Vec<&DMatrix<f32>> = self
            .iter()
            .map(|c| &c.features.descriptors)
            .filter(|d| d.nrows() > 0)
            .collect();
        let Some(first) = parts.first() else {
            return Ok(DMatrix::zeros(0, 0));
        };
        let cols = first.ncols();
        if let Some(bad) = parts.iter().find(|d| d.ncols() != cols) {
            return Err(VisionError::Layout(format!(
                "descriptor width {} does not match {}",
                bad.ncols(),
                cols
            )));
        }
        let rows: usize = parts.iter().map(|d| d.nrows()).sum();
        let mut stacked = DMatrix::zeros(rows, cols);
        let mut offset = 0;
        for part in parts {
            stacked
                .view_mut((offset, 0), (part.nrows(), cols))
                .copy_from(part);
            offset += part.nrows();
        }
        Ok(stacked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vision::KeyPoint;

    fn category(name: &str, rows: usize, cols: usize, value: f32) -> Category {
        let template = Image::new(8, 6, 1, vec![0; 48]).unwrap();
        let features = FeatureSet {
            keypoints: (0..rows).map(|i| KeyPoint::at(i as f32, 0.0)).collect(),
            descriptors: DMatrix::from_element(rows, cols, value),
        };
        Category::new(name, template, features)
    }

    #[test]
    fn test_with_replaces_and_keeps_original() {
        let set = CategorySet::from_categories([category("Mug", 2, 4, 1.0)]);
        let next = set.with(category("Book", 3, 4, 2.0));
        assert_eq!(set.len(), 1);
        assert_eq!(next.names().collect::<Vec<_>>(), vec!["Book", "Mug"]);

        let replaced = next.with(category("Mug", 5, 4, 3.0));
        assert_eq!(replaced.len(), 2);
        assert_eq!(replaced.get("Mug").unwrap().features.len(), 5);
    }

    #[test]
    fn test_stacked_descriptors_in_name_order() {
        let set = CategorySet::from_categories([category("Mug", 2, 3, 1.0), category("Book", 1, 3, 2.0)]);
        let stacked = set.stacked_descriptors().unwrap();
        assert_eq!(stacked.shape(), (3, 3));
        assert_eq!(stacked[(0, 0)], 2.0);
        assert_eq!(stacked[(2, 2)], 1.0);
    }

    #[test]
    fn test_stacked_descriptors_rejects_mixed_widths() {
        let set = CategorySet::from_categories([category("Mug", 2, 3, 1.0), category("Book", 1, 4, 2.0)]);
        assert!(set.stacked_descriptors().is_err());
    }

    #[test]
    fn test_outline_matches_template_size() {
        let outline = category("Mug", 1, 1, 0.0).outline();
        assert_eq!(outline.corners[2].x, 8.0);
        assert_eq!(outline.corners[2].y, 6.0);
    }
}
