//! Category directory layout.
//!
//! ```text
//! <data>/
//!   Mug/
//!     Mug.jpg              reference template
//!     Training_Images/     positive training photos
//!   Book/
//!     ...
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::PersistError;
use crate::model::{Category, CategorySet};
use crate::vision::{FeatureBackend, Image, ImageIo, ReadMode};

pub const TRAINING_DIR: &str = "Training_Images";
pub const TEMPLATE_EXTENSION: &str = "jpg";

pub fn template_path(dir: &Path, category: &str) -> PathBuf {
    dir.join(category).join(format!("{category}.{TEMPLATE_EXTENSION}"))
}

/// Category subdirectories of `dir`, sorted by name.
pub fn category_dirs(dir: &Path) -> Result<Vec<(String, PathBuf)>, PersistError> {
    let mut dirs = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| PersistError::io(dir, e))? {
        let path = entry.map_err(|e| PersistError::io(dir, e))?.path();
        if !path.is_dir() {
            continue;
        }
        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            if !name.starts_with('.') {
                dirs.push((name.to_string(), path.clone()));
            }
        }
    }
    dirs.sort();
    Ok(dirs)
}

/// Map every category to its training image files.
///
/// Categories without a training directory are present with no images so
/// the trainer can account for them.
pub fn scan_training_set(dir: &Path) -> Result<BTreeMap<String, Vec<PathBuf>>, PersistError> {
    let mut training = BTreeMap::new();
    for (name, path) in category_dirs(dir)? {
        let training_dir = path.join(TRAINING_DIR);
        let mut images = Vec::new();
        if training_dir.is_dir() {
            collect_files(&training_dir, &mut images)?;
        } else {
            debug!(category = %name, "No training directory");
        }
        images.sort();
        training.insert(name, images);
    }
    Ok(training)
}

fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), PersistError> {
    for entry in fs::read_dir(dir).map_err(|e| PersistError::io(dir, e))? {
        let path = entry.map_err(|e| PersistError::io(dir, e))?.path();
        let hidden = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with('.'));
        if hidden {
            continue;
        }
        if path.is_dir() {
            collect_files(&path, out)?;
        } else {
            out.push(path);
        }
    }
    Ok(())
}

/// Templates that loaded, and the categories that were skipped with why.
#[derive(Debug, Default)]
pub struct LoadedTemplates {
    pub categories: CategorySet,
    pub skipped: Vec<(String, String)>,
}

/// Read every category template as grayscale and compute its features.
pub fn load_templates<B: ImageIo + FeatureBackend + ?Sized>(
    dir: &Path,
    backend: &B,
) -> Result<LoadedTemplates, PersistError> {
    let mut categories = Vec::new();
    let mut skipped = Vec::new();
    for (name, _) in category_dirs(dir)? {
        let path = template_path(dir, &name);
        if !path.is_file() {
            skipped.push((name, format!("no template {}", path.display())));
            continue;
        }
        let loaded = backend
            .read_image(&path, ReadMode::Grayscale)
            .and_then(|template| backend.detect_and_compute(&template).map(|f| (template, f)));
        match loaded {
            Ok((template, features)) => {
                debug!(category = %name, keypoints = features.len(), "Loaded template");
                categories.push(Category::new(name, template, features));
            }
            Err(e) => {
                warn!(category = %name, error = %e, "Skipping template");
                skipped.push((name, e.to_string()));
            }
        }
    }
    info!(count = categories.len(), "Loaded category templates");
    Ok(LoadedTemplates {
        categories: CategorySet::from_categories(categories),
        skipped,
    })
}

/// Write a category's template into its directory, creating it if needed.
pub fn save_template<B: ImageIo + ?Sized>(
    dir: &Path,
    category: &str,
    template: &Image,
    backend: &B,
) -> Result<PathBuf, PersistError> {
    let category_dir = dir.join(category);
    fs::create_dir_all(category_dir.join(TRAINING_DIR))
        .map_err(|e| PersistError::io(&category_dir, e))?;
    let path = template_path(dir, category);
    backend.write_image(&path, template)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vision::fake::FakeVision;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"x").unwrap();
    }

    #[test]
    fn test_scan_training_set() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        touch(&root.join("Mug/Training_Images/b.jpg"));
        touch(&root.join("Mug/Training_Images/a.jpg"));
        touch(&root.join("Mug/Training_Images/nested/c.jpg"));
        touch(&root.join("Mug/Training_Images/.DS_Store"));
        touch(&root.join("Book/Book.jpg"));
        touch(&root.join("vocab.yml"));

        let training = scan_training_set(root).unwrap();
        assert_eq!(training.keys().collect::<Vec<_>>(), vec!["Book", "Mug"]);
        assert!(training["Book"].is_empty());
        let names: Vec<_> = training["Mug"]
            .iter()
            .map(|p| p.strip_prefix(root).unwrap().to_path_buf())
            .collect();
        assert_eq!(
            names,
            vec![
                PathBuf::from("Mug/Training_Images/a.jpg"),
                PathBuf::from("Mug/Training_Images/b.jpg"),
                PathBuf::from("Mug/Training_Images/nested/c.jpg"),
            ]
        );
    }

    #[test]
    fn test_save_then_load_templates() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FakeVision::new();
        let template = backend.labelled_image("mug-template");
        save_template(dir.path(), "Mug", &template, &backend).unwrap();
        fs::create_dir_all(dir.path().join("Empty")).unwrap();

        let loaded = load_templates(dir.path(), &backend).unwrap();
        assert_eq!(loaded.categories.names().collect::<Vec<_>>(), vec!["Mug"]);
        assert_eq!(loaded.skipped.len(), 1);
        assert_eq!(loaded.skipped[0].0, "Empty");
        assert!(dir.path().join("Mug/Training_Images").is_dir());
        assert!(!loaded.categories.get("Mug").unwrap().features.is_empty());
    }
}
