//! Name-keyed matrix records.
//!
//! A record file is a YAML mapping from artifact name to a matrix with its
//! shape, channel count and row-major data, in the spirit of OpenCV's
//! FileStorage layout. Files are rewritten wholesale; "appending" loads the
//! existing records, adds the new ones and writes everything back.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use nalgebra::{DMatrix, DVector, SMatrix};
use serde::{Deserialize, Serialize};

use crate::error::PersistError;
use crate::model::RemapTable;
use crate::vision::ImageSize;

/// Element storage of a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatrixData {
    F64(Vec<f64>),
    F32(Vec<f32>),
    I16(Vec<i16>),
    U16(Vec<u16>),
}

impl MatrixData {
    fn len(&self) -> usize {
        match self {
            MatrixData::F64(v) => v.len(),
            MatrixData::F32(v) => v.len(),
            MatrixData::I16(v) => v.len(),
            MatrixData::U16(v) => v.len(),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            MatrixData::F64(_) => "f64",
            MatrixData::F32(_) => "f32",
            MatrixData::I16(_) => "i16",
            MatrixData::U16(_) => "u16",
        }
    }
}

/// One persisted matrix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatrixRecord {
    pub rows: usize,
    pub cols: usize,
    #[serde(default = "single_channel")]
    pub channels: u8,
    pub data: MatrixData,
}

fn single_channel() -> u8 {
    1
}

impl MatrixRecord {
    pub fn from_smatrix<const R: usize, const C: usize>(m: &SMatrix<f64, R, C>) -> Self {
        Self {
            rows: R,
            cols: C,
            channels: 1,
            data: MatrixData::F64(m.transpose().as_slice().to_vec()),
        }
    }

    /// A vector stored as a single row.
    pub fn from_dvector(v: &DVector<f64>) -> Self {
        Self {
            rows: 1,
            cols: v.len(),
            channels: 1,
            data: MatrixData::F64(v.as_slice().to_vec()),
        }
    }

    pub fn from_dmatrix_f32(m: &DMatrix<f32>) -> Self {
        Self {
            rows: m.nrows(),
            cols: m.ncols(),
            channels: 1,
            data: MatrixData::F32(m.transpose().as_slice().to_vec()),
        }
    }

    pub fn from_table_i16(table: &RemapTable<i16>) -> Self {
        Self {
            rows: table.size().height as usize,
            cols: table.size().width as usize,
            channels: table.channels(),
            data: MatrixData::I16(table.data().to_vec()),
        }
    }

    pub fn from_table_u16(table: &RemapTable<u16>) -> Self {
        Self {
            rows: table.size().height as usize,
            cols: table.size().width as usize,
            channels: table.channels(),
            data: MatrixData::U16(table.data().to_vec()),
        }
    }

    fn check_len(&self, name: &str) -> Result<(), PersistError> {
        let expected = self.rows * self.cols * self.channels as usize;
        if self.data.len() != expected {
            return Err(shape_error(
                name,
                format!("{} values for {}x{}x{}", self.data.len(), self.rows, self.cols, self.channels),
            ));
        }
        Ok(())
    }

    fn f64_data(&self, name: &str) -> Result<&[f64], PersistError> {
        self.check_len(name)?;
        match &self.data {
            MatrixData::F64(v) => Ok(v),
            other => Err(shape_error(name, format!("expected f64 data, found {}", other.kind()))),
        }
    }

    pub fn to_smatrix<const R: usize, const C: usize>(&self, name: &str) -> Result<SMatrix<f64, R, C>, PersistError> {
        let data = self.f64_data(name)?;
        if self.rows != R || self.cols != C || self.channels != 1 {
            return Err(shape_error(
                name,
                format!("expected {}x{}, found {}x{}", R, C, self.rows, self.cols),
            ));
        }
        Ok(SMatrix::from_row_slice(data))
    }

    /// A vector stored either as one row or as one column.
    pub fn to_dvector(&self, name: &str) -> Result<DVector<f64>, PersistError> {
        let data = self.f64_data(name)?;
        if self.rows != 1 && self.cols != 1 {
            return Err(shape_error(name, format!("{}x{} is not a vector", self.rows, self.cols)));
        }
        Ok(DVector::from_column_slice(data))
    }

    pub fn to_dmatrix_f32(&self, name: &str) -> Result<DMatrix<f32>, PersistError> {
        self.check_len(name)?;
        match &self.data {
            MatrixData::F32(v) => Ok(DMatrix::from_row_slice(self.rows, self.cols, v)),
            other => Err(shape_error(name, format!("expected f32 data, found {}", other.kind()))),
        }
    }

    pub fn to_table_i16(&self, name: &str) -> Result<RemapTable<i16>, PersistError> {
        self.check_len(name)?;
        match &self.data {
            MatrixData::I16(v) => RemapTable::new(self.image_size(name)?, self.channels, v.clone())
                .map_err(|e| shape_error(name, e.to_string())),
            other => Err(shape_error(name, format!("expected i16 data, found {}", other.kind()))),
        }
    }

    pub fn to_table_u16(&self, name: &str) -> Result<RemapTable<u16>, PersistError> {
        self.check_len(name)?;
        match &self.data {
            MatrixData::U16(v) => RemapTable::new(self.image_size(name)?, self.channels, v.clone())
                .map_err(|e| shape_error(name, e.to_string())),
            other => Err(shape_error(name, format!("expected u16 data, found {}", other.kind()))),
        }
    }

    fn image_size(&self, name: &str) -> Result<ImageSize, PersistError> {
        let width = u32::try_from(self.cols).map_err(|_| shape_error(name, "too many columns".into()))?;
        let height = u32::try_from(self.rows).map_err(|_| shape_error(name, "too many rows".into()))?;
        Ok(ImageSize::new(width, height))
    }
}

fn shape_error(name: &str, reason: String) -> PersistError {
    PersistError::Shape {
        name: name.to_string(),
        reason,
    }
}

/// All records of one file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordFile {
    records: BTreeMap<String, MatrixRecord>,
}

impl RecordFile {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(path: &Path) -> Result<Self, PersistError> {
        let file = File::open(path).map_err(|e| PersistError::io(path, e))?;
        serde_yaml::from_reader(BufReader::new(file)).map_err(|source| PersistError::Yaml {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load `path` if it exists, otherwise start empty.
    pub fn load_or_default(path: &Path) -> Result<Self, PersistError> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::new())
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), PersistError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| PersistError::io(parent, e))?;
        }
        let file = File::create(path).map_err(|e| PersistError::io(path, e))?;
        serde_yaml::to_writer(BufWriter::new(file), self).map_err(|source| PersistError::Yaml {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Add these records to the file at `path`, replacing same-named ones.
    pub fn append_to(&self, path: &Path) -> Result<(), PersistError> {
        let mut existing = Self::load_or_default(path)?;
        existing.records.extend(self.records.clone());
        existing.save(path)
    }

    pub fn insert(&mut self, name: impl Into<String>, record: MatrixRecord) -> &mut Self {
        self.records.insert(name.into(), record);
        self
    }

    pub fn get(&self, name: &str) -> Option<&MatrixRecord> {
        self.records.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.records.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.records.keys().map(String::as_str)
    }

    /// Look up a record that must be present.
    pub fn require(&self, path: &Path, name: &str) -> Result<&MatrixRecord, PersistError> {
        self.get(name).ok_or_else(|| PersistError::MissingRecord {
            path: PathBuf::from(path),
            name: name.to_string(),
        })
    }
}
