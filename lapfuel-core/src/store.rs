//! Persistence of the average curve
//!
//! The curve is stored as one JSON document keyed by `(track_id, car_id)`.
//! Writes go through a temp file and a rename so a concurrent reader never
//! sees a partial document.

use crate::curve::{AverageCurve, CurveError};
use crate::model::SessionIdentity;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed curve file: {0}")]
    Json(#[from] serde_json::Error),

    #[error("stored curve belongs to {stored}, current session is {current}")]
    IdentityMismatch {
        stored: SessionIdentity,
        current: SessionIdentity,
    },

    #[error("stored curve is unusable: {0}")]
    Shape(#[from] CurveError),
}

/// On-disk form of the average curve
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredCurve {
    pub track_id: i64,
    pub car_id: i64,
    /// `[position, consumption]` pairs, one per grid point
    pub average_curve: Vec<[f64; 2]>,
    pub collected_laps_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saved_at: Option<DateTime<Utc>>,
}

impl StoredCurve {
    pub fn new(identity: SessionIdentity, curve: &AverageCurve, collected_laps: u32) -> Self {
        Self {
            track_id: identity.track_id,
            car_id: identity.car_id,
            average_curve: curve.to_pairs(),
            collected_laps_count: collected_laps,
            saved_at: Some(Utc::now()),
        }
    }

    pub fn identity(&self) -> SessionIdentity {
        SessionIdentity {
            track_id: self.track_id,
            car_id: self.car_id,
        }
    }

    /// Check the record against the live session and turn it into a curve.
    ///
    /// Identity must match exactly and the curve must have `expected_len`
    /// finite points.
    pub fn accept(
        self,
        current: SessionIdentity,
        expected_len: usize,
    ) -> Result<(AverageCurve, u32), StoreError> {
        let stored = self.identity();
        if stored != current {
            return Err(StoreError::IdentityMismatch { stored, current });
        }
        if self.average_curve.len() != expected_len {
            return Err(CurveError::LengthMismatch {
                expected: expected_len,
                actual: self.average_curve.len(),
            }
            .into());
        }
        let curve = AverageCurve::from_pairs(&self.average_curve)?;
        Ok((curve, self.collected_laps_count))
    }
}

/// Where the average curve is kept between runs
pub trait CurveStore: Send {
    /// `Ok(None)` when nothing has been saved yet
    fn load(&self) -> Result<Option<StoredCurve>, StoreError>;

    fn save(&self, record: &StoredCurve) -> Result<(), StoreError>;

    /// Remove the saved curve; succeeds if there was none
    fn delete(&self) -> Result<(), StoreError>;
}

/// JSON file backed store
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CurveStore for JsonFileStore {
    fn load(&self) -> Result<Option<StoredCurve>, StoreError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(StoreError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    fn save(&self, record: &StoredCurve) -> Result<(), StoreError> {
        let data = serde_json::to_vec_pretty(record)?;
        write_atomic(&self.path, &data)
    }

    fn delete(&self) -> Result<(), StoreError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StoreError::Io {
                path: self.path.clone(),
                source,
            }),
        }
    }
}

/// In-memory store, for tests and runs that should not touch disk
#[derive(Debug, Default)]
pub struct MemoryStore {
    record: std::sync::Mutex<Option<StoredCurve>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_record(record: StoredCurve) -> Self {
        Self {
            record: std::sync::Mutex::new(Some(record)),
        }
    }

    pub fn record(&self) -> Option<StoredCurve> {
        self.record.lock().ok().and_then(|r| r.clone())
    }
}

impl CurveStore for MemoryStore {
    fn load(&self) -> Result<Option<StoredCurve>, StoreError> {
        Ok(self.record())
    }

    fn save(&self, record: &StoredCurve) -> Result<(), StoreError> {
        if let Ok(mut slot) = self.record.lock() {
            *slot = Some(record.clone());
        }
        Ok(())
    }

    fn delete(&self) -> Result<(), StoreError> {
        if let Ok(mut slot) = self.record.lock() {
            *slot = None;
        }
        Ok(())
    }
}

/// Write `data` to `path` via a sibling temp file and a rename
pub fn write_atomic(path: &Path, data: &[u8]) -> Result<(), StoreError> {
    let io_err = |source: io::Error| StoreError::Io {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_err)?;
    }

    let temp_path = path.with_extension("tmp");
    debug!(path = ?path, "Writing file atomically");
    fs::write(&temp_path, data).map_err(io_err)?;
    fs::rename(&temp_path, path).map_err(io_err)?;
    Ok(())
}
