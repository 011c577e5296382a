use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const CREATION_DATE_FIELD: &str = "CreationDate/@value";
pub const CAMERA_MODEL_FIELD: &str = "Device/@modelName";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RecordError {
    #[error("required field {field} is missing in {}", .sidecar.display())]
    MissingField {
        field: &'static str,
        sidecar: PathBuf,
    },
    #[error("cannot parse timestamp '{value}' in {}", .sidecar.display())]
    InvalidTimestamp { value: String, sidecar: PathBuf },
    #[error("shifted timestamp is out of range for {}", .sidecar.display())]
    ShiftOutOfRange { sidecar: PathBuf },
}

/// What one sidecar says about its clip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataRecord {
    pub original_base_name: String,
    pub creation_time: DateTime<FixedOffset>,
    pub camera_model: Option<String>,
    pub sidecar_path: PathBuf,
}

/// Sidecar stem with the camera-segment token removed once: `C0001M01` -> `C0001`.
pub fn clean_base_name(sidecar_path: &Path, strip_token: &str) -> String {
    let stem = sidecar_path
        .file_stem()
        .map(|v| v.to_string_lossy().to_string())
        .unwrap_or_default();
    if strip_token.is_empty() {
        return stem;
    }
    stem.replacen(strip_token, "", 1)
}
