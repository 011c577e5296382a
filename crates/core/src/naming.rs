use crate::metadata::{MetadataRecord, RecordError, CAMERA_MODEL_FIELD};
use crate::sanitize::sanitize_segment;
use chrono::{DateTime, FixedOffset};

pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";
pub const PREFIX_SEPARATOR: &str = " - ";

/// Which optional segments follow the timestamp prefix.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NameSegments<'a> {
    pub include_original_name: bool,
    pub include_camera_name: bool,
    pub suffix: Option<&'a str>,
}

/// `20210601_100000 - `
pub fn timestamp_prefix(time: &DateTime<FixedOffset>) -> String {
    format!("{}{}", time.format(TIMESTAMP_FORMAT), PREFIX_SEPARATOR)
}

/// Builds the shared base name for a clip and its sidecar from an already
/// shifted timestamp. Segments are appended in a fixed order:
/// `(original)(camera)suffix`.
pub fn render_base_name(
    record: &MetadataRecord,
    adjusted_time: &DateTime<FixedOffset>,
    segments: &NameSegments<'_>,
) -> Result<String, RecordError> {
    let mut output = timestamp_prefix(adjusted_time);

    if segments.include_original_name {
        output.push('(');
        output.push_str(&sanitize_segment(&record.original_base_name));
        output.push(')');
    }

    if segments.include_camera_name {
        let camera = record
            .camera_model
            .as_deref()
            .ok_or_else(|| RecordError::MissingField {
                field: CAMERA_MODEL_FIELD,
                sidecar: record.sidecar_path.clone(),
            })?;
        output.push('(');
        output.push_str(&sanitize_segment(camera));
        output.push(')');
    }

    if let Some(suffix) = segments.suffix.filter(|s| !s.is_empty()) {
        output.push_str(&sanitize_segment(suffix));
    }

    Ok(output)
}
