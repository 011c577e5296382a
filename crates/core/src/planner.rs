use crate::config::{NamingConvention, RenameConfig};
use crate::metadata::{MetadataRecord, RecordError};
use crate::naming::render_base_name;
use crate::sidecar_reader::read_sidecar;
use anyhow::{Context, Result};
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    Planned,
    MissingData,
}

/// Where one clip and its sidecar go.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenamePlan {
    pub original_base_name: String,
    pub new_base_name: String,
    pub creation_time: DateTime<FixedOffset>,
    pub adjusted_time: DateTime<FixedOffset>,
    pub sidecar_source: PathBuf,
    pub sidecar_dest: PathBuf,
    pub data_source: PathBuf,
    pub data_dest: PathBuf,
    pub status: PlanStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Unreadable,
    MissingField,
    InvalidMetadata,
    MissingData,
    RenameFailed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordFailure {
    pub sidecar: PathBuf,
    pub kind: FailureKind,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ScanStats {
    pub scanned_files: usize,
    pub sidecar_files: usize,
    pub skipped_other: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchPlan {
    pub folder: PathBuf,
    pub plans: Vec<RenamePlan>,
    pub failures: Vec<RecordFailure>,
    pub stats: ScanStats,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error(
    "{missing_data} clip(s) without a data file and {unusable} unusable sidecar(s); \
     nothing was renamed (enable ignore-missing to skip them)"
)]
pub struct BlockedRun {
    pub missing_data: usize,
    pub unusable: usize,
}

impl BatchPlan {
    pub fn ready(&self) -> impl Iterator<Item = &RenamePlan> {
        self.plans
            .iter()
            .filter(|plan| plan.status == PlanStatus::Planned)
    }

    pub fn missing_data(&self) -> usize {
        self.plans
            .iter()
            .filter(|plan| plan.status == PlanStatus::MissingData)
            .count()
    }

    pub fn has_problems(&self) -> bool {
        !self.failures.is_empty() || self.missing_data() > 0
    }

    /// Every problem found while planning stops the run unless it was asked
    /// to skip them. Nothing on disk has been touched at this point.
    pub fn ensure_runnable(&self, ignore_missing: bool) -> Result<(), BlockedRun> {
        if ignore_missing || !self.has_problems() {
            return Ok(());
        }
        Err(BlockedRun {
            missing_data: self.missing_data(),
            unusable: self.failures.len(),
        })
    }
}

/// Maps one metadata record to its rename plan. Touches no files: whether the
/// data file exists is decided by the caller.
pub fn derive(
    record: &MetadataRecord,
    config: &RenameConfig,
    data_file_exists: bool,
) -> Result<RenamePlan, RecordError> {
    let adjusted_time = config
        .time_shift
        .apply(record.creation_time)
        .ok_or_else(|| RecordError::ShiftOutOfRange {
            sidecar: record.sidecar_path.clone(),
        })?;

    let new_base_name = render_base_name(record, &adjusted_time, &config.name_segments())?;

    let dir = record
        .sidecar_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();
    let naming = &config.naming;
    let data_source = dir.join(format!(
        "{}.{}",
        record.original_base_name, naming.data_extension
    ));
    let data_dest = dir.join(format!(
        "{}.{}",
        new_base_name,
        naming.data_extension.to_lowercase()
    ));
    let sidecar_extension = record
        .sidecar_path
        .extension()
        .map(|v| v.to_string_lossy().to_lowercase())
        .unwrap_or_else(|| naming.sidecar_extension.to_lowercase());
    let sidecar_dest = dir.join(format!("{}.{}", new_base_name, sidecar_extension));

    let status = if data_file_exists {
        PlanStatus::Planned
    } else {
        PlanStatus::MissingData
    };

    Ok(RenamePlan {
        original_base_name: record.original_base_name.clone(),
        new_base_name,
        creation_time: record.creation_time,
        adjusted_time,
        sidecar_source: record.sidecar_path.clone(),
        sidecar_dest,
        data_source,
        data_dest,
        status,
    })
}

/// Reads every sidecar in `folder` and derives its plan. Per-record problems
/// are collected in the batch instead of aborting the scan.
pub fn plan_folder(folder: &Path, config: &RenameConfig) -> Result<BatchPlan> {
    if !folder.is_dir() {
        anyhow::bail!("folder does not exist: {}", folder.display());
    }

    let mut stats = ScanStats::default();
    let sidecars = collect_sidecars(folder, &config.naming, &mut stats)?;
    if stats.scanned_files == 0 {
        anyhow::bail!("no files found in {}", folder.display());
    }
    info!("found {} files", stats.scanned_files);

    let mut plans = Vec::with_capacity(sidecars.len());
    let mut failures = Vec::new();

    for sidecar in sidecars {
        match plan_sidecar(&sidecar, config) {
            Ok(plan) => {
                if plan.status == PlanStatus::MissingData {
                    warn!("file {} not found", plan.data_source.display());
                }
                plans.push(plan);
            }
            Err(failure) => {
                warn!("{}", failure.message);
                failures.push(failure);
            }
        }
    }

    Ok(BatchPlan {
        folder: folder.to_path_buf(),
        plans,
        failures,
        stats,
    })
}

fn plan_sidecar(sidecar: &Path, config: &RenameConfig) -> Result<RenamePlan, RecordFailure> {
    let record = read_sidecar(sidecar, &config.naming.strip_token)
        .map_err(|err| classify_read_error(sidecar, err))?;

    let data_path = sidecar.with_file_name(format!(
        "{}.{}",
        record.original_base_name, config.naming.data_extension
    ));
    let plan = derive(&record, config, data_path.is_file())
        .map_err(|err| record_failure(sidecar, &err))?;

    if !config.time_shift.is_zero() {
        info!(
            "{}: old time {}, new time {}",
            plan.original_base_name,
            plan.creation_time.format("%Hh%Mm%Ss"),
            plan.adjusted_time.format("%Hh%Mm%Ss")
        );
    }
    debug!("{} -> {}", plan.original_base_name, plan.new_base_name);
    Ok(plan)
}

fn classify_read_error(sidecar: &Path, err: anyhow::Error) -> RecordFailure {
    match err.downcast_ref::<RecordError>() {
        Some(record_err) => record_failure(sidecar, record_err),
        None => RecordFailure {
            sidecar: sidecar.to_path_buf(),
            kind: FailureKind::Unreadable,
            message: format!("{err:#}"),
        },
    }
}

fn record_failure(sidecar: &Path, err: &RecordError) -> RecordFailure {
    let kind = match err {
        RecordError::MissingField { .. } => FailureKind::MissingField,
        RecordError::InvalidTimestamp { .. } | RecordError::ShiftOutOfRange { .. } => {
            FailureKind::InvalidMetadata
        }
    };
    RecordFailure {
        sidecar: sidecar.to_path_buf(),
        kind,
        message: err.to_string(),
    }
}

/// Non-recursive listing of sidecars in `root`, sorted by path.
pub fn collect_sidecars(
    root: &Path,
    naming: &NamingConvention,
    stats: &mut ScanStats,
) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    let suffix = format!(".{}", naming.sidecar_extension);

    for entry in
        fs::read_dir(root).with_context(|| format!("cannot read folder: {}", root.display()))?
    {
        let entry = entry.with_context(|| format!("cannot read entry in {}", root.display()))?;
        let path = entry.path();
        if path.is_dir() {
            continue;
        }
        stats.scanned_files += 1;

        let is_sidecar = path
            .file_name()
            .map(|name| name.to_string_lossy().ends_with(&suffix))
            .unwrap_or(false);
        if is_sidecar {
            stats.sidecar_files += 1;
            out.push(path);
        } else {
            stats.skipped_other += 1;
        }
    }
    out.sort();

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time_shift::parse_time_shift;
    use tempfile::tempdir;

    fn record(camera_model: Option<&str>) -> MetadataRecord {
        MetadataRecord {
            original_base_name: "C0001".to_string(),
            creation_time: DateTime::parse_from_rfc3339("2021-06-01T10:00:00+00:00")
                .expect("valid timestamp"),
            camera_model: camera_model.map(str::to_string),
            sidecar_path: PathBuf::from("/videos/C0001M01.XML"),
        }
    }

    fn config(shift: &str) -> RenameConfig {
        RenameConfig {
            time_shift: parse_time_shift(shift).expect("valid shift"),
            ..RenameConfig::default()
        }
    }

    fn sidecar_xml(date: &str, model: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<NonRealTimeMeta><CreationDate value="{date}"/><Device manufacturer="Sony" modelName="{model}"/></NonRealTimeMeta>"#
        )
    }

    #[test]
    fn derive_builds_both_paths_from_one_base_name() {
        let plan = derive(&record(Some("XDR-200")), &config("+0s"), true).expect("derive");

        assert_eq!(plan.new_base_name, "20210601_100000 - (C0001)(XDR-200)");
        assert_eq!(plan.status, PlanStatus::Planned);
        assert_eq!(plan.data_source, PathBuf::from("/videos/C0001.MP4"));
        assert_eq!(
            plan.data_dest,
            PathBuf::from("/videos/20210601_100000 - (C0001)(XDR-200).mp4")
        );
        assert_eq!(plan.sidecar_source, PathBuf::from("/videos/C0001M01.XML"));
        assert_eq!(
            plan.sidecar_dest,
            PathBuf::from("/videos/20210601_100000 - (C0001)(XDR-200).xml")
        );
    }

    #[test]
    fn derive_applies_time_shift() {
        let plan = derive(&record(Some("XDR-200")), &config("+1h0m0s"), true).expect("derive");
        assert_eq!(plan.new_base_name, "20210601_110000 - (C0001)(XDR-200)");
        assert_eq!(plan.creation_time, record(None).creation_time);

        let plan = derive(&record(Some("XDR-200")), &config("-10h0m1s"), true).expect("derive");
        assert_eq!(plan.new_base_name, "20210531_235959 - (C0001)(XDR-200)");
    }

    #[test]
    fn derive_with_no_segments_is_prefix_only() {
        let config = RenameConfig {
            include_original_name: false,
            include_camera_name: false,
            suffix: Some(String::new()),
            ..RenameConfig::default()
        };
        let plan = derive(&record(None), &config, true).expect("derive");
        assert_eq!(plan.new_base_name, "20210601_100000 - ");
    }

    #[test]
    fn derive_fails_without_camera_model() {
        let err = derive(&record(None), &config("+0h"), true).expect_err("must fail");
        assert!(matches!(err, RecordError::MissingField { .. }));
    }

    #[test]
    fn derive_marks_missing_data() {
        let plan = derive(&record(Some("XDR-200")), &config("+0h"), false).expect("derive");
        assert_eq!(plan.status, PlanStatus::MissingData);
    }

    #[test]
    fn plan_status_serializes_as_snake_case() {
        let plan = derive(&record(Some("XDR-200")), &config("+0h"), false).expect("derive");
        let json = serde_json::to_value(&plan).expect("serialize");
        assert_eq!(json["status"], "missing_data");
    }

    #[test]
    fn collect_sidecars_matches_extension_exactly_and_sorts() {
        let temp = tempdir().expect("tempdir");
        for name in ["C0002M01.XML", "C0001M01.XML", "C0001.MP4", "done.xml"] {
            fs::write(temp.path().join(name), b"x").expect("write file");
        }
        fs::create_dir_all(temp.path().join("sub.XML")).expect("create dir");

        let mut stats = ScanStats::default();
        let found = collect_sidecars(temp.path(), &NamingConvention::default(), &mut stats)
            .expect("collect");

        assert_eq!(
            found,
            vec![
                temp.path().join("C0001M01.XML"),
                temp.path().join("C0002M01.XML")
            ]
        );
        assert_eq!(
            stats,
            ScanStats {
                scanned_files: 4,
                sidecar_files: 2,
                skipped_other: 2,
            }
        );
    }

    #[test]
    fn plan_folder_collects_per_record_problems() {
        let temp = tempdir().expect("tempdir");
        let dir = temp.path();
        fs::write(
            dir.join("C0001M01.XML"),
            sidecar_xml("2021-06-01T10:00:00+00:00", "XDR-200"),
        )
        .expect("write sidecar");
        fs::write(dir.join("C0001.MP4"), b"video").expect("write video");
        fs::write(
            dir.join("C0002M01.XML"),
            sidecar_xml("2021-06-01T11:00:00+00:00", "XDR-200"),
        )
        .expect("write sidecar");
        fs::write(dir.join("C0003M01.XML"), "<Meta/>").expect("write sidecar");

        let batch = plan_folder(dir, &RenameConfig::default()).expect("plan");

        assert_eq!(batch.plans.len(), 2);
        assert_eq!(batch.ready().count(), 1);
        assert_eq!(batch.missing_data(), 1);
        assert_eq!(batch.failures.len(), 1);
        assert_eq!(batch.failures[0].kind, FailureKind::MissingField);
        assert_eq!(
            batch.ensure_runnable(false),
            Err(BlockedRun {
                missing_data: 1,
                unusable: 1,
            })
        );
        assert_eq!(batch.ensure_runnable(true), Ok(()));
    }

    #[test]
    fn plan_folder_rejects_empty_or_missing_folder() {
        let temp = tempdir().expect("tempdir");
        let err = plan_folder(temp.path(), &RenameConfig::default()).expect_err("empty");
        assert!(err.to_string().contains("no files found"));

        let err = plan_folder(&temp.path().join("nope"), &RenameConfig::default())
            .expect_err("missing");
        assert!(err.to_string().contains("folder does not exist"));
    }
}
