use crate::config::RenameConfig;
use crate::planner::{BatchPlan, FailureKind, PlanStatus, RecordFailure, RenamePlan};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Counters for one run, returned instead of kept in globals.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub dry_run: bool,
    pub planned_records: usize,
    pub renamed_files: usize,
    pub missing_data: usize,
    pub missing_fields: usize,
    pub invalid_metadata: usize,
    pub unreadable: usize,
    pub failed_renames: usize,
    pub failures: Vec<RecordFailure>,
}

impl RunSummary {
    fn record(&mut self, failure: RecordFailure) {
        match failure.kind {
            FailureKind::Unreadable => self.unreadable += 1,
            FailureKind::MissingField => self.missing_fields += 1,
            FailureKind::InvalidMetadata => self.invalid_metadata += 1,
            FailureKind::MissingData => self.missing_data += 1,
            FailureKind::RenameFailed => self.failed_renames += 1,
        }
        self.failures.push(failure);
    }

    /// Records that were skipped for any reason.
    pub fn skipped(&self) -> usize {
        self.failures.len()
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.dry_run {
            write!(
                f,
                "dry run: would rename {} clips ({} files)",
                self.planned_records,
                self.planned_records * 2
            )?;
        } else {
            write!(f, "renamed {} files", self.renamed_files)?;
        }
        if self.skipped() > 0 {
            write!(
                f,
                " but failed to rename {} clips ({} missing data, {} missing field, {} invalid, {} unreadable, {} rename errors)",
                self.skipped(),
                self.missing_data,
                self.missing_fields,
                self.invalid_metadata,
                self.unreadable,
                self.failed_renames
            )?;
        }
        Ok(())
    }
}

/// Renames every ready clip in the batch, data file first, then its sidecar.
///
/// Refuses to start when planning found problems and `ignore_missing` is off.
/// Once renaming has started, a failed rename skips the rest of that clip and
/// moves on to the next one.
pub fn execute_batch(batch: &BatchPlan, config: &RenameConfig) -> Result<RunSummary> {
    batch.ensure_runnable(config.ignore_missing)?;

    let mut summary = RunSummary {
        dry_run: config.dry_run,
        ..RunSummary::default()
    };
    for failure in &batch.failures {
        summary.record(failure.clone());
    }

    let mut claimed = HashSet::<PathBuf>::new();
    for plan in &batch.plans {
        if plan.status == PlanStatus::MissingData {
            summary.record(RecordFailure {
                sidecar: plan.sidecar_source.clone(),
                kind: FailureKind::MissingData,
                message: format!("file {} not found", plan.data_source.display()),
            });
            continue;
        }

        if let Err(reason) = claim_targets(plan, &mut claimed) {
            warn!("{}: {}", plan.original_base_name, reason);
            summary.record(rename_failure(plan, reason));
            continue;
        }
        summary.planned_records += 1;

        info!(
            "{}: renaming\n    {} to\n    {}",
            plan.original_base_name,
            plan.data_source.display(),
            plan.data_dest.display()
        );
        info!(
            "{}: renaming\n    {} to\n    {}",
            plan.original_base_name,
            plan.sidecar_source.display(),
            plan.sidecar_dest.display()
        );
        if config.dry_run {
            continue;
        }

        if let Err(err) = rename_file(&plan.data_source, &plan.data_dest) {
            warn!("{}: {}", plan.original_base_name, err);
            summary.record(rename_failure(plan, err));
            continue;
        }
        summary.renamed_files += 1;

        if let Err(err) = rename_file(&plan.sidecar_source, &plan.sidecar_dest) {
            warn!("{}: {}", plan.original_base_name, err);
            summary.record(rename_failure(plan, err));
            continue;
        }
        summary.renamed_files += 1;
    }

    Ok(summary)
}

/// Destinations must be new files and unique within the batch.
fn claim_targets(plan: &RenamePlan, claimed: &mut HashSet<PathBuf>) -> Result<(), String> {
    for (source, target) in [
        (&plan.data_source, &plan.data_dest),
        (&plan.sidecar_source, &plan.sidecar_dest),
    ] {
        if claimed.contains(target) {
            return Err(format!(
                "target {} is already used by another clip",
                target.display()
            ));
        }
        if target != source && target.exists() {
            return Err(format!("target {} already exists", target.display()));
        }
    }
    claimed.insert(plan.data_dest.clone());
    claimed.insert(plan.sidecar_dest.clone());
    Ok(())
}

fn rename_file(from: &Path, to: &Path) -> Result<(), String> {
    fs::rename(from, to)
        .map_err(|err| format!("cannot rename {} to {}: {err}", from.display(), to.display()))
}

fn rename_failure(plan: &RenamePlan, message: String) -> RecordFailure {
    RecordFailure {
        sidecar: plan.sidecar_source.clone(),
        kind: FailureKind::RenameFailed,
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::{BlockedRun, ScanStats};
    use chrono::DateTime;
    use tempfile::tempdir;

    fn plan(dir: &Path, stem: &str, new_base: &str, status: PlanStatus) -> RenamePlan {
        let time = DateTime::parse_from_rfc3339("2021-06-01T10:00:00+00:00").expect("valid");
        RenamePlan {
            original_base_name: stem.to_string(),
            new_base_name: new_base.to_string(),
            creation_time: time,
            adjusted_time: time,
            sidecar_source: dir.join(format!("{stem}M01.XML")),
            sidecar_dest: dir.join(format!("{new_base}.xml")),
            data_source: dir.join(format!("{stem}.MP4")),
            data_dest: dir.join(format!("{new_base}.mp4")),
            status,
        }
    }

    fn batch(dir: &Path, plans: Vec<RenamePlan>) -> BatchPlan {
        BatchPlan {
            folder: dir.to_path_buf(),
            plans,
            failures: Vec::new(),
            stats: ScanStats::default(),
        }
    }

    fn write_pair(dir: &Path, stem: &str) {
        fs::write(dir.join(format!("{stem}.MP4")), b"video").expect("write video");
        fs::write(dir.join(format!("{stem}M01.XML")), b"<Meta/>").expect("write sidecar");
    }

    #[test]
    fn execute_renames_data_and_sidecar() {
        let temp = tempdir().expect("tempdir");
        let dir = temp.path();
        write_pair(dir, "C0001");

        let batch = batch(dir, vec![plan(dir, "C0001", "NEW", PlanStatus::Planned)]);
        let summary = execute_batch(&batch, &RenameConfig::default()).expect("execute");

        assert_eq!(summary.renamed_files, 2);
        assert_eq!(summary.skipped(), 0);
        assert!(dir.join("NEW.mp4").exists());
        assert!(dir.join("NEW.xml").exists());
        assert!(!dir.join("C0001.MP4").exists());
        assert_eq!(summary.to_string(), "renamed 2 files");
    }

    #[test]
    fn dry_run_touches_nothing() {
        let temp = tempdir().expect("tempdir");
        let dir = temp.path();
        write_pair(dir, "C0001");

        let config = RenameConfig {
            dry_run: true,
            ..RenameConfig::default()
        };
        let batch = batch(dir, vec![plan(dir, "C0001", "NEW", PlanStatus::Planned)]);
        let summary = execute_batch(&batch, &config).expect("execute");

        assert_eq!(summary.renamed_files, 0);
        assert_eq!(summary.planned_records, 1);
        assert!(dir.join("C0001.MP4").exists());
        assert!(!dir.join("NEW.mp4").exists());
    }

    #[test]
    fn missing_data_blocks_run_unless_ignored() {
        let temp = tempdir().expect("tempdir");
        let dir = temp.path();
        write_pair(dir, "C0002");
        fs::write(dir.join("C0001M01.XML"), b"<Meta/>").expect("write sidecar");

        let batch = batch(
            dir,
            vec![
                plan(dir, "C0001", "FIRST", PlanStatus::MissingData),
                plan(dir, "C0002", "SECOND", PlanStatus::Planned),
            ],
        );

        let err = execute_batch(&batch, &RenameConfig::default()).expect_err("must block");
        assert!(err.downcast_ref::<BlockedRun>().is_some());
        assert!(dir.join("C0002.MP4").exists(), "nothing may be renamed");

        let config = RenameConfig {
            ignore_missing: true,
            ..RenameConfig::default()
        };
        let summary = execute_batch(&batch, &config).expect("execute");
        assert_eq!(summary.missing_data, 1);
        assert_eq!(summary.renamed_files, 2);
        assert!(dir.join("SECOND.mp4").exists());
        assert!(summary
            .to_string()
            .starts_with("renamed 2 files but failed to rename 1 clips"));
    }

    #[test]
    fn failed_data_rename_skips_sidecar_and_continues() {
        let temp = tempdir().expect("tempdir");
        let dir = temp.path();
        fs::write(dir.join("C0001M01.XML"), b"<Meta/>").expect("write sidecar");
        write_pair(dir, "C0002");

        // C0001.MP4 vanished between planning and execution.
        let batch = batch(
            dir,
            vec![
                plan(dir, "C0001", "FIRST", PlanStatus::Planned),
                plan(dir, "C0002", "SECOND", PlanStatus::Planned),
            ],
        );
        let summary = execute_batch(&batch, &RenameConfig::default()).expect("execute");

        assert_eq!(summary.failed_renames, 1);
        assert_eq!(summary.renamed_files, 2);
        assert!(dir.join("C0001M01.XML").exists(), "sidecar must stay put");
        assert!(!dir.join("FIRST.xml").exists());
        assert!(dir.join("SECOND.xml").exists());
    }

    #[test]
    fn existing_or_duplicate_targets_are_refused() {
        let temp = tempdir().expect("tempdir");
        let dir = temp.path();
        write_pair(dir, "C0001");
        write_pair(dir, "C0002");
        write_pair(dir, "C0003");
        fs::write(dir.join("TAKEN.mp4"), b"other").expect("write blocker");

        let batch = batch(
            dir,
            vec![
                plan(dir, "C0001", "SAME", PlanStatus::Planned),
                plan(dir, "C0002", "SAME", PlanStatus::Planned),
                plan(dir, "C0003", "TAKEN", PlanStatus::Planned),
            ],
        );
        let summary = execute_batch(&batch, &RenameConfig::default()).expect("execute");

        assert_eq!(summary.renamed_files, 2);
        assert_eq!(summary.failed_renames, 2);
        assert!(dir.join("C0002.MP4").exists());
        assert!(dir.join("C0003.MP4").exists());
        assert_eq!(fs::read(dir.join("TAKEN.mp4")).expect("read"), b"other");
    }
}
