mod apply;
mod config;
mod metadata;
mod naming;
mod planner;
mod sanitize;
mod sidecar_reader;
mod time_shift;

pub use apply::{execute_batch, RunSummary};
pub use config::{
    app_paths, load_config, load_config_from, save_config, save_config_to, AppConfig, AppPaths,
    NamingConvention, RenameConfig,
};
pub use metadata::{clean_base_name, MetadataRecord, RecordError};
pub use naming::{render_base_name, timestamp_prefix, NameSegments};
pub use planner::{
    collect_sidecars, derive, plan_folder, BatchPlan, BlockedRun, FailureKind, PlanStatus,
    RecordFailure, RenamePlan, ScanStats,
};
pub use sidecar_reader::{parse_sidecar, read_sidecar};
pub use time_shift::{parse_duration, parse_time_shift, Sign, TimeShift, TimeShiftError};
