use crate::naming::NameSegments;
use crate::time_shift::TimeShift;
use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Vendor file naming: `C0001M01.XML` describes `C0001.MP4`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NamingConvention {
    /// Removed once from the sidecar stem to get the clip's base name.
    pub strip_token: String,
    /// Extension of the clip on disk, without the dot. Matched exactly.
    pub data_extension: String,
    /// Extension of the sidecars to pick up, without the dot. Matched exactly,
    /// so sidecars already renamed to lowercase are left alone.
    pub sidecar_extension: String,
}

impl Default for NamingConvention {
    fn default() -> Self {
        Self {
            strip_token: "M01".to_string(),
            data_extension: "MP4".to_string(),
            sidecar_extension: "XML".to_string(),
        }
    }
}

/// Persistent defaults read from `config.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub include_original_default: bool,
    pub include_camera_default: bool,
    pub naming: NamingConvention,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            include_original_default: true,
            include_camera_default: true,
            naming: NamingConvention::default(),
        }
    }
}

/// Settings for one run, fixed before the folder is scanned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenameConfig {
    pub time_shift: TimeShift,
    pub include_original_name: bool,
    pub include_camera_name: bool,
    pub suffix: Option<String>,
    pub dry_run: bool,
    pub ignore_missing: bool,
    pub naming: NamingConvention,
}

impl Default for RenameConfig {
    fn default() -> Self {
        Self {
            time_shift: TimeShift::default(),
            include_original_name: true,
            include_camera_name: true,
            suffix: None,
            dry_run: false,
            ignore_missing: false,
            naming: NamingConvention::default(),
        }
    }
}

impl RenameConfig {
    pub fn name_segments(&self) -> NameSegments<'_> {
        NameSegments {
            include_original_name: self.include_original_name,
            include_camera_name: self.include_camera_name,
            suffix: self.suffix.as_deref(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppPaths {
    pub config_dir: PathBuf,
    pub config_path: PathBuf,
}

pub fn app_paths() -> Result<AppPaths> {
    let proj = ProjectDirs::from("com", "video-renamer", "video-renamer")
        .context("cannot resolve the OS configuration directory")?;
    let config_dir = proj.config_dir().to_path_buf();
    Ok(AppPaths {
        config_path: config_dir.join("config.toml"),
        config_dir,
    })
}

pub fn load_config() -> Result<AppConfig> {
    let paths = app_paths()?;
    load_config_from(&paths.config_path)
}

pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    if !path.exists() {
        return Ok(AppConfig::default());
    }

    let raw = fs::read_to_string(path)
        .with_context(|| format!("cannot read config file: {}", path.display()))?;

    let config = toml::from_str::<AppConfig>(&raw)
        .with_context(|| format!("cannot parse config file: {}", path.display()))?;
    Ok(config)
}

pub fn save_config(config: &AppConfig) -> Result<PathBuf> {
    let paths = app_paths()?;
    save_config_to(config, &paths.config_path)?;
    Ok(paths.config_path)
}

pub fn save_config_to(config: &AppConfig, path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)
            .with_context(|| format!("cannot create config directory: {}", dir.display()))?;
    }
    let body = toml::to_string_pretty(config).context("cannot serialize config")?;
    fs::write(path, body)
        .with_context(|| format!("cannot write config file: {}", path.display()))?;
    Ok(())
}
