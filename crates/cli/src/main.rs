use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use std::fs;
use std::io::{self, BufRead};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;
use video_renamer_core::{
    app_paths, execute_batch, load_config, parse_time_shift, plan_folder, save_config,
    AppConfig, BatchPlan, PlanStatus, RenameConfig,
};

#[derive(Debug, Parser)]
#[command(name = "video-renamer", version)]
#[command(about = "Rename video clips and their XML sidecars after the recorded creation time")]
#[command(
    after_help = "Example: video-renamer rename -d -s=_MySuffix -o=false -f ~/MyVideos"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Rename every clip/sidecar pair in a folder.
    Rename(RenameArgs),
    /// Inspect or create the configuration file.
    Config(ConfigArgs),
}

#[derive(Debug, Args)]
struct ConfigArgs {
    #[command(subcommand)]
    action: ConfigAction,
}

#[derive(Debug, Subcommand)]
enum ConfigAction {
    Show,
    /// Write the default configuration file if none exists.
    Init,
}

#[derive(Debug, Args)]
struct RenameArgs {
    /// Folder holding the clips and their sidecars.
    #[arg(short = 'f', long, default_value = ".")]
    folder: PathBuf,
    /// Appended verbatim to the new file name.
    #[arg(short = 's', long)]
    suffix: Option<String>,
    /// Time correction, e.g. +0h1m2s or -1h.
    #[arg(short = 't', long, default_value = "+0h", allow_hyphen_values = true)]
    time_shift: String,
    /// Print what would happen without renaming anything.
    #[arg(short = 'd', long, default_value_t = false)]
    dry_run: bool,
    /// Skip clips whose video file or metadata is missing instead of aborting.
    #[arg(short = 'i', long, default_value_t = false)]
    ignore_missing: bool,
    /// Add the original file name, e.g. (C0001).
    #[arg(
        short = 'o',
        long,
        action = ArgAction::Set,
        value_name = "BOOL",
        num_args = 0..=1,
        default_missing_value = "true"
    )]
    original: Option<bool>,
    /// Add the camera model, e.g. (XDR-200).
    #[arg(
        short = 'c',
        long,
        action = ArgAction::Set,
        value_name = "BOOL",
        num_args = 0..=1,
        default_missing_value = "true"
    )]
    camera: Option<bool>,
    /// More logging.
    #[arg(short = 'v', long, default_value_t = false)]
    verbose: bool,
    /// Do not ask for confirmation.
    #[arg(long, default_value_t = false)]
    yes: bool,
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    output: OutputFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Rename(args) => {
            init_tracing(args.verbose);
            cmd_rename(args)
        }
        Commands::Config(config) => match config.action {
            ConfigAction::Show => cmd_config_show(),
            ConfigAction::Init => cmd_config_init(),
        },
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(io::stderr)
        .try_init();
}

fn cmd_rename(args: RenameArgs) -> Result<()> {
    if args.folder.as_os_str().is_empty() {
        anyhow::bail!("missing mandatory argument: --folder");
    }
    let app_config = load_config()?;
    let config = rename_config(&args, &app_config)?;

    let folder = fs::canonicalize(&args.folder)
        .with_context(|| format!("cannot resolve folder: {}", args.folder.display()))?;
    log_configuration(&folder, &config);

    let batch = plan_folder(&folder, &config)?;
    match args.output {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&batch)?),
        OutputFormat::Table => print_table(&batch),
    }
    batch.ensure_runnable(config.ignore_missing)?;

    if !config.dry_run && !args.yes {
        info!("Do you want to continue? [y/N]");
        let stdin = io::stdin();
        if !confirm(stdin.lock())? {
            anyhow::bail!("aborted, nothing was renamed");
        }
    }

    let summary = execute_batch(&batch, &config)?;
    info!("{}", summary);
    if summary.failed_renames > 0 {
        anyhow::bail!("{} clip(s) could not be renamed", summary.failed_renames);
    }
    Ok(())
}

fn rename_config(args: &RenameArgs, app_config: &AppConfig) -> Result<RenameConfig> {
    Ok(RenameConfig {
        time_shift: parse_time_shift(&args.time_shift)?,
        include_original_name: args.original.unwrap_or(app_config.include_original_default),
        include_camera_name: args.camera.unwrap_or(app_config.include_camera_default),
        suffix: args.suffix.clone().filter(|s| !s.is_empty()),
        dry_run: args.dry_run,
        ignore_missing: args.ignore_missing,
        naming: app_config.naming.clone(),
    })
}

fn log_configuration(folder: &Path, config: &RenameConfig) {
    info!("Version {}", env!("CARGO_PKG_VERSION"));
    info!("Configuration:");
    info!(" * Folder: {}", folder.display());
    if config.dry_run {
        info!(" * Doing a dry run");
    }
    if config.include_original_name {
        info!(" * Adding original file name");
    }
    if config.include_camera_name {
        info!(" * Adding camera name");
    }
    if let Some(suffix) = &config.suffix {
        info!(" * Adding suffix {} to filename", suffix);
    }
    info!(" * Time shift: {}", config.time_shift);
}

/// Anything but a `y` line means no.
fn confirm(mut input: impl BufRead) -> Result<bool> {
    let mut line = String::new();
    input
        .read_line(&mut line)
        .context("cannot read confirmation")?;
    Ok(line.trim().eq_ignore_ascii_case("y"))
}

fn cmd_config_show() -> Result<()> {
    let config = load_config()?;
    let paths = app_paths()?;
    println!("config file: {}", paths.config_path.display());
    println!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

fn cmd_config_init() -> Result<()> {
    let paths = app_paths()?;
    if paths.config_path.exists() {
        println!("config file already exists: {}", paths.config_path.display());
        return Ok(());
    }
    let path = save_config(&AppConfig::default())?;
    println!("wrote {}", path.display());
    Ok(())
}

fn print_table(batch: &BatchPlan) {
    println!("source -> destination");
    for plan in batch.ready() {
        println!(
            "{} -> {}",
            plan.data_source.display(),
            plan.data_dest.display()
        );
        println!(
            "{} -> {}",
            plan.sidecar_source.display(),
            plan.sidecar_dest.display()
        );
    }
    for plan in batch
        .plans
        .iter()
        .filter(|p| p.status == PlanStatus::MissingData)
    {
        println!("{} -> (missing data file)", plan.data_source.display());
    }
    for failure in &batch.failures {
        println!("{} -> ({:?}) {}", failure.sidecar.display(), failure.kind, failure.message);
    }

    println!(
        "\nsummary: scanned={} sidecars={} other={} ready={} missing_data={} unusable={}",
        batch.stats.scanned_files,
        batch.stats.sidecar_files,
        batch.stats.skipped_other,
        batch.ready().count(),
        batch.missing_data(),
        batch.failures.len()
    );
}
