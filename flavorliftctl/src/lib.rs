use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Local};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt as log_fmt, EnvFilter};

use flavorlift_core::media::{
    composition_args, derive_profile, transcode_args, CommandExecutor, EncodingProfile,
    MediaProber, SystemCommandExecutor,
};
use flavorlift_core::preflight::{check_composition_image, locate_tools, missing_tools};
use flavorlift_core::source::{acquire_session, resolve, KalturaClient, SourcePlatform};
use flavorlift_core::{
    load_migration_config, Credential, EncodingMode, MigrationConfig, Processor, ProcessorError,
    ResolveError, ResolvedDerivative, RunSummary, SelectionPolicy, SessionError,
};

pub const SECRET_ENV: &str = "FLAVORLIFT_SECRET";

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(#[from] flavorlift_core::ConfigError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("session error: {0}")]
    Session(#[from] SessionError),
    #[error("resolve error: {0}")]
    Resolve(#[from] ResolveError),
    #[error("setup failed: {0}")]
    Setup(#[from] ProcessorError),
    #[error("required tools missing: {0}")]
    MissingTools(String),
    #[error("composition image unusable: {0}")]
    Composition(String),
    #[error("unknown asset names: {0}")]
    UnknownAssets(String),
    #[error("logging setup failed: {0}")]
    Logging(String),
    #[error("one or more checks failed")]
    CheckFailed,
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Migrates hosted video assets and re-encodes them for upload", long_about = None)]
pub struct Cli {
    /// Path to the migration config
    #[arg(long, default_value = "configs/flavorlift.toml")]
    pub config: PathBuf,
    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(long, short, default_value_t = false)]
    pub verbose: bool,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Resolve, download and transcode every configured asset
    Run(RunArgs),
    /// Verify tools, credentials and paths without touching the network
    Check,
    /// Print the derivative that would be downloaded for an entry
    Resolve(ResolveArgs),
    /// Probe a local file and print the encoding it would receive
    Profile(ProfileArgs),
}

#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Only process these local names (repeatable)
    #[arg(long = "only", value_name = "NAME")]
    pub only: Vec<String>,
}

#[derive(Args, Debug)]
pub struct ResolveArgs {
    pub entry_id: String,
}

#[derive(Args, Debug)]
pub struct ProfileArgs {
    pub file: PathBuf,
}

pub async fn run(cli: Cli) -> Result<()> {
    let mut config = load_migration_config(&cli.config)?;
    apply_secret(&mut config, std::env::var(SECRET_ENV).ok());
    // Setup failures must not leave a log file or output root behind.
    if let Commands::Run(args) = &cli.command {
        preflight_run(&config, &args.only)?;
    }

    let log_file = match cli.command {
        Commands::Run(_) => Some(log_file_path(&config.output.root, Local::now())),
        _ => None,
    };
    let _guard = init_logging(cli.verbose, log_file.as_deref())?;
    if let Some(path) = &log_file {
        info!(path = %path.display(), "logging to file");
    }

    let result = dispatch(&cli, config).await;
    if let Err(err) = &result {
        error!(error = %err, "command failed");
    }
    result
}

async fn dispatch(cli: &Cli, config: MigrationConfig) -> Result<()> {
    match &cli.command {
        Commands::Run(args) => {
            let summary = run_migration(config, &args.only).await?;
            render(&summary, cli.format)?;
        }
        Commands::Check => {
            let report = check_report(&config);
            render(&report, cli.format)?;
            if report
                .iter()
                .any(|entry| matches!(entry.status, CheckStatus::Error))
            {
                return Err(AppError::CheckFailed);
            }
        }
        Commands::Resolve(args) => {
            let resolved = resolve_entry(&config, &args.entry_id).await?;
            render(&resolved, cli.format)?;
        }
        Commands::Profile(args) => {
            let report = profile_file(&config, &args.file).await;
            render(&report, cli.format)?;
        }
    }
    Ok(())
}

/// Config, `--only` names, external tools and the composition image.
pub fn preflight_run(config: &MigrationConfig, only: &[String]) -> Result<()> {
    config.validate()?;
    ensure_known_assets(config, only)?;
    let missing = missing_tools(config);
    if !missing.is_empty() {
        let names: Vec<String> = missing
            .iter()
            .map(|tool| format!("{} ({})", tool.name, tool.program))
            .collect();
        return Err(AppError::MissingTools(names.join(", ")));
    }
    check_composition_image(config).map_err(AppError::Composition)?;
    Ok(())
}

async fn run_migration(config: MigrationConfig, only: &[String]) -> Result<RunSummary> {
    let platform: Arc<dyn SourcePlatform> = Arc::new(KalturaClient::new(&config.source)?);
    run_migration_with(config, platform, Arc::new(SystemCommandExecutor), only).await
}

/// Directories, session, then the batch. Only setup failures are returned
/// as errors; per-asset failures land in the summary.
pub async fn run_migration_with(
    config: MigrationConfig,
    platform: Arc<dyn SourcePlatform>,
    executor: Arc<dyn CommandExecutor>,
    only: &[String],
) -> Result<RunSummary> {
    let config = Arc::new(config);
    let processor =
        Processor::new(Arc::clone(&config), Arc::clone(&platform))?.with_executor(executor);
    processor.prepare_directories().await?;

    let credential = credential_for(&config)?;
    let token = acquire_session(platform.as_ref(), &credential).await?;
    info!(
        mode = config.encoding.mode.label(),
        assets = config.entries.len(),
        "starting migration"
    );
    Ok(processor.run_batch(&token, only).await)
}

async fn resolve_entry(config: &MigrationConfig, entry_id: &str) -> Result<ResolvedDerivative> {
    config.validate()?;
    let client = KalturaClient::new(&config.source)?;
    let credential = credential_for(config)?;
    let token = acquire_session(&client, &credential).await?;
    let policy = SelectionPolicy::from(&config.source);
    Ok(resolve(&client, entry_id, &token, &policy).await?)
}

fn credential_for(config: &MigrationConfig) -> Result<Credential> {
    let secret = config
        .source
        .secret
        .as_deref()
        .ok_or_else(|| SessionError::Configuration(format!("no secret; set {SECRET_ENV}")))?;
    Ok(Credential::new(config.source.partner_id.clone(), secret))
}

/// The environment fills the secret only when the file leaves it blank.
pub fn apply_secret(config: &mut MigrationConfig, from_env: Option<String>) {
    let blank = config
        .source
        .secret
        .as_deref()
        .map_or(true, |secret| secret.trim().is_empty());
    if blank {
        if let Some(secret) = from_env.filter(|secret| !secret.trim().is_empty()) {
            config.source.secret = Some(secret);
        }
    }
}

pub fn ensure_known_assets(config: &MigrationConfig, only: &[String]) -> Result<()> {
    let unknown: Vec<&str> = only
        .iter()
        .filter(|name| !config.entries.contains_key(name.as_str()))
        .map(String::as_str)
        .collect();
    if unknown.is_empty() {
        Ok(())
    } else {
        Err(AppError::UnknownAssets(unknown.join(", ")))
    }
}

pub fn log_file_path(root: &Path, now: DateTime<Local>) -> PathBuf {
    root.join(format!("migration_{}.log", now.format("%Y%m%d_%H%M%S")))
}

/// Stderr always; a plain-text file as well when `log_file` is given. The
/// returned guard flushes the file writer on drop.
pub fn init_logging(verbose: bool, log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|dir| !dir.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let name = path
                .file_name()
                .ok_or_else(|| AppError::Logging(format!("{} has no file name", path.display())))?;
            fs::create_dir_all(dir)?;
            let appender = tracing_appender::rolling::never(dir, name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = log_fmt::layer().with_ansi(false).with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(log_fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .try_init()
        .map_err(|err| AppError::Logging(err.to_string()))?;
    Ok(guard)
}

pub fn check_report(config: &MigrationConfig) -> Vec<HealthEntry> {
    let mut results = Vec::new();
    results.push(match config.validate() {
        Ok(()) => HealthEntry::ok(
            "config",
            format!(
                "{} assets, mode {}",
                config.entries.len(),
                config.encoding.mode.label()
            ),
        ),
        Err(err) => HealthEntry::error("config", err.to_string()),
    });
    for tool in locate_tools(config) {
        results.push(match &tool.path {
            Some(path) => HealthEntry::ok(tool.name, path.display().to_string()),
            None => HealthEntry::error(tool.name, format!("{} not found on PATH", tool.program)),
        });
    }
    match check_composition_image(config) {
        Ok(Some(image)) => results.push(HealthEntry::ok("composition image", image.display().to_string())),
        Ok(None) => {}
        Err(detail) => results.push(HealthEntry::error("composition image", detail)),
    }
    results.push(check_directory("output root", &config.output.root));
    results
}

fn check_directory(name: &str, path: &Path) -> HealthEntry {
    match fs::metadata(path) {
        Ok(meta) if meta.is_dir() => HealthEntry::ok(name, path.display().to_string()),
        Ok(_) => HealthEntry::error(name, format!("{} is not a directory", path.display())),
        Err(_) => HealthEntry::warn(
            name,
            format!("{} not found; created on run", path.display()),
        ),
    }
}

async fn profile_file(config: &MigrationConfig, file: &Path) -> ProfileReport {
    let prober = MediaProber::new(config.tools.ffprobe.clone(), Arc::new(SystemCommandExecutor));
    let profile = derive_profile(&config.encoding, &prober, file).await;
    let output = PathBuf::from(format!(
        "{}_{}.mp4",
        file.file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "output".into()),
        config.output.output_suffix
    ));
    let args = match profile.mode {
        EncodingMode::Composition => {
            let image = config
                .encoding
                .composition
                .image
                .clone()
                .unwrap_or_else(|| PathBuf::from("<image>"));
            let duration = prober.probe_duration(file).await.ok();
            composition_args(&profile, &image, file, duration, &output)
        }
        EncodingMode::Adaptive | EncodingMode::Fixed => transcode_args(&profile, file, &output),
    };
    ProfileReport {
        input: file.to_path_buf(),
        profile,
        program: config.tools.ffmpeg.clone(),
        args: args
            .iter()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect(),
    }
}

fn render<T>(value: &T, format: OutputFormat) -> Result<()>
where
    T: Serialize + DisplayFallback,
{
    match format {
        OutputFormat::Text => {
            println!("{}", value.display());
            Ok(())
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value)?;
            println!("{}", json);
            Ok(())
        }
    }
}

trait DisplayFallback {
    fn display(&self) -> String;
}

impl DisplayFallback for RunSummary {
    fn display(&self) -> String {
        let mut lines = vec![format!(
            "{total} assets: {ok} succeeded, {skipped} skipped, {failed} failed ({secs}s)",
            total = self.total(),
            ok = self.succeeded,
            skipped = self.skipped,
            failed = self.failed,
            secs = (self.finished_at - self.started_at).num_seconds()
        )];
        for asset in &self.assets {
            let mut line = format!(
                "  {outcome:<8} {name} ({entry})",
                outcome = asset.outcome,
                name = asset.local_name,
                entry = asset.entry_id
            );
            if let Some(detail) = &asset.detail {
                line.push_str(": ");
                line.push_str(detail);
            }
            lines.push(line);
        }
        lines.join("\n")
    }
}

impl DisplayFallback for ResolvedDerivative {
    fn display(&self) -> String {
        let mut lines = vec![
            format!("derivative: {}", self.derivative_id),
            format!("extension:  {}", self.file_ext),
        ];
        if let Some(tier) = self.flavor_params_id {
            lines.push(format!("tier:       {tier}"));
        }
        if let Some(name) = &self.original_filename {
            lines.push(format!("filename:   {name}"));
        }
        lines.push(format!("url:        {}", self.download_url));
        lines.join("\n")
    }
}

#[derive(Debug, Serialize)]
pub struct ProfileReport {
    pub input: PathBuf,
    pub profile: EncodingProfile,
    pub program: String,
    pub args: Vec<String>,
}

impl DisplayFallback for ProfileReport {
    fn display(&self) -> String {
        let profile = &self.profile;
        let frame = match profile.scale.dimensions() {
            Some((width, height)) => format!("{width}x{height}"),
            None => "source".to_string(),
        };
        let mut lines = vec![format!("input: {}", self.input.display())];
        if let Some(source) = &profile.source {
            lines.push(format!("source: {}x{}", source.width, source.height));
        }
        lines.push(format!(
            "mode: {mode}, frame: {frame}, fps: {fps}, keyframes: {gop}",
            mode = profile.mode.label(),
            fps = profile.rate_arg(),
            gop = profile.keyframe_interval
        ));
        lines.push(format!("{} {}", self.program, self.args.join(" ")));
        lines.join("\n")
    }
}

impl DisplayFallback for Vec<HealthEntry> {
    fn display(&self) -> String {
        self.iter()
            .map(HealthEntry::display)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Debug, Serialize)]
pub struct HealthEntry {
    pub name: String,
    pub status: CheckStatus,
    pub detail: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Ok,
    Warn,
    Error,
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            CheckStatus::Ok => "OK",
            CheckStatus::Warn => "WARN",
            CheckStatus::Error => "ERROR",
        };
        write!(f, "{}", label)
    }
}

impl HealthEntry {
    fn new(name: impl Into<String>, status: CheckStatus, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status,
            detail: detail.into(),
        }
    }

    fn ok(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(name, CheckStatus::Ok, detail)
    }

    fn warn(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(name, CheckStatus::Warn, detail)
    }

    fn error(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(name, CheckStatus::Error, detail)
    }
}

impl DisplayFallback for HealthEntry {
    fn display(&self) -> String {
        format!(
            "[{status}] {name}: {detail}",
            status = self.status,
            name = self.name,
            detail = self.detail
        )
    }
}
