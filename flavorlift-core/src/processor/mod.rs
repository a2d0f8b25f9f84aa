mod error;
mod types;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::StreamExt;
use reqwest::Client;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::{EncodingMode, MigrationConfig};
use crate::media::{
    composition_args, derive_profile, transcode_args, CommandExecutor, EncodingProfile,
    MediaProber, SystemCommandExecutor, Transcoder,
};
use crate::source::{resolve, SelectionPolicy, SessionToken, SourcePlatform};

pub use error::{ProcessorError, ProcessorResult};
pub use types::{AssetPaths, AssetReport, Outcome, RunSummary};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Runs resolve -> download -> transcode for each configured asset.
#[derive(Clone)]
pub struct Processor {
    config: Arc<MigrationConfig>,
    platform: Arc<dyn SourcePlatform>,
    http_client: Client,
    policy: SelectionPolicy,
    prober: Arc<MediaProber>,
    transcoder: Arc<Transcoder>,
}

impl Processor {
    pub fn new(
        config: Arc<MigrationConfig>,
        platform: Arc<dyn SourcePlatform>,
    ) -> ProcessorResult<Self> {
        let http_client = Client::builder()
            .user_agent(config.source.user_agent.clone())
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|err| ProcessorError::Network(err.to_string()))?;
        let policy = SelectionPolicy::from(&config.source);
        let executor: Arc<dyn CommandExecutor> = Arc::new(SystemCommandExecutor);
        Ok(Self {
            prober: Arc::new(MediaProber::new(
                config.tools.ffprobe.clone(),
                Arc::clone(&executor),
            )),
            transcoder: Arc::new(Transcoder::new(config.tools.ffmpeg.clone(), executor)),
            config,
            platform,
            http_client,
            policy,
        })
    }

    pub fn with_executor(mut self, executor: Arc<dyn CommandExecutor>) -> Self {
        self.prober = Arc::new(MediaProber::new(
            self.config.tools.ffprobe.clone(),
            Arc::clone(&executor),
        ));
        self.transcoder = Arc::new(Transcoder::new(self.config.tools.ffmpeg.clone(), executor));
        self
    }

    pub fn paths_for(&self, local_name: &str) -> AssetPaths {
        AssetPaths::new(&self.config, local_name)
    }

    /// Creates the originals and transcoded directories.
    pub async fn prepare_directories(&self) -> ProcessorResult<()> {
        for dir in [self.config.originals_dir(), self.config.transcoded_dir()] {
            fs::create_dir_all(&dir)
                .await
                .map_err(|source| ProcessorError::Io { path: dir, source })?;
        }
        Ok(())
    }

    /// Processes every mapping, or only the names in `only` when non-empty.
    pub async fn run_batch(&self, token: &SessionToken, only: &[String]) -> RunSummary {
        let started_at = Utc::now();
        let mut assets = Vec::new();
        for (local_name, entry_id) in &self.config.entries {
            if !only.is_empty() && !only.iter().any(|name| name == local_name) {
                continue;
            }
            info!(asset = %local_name, entry_id = %entry_id, "processing asset");
            let outcome = self.process(local_name, entry_id, token).await;
            assets.push(AssetReport::new(local_name, entry_id, &outcome));
        }
        let summary = RunSummary::new(started_at, assets);
        info!(
            total = summary.total(),
            succeeded = summary.succeeded,
            skipped = summary.skipped,
            failed = summary.failed,
            "batch finished"
        );
        summary
    }

    pub async fn process(&self, local_name: &str, entry_id: &str, token: &SessionToken) -> Outcome {
        match self.try_process(local_name, entry_id, token).await {
            Ok(outcome) => {
                info!(asset = local_name, outcome = outcome.label(), "asset finished");
                outcome
            }
            Err(err) => {
                warn!(asset = local_name, entry_id, kind = err.kind(), error = %err, "asset failed; continuing");
                Outcome::Failed(err)
            }
        }
    }

    async fn try_process(
        &self,
        local_name: &str,
        entry_id: &str,
        token: &SessionToken,
    ) -> ProcessorResult<Outcome> {
        let paths = self.paths_for(local_name);
        if has_content(&paths.output).await {
            debug!(path = %paths.output.display(), "output already present");
            return Ok(Outcome::Skipped("output already present".into()));
        }
        self.ensure_original(entry_id, token, &paths).await?;
        let profile = derive_profile(&self.config.encoding, &self.prober, &paths.original).await;
        self.transcode(&paths, &profile).await?;
        Ok(Outcome::Success)
    }

    async fn ensure_original(
        &self,
        entry_id: &str,
        token: &SessionToken,
        paths: &AssetPaths,
    ) -> ProcessorResult<()> {
        if has_content(&paths.original).await {
            debug!(path = %paths.original.display(), "original already downloaded");
            return Ok(());
        }
        // An empty leftover from an interrupted run counts as missing.
        remove_if_exists(&paths.original).await?;
        let resolved = resolve(self.platform.as_ref(), entry_id, token, &self.policy).await?;
        info!(
            entry_id,
            derivative_id = %resolved.derivative_id,
            original_filename = ?resolved.original_filename,
            "downloading original"
        );
        if let Err(err) = self
            .fetch_to_file(&resolved.download_url, &paths.original_part)
            .await
        {
            discard(&paths.original_part).await;
            return Err(err);
        }
        if !has_content(&paths.original_part).await {
            discard(&paths.original_part).await;
            return Err(ProcessorError::Download(format!(
                "empty download for entry {entry_id}"
            )));
        }
        fs::rename(&paths.original_part, &paths.original)
            .await
            .map_err(|source| ProcessorError::Io {
                path: paths.original.clone(),
                source,
            })?;
        Ok(())
    }

    async fn transcode(&self, paths: &AssetPaths, profile: &EncodingProfile) -> ProcessorResult<()> {
        remove_if_exists(&paths.output_partial).await?;
        let args = match profile.mode {
            EncodingMode::Composition => {
                let image = self.composition_image().await?;
                let duration = match self.prober.probe_duration(&paths.original).await {
                    Ok(seconds) => Some(seconds),
                    Err(err) => {
                        warn!(path = %paths.original.display(), error = %err, "audio duration unknown; ending with shortest stream");
                        None
                    }
                };
                composition_args(
                    profile,
                    &image,
                    &paths.original,
                    duration,
                    &paths.output_partial,
                )
            }
            EncodingMode::Adaptive | EncodingMode::Fixed => {
                transcode_args(profile, &paths.original, &paths.output_partial)
            }
        };
        info!(
            output = %paths.output.display(),
            mode = profile.mode.label(),
            dimensions = ?profile.scale.dimensions(),
            frame_rate = profile.frame_rate,
            keyframe_interval = profile.keyframe_interval,
            "transcoding"
        );
        if let Err(err) = self.transcoder.run(&args).await {
            discard(&paths.output_partial).await;
            return Err(err.into());
        }
        if !has_content(&paths.output_partial).await {
            discard(&paths.output_partial).await;
            return Err(ProcessorError::MissingOutput(paths.output_partial.clone()));
        }
        fs::rename(&paths.output_partial, &paths.output)
            .await
            .map_err(|source| ProcessorError::Io {
                path: paths.output.clone(),
                source,
            })
    }

    async fn composition_image(&self) -> ProcessorResult<PathBuf> {
        let image = self
            .config
            .encoding
            .composition
            .image
            .clone()
            .ok_or_else(|| ProcessorError::Composition("no image configured".into()))?;
        if !has_content(&image).await {
            return Err(ProcessorError::Composition(format!(
                "{} is missing or empty",
                image.display()
            )));
        }
        Ok(image)
    }

    async fn fetch_to_file(&self, url: &str, path: &Path) -> ProcessorResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|source| ProcessorError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }
        if let Ok(parsed) = Url::parse(url) {
            if parsed.scheme() == "file" {
                let source_path = parsed
                    .to_file_path()
                    .map_err(|_| ProcessorError::Download("invalid file url".into()))?;
                return self.copy_file(&source_path, path).await;
            }
        }
        let response = self.http_client.get(url).send().await?.error_for_status()?;
        let mut stream = response.bytes_stream();
        let mut file = fs::File::create(path)
            .await
            .map_err(|source| ProcessorError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        let mut written = 0u64;
        while let Some(chunk) = stream.next().await {
            let data = chunk?;
            written += data.len() as u64;
            file.write_all(&data)
                .await
                .map_err(|source| ProcessorError::Io {
                    path: path.to_path_buf(),
                    source,
                })?;
        }
        file.flush().await.map_err(|source| ProcessorError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), bytes = written, "download complete");
        Ok(())
    }

    async fn copy_file(&self, from: &Path, to: &Path) -> ProcessorResult<()> {
        fs::copy(from, to)
            .await
            .map(|_| ())
            .map_err(|err| ProcessorError::Download(format!("{}: {err}", from.display())))
    }
}

async fn has_content(path: &Path) -> bool {
    match fs::metadata(path).await {
        Ok(meta) => meta.is_file() && meta.len() > 0,
        Err(_) => false,
    }
}

async fn remove_if_exists(path: &Path) -> ProcessorResult<()> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(ProcessorError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Best-effort cleanup on a path that is already failing.
async fn discard(path: &Path) {
    if let Err(err) = remove_if_exists(path).await {
        warn!(path = %path.display(), error = %err, "failed to remove partial file");
    }
}
