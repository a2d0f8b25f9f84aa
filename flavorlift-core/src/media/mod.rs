mod error;
mod probe;
mod profile;
mod transcode;

use std::ffi::OsString;
use std::path::Path;
use std::process::{Output, Stdio};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::warn;

use crate::config::{EncodingMode, EncodingSection};

pub use error::{ProbeError, ProbeResult, TranscodeError};
pub use probe::{parse_duration, parse_stream_probe, FrameRate, MediaProber, VideoStreamInfo};
pub use profile::{
    compute_scale, format_frame_rate, keyframe_interval, resolve_frame_rate, EncodingProfile,
    ScaleMode,
};
pub use transcode::{composition_args, transcode_args, Transcoder};

/// Runs external media tools. Swapped out in tests.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn output(&self, program: &str, args: &[OsString]) -> std::io::Result<Output>;
}

pub struct SystemCommandExecutor;

#[async_trait]
impl CommandExecutor for SystemCommandExecutor {
    async fn output(&self, program: &str, args: &[OsString]) -> std::io::Result<Output> {
        Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
    }
}

/// Adaptive mode derives settings from the probed source and drops back to
/// the fixed constants when the probe fails.
pub async fn derive_profile(
    encoding: &EncodingSection,
    prober: &MediaProber,
    source: &Path,
) -> EncodingProfile {
    match encoding.mode {
        EncodingMode::Adaptive => match prober.probe_video(source).await {
            Ok(info) => EncodingProfile::adaptive(encoding, &info),
            Err(err) => {
                warn!(path = %source.display(), error = %err, "probe failed; using fixed encoding constants");
                EncodingProfile::fixed(encoding)
            }
        },
        EncodingMode::Fixed | EncodingMode::Composition => EncodingProfile::fixed(encoding),
    }
}
