use std::ffi::OsString;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use super::error::{ProbeError, ProbeResult};
use super::CommandExecutor;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FrameRate {
    pub numerator: u32,
    pub denominator: u32,
}

impl FrameRate {
    pub fn new(numerator: u32, denominator: u32) -> Self {
        Self {
            numerator,
            denominator,
        }
    }

    /// Accepts `num/den` or a bare integer.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        match raw.split_once('/') {
            Some((num, den)) => Some(Self::new(num.trim().parse().ok()?, den.trim().parse().ok()?)),
            None => Some(Self::new(raw.parse().ok()?, 1)),
        }
    }

    /// `None` when the pair does not describe a usable rate.
    pub fn fps(&self) -> Option<f64> {
        if self.denominator == 0 {
            return None;
        }
        let value = self.numerator as f64 / self.denominator as f64;
        (value.is_finite() && value > 0.0).then_some(value)
    }
}

/// `num/den`, or just `num` for whole rates; ffmpeg accepts both.
impl fmt::Display for FrameRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.denominator == 1 {
            write!(f, "{}", self.numerator)
        } else {
            write!(f, "{}/{}", self.numerator, self.denominator)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VideoStreamInfo {
    pub width: u32,
    pub height: u32,
    pub frame_rate: Option<FrameRate>,
}

/// Parses `width`, `height`, `r_frame_rate` printed positionally, one per
/// line (or comma separated).
pub fn parse_stream_probe(output: &str) -> ProbeResult<VideoStreamInfo> {
    let fields: Vec<&str> = output
        .split(|c: char| c == '\n' || c == ',')
        .map(str::trim)
        .filter(|field| !field.is_empty())
        .collect();
    let width = parse_dimension(fields.first().copied(), "width")?;
    let height = parse_dimension(fields.get(1).copied(), "height")?;
    let frame_rate = fields.get(2).and_then(|raw| FrameRate::parse(raw));
    Ok(VideoStreamInfo {
        width,
        height,
        frame_rate,
    })
}

fn parse_dimension(raw: Option<&str>, label: &str) -> ProbeResult<u32> {
    let raw = raw.ok_or_else(|| ProbeError::Parse(format!("missing {label}")))?;
    match raw.parse::<u32>() {
        Ok(value) if value > 0 => Ok(value),
        _ => Err(ProbeError::Parse(format!("invalid {label}: {raw}"))),
    }
}

pub fn parse_duration(output: &str) -> ProbeResult<f64> {
    let line = output
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .ok_or_else(|| ProbeError::Parse("missing duration".into()))?;
    match line.parse::<f64>() {
        Ok(value) if value.is_finite() && value > 0.0 => Ok(value),
        _ => Err(ProbeError::Parse(format!("invalid duration: {line}"))),
    }
}

pub struct MediaProber {
    binary: String,
    executor: Arc<dyn CommandExecutor>,
}

impl MediaProber {
    pub fn new(binary: impl Into<String>, executor: Arc<dyn CommandExecutor>) -> Self {
        Self {
            binary: binary.into(),
            executor,
        }
    }

    pub async fn probe_video(&self, path: &Path) -> ProbeResult<VideoStreamInfo> {
        let args = probe_args(
            &["-select_streams", "v:0", "-show_entries", "stream=width,height,r_frame_rate"],
            path,
        );
        let stdout = self.run(&args).await?;
        if stdout.trim().is_empty() {
            return Err(ProbeError::MissingVideoStream(path.to_path_buf()));
        }
        let info = parse_stream_probe(&stdout)?;
        debug!(path = %path.display(), width = info.width, height = info.height, rate = ?info.frame_rate, "probed video stream");
        Ok(info)
    }

    pub async fn probe_duration(&self, path: &Path) -> ProbeResult<f64> {
        let args = probe_args(&["-show_entries", "format=duration"], path);
        let stdout = self.run(&args).await?;
        parse_duration(&stdout)
    }

    async fn run(&self, args: &[OsString]) -> ProbeResult<String> {
        let output = self
            .executor
            .output(&self.binary, args)
            .await
            .map_err(|source| ProbeError::Launch {
                program: self.binary.clone(),
                source,
            })?;
        if !output.status.success() {
            return Err(ProbeError::Failed {
                program: self.binary.clone(),
                status: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

fn probe_args(selection: &[&str], path: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec!["-v".into(), "error".into()];
    args.extend(selection.iter().map(|arg| OsString::from(*arg)));
    args.push("-of".into());
    args.push("default=noprint_wrappers=1:nokey=1".into());
    args.push(path.as_os_str().to_os_string());
    args
}
