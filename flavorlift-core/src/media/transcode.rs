use std::ffi::OsString;
use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use super::error::TranscodeError;
use super::profile::EncodingProfile;
use super::CommandExecutor;

const STDERR_TAIL_LINES: usize = 5;

/// ffmpeg arguments for re-encoding a downloaded video.
pub fn transcode_args(profile: &EncodingProfile, input: &Path, output: &Path) -> Vec<OsString> {
    let mut args = leading_args();
    args.push("-i".into());
    args.push(input.as_os_str().to_os_string());
    push_video_settings(&mut args, profile, false);
    push_audio_settings(&mut args, profile);
    push_trailer(&mut args, output);
    args
}

/// ffmpeg arguments pairing a looping still image with an audio-only source.
/// The output runs for `duration` seconds, or until the audio ends when the
/// duration is unknown.
pub fn composition_args(
    profile: &EncodingProfile,
    image: &Path,
    audio: &Path,
    duration: Option<f64>,
    output: &Path,
) -> Vec<OsString> {
    let mut args = leading_args();
    args.push("-loop".into());
    args.push("1".into());
    args.push("-framerate".into());
    args.push(profile.rate_arg().into());
    args.push("-i".into());
    args.push(image.as_os_str().to_os_string());
    args.push("-i".into());
    args.push(audio.as_os_str().to_os_string());
    args.push("-map".into());
    args.push("0:v:0".into());
    args.push("-map".into());
    args.push("1:a:0".into());
    push_video_settings(&mut args, profile, true);
    push_audio_settings(&mut args, profile);
    match duration {
        Some(seconds) => {
            args.push("-t".into());
            args.push(format!("{seconds:.3}").into());
        }
        None => args.push("-shortest".into()),
    }
    push_trailer(&mut args, output);
    args
}

fn leading_args() -> Vec<OsString> {
    ["-hide_banner", "-nostdin", "-y"]
        .iter()
        .map(|arg| OsString::from(*arg))
        .collect()
}

fn push_video_settings(args: &mut Vec<OsString>, profile: &EncodingProfile, still_image: bool) {
    args.push("-c:v".into());
    args.push(profile.video_codec.clone().into());
    if still_image && profile.video_codec == "libx264" {
        args.push("-tune".into());
        args.push("stillimage".into());
    }
    args.push("-crf".into());
    args.push(profile.crf.to_string().into());
    args.push("-preset".into());
    args.push(profile.preset.clone().into());
    args.push("-pix_fmt".into());
    args.push(profile.pix_fmt.clone().into());
    if let Some(filter) = profile.scale.filter() {
        args.push("-vf".into());
        args.push(filter.into());
    }
    args.push("-r".into());
    args.push(profile.rate_arg().into());
    args.push("-g".into());
    args.push(profile.keyframe_interval.to_string().into());
    args.push("-keyint_min".into());
    args.push(profile.keyframe_interval.to_string().into());
}

fn push_audio_settings(args: &mut Vec<OsString>, profile: &EncodingProfile) {
    args.push("-c:a".into());
    args.push(profile.audio_codec.clone().into());
    args.push("-b:a".into());
    args.push(profile.audio_bitrate.clone().into());
    args.push("-ar".into());
    args.push(profile.audio_sample_rate.to_string().into());
}

fn push_trailer(args: &mut Vec<OsString>, output: &Path) {
    args.push("-movflags".into());
    args.push("+faststart".into());
    args.push(output.as_os_str().to_os_string());
}

pub struct Transcoder {
    binary: String,
    executor: Arc<dyn CommandExecutor>,
}

impl Transcoder {
    pub fn new(binary: impl Into<String>, executor: Arc<dyn CommandExecutor>) -> Self {
        Self {
            binary: binary.into(),
            executor,
        }
    }

    /// Only the exit status decides success; stderr is kept for the log.
    pub async fn run(&self, args: &[OsString]) -> Result<(), TranscodeError> {
        debug!(program = %self.binary, args = ?args, "running transcoder");
        let output = self
            .executor
            .output(&self.binary, args)
            .await
            .map_err(|source| TranscodeError::Launch {
                program: self.binary.clone(),
                source,
            })?;
        if output.status.success() {
            return Ok(());
        }
        Err(TranscodeError::Exit {
            program: self.binary.clone(),
            status: output.status.code(),
            stderr_tail: stderr_tail(&output.stderr),
        })
    }
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join(" | ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EncodingMode;
    use crate::media::probe::FrameRate;
    use crate::media::profile::ScaleMode;

    fn profile(scale: ScaleMode) -> EncodingProfile {
        EncodingProfile {
            mode: EncodingMode::Adaptive,
            scale,
            frame_rate: 25.0,
            rate: None,
            keyframe_interval: 50,
            video_codec: "libx264".into(),
            crf: 18,
            preset: "slow".into(),
            pix_fmt: "yuv420p".into(),
            audio_codec: "aac".into(),
            audio_bitrate: "320k".into(),
            audio_sample_rate: 48_000,
            source: None,
        }
    }

    fn as_strings(args: &[OsString]) -> Vec<String> {
        args.iter()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect()
    }

    fn value_after(args: &[String], flag: &str) -> Option<String> {
        args.iter()
            .position(|arg| arg == flag)
            .and_then(|index| args.get(index + 1).cloned())
    }

    #[test]
    fn transcode_arguments_carry_profile() {
        let args = as_strings(&transcode_args(
            &profile(ScaleMode::Fit {
                width: 1920,
                height: 1080,
            }),
            Path::new("in/Ep1_original.mp4"),
            Path::new("out/Ep1_Vimeo.partial.mp4"),
        ));
        assert_eq!(value_after(&args, "-i").as_deref(), Some("in/Ep1_original.mp4"));
        assert_eq!(value_after(&args, "-c:v").as_deref(), Some("libx264"));
        assert_eq!(value_after(&args, "-crf").as_deref(), Some("18"));
        assert_eq!(value_after(&args, "-preset").as_deref(), Some("slow"));
        assert_eq!(value_after(&args, "-pix_fmt").as_deref(), Some("yuv420p"));
        assert_eq!(value_after(&args, "-vf").as_deref(), Some("scale=1920:1080"));
        assert_eq!(value_after(&args, "-r").as_deref(), Some("25"));
        assert_eq!(value_after(&args, "-g").as_deref(), Some("50"));
        assert_eq!(value_after(&args, "-c:a").as_deref(), Some("aac"));
        assert_eq!(value_after(&args, "-b:a").as_deref(), Some("320k"));
        assert_eq!(value_after(&args, "-ar").as_deref(), Some("48000"));
        assert_eq!(value_after(&args, "-movflags").as_deref(), Some("+faststart"));
        assert_eq!(args.last().map(String::as_str), Some("out/Ep1_Vimeo.partial.mp4"));
        assert!(!args.iter().any(|arg| arg == "-loop"));
    }

    #[test]
    fn rational_source_rate_reaches_ffmpeg() {
        let mut ntsc = profile(ScaleMode::Passthrough);
        ntsc.frame_rate = 24000.0 / 1001.0;
        ntsc.rate = Some(FrameRate::new(24000, 1001));
        let args = as_strings(&transcode_args(&ntsc, Path::new("a.mp4"), Path::new("b.mp4")));
        assert_eq!(value_after(&args, "-r").as_deref(), Some("24000/1001"));
    }

    #[test]
    fn passthrough_omits_filter() {
        let args = as_strings(&transcode_args(
            &profile(ScaleMode::Passthrough),
            Path::new("a.mp4"),
            Path::new("b.mp4"),
        ));
        assert!(!args.iter().any(|arg| arg == "-vf"));
    }

    #[test]
    fn composition_loops_image_for_audio_duration() {
        let args = as_strings(&composition_args(
            &profile(ScaleMode::Letterbox {
                width: 1920,
                height: 1080,
            }),
            Path::new("cover.png"),
            Path::new("Ep1_original.m4a"),
            Some(183.5),
            Path::new("Ep1_Vimeo.partial.mp4"),
        ));
        assert_eq!(value_after(&args, "-loop").as_deref(), Some("1"));
        assert_eq!(value_after(&args, "-tune").as_deref(), Some("stillimage"));
        assert_eq!(value_after(&args, "-t").as_deref(), Some("183.500"));
        let inputs: Vec<&String> = args
            .iter()
            .enumerate()
            .filter(|(index, _)| *index > 0 && args[index - 1] == "-i")
            .map(|(_, arg)| arg)
            .collect();
        assert_eq!(inputs, vec!["cover.png", "Ep1_original.m4a"]);
        assert!(!args.iter().any(|arg| arg == "-shortest"));

        let unknown = as_strings(&composition_args(
            &profile(ScaleMode::Passthrough),
            Path::new("cover.png"),
            Path::new("a.m4a"),
            None,
            Path::new("o.mp4"),
        ));
        assert!(unknown.iter().any(|arg| arg == "-shortest"));
    }

    #[test]
    fn stderr_tail_keeps_last_lines() {
        let stderr = b"one\n\ntwo\nthree\nfour\nfive\nsix\n";
        assert_eq!(stderr_tail(stderr), "two | three | four | five | six");
    }
}
