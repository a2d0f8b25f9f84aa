use serde::Serialize;

use crate::config::{AdaptiveSection, EncodingMode, EncodingSection};

use super::probe::{FrameRate, VideoStreamInfo};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScaleMode {
    Passthrough,
    /// Exact target size; aspect ratio already matches the source.
    Fit { width: u32, height: u32 },
    /// Scale into the frame and pad the remainder.
    Letterbox { width: u32, height: u32 },
}

impl ScaleMode {
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        match self {
            ScaleMode::Passthrough => None,
            ScaleMode::Fit { width, height } | ScaleMode::Letterbox { width, height } => {
                Some((*width, *height))
            }
        }
    }

    pub fn filter(&self) -> Option<String> {
        match self {
            ScaleMode::Passthrough => None,
            ScaleMode::Fit { width, height } => Some(format!("scale={width}:{height}")),
            ScaleMode::Letterbox { width, height } => Some(format!(
                "scale={width}:{height}:force_original_aspect_ratio=decrease,pad={width}:{height}:(ow-iw)/2:(oh-ih)/2,setsar=1"
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EncodingProfile {
    pub mode: EncodingMode,
    pub scale: ScaleMode,
    pub frame_rate: f64,
    /// Exact source rate when the probe reported a usable one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate: Option<FrameRate>,
    pub keyframe_interval: u32,
    pub video_codec: String,
    pub crf: u8,
    pub preset: String,
    pub pix_fmt: String,
    pub audio_codec: String,
    pub audio_bitrate: String,
    pub audio_sample_rate: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<VideoStreamInfo>,
}

impl EncodingProfile {
    /// Constants from `[encoding.fixed]`, used by fixed and composition modes.
    pub fn fixed(encoding: &EncodingSection) -> Self {
        let fixed = &encoding.fixed;
        Self::with_codec_settings(
            encoding,
            encoding.mode,
            ScaleMode::Letterbox {
                width: fixed.width,
                height: fixed.height,
            },
            fixed.frame_rate,
            None,
            fixed.keyframe_interval,
            None,
        )
    }

    pub fn adaptive(encoding: &EncodingSection, info: &VideoStreamInfo) -> Self {
        let adaptive = &encoding.adaptive;
        let frame_rate = resolve_frame_rate(info.frame_rate, adaptive.default_frame_rate);
        let keyframes = keyframe_interval(
            frame_rate,
            adaptive.keyframe_seconds,
            adaptive.fallback_keyframe_interval,
        );
        Self::with_codec_settings(
            encoding,
            EncodingMode::Adaptive,
            compute_scale(info.width, info.height, adaptive),
            frame_rate,
            info.frame_rate.filter(|rate| rate.fps().is_some()),
            keyframes,
            Some(info.clone()),
        )
    }

    /// Value for `-r` and `-framerate`: the source ratio when known.
    pub fn rate_arg(&self) -> String {
        match self.rate {
            Some(rate) => rate.to_string(),
            None => format_frame_rate(self.frame_rate),
        }
    }

    fn with_codec_settings(
        encoding: &EncodingSection,
        mode: EncodingMode,
        scale: ScaleMode,
        frame_rate: f64,
        rate: Option<FrameRate>,
        keyframe_interval: u32,
        source: Option<VideoStreamInfo>,
    ) -> Self {
        Self {
            mode,
            scale,
            frame_rate,
            rate,
            keyframe_interval,
            video_codec: encoding.video_codec.clone(),
            crf: encoding.crf,
            preset: encoding.preset.clone(),
            pix_fmt: encoding.pix_fmt.clone(),
            audio_codec: encoding.audio_codec.clone(),
            audio_bitrate: encoding.audio_bitrate.clone(),
            audio_sample_rate: encoding.audio_sample_rate,
            source,
        }
    }
}

pub fn resolve_frame_rate(rate: Option<FrameRate>, default: f64) -> f64 {
    rate.and_then(|rate| rate.fps()).unwrap_or(default)
}

pub fn keyframe_interval(frame_rate: f64, seconds: f64, fallback: u32) -> u32 {
    let interval = (frame_rate * seconds).round();
    if interval.is_finite() && interval >= 1.0 {
        interval as u32
    } else {
        fallback
    }
}

/// Larger sources shrink to fit the preferred frame, sources under the
/// minimum grow to the preferred frame, everything else passes through.
pub fn compute_scale(width: u32, height: u32, adaptive: &AdaptiveSection) -> ScaleMode {
    let (target_w, target_h) = (adaptive.preferred_width, adaptive.preferred_height);
    if width > target_w || height > target_h {
        let factor = (target_w as f64 / width as f64).min(target_h as f64 / height as f64);
        ScaleMode::Fit {
            width: even(width as f64 * factor).min(target_w),
            height: even(height as f64 * factor).min(target_h),
        }
    } else if width < adaptive.min_width || height < adaptive.min_height {
        ScaleMode::Letterbox {
            width: target_w,
            height: target_h,
        }
    } else {
        ScaleMode::Passthrough
    }
}

fn even(value: f64) -> u32 {
    let rounded = ((value / 2.0).round() * 2.0) as u32;
    rounded.max(2)
}

/// `25`, `29.97`, `23.976`.
pub fn format_frame_rate(frame_rate: f64) -> String {
    if (frame_rate - frame_rate.round()).abs() < 1e-9 {
        format!("{}", frame_rate.round() as u64)
    } else {
        let text = format!("{frame_rate:.3}");
        text.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CompositionSection, FixedSection};

    fn encoding(mode: EncodingMode) -> EncodingSection {
        EncodingSection {
            mode,
            video_codec: "libx264".into(),
            crf: 18,
            preset: "slow".into(),
            pix_fmt: "yuv420p".into(),
            audio_codec: "aac".into(),
            audio_bitrate: "320k".into(),
            audio_sample_rate: 48_000,
            fixed: FixedSection::default(),
            adaptive: AdaptiveSection::default(),
            composition: CompositionSection::default(),
        }
    }

    #[test]
    fn uhd_source_scales_down_preserving_aspect() {
        let scale = compute_scale(3840, 2160, &AdaptiveSection::default());
        assert_eq!(
            scale,
            ScaleMode::Fit {
                width: 1920,
                height: 1080
            }
        );
        let wide = compute_scale(4096, 1716, &AdaptiveSection::default());
        assert_eq!(wide.dimensions(), Some((1920, 804)));
    }

    #[test]
    fn small_source_upscales_to_preferred_frame() {
        let scale = compute_scale(640, 360, &AdaptiveSection::default());
        assert_eq!(scale.dimensions(), Some((1920, 1080)));
        assert!(scale.filter().unwrap().contains("pad=1920:1080"));
    }

    #[test]
    fn in_range_source_passes_through() {
        let adaptive = AdaptiveSection::default();
        assert_eq!(compute_scale(1920, 1080, &adaptive), ScaleMode::Passthrough);
        assert_eq!(compute_scale(1280, 720, &adaptive), ScaleMode::Passthrough);
        assert_eq!(ScaleMode::Passthrough.filter(), None);
    }

    #[test]
    fn portrait_source_fits_inside_frame() {
        let scale = compute_scale(1080, 1920, &AdaptiveSection::default());
        assert_eq!(scale.dimensions(), Some((608, 1080)));
    }

    #[test]
    fn keyframe_interval_doubles_rate_with_fallback() {
        assert_eq!(keyframe_interval(25.0, 2.0, 48), 50);
        assert_eq!(keyframe_interval(29.97, 2.0, 48), 60);
        assert_eq!(keyframe_interval(0.0, 2.0, 48), 48);
        assert_eq!(keyframe_interval(f64::NAN, 2.0, 48), 48);
    }

    #[test]
    fn missing_or_degenerate_rate_uses_default() {
        assert_eq!(resolve_frame_rate(Some(FrameRate::new(0, 0)), 24.0), 24.0);
        assert_eq!(resolve_frame_rate(Some(FrameRate::new(30, 0)), 24.0), 24.0);
        assert_eq!(resolve_frame_rate(None, 24.0), 24.0);
        assert_eq!(resolve_frame_rate(Some(FrameRate::new(50, 2)), 24.0), 25.0);
    }

    #[test]
    fn adaptive_profile_derives_from_probe() {
        let info = VideoStreamInfo {
            width: 3840,
            height: 2160,
            frame_rate: Some(FrameRate::new(25, 1)),
        };
        let profile = EncodingProfile::adaptive(&encoding(EncodingMode::Adaptive), &info);
        assert_eq!(profile.mode, EncodingMode::Adaptive);
        assert_eq!(profile.scale.dimensions(), Some((1920, 1080)));
        assert_eq!(profile.frame_rate, 25.0);
        assert_eq!(profile.keyframe_interval, 50);
        assert_eq!(profile.source, Some(info));

        let unknown_rate = VideoStreamInfo {
            width: 1280,
            height: 720,
            frame_rate: Some(FrameRate::new(30, 0)),
        };
        let profile = EncodingProfile::adaptive(&encoding(EncodingMode::Adaptive), &unknown_rate);
        assert_eq!(profile.frame_rate, 24.0);
        assert_eq!(profile.keyframe_interval, 48);
        assert_eq!(profile.rate, None);
        assert_eq!(profile.rate_arg(), "24");
    }

    #[test]
    fn ntsc_source_keeps_exact_ratio() {
        let info = VideoStreamInfo {
            width: 1920,
            height: 1080,
            frame_rate: Some(FrameRate::new(24000, 1001)),
        };
        let profile = EncodingProfile::adaptive(&encoding(EncodingMode::Adaptive), &info);
        assert_eq!(profile.rate_arg(), "24000/1001");
        assert_eq!(profile.keyframe_interval, 48);
        assert_eq!(EncodingProfile::fixed(&encoding(EncodingMode::Fixed)).rate_arg(), "24");
    }

    #[test]
    fn fixed_profile_uses_constants() {
        let profile = EncodingProfile::fixed(&encoding(EncodingMode::Fixed));
        assert_eq!(profile.mode, EncodingMode::Fixed);
        assert_eq!(profile.scale.dimensions(), Some((1920, 1080)));
        assert_eq!(profile.frame_rate, 24.0);
        assert_eq!(profile.keyframe_interval, 48);
        assert!(profile.source.is_none());
    }

    #[test]
    fn frame_rates_format_compactly() {
        assert_eq!(format_frame_rate(25.0), "25");
        assert_eq!(format_frame_rate(30000.0 / 1001.0), "29.97");
        assert_eq!(format_frame_rate(24000.0 / 1001.0), "23.976");
    }
}
