use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

pub const ORIGINALS_DIR_NAME: &str = "originals";
pub const TRANSCODED_DIR_NAME: &str = "transcoded";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct MigrationConfig {
    pub source: SourceSection,
    pub output: OutputSection,
    #[serde(default)]
    pub tools: ToolsSection,
    pub encoding: EncodingSection,
    /// Local name -> remote entry id.
    pub entries: BTreeMap<String, String>,
}

impl MigrationConfig {
    pub fn originals_dir(&self) -> PathBuf {
        self.output.root.join(ORIGINALS_DIR_NAME)
    }

    pub fn transcoded_dir(&self) -> PathBuf {
        self.output.root.join(TRANSCODED_DIR_NAME)
    }

    /// Rejects configurations that cannot drive a run.
    pub fn validate(&self) -> Result<()> {
        if self.source.partner_id.trim().is_empty() {
            return Err(ConfigError::Invalid("source.partner_id is empty".into()));
        }
        match self.source.secret.as_deref() {
            Some(secret) if !secret.trim().is_empty() => {}
            _ => return Err(ConfigError::Invalid("source.secret is not set".into())),
        }
        if self.entries.is_empty() {
            return Err(ConfigError::Invalid("[entries] has no mappings".into()));
        }
        if let Some((name, _)) = self
            .entries
            .iter()
            .find(|(name, id)| name.trim().is_empty() || id.trim().is_empty())
        {
            return Err(ConfigError::Invalid(format!(
                "entry mapping {name:?} has an empty name or id"
            )));
        }
        if self.source.target_extension.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "source.target_extension is empty".into(),
            ));
        }
        let adaptive = &self.encoding.adaptive;
        if adaptive.preferred_width == 0 || adaptive.preferred_height == 0 {
            return Err(ConfigError::Invalid(
                "encoding.adaptive preferred frame must be non-zero".into(),
            ));
        }
        let fixed = &self.encoding.fixed;
        if fixed.width == 0 || fixed.height == 0 {
            return Err(ConfigError::Invalid(
                "encoding.fixed frame must be non-zero".into(),
            ));
        }
        if self.encoding.mode == EncodingMode::Composition
            && self.encoding.composition.image.is_none()
        {
            return Err(ConfigError::Invalid(
                "composition mode requires encoding.composition.image".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceSection {
    pub service_url: String,
    pub partner_id: String,
    /// May be left out of the file and injected from the environment.
    #[serde(default)]
    pub secret: Option<String>,
    #[serde(default = "default_session_type")]
    pub session_type: u8,
    #[serde(default = "default_session_expiry")]
    pub session_expiry_s: u64,
    #[serde(default = "default_preferred_flavor")]
    pub preferred_flavor_params_id: u32,
    #[serde(default = "default_target_extension")]
    pub target_extension: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutputSection {
    pub root: PathBuf,
    #[serde(default = "default_output_suffix")]
    pub output_suffix: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ToolsSection {
    #[serde(default = "default_ffmpeg")]
    pub ffmpeg: String,
    #[serde(default = "default_ffprobe")]
    pub ffprobe: String,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            ffmpeg: default_ffmpeg(),
            ffprobe: default_ffprobe(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EncodingMode {
    Adaptive,
    #[default]
    Fixed,
    Composition,
}

impl EncodingMode {
    pub fn label(&self) -> &'static str {
        match self {
            EncodingMode::Adaptive => "adaptive",
            EncodingMode::Fixed => "fixed",
            EncodingMode::Composition => "composition",
        }
    }

    pub fn needs_prober(&self) -> bool {
        matches!(self, EncodingMode::Adaptive | EncodingMode::Composition)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EncodingSection {
    #[serde(default)]
    pub mode: EncodingMode,
    pub video_codec: String,
    pub crf: u8,
    pub preset: String,
    pub pix_fmt: String,
    pub audio_codec: String,
    pub audio_bitrate: String,
    pub audio_sample_rate: u32,
    #[serde(default)]
    pub fixed: FixedSection,
    #[serde(default)]
    pub adaptive: AdaptiveSection,
    #[serde(default)]
    pub composition: CompositionSection,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FixedSection {
    pub width: u32,
    pub height: u32,
    pub frame_rate: f64,
    pub keyframe_interval: u32,
}

impl Default for FixedSection {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            frame_rate: 24.0,
            keyframe_interval: 48,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AdaptiveSection {
    pub preferred_width: u32,
    pub preferred_height: u32,
    pub min_width: u32,
    pub min_height: u32,
    pub default_frame_rate: f64,
    pub keyframe_seconds: f64,
    pub fallback_keyframe_interval: u32,
}

impl Default for AdaptiveSection {
    fn default() -> Self {
        Self {
            preferred_width: 1920,
            preferred_height: 1080,
            min_width: 1280,
            min_height: 720,
            default_frame_rate: 24.0,
            keyframe_seconds: 2.0,
            fallback_keyframe_interval: 48,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CompositionSection {
    pub image: Option<PathBuf>,
}

fn default_session_type() -> u8 {
    2
}

fn default_session_expiry() -> u64 {
    86_400
}

fn default_preferred_flavor() -> u32 {
    100
}

fn default_target_extension() -> String {
    "mp4".into()
}

fn default_user_agent() -> String {
    "flavorlift/0.1".into()
}

fn default_output_suffix() -> String {
    "Vimeo".into()
}

fn default_ffmpeg() -> String {
    "ffmpeg".into()
}

fn default_ffprobe() -> String {
    "ffprobe".into()
}

pub fn load_migration_config<P: AsRef<Path>>(path: P) -> Result<MigrationConfig> {
    load_toml(path)
}

fn load_toml<T, P>(path: P) -> Result<T>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        source,
        path: path.to_path_buf(),
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        source,
        path: path.to_path_buf(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> MigrationConfig {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../configs/flavorlift.toml");
        load_migration_config(path).expect("fixture config should parse")
    }

    #[test]
    fn load_fixture_config() {
        let config = fixture();
        assert_eq!(config.source.partner_id, "1234567");
        assert_eq!(config.source.preferred_flavor_params_id, 100);
        assert_eq!(config.source.target_extension, "mp4");
        assert_eq!(config.encoding.mode, EncodingMode::Adaptive);
        assert_eq!(config.entries.get("Ep1").map(String::as_str), Some("1_abc"));
        assert_eq!(config.tools.ffmpeg, "ffmpeg");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn output_directories_derive_from_root() {
        let config = fixture();
        assert_eq!(
            config.originals_dir(),
            config.output.root.join(ORIGINALS_DIR_NAME)
        );
        assert_eq!(
            config.transcoded_dir(),
            config.output.root.join(TRANSCODED_DIR_NAME)
        );
    }

    #[test]
    fn defaults_fill_optional_source_fields() {
        let raw = r#"
            [source]
            service_url = "https://www.kaltura.com"
            partner_id = "42"

            [output]
            root = "out"

            [encoding]
            video_codec = "libx264"
            crf = 20
            preset = "medium"
            pix_fmt = "yuv420p"
            audio_codec = "aac"
            audio_bitrate = "192k"
            audio_sample_rate = 48000

            [entries]
            Intro = "0_xyz"
        "#;
        let config: MigrationConfig = toml::from_str(raw).unwrap();
        assert_eq!(config.source.session_type, 2);
        assert_eq!(config.encoding.mode, EncodingMode::Fixed);
        assert_eq!(config.source.preferred_flavor_params_id, 100);
        assert_eq!(config.output.output_suffix, "Vimeo");
        assert_eq!(config.encoding.fixed.keyframe_interval, 48);
        assert_eq!(config.encoding.adaptive.min_width, 1280);
        assert!(config.source.secret.is_none());
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn composition_without_image_is_rejected() {
        let mut config = fixture();
        config.encoding.mode = EncodingMode::Composition;
        config.encoding.composition.image = None;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("composition"));
    }

    #[test]
    fn missing_file_reports_path() {
        let err = load_migration_config("/nonexistent/flavorlift.toml").unwrap_err();
        match err {
            ConfigError::Io { path, .. } => {
                assert_eq!(path, PathBuf::from("/nonexistent/flavorlift.toml"))
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
