use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::debug;

use crate::config::{EncodingMode, MigrationConfig};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MissingTool {
    pub name: &'static str,
    pub program: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolLocation {
    pub name: &'static str,
    pub program: String,
    pub path: Option<PathBuf>,
}

/// External programs the configured mode will launch.
pub fn required_tools(config: &MigrationConfig) -> Vec<(&'static str, String)> {
    let mut tools = vec![("ffmpeg", config.tools.ffmpeg.clone())];
    if config.encoding.mode.needs_prober() {
        tools.push(("ffprobe", config.tools.ffprobe.clone()));
    }
    tools
}

pub fn locate_tools(config: &MigrationConfig) -> Vec<ToolLocation> {
    required_tools(config)
        .into_iter()
        .map(|(name, program)| {
            let path = which::which(&program).ok();
            debug!(tool = name, program = %program, found = ?path, "tool lookup");
            ToolLocation {
                name,
                program,
                path,
            }
        })
        .collect()
}

pub fn missing_tools(config: &MigrationConfig) -> Vec<MissingTool> {
    locate_tools(config)
        .into_iter()
        .filter(|tool| tool.path.is_none())
        .map(|tool| MissingTool {
            name: tool.name,
            program: tool.program,
        })
        .collect()
}

/// `Ok(None)` outside composition mode, the image path when it is usable.
pub fn check_composition_image(config: &MigrationConfig) -> Result<Option<PathBuf>, String> {
    if config.encoding.mode != EncodingMode::Composition {
        return Ok(None);
    }
    let image = config
        .encoding
        .composition
        .image
        .as_deref()
        .ok_or_else(|| "encoding.composition.image is not set".to_string())?;
    if is_non_empty_file(image) {
        Ok(Some(image.to_path_buf()))
    } else {
        Err(format!("{} is missing or empty", image.display()))
    }
}

fn is_non_empty_file(path: &Path) -> bool {
    std::fs::metadata(path)
        .map(|meta| meta.is_file() && meta.len() > 0)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::load_migration_config;
    use std::fs;
    use tempfile::tempdir;

    fn fixture() -> MigrationConfig {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../configs/flavorlift.toml");
        load_migration_config(path).expect("fixture config should parse")
    }

    #[test]
    fn prober_only_required_when_mode_probes() {
        let mut config = fixture();
        config.encoding.mode = EncodingMode::Fixed;
        let names: Vec<_> = required_tools(&config).into_iter().map(|t| t.0).collect();
        assert_eq!(names, vec!["ffmpeg"]);

        config.encoding.mode = EncodingMode::Adaptive;
        let names: Vec<_> = required_tools(&config).into_iter().map(|t| t.0).collect();
        assert_eq!(names, vec!["ffmpeg", "ffprobe"]);
    }

    #[test]
    fn unknown_programs_are_reported_missing() {
        let mut config = fixture();
        config.encoding.mode = EncodingMode::Adaptive;
        config.tools.ffmpeg = "/nonexistent/flavorlift-ffmpeg".into();
        config.tools.ffprobe = "/nonexistent/flavorlift-ffprobe".into();
        let missing = missing_tools(&config);
        assert_eq!(missing.len(), 2);
        assert_eq!(missing[0].name, "ffmpeg");
        assert_eq!(missing[1].program, "/nonexistent/flavorlift-ffprobe");
    }

    #[test]
    fn composition_image_must_exist() {
        let dir = tempdir().unwrap();
        let mut config = fixture();
        assert_eq!(check_composition_image(&config), Ok(None));

        config.encoding.mode = EncodingMode::Composition;
        config.encoding.composition.image = Some(dir.path().join("cover.png"));
        assert!(check_composition_image(&config).is_err());

        fs::write(dir.path().join("cover.png"), b"png").unwrap();
        assert_eq!(
            check_composition_image(&config),
            Ok(Some(dir.path().join("cover.png")))
        );
    }
}
