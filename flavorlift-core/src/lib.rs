pub mod config;
pub mod error;
pub mod media;
pub mod preflight;
pub mod processor;
pub mod source;

pub use config::{
    load_migration_config, AdaptiveSection, CompositionSection, EncodingMode, EncodingSection,
    FixedSection, MigrationConfig, OutputSection, SourceSection, ToolsSection,
};
pub use error::{ConfigError, Result};
pub use media::{
    CommandExecutor, EncodingProfile, MediaProber, ProbeError, ScaleMode, SystemCommandExecutor,
    TranscodeError, Transcoder, VideoStreamInfo,
};
pub use preflight::{check_composition_image, missing_tools, MissingTool, ToolLocation};
pub use processor::{
    AssetPaths, AssetReport, Outcome, Processor, ProcessorError, ProcessorResult, RunSummary,
};
pub use source::{
    acquire_session, resolve, Credential, Derivative, KalturaClient, ResolveError,
    ResolvedDerivative, SelectionPolicy, SessionError, SessionToken, SourcePlatform,
};
