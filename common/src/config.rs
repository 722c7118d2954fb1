use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub source: SourceConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub overlay: OverlayConfig,
    #[serde(default)]
    pub export: ExportConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    /// Directory holding the captured frames as an image sequence.
    pub path: PathBuf,
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
    /// Consecutive unreadable frames tolerated before the run is stopped.
    #[serde(default = "default_max_read_failures")]
    pub max_read_failures: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_parallel_pretasks")]
    pub parallel_pretasks: bool,
    /// Size of the dedicated pre-task pool. 0 uses the global rayon pool.
    #[serde(default)]
    pub worker_threads: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnalysisConfig {
    /// Nominal framerate of the capture.
    #[serde(default = "default_video_fps")]
    pub video_fps: f64,
    /// Per-channel difference that still counts as "same pixel".
    #[serde(default)]
    pub tolerance: u8,
    /// Share of differing pixels a frame must exceed to count as unique.
    #[serde(default)]
    pub threshold: f64,
    /// Sliding window length in frames. 0 means one second of video.
    #[serde(default)]
    pub window: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OverlayConfig {
    #[serde(default = "default_overlay_enabled")]
    pub enabled: bool,
    /// Clear the frame before drawing so only the graphs are exported.
    #[serde(default)]
    pub export_as_overlay: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormatKind {
    Jpeg,
    Png,
}

impl ImageFormatKind {
    pub fn extension(self) -> &'static str {
        match self {
            ImageFormatKind::Jpeg => "jpg",
            ImageFormatKind::Png => "png",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExportConfig {
    #[serde(default = "default_export_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_imagesequence_enabled")]
    pub imagesequence_enabled: bool,
    #[serde(default = "default_imagesequence_prefix")]
    pub imagesequence_prefix: String,
    #[serde(default = "default_image_format")]
    pub image_format: ImageFormatKind,
    #[serde(default)]
    pub export_csv: bool,
    #[serde(default)]
    pub export_summary: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            parallel_pretasks: default_parallel_pretasks(),
            worker_threads: 0,
        }
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            video_fps: default_video_fps(),
            tolerance: 0,
            threshold: 0.0,
            window: 0,
        }
    }
}

impl AnalysisConfig {
    /// Effective window length in frames, never zero.
    pub fn window_frames(&self) -> usize {
        if self.window > 0 {
            self.window
        } else {
            (self.video_fps.round() as usize).max(1)
        }
    }
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            enabled: default_overlay_enabled(),
            export_as_overlay: false,
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            directory: default_export_directory(),
            imagesequence_enabled: default_imagesequence_enabled(),
            imagesequence_prefix: default_imagesequence_prefix(),
            image_format: default_image_format(),
            export_csv: false,
            export_summary: false,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFile(path.display().to_string(), e))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Config =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        if !(config.analysis.video_fps > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "analysis.video_fps must be positive, got {}",
                config.analysis.video_fps
            )));
        }
        Ok(config)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    ReadFile(String, std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(String),
    #[error("invalid config: {0}")]
    Invalid(String),
}

// Default value functions
fn default_extensions() -> Vec<String> {
    ["png", "jpg", "jpeg", "bmp"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_max_read_failures() -> u32 {
    3
}
fn default_parallel_pretasks() -> bool {
    true
}
fn default_video_fps() -> f64 {
    60.0
}
fn default_overlay_enabled() -> bool {
    true
}
fn default_export_directory() -> PathBuf {
    PathBuf::from("export")
}
fn default_imagesequence_enabled() -> bool {
    true
}
fn default_imagesequence_prefix() -> String {
    "exportsequence_".into()
}
fn default_image_format() -> ImageFormatKind {
    ImageFormatKind::Jpeg
}
fn default_log_level() -> String {
    "info".into()
}
