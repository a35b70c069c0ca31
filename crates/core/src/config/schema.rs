//! Configuration schema definitions

use serde::{Deserialize, Serialize};

/// Root configuration schema
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ConfigSchema {
    /// `[resize]` starting values
    #[serde(default)]
    pub resize: ResizeDefaults,

    /// `[export]` naming, pacing and destination
    #[serde(default)]
    pub export: ExportConfig,

    /// `[logging]` settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Starting values for the resize configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResizeDefaults {
    /// Output format name (`jpeg`, `png`, `webp`, `avif`)
    #[serde(default = "default_format")]
    pub format: String,

    /// Lossy encoder quality, clamped to 10..=100 when applied
    #[serde(default = "default_quality")]
    pub quality: u8,

    /// Recompute the paired dimension when one is edited
    #[serde(default = "default_true")]
    pub aspect_lock: bool,

    /// Background used when flattening transparency for JPEG output
    #[serde(default = "default_background")]
    pub jpeg_background: [u8; 3],
}

impl Default for ResizeDefaults {
    fn default() -> Self {
        Self {
            format: default_format(),
            quality: default_quality(),
            aspect_lock: true,
            jpeg_background: default_background(),
        }
    }
}

fn default_format() -> String {
    "jpeg".to_string()
}

fn default_quality() -> u8 {
    90
}

fn default_true() -> bool {
    true
}

fn default_background() -> [u8; 3] {
    [255, 255, 255]
}

/// Export settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Appended to the original file stem
    #[serde(default = "default_suffix")]
    pub suffix: String,

    /// Delay between consecutive downloads in a bulk export
    #[serde(default = "default_stagger_ms")]
    pub stagger_ms: u64,

    /// Directory exported files are written to
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            suffix: default_suffix(),
            stagger_ms: default_stagger_ms(),
            output_dir: default_output_dir(),
        }
    }
}

fn default_suffix() -> String {
    "_resized".to_string()
}

fn default_stagger_ms() -> u64 {
    300
}

fn default_output_dir() -> String {
    "resized".to_string()
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Fallback filter when `RUST_LOG` is unset
    #[serde(default = "default_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}
