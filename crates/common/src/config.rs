//! Application configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::clock::FramePacing;
use crate::error::{KeepsakeError, KeepsakeResult};

/// Global application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Directory where exported videos and cards are written.
    pub output_dir: PathBuf,

    /// Rendering parameters.
    pub render: RenderDefaults,

    /// Names and labels burned into the output.
    pub branding: BrandingConfig,

    /// Remote record store and local cache.
    pub store: StoreConfig,

    /// Upload CDN settings.
    pub upload: UploadConfig,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Rendering parameters. Frame timings are fixed and deliberately absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderDefaults {
    /// Frame pacing for the render loop.
    pub pacing: FramePacing,

    /// Upper bound on fetching and decoding one slide image.
    pub image_timeout_secs: f64,

    /// What to do with a slide whose image cannot be loaded.
    pub image_fallback: ImageFallbackPolicy,

    /// Regular-weight TTF/OTF font used for captions.
    pub font: Option<PathBuf>,

    /// Bold font for titles; falls back to `font`.
    pub bold_font: Option<PathBuf>,

    /// Background music (path or URL) mixed into exports.
    pub music: Option<String>,

    /// Seed for the intro/outro particle fields. Random when unset.
    pub particle_seed: Option<u64>,

    /// ffmpeg binary to invoke.
    pub ffmpeg: String,
}

/// Fallback applied when a slide image fails to load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageFallbackPolicy {
    /// Render a generated placeholder in place of the photo.
    #[default]
    Placeholder,
    /// Drop the slide (and its incoming transition) from the video.
    Skip,
}

/// Labels burned into intro, slides, outro, and output file names.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrandingConfig {
    /// Name shown under "Happy Birthday".
    pub recipient: String,

    /// Attribution shown on every slide and in the credits.
    pub attribution: String,

    /// File stem for MP4 exports.
    pub mp4_stem: String,

    /// File stem for WebM exports.
    pub webm_stem: String,

    /// File stem for single-slide cards.
    pub card_stem: String,
}

/// Remote record store and local cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Base URL of the record store (PostgREST-compatible).
    pub url: Option<String>,

    /// Anonymous API key sent with every request.
    pub api_key: Option<String>,

    /// Table holding photo records.
    pub table: String,

    /// Local key-value cache file.
    pub cache_path: PathBuf,

    /// HTTP timeout in seconds.
    pub timeout_secs: f64,
}

/// Unsigned upload CDN settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// CDN account name.
    pub cloud_name: Option<String>,

    /// Unsigned upload preset.
    pub upload_preset: String,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "keepsake=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,

    /// Optional log file path.
    pub file: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            render: RenderDefaults::default(),
            branding: BrandingConfig::default(),
            store: StoreConfig::default(),
            upload: UploadConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for RenderDefaults {
    fn default() -> Self {
        Self {
            pacing: FramePacing::Realtime,
            image_timeout_secs: 15.0,
            image_fallback: ImageFallbackPolicy::Placeholder,
            font: None,
            bold_font: None,
            music: None,
            particle_seed: None,
            ffmpeg: "ffmpeg".to_string(),
        }
    }
}

impl Default for BrandingConfig {
    fn default() -> Self {
        Self {
            recipient: "Ellen".to_string(),
            attribution: "by KofiLartey".to_string(),
            mp4_stem: "ellen-birthday-slideshow".to_string(),
            webm_stem: "ellen-birthday-whatsapp".to_string(),
            card_stem: "ellen-birthday".to_string(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: None,
            api_key: None,
            table: "photos".to_string(),
            cache_path: data_dir().join("cache.json"),
            timeout_secs: 10.0,
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            cloud_name: None,
            upload_preset: "ml_default".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}

impl RenderDefaults {
    pub fn image_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f64(self.image_timeout_secs.max(0.001))
    }
}

impl AppConfig {
    /// Load config from the standard location, falling back to defaults.
    pub fn load() -> Self {
        let config_path = config_file_path();
        if config_path.exists() {
            match Self::load_from(&config_path) {
                Ok(config) => return config,
                Err(e) => {
                    tracing::warn!("Failed to load config at {:?}: {}", config_path, e);
                }
            }
        }
        Self::default()
    }

    /// Load config from an explicit path.
    pub fn load_from(path: &Path) -> KeepsakeResult<Self> {
        if !path.exists() {
            return Err(KeepsakeError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        let content = std::fs::read_to_string(path)?;
        let mut config: Self = serde_json::from_str(&content)
            .map_err(|e| KeepsakeError::config(format!("{}: {e}", path.display())))?;
        if config.output_dir.as_os_str().is_empty() {
            config.output_dir = PathBuf::from(".");
        }
        Ok(config)
    }

    /// Save config to the standard location.
    pub fn save(&self) -> Result<(), std::io::Error> {
        let config_path = config_file_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(config_path, json)
    }
}

/// Standard config file location.
pub fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("keepsake").join("config.json")
}

/// Default data directory (local cache lives here).
fn data_dir() -> PathBuf {
    let base = std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local").join("share")
        });
    base.join("keepsake")
}
