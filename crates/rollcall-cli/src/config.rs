use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Runtime configuration.
///
/// Layered: built-in defaults, then the TOML file, then `ROLLCALL_*`
/// environment variables, then command-line flags.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// CSV metadata table, one row per person.
    pub metadata_path: PathBuf,
    /// Directory of enrollment images named `{row}.jpg`.
    pub image_dir: PathBuf,
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// V4L2 device path for the live session.
    pub camera_device: String,
    /// Maximum (exclusive) descriptor distance for a match.
    pub distance_threshold: f32,
    /// When set, annotated live frames are written here as JPEGs.
    pub snapshot_dir: Option<PathBuf>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    NotFound(PathBuf),
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl Default for Config {
    fn default() -> Self {
        Self {
            metadata_path: PathBuf::from("people_data/people_data.csv"),
            image_dir: PathBuf::from("image"),
            model_dir: default_model_dir(|key| std::env::var(key).ok()),
            camera_device: "/dev/video0".to_string(),
            distance_threshold: rollcall_core::DEFAULT_DISTANCE_THRESHOLD,
            snapshot_dir: None,
        }
    }
}

impl Config {
    /// Load from `explicit` (which must exist) or the default config file
    /// (optional), then apply the process environment.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match explicit {
            Some(path) if !path.exists() => return Err(ConfigError::NotFound(path.to_path_buf())),
            Some(path) => Self::from_file(path)?,
            None => match default_config_path(|key| std::env::var(key).ok()) {
                Some(path) if path.exists() => Self::from_file(&path)?,
                _ => Self::default(),
            },
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!(path = %path.display(), "loaded config file");
        Ok(config)
    }

    /// Override fields from `ROLLCALL_*` variables. Unparseable values are
    /// ignored with a warning.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("ROLLCALL_METADATA_PATH") {
            self.metadata_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("ROLLCALL_IMAGE_DIR") {
            self.image_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("ROLLCALL_MODEL_DIR") {
            self.model_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("ROLLCALL_CAMERA_DEVICE") {
            self.camera_device = v;
        }
        if let Some(v) = lookup("ROLLCALL_SNAPSHOT_DIR") {
            self.snapshot_dir = Some(PathBuf::from(v));
        }
        self.distance_threshold = env_f32(&lookup, "ROLLCALL_DISTANCE_THRESHOLD", self.distance_threshold);
    }

    /// Check the fully layered values, after flags are applied. A threshold that is not a positive
    /// finite number would reject every face.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let t = self.distance_threshold;
        if !t.is_finite() || t <= 0.0 {
            return Err(ConfigError::Invalid {
                field: "distance_threshold",
                reason: format!("{t} is not a positive finite distance"),
            });
        }
        Ok(())
    }
}

fn env_f32(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: f32) -> f32 {
    match lookup(key) {
        Some(v) => v.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %v, "ignoring unparseable number");
            default
        }),
        None => default,
    }
}

/// `$XDG_DATA_HOME/rollcall/models`, falling back to `~/.local/share`.
fn default_model_dir(lookup: impl Fn(&str) -> Option<String>) -> PathBuf {
    lookup("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            let home = lookup("HOME").unwrap_or_else(|| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("rollcall/models")
}

/// `$XDG_CONFIG_HOME/rollcall/config.toml`, falling back to `~/.config`.
fn default_config_path(lookup: impl Fn(&str) -> Option<String>) -> Option<PathBuf> {
    let base = match lookup("XDG_CONFIG_HOME") {
        Some(dir) => PathBuf::from(dir),
        None => PathBuf::from(lookup("HOME")?).join(".config"),
    };
    Some(base.join("rollcall/config.toml"))
}
