//! Configuration system using TOML files.
//!
//! Config is stored in the OS-standard config directory:
//! - Windows: %APPDATA%\lexicard\config.toml
//! - macOS: ~/Library/Application Support/lexicard/config.toml
//! - Linux: ~/.config/lexicard/config.toml
//!
//! The config file is human-readable and editable. Every section has
//! defaults, so a file only needs the values that differ. Command-line
//! flags override file values for a single run.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// API credentials (keep separate for potential future encryption)
    pub credentials: Credentials,

    /// Input, output and state locations
    pub paths: PathsConfig,

    pub languages: LanguageConfig,

    /// Concurrency, batching and retry settings
    pub pipeline: PipelineConfig,

    /// Duplicate and sense merging
    pub pruning: PruningConfig,

    /// Endpoints and per-provider concurrency limits
    pub providers: ProvidersConfig,

    /// Which runtime, model and prompt version each stage uses
    pub tasks: TasksConfig,
}

/// API credentials
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Credentials {
    pub openai_api_key: Option<String>,
    pub deepl_api_key: Option<String>,
}

/// File locations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Kindle vocabulary database (copied off the device)
    pub vocab_db: PathBuf,

    /// Cache and watermark database (empty = OS data directory)
    pub state_db: Option<PathBuf>,

    /// Anki-importable export file; also the record of synced cards
    pub export_file: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            vocab_db: PathBuf::from("vocab.db"),
            state_db: None,
            export_file: PathBuf::from("lexicard_import.txt"),
        }
    }
}

impl PathsConfig {
    /// Resolved location of the state database.
    pub fn state_db(&self) -> PathBuf {
        self.state_db
            .clone()
            .unwrap_or_else(crate::db::default_state_path)
    }
}

/// Language settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LanguageConfig {
    /// Learner's language (definitions and translations are written in it)
    pub target: String,
}

impl Default for LanguageConfig {
    fn default() -> Self {
        Self {
            target: "en".to_string(),
        }
    }
}

/// Pipeline execution settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Lookups processed in parallel
    pub concurrency: usize,

    /// Lookups per batch; the watermark advances after each batch
    pub batch_size: usize,

    /// Attempts per stage call, including the first
    pub max_attempts: u32,

    pub base_backoff_ms: u64,

    pub max_backoff_ms: u64,

    /// Per-request HTTP timeout
    pub request_timeout_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            concurrency: 8,
            batch_size: 100,
            max_attempts: 4,
            base_backoff_ms: 500,
            max_backoff_ms: 16_000,
            request_timeout_secs: 120,
        }
    }
}

/// Pruning settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PruningConfig {
    /// Definitions at least this similar (0.0 - 1.0) are the same sense
    pub similarity_threshold: f64,
}

impl Default for PruningConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.6,
        }
    }
}

/// One provider endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Base URL; `None` uses the provider default
    pub base_url: Option<String>,

    /// In-flight requests allowed against this provider
    pub max_concurrent: usize,
}

/// Provider endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    pub openai: EndpointConfig,
    pub ollama: EndpointConfig,
    pub deepl: EndpointConfig,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            openai: EndpointConfig {
                base_url: Some("https://api.openai.com/v1".to_string()),
                max_concurrent: 8,
            },
            ollama: EndpointConfig {
                base_url: Some("http://localhost:11434/v1".to_string()),
                max_concurrent: 1,
            },
            deepl: EndpointConfig {
                base_url: None,
                max_concurrent: 4,
            },
        }
    }
}

impl ProvidersConfig {
    /// Concurrency limit per provider name.
    pub fn limits(&self) -> HashMap<String, usize> {
        HashMap::from([
            (RuntimeKind::OpenAi.as_str().to_string(), self.openai.max_concurrent),
            (RuntimeKind::Ollama.as_str().to_string(), self.ollama.max_concurrent),
            (RuntimeKind::DeepL.as_str().to_string(), self.deepl.max_concurrent),
        ])
    }
}

/// Runtime variants a stage can be configured with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeKind {
    /// OpenAI chat completions
    OpenAi,
    /// Local Ollama server (OpenAI-compatible endpoint)
    Ollama,
    /// DeepL translation API (translation stage only)
    DeepL,
}

impl RuntimeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Ollama => "ollama",
            Self::DeepL => "deepl",
        }
    }
}

/// Settings for one stage
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskSetting {
    pub enabled: bool,
    pub runtime: RuntimeKind,
    pub model: String,
    pub prompt_version: String,
}

impl Default for TaskSetting {
    fn default() -> Self {
        Self {
            enabled: true,
            runtime: RuntimeKind::OpenAi,
            model: "gpt-5-mini".to_string(),
            prompt_version: crate::enrichment::prompts::DEFAULT_VERSION.to_string(),
        }
    }
}

/// Per-stage settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TasksConfig {
    pub candidate: TaskSetting,
    pub sense: TaskSetting,
    pub translation: TaskSetting,
    pub collocation: TaskSetting,
    /// Optional source-language hint stage
    pub hint: TaskSetting,
}

impl Config {
    /// Check values that would otherwise fail deep inside a run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let threshold = self.pruning.similarity_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(ConfigError::Invalid(format!(
                "pruning.similarity_threshold must be between 0.0 and 1.0, got {}",
                threshold
            )));
        }
        if self.pipeline.concurrency == 0 {
            return Err(ConfigError::Invalid(
                "pipeline.concurrency must be at least 1".to_string(),
            ));
        }
        if self.pipeline.batch_size == 0 {
            return Err(ConfigError::Invalid(
                "pipeline.batch_size must be at least 1".to_string(),
            ));
        }
        for (name, setting) in [
            ("candidate", &self.tasks.candidate),
            ("sense", &self.tasks.sense),
            ("translation", &self.tasks.translation),
            ("collocation", &self.tasks.collocation),
        ] {
            if !setting.enabled {
                return Err(ConfigError::Invalid(format!(
                    "tasks.{} cannot be disabled",
                    name
                )));
            }
        }
        for (name, setting) in [
            ("candidate", &self.tasks.candidate),
            ("sense", &self.tasks.sense),
            ("collocation", &self.tasks.collocation),
            ("hint", &self.tasks.hint),
        ] {
            if setting.runtime == RuntimeKind::DeepL {
                return Err(ConfigError::Invalid(format!(
                    "tasks.{}: the deepl runtime only supports translation",
                    name
                )));
            }
        }
        Ok(())
    }
}

// ============================================================================
// Config File Operations
// ============================================================================

/// Get the config directory path
pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("lexicard"))
}

/// Get the full path to the config file
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join("config.toml"))
}

/// Load configuration from `path`, or from the default location.
///
/// Returns default config if file doesn't exist or can't be parsed.
/// Logs warnings but doesn't fail - we always return a usable config.
pub fn load(path: Option<&Path>) -> Config {
    let Some(path) = path.map(Path::to_path_buf).or_else(config_path) else {
        tracing::warn!("Could not determine config directory, using defaults");
        return Config::default();
    };

    if !path.exists() {
        tracing::info!("No config file found at {:?}, using defaults", path);
        return Config::default();
    }

    match std::fs::read_to_string(&path) {
        Ok(contents) => match toml::from_str(&contents) {
            Ok(config) => {
                tracing::info!("Loaded config from {:?}", path);
                config
            }
            Err(e) => {
                tracing::error!("Failed to parse config file {:?}: {}", path, e);
                tracing::warn!("Using default configuration");
                Config::default()
            }
        },
        Err(e) => {
            tracing::error!("Failed to read config file {:?}: {}", path, e);
            Config::default()
        }
    }
}

/// Save configuration to `path`, or to the default location.
///
/// Creates the config directory if it doesn't exist. Returns the path written.
pub fn save(config: &Config, path: Option<&Path>) -> Result<PathBuf, ConfigError> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => config_path().ok_or(ConfigError::NoConfigDir)?,
    };

    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(|e| ConfigError::CreateDir(dir.to_path_buf(), e))?;
    }

    // Serialize to pretty TOML
    let contents = toml::to_string_pretty(config).map_err(ConfigError::Serialize)?;

    // Write atomically (write to temp, then rename)
    let temp_path = path.with_extension("toml.tmp");
    std::fs::write(&temp_path, &contents).map_err(|e| ConfigError::Write(temp_path.clone(), e))?;
    std::fs::rename(&temp_path, &path)
        .map_err(|e| ConfigError::Rename(temp_path, path.clone(), e))?;

    tracing::info!("Saved config to {:?}", path);
    Ok(path)
}

// ============================================================================
// Error Types
// ============================================================================

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Failed to create config directory {0}: {1}")]
    CreateDir(PathBuf, std::io::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(toml::ser::Error),

    #[error("Failed to write config to {0}: {1}")]
    Write(PathBuf, std::io::Error),

    #[error("Failed to rename temp file {0} to {1}: {2}")]
    Rename(PathBuf, PathBuf, std::io::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

// ============================================================================
// Tests
// ============================================================================
