//! Configuration loading and validation.
//!
//! Configuration is read from `$XDG_CONFIG_HOME/dayrecap/config.toml`. The file is parsed into
//! [ConfigFile], which mirrors the file layout and is lenient (every value has a default), and then
//! validated into [Config], which is what the rest of the crate consumes. Validation errors are
//! fatal and only happen at startup.

use std::{
    env,
    io::ErrorKind,
    path::{Path, PathBuf},
    time::Duration,
};

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
    error::ConfigError,
    terminal::{is_valid_pane_id, CaptureMode},
    utils::dir::{data_dir, default_config_path, expand_home, state_dir},
};

pub const API_KEY_VARIABLE: &str = "DAYRECAP_API_KEY";

/// Supported LLM providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    OpenAI,
    Anthropic,
    OpenRouter,
    Ollama,
}

impl LlmProvider {
    /// Returns the default endpoint for this provider
    pub fn default_endpoint(&self) -> &'static str {
        match self {
            LlmProvider::OpenAI => "https://api.openai.com/v1",
            LlmProvider::Anthropic => "https://api.anthropic.com/v1",
            LlmProvider::OpenRouter => "https://openrouter.ai/api/v1",
            LlmProvider::Ollama => "http://localhost:11434/v1",
        }
    }

    pub fn requires_api_key(&self) -> bool {
        !matches!(self, LlmProvider::Ollama)
    }

    pub fn name(&self) -> &'static str {
        match self {
            LlmProvider::OpenAI => "openai",
            LlmProvider::Anthropic => "anthropic",
            LlmProvider::OpenRouter => "openrouter",
            LlmProvider::Ollama => "ollama",
        }
    }
}

/// Configuration file as written by the user.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub filesystem: FilesystemSection,
    #[serde(default)]
    pub terminal: TerminalSection,
    #[serde(default)]
    pub llm: LlmSection,
    #[serde(default)]
    pub summarizer: SummarizerSection,
    #[serde(default)]
    pub storage: StorageSection,
    #[serde(default)]
    pub daemon: DaemonSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilesystemSection {
    #[serde(default = "default_true")]
    pub enable: bool,
    /// Directories to watch
    #[serde(default)]
    pub dirs: Vec<String>,
    /// Only files ending with one of these suffixes are watched. Empty means every file.
    #[serde(default)]
    pub include_filetypes: Vec<String>,
    #[serde(default)]
    pub exclude_filetypes: Vec<String>,
    /// Directory names whose whole subtree is skipped
    #[serde(default = "default_exclude_dirs")]
    pub exclude_dirs: Vec<String>,
    /// A modification is major when `1 - similarity` exceeds this value...
    #[serde(default = "default_major_change_threshold")]
    pub major_change_threshold: f64,
    /// ...and at least this many lines were added or removed.
    #[serde(default = "default_min_lines_changed")]
    pub min_lines_changed: usize,
    /// Don't log minor modifications at all
    #[serde(default)]
    pub major_changes_only: bool,
    /// Files above this size in bytes are tracked by hash only
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
}

impl Default for FilesystemSection {
    fn default() -> Self {
        Self {
            enable: true,
            dirs: vec![],
            include_filetypes: vec![],
            exclude_filetypes: vec![],
            exclude_dirs: default_exclude_dirs(),
            major_change_threshold: default_major_change_threshold(),
            min_lines_changed: default_min_lines_changed(),
            major_changes_only: false,
            max_file_size: default_max_file_size(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TerminalSection {
    #[serde(default = "default_true")]
    pub enable: bool,
    /// Panes as `session:window.pane`. Empty means every live pane.
    #[serde(default)]
    pub panes: Vec<String>,
    /// Capture the whole scrollback instead of the visible screen
    #[serde(default)]
    pub capture_full_output: bool,
}

impl Default for TerminalSection {
    fn default() -> Self {
        Self {
            enable: true,
            panes: vec![],
            capture_full_output: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmSection {
    #[serde(default = "default_provider")]
    pub provider: LlmProvider,
    #[serde(default = "default_model")]
    pub model: String,
    /// Falls back to the `DAYRECAP_API_KEY` environment variable
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            api_key: None,
            endpoint: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummarizerSection {
    /// Local time of day after which the report is produced, `HH:MM`
    #[serde(default = "default_at")]
    pub at: String,
    #[serde(default = "default_token_limit")]
    pub token_limit: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report_dir: Option<String>,
}

impl Default for SummarizerSection {
    fn default() -> Self {
        Self {
            at: default_at(),
            token_limit: default_token_limit(),
            report_dir: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_log: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capture_log: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_file: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonSection {
    #[serde(default = "default_tick_seconds")]
    pub tick_seconds: u64,
}

impl Default for DaemonSection {
    fn default() -> Self {
        Self {
            tick_seconds: default_tick_seconds(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_exclude_dirs() -> Vec<String> {
    vec![".git".into()]
}

fn default_major_change_threshold() -> f64 {
    0.1
}

fn default_min_lines_changed() -> usize {
    3
}

fn default_max_file_size() -> u64 {
    1024 * 1024
}

fn default_provider() -> LlmProvider {
    LlmProvider::OpenAI
}

fn default_model() -> String {
    "gpt-4o-mini".into()
}

fn default_at() -> String {
    "19:00".into()
}

fn default_token_limit() -> usize {
    100_000
}

fn default_tick_seconds() -> u64 {
    5
}

/// Validated settings of the filesystem tracker.
#[derive(Debug, Clone, PartialEq)]
pub struct FilesystemConfig {
    pub enable: bool,
    pub dirs: Vec<PathBuf>,
    /// Lowercase suffixes
    pub include_filetypes: Vec<String>,
    /// Lowercase suffixes
    pub exclude_filetypes: Vec<String>,
    pub exclude_dirs: Vec<String>,
    pub major_change_threshold: f64,
    pub min_lines_changed: usize,
    pub major_changes_only: bool,
    pub max_file_size: u64,
    /// Files produced by the application itself, never tracked
    pub ignored_paths: Vec<PathBuf>,
}

impl Default for FilesystemConfig {
    fn default() -> Self {
        let section = FilesystemSection::default();
        Self {
            enable: section.enable,
            dirs: vec![],
            include_filetypes: vec![],
            exclude_filetypes: vec![],
            exclude_dirs: section.exclude_dirs,
            major_change_threshold: section.major_change_threshold,
            min_lines_changed: section.min_lines_changed,
            major_changes_only: section.major_changes_only,
            max_file_size: section.max_file_size,
            ignored_paths: vec![],
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TerminalConfig {
    pub enable: bool,
    pub panes: Vec<String>,
    pub capture_mode: CaptureMode,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub model: String,
    pub api_key: Option<String>,
    pub endpoint: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SummarizerConfig {
    pub at: NaiveTime,
    pub token_limit: usize,
    pub report_dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StorageConfig {
    pub change_log: PathBuf,
    pub capture_log: PathBuf,
    pub state_file: PathBuf,
}

/// Strongly typed configuration produced once at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub filesystem: FilesystemConfig,
    pub terminal: TerminalConfig,
    pub llm: LlmConfig,
    pub summarizer: SummarizerConfig,
    pub storage: StorageConfig,
    pub tick: Duration,
}

impl ConfigFile {
    /// Reads the file at `path`. A missing file means default configuration.
    pub fn read(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => Ok(toml::from_str(&content)?),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("No config file found at {path:?}, using defaults");
                Ok(Self::default())
            }
            Err(source) => Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Writes the default configuration unless a file already exists. Returns whether a file was
    /// written.
    pub fn write_default(path: &Path) -> Result<bool, ConfigError> {
        if path.exists() {
            return Ok(false);
        }
        let io_error = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_error)?;
        }
        std::fs::write(path, Self::default().to_toml()?).map_err(io_error)?;
        Ok(true)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Copy that is safe to print.
    pub fn masked(&self) -> Self {
        let mut masked = self.clone();
        if let Some(key) = masked.llm.api_key.as_mut() {
            *key = "*".repeat(20);
        }
        masked
    }

    pub fn validate(self) -> Result<Config, ConfigError> {
        let state_path = |value: Option<String>, file_name: &str| -> Result<PathBuf, ConfigError> {
            match value {
                Some(v) => absolute(&v),
                None => Ok(state_dir()
                    .ok_or(ConfigError::MissingDirectory("state directory"))?
                    .join(file_name)),
            }
        };

        let storage = StorageConfig {
            change_log: state_path(self.storage.change_log, "fs_changes.json")?,
            capture_log: state_path(self.storage.capture_log, "terminal_captures.json")?,
            state_file: state_path(self.storage.state_file, "cycle_state.json")?,
        };

        let summarizer = validate_summarizer(self.summarizer)?;
        let filesystem = validate_filesystem(self.filesystem, &storage, &summarizer)?;
        let terminal = validate_terminal(self.terminal)?;
        let llm = validate_llm(self.llm)?;

        if self.daemon.tick_seconds == 0 {
            return Err(ConfigError::InvalidValue {
                name: "daemon.tick_seconds",
                reason: "must be positive".into(),
            });
        }

        Ok(Config {
            filesystem,
            terminal,
            llm,
            summarizer,
            storage,
            tick: Duration::from_secs(self.daemon.tick_seconds),
        })
    }
}

impl Config {
    /// Loads and validates configuration from `path` or the default location.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(v) => v.to_path_buf(),
            None => default_config_path().ok_or(ConfigError::MissingDirectory("config directory"))?,
        };
        ConfigFile::read(&path)?.validate()
    }
}

fn absolute(path: &str) -> Result<PathBuf, ConfigError> {
    let expanded = expand_home(path);
    std::path::absolute(&expanded).map_err(|source| ConfigError::Io {
        path: expanded,
        source,
    })
}

fn check_threshold(name: &'static str, value: f64) -> Result<f64, ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(ConfigError::InvalidThreshold { name, value })
    }
}

fn normalize_suffixes(values: Vec<String>) -> Vec<String> {
    values
        .into_iter()
        .map(|v| v.trim().to_lowercase())
        .filter(|v| !v.is_empty())
        .collect()
}

fn validate_summarizer(section: SummarizerSection) -> Result<SummarizerConfig, ConfigError> {
    let at = NaiveTime::parse_from_str(section.at.trim(), "%H:%M")
        .map_err(|_| ConfigError::InvalidTime(section.at.clone()))?;
    if section.token_limit == 0 {
        return Err(ConfigError::InvalidValue {
            name: "summarizer.token_limit",
            reason: "must be positive".into(),
        });
    }
    let report_dir = match section.report_dir {
        Some(v) => absolute(&v)?,
        None => data_dir().ok_or(ConfigError::MissingDirectory("data directory"))?,
    };
    Ok(SummarizerConfig {
        at,
        token_limit: section.token_limit,
        report_dir,
    })
}

fn validate_filesystem(
    section: FilesystemSection,
    storage: &StorageConfig,
    summarizer: &SummarizerConfig,
) -> Result<FilesystemConfig, ConfigError> {
    let dirs = section
        .dirs
        .iter()
        .map(|v| absolute(v))
        .collect::<Result<Vec<_>, _>>()?;
    if section.enable && dirs.is_empty() {
        warn!("No directory specified to watch");
    }

    Ok(FilesystemConfig {
        enable: section.enable,
        dirs,
        include_filetypes: normalize_suffixes(section.include_filetypes),
        exclude_filetypes: normalize_suffixes(section.exclude_filetypes),
        exclude_dirs: section.exclude_dirs,
        major_change_threshold: check_threshold(
            "filesystem.major_change_threshold",
            section.major_change_threshold,
        )?,
        min_lines_changed: section.min_lines_changed,
        major_changes_only: section.major_changes_only,
        max_file_size: section.max_file_size,
        ignored_paths: vec![
            storage.change_log.clone(),
            storage.capture_log.clone(),
            storage.state_file.clone(),
            summarizer.report_dir.clone(),
        ],
    })
}

fn validate_terminal(section: TerminalSection) -> Result<TerminalConfig, ConfigError> {
    let panes = section
        .panes
        .into_iter()
        .map(|v| v.trim().to_string())
        .collect::<Vec<_>>();
    if let Some(invalid) = panes.iter().find(|v| !is_valid_pane_id(v)) {
        return Err(ConfigError::InvalidPane(invalid.clone()));
    }
    Ok(TerminalConfig {
        enable: section.enable,
        panes,
        capture_mode: if section.capture_full_output {
            CaptureMode::FullScrollback
        } else {
            CaptureMode::Visible
        },
    })
}

fn validate_llm(section: LlmSection) -> Result<LlmConfig, ConfigError> {
    if section.model.trim().is_empty() {
        return Err(ConfigError::InvalidValue {
            name: "llm.model",
            reason: "must not be empty".into(),
        });
    }
    let api_key = section
        .api_key
        .or_else(|| env::var(API_KEY_VARIABLE).ok())
        .filter(|v| !v.trim().is_empty());
    if api_key.is_none() && section.provider.requires_api_key() {
        warn!(
            "No API key configured for {}, set llm.api_key or {API_KEY_VARIABLE}",
            section.provider.name()
        );
    }
    Ok(LlmConfig {
        provider: section.provider,
        model: section.model,
        api_key,
        endpoint: section
            .endpoint
            .unwrap_or_else(|| section.provider.default_endpoint().to_string()),
    })
}
