use std::fs;
use std::path::Path;
use std::time::Duration;

use chrono::FixedOffset;
use serde::Deserialize;

use crate::error::{AppError, Result};
use crate::export::OutputFormat;
use crate::fetcher::{DEFAULT_MAX_MESSAGES, DEFAULT_PAGE_SIZE, PaginationMode};

pub const SETTINGS_FILE: &str = "settings.toml";

#[derive(Debug, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub portal: PortalSettings,
    #[serde(default)]
    pub fetch: FetchSettings,
    #[serde(default)]
    pub export: ExportSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PortalSettings {
    #[serde(default)]
    pub webhook: String,
    #[serde(default = "default_timeout_secs", rename = "timeout-secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FetchSettings {
    #[serde(default = "default_page_size", rename = "page-size")]
    pub page_size: usize,
    #[serde(default = "default_max_messages", rename = "max-messages")]
    pub max_messages: usize,
    #[serde(default = "default_pause_ms", rename = "pause-ms")]
    pub pause_ms: u64,
    #[serde(default)]
    pub mode: PaginationMode,
    #[serde(default = "default_utc_offset", rename = "utc-offset")]
    pub utc_offset: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExportSettings {
    #[serde(default = "default_output_dir", rename = "output-dir")]
    pub output_dir: String,
    #[serde(default)]
    pub format: OutputFormat,
    #[serde(default = "default_user_pause_ms", rename = "user-pause-ms")]
    pub user_pause_ms: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

fn default_max_messages() -> usize {
    DEFAULT_MAX_MESSAGES
}

fn default_pause_ms() -> u64 {
    300
}

fn default_utc_offset() -> String {
    "+00:00".to_string()
}

fn default_output_dir() -> String {
    "chat_exports".to_string()
}

fn default_user_pause_ms() -> u64 {
    100
}

impl Default for PortalSettings {
    fn default() -> Self {
        Self {
            webhook: String::new(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            max_messages: default_max_messages(),
            pause_ms: default_pause_ms(),
            mode: PaginationMode::default(),
            utc_offset: default_utc_offset(),
        }
    }
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            format: OutputFormat::default(),
            user_pause_ms: default_user_pause_ms(),
        }
    }
}

impl PortalSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl FetchSettings {
    pub fn pause(&self) -> Duration {
        Duration::from_millis(self.pause_ms)
    }

    pub fn offset(&self) -> Result<FixedOffset> {
        self.utc_offset
            .parse::<FixedOffset>()
            .map_err(|e| AppError::InvalidInput(format!("utc-offset {:?}: {}", self.utc_offset, e)))
    }
}

impl ExportSettings {
    pub fn user_pause(&self) -> Duration {
        Duration::from_millis(self.user_pause_ms)
    }
}

impl Settings {
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new(SETTINGS_FILE))
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| AppError::ReadFile {
            path: path.display().to_string(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| AppError::TomlParse(e.to_string()))
    }
}
