use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const API_URL_ENV: &str = "FLEETWATCH_API_URL";

const DEFAULT_CONFIG: &str = r#"
[backend]
base_url = "http://127.0.0.1:8080/api"
timeout_ms = 5000

[polling]
interval_ms = 2000

[display]
status_style = "unicode"
label_width = 32
max_log_lines = 200
# capacity = 120
"#;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
	#[serde(default)]
	pub backend: Backend,
	#[serde(default)]
	pub polling: Polling,
	#[serde(default)]
	pub display: Display,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Backend {
	#[serde(default)]
	pub base_url: String,
	#[serde(default = "default_timeout_ms")]
	pub timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Polling {
	#[serde(default = "default_interval_ms")]
	pub interval_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Display {
	#[serde(default = "default_status_style")]
	pub status_style: String, // "unicode", "emoji", "text"
	#[serde(default = "default_label_width")]
	pub label_width: usize,
	#[serde(default = "default_max_log_lines")]
	pub max_log_lines: usize,
	/// Fleet capacity when the backend does not report one.
	#[serde(default)]
	pub capacity: Option<u64>,
}

impl Default for Backend {
	fn default() -> Self {
		Self {
			base_url: String::new(),
			timeout_ms: default_timeout_ms(),
		}
	}
}

impl Default for Polling {
	fn default() -> Self {
		Self {
			interval_ms: default_interval_ms(),
		}
	}
}

impl Default for Display {
	fn default() -> Self {
		Self {
			status_style: default_status_style(),
			label_width: default_label_width(),
			max_log_lines: default_max_log_lines(),
			capacity: None,
		}
	}
}

fn default_timeout_ms() -> u64 {
	5000
}

fn default_interval_ms() -> u64 {
	2000
}

fn default_status_style() -> String {
	"unicode".to_string()
}

fn default_label_width() -> usize {
	32
}

fn default_max_log_lines() -> usize {
	200
}

/// Startup problems that make polling impossible.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
	#[error("no backend base address configured (set backend.base_url, FLEETWATCH_API_URL or --api-url)")]
	MissingBaseUrl,
	#[error("backend base address must start with http:// or https://, got {0:?}")]
	InvalidBaseUrl(String),
	#[error("polling interval must be greater than zero")]
	ZeroInterval,
}

/// Values from the command line or environment that win over the file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
	pub api_url: Option<String>,
	pub interval_ms: Option<u64>,
}

impl Config {
	pub fn apply(&mut self, overrides: &Overrides) {
		if let Some(url) = &overrides.api_url {
			self.backend.base_url = url.clone();
		}
		if let Some(ms) = overrides.interval_ms {
			self.polling.interval_ms = ms;
		}
	}

	/// Normalise the base address and reject settings the poller cannot run with.
	pub fn validate(&mut self) -> Result<(), ConfigError> {
		let url = self.backend.base_url.trim().trim_end_matches('/').to_string();
		if url.is_empty() {
			return Err(ConfigError::MissingBaseUrl);
		}
		if !(url.starts_with("http://") || url.starts_with("https://")) {
			return Err(ConfigError::InvalidBaseUrl(url));
		}
		if self.polling.interval_ms == 0 {
			return Err(ConfigError::ZeroInterval);
		}
		self.backend.base_url = url;
		Ok(())
	}

	pub fn poll_interval(&self) -> Duration {
		Duration::from_millis(self.polling.interval_ms)
	}

	pub fn request_timeout(&self) -> Duration {
		Duration::from_millis(self.backend.timeout_ms)
	}
}

/// Load `~/.fleetwatch/config.toml`, writing the default file on first run.
pub fn load_or_init(overrides: &Overrides) -> Result<Config> {
	load_from(&base_dir()?, overrides)
}

pub fn load_from(base_dir: &Path, overrides: &Overrides) -> Result<Config> {
	if !base_dir.exists() {
		fs::create_dir_all(base_dir)?;
	}

	let config_path = base_dir.join("config.toml");
	if !config_path.exists() {
		fs::write(&config_path, DEFAULT_CONFIG.trim_start())?;
	}
	let content = fs::read_to_string(&config_path)
		.with_context(|| format!("failed to read {}", config_path.display()))?;
	let mut cfg: Config = toml::from_str(&content)
		.with_context(|| format!("failed to parse {}", config_path.display()))?;
	cfg.apply(overrides);
	cfg.validate()?;
	Ok(cfg)
}

pub fn base_dir() -> Result<PathBuf> {
	dirs::home_dir()
		.map(|p| p.join(".fleetwatch"))
		.ok_or_else(|| anyhow::anyhow!("Failed to resolve home directory"))
}

pub fn logs_dir() -> Result<PathBuf> {
	let dir = base_dir()?.join("logs");
	fs::create_dir_all(&dir)?;
	Ok(dir)
}
