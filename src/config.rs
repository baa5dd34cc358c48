//! Configuration for seoflow.
//!
//! Settings are merged from, lowest to highest precedence:
//! 1. `.seoflow/seoflow.toml` in the project directory
//! 2. Environment variables (`SEOFLOW_ROOT`, `SEOFLOW_LOG`, `SEOFLOW_LOG_FORMAT`)
//! 3. CLI arguments

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

pub const CONFIG_DIR: &str = ".seoflow";
pub const CONFIG_FILE: &str = "seoflow.toml";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogFormat::Pretty => write!(f, "pretty"),
            LogFormat::Json => write!(f, "json"),
        }
    }
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            _ => anyhow::bail!("Invalid log format '{}'. Valid values: pretty, json", s),
        }
    }
}

/// Where state, reports, profiles and logs live.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StorageSection {
    /// Storage root; relative paths resolve against the project directory.
    /// Defaults to `.seoflow`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<PathBuf>,
    /// Profile directory; defaults to `<root>/profiles`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profiles: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSection {
    /// `tracing` filter directive, e.g. `info` or `seoflow=debug`
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
    /// Also write daily-rotated logs under `<root>/logs`
    #[serde(default = "default_true")]
    pub file: bool,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            file: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSection {
    /// Most state managers kept in memory at once
    #[serde(default = "default_cache_capacity")]
    pub capacity: usize,
    /// Seconds an unused state manager stays cached
    #[serde(default = "default_idle_ttl_secs")]
    pub idle_ttl_secs: u64,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            capacity: default_cache_capacity(),
            idle_ttl_secs: default_idle_ttl_secs(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_cache_capacity() -> usize {
    64
}

fn default_idle_ttl_secs() -> u64 {
    900
}

/// The complete seoflow.toml structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SeoflowToml {
    #[serde(default)]
    pub storage: StorageSection,
    #[serde(default)]
    pub logging: LoggingSection,
    #[serde(default)]
    pub cache: CacheSection,
}

impl SeoflowToml {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse seoflow.toml")
    }

    /// Load `<config_dir>/seoflow.toml`, or defaults when it doesn't exist.
    pub fn load_or_default(config_dir: &Path) -> Result<Self> {
        let path = config_dir.join(CONFIG_FILE);
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize seoflow.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Validate the configuration and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.cache.capacity == 0 {
            warnings.push("cache.capacity is 0; at least one manager is always kept".to_string());
        }
        if self.cache.idle_ttl_secs == 0 {
            warnings.push("cache.idle_ttl_secs is 0; state is re-read on every request".to_string());
        }
        if tracing_subscriber::EnvFilter::try_new(&self.logging.level).is_err() {
            warnings.push(format!(
                "Invalid logging.level '{}': not a valid filter directive",
                self.logging.level
            ));
        }
        warnings
    }
}

/// CLI overrides, applied last.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub root: Option<PathBuf>,
    pub log_level: Option<String>,
    pub log_format: Option<LogFormat>,
    pub no_log_file: bool,
}

/// Resolved runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub project_dir: PathBuf,
    pub config_dir: PathBuf,
    pub root: PathBuf,
    pub sessions_dir: PathBuf,
    pub reports_dir: PathBuf,
    pub profiles_dir: PathBuf,
    pub log_dir: PathBuf,
    pub log_level: String,
    pub log_format: LogFormat,
    pub log_to_file: bool,
    pub cache_capacity: usize,
    pub cache_idle_ttl: Duration,
    toml: SeoflowToml,
}

impl Config {
    pub fn new(project_dir: PathBuf, cli: CliOverrides) -> Result<Self> {
        Self::resolve(project_dir, cli, |key| std::env::var(key).ok())
    }

    /// Resolve with an explicit environment lookup.
    pub fn resolve(
        project_dir: PathBuf,
        cli: CliOverrides,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let project_dir = project_dir
            .canonicalize()
            .context("Failed to resolve project directory")?;
        let config_dir = project_dir.join(CONFIG_DIR);
        let toml = SeoflowToml::load_or_default(&config_dir)?;

        let root = cli
            .root
            .clone()
            .or_else(|| env("SEOFLOW_ROOT").map(PathBuf::from))
            .or_else(|| toml.storage.root.clone())
            .unwrap_or_else(|| PathBuf::from(CONFIG_DIR));
        let root = if root.is_absolute() {
            root
        } else {
            project_dir.join(root)
        };

        let profiles_dir = match &toml.storage.profiles {
            Some(p) if p.is_absolute() => p.clone(),
            Some(p) => project_dir.join(p),
            None => root.join("profiles"),
        };

        let log_level = cli
            .log_level
            .clone()
            .or_else(|| env("SEOFLOW_LOG"))
            .unwrap_or_else(|| toml.logging.level.clone());

        let log_format = match cli.log_format {
            Some(format) => format,
            None => match env("SEOFLOW_LOG_FORMAT") {
                Some(value) => value.parse().context("Invalid SEOFLOW_LOG_FORMAT")?,
                None => toml.logging.format,
            },
        };

        Ok(Self {
            sessions_dir: root.join("sessions"),
            reports_dir: root.join("reports"),
            log_dir: root.join("logs"),
            profiles_dir,
            root,
            project_dir,
            config_dir,
            log_level,
            log_format,
            log_to_file: toml.logging.file && !cli.no_log_file,
            cache_capacity: toml.cache.capacity.max(1),
            cache_idle_ttl: Duration::from_secs(toml.cache.idle_ttl_secs),
            toml,
        })
    }

    pub fn toml(&self) -> &SeoflowToml {
        &self.toml
    }

    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join(CONFIG_FILE)
    }

    pub fn ensure_directories(&self) -> Result<()> {
        std::fs::create_dir_all(&self.sessions_dir)
            .context("Failed to create sessions directory")?;
        std::fs::create_dir_all(&self.reports_dir).context("Failed to create reports directory")?;
        std::fs::create_dir_all(&self.profiles_dir)
            .context("Failed to create profiles directory")?;
        if self.log_to_file {
            std::fs::create_dir_all(&self.log_dir).context("Failed to create log directory")?;
        }
        Ok(())
    }
}
