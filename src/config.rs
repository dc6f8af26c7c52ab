//! Runtime configuration.
//!
//! Defaults cover every field; an optional TOML file overrides them and
//! environment variables override the file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// sqlx connection string
    pub database_url: String,
    /// Where rendered PDF reports are written
    pub reports_dir: PathBuf,
    /// TrueType font for report text; a system font is searched for when unset
    pub report_font: Option<PathBuf>,
    pub log_filter: Option<String>,

    // --- fetch ---
    pub user_agent: String,
    pub static_timeout_secs: u64,
    pub render_timeout_secs: u64,
    /// Use rquest browser emulation for static fetches
    pub emulate_browser: bool,
    pub chrome_executable: Option<PathBuf>,
    pub max_concurrent_browsers: usize,

    // --- batch ---
    pub max_batch_urls: usize,
    pub max_concurrent_audits: usize,

    // --- insights ---
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub gemini_api_base: String,
    pub insights_timeout_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://sitesage.db?mode=rwc".to_string(),
            reports_dir: PathBuf::from("reports"),
            report_font: None,
            log_filter: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            static_timeout_secs: 10,
            render_timeout_secs: 30,
            emulate_browser: false,
            chrome_executable: None,
            max_concurrent_browsers: num_cpus::get().clamp(1, 4),
            max_batch_urls: 10,
            max_concurrent_audits: 4,
            gemini_api_key: None,
            gemini_model: "gemini-2.0-flash".to_string(),
            gemini_api_base: "https://generativelanguage.googleapis.com".to_string(),
            insights_timeout_secs: 30,
        }
    }
}

impl AppConfig {
    /// Load defaults, then `path` (if given and present), then the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) if p.exists() => Self::from_file(p)?,
            Some(p) => {
                tracing::warn!("Config file {} not found, using defaults", p.display());
                Self::default()
            }
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_toml(&raw).with_context(|| format!("invalid config file {}", path.display()))
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        toml::from_str(raw).context("failed to parse TOML config")
    }

    /// Apply overrides from a variable lookup. Unparseable numbers are ignored.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let parse_u64 = |key: &str| lookup(key).and_then(|v| v.trim().parse::<u64>().ok());
        let parse_usize = |key: &str| lookup(key).and_then(|v| v.trim().parse::<usize>().ok());

        if let Some(v) = lookup("SITESAGE_DATABASE_URL") {
            self.database_url = v;
        }
        if let Some(v) = lookup("SITESAGE_REPORTS_DIR") {
            self.reports_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("SITESAGE_REPORT_FONT") {
            self.report_font = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("SITESAGE_LOG") {
            self.log_filter = Some(v);
        }
        if let Some(v) = lookup("SITESAGE_USER_AGENT") {
            self.user_agent = v;
        }
        if let Some(v) = parse_u64("SITESAGE_STATIC_TIMEOUT_SECS") {
            self.static_timeout_secs = v;
        }
        if let Some(v) = parse_u64("SITESAGE_RENDER_TIMEOUT_SECS") {
            self.render_timeout_secs = v;
        }
        if let Some(v) = lookup("SITESAGE_CHROME_EXECUTABLE") {
            self.chrome_executable = Some(PathBuf::from(v));
        }
        if let Some(v) = parse_usize("SITESAGE_MAX_BROWSERS") {
            self.max_concurrent_browsers = v.max(1);
        }
        if let Some(v) = lookup("GEMINI_API_KEY").filter(|k| !k.trim().is_empty()) {
            self.gemini_api_key = Some(v);
        }
        if let Some(v) = lookup("GEMINI_MODEL") {
            self.gemini_model = v;
        }
    }

    pub fn static_timeout(&self) -> Duration {
        Duration::from_secs(self.static_timeout_secs)
    }

    pub fn render_timeout(&self) -> Duration {
        Duration::from_secs(self.render_timeout_secs)
    }

    pub fn insights_timeout(&self) -> Duration {
        Duration::from_secs(self.insights_timeout_secs)
    }
}
