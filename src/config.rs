use crate::error::{ConfigError, Result};
use serde::Deserialize;
use std::path::Path;
use tracing::info;
use url::Url;

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_directory")]
    pub directory: String,
    #[serde(default = "default_log_filename")]
    pub filename: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BrowserConfig {
    #[serde(default = "default_headless")]
    pub headless: bool,
    #[serde(default = "default_window_width")]
    pub window_width: u32,
    #[serde(default = "default_window_height")]
    pub window_height: u32,
    #[serde(default = "default_navigation_timeout")]
    pub navigation_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExtractConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_max_polls")]
    pub max_polls: u32,
    #[serde(default = "default_stability_window")]
    pub stability_window: u32,
    #[serde(default = "default_click_attempts")]
    pub click_attempts: u32,
    #[serde(default = "default_context_attempts")]
    pub context_attempts: u32,
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_notebook_url")]
    pub notebook_url: String,

    #[serde(default = "default_library_url")]
    pub library_url: String,

    #[serde(default = "default_user_data_dir")]
    pub user_data_dir: String,

    #[serde(default = "default_out_dir")]
    pub out_dir: String,

    /// Text that separates a book title from its author inside a list entry.
    #[serde(default = "default_author_marker")]
    pub author_marker: String,

    #[serde(default = "default_max_books")]
    pub max_books: usize,

    #[serde(default)]
    pub browser: BrowserConfig,

    #[serde(default)]
    pub extract: ExtractConfig,

    #[serde(default)]
    pub logging: LogConfig,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            directory: default_log_directory(),
            filename: default_log_filename(),
        }
    }
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: default_headless(),
            window_width: default_window_width(),
            window_height: default_window_height(),
            navigation_timeout_secs: default_navigation_timeout(),
        }
    }
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            max_polls: default_max_polls(),
            stability_window: default_stability_window(),
            click_attempts: default_click_attempts(),
            context_attempts: default_context_attempts(),
            settle_ms: default_settle_ms(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            notebook_url: default_notebook_url(),
            library_url: default_library_url(),
            user_data_dir: default_user_data_dir(),
            out_dir: default_out_dir(),
            author_marker: default_author_marker(),
            max_books: default_max_books(),
            browser: BrowserConfig::default(),
            extract: ExtractConfig::default(),
            logging: LogConfig::default(),
        }
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::FileRead)?;

        let config: Config = toml::from_str(&content).map_err(ConfigError::Parse)?;

        config.validate()?;
        info!("Configuration loaded successfully");
        Ok(config)
    }

    /// Load from `path` when it exists, otherwise fall back to defaults.
    pub fn from_file_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            Self::from_file(path)
        } else {
            info!("No config file found, using defaults");
            Ok(Self::default())
        }
    }

    fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("notebook_url", &self.notebook_url),
            ("library_url", &self.library_url),
        ] {
            if value.is_empty() {
                return Err(ConfigError::MissingField(name.to_string()).into());
            }
            Url::parse(value).map_err(|e| {
                ConfigError::InvalidValue(format!("{} is not a valid URL: {}", name, e))
            })?;
        }

        if self.user_data_dir.is_empty() {
            return Err(ConfigError::InvalidValue(
                "user_data_dir cannot be empty".to_string(),
            )
            .into());
        }

        if self.author_marker.is_empty() {
            return Err(ConfigError::InvalidValue(
                "author_marker cannot be empty".to_string(),
            )
            .into());
        }

        if self.max_books == 0 {
            return Err(
                ConfigError::InvalidValue("max_books must be greater than 0".to_string()).into(),
            );
        }

        if self.extract.poll_interval_ms == 0 {
            return Err(ConfigError::InvalidValue(
                "extract.poll_interval_ms must be greater than 0".to_string(),
            )
            .into());
        }

        if self.extract.max_polls == 0 {
            return Err(ConfigError::InvalidValue(
                "extract.max_polls must be greater than 0".to_string(),
            )
            .into());
        }

        if self.extract.stability_window < 2 {
            return Err(ConfigError::InvalidValue(
                "extract.stability_window must be at least 2".to_string(),
            )
            .into());
        }

        if self.extract.stability_window > self.extract.max_polls {
            return Err(ConfigError::InvalidValue(
                "extract.stability_window cannot exceed extract.max_polls".to_string(),
            )
            .into());
        }

        if self.extract.click_attempts == 0 {
            return Err(ConfigError::InvalidValue(
                "extract.click_attempts must be greater than 0".to_string(),
            )
            .into());
        }

        if self.extract.context_attempts == 0 {
            return Err(ConfigError::InvalidValue(
                "extract.context_attempts must be greater than 0".to_string(),
            )
            .into());
        }

        if self.browser.navigation_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "browser.navigation_timeout_secs must be greater than 0".to_string(),
            )
            .into());
        }

        Ok(())
    }
}

fn default_notebook_url() -> String {
    "https://read.amazon.co.jp/notebook/".to_string()
}

fn default_library_url() -> String {
    "https://read.amazon.co.jp/kindle-library".to_string()
}

fn default_user_data_dir() -> String {
    "user_data".to_string()
}

fn default_out_dir() -> String {
    "_out".to_string()
}

fn default_author_marker() -> String {
    "著者:".to_string()
}

fn default_max_books() -> usize {
    500
}

fn default_headless() -> bool {
    true
}

fn default_window_width() -> u32 {
    1200
}

fn default_window_height() -> u32 {
    900
}

fn default_navigation_timeout() -> u64 {
    20
}

fn default_poll_interval_ms() -> u64 {
    600
}

fn default_max_polls() -> u32 {
    25
}

fn default_stability_window() -> u32 {
    2
}

fn default_click_attempts() -> u32 {
    10
}

fn default_context_attempts() -> u32 {
    3
}

fn default_settle_ms() -> u64 {
    1000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_directory() -> String {
    "logs".to_string()
}

fn default_log_filename() -> String {
    "kindle-scraper.log".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.extract.stability_window, 2);
        assert_eq!(config.max_books, 500);
    }

    #[test]
    fn rejects_bad_notebook_url() {
        let mut config = Config::default();
        config.notebook_url = "not-a-url".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_stability_window_below_two() {
        let mut config = Config::default();
        config.extract.stability_window = 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_window_larger_than_max_polls() {
        let mut config = Config::default();
        config.extract.stability_window = 50;
        config.extract.max_polls = 10;
        assert!(config.validate().is_err());
    }

    #[test]
    fn parses_partial_toml() {
        let config: Config = toml::from_str(
            r#"
            notebook_url = "https://read.amazon.com/notebook"

            [extract]
            poll_interval_ms = 250
            "#,
        )
        .unwrap();
        assert_eq!(config.notebook_url, "https://read.amazon.com/notebook");
        assert_eq!(config.extract.poll_interval_ms, 250);
        assert_eq!(config.extract.max_polls, 25);
    }
}
