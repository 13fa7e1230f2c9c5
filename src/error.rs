use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Browser error: {0}")]
    Browser(#[from] BrowserError),

    #[error("Extraction error: {0}")]
    Extract(#[from] ExtractError),

    #[error("Export error: {0}")]
    Export(#[from] ExportError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Missing required configuration: {0}")]
    MissingField(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

#[derive(Error, Debug)]
pub enum BrowserError {
    #[error("Failed to launch browser: {0}")]
    Launch(String),

    #[error("Navigation failed for {url}: {message}")]
    Navigation { url: String, message: String },

    #[error("Script evaluation failed: {0}")]
    Script(String),

    #[error("Timed out waiting for selector '{selector}' after {waited_ms} ms")]
    SelectorTimeout { selector: String, waited_ms: u64 },
}

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("Detail content for '{title}' never stabilized within {polls} polls")]
    Timeout { title: String, polls: u32 },

    #[error("Could not click list item '{title}'")]
    ClickFailed { title: String },

    #[error("Book context for '{title}' did not appear after clicking")]
    ContextNotFound { title: String },
}

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Input CSV not found: {0}")]
    MissingInput(String),

    #[error("Malformed CSV row: {0}")]
    BadRow(String),
}

pub type Result<T> = std::result::Result<T, AppError>;
