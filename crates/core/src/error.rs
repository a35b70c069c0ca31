//! Structured errors with codes, context and recovery suggestions
//!
//! Library crates keep their own `thiserror` enums; this type is what the
//! command-line front end reports to the user:
//! - Error codes for programmatic handling
//! - Optional context and recovery suggestion
//! - Serializable error reports

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Error codes for programmatic error handling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // IO errors (2xxx)
    /// Other filesystem failure
    IoError = 2000,
    /// Input or config file missing
    FileNotFound = 2001,
    /// File exists but cannot be read or written
    PermissionDenied = 2002,

    // Configuration errors (3xxx)
    /// Configuration could not be read
    ConfigError = 3000,
    /// Explicit configuration path does not exist
    ConfigNotFound = 3001,
    /// Configuration is not valid TOML or JSON
    ConfigParseError = 3002,
    /// A setting is out of range
    InvalidConfigValue = 3003,

    // Input errors (4xxx)
    /// Input could not be used
    InputError = 4000,
    /// Input is not a recognised image format
    UnsupportedMedia = 4001,
    /// No input decoded as an image
    NoImages = 4002,

    // Processing errors (5xxx)
    /// One or more entries failed in a batch
    BatchFailed = 5003,
    /// A batch was requested while another was running
    AlreadyProcessing = 5004,

    // Export errors (6xxx)
    /// Writing an output failed
    ExportError = 6000,
    /// A batch finished with nothing to save
    NothingToExport = 6001,
}

impl ErrorCode {
    /// Get the numeric code
    pub fn code(&self) -> u32 {
        *self as u32
    }

    /// Get a human-readable category
    pub fn category(&self) -> &'static str {
        match self.code() / 1000 {
            2 => "IO",
            3 => "Configuration",
            4 => "Input",
            5 => "Processing",
            6 => "Export",
            _ => "Unknown",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "E{:04}", self.code())
    }
}

/// Main error type with rich context
#[derive(Error, Debug)]
pub struct Error {
    /// Error code for programmatic handling
    pub code: ErrorCode,
    /// Human-readable message
    pub message: String,
    /// Additional context
    pub context: Option<String>,
    /// Recovery suggestion
    pub suggestion: Option<String>,
    /// Source error
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)?;
        if let Some(ctx) = &self.context {
            write!(f, "\n  Context: {}", ctx)?;
        }
        if let Some(suggestion) = &self.suggestion {
            write!(f, "\n  Suggestion: {}", suggestion)?;
        }
        Ok(())
    }
}

impl Error {
    /// Create a new error
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            context: None,
            suggestion: None,
            source: None,
        }
    }

    /// Add context to the error
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Add a recovery suggestion
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Add a source error
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Convert to a serializable report
    pub fn to_report(&self) -> ErrorReport {
        ErrorReport {
            code: self.code,
            code_str: self.code.to_string(),
            category: self.code.category().to_string(),
            message: self.message.clone(),
            context: self.context.clone(),
            suggestion: self.suggestion.clone(),
            source: self.source.as_ref().map(|e| e.to_string()),
        }
    }

    /// Process exit code matching this error's category
    pub fn exit_code(&self) -> i32 {
        match self.code.code() / 1000 {
            3 => exit_codes::CONFIG_ERROR,
            4 => exit_codes::INPUT_ERROR,
            5 => exit_codes::PROCESSING_ERROR,
            6 => exit_codes::EXPORT_ERROR,
            _ => exit_codes::FAILURE,
        }
    }

    // Convenience constructors

    /// A path that should exist does not
    pub fn file_not_found(path: impl AsRef<std::path::Path>) -> Self {
        Self::new(
            ErrorCode::FileNotFound,
            format!("File not found: {}", path.as_ref().display()),
        )
        .with_suggestion("Check that the file exists and you have read permissions")
    }

    /// Configuration could not be read
    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ConfigError, message)
    }

    /// An explicit `--config` path does not exist
    pub fn config_not_found(path: impl AsRef<std::path::Path>) -> Self {
        Self::new(
            ErrorCode::ConfigNotFound,
            format!("Configuration file not found: {}", path.as_ref().display()),
        )
        .with_suggestion("Create a multitool.toml file or pass --config with a valid path")
    }

    /// A setting is outside its allowed range
    pub fn invalid_config_value(key: &str, value: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::InvalidConfigValue,
            format!("Invalid value for {}: {}", key, value),
        )
    }

    /// None of the inputs registered
    pub fn no_images() -> Self {
        Self::new(ErrorCode::NoImages, "None of the inputs could be loaded as images")
            .with_suggestion("Pass PNG, JPEG, GIF or WebP files")
    }

    /// A batch reported failure
    pub fn batch_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::BatchFailed, message)
            .with_suggestion("Remove the failing files and run the batch again")
    }

    /// Saving outputs failed
    pub fn export(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ExportError, message)
    }
}

/// Serializable error report for logging and machine-readable output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorReport {
    /// Error code
    pub code: ErrorCode,
    /// Code as displayed, e.g. `E5003`
    pub code_str: String,
    /// Category name
    pub category: String,
    /// Human-readable message
    pub message: String,
    /// Additional context
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    /// Recovery suggestion
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    /// Source error message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Exit codes for CLI commands
pub mod exit_codes {
    /// Failure without a more specific category
    pub const FAILURE: i32 = 1;
    /// Inputs missing or unusable
    pub const INPUT_ERROR: i32 = 2;
    /// Configuration missing or invalid
    pub const CONFIG_ERROR: i32 = 3;
    /// Batch processing failed
    pub const PROCESSING_ERROR: i32 = 4;
    /// Saving outputs failed
    pub const EXPORT_ERROR: i32 = 5;
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        let code = match err.kind() {
            std::io::ErrorKind::NotFound => ErrorCode::FileNotFound,
            std::io::ErrorKind::PermissionDenied => ErrorCode::PermissionDenied,
            _ => ErrorCode::IoError,
        };
        Error::new(code, err.to_string()).with_source(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::new(ErrorCode::ConfigParseError, format!("JSON parse error: {}", err))
            .with_source(err)
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::new(ErrorCode::ConfigParseError, format!("TOML parse error: {}", err))
            .with_source(err)
    }
}

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Attach context to the error, if any
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }
}
