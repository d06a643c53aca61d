//! Error types for the gupload crate.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while managing accounts or talking to Google Drive.
#[derive(Error, Debug)]
pub enum GuploadError {
    #[error("Config file {path:?} is not usable: {source}")]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid account name '{0}': use only letters, digits and underscores")]
    InvalidName(String),

    #[error("Account '{0}' already exists")]
    DuplicateName(String),

    #[error("Account '{0}' does not exist")]
    NotFound(String),

    #[error("Account '{0}' is not configured")]
    NoSuchAccount(String),

    #[error("Input required but no interactive terminal is available: {0}")]
    NonInteractive(String),

    #[error("{0} is missing and cannot be asked for without a terminal")]
    NonInteractiveCredential(&'static str),

    #[error("Invalid {kind}: value does not have the expected format")]
    CredentialShape { kind: &'static str },

    #[error("Authorization code exchange failed: {0}")]
    TokenExchange(String),

    #[error("Access token refresh failed: {0}")]
    Refresh(String),

    #[error("Transfer failed: {0}")]
    Transfer(String),

    #[error("Could not read metadata: {0}")]
    Metadata(String),

    #[error("Sharing failed: {0}")]
    Share(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Invalid URL or ID: {0}")]
    InvalidUrlOrId(String),
}

/// Result type alias for GuploadError.
pub type Result<T> = std::result::Result<T, GuploadError>;

impl GuploadError {
    pub(crate) fn config_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::ConfigIo {
            path: path.into(),
            source,
        }
    }

    /// Whether the operation that produced this error can be retried by asking
    /// the user again.
    pub fn is_reprompt(&self) -> bool {
        matches!(
            self,
            Self::InvalidName(_) | Self::DuplicateName(_) | Self::CredentialShape { .. }
        )
    }
}
