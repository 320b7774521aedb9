/// Errors returned by the monitoring backend client.
///
/// # Examples
///
/// ```rust
/// use cwmon_backend::error::BackendError;
///
/// let err = BackendError::Rejected("metric name too long".to_string());
/// assert!(err.to_string().contains("too long"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// The backend API returned a non-success status.
    #[error("Backend API error: status={status}, body={body}")]
    HttpError { status: u16, body: String },

    /// An underlying HTTP transport error from `reqwest`.
    #[error("Backend network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    /// A response body was not the JSON we expected.
    #[error("Backend JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// The backend accepted the request but reported it as unsuccessful.
    #[error("Backend rejected request: {0}")]
    Rejected(String),

    /// Client configuration is missing or invalid.
    #[error("Backend configuration error: {0}")]
    ConfigError(String),
}

/// Convenience `Result` alias for backend operations.
pub type Result<T> = std::result::Result<T, BackendError>;
