/// Errors that can occur when interacting with the cloud provider API.
///
/// # Examples
///
/// ```rust
/// use cwmon_cloud::error::CloudProviderError;
///
/// let err = CloudProviderError::ConfigError("missing access key".to_string());
/// assert!(err.to_string().contains("access key"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum CloudProviderError {
    /// HTTP-level error: non-2xx status code with a body that is not a service error document.
    #[error("{service} API HTTP error: status={status}, body={body}")]
    HttpError {
        service: String,
        status: u16,
        body: String,
    },

    /// The service answered with an error document.
    #[error("{service} API error: code={code}, message={message}")]
    ApiResponseError {
        service: String,
        code: String,
        message: String,
    },

    /// Request was throttled by the provider.
    #[error("{service} API rate limited: {message}")]
    RateLimited { service: String, message: String },

    /// HMAC signing failed (invalid key length).
    #[error("HMAC signing error: {0}")]
    HmacError(String),

    /// An underlying HTTP transport error from `reqwest`, including request timeouts.
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    /// The response body could not be decoded.
    #[error("XML decode error: {0}")]
    XmlError(#[from] quick_xml::de::DeError),

    /// Provider configuration is missing or invalid.
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Convenience type alias so callers can write `error::Result<T>`.
pub type Result<T> = std::result::Result<T, CloudProviderError>;
