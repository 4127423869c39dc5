use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Source fetch error: {0}")]
    SourceFetch(#[from] SourceFetchError),

    #[error("Media fetch error: {0}")]
    MediaFetch(#[from] MediaFetchError),

    #[error("Summary error: {0}")]
    Summary(#[from] SummaryError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Publish error: {0}")]
    Publish(#[from] PublishError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Operation timeout after {seconds} seconds")]
    Timeout { seconds: u64 },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

#[derive(Error, Debug, Clone)]
pub enum SourceFetchError {
    #[error("Authentication failed: {reason}")]
    AuthenticationFailed { reason: String },

    #[error("Rate limit exceeded. Retry after {retry_after} seconds")]
    RateLimitExceeded { retry_after: u64 },

    #[error("Forbidden access to resource: {resource}")]
    Forbidden { resource: String },

    #[error("Source not found: {source_name}")]
    SourceNotFound { source_name: String },

    #[error("Invalid OAuth token")]
    InvalidToken,

    #[error("Request timeout")]
    RequestTimeout,

    #[error("Invalid API response: {details}")]
    InvalidResponse { details: String },

    #[error("Server error: {status_code}")]
    ServerError { status_code: u16 },
}

#[derive(Error, Debug)]
pub enum MediaFetchError {
    #[error("Unsupported media URL: {url}")]
    UnsupportedUrl { url: String },

    #[error("Unsupported content type {content_type} for {url}")]
    UnsupportedContentType { url: String, content_type: String },

    #[error("Media too large: {size} bytes exceeds limit of {limit} bytes")]
    TooLarge { size: u64, limit: u64 },

    #[error("Download failed for {url} with status {status_code}")]
    DownloadFailed { url: String, status_code: u16 },

    #[error("External tool unavailable: {tool}")]
    ToolUnavailable { tool: String },

    #[error("External tool {tool} failed: {reason}")]
    ToolFailed { tool: String, reason: String },
}

#[derive(Error, Debug)]
pub enum SummaryError {
    #[error("API key invalid or missing for {provider}")]
    InvalidApiKey { provider: String },

    #[error("Rate limit exceeded for {provider}. Retry after {retry_after} seconds")]
    RateLimitExceeded { provider: String, retry_after: u64 },

    #[error("Provider service unavailable: {provider}")]
    ServiceUnavailable { provider: String },

    #[error("Request timeout for {provider}")]
    RequestTimeout { provider: String },

    #[error("Invalid response format from {provider}")]
    InvalidResponseFormat { provider: String },

    #[error("Request rejected by {provider}: {status_code}")]
    Rejected { provider: String, status_code: u16 },
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Unit already exists: {unit_id}")]
    DuplicateUnit { unit_id: String },

    #[error("Corrupt unit {unit_id}: missing {missing}")]
    CorruptUnit { unit_id: String, missing: String },

    #[error("Unit not found: {unit_id}")]
    UnitNotFound { unit_id: String },

    #[error("Staging area unavailable: {path}")]
    StagingUnavailable { path: String },
}

#[derive(Error, Debug)]
pub enum PublishError {
    #[error("Authentication failed: {reason}")]
    AuthenticationFailed { reason: String },

    #[error("Session expired")]
    SessionExpired,

    #[error("Rate limit exceeded. Retry after {retry_after} seconds")]
    RateLimitExceeded { retry_after: u64 },

    #[error("Post rejected: {reason}")]
    Rejected { reason: String },

    #[error("Blob upload failed for {file}: {reason}")]
    BlobUploadFailed { file: String, reason: String },

    #[error("Server error: {status_code}")]
    ServerError { status_code: u16 },

    #[error("Invalid response: {details}")]
    InvalidResponse { details: String },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },

    #[error("Invalid configuration format: {details}")]
    InvalidFormat { details: String },

    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid value for {field}: {value}")]
    InvalidValue { field: String, value: String },

    #[error("Environment variable not set: {var_name}")]
    MissingEnvironmentVariable { var_name: String },

    #[error("Configuration validation failed: {reason}")]
    ValidationFailed { reason: String },

    #[error("Output directory unusable: {path}: {reason}")]
    OutputDirectory { path: String, reason: String },

    #[error("Configuration parsing error: {0}")]
    Parse(#[from] toml::de::Error),
}
