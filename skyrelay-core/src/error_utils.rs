use crate::error::*;
use std::time::Duration;
use tracing::{error, warn};

pub trait ErrorExt {
    fn log_error(&self) -> &Self;
    fn log_warn(&self) -> &Self;
    fn is_retryable(&self) -> bool;
    fn retry_after(&self) -> Option<Duration>;
    fn user_friendly_message(&self) -> String;
    fn error_code(&self) -> String;
}

impl ErrorExt for CoreError {
    fn log_error(&self) -> &Self {
        error!("CoreError: {}", self);
        match self {
            CoreError::SourceFetch(e) => {
                error!("Source fetch error details: {:?}", e);
            }
            CoreError::Publish(e) => {
                error!("Publish error details: {:?}", e);
            }
            CoreError::Config(e) => {
                error!("Configuration error details: {:?}", e);
            }
            _ => {}
        }
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("CoreError (warning): {}", self);
        self
    }

    fn is_retryable(&self) -> bool {
        match self {
            CoreError::SourceFetch(e) => e.is_retryable(),
            CoreError::MediaFetch(e) => e.is_retryable(),
            CoreError::Summary(e) => e.is_retryable(),
            CoreError::Publish(e) => e.is_retryable(),
            CoreError::Network(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            CoreError::Timeout { .. } => true,
            CoreError::Io(_) => true,
            _ => false,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            CoreError::SourceFetch(e) => e.retry_after(),
            CoreError::Summary(e) => e.retry_after(),
            CoreError::Publish(e) => e.retry_after(),
            _ => None,
        }
    }

    fn user_friendly_message(&self) -> String {
        match self {
            CoreError::SourceFetch(e) => e.user_friendly_message(),
            CoreError::Publish(e) => e.user_friendly_message(),
            CoreError::Config(e) => e.user_friendly_message(),
            CoreError::Network(_) => {
                "Network connection error. Please check your internet connection.".to_string()
            }
            CoreError::Timeout { seconds } => {
                format!("The operation did not complete within {} seconds.", seconds)
            }
            CoreError::Storage(e) => format!("Unit store problem: {}", e),
            _ => "An unexpected error occurred. Please try again later.".to_string(),
        }
    }

    fn error_code(&self) -> String {
        match self {
            CoreError::SourceFetch(e) => e.error_code(),
            CoreError::MediaFetch(_) => "MEDIA_FETCH".to_string(),
            CoreError::Summary(_) => "SUMMARY".to_string(),
            CoreError::Storage(e) => e.error_code(),
            CoreError::Publish(e) => e.error_code(),
            CoreError::Config(_) => "CONFIG".to_string(),
            CoreError::Io(_) => "IO".to_string(),
            CoreError::Serialization(_) => "SERIALIZATION".to_string(),
            CoreError::Network(_) => "NETWORK".to_string(),
            CoreError::Timeout { .. } => "TIMEOUT".to_string(),
            CoreError::Internal { .. } => "INTERNAL".to_string(),
        }
    }
}

impl ErrorExt for SourceFetchError {
    fn log_error(&self) -> &Self {
        error!("SourceFetchError: {}", self);
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("SourceFetchError (warning): {}", self);
        self
    }

    fn is_retryable(&self) -> bool {
        match self {
            SourceFetchError::RateLimitExceeded { .. } => true,
            SourceFetchError::RequestTimeout => true,
            // The cached token is dropped on 401, so the next attempt re-authenticates.
            SourceFetchError::InvalidToken => true,
            SourceFetchError::ServerError { status_code } => *status_code >= 500,
            SourceFetchError::InvalidResponse { .. } => true,
            _ => false,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            SourceFetchError::RateLimitExceeded { retry_after } => {
                Some(Duration::from_secs(*retry_after))
            }
            _ => None,
        }
    }

    fn user_friendly_message(&self) -> String {
        match self {
            SourceFetchError::AuthenticationFailed { .. } => {
                "Reddit authentication failed. Please check your credentials.".to_string()
            }
            SourceFetchError::RateLimitExceeded { retry_after } => format!(
                "Too many requests. Please wait {} seconds before trying again.",
                retry_after
            ),
            SourceFetchError::SourceNotFound { source_name } => {
                format!("Subreddit '{}' not found or is private.", source_name)
            }
            _ => "Reddit API error occurred. Please try again later.".to_string(),
        }
    }

    fn error_code(&self) -> String {
        match self {
            SourceFetchError::AuthenticationFailed { .. } => "SOURCE_AUTH_FAILED".to_string(),
            SourceFetchError::RateLimitExceeded { .. } => "SOURCE_RATE_LIMIT".to_string(),
            SourceFetchError::Forbidden { .. } => "SOURCE_FORBIDDEN".to_string(),
            SourceFetchError::SourceNotFound { .. } => "SOURCE_NOT_FOUND".to_string(),
            SourceFetchError::InvalidToken => "SOURCE_INVALID_TOKEN".to_string(),
            SourceFetchError::RequestTimeout => "SOURCE_TIMEOUT".to_string(),
            SourceFetchError::InvalidResponse { .. } => "SOURCE_INVALID_RESPONSE".to_string(),
            SourceFetchError::ServerError { .. } => "SOURCE_SERVER_ERROR".to_string(),
        }
    }
}

impl MediaFetchError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, MediaFetchError::DownloadFailed { status_code, .. } if *status_code >= 500 || *status_code == 429)
    }
}

impl SummaryError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SummaryError::RateLimitExceeded { .. }
                | SummaryError::ServiceUnavailable { .. }
                | SummaryError::RequestTimeout { .. }
        )
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            SummaryError::RateLimitExceeded { retry_after, .. } => {
                Some(Duration::from_secs(*retry_after))
            }
            _ => None,
        }
    }
}

impl StorageError {
    pub fn error_code(&self) -> String {
        match self {
            StorageError::DuplicateUnit { .. } => "STORAGE_DUPLICATE_UNIT".to_string(),
            StorageError::CorruptUnit { .. } => "STORAGE_CORRUPT_UNIT".to_string(),
            StorageError::UnitNotFound { .. } => "STORAGE_UNIT_NOT_FOUND".to_string(),
            StorageError::StagingUnavailable { .. } => "STORAGE_STAGING_UNAVAILABLE".to_string(),
        }
    }
}

impl ErrorExt for PublishError {
    fn log_error(&self) -> &Self {
        error!("PublishError: {}", self);
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("PublishError (warning): {}", self);
        self
    }

    fn is_retryable(&self) -> bool {
        matches!(
            self,
            PublishError::SessionExpired
                | PublishError::RateLimitExceeded { .. }
                | PublishError::ServerError { .. }
                | PublishError::BlobUploadFailed { .. }
        )
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            PublishError::RateLimitExceeded { retry_after } => {
                Some(Duration::from_secs(*retry_after))
            }
            _ => None,
        }
    }

    fn user_friendly_message(&self) -> String {
        match self {
            PublishError::AuthenticationFailed { .. } => {
                "Bluesky login failed. Please check the identifier and app password.".to_string()
            }
            PublishError::Rejected { reason } => format!("Bluesky rejected the post: {}", reason),
            _ => "Publishing failed. The unit will be retried on the next run.".to_string(),
        }
    }

    fn error_code(&self) -> String {
        match self {
            PublishError::AuthenticationFailed { .. } => "PUBLISH_AUTH_FAILED".to_string(),
            PublishError::SessionExpired => "PUBLISH_SESSION_EXPIRED".to_string(),
            PublishError::RateLimitExceeded { .. } => "PUBLISH_RATE_LIMIT".to_string(),
            PublishError::Rejected { .. } => "PUBLISH_REJECTED".to_string(),
            PublishError::BlobUploadFailed { .. } => "PUBLISH_BLOB_UPLOAD_FAILED".to_string(),
            PublishError::ServerError { .. } => "PUBLISH_SERVER_ERROR".to_string(),
            PublishError::InvalidResponse { .. } => "PUBLISH_INVALID_RESPONSE".to_string(),
        }
    }
}

impl ConfigError {
    pub fn user_friendly_message(&self) -> String {
        match self {
            ConfigError::FileNotFound { path } => format!(
                "Configuration file '{}' was not found. Pass --config to point at it.",
                path
            ),
            ConfigError::MissingField { field } => {
                format!("Required configuration field '{}' is missing.", field)
            }
            ConfigError::MissingEnvironmentVariable { var_name } => format!(
                "Environment variable {} is not set. Add it to the environment or a .env file.",
                var_name
            ),
            ConfigError::InvalidValue { field, value } => {
                format!("Invalid value '{}' for '{}'.", value, field)
            }
            _ => format!("Invalid configuration: {}", self),
        }
    }
}
