use skyrelay_core::{
    ConfigError, CoreError, ErrorExt, MediaFetchError, PublishError, SourceFetchError,
    StorageError, SummaryError,
};
use std::time::Duration;

#[test]
fn test_error_codes() {
    let source_error = CoreError::SourceFetch(SourceFetchError::InvalidToken);
    assert_eq!(source_error.error_code(), "SOURCE_INVALID_TOKEN");

    let storage_error = CoreError::Storage(StorageError::DuplicateUnit {
        unit_id: "rust_abc".to_string(),
    });
    assert_eq!(storage_error.error_code(), "STORAGE_DUPLICATE_UNIT");

    let summary_error = CoreError::Summary(SummaryError::InvalidApiKey {
        provider: "openai".to_string(),
    });
    assert_eq!(summary_error.error_code(), "SUMMARY");

    let publish_error = CoreError::Publish(PublishError::SessionExpired);
    assert_eq!(publish_error.error_code(), "PUBLISH_SESSION_EXPIRED");

    let config_error = CoreError::Config(ConfigError::MissingField {
        field: "output_dir".to_string(),
    });
    assert_eq!(config_error.error_code(), "CONFIG");
}

#[test]
fn test_retryable_errors() {
    let retryable = CoreError::SourceFetch(SourceFetchError::RateLimitExceeded { retry_after: 60 });
    assert!(retryable.is_retryable());

    let media_5xx = CoreError::MediaFetch(MediaFetchError::DownloadFailed {
        url: "https://i.redd.it/a.jpg".to_string(),
        status_code: 503,
    });
    assert!(media_5xx.is_retryable());

    let media_404 = CoreError::MediaFetch(MediaFetchError::DownloadFailed {
        url: "https://i.redd.it/a.jpg".to_string(),
        status_code: 404,
    });
    assert!(!media_404.is_retryable());

    let duplicate = CoreError::Storage(StorageError::DuplicateUnit {
        unit_id: "rust_abc".to_string(),
    });
    assert!(!duplicate.is_retryable());

    let rejected = CoreError::Publish(PublishError::Rejected {
        reason: "too long".to_string(),
    });
    assert!(!rejected.is_retryable());
}

#[test]
fn test_retry_after() {
    let rate_limit_error =
        CoreError::SourceFetch(SourceFetchError::RateLimitExceeded { retry_after: 60 });
    assert_eq!(rate_limit_error.retry_after(), Some(Duration::from_secs(60)));

    let summary_limit = CoreError::Summary(SummaryError::RateLimitExceeded {
        provider: "openai".to_string(),
        retry_after: 20,
    });
    assert_eq!(summary_limit.retry_after(), Some(Duration::from_secs(20)));

    let timeout_error = CoreError::Timeout { seconds: 30 };
    assert_eq!(timeout_error.retry_after(), None);
}

#[test]
fn test_user_friendly_messages() {
    let config_error = CoreError::Config(ConfigError::MissingEnvironmentVariable {
        var_name: "OPENAI_API_KEY".to_string(),
    });
    let message = config_error.user_friendly_message();
    assert!(message.contains("OPENAI_API_KEY"));

    let source_error = CoreError::SourceFetch(SourceFetchError::SourceNotFound {
        source_name: "doesnotexist".to_string(),
    });
    assert!(source_error.user_friendly_message().contains("doesnotexist"));
}
