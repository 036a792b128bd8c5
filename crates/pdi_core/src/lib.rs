pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod lifecycle;
pub mod pagerduty;
pub mod repo;
pub mod row;
pub mod schema;
pub mod telemetry;
pub mod validate;

#[cfg(test)]
mod tests {
    use super::error::{AppError, RecordError};

    #[test]
    fn app_error_is_structured() {
        let err = AppError::new("DB_TEST", "db failed").with_retryable(false);
        assert_eq!(err.code, "DB_TEST");
        assert_eq!(err.message, "db failed");
        assert!(!err.retryable);
    }

    #[test]
    fn record_errors_convert_with_code() {
        let err: AppError = RecordError::validation("deduplication_key", "too long").into();
        assert_eq!(err.code, "RECORD_VALIDATION_FAILED");
        assert_eq!(err.details.as_deref(), Some("field=deduplication_key"));

        let err: AppError = RecordError::IllegalState("detached".to_string()).into();
        assert_eq!(err.code, "RECORD_ILLEGAL_STATE");
    }
}
