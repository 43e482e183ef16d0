use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("CHAT_EXPORT_WEBHOOK environment variable not set and no webhook in settings.toml")]
    MissingWebhook,

    #[error("invalid date format: {0}")]
    InvalidDate(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("HTTP {status} from {method}")]
    HttpStatus { status: u16, method: String },

    #[error("portal API error {code}: {description}")]
    Api { code: String, description: String },

    #[error("malformed page: {0}")]
    MalformedPage(String),

    #[error("malformed message record: {0}")]
    MalformedRecord(String),

    #[error("{failed} of {total} chats failed to export")]
    ExportFailed { failed: usize, total: usize },

    #[error("failed to read file at {path}: {source}")]
    ReadFile {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to write file at {path}: {source}")]
    WriteFile {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("JSON serialization error: {0}")]
    JsonSerialize(String),

    #[error("JSON parse error: {0}")]
    JsonParse(String),

    #[error("TOML parse error: {0}")]
    TomlParse(String),
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_missing_webhook_display() {
        let err = AppError::MissingWebhook;
        assert!(err.to_string().starts_with("CHAT_EXPORT_WEBHOOK"));
    }

    #[test]
    fn test_invalid_date_display() {
        let err = AppError::InvalidDate("not-a-date".to_string());
        assert_eq!(err.to_string(), "invalid date format: not-a-date");
    }

    #[test]
    fn test_http_status_display() {
        let err = AppError::HttpStatus {
            status: 503,
            method: "im.dialog.messages.get".to_string(),
        };
        assert_eq!(err.to_string(), "HTTP 503 from im.dialog.messages.get");
    }

    #[test]
    fn test_api_display() {
        let err = AppError::Api {
            code: "ACCESS_DENIED".to_string(),
            description: "no access to chat".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "portal API error ACCESS_DENIED: no access to chat"
        );
    }

    #[test]
    fn test_malformed_page_display() {
        let err = AppError::MalformedPage("3 records without id".to_string());
        assert_eq!(err.to_string(), "malformed page: 3 records without id");
    }

    #[test]
    fn test_malformed_record_display() {
        let err = AppError::MalformedRecord("message 4 has no date".to_string());
        assert_eq!(err.to_string(), "malformed message record: message 4 has no date");
    }

    #[test]
    fn test_export_failed_display() {
        let err = AppError::ExportFailed { failed: 2, total: 9 };
        assert_eq!(err.to_string(), "2 of 9 chats failed to export");
    }

    #[test]
    fn test_write_file_display_and_source() {
        let io_err = io::Error::new(io::ErrorKind::PermissionDenied, "permission denied");
        let err = AppError::WriteFile {
            path: "/path/to/chat_1_export.json".to_string(),
            source: io_err,
        };
        assert!(err.to_string().contains("/path/to/chat_1_export.json"));
        assert!(err.to_string().contains("failed to write file"));
        assert!(err.source().is_some());
    }

    #[test]
    fn test_read_file_source() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "no such file");
        let err = AppError::ReadFile {
            path: "settings.toml".to_string(),
            source: io_err,
        };
        assert!(err.source().is_some());
    }

    #[test]
    fn test_toml_parse_display() {
        let err = AppError::TomlParse("invalid toml".to_string());
        assert_eq!(err.to_string(), "TOML parse error: invalid toml");
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<AppError>();
    }
}
