use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Database migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("API error {code}: {message}")]
    Api { code: String, message: String },

    #[error("Unparseable API response: {0}")]
    Unparseable(String),

    #[error("Operation cancelled by shutdown")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AppError {
    /// Transient failures are worth retrying: network-level errors and
    /// response bodies that are neither JSON nor a recognized outage page.
    /// API-level errors (bad method, bad params) and cancellation are not.
    pub fn is_transient(&self) -> bool {
        matches!(self, AppError::Http(_) | AppError::Unparseable(_))
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_errors_are_not_transient() {
        let err = AppError::Api {
            code: "InvalidApiPath".to_string(),
            message: "bad path".to_string(),
        };
        assert!(!err.is_transient());
        assert!(!AppError::Cancelled.is_transient());
        assert!(!AppError::Config("missing key".to_string()).is_transient());
    }

    #[test]
    fn unparseable_is_transient() {
        assert!(AppError::Unparseable("garbage body".to_string()).is_transient());
    }
}
