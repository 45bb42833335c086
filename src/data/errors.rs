use thiserror::Error;

/// Errors from live retrieval sources (market data, news)
#[derive(Error, Debug)]
pub enum DataError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Parse error: {message}")]
    Parse { message: String },

    #[error("API error: {message} (status: {status_code})")]
    Api { status_code: u16, message: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Rate limit exceeded, retry after {retry_after} seconds")]
    RateLimit { retry_after: u64 },

    #[error("Invalid symbol: {0}")]
    InvalidSymbol(String),

    #[error("No data available for {0}")]
    NoData(String),

    #[error("Timeout error: operation took longer than {timeout_seconds}s")]
    Timeout { timeout_seconds: u64 },

    #[error("Data validation error: {field} - {message}")]
    Validation { field: String, message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type DataResult<T> = Result<T, DataError>;

impl DataError {
    pub fn is_retryable(&self) -> bool {
        match self {
            DataError::Network(_) => true,
            DataError::RateLimit { .. } => true,
            DataError::Timeout { .. } => true,
            DataError::Api { status_code, .. } => *status_code >= 500 || *status_code == 429,
            _ => false,
        }
    }

    /// Suggested delay in seconds before retrying
    pub fn retry_delay(&self) -> Option<u64> {
        match self {
            DataError::RateLimit { retry_after } => Some(*retry_after),
            DataError::Network(_) => Some(1),
            DataError::Timeout { .. } => Some(2),
            DataError::Api { status_code, .. } if *status_code >= 500 => Some(5),
            _ => None,
        }
    }

    pub fn parse_error<S: Into<String>>(message: S) -> Self {
        DataError::Parse {
            message: message.into(),
        }
    }

    pub fn validation_error<S: Into<String>>(field: S, message: S) -> Self {
        DataError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn api_error<S: Into<String>>(status_code: u16, message: S) -> Self {
        DataError::Api {
            status_code,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(DataError::api_error(503, "unavailable").is_retryable());
        assert!(DataError::api_error(429, "slow down").is_retryable());
        assert!(!DataError::api_error(404, "missing").is_retryable());
        assert!(!DataError::Config("no key".into()).is_retryable());
        assert!(DataError::Timeout { timeout_seconds: 10 }.is_retryable());
    }

    #[test]
    fn test_retry_delay() {
        assert_eq!(DataError::RateLimit { retry_after: 12 }.retry_delay(), Some(12));
        assert_eq!(DataError::api_error(500, "boom").retry_delay(), Some(5));
        assert_eq!(DataError::parse_error("bad").retry_delay(), None);
    }
}
