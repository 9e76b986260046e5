use thiserror::Error;

/// Coarse classification of everything that can go wrong while resolving a
/// forecast. The presentation layer maps each kind to its own message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidInput,
    StorageUnavailable,
    FetchNotFound,
    FetchUnauthorized,
    FetchConnectionError,
    FetchTimeout,
    FetchMalformed,
    /// Quota persistence is unreachable; counting continues in memory.
    QuotaDegraded,
}

/// Failure reported by a [`crate::WeatherProvider`].
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("location not found upstream")]
    NotFound,

    #[error("upstream rejected the API key")]
    Unauthorized,

    #[error("connection error: {0}")]
    ConnectionError(String),

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("request timed out")]
    Timeout,
}

impl FetchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound => ErrorKind::FetchNotFound,
            Self::Unauthorized => ErrorKind::FetchUnauthorized,
            Self::ConnectionError(_) => ErrorKind::FetchConnectionError,
            Self::MalformedResponse(_) => ErrorKind::FetchMalformed,
            Self::Timeout => ErrorKind::FetchTimeout,
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_decode() {
            Self::MalformedResponse(err.to_string())
        } else {
            Self::ConnectionError(err.to_string())
        }
    }
}

/// Errors returned by the caching layer.
#[derive(Debug, Error)]
pub enum WeatherError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("{operation} for '{city}' failed: {source}")]
    Fetch {
        city: String,
        operation: &'static str,
        #[source]
        source: FetchError,
    },
}

impl WeatherError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::StorageUnavailable(_) => ErrorKind::StorageUnavailable,
            Self::Fetch { source, .. } => source.kind(),
        }
    }

    pub(crate) fn storage(err: impl std::fmt::Display) -> Self {
        Self::StorageUnavailable(err.to_string())
    }
}

impl From<rusqlite::Error> for WeatherError {
    fn from(err: rusqlite::Error) -> Self {
        Self::storage(err)
    }
}

pub type Result<T, E = WeatherError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_errors_keep_their_kind_when_wrapped() {
        let err = WeatherError::Fetch {
            city: "Atlantis".into(),
            operation: "forecast fetch",
            source: FetchError::NotFound,
        };

        assert_eq!(err.kind(), ErrorKind::FetchNotFound);
        let msg = err.to_string();
        assert!(msg.contains("Atlantis"));
        assert!(msg.contains("forecast fetch"));
    }

    #[test]
    fn fetch_error_kinds() {
        assert_eq!(FetchError::Unauthorized.kind(), ErrorKind::FetchUnauthorized);
        assert_eq!(FetchError::Timeout.kind(), ErrorKind::FetchTimeout);
        assert_eq!(
            FetchError::ConnectionError("reset".into()).kind(),
            ErrorKind::FetchConnectionError
        );
        assert_eq!(
            FetchError::MalformedResponse("eof".into()).kind(),
            ErrorKind::FetchMalformed
        );
    }

    #[test]
    fn sqlite_errors_are_storage_unavailable() {
        let err: WeatherError = rusqlite::Error::InvalidQuery.into();
        assert_eq!(err.kind(), ErrorKind::StorageUnavailable);
    }
}
