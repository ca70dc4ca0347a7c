use std::fmt;

use http::StatusCode;

/// Error returned by the registry API.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApiError {
    detail: String,
    status: Option<StatusCode>,
}

impl ApiError {
    /// An error response from the registry.
    pub fn new(status: StatusCode, detail: impl Into<String>) -> Self {
        Self {
            detail: detail.into(),
            status: Some(status),
        }
    }

    /// A failure before any response was received (connection, timeout, decoding).
    pub fn transport(detail: impl Into<String>) -> Self {
        Self {
            detail: detail.into(),
            status: None,
        }
    }

    /// HTTP status of the response, if there was one.
    #[must_use]
    pub const fn status(&self) -> Option<StatusCode> {
        self.status
    }

    /// Human readable cause.
    #[must_use]
    pub fn detail(&self) -> &str {
        &self.detail
    }

    /// 409: the record already exists.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        self.status == Some(StatusCode::CONFLICT)
    }

    /// 401: the credentials were rejected.
    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        self.status == Some(StatusCode::UNAUTHORIZED)
    }

    /// 404: the record does not exist.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.status == Some(StatusCode::NOT_FOUND)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "[{}] - {}", status.as_u16(), self.detail),
            None => f.write_str(&self.detail),
        }
    }
}

impl std::error::Error for ApiError {}
