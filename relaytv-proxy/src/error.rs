use std::time::Duration;

use axum::http::StatusCode;
use thiserror::Error;

/// Failures of one gateway exchange
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("missing url parameter")]
    MissingUrl,

    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("upstream host is not allowed: {0}")]
    ForbiddenHost(String),

    #[error("too many redirects (limit {0})")]
    TooManyRedirects(u32),

    #[error("invalid redirect: {0}")]
    InvalidRedirect(String),

    #[error("upstream did not respond within {0:?}")]
    Timeout(Duration),

    #[error("upstream request failed: {0}")]
    Upstream(#[from] reqwest::Error),

    #[error("failed to build response: {0}")]
    Response(#[from] axum::http::Error),
}

impl GatewayError {
    /// Status code the gateway answers with
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::MissingUrl
            | Self::InvalidUrl(_)
            | Self::InvalidRequest(_)
            | Self::UnsupportedScheme(_) => StatusCode::BAD_REQUEST,
            Self::ForbiddenHost(_) => StatusCode::FORBIDDEN,
            Self::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Self::Upstream(e) if e.is_timeout() => StatusCode::GATEWAY_TIMEOUT,
            Self::TooManyRedirects(_) | Self::InvalidRedirect(_) | Self::Upstream(_) => {
                StatusCode::BAD_GATEWAY
            }
            Self::Response(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether a client retry may succeed
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout(_) => true,
            Self::Upstream(e) => {
                e.is_timeout()
                    || e.is_connect()
                    || relaytv_core::resilience::retry::should_retry_error(e)
            }
            _ => false,
        }
    }
}

impl From<relaytv_core::Error> for GatewayError {
    fn from(err: relaytv_core::Error) -> Self {
        match err {
            relaytv_core::Error::InvalidUrl(msg) => Self::InvalidUrl(msg),
            other => Self::InvalidRequest(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(GatewayError::MissingUrl.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            GatewayError::ForbiddenHost("localhost".to_string()).status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            GatewayError::TooManyRedirects(10).status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            GatewayError::Timeout(Duration::from_secs(30)).status(),
            StatusCode::GATEWAY_TIMEOUT
        );
    }

    #[test]
    fn test_transient_classification() {
        assert!(GatewayError::Timeout(Duration::from_secs(1)).is_transient());
        assert!(!GatewayError::TooManyRedirects(10).is_transient());
        assert!(!GatewayError::MissingUrl.is_transient());
    }

    #[test]
    fn test_from_core_error() {
        let err: GatewayError = relaytv_core::Error::InvalidUrl("x".to_string()).into();
        assert!(matches!(err, GatewayError::InvalidUrl(_)));

        let err: GatewayError = relaytv_core::Error::InvalidInput("bad mode".to_string()).into();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }
}
