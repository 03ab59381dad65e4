//! Timeout classes and retry classification for stream delivery
//!
//! Retry loops themselves use the `backon` crate at the call site; this
//! module holds the shared timeout configuration and error classification.

pub mod timeout {
    //! Timeout configuration
    //!
    //! The gateway's request timeout, the playlist fetch timeout and the
    //! segment fetch timeout are separate classes. A slow-but-healthy origin
    //! must never trip the short timeouts while streaming a large segment.

    use std::time::Duration;

    use crate::config::{GatewayConfig, PlaybackConfig};

    /// Default timeout for the gateway to receive an upstream response head
    pub const GATEWAY_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

    /// Default timeout for playlist/manifest fetches by the segmented engine
    pub const MANIFEST_FETCH_TIMEOUT: Duration = Duration::from_secs(20);

    /// Default timeout for a single segment fetch by the segmented engine
    pub const SEGMENT_FETCH_TIMEOUT: Duration = Duration::from_secs(3600);

    /// Timeout configuration
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TimeoutConfig {
        pub gateway_request: Duration,
        pub manifest_fetch: Duration,
        pub segment_fetch: Duration,
    }

    impl Default for TimeoutConfig {
        fn default() -> Self {
            Self {
                gateway_request: GATEWAY_REQUEST_TIMEOUT,
                manifest_fetch: MANIFEST_FETCH_TIMEOUT,
                segment_fetch: SEGMENT_FETCH_TIMEOUT,
            }
        }
    }

    impl TimeoutConfig {
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Build from the loaded gateway and playback sections
        #[must_use]
        pub const fn from_config(gateway: &GatewayConfig, playback: &PlaybackConfig) -> Self {
            Self {
                gateway_request: Duration::from_secs(gateway.request_timeout_secs),
                manifest_fetch: Duration::from_secs(playback.manifest_timeout_secs),
                segment_fetch: Duration::from_secs(playback.segment_timeout_secs),
            }
        }

        #[must_use]
        pub const fn with_gateway_request_timeout(mut self, timeout: Duration) -> Self {
            self.gateway_request = timeout;
            self
        }

        #[must_use]
        pub const fn with_manifest_fetch_timeout(mut self, timeout: Duration) -> Self {
            self.manifest_fetch = timeout;
            self
        }

        #[must_use]
        pub const fn with_segment_fetch_timeout(mut self, timeout: Duration) -> Self {
            self.segment_fetch = timeout;
            self
        }
    }
}

pub mod retry {
    //! Retry utilities

    /// Check if an error should be retried
    ///
    /// Walks the source chain looking for a transient `std::io::Error`, then
    /// falls back to string matching for errors that only expose the
    /// underlying failure in their message.
    pub fn should_retry_error(err: &(dyn std::error::Error + 'static)) -> bool {
        let mut current: Option<&(dyn std::error::Error + 'static)> = Some(err);
        while let Some(e) = current {
            if let Some(io_err) = e.downcast_ref::<std::io::Error>() {
                return is_transient_io_error(io_err);
            }
            current = e.source();
        }

        let err_msg = err.to_string().to_lowercase();
        err_msg.contains("connection reset")
            || err_msg.contains("connection refused")
            || err_msg.contains("connection aborted")
            || err_msg.contains("broken pipe")
            || err_msg.contains("dns error")
    }

    /// Check if an I/O error is transient and worth retrying
    fn is_transient_io_error(err: &std::io::Error) -> bool {
        matches!(
            err.kind(),
            std::io::ErrorKind::ConnectionReset
                | std::io::ErrorKind::ConnectionRefused
                | std::io::ErrorKind::ConnectionAborted
                | std::io::ErrorKind::BrokenPipe
                | std::io::ErrorKind::UnexpectedEof
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GatewayConfig, PlaybackConfig};
    use std::time::Duration;
    use timeout::TimeoutConfig;

    #[test]
    fn test_timeout_config_builder() {
        let config = TimeoutConfig::new().with_manifest_fetch_timeout(Duration::from_secs(5));

        assert_eq!(config.manifest_fetch.as_secs(), 5);
        assert_eq!(config.segment_fetch, timeout::SEGMENT_FETCH_TIMEOUT);
    }

    #[test]
    fn test_timeout_config_from_config() {
        let mut playback = PlaybackConfig::default();
        playback.segment_timeout_secs = 7200;
        let config = TimeoutConfig::from_config(&GatewayConfig::default(), &playback);

        assert_eq!(config.gateway_request.as_secs(), 30);
        assert_eq!(config.manifest_fetch.as_secs(), 20);
        assert_eq!(config.segment_fetch.as_secs(), 7200);
    }

    #[test]
    fn test_should_retry_error() {
        let refused = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        assert!(retry::should_retry_error(&refused));

        let not_found = std::io::Error::new(std::io::ErrorKind::NotFound, "not found");
        assert!(!retry::should_retry_error(&not_found));
    }
}
