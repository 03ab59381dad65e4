use crate::config::{PlaybackConfig, RelayEndpointConfig};
use crate::models::encode_query_value;

/// Ordered list of public cross-origin relays.
///
/// Used only when a secure page must reach an insecure stream. Index order
/// is the rotation order.
#[derive(Debug, Clone, Default)]
pub struct RelayRotation {
    endpoints: Vec<RelayEndpointConfig>,
}

impl RelayRotation {
    #[must_use]
    pub const fn new(endpoints: Vec<RelayEndpointConfig>) -> Self {
        Self { endpoints }
    }

    #[must_use]
    pub fn from_config(config: &PlaybackConfig) -> Self {
        Self::new(config.relays.clone())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    #[must_use]
    pub fn name(&self, index: usize) -> Option<&str> {
        self.endpoints.get(index).map(|e| e.name.as_str())
    }

    /// Wrap `target` with relay `index`, or `None` once the list is exhausted
    #[must_use]
    pub fn wrap(&self, index: usize, target: &str) -> Option<String> {
        self.endpoints
            .get(index)
            .map(|e| e.template.replace("{url}", &encode_query_value(target)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrap_in_order() {
        let rotation = RelayRotation::new(vec![
            RelayEndpointConfig {
                name: "a".to_string(),
                template: "https://a.example/?url={url}".to_string(),
            },
            RelayEndpointConfig {
                name: "b".to_string(),
                template: "https://b.example/raw/{url}".to_string(),
            },
        ]);

        assert_eq!(
            rotation.wrap(0, "http://o/x.m3u8").as_deref(),
            Some("https://a.example/?url=http%3A%2F%2Fo%2Fx.m3u8")
        );
        assert_eq!(rotation.name(1), Some("b"));
        assert!(rotation.wrap(2, "http://o/x.m3u8").is_none());
    }

    #[test]
    fn test_default_relays_are_https() {
        let rotation = RelayRotation::from_config(&PlaybackConfig::default());
        assert!(!rotation.is_empty());
        for i in 0..rotation.len() {
            let wrapped = rotation.wrap(i, "http://o/x").unwrap();
            assert!(wrapped.starts_with("https://"));
        }
    }
}
