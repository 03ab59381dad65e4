use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::id::ContentId;

/// Saved playback position for one content item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressRecord {
    pub content_id: ContentId,
    pub content_type: String,
    pub position_seconds: f64,
    pub duration_seconds: f64,
    pub updated_at: DateTime<Utc>,
}

impl ProgressRecord {
    #[must_use]
    pub fn new(
        content_id: ContentId,
        content_type: impl Into<String>,
        position_seconds: f64,
        duration_seconds: f64,
    ) -> Self {
        Self {
            content_id,
            content_type: content_type.into(),
            position_seconds,
            duration_seconds,
            updated_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn key(&self) -> ProgressKey {
        ProgressKey::new(self.content_type.clone(), self.content_id.clone())
    }

    /// Fraction watched, if the duration is known
    #[must_use]
    pub fn watched_ratio(&self) -> Option<f64> {
        if self.duration_seconds.is_finite() && self.duration_seconds > 0.0 {
            Some(self.position_seconds / self.duration_seconds)
        } else {
            None
        }
    }
}

/// Store key: records are addressed by content type and id
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProgressKey {
    pub content_type: String,
    pub content_id: ContentId,
}

impl ProgressKey {
    #[must_use]
    pub const fn new(content_type: String, content_id: ContentId) -> Self {
        Self {
            content_type,
            content_id,
        }
    }
}

impl std::fmt::Display for ProgressKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.content_type, self.content_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_watched_ratio() {
        let record = ProgressRecord::new("m1".into(), "movie", 45.0, 90.0);
        assert_eq!(record.watched_ratio(), Some(0.5));

        let live = ProgressRecord::new("c1".into(), "live", 45.0, f64::INFINITY);
        assert_eq!(live.watched_ratio(), None);
    }

    #[test]
    fn test_key_display() {
        let record = ProgressRecord::new("m1".into(), "movie", 10.0, 0.0);
        assert_eq!(record.key().to_string(), "movie:m1");
    }
}
