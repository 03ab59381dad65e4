//! Resume/Progress Coordinator
//!
//! Decides which position reports reach the store. Writes are debounced
//! unless forced, short positions are never written, and a drastic backward
//! jump from a substantial position is treated as a spurious report unless
//! the user seeked backward on purpose.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::time::Instant;

use super::store::ProgressStore;
use crate::config::ProgressConfig;
use crate::models::{ContentId, ProgressKey, ProgressRecord};
use crate::Result;

/// What happened to a save request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Written,
    /// Too soon after the previous write
    Debounced,
    /// Position under the minimum-watched threshold
    BelowMinimum,
    /// Drastic regression from the last known good position
    RegressionRejected,
    /// Watched past the completion ratio; the record was removed
    Completed,
}

#[derive(Debug, Default, Clone, Copy)]
struct Tracked {
    last_good: Option<f64>,
    last_write: Option<Instant>,
    backward_allowed: bool,
}

#[derive(Clone)]
pub struct ProgressCoordinator {
    store: Arc<dyn ProgressStore>,
    config: ProgressConfig,
    tracked: Arc<DashMap<ProgressKey, Tracked>>,
}

impl std::fmt::Debug for ProgressCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressCoordinator")
            .field("config", &self.config)
            .field("tracked", &self.tracked.len())
            .finish_non_exhaustive()
    }
}

impl ProgressCoordinator {
    #[must_use]
    pub fn new(store: Arc<dyn ProgressStore>, config: ProgressConfig) -> Self {
        Self {
            store,
            config,
            tracked: Arc::new(DashMap::new()),
        }
    }

    /// Load the saved record for a content item and remember its position
    /// as the last known good one.
    pub async fn load(
        &self,
        content_type: &str,
        content_id: &ContentId,
    ) -> Result<Option<ProgressRecord>> {
        let record = self.store.get_progress(content_type, content_id).await?;
        let key = ProgressKey::new(content_type.to_string(), content_id.clone());
        let mut tracked = self.tracked.entry(key).or_default();
        if let Some(record) = &record {
            tracked.last_good = Some(record.position_seconds);
        }
        Ok(record)
    }

    /// Persist a position report
    pub async fn save(&self, record: ProgressRecord, force: bool) -> Result<SaveOutcome> {
        let position = record.position_seconds;
        if !position.is_finite() || position < self.config.min_position_secs {
            return Ok(SaveOutcome::BelowMinimum);
        }

        if record
            .watched_ratio()
            .is_some_and(|ratio| ratio > self.config.completion_ratio)
        {
            self.remove(&record.content_type, &record.content_id).await?;
            tracing::debug!(key = %record.key(), position, "Content completed, progress removed");
            return Ok(SaveOutcome::Completed);
        }

        let key = record.key();
        let now = Instant::now();
        {
            let tracked = self.tracked.entry(key.clone()).or_default();
            if let Some(previous) = tracked.last_good {
                if !tracked.backward_allowed
                    && previous >= self.config.regression_floor_secs
                    && position + self.config.regression_tolerance_secs < previous
                {
                    tracing::warn!(
                        key = %key,
                        previous,
                        position,
                        "Rejected progress regression"
                    );
                    return Ok(SaveOutcome::RegressionRejected);
                }
            }
            if !force
                && tracked
                    .last_write
                    .is_some_and(|at| now.saturating_duration_since(at) < self.config.debounce())
            {
                return Ok(SaveOutcome::Debounced);
            }
        }

        self.store.save_progress(&record).await?;

        let mut tracked = self.tracked.entry(key).or_default();
        tracked.last_good = Some(position);
        tracked.last_write = Some(now);
        tracked.backward_allowed = false;
        Ok(SaveOutcome::Written)
    }

    /// Delete the record, used on natural completion
    pub async fn remove(&self, content_type: &str, content_id: &ContentId) -> Result<()> {
        self.store.remove_progress(content_type, content_id).await?;
        self.tracked
            .remove(&ProgressKey::new(content_type.to_string(), content_id.clone()));
        Ok(())
    }

    /// The user seeked on purpose; the next save may move backward
    pub fn note_user_seek(&self, content_type: &str, content_id: &ContentId) {
        let key = ProgressKey::new(content_type.to_string(), content_id.clone());
        self.tracked.entry(key).or_default().backward_allowed = true;
    }

    /// Drop per-item bookkeeping once a session ends
    pub fn forget(&self, content_type: &str, content_id: &ContentId) {
        self.tracked
            .remove(&ProgressKey::new(content_type.to_string(), content_id.clone()));
    }

    /// Number of content items with live bookkeeping
    #[must_use]
    pub fn tracked_len(&self) -> usize {
        self.tracked.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::store::{MemoryProgressStore, MockProgressStore};
    use std::time::Duration;

    fn record(position: f64) -> ProgressRecord {
        ProgressRecord::new("m1".into(), "movie", position, 7200.0)
    }

    fn coordinator(store: Arc<dyn ProgressStore>) -> ProgressCoordinator {
        ProgressCoordinator::new(store, ProgressConfig::default())
    }

    async fn stored(store: &MemoryProgressStore) -> Option<f64> {
        store
            .get_progress("movie", &"m1".into())
            .await
            .unwrap()
            .map(|r| r.position_seconds)
    }

    #[tokio::test(start_paused = true)]
    async fn test_monotonic_with_spurious_low_report() {
        let store = Arc::new(MemoryProgressStore::new());
        let coordinator = coordinator(store.clone());

        assert_eq!(
            coordinator.save(record(100.0), false).await.unwrap(),
            SaveOutcome::Written
        );
        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(
            coordinator.save(record(600.0), false).await.unwrap(),
            SaveOutcome::Written
        );

        // A reloading player briefly reports a near-zero position
        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(
            coordinator.save(record(0.4), true).await.unwrap(),
            SaveOutcome::BelowMinimum
        );
        assert_eq!(
            coordinator.save(record(8.0), true).await.unwrap(),
            SaveOutcome::RegressionRejected
        );
        assert_eq!(stored(&store).await, Some(600.0));

        // Small backward drift within tolerance is fine
        assert_eq!(
            coordinator.save(record(590.0), true).await.unwrap(),
            SaveOutcome::Written
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_user_seek_allows_backward_save() {
        let store = Arc::new(MemoryProgressStore::new());
        let coordinator = coordinator(store.clone());
        coordinator.save(record(900.0), true).await.unwrap();

        coordinator.note_user_seek("movie", &"m1".into());
        assert_eq!(
            coordinator.save(record(60.0), true).await.unwrap(),
            SaveOutcome::Written
        );
        assert_eq!(stored(&store).await, Some(60.0));

        // The allowance is consumed by one write
        coordinator.save(record(900.0), true).await.unwrap();
        assert_eq!(
            coordinator.save(record(60.0), true).await.unwrap(),
            SaveOutcome::RegressionRejected
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_debounce_unless_forced() {
        let mut mock = MockProgressStore::new();
        mock.expect_save_progress().times(3).returning(|_| Ok(()));
        let coordinator = coordinator(Arc::new(mock));

        assert_eq!(
            coordinator.save(record(10.0), false).await.unwrap(),
            SaveOutcome::Written
        );
        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(
            coordinator.save(record(12.0), false).await.unwrap(),
            SaveOutcome::Debounced
        );
        assert_eq!(
            coordinator.save(record(12.5), true).await.unwrap(),
            SaveOutcome::Written
        );
        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(
            coordinator.save(record(17.5), false).await.unwrap(),
            SaveOutcome::Written
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_completion_removes_record() {
        let mut mock = MockProgressStore::new();
        mock.expect_save_progress().never();
        mock.expect_remove_progress()
            .withf(|content_type, content_id| content_type == "movie" && content_id.as_str() == "m1")
            .times(1)
            .returning(|_, _| Ok(()));
        let coordinator = coordinator(Arc::new(mock));

        assert_eq!(
            coordinator.save(record(6600.0), false).await.unwrap(),
            SaveOutcome::Completed
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_seeds_regression_guard() {
        let mut mock = MockProgressStore::new();
        mock.expect_get_progress()
            .returning(|_, _| Ok(Some(ProgressRecord::new("m1".into(), "movie", 1200.0, 7200.0))));
        mock.expect_save_progress().never();
        let coordinator = coordinator(Arc::new(mock));

        let loaded = coordinator.load("movie", &"m1".into()).await.unwrap();
        assert_eq!(loaded.map(|r| r.position_seconds), Some(1200.0));
        assert_eq!(
            coordinator.save(record(20.0), true).await.unwrap(),
            SaveOutcome::RegressionRejected
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_regression_floor_and_tolerance_are_configurable() {
        let store = Arc::new(MemoryProgressStore::new());
        let config = ProgressConfig {
            regression_floor_secs: 120.0,
            regression_tolerance_secs: 30.0,
            ..ProgressConfig::default()
        };
        let coordinator = ProgressCoordinator::new(store.clone(), config);

        coordinator.save(record(100.0), true).await.unwrap();
        // Below the floor nothing is protected
        assert_eq!(
            coordinator.save(record(10.0), true).await.unwrap(),
            SaveOutcome::Written
        );

        coordinator.save(record(300.0), true).await.unwrap();
        assert_eq!(
            coordinator.save(record(275.0), true).await.unwrap(),
            SaveOutcome::Written
        );
        assert_eq!(
            coordinator.save(record(200.0), true).await.unwrap(),
            SaveOutcome::RegressionRejected
        );
    }
}
