use std::time::Duration;

use tokio::time::Instant;

/// Where a pending seek target came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekOrigin {
    /// Saved progress restored at the start of a session
    Resume,
    /// Position captured from the previous source during a swap
    Swap,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeekTarget {
    pub position_seconds: f64,
    pub origin: SeekOrigin,
}

/// Guards the resume target across source swaps.
///
/// A seek target is applied exactly once, on the first metadata-loaded
/// notification after it was scheduled. While a swap is in flight the
/// guard also reports positions read from the player as untrustworthy.
#[derive(Debug, Clone)]
pub struct ResumeGuard {
    pending: Option<SeekTarget>,
    switching: bool,
    swap_started_at: Option<Instant>,
    guard_window: Duration,
}

impl ResumeGuard {
    #[must_use]
    pub const fn new(guard_window: Duration) -> Self {
        Self {
            pending: None,
            switching: false,
            swap_started_at: None,
            guard_window,
        }
    }

    /// Schedule the saved-progress target.
    ///
    /// Ignored while a swap owns the seek target, so a late resume lookup
    /// cannot yank the viewer back to an old position.
    pub fn schedule_resume(&mut self, position_seconds: f64, now: Instant) -> bool {
        if position_seconds <= 0.0 || !position_seconds.is_finite() || self.in_guard_window(now) {
            return false;
        }
        self.pending = Some(SeekTarget {
            position_seconds,
            origin: SeekOrigin::Resume,
        });
        true
    }

    /// Mark the start of an intentional source swap.
    ///
    /// `captured` is the position read from the outgoing source. When the
    /// old source never reported one, an unapplied target carries over.
    pub fn begin_swap(&mut self, captured: Option<f64>, now: Instant) {
        let position = captured
            .filter(|p| p.is_finite() && *p > 0.0)
            .or_else(|| self.pending.map(|t| t.position_seconds));

        self.pending = position.map(|position_seconds| SeekTarget {
            position_seconds,
            origin: SeekOrigin::Swap,
        });
        self.switching = true;
        self.swap_started_at = Some(now);
    }

    /// Called on every metadata-loaded notification. Returns the position to
    /// seek to, at most once per scheduled target.
    pub fn on_metadata_loaded(&mut self, now: Instant) -> Option<f64> {
        self.switching = false;
        // Keep the window anchored to metadata arrival so time updates racing
        // the seek are still treated as stale.
        if self.swap_started_at.is_some() {
            self.swap_started_at = Some(now);
        }
        self.pending.take().map(|t| t.position_seconds)
    }

    #[must_use]
    pub const fn is_switching(&self) -> bool {
        self.switching
    }

    /// True while a swap is in flight or has just settled
    #[must_use]
    pub fn in_guard_window(&self, now: Instant) -> bool {
        self.switching
            || self
                .swap_started_at
                .is_some_and(|at| now.saturating_duration_since(at) < self.guard_window)
    }

    #[must_use]
    pub const fn pending(&self) -> Option<SeekTarget> {
        self.pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guard() -> ResumeGuard {
        ResumeGuard::new(Duration::from_millis(1500))
    }

    #[test]
    fn test_resume_applied_once() {
        let now = Instant::now();
        let mut g = guard();
        assert!(g.schedule_resume(120.0, now));

        assert_eq!(g.on_metadata_loaded(now), Some(120.0));
        assert_eq!(g.on_metadata_loaded(now), None);
    }

    #[test]
    fn test_zero_resume_is_ignored() {
        let now = Instant::now();
        let mut g = guard();
        assert!(!g.schedule_resume(0.0, now));
        assert_eq!(g.on_metadata_loaded(now), None);
    }

    #[test]
    fn test_swap_captures_position() {
        let now = Instant::now();
        let mut g = guard();
        g.begin_swap(Some(300.0), now);
        assert!(g.is_switching());
        assert_eq!(g.pending().map(|t| t.origin), Some(SeekOrigin::Swap));

        assert_eq!(g.on_metadata_loaded(now), Some(300.0));
        assert!(!g.is_switching());
    }

    #[test]
    fn test_swap_before_first_metadata_keeps_resume_target() {
        let now = Instant::now();
        let mut g = guard();
        g.schedule_resume(90.0, now);
        // The old source failed before reporting any position
        g.begin_swap(None, now);

        assert_eq!(g.on_metadata_loaded(now), Some(90.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_resume_rejected_during_swap() {
        let mut g = guard();
        g.begin_swap(Some(300.0), Instant::now());
        assert!(!g.schedule_resume(12.0, Instant::now()));

        assert_eq!(g.on_metadata_loaded(Instant::now()), Some(300.0));
        assert!(g.in_guard_window(Instant::now()));

        tokio::time::advance(Duration::from_millis(1600)).await;
        assert!(!g.in_guard_window(Instant::now()));
        assert!(g.schedule_resume(12.0, Instant::now()));
    }
}
