//! Session driver around the fallback ladder
//!
//! Owns the current [`PlaybackAttempt`], executes ladder commands against a
//! [`MediaBackend`], runs retry timers and feeds position reports to the
//! progress coordinator. Selecting new content replaces the whole session:
//! the old one gets a forced save, a teardown and its timers cancelled.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::attempt::{LadderState, PlaybackAttempt, PlaybackRequest, Track};
use super::ladder::{Ladder, LadderSettings, Platform, PlayerCommand, PlayerEvent};
use crate::config::Config;
use crate::models::{ProgressRecord, StreamMode};
use crate::progress::{ProgressCoordinator, ProgressStore, SaveOutcome};
use crate::{Error, Result};

/// The player host: a media element plus an optional segmented engine
#[async_trait]
pub trait MediaBackend: Send + Sync {
    fn platform(&self) -> Platform;

    async fn execute(&self, command: &PlayerCommand) -> Result<()>;
}

/// Timer notification tagged with the session that scheduled it
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionEvent {
    pub generation: u64,
    pub event: PlayerEvent,
}

struct Session {
    generation: u64,
    request: PlaybackRequest,
    attempt: PlaybackAttempt,
    cancel: CancellationToken,
}

pub struct PlaybackController<B: MediaBackend> {
    backend: Arc<B>,
    progress: ProgressCoordinator,
    settings: LadderSettings,
    swap_guard: Duration,
    session: Option<Session>,
    generation: u64,
    timer_tx: mpsc::UnboundedSender<SessionEvent>,
    timer_rx: mpsc::UnboundedReceiver<SessionEvent>,
}

impl<B: MediaBackend> std::fmt::Debug for PlaybackController<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackController")
            .field("generation", &self.generation)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl<B: MediaBackend> PlaybackController<B> {
    #[must_use]
    pub fn new(backend: Arc<B>, store: Arc<dyn ProgressStore>, config: &Config) -> Self {
        let (timer_tx, timer_rx) = mpsc::unbounded_channel();
        Self {
            backend,
            progress: ProgressCoordinator::new(store, config.progress.clone()),
            settings: LadderSettings::from_config(config),
            swap_guard: config.playback.swap_guard(),
            session: None,
            generation: 0,
            timer_tx,
            timer_rx,
        }
    }

    #[must_use]
    pub const fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    #[must_use]
    pub const fn progress(&self) -> &ProgressCoordinator {
        &self.progress
    }

    #[must_use]
    pub fn attempt(&self) -> Option<&PlaybackAttempt> {
        self.session.as_ref().map(|s| &s.attempt)
    }

    #[must_use]
    pub fn state(&self) -> Option<LadderState> {
        self.attempt().map(|a| a.state)
    }

    /// Start playing new content, superseding any current session.
    ///
    /// Saved progress is loaded once, before the first source attempt.
    pub async fn start(&mut self, request: PlaybackRequest) -> Result<String> {
        self.stop().await?;

        let mode = request.effective_mode();
        let start_position = if mode == StreamMode::Live {
            0.0
        } else {
            match self
                .progress
                .load(&request.content_type, &request.content_id)
                .await
            {
                Ok(record) => record.map_or(0.0, |r| r.position_seconds),
                Err(e) => {
                    warn!(content_id = %request.content_id, error = %e, "Failed to load progress");
                    0.0
                }
            }
        };

        let attempt = PlaybackAttempt::new(&request, Track::Primary, start_position, self.swap_guard)?;
        let session_id = attempt.session_id.clone();
        info!(
            session_id = %session_id,
            content_id = %request.content_id,
            content_type = %request.content_type,
            start_position,
            "Starting playback"
        );

        self.install(request, attempt, Vec::new()).await?;
        Ok(session_id)
    }

    /// Feed a player notification for the current session
    pub async fn handle_event(&mut self, event: PlayerEvent) -> Result<()> {
        let platform = self.backend.platform();
        let Some(session) = self.session.as_mut() else {
            return Ok(());
        };

        let ladder = Ladder::new(&self.settings, &platform, Instant::now());
        let commands = ladder.on_event(&mut session.attempt, &event);

        match event {
            PlayerEvent::TimeUpdate { .. } => self.save_position(false).await,
            PlayerEvent::Ended => {
                if let Some(session) = &self.session {
                    let attempt = &session.attempt;
                    if let Err(e) = self
                        .progress
                        .remove(&attempt.content_type, &attempt.content_id)
                        .await
                    {
                        warn!(content_id = %attempt.content_id, error = %e, "Failed to clear progress");
                    }
                }
            }
            _ => {}
        }

        self.dispatch(commands).await
    }

    /// Feed a timer notification; events from superseded sessions are dropped
    pub async fn handle_session_event(&mut self, event: SessionEvent) -> Result<()> {
        let current = self.session.as_ref().map(|s| s.generation);
        if current != Some(event.generation) {
            debug!(
                generation = event.generation,
                current = ?current,
                "Dropping event from superseded session"
            );
            return Ok(());
        }
        self.handle_event(event.event).await
    }

    /// Wait for the next timer notification
    pub async fn next_session_event(&mut self) -> Option<SessionEvent> {
        self.timer_rx.recv().await
    }

    pub async fn pause(&mut self) -> Result<()> {
        self.save_position(true).await;
        Ok(())
    }

    pub async fn visibility_hidden(&mut self) -> Result<()> {
        self.save_position(true).await;
        Ok(())
    }

    pub async fn unload(&mut self) -> Result<()> {
        self.stop().await
    }

    /// Explicit seek by the user; backward moves are allowed to persist
    pub async fn user_seek(&mut self, position_seconds: f64) -> Result<()> {
        let Some(session) = self.session.as_mut() else {
            return Ok(());
        };
        if !position_seconds.is_finite() || position_seconds < 0.0 {
            return Err(Error::InvalidInput(format!(
                "invalid seek position: {position_seconds}"
            )));
        }
        session.attempt.last_position_seconds = Some(position_seconds);
        self.progress
            .note_user_seek(&session.attempt.content_type, &session.attempt.content_id);
        self.backend
            .execute(&PlayerCommand::Seek { position_seconds })
            .await
    }

    /// Switch between the primary and alternate candidate as an intentional
    /// swap that keeps the playback position.
    pub async fn switch_track(&mut self, track: Track) -> Result<()> {
        let Some(session) = self.session.as_ref() else {
            return Err(Error::InvalidInput("no active playback session".to_string()));
        };
        if session.attempt.track == track {
            return Ok(());
        }

        self.save_position(true).await;

        let Some(old) = self.session.take() else {
            return Ok(());
        };
        old.cancel.cancel();

        let position = old.attempt.current_position();
        let mut attempt =
            PlaybackAttempt::new(&old.request, track, position, self.swap_guard)?;
        attempt.resume.begin_swap(Some(position), Instant::now());
        info!(
            session_id = %attempt.session_id,
            content_id = %attempt.content_id,
            ?track,
            position,
            "Switching track"
        );

        self.install(old.request, attempt, vec![PlayerCommand::Teardown])
            .await
    }

    /// Leave the current content: forced save, teardown, cancel timers
    pub async fn stop(&mut self) -> Result<()> {
        if self.session.is_none() {
            return Ok(());
        }
        self.save_position(true).await;
        if let Some(session) = self.session.take() {
            debug!(session_id = %session.attempt.session_id, "Ending playback session");
            session.cancel.cancel();
            self.progress
                .forget(&session.attempt.content_type, &session.attempt.content_id);
            self.backend.execute(&PlayerCommand::Teardown).await?;
        }
        Ok(())
    }

    async fn install(
        &mut self,
        request: PlaybackRequest,
        mut attempt: PlaybackAttempt,
        mut commands: Vec<PlayerCommand>,
    ) -> Result<()> {
        self.generation += 1;
        let platform = self.backend.platform();
        let ladder = Ladder::new(&self.settings, &platform, Instant::now());
        commands.extend(ladder.begin(&mut attempt));

        self.session = Some(Session {
            generation: self.generation,
            request,
            attempt,
            cancel: CancellationToken::new(),
        });
        self.dispatch(commands).await
    }

    async fn dispatch(&mut self, commands: Vec<PlayerCommand>) -> Result<()> {
        for command in commands {
            match &command {
                PlayerCommand::ScheduleRetry { delay } => self.schedule_retry(*delay),
                PlayerCommand::ReportFailure { kind, message } => {
                    warn!(failure = %kind, message = %message, "Reporting playback failure");
                    self.backend.execute(&command).await?;
                }
                _ => self.backend.execute(&command).await?,
            }
        }
        Ok(())
    }

    fn schedule_retry(&self, delay: Duration) {
        let Some(session) = &self.session else {
            return;
        };
        let generation = session.generation;
        let token = session.cancel.clone();
        let tx = self.timer_tx.clone();

        tokio::spawn(async move {
            tokio::select! {
                biased;
                () = token.cancelled() => {}
                () = tokio::time::sleep(delay) => {
                    let _ = tx.send(SessionEvent {
                        generation,
                        event: PlayerEvent::RetryTimerFired,
                    });
                }
            }
        });
    }

    /// Report the current position to the coordinator. Store failures are
    /// logged; they never interrupt playback.
    async fn save_position(&self, force: bool) {
        let Some(session) = &self.session else {
            return;
        };
        let attempt = &session.attempt;
        if attempt.mode == StreamMode::Live {
            return;
        }
        // Reports read mid-swap belong to the outgoing source. The stored
        // position is frozen during the window, so forced saves still go out.
        if !force && attempt.resume.in_guard_window(Instant::now()) {
            return;
        }
        let Some(position) = attempt.last_position_seconds else {
            return;
        };

        let record = ProgressRecord::new(
            attempt.content_id.clone(),
            attempt.content_type.clone(),
            position,
            attempt.duration_seconds.unwrap_or(0.0),
        );
        match self.progress.save(record, force).await {
            Ok(SaveOutcome::Written) => {
                debug!(content_id = %attempt.content_id, position, force, "Progress saved");
            }
            Ok(outcome) => {
                debug!(content_id = %attempt.content_id, position, ?outcome, "Progress not written");
            }
            Err(e) => {
                warn!(content_id = %attempt.content_id, error = %e, "Failed to save progress");
            }
        }
    }
}
