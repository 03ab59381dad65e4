//! Fallback ladder of the Source Resolution Engine
//!
//! A pure transition function: given the attempt and one player event it
//! mutates the attempt and returns the commands the player must execute.
//! Timers, I/O and the player itself live in the controller.
//!
//! Every non-terminal transition consumes one of a finite set of budgets
//! (gateway escalation, last-resort native load, format fallback, relay
//! index, media retries), so any sequence of failures ends in `Failed`.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};
use url::Url;

use super::attempt::{EngineKind, FailureKind, LadderState, PlaybackAttempt};
use super::preflight::{correct_url, is_mixed_content, path_of};
use super::relay::RelayRotation;
use crate::config::Config;
use crate::models::stream::{is_bare_segment, is_playlist};
use crate::models::{relay_path, StreamMode};
use crate::resilience::timeout::TimeoutConfig;

/// Capabilities of the player host
#[derive(Debug, Clone, Default)]
pub struct Platform {
    /// The native media element plays HLS by itself
    pub native_hls: bool,
    /// Origin of the page hosting the player
    pub page_origin: Option<Url>,
}

/// Error classes reported by the segmented engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentedErrorKind {
    Network,
    Media,
    Other,
}

/// Media element error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaErrorCode {
    Aborted,
    Network,
    Decode,
    SrcNotSupported,
}

/// Notifications from the player
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlayerEvent {
    MetadataLoaded { duration_seconds: Option<f64> },
    Playing,
    TimeUpdate { position_seconds: f64 },
    SegmentedError { fatal: bool, kind: SegmentedErrorKind },
    NativeError { code: MediaErrorCode },
    /// A relay answered with an error of its own (blocked, rate limited, ...)
    RelayFailed,
    RetryTimerFired,
    Ended,
}

/// Instructions for the player
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerCommand {
    LoadNative {
        url: String,
    },
    LoadSegmented {
        url: String,
        manifest_timeout: Duration,
        segment_timeout: Duration,
    },
    /// Detach the current source and release its connections
    Teardown,
    Seek {
        position_seconds: f64,
    },
    ScheduleRetry {
        delay: Duration,
    },
    ReportFailure {
        kind: FailureKind,
        message: String,
    },
}

/// Static inputs of the ladder
#[derive(Debug, Clone)]
pub struct LadderSettings {
    pub gateway_path: String,
    pub legacy_proxy_paths: Vec<String>,
    pub relays: RelayRotation,
    pub max_media_retries: u32,
    pub retry_delay: Duration,
    pub timeouts: TimeoutConfig,
}

impl LadderSettings {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            gateway_path: config.gateway.public_path.clone(),
            legacy_proxy_paths: config.playback.legacy_proxy_paths.clone(),
            relays: RelayRotation::from_config(&config.playback),
            max_media_retries: config.playback.max_media_retries,
            retry_delay: config.playback.retry_delay(),
            timeouts: TimeoutConfig::from_config(&config.gateway, &config.playback),
        }
    }
}

impl Default for LadderSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// One evaluation of the ladder at a point in time
#[derive(Debug, Clone, Copy)]
pub struct Ladder<'a> {
    pub settings: &'a LadderSettings,
    pub platform: &'a Platform,
    pub now: Instant,
}

impl<'a> Ladder<'a> {
    #[must_use]
    pub const fn new(settings: &'a LadderSettings, platform: &'a Platform, now: Instant) -> Self {
        Self {
            settings,
            platform,
            now,
        }
    }

    /// Leave `Init` and issue the first load
    pub fn begin(&self, attempt: &mut PlaybackAttempt) -> Vec<PlayerCommand> {
        if attempt.state != LadderState::Init {
            return Vec::new();
        }
        attempt
            .resume
            .schedule_resume(attempt.start_position_seconds, self.now);

        // Built-in HLS takes declared playlists as they are; anything else
        // still goes through correction and routing
        if self.platform.native_hls {
            let url = attempt.current_url.trim().to_string();
            attempt.resolved_url.clone_from(&url);
            if self.is_playlist_target(attempt) {
                return self.load(attempt, url, EngineKind::Native, LadderState::TryNative);
            }
        }

        let corrected = correct_url(
            &attempt.current_url,
            &self.settings.gateway_path,
            &self.settings.legacy_proxy_paths,
            self.platform.page_origin.as_ref(),
        );
        attempt.resolved_url = corrected.target;
        attempt.proxied = corrected.via_gateway;

        if !self.gateway_bound(attempt)
            && is_mixed_content(self.platform.page_origin.as_ref(), &attempt.resolved_url)
        {
            debug!(
                session_id = %attempt.session_id,
                url = %attempt.resolved_url,
                "Insecure target on secure page, rotating relays"
            );
            return self.enter_relay(attempt, 0);
        }

        self.route(attempt)
    }

    /// Apply one player event
    pub fn on_event(&self, attempt: &mut PlaybackAttempt, event: &PlayerEvent) -> Vec<PlayerCommand> {
        if attempt.state.is_failed() || attempt.state == LadderState::Init {
            return Vec::new();
        }

        match *event {
            PlayerEvent::MetadataLoaded { duration_seconds } => {
                if let Some(duration) = duration_seconds.filter(|d| d.is_finite() && *d > 0.0) {
                    attempt.duration_seconds = Some(duration);
                }
                match attempt.resume.on_metadata_loaded(self.now) {
                    Some(position_seconds) => {
                        attempt.last_position_seconds = Some(position_seconds);
                        vec![PlayerCommand::Seek { position_seconds }]
                    }
                    None => Vec::new(),
                }
            }
            PlayerEvent::Playing => {
                if attempt.state != LadderState::Playing {
                    debug!(
                        session_id = %attempt.session_id,
                        from = ?attempt.state,
                        engine = ?attempt.engine,
                        "Playback started"
                    );
                    attempt.state = LadderState::Playing;
                }
                Vec::new()
            }
            PlayerEvent::TimeUpdate { position_seconds } => {
                if position_seconds.is_finite()
                    && position_seconds >= 0.0
                    && !attempt.resume.in_guard_window(self.now)
                {
                    attempt.last_position_seconds = Some(position_seconds);
                }
                Vec::new()
            }
            PlayerEvent::SegmentedError { fatal: false, kind } => {
                debug!(session_id = %attempt.session_id, ?kind, "Recoverable segmented error");
                Vec::new()
            }
            PlayerEvent::SegmentedError { fatal: true, kind } => {
                self.on_segmented_fatal(attempt, kind)
            }
            PlayerEvent::NativeError { code } => self.on_native_error(attempt, code),
            PlayerEvent::RelayFailed => match attempt.relay_index {
                Some(index) => self.enter_relay(attempt, index + 1),
                None => Vec::new(),
            },
            PlayerEvent::RetryTimerFired => {
                if !attempt.retry_pending {
                    return Vec::new();
                }
                let url = attempt.current_url.clone();
                let engine = attempt.engine;
                let state = source_state(attempt);
                self.load(attempt, url, engine, state)
            }
            PlayerEvent::Ended => Vec::new(),
        }
    }

    fn on_segmented_fatal(
        &self,
        attempt: &mut PlaybackAttempt,
        kind: SegmentedErrorKind,
    ) -> Vec<PlayerCommand> {
        if kind == SegmentedErrorKind::Network {
            if let Some(index) = attempt.relay_index {
                return self.enter_relay(attempt, index + 1);
            }
        }

        if !attempt.proxied {
            attempt.proxied = true;
            attempt.relay_index = None;
            let url = relay_path(&self.settings.gateway_path, &attempt.resolved_url, None, false);
            return self.load(attempt, url, EngineKind::Segmented, LadderState::TrySegmented);
        }

        if !attempt.last_resort {
            if is_mixed_content(self.platform.page_origin.as_ref(), &attempt.resolved_url) {
                return self.fail(attempt, FailureKind::BlockedBySecurityPolicy);
            }
            attempt.last_resort = true;
            attempt.relay_index = None;
            let url = attempt.resolved_url.clone();
            return self.load(attempt, url, EngineKind::Native, LadderState::TryNative);
        }

        let failure = match kind {
            SegmentedErrorKind::Media => FailureKind::FormatUnsupported,
            SegmentedErrorKind::Network | SegmentedErrorKind::Other => {
                FailureKind::SourceUnreachable
            }
        };
        self.fail(attempt, failure)
    }

    fn on_native_error(
        &self,
        attempt: &mut PlaybackAttempt,
        code: MediaErrorCode,
    ) -> Vec<PlayerCommand> {
        match code {
            MediaErrorCode::SrcNotSupported => {
                if attempt.format_fallback_used {
                    return self.fail(attempt, FailureKind::FormatUnsupported);
                }
                // Often a playlist served with a misleading extension or type
                attempt.format_fallback_used = true;
                let url = attempt.current_url.clone();
                let state = attempt
                    .relay_index
                    .map_or(LadderState::TrySegmented, LadderState::RelayRotate);
                self.load(attempt, url, EngineKind::Segmented, state)
            }
            MediaErrorCode::Network if attempt.relay_index.is_some() => {
                let next = attempt.relay_index.map_or(0, |i| i + 1);
                self.enter_relay(attempt, next)
            }
            MediaErrorCode::Aborted | MediaErrorCode::Network | MediaErrorCode::Decode => {
                if attempt.retry_count < self.settings.max_media_retries {
                    attempt.retry_count += 1;
                    attempt.retry_pending = true;
                    debug!(
                        session_id = %attempt.session_id,
                        ?code,
                        retry = attempt.retry_count,
                        max = self.settings.max_media_retries,
                        "Media error, scheduling retry"
                    );
                    return vec![PlayerCommand::ScheduleRetry {
                        delay: self.settings.retry_delay,
                    }];
                }
                let failure = if code == MediaErrorCode::Decode {
                    FailureKind::FormatUnsupported
                } else {
                    FailureKind::SourceUnreachable
                };
                self.fail(attempt, failure)
            }
        }
    }

    fn enter_relay(&self, attempt: &mut PlaybackAttempt, index: usize) -> Vec<PlayerCommand> {
        if let Some(url) = self.settings.relays.wrap(index, &attempt.resolved_url) {
            debug!(
                session_id = %attempt.session_id,
                relay = self.settings.relays.name(index).unwrap_or_default(),
                index,
                "Trying relay"
            );
            attempt.relay_index = Some(index);
            let engine = if self.is_playlist_target(attempt) {
                EngineKind::Segmented
            } else {
                EngineKind::Native
            };
            return self.load(attempt, url, engine, LadderState::RelayRotate(index));
        }

        // The gateway is same-origin, so it is still worth trying
        warn!(
            session_id = %attempt.session_id,
            relays = self.settings.relays.len(),
            "Relay list exhausted, falling back to gateway"
        );
        attempt.relay_index = None;
        attempt.relays_exhausted = true;
        attempt.proxied = true;
        self.route(attempt)
    }

    /// Pick the engine and URL for the resolved target
    fn route(&self, attempt: &mut PlaybackAttempt) -> Vec<PlayerCommand> {
        let target = attempt.resolved_url.clone();
        let gateway = &self.settings.gateway_path;

        if self.needs_synthesis(attempt) {
            attempt.proxied = true;
            let url = relay_path(gateway, &target, Some(attempt.mode), false);
            return self.load(attempt, url, EngineKind::Segmented, LadderState::TrySegmented);
        }

        if attempt.mode == StreamMode::Live {
            attempt.proxied = true;
        }
        let url = if attempt.proxied {
            relay_path(gateway, &target, None, false)
        } else {
            target
        };

        if self.is_playlist_target(attempt) {
            self.load(attempt, url, EngineKind::Segmented, LadderState::TrySegmented)
        } else {
            self.load(attempt, url, EngineKind::Native, LadderState::TryNative)
        }
    }

    fn load(
        &self,
        attempt: &mut PlaybackAttempt,
        url: String,
        engine: EngineKind,
        state: LadderState,
    ) -> Vec<PlayerCommand> {
        let mut commands = Vec::with_capacity(2);
        if attempt.loads > 0 {
            attempt
                .resume
                .begin_swap(attempt.last_position_seconds, self.now);
            commands.push(PlayerCommand::Teardown);
        }

        debug!(
            session_id = %attempt.session_id,
            from = ?attempt.state,
            to = ?state,
            ?engine,
            url = %url,
            "Ladder transition"
        );

        attempt.loads += 1;
        attempt.engine = engine;
        attempt.state = state;
        attempt.retry_pending = false;
        attempt.current_url.clone_from(&url);

        commands.push(match engine {
            EngineKind::Native => PlayerCommand::LoadNative { url },
            EngineKind::Segmented => PlayerCommand::LoadSegmented {
                url,
                manifest_timeout: self.settings.timeouts.manifest_fetch,
                segment_timeout: self.settings.timeouts.segment_fetch,
            },
        });
        commands
    }

    fn fail(&self, attempt: &mut PlaybackAttempt, kind: FailureKind) -> Vec<PlayerCommand> {
        warn!(
            session_id = %attempt.session_id,
            content_id = %attempt.content_id,
            url = %attempt.resolved_url,
            failure = %kind,
            loads = attempt.loads,
            "Playback failed"
        );
        attempt.state = LadderState::Failed(kind);
        attempt.retry_pending = false;
        vec![
            PlayerCommand::Teardown,
            PlayerCommand::ReportFailure {
                kind,
                message: kind.user_message().to_string(),
            },
        ]
    }

    fn is_playlist_target(&self, attempt: &PlaybackAttempt) -> bool {
        is_playlist(&path_of(&attempt.resolved_url))
            || attempt
                .declared_mime
                .as_deref()
                .is_some_and(|m| m.to_ascii_lowercase().contains("mpegurl"))
    }

    fn needs_synthesis(&self, attempt: &PlaybackAttempt) -> bool {
        is_bare_segment(&path_of(&attempt.resolved_url))
            || (attempt.mode == StreamMode::Live && !self.is_playlist_target(attempt))
    }

    /// Targets that always go through the gateway never need a relay
    fn gateway_bound(&self, attempt: &PlaybackAttempt) -> bool {
        attempt.proxied || attempt.mode == StreamMode::Live || self.needs_synthesis(attempt)
    }
}

/// Ladder state describing the current source
fn source_state(attempt: &PlaybackAttempt) -> LadderState {
    match (attempt.relay_index, attempt.engine) {
        (Some(index), _) => LadderState::RelayRotate(index),
        (None, EngineKind::Native) => LadderState::TryNative,
        (None, EngineKind::Segmented) => LadderState::TrySegmented,
    }
}
