use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::resume::ResumeGuard;
use crate::models::{generate_id, ContentId, StreamMode};
use crate::{Error, Result};

/// Optional catalog metadata carried with a playback request so the UI can
/// render before any lookup completes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrefetchedMetadata {
    pub title: Option<String>,
    pub poster: Option<String>,
    pub category: Option<String>,
}

/// Primary stream and optional alternate-audio stream of a content item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateUrls {
    pub primary: String,
    pub alternate: Option<String>,
}

impl CandidateUrls {
    #[must_use]
    pub fn get(&self, track: Track) -> Option<&str> {
        match track {
            Track::Primary => Some(self.primary.as_str()),
            Track::Alternate => self.alternate.as_deref(),
        }
    }
}

/// Which candidate URL is being played
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Track {
    #[default]
    Primary,
    Alternate,
}

/// What the UI asks the engine to play
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackRequest {
    pub content_id: ContentId,
    pub content_type: String,
    pub candidate_urls: CandidateUrls,
    /// Explicit mode; inferred from `content_type` when absent
    #[serde(default)]
    pub mode: Option<StreamMode>,
    /// MIME type declared by the catalog, if any
    #[serde(default)]
    pub declared_mime: Option<String>,
    #[serde(default)]
    pub metadata: Option<PrefetchedMetadata>,
}

impl PlaybackRequest {
    pub fn new(
        content_id: impl Into<ContentId>,
        content_type: impl Into<String>,
        candidates: Vec<String>,
    ) -> Result<Self> {
        let mut candidates = candidates
            .into_iter()
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());
        let primary = candidates
            .next()
            .ok_or_else(|| Error::InvalidInput("at least one candidate URL is required".to_string()))?;
        let alternate = candidates.next();
        if candidates.next().is_some() {
            return Err(Error::InvalidInput(
                "at most two candidate URLs are supported".to_string(),
            ));
        }
        Ok(Self {
            content_id: content_id.into(),
            content_type: content_type.into(),
            candidate_urls: CandidateUrls { primary, alternate },
            mode: None,
            declared_mime: None,
            metadata: None,
        })
    }

    #[must_use]
    pub const fn with_mode(mut self, mode: StreamMode) -> Self {
        self.mode = Some(mode);
        self
    }

    #[must_use]
    pub fn with_declared_mime(mut self, mime: impl Into<String>) -> Self {
        self.declared_mime = Some(mime.into());
        self
    }

    #[must_use]
    pub fn with_metadata(mut self, metadata: PrefetchedMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    #[must_use]
    pub fn effective_mode(&self) -> StreamMode {
        self.mode
            .unwrap_or_else(|| StreamMode::from_content_type(&self.content_type))
    }
}

/// Player used for the current source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineKind {
    /// The platform's own media element
    Native,
    /// The segmented-streaming engine
    Segmented,
}

/// Why a playback attempt gave up. Each has a different remedy, so the UI
/// must be able to tell them apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    FormatUnsupported,
    SourceUnreachable,
    BlockedBySecurityPolicy,
}

impl FailureKind {
    #[must_use]
    pub const fn user_message(self) -> &'static str {
        match self {
            Self::FormatUnsupported => "This stream's format is not supported on this device.",
            Self::SourceUnreachable => "The stream source could not be reached.",
            Self::BlockedBySecurityPolicy => {
                "The browser blocked this stream because it is served over an insecure connection."
            }
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::FormatUnsupported => "format_unsupported",
            Self::SourceUnreachable => "source_unreachable",
            Self::BlockedBySecurityPolicy => "blocked_by_security_policy",
        };
        f.write_str(s)
    }
}

/// Position in the fallback ladder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LadderState {
    Init,
    TryNative,
    TrySegmented,
    RelayRotate(usize),
    Playing,
    Failed(FailureKind),
}

impl LadderState {
    #[must_use]
    pub const fn is_failed(self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// All mutable state of one playback session.
///
/// Owned by the controller and replaced wholesale when the user selects new
/// content, so nothing from an abandoned session can leak into the next.
#[derive(Debug, Clone)]
pub struct PlaybackAttempt {
    pub session_id: String,
    pub content_id: ContentId,
    pub content_type: String,
    pub candidate_urls: CandidateUrls,
    pub track: Track,
    pub mode: StreamMode,
    pub declared_mime: Option<String>,
    /// Source currently handed to the player (may be a gateway or relay URL)
    pub current_url: String,
    /// Direct upstream URL after pre-flight correction
    pub resolved_url: String,
    pub engine: EngineKind,
    pub state: LadderState,
    pub relay_index: Option<usize>,
    pub relays_exhausted: bool,
    pub retry_count: u32,
    pub retry_pending: bool,
    pub proxied: bool,
    pub format_fallback_used: bool,
    pub last_resort: bool,
    pub start_position_seconds: f64,
    pub last_position_seconds: Option<f64>,
    pub duration_seconds: Option<f64>,
    /// Number of sources loaded so far; every load after the first is a swap
    pub loads: u32,
    pub resume: ResumeGuard,
}

impl PlaybackAttempt {
    /// Start a fresh attempt for one candidate of a request
    pub fn new(
        request: &PlaybackRequest,
        track: Track,
        start_position_seconds: f64,
        swap_guard: Duration,
    ) -> Result<Self> {
        let url = request
            .candidate_urls
            .get(track)
            .ok_or_else(|| Error::InvalidInput(format!("no candidate URL for {track:?} track")))?
            .to_string();

        Ok(Self {
            session_id: generate_id(),
            content_id: request.content_id.clone(),
            content_type: request.content_type.clone(),
            candidate_urls: request.candidate_urls.clone(),
            track,
            mode: request.effective_mode(),
            declared_mime: request.declared_mime.clone(),
            current_url: url.clone(),
            resolved_url: url,
            engine: EngineKind::Native,
            state: LadderState::Init,
            relay_index: None,
            relays_exhausted: false,
            retry_count: 0,
            retry_pending: false,
            proxied: false,
            format_fallback_used: false,
            last_resort: false,
            start_position_seconds: start_position_seconds.max(0.0),
            last_position_seconds: None,
            duration_seconds: None,
            loads: 0,
            resume: ResumeGuard::new(swap_guard),
        })
    }

    /// Best known playback position: the live position once the player has
    /// reported one, otherwise the resume target.
    #[must_use]
    pub fn current_position(&self) -> f64 {
        self.last_position_seconds
            .unwrap_or(self.start_position_seconds)
    }
}
