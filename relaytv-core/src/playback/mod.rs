//! Source Resolution Engine
//!
//! Picks how a stream is played (native element, segmented engine, gateway
//! or relay) and walks a bounded fallback ladder when an attempt fails.

pub mod attempt;
pub mod controller;
pub mod ladder;
pub mod preflight;
pub mod relay;
pub mod resume;

pub use attempt::{
    CandidateUrls, EngineKind, FailureKind, LadderState, PlaybackAttempt, PlaybackRequest,
    PrefetchedMetadata, Track,
};
pub use controller::{MediaBackend, PlaybackController, SessionEvent};
pub use ladder::{
    Ladder, LadderSettings, MediaErrorCode, Platform, PlayerCommand, PlayerEvent,
    SegmentedErrorKind,
};
pub use relay::RelayRotation;
pub use resume::ResumeGuard;
