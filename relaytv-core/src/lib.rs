pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod playback;
pub mod progress;
pub mod resilience;

pub use config::Config;
pub use error::{Error, Result};
