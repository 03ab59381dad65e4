pub mod coordinator;
pub mod store;

pub use coordinator::{ProgressCoordinator, SaveOutcome};
pub use store::{MemoryProgressStore, ProgressStore};
