//! Event broadcasters for state changes and operation progress.

pub mod progress;
pub mod state;

pub use progress::ProgressBroadcaster;
pub use state::{RepositoryEvent, StateBroadcaster};
