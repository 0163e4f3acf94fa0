//! Live working-copy state engine.
//!
//! Tracks the state of git working copies by driving the external `git`
//! executable, parsing its machine-readable output, and reconciling the
//! results into an observable snapshot model:
//!
//! - [`Model`] opens and closes repositories and fans out events
//! - [`repository::Repository`] runs operations with retry and triggers
//!   reconciliation after every successful mutating operation
//! - [`git`] holds the process runner, output parsers and error classifier
//! - [`watcher`] debounces filesystem activity into refresh triggers
//!
//! Consumers subscribe to [`RepositoryEvent`]s and read the
//! [`RepositorySnapshot`] each event carries; all mutation flows back
//! through the repository's operations.

pub mod broadcast;
pub mod config;
pub mod error;
pub mod git;
pub mod model;
pub mod operation;
pub mod progress;
pub mod reconciler;
pub mod repository;
pub mod resource;
pub mod sequencer;
pub mod telemetry;
pub mod watcher;

pub use broadcast::{ProgressBroadcaster, RepositoryEvent, StateBroadcaster};
pub use config::{load_config, load_config_from_str, BadgePolicy, EngineConfig, UntrackedMode};
pub use error::{ConfigError, EngineError, Result};
pub use git::{CancelFlag, GitError, GitErrorKind, GitExecutor};
pub use model::Model;
pub use operation::OperationKind;
pub use progress::{OperationProgress, ProgressEvent, ProgressPhase};
pub use repository::{Repository, RepositoryState};
pub use resource::{RepositorySnapshot, Resource, ResourceGroupKind, ResourceGroups, StatusType};
pub use telemetry::init_tracing;
