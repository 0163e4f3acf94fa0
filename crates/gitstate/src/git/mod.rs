//! Driving the external git executable: process execution, output parsing
//! and error classification.

pub mod error;
pub mod exec;
pub mod parse;
pub mod types;

pub use error::{classify, GitError, GitErrorKind};
pub use exec::{decode_output, CancelFlag, ExecOptions, ExecResult, GitExecutor};
pub use parse::{StatusList, StatusParser};
pub use types::*;
