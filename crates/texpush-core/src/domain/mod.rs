//! Domain models for texpush.
//!
//! - `RunConfig`: parameters resolved once at startup
//! - `RunRecord`: the immutable summary of a single invocation
//! - `TexpushError`: error taxonomy shared by the library crates

pub mod config;
pub mod error;
pub mod record;

pub use config::RunConfig;
pub use error::{Result, TexpushError};
pub use record::{GitAction, RunRecord, RunStatus, SKIPPED_COMMIT_ID};
