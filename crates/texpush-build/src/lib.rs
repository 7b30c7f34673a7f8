//! texpush build - run the compiler, then analyze, publish and record
//!
//! Provides:
//! - A shell command runner that tees output to the console and to capture files
//! - The sequential compile → analyze → publish → record pipeline
//! - Plain-text rendering of run reports and history

pub mod capture;
pub mod pipeline;
pub mod report;
pub mod runner;

// Re-export key types
pub use capture::CapturedOutput;
pub use pipeline::{CompileAndPublish, RunOutcome};
pub use report::{format_size, render_history, render_report};
pub use runner::{
    CommandRunner, InvokeRequest, Invocation, ScriptedRunner, ShellRunner, COMMAND_NOT_FOUND,
    TIMEOUT_EXIT_CODE,
};
