//! Agent-runner supervision.
//!
//! This crate provides:
//! - Prompt assembly from router instructions, chat history and the query
//! - Spawning the agent CLI with line-buffered, merged output
//! - Translating its streaming JSON output into bus events
//! - Relocating generated files and enriching the final result

pub mod config;
pub mod error;
pub mod prompt;
pub mod relocate;
pub mod runner;
pub mod scan;

pub use config::AgentConfig;
pub use error::{RunnerError, RunnerResult};
pub use relocate::MovedFile;
pub use runner::AgentRunner;
pub use scan::OutputScanner;
