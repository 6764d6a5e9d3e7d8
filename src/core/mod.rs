//! Core types for the assistant
//!
//! This module provides the fundamental types used throughout the crate:
//! - `AgentState` - Current state of an agent
//! - `OutputChunk` / `InputMessage` - Communication types
//! - `FrameworkError` - Error types

pub mod error;
pub mod output;
pub mod state;

pub use error::{FrameworkError, FrameworkResult};
pub use output::{InputMessage, OutputChunk};
pub use state::AgentState;
