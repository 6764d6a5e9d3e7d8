//! Session management
//!
//! A [`Session`] holds the conversation history and [`SessionMetadata`]
//! (model, timestamps, usage statistics) and persists both through
//! [`SessionStorage`]. [`CompactionState`] tracks auto-compaction for a
//! conversation.

pub mod compaction;
pub mod metadata;
pub mod session;
pub mod storage;

pub use compaction::CompactionState;
pub use metadata::{SessionMetadata, SessionStats};
pub use session::Session;
pub use storage::SessionStorage;
