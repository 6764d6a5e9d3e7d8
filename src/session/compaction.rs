//! Auto-compaction tracking
//!
//! After history is auto-compacted, the next few model calls emit a
//! `post_compaction_turn` event so the effect of compaction can be followed
//! in the logs. Events stop after [`TRACKED_TURNS`] calls.

use serde::{Deserialize, Serialize};

/// Model calls after a compaction that still emit an event
pub const TRACKED_TURNS: u32 = 10;

/// Per-conversation compaction flag and turn counter
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompactionState {
    compacted: bool,
    turn_counter: u32,
    /// Unique id per compaction, carried on follow-up events
    #[serde(default, skip_serializing_if = "Option::is_none")]
    compaction_id: Option<String>,
}

impl CompactionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_compacted(&self) -> bool {
        self.compacted
    }

    pub fn turn_counter(&self) -> u32 {
        self.turn_counter
    }

    /// Record an auto-compaction; resets the counter
    pub fn mark_compacted(&mut self) {
        self.compacted = true;
        self.turn_counter = 0;
        self.compaction_id = Some(uuid::Uuid::new_v4().to_string());
    }

    /// Account for one model call. Returns the turn number when an event was emitted.
    pub fn on_model_call(&mut self, session_id: &str, model: &str) -> Option<u32> {
        if !self.compacted {
            return None;
        }
        self.turn_counter = self.turn_counter.saturating_add(1);
        if self.turn_counter > TRACKED_TURNS {
            return None;
        }
        tracing::info!(
            target: "codewright::telemetry",
            event = "post_compaction_turn",
            session_id,
            model,
            compaction_id = self.compaction_id.as_deref().unwrap_or(""),
            turn = self.turn_counter,
            "Model call after auto-compaction"
        );
        Some(self.turn_counter)
    }
}
