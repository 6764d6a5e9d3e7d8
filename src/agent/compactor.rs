//! History compaction
//!
//! Asks the model for a summary of the conversation and replaces the
//! history with it.

use crate::core::{FrameworkError, FrameworkResult};
use crate::llm::{ContentBlock, LlmProvider, Message};
use crate::session::Session;

const SUMMARY_SYSTEM_PROMPT: &str =
    "You are a helpful AI assistant tasked with summarizing conversations.";

const SUMMARY_REQUEST: &str = "Provide a detailed but concise summary of our conversation above. \
Focus on information that would be helpful for continuing the conversation, including what we did, \
what we're doing, which files we're working on, and what we're going to do next.";

/// Text of the user message that carries the summary
pub fn summary_message(summary: &str) -> String {
    format!(
        "This session continues an earlier conversation that was compacted. \
         Summary of the earlier messages:\n\n{}",
        summary.trim()
    )
}

/// Number of trailing messages that form an unanswered tool exchange
///
/// A history ending in `tool_use` followed by its `tool_result` message must
/// keep both so the next request still ends with the results.
fn open_tool_exchange(history: &[Message]) -> usize {
    let [.., assistant, results] = history else {
        return 0;
    };
    let has_results = results.is_user()
        && results.blocks().map_or(false, |blocks| {
            blocks
                .iter()
                .any(|b| matches!(b, ContentBlock::ToolResult { .. }))
        });
    if has_results && !assistant.is_user() && !assistant.tool_uses().is_empty() {
        2
    } else {
        0
    }
}

/// Replace the session history with a model-written summary
///
/// A trailing tool exchange is carried over after the summary. Returns the
/// number of messages that were summarized.
pub async fn compact_history(
    session: &mut Session,
    llm: &dyn LlmProvider,
) -> FrameworkResult<usize> {
    let history = session.history().to_vec();
    let keep = open_tool_exchange(&history);
    let (earlier, tail) = history.split_at(history.len() - keep);
    if earlier.is_empty() {
        return Err(FrameworkError::other("Not enough messages to compact"));
    }

    let summary = llm
        .send_message(SUMMARY_REQUEST, earlier, Some(SUMMARY_SYSTEM_PROMPT))
        .await?;
    if summary.trim().is_empty() {
        return Err(FrameworkError::Api(
            "Failed to generate conversation summary".to_string(),
        ));
    }

    let mut compacted = vec![Message::user(summary_message(&summary))];
    if tail.is_empty() {
        compacted.push(Message::assistant("Understood. I'll continue from this summary."));
    } else {
        compacted.extend_from_slice(tail);
    }
    session.replace_history(compacted)?;
    session.record_compaction();
    tracing::info!(
        session_id = %session.session_id(),
        summarized = earlier.len(),
        kept = tail.len(),
        "Compacted conversation history"
    );
    Ok(earlier.len())
}
