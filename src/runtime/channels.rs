//! Channel types for agent communication
//!
//! - **Input** (mpsc): user text, permission answers, compact and shutdown requests
//! - **Output** (broadcast): streamed chunks, any number of subscribers

use tokio::sync::{broadcast, mpsc};

use crate::core::{InputMessage, OutputChunk};

/// Buffer size for the input channel
pub const INPUT_CHANNEL_SIZE: usize = 32;

/// Buffer size for the output broadcast channel
pub const OUTPUT_CHANNEL_SIZE: usize = 1024;

pub type InputSender = mpsc::Sender<InputMessage>;
pub type InputReceiver = mpsc::Receiver<InputMessage>;
pub type OutputSender = broadcast::Sender<OutputChunk>;
pub type OutputReceiver = broadcast::Receiver<OutputChunk>;

/// Create the input pair and the output sender
///
/// Output receivers come from `sender.subscribe()`.
pub fn create_agent_channels() -> (InputSender, InputReceiver, OutputSender) {
    let (input_tx, input_rx) = mpsc::channel(INPUT_CHANNEL_SIZE);
    let (output_tx, _) = broadcast::channel(OUTPUT_CHANNEL_SIZE);
    (input_tx, input_rx, output_tx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permissions::PermissionDecision;

    #[tokio::test]
    async fn test_input_preserves_order() {
        let (tx, mut rx, _out) = create_agent_channels();

        tx.send(InputMessage::user_input("fix the build")).await.unwrap();
        tx.send(InputMessage::permission("toolu_1", PermissionDecision::Reject))
            .await
            .unwrap();

        assert!(matches!(rx.recv().await, Some(InputMessage::UserInput(s)) if s == "fix the build"));
        assert!(matches!(
            rx.recv().await,
            Some(InputMessage::PermissionResponse { tool_use_id, .. }) if tool_use_id == "toolu_1"
        ));
    }

    #[tokio::test]
    async fn test_output_reaches_every_subscriber() {
        let (_tx, _rx, out) = create_agent_channels();
        let mut renderer = out.subscribe();
        let mut logger = out.subscribe();

        out.send(OutputChunk::text("Hi")).unwrap();
        out.send(OutputChunk::Done).unwrap();

        for rx in [&mut renderer, &mut logger] {
            assert!(matches!(rx.recv().await.unwrap(), OutputChunk::TextDelta(s) if s == "Hi"));
            assert!(rx.recv().await.unwrap().is_terminal());
        }
    }

    #[tokio::test]
    async fn test_send_without_subscribers_fails() {
        let (_tx, _rx, out) = create_agent_channels();
        assert!(out.send(OutputChunk::Done).is_err());
    }
}
