//! Agent runtime and communication
//!
//! - `AgentRuntime` - Spawns the agent as a tokio task
//! - `AgentHandle` - Sends input, subscribes to output, interrupts turns
//! - `AgentInternals` - State and channels owned by the agent task
//! - `TurnSignal` - Per-turn cancellation shared by both sides

pub mod channels;
pub mod handle;
pub mod internals;
pub mod runtime;

pub use channels::{InputReceiver, InputSender, OutputReceiver, OutputSender};
pub use handle::AgentHandle;
pub use internals::{AgentInternals, TurnSignal};
pub use runtime::AgentRuntime;
