//! Terminal front end

pub mod console;
pub mod prompt;
pub mod renderer;

pub use console::{Console, SlashCommand};
pub use prompt::{parse_decision, render_permission_prompt};
pub use renderer::{run_print, ConsoleRenderer};
