//! Built-in tools
//!
//! - `BashTool` - Execute shell commands
//! - `ReadTool` - Read files and notebooks
//! - `WriteTool` - Write files
//! - `EditTool` - Edit files with string replacement
//! - `NotebookEditTool` - Replace, insert or delete notebook cells
//! - `GlobTool` - Find files by pattern
//! - `GrepTool` - Search file contents

pub mod bash;
pub mod edit_tool;
pub mod glob_tool;
pub mod grep_tool;
pub mod notebook;
pub mod notebook_edit;
pub mod read_tool;
pub mod write_tool;

pub use bash::BashTool;
pub use edit_tool::EditTool;
pub use glob_tool::GlobTool;
pub use grep_tool::GrepTool;
pub use notebook_edit::NotebookEditTool;
pub use read_tool::ReadTool;
pub use write_tool::WriteTool;
