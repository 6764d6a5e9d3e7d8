//! Tool system
//!
//! This module provides:
//! - `Tool` trait - Interface for implementing tools
//! - `ToolContext` - Working directory, abort signal and permissions for a call
//! - `ToolRegistry` - Registry for managing available tools
//! - `common` - Built-in tools (Bash, Read, Write, Edit, NotebookEdit, Glob, Grep)

pub mod file_access;
mod registry;
mod tool;
mod validation;

/// Built-in tools
pub mod common;

pub use registry::ToolRegistry;
pub use tool::{ReadFileState, Tool, ToolContext, ToolResult};
pub use validation::parse_input;

pub use common::{
    BashTool, EditTool, GlobTool, GrepTool, NotebookEditTool, ReadTool, WriteTool,
};
