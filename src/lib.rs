pub mod core;
pub mod runtime;
pub mod session;
pub mod permissions;
pub mod tools;

// Settings shared across sessions
pub mod config;

// Optional components
pub mod cli;
pub mod llm;
pub mod logging;

// Standardized agent implementation
pub mod agent;
