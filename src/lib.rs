// ABOUTME: Library root for stagecoach - exposes the engine and its collaborators.
// ABOUTME: The main binary is in main.rs.

pub mod config;
pub mod deploy;
pub mod diagnostics;
pub mod error;
pub mod hooks;
pub mod layout;
pub mod notify;
pub mod server;
pub mod shutdown;
pub mod types;
