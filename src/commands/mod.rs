// ABOUTME: Command module aggregator for the stagecoach CLI.
// ABOUTME: Re-exports serve, deploy, and check command handlers.

mod check;
mod deploy;
mod serve;

pub use check::check;
pub use deploy::deploy;
pub use serve::serve;
