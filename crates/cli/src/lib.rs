//! SessionCLI layer: prompts, progress, and dispatch around the orchestrators.

pub mod cli;
pub mod flow;
pub mod logging;
pub mod prompts;
