//! Registration and desktop-linking orchestration for signal-cli.
//!
//! The flow is strictly sequential: provision the CLI binary once
//! (`siglink-runtime`), drive a [`register::RegistrationOrchestrator`] to a
//! verified number, then a [`link::DeviceLinkOrchestrator`] through the
//! pairing handshake. Human prompts (CAPTCHA token, verification code,
//! screenshot path) are named transitions supplied by the caller between
//! orchestrator calls, so the same state machines run under a scripted test
//! harness.

pub mod classify;
pub mod error;
pub mod link;
pub mod qr;
pub mod register;
pub mod runner;
pub mod uri;

pub use error::{Result, SiglinkError};
pub use runner::{CliRunner, SignalCli};
