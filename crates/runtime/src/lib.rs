//! signal-cli binary lifecycle: release lookup, versioned cache, subprocess invocation.

pub mod artifact;
pub mod error;
pub mod invoke;

pub use artifact::{Artifact, ArtifactProvisioner, ProvisionerConfig};
pub use error::{Result, RuntimeError};
pub use invoke::{ProcessInvocation, ProcessResult};
