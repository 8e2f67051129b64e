//! Error types for artifact provisioning and process invocation.

use std::time::Duration;

/// Errors raised by the runtime layer. Provisioning variants are fatal to the
/// run; invocation variants are classified by the orchestration layer.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
	/// Release metadata could not be resolved from the hosting API.
	#[error("release lookup failed: {0}")]
	ArtifactLookup(String),

	/// The release asset could not be downloaded intact.
	#[error("artifact download failed: {0}")]
	ArtifactDownload(String),

	/// The downloaded archive could not be unpacked.
	#[error("artifact extraction failed: {0}")]
	ArtifactExtraction(String),

	/// The provisioned binary could not be started.
	#[error("failed to spawn {program}: {source}")]
	ProcessSpawn {
		program: String,
		#[source]
		source: std::io::Error,
	},

	/// The subprocess outlived its deadline and was killed. Partial output
	/// captured before termination is attached for diagnostics.
	#[error("{program} timed out after {timeout:?}")]
	ProcessTimeout {
		program: String,
		timeout: Duration,
		stdout: String,
		stderr: String,
	},

	#[error(transparent)]
	Io(#[from] std::io::Error),

	#[error(transparent)]
	Http(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, RuntimeError>;
