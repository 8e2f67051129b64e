//! Error types for decoding, correlation, and orchestration.

use std::path::PathBuf;

use siglink_runtime::RuntimeError;

#[derive(Debug, thiserror::Error)]
pub enum SiglinkError {
	/// The screenshot contains no recognizable QR code.
	#[error("no QR code found in {path}; retake the screenshot", path = .path.display())]
	NoCodeFound { path: PathBuf },

	/// The screenshot contains several QR codes with disagreeing payloads.
	#[error(
		"{count} QR codes with disagreeing payloads in {path}; retake the screenshot showing only the pairing code",
		path = .path.display()
	)]
	MultipleCodesAmbiguous { path: PathBuf, count: usize },

	/// The screenshot file could not be read as an image.
	#[error("cannot read {path} as an image: {reason}", path = .path.display())]
	ImageLoad { path: PathBuf, reason: String },

	/// A linking URI did not parse as a provisioning URI.
	#[error("invalid provisioning URI {uri:?}: {reason}")]
	InvalidLinkUri { uri: String, reason: String },

	/// The offered and decoded linking URIs carry different identity tokens;
	/// the screenshot is stale or belongs to another session.
	#[error("linking URIs disagree on identity token ({offered} vs {decoded}); restarting the handshake")]
	LinkCorrelation { offered: String, decoded: String },

	/// A CLI call failed unrecoverably. Raw subprocess output is attached so
	/// the operator can troubleshoot manually.
	#[error("{stage} failed: {diagnostics}")]
	StageFailed { stage: &'static str, diagnostics: String },

	/// A bounded human-input retry loop ran out of attempts.
	#[error("{stage}: gave up after {max_attempts} attempts")]
	AttemptsExhausted { stage: &'static str, max_attempts: u32 },

	/// An operation was requested in a state that does not allow it.
	#[error("{action} is not valid while the session is {state}")]
	InvalidTransition { action: &'static str, state: String },

	#[error(transparent)]
	Runtime(#[from] RuntimeError),
}

pub type Result<T> = std::result::Result<T, SiglinkError>;
