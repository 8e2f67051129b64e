//! Data-driven classification of CLI output.
//!
//! The orchestrators never inspect subprocess text directly; they hold a
//! [`Classifier`] whose substring rules map recognized wording to an
//! [`Outcome`]. The rules are plain data so they can be tested standalone and
//! swapped when the underlying CLI changes its wording.

use siglink_runtime::ProcessResult;

/// Classified result of one CLI call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
	/// Exit code zero and no recognized failure marker.
	Success,
	/// The verification backend demands a CAPTCHA token before proceeding.
	CaptchaRequired,
	/// The submitted verification code was rejected.
	InvalidCode,
	/// Unrecoverable failure; terminal for the current stage.
	Failure,
}

/// Ordered substring rules checked against combined stdout/stderr.
#[derive(Debug, Clone)]
pub struct Classifier {
	rules: Vec<(String, Outcome)>,
}

impl Classifier {
	pub fn new(rules: Vec<(String, Outcome)>) -> Self {
		Self { rules }
	}

	/// Rules matching current signal-cli wording, earlier wording kept as
	/// fallbacks.
	pub fn signal_cli_defaults() -> Self {
		Self::new(vec![
			("Captcha required".to_string(), Outcome::CaptchaRequired),
			("captcha".to_string(), Outcome::CaptchaRequired),
			("Invalid verification code".to_string(), Outcome::InvalidCode),
			("Verify error".to_string(), Outcome::InvalidCode),
			("Failed to register".to_string(), Outcome::Failure),
			("invalid format".to_string(), Outcome::Failure),
		])
	}

	/// First matching rule wins; any marker overrides the exit code. With no
	/// marker, exit code zero is the sole success condition.
	pub fn classify(&self, result: &ProcessResult) -> Outcome {
		let combined = result.combined_output();
		for (pattern, outcome) in &self.rules {
			if combined.contains(pattern.as_str()) {
				return *outcome;
			}
		}
		if result.exit_code == Some(0) { Outcome::Success } else { Outcome::Failure }
	}
}
