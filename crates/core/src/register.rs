//! Phone-number registration state machine.
//!
//! PENDING → CAPTCHA_REQUIRED → CODE_REQUIRED → VERIFIED, with FAILED
//! terminal. Human inputs (CAPTCHA token, verification code) arrive as
//! arguments to the named transitions [`RegistrationOrchestrator::request_code`],
//! [`RegistrationOrchestrator::submit_captcha`], and
//! [`RegistrationOrchestrator::submit_code`]; the orchestrator never prompts.

use tracing::{info, warn};

use crate::classify::{Classifier, Outcome};
use crate::error::{Result, SiglinkError};
use crate::runner::CliRunner;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationStatus {
	Pending,
	CaptchaRequired,
	CodeRequired,
	Verified,
	Failed,
}

impl std::fmt::Display for RegistrationStatus {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let name = match self {
			Self::Pending => "pending",
			Self::CaptchaRequired => "awaiting CAPTCHA token",
			Self::CodeRequired => "awaiting verification code",
			Self::Verified => "verified",
			Self::Failed => "failed",
		};
		f.write_str(name)
	}
}

/// One registration attempt for a phone number. Owned and mutated only by
/// the orchestrator.
#[derive(Debug, Clone)]
pub struct RegistrationSession {
	number: String,
	status: RegistrationStatus,
	code_attempts: u32,
}

impl RegistrationSession {
	fn new(number: String) -> Self {
		Self {
			number,
			status: RegistrationStatus::Pending,
			code_attempts: 0,
		}
	}

	pub fn number(&self) -> &str {
		&self.number
	}

	pub fn status(&self) -> RegistrationStatus {
		self.status
	}

	pub fn code_attempts(&self) -> u32 {
		self.code_attempts
	}
}

/// Proof that a number completed verification. Linking cannot start without
/// one, which pins the VERIFIED-before-linking ordering at the type level.
#[derive(Debug, Clone)]
pub struct VerifiedNumber(pub(crate) String);

impl VerifiedNumber {
	pub fn as_str(&self) -> &str {
		&self.0
	}
}

#[derive(Debug, Clone)]
pub struct RegistrationConfig {
	/// Wrong codes tolerated before the session fails; the attempt after the
	/// maximum is the terminal one.
	pub max_code_attempts: u32,
	/// Request the code by voice call instead of SMS.
	pub voice: bool,
}

impl Default for RegistrationConfig {
	fn default() -> Self {
		Self {
			max_code_attempts: 3,
			voice: false,
		}
	}
}

/// Drives a [`RegistrationSession`] through the provisioned CLI.
pub struct RegistrationOrchestrator<R: CliRunner> {
	runner: R,
	classifier: Classifier,
	config: RegistrationConfig,
	session: RegistrationSession,
}

impl<R: CliRunner> RegistrationOrchestrator<R> {
	pub fn new(runner: R, classifier: Classifier, number: String, config: RegistrationConfig) -> Self {
		Self {
			runner,
			classifier,
			config,
			session: RegistrationSession::new(number),
		}
	}

	pub fn session(&self) -> &RegistrationSession {
		&self.session
	}

	pub fn status(&self) -> RegistrationStatus {
		self.session.status
	}

	/// Evidence of verification, available only in the VERIFIED state.
	pub fn verified_number(&self) -> Option<VerifiedNumber> {
		(self.session.status == RegistrationStatus::Verified).then(|| VerifiedNumber(self.session.number.clone()))
	}

	/// PENDING → CODE_REQUIRED, or CAPTCHA_REQUIRED when the backend demands
	/// a token first. The caller then supplies the token via
	/// [`Self::submit_captcha`].
	pub async fn request_code(&mut self) -> Result<RegistrationStatus> {
		self.expect("request_code", RegistrationStatus::Pending)?;
		let result = self.invoke_register(None).await?;
		match self.classifier.classify(&result) {
			Outcome::Success => {
				info!(target = "siglink.register", "verification code dispatched");
				self.session.status = RegistrationStatus::CodeRequired;
				Ok(self.session.status)
			}
			Outcome::CaptchaRequired => {
				info!(target = "siglink.register", "CAPTCHA challenge required");
				self.session.status = RegistrationStatus::CaptchaRequired;
				Ok(self.session.status)
			}
			_ => self.fail("registration", result.combined_output()),
		}
	}

	/// CAPTCHA_REQUIRED → CODE_REQUIRED. A token the backend rejects with
	/// another CAPTCHA demand keeps the state recoverable so a fresh token
	/// can be supplied.
	pub async fn submit_captcha(&mut self, token: &str) -> Result<RegistrationStatus> {
		self.expect("submit_captcha", RegistrationStatus::CaptchaRequired)?;
		let result = self.invoke_register(Some(token)).await?;
		match self.classifier.classify(&result) {
			Outcome::Success => {
				info!(target = "siglink.register", "verification code dispatched");
				self.session.status = RegistrationStatus::CodeRequired;
				Ok(self.session.status)
			}
			Outcome::CaptchaRequired => {
				warn!(target = "siglink.register", "CAPTCHA token rejected; a fresh token is needed");
				Ok(self.session.status)
			}
			_ => self.fail("registration", result.combined_output()),
		}
	}

	/// CODE_REQUIRED → VERIFIED. A wrong code returns to CODE_REQUIRED until
	/// the configured attempt limit is exceeded, which fails the session.
	pub async fn submit_code(&mut self, code: &str) -> Result<RegistrationStatus> {
		self.expect("submit_code", RegistrationStatus::CodeRequired)?;

		// Codes are numeric; reject locally without burning a CLI call.
		if code.is_empty() || !code.chars().all(|c| c.is_ascii_digit()) {
			warn!(target = "siglink.register", "non-numeric verification code");
			return self.wrong_code();
		}

		let args = vec!["-u".to_string(), self.session.number.clone(), "verify".to_string(), code.to_string()];
		let result = self.run_cli(&args).await?;
		match self.classifier.classify(&result) {
			Outcome::Success => {
				info!(target = "siglink.register", number = %self.session.number, "number verified");
				self.session.status = RegistrationStatus::Verified;
				Ok(self.session.status)
			}
			Outcome::InvalidCode => self.wrong_code(),
			_ => self.fail("verification", result.combined_output()),
		}
	}

	fn wrong_code(&mut self) -> Result<RegistrationStatus> {
		self.session.code_attempts += 1;
		if self.session.code_attempts > self.config.max_code_attempts {
			self.session.status = RegistrationStatus::Failed;
			return Err(SiglinkError::AttemptsExhausted {
				stage: "verification",
				max_attempts: self.config.max_code_attempts,
			});
		}
		warn!(
			target = "siglink.register",
			attempt = self.session.code_attempts,
			max = self.config.max_code_attempts,
			"verification code rejected"
		);
		Ok(RegistrationStatus::CodeRequired)
	}

	async fn invoke_register(&mut self, captcha: Option<&str>) -> Result<siglink_runtime::ProcessResult> {
		let mut args = vec!["-u".to_string(), self.session.number.clone(), "register".to_string()];
		if self.config.voice {
			args.push("--voice".to_string());
		}
		if let Some(token) = captcha {
			args.push("--captcha".to_string());
			args.push(token.to_string());
		}
		self.run_cli(&args).await
	}

	/// Process errors (spawn failure, timeout) are unrecoverable here and
	/// fail the session on the way out.
	async fn run_cli(&mut self, args: &[String]) -> Result<siglink_runtime::ProcessResult> {
		match self.runner.run(args).await {
			Ok(result) => Ok(result),
			Err(err) => {
				self.session.status = RegistrationStatus::Failed;
				Err(err.into())
			}
		}
	}

	fn fail(&mut self, stage: &'static str, diagnostics: String) -> Result<RegistrationStatus> {
		self.session.status = RegistrationStatus::Failed;
		Err(SiglinkError::StageFailed { stage, diagnostics })
	}

	fn expect(&self, action: &'static str, wanted: RegistrationStatus) -> Result<()> {
		if self.session.status != wanted {
			return Err(SiglinkError::InvalidTransition {
				action,
				state: self.session.status.to_string(),
			});
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use crate::runner::testing::ScriptedRunner;

	use super::*;

	fn orchestrator(runner: ScriptedRunner) -> RegistrationOrchestrator<ScriptedRunner> {
		RegistrationOrchestrator::new(
			runner,
			Classifier::signal_cli_defaults(),
			"+15550001234".to_string(),
			RegistrationConfig::default(),
		)
	}

	#[tokio::test]
	async fn happy_path_reaches_verified() {
		let runner = ScriptedRunner::new([
			ScriptedRunner::failure("Captcha required\n"),
			ScriptedRunner::success(""),
			ScriptedRunner::success(""),
		]);
		let mut reg = orchestrator(runner);

		assert_eq!(reg.request_code().await.unwrap(), RegistrationStatus::CaptchaRequired);
		assert_eq!(reg.submit_captcha("abc123").await.unwrap(), RegistrationStatus::CodeRequired);
		assert_eq!(reg.submit_code("482913").await.unwrap(), RegistrationStatus::Verified);
		assert!(reg.verified_number().is_some());

		let calls = reg.runner.calls();
		assert_eq!(calls[0], ["-u", "+15550001234", "register"]);
		assert_eq!(calls[1], ["-u", "+15550001234", "register", "--captcha", "abc123"]);
		assert_eq!(calls[2], ["-u", "+15550001234", "verify", "482913"]);
	}

	#[tokio::test]
	async fn no_captcha_jumps_straight_to_code() {
		let runner = ScriptedRunner::new([ScriptedRunner::success("")]);
		let mut reg = orchestrator(runner);
		assert_eq!(reg.request_code().await.unwrap(), RegistrationStatus::CodeRequired);
	}

	#[tokio::test]
	async fn rejected_captcha_token_stays_recoverable() {
		let runner = ScriptedRunner::new([
			ScriptedRunner::failure("Captcha required\n"),
			ScriptedRunner::failure("Captcha required\n"),
			ScriptedRunner::success(""),
		]);
		let mut reg = orchestrator(runner);
		reg.request_code().await.unwrap();
		assert_eq!(reg.submit_captcha("stale").await.unwrap(), RegistrationStatus::CaptchaRequired);
		assert_eq!(reg.submit_captcha("fresh").await.unwrap(), RegistrationStatus::CodeRequired);
	}

	#[tokio::test]
	async fn fourth_wrong_code_fails_the_session() {
		let mut script = vec![ScriptedRunner::success("")];
		script.extend((0..4).map(|_| ScriptedRunner::failure("Invalid verification code\n")));
		let mut reg = orchestrator(ScriptedRunner::new(script));
		reg.request_code().await.unwrap();

		for _ in 0..3 {
			assert_eq!(reg.submit_code("000000").await.unwrap(), RegistrationStatus::CodeRequired);
		}
		let err = reg.submit_code("000000").await.unwrap_err();
		assert!(matches!(err, SiglinkError::AttemptsExhausted { max_attempts: 3, .. }));
		assert_eq!(reg.status(), RegistrationStatus::Failed);
		assert!(reg.verified_number().is_none());
	}

	#[tokio::test]
	async fn non_numeric_code_counts_as_an_attempt_without_a_call() {
		let runner = ScriptedRunner::new([ScriptedRunner::success("")]);
		let mut reg = orchestrator(runner);
		reg.request_code().await.unwrap();
		assert_eq!(reg.submit_code("48two9").await.unwrap(), RegistrationStatus::CodeRequired);
		assert_eq!(reg.session().code_attempts(), 1);
		assert_eq!(reg.runner.calls().len(), 1);
	}

	#[tokio::test]
	async fn generic_failure_is_terminal() {
		let runner = ScriptedRunner::new([ScriptedRunner::failure("Failed to register: rate limited\n")]);
		let mut reg = orchestrator(runner);
		let err = reg.request_code().await.unwrap_err();
		match err {
			SiglinkError::StageFailed { stage, diagnostics } => {
				assert_eq!(stage, "registration");
				assert!(diagnostics.contains("rate limited"));
			}
			other => panic!("expected stage failure, got {other:?}"),
		}
		assert_eq!(reg.status(), RegistrationStatus::Failed);
		assert!(matches!(reg.request_code().await.unwrap_err(), SiglinkError::InvalidTransition { .. }));
	}

	#[tokio::test]
	async fn voice_flag_changes_the_register_call() {
		let runner = ScriptedRunner::new([ScriptedRunner::success("")]);
		let mut reg = RegistrationOrchestrator::new(
			runner,
			Classifier::signal_cli_defaults(),
			"+15550001234".to_string(),
			RegistrationConfig {
				voice: true,
				..RegistrationConfig::default()
			},
		);
		reg.request_code().await.unwrap();
		assert_eq!(reg.runner.calls()[0], ["-u", "+15550001234", "register", "--voice"]);
	}
}
