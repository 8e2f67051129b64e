//! Secondary-device linking state machine.
//!
//! AWAITING_URI → URI_MATCHED → LINKED, with FAILED terminal. Entered only
//! with a [`VerifiedNumber`], which a registration session yields exclusively
//! in its VERIFIED state. The CLI-offered URI is never submitted itself; it
//! is shown as a QR code for the desktop client to scan, while the URI
//! decoded from the operator's screenshot confirms what the desktop client
//! actually received. The two proceed only when they embed the same account
//! identity token.

use tracing::{info, warn};

use crate::classify::{Classifier, Outcome};
use crate::error::{Result, SiglinkError};
use crate::register::VerifiedNumber;
use crate::runner::CliRunner;
use crate::uri::{ProvisioningUri, first_provisioning_uri};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkStatus {
	#[default]
	AwaitingUri,
	UriMatched,
	Linked,
	Failed,
}

impl std::fmt::Display for LinkStatus {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let name = match self {
			Self::AwaitingUri => "awaiting linking URI",
			Self::UriMatched => "URI matched",
			Self::Linked => "linked",
			Self::Failed => "failed",
		};
		f.write_str(name)
	}
}

/// One linking handshake. Owned and mutated only by the orchestrator.
#[derive(Debug, Clone, Default)]
pub struct LinkingHandshake {
	offered: Option<ProvisioningUri>,
	decoded: Option<ProvisioningUri>,
	device_name: Option<String>,
	status: LinkStatus,
	correlation_attempts: u32,
}

impl LinkingHandshake {
	pub fn offered(&self) -> Option<&ProvisioningUri> {
		self.offered.as_ref()
	}

	/// Display name the device was finalized under.
	pub fn device_name(&self) -> Option<&str> {
		self.device_name.as_deref()
	}

	pub fn status(&self) -> LinkStatus {
		self.status
	}
}

#[derive(Debug, Clone)]
pub struct LinkConfig {
	/// Correlation mismatches tolerated before the handshake fails.
	pub max_correlation_attempts: u32,
}

impl Default for LinkConfig {
	fn default() -> Self {
		Self { max_correlation_attempts: 3 }
	}
}

/// Drives a [`LinkingHandshake`] through the provisioned CLI.
pub struct DeviceLinkOrchestrator<R: CliRunner> {
	runner: R,
	classifier: Classifier,
	number: VerifiedNumber,
	config: LinkConfig,
	handshake: LinkingHandshake,
}

impl<R: CliRunner> DeviceLinkOrchestrator<R> {
	pub fn new(runner: R, classifier: Classifier, number: VerifiedNumber, config: LinkConfig) -> Self {
		Self {
			runner,
			classifier,
			number,
			config,
			handshake: LinkingHandshake::default(),
		}
	}

	pub fn handshake(&self) -> &LinkingHandshake {
		&self.handshake
	}

	pub fn status(&self) -> LinkStatus {
		self.handshake.status
	}

	/// AWAITING_URI: asks the CLI for a fresh provisioning URI. The returned
	/// URI is time-limited, so the caller should display it and collect the
	/// screenshot promptly.
	pub async fn offer_uri(&mut self) -> Result<&ProvisioningUri> {
		self.expect("offer_uri", LinkStatus::AwaitingUri)?;

		let args = vec!["link".to_string()];
		let result = self.run_cli(&args).await?;
		if self.classifier.classify(&result) == Outcome::Failure {
			return Err(self.fail("link offer", result.combined_output()));
		}

		let output = result.combined_output();
		let Some(raw) = first_provisioning_uri(&output) else {
			return Err(self.fail("link offer", format!("no provisioning URI in output: {output}")));
		};
		let offered = ProvisioningUri::parse(raw)?;

		info!(target = "siglink.link", identity = %offered.identity_token(), "provisioning URI offered");
		Ok(&*self.handshake.offered.insert(offered))
	}

	/// Correlates the URI decoded from the operator's screenshot with the
	/// offered one. A mismatch discards the offered URI and returns the
	/// handshake to AWAITING_URI for a fresh offer, bounded by the configured
	/// attempt limit.
	pub fn correlate(&mut self, decoded: ProvisioningUri) -> Result<LinkStatus> {
		self.expect("correlate", LinkStatus::AwaitingUri)?;
		let Some(offered) = self.handshake.offered.clone() else {
			return Err(SiglinkError::InvalidTransition {
				action: "correlate",
				state: "awaiting linking URI (none offered yet)".to_string(),
			});
		};

		if !offered.same_identity(&decoded) {
			self.handshake.correlation_attempts += 1;
			self.handshake.offered = None;
			if self.handshake.correlation_attempts > self.config.max_correlation_attempts {
				self.handshake.status = LinkStatus::Failed;
				return Err(SiglinkError::AttemptsExhausted {
					stage: "link correlation",
					max_attempts: self.config.max_correlation_attempts,
				});
			}
			warn!(
				target = "siglink.link",
				attempt = self.handshake.correlation_attempts,
				"identity token mismatch; likely a stale screenshot"
			);
			return Err(SiglinkError::LinkCorrelation {
				offered: offered.identity_token().to_string(),
				decoded: decoded.identity_token().to_string(),
			});
		}

		info!(target = "siglink.link", identity = %decoded.identity_token(), "linking URIs correlated");
		self.handshake.decoded = Some(decoded);
		self.handshake.status = LinkStatus::UriMatched;
		Ok(self.handshake.status)
	}

	/// URI_MATCHED → LINKED: submits the confirmed URI back to the CLI under
	/// the supplied device display name to complete pairing. Any CLI-reported
	/// failure is terminal; the whole handshake must restart from
	/// AWAITING_URI.
	pub async fn finalize(&mut self, device_name: &str) -> Result<LinkStatus> {
		self.expect("finalize", LinkStatus::UriMatched)?;
		let Some(decoded) = self.handshake.decoded.clone() else {
			return Err(SiglinkError::InvalidTransition {
				action: "finalize",
				state: "URI matched (no decoded URI retained)".to_string(),
			});
		};

		let args = vec![
			"-u".to_string(),
			self.number.as_str().to_string(),
			"addDevice".to_string(),
			"--uri".to_string(),
			decoded.as_str().to_string(),
			"--name".to_string(),
			device_name.to_string(),
		];
		let result = self.run_cli(&args).await?;
		match self.classifier.classify(&result) {
			Outcome::Success => {
				info!(target = "siglink.link", device = %device_name, "device linked");
				self.handshake.device_name = Some(device_name.to_string());
				self.handshake.status = LinkStatus::Linked;
				Ok(self.handshake.status)
			}
			_ => Err(self.fail("device linking", result.combined_output())),
		}
	}

	/// Process errors (spawn failure, timeout) are unrecoverable here and
	/// fail the handshake on the way out.
	async fn run_cli(&mut self, args: &[String]) -> Result<siglink_runtime::ProcessResult> {
		match self.runner.run(args).await {
			Ok(result) => Ok(result),
			Err(err) => {
				self.handshake.status = LinkStatus::Failed;
				Err(err.into())
			}
		}
	}

	fn fail(&mut self, stage: &'static str, diagnostics: String) -> SiglinkError {
		self.handshake.status = LinkStatus::Failed;
		SiglinkError::StageFailed { stage, diagnostics }
	}

	fn expect(&self, action: &'static str, wanted: LinkStatus) -> Result<()> {
		if self.handshake.status != wanted {
			return Err(SiglinkError::InvalidTransition {
				action,
				state: self.handshake.status.to_string(),
			});
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use crate::runner::testing::ScriptedRunner;

	use super::*;

	const OFFERED: &str = "sgnl://linkdevice?uuid=ABCD&pub_key=XYZ";
	const FOREIGN: &str = "sgnl://linkdevice?uuid=WXYZ&pub_key=OTHER";

	fn orchestrator(runner: ScriptedRunner) -> DeviceLinkOrchestrator<ScriptedRunner> {
		DeviceLinkOrchestrator::new(
			runner,
			Classifier::signal_cli_defaults(),
			VerifiedNumber("+15550001234".to_string()),
			LinkConfig::default(),
		)
	}

	fn offer_output() -> String {
		format!("Scan this QR code:\n{OFFERED}\n")
	}

	#[tokio::test]
	async fn matching_identity_reaches_linked() {
		let runner = ScriptedRunner::new([ScriptedRunner::success(&offer_output()), ScriptedRunner::success("Device added\n")]);
		let mut link = orchestrator(runner);

		let offered = link.offer_uri().await.unwrap();
		assert_eq!(offered.identity_token(), "ABCD");

		let decoded = ProvisioningUri::parse(OFFERED).unwrap();
		assert_eq!(link.correlate(decoded).unwrap(), LinkStatus::UriMatched);
		assert_eq!(link.finalize("Desktop").await.unwrap(), LinkStatus::Linked);

		let calls = link.runner.calls();
		assert_eq!(calls[0], ["link"]);
		assert_eq!(calls[1], ["-u", "+15550001234", "addDevice", "--uri", OFFERED, "--name", "Desktop"]);
	}

	#[tokio::test]
	async fn mismatched_identity_returns_to_awaiting() {
		let runner = ScriptedRunner::new([
			ScriptedRunner::success(&offer_output()),
			ScriptedRunner::success(&offer_output()),
			ScriptedRunner::success("Device added\n"),
		]);
		let mut link = orchestrator(runner);

		link.offer_uri().await.unwrap();
		let err = link.correlate(ProvisioningUri::parse(FOREIGN).unwrap()).unwrap_err();
		assert!(matches!(err, SiglinkError::LinkCorrelation { .. }));
		assert_eq!(link.status(), LinkStatus::AwaitingUri);
		// A stale offer cannot be correlated against; a fresh one is needed.
		assert!(link.handshake().offered().is_none());
		assert!(link.correlate(ProvisioningUri::parse(OFFERED).unwrap()).is_err());

		link.offer_uri().await.unwrap();
		assert_eq!(link.correlate(ProvisioningUri::parse(OFFERED).unwrap()).unwrap(), LinkStatus::UriMatched);
		assert_eq!(link.finalize("Desktop").await.unwrap(), LinkStatus::Linked);
	}

	#[tokio::test]
	async fn correlation_attempts_are_bounded() {
		let script: Vec<_> = (0..4).map(|_| ScriptedRunner::success(&offer_output())).collect();
		let mut link = orchestrator(ScriptedRunner::new(script));

		for _ in 0..3 {
			link.offer_uri().await.unwrap();
			let err = link.correlate(ProvisioningUri::parse(FOREIGN).unwrap()).unwrap_err();
			assert!(matches!(err, SiglinkError::LinkCorrelation { .. }));
		}
		link.offer_uri().await.unwrap();
		let err = link.correlate(ProvisioningUri::parse(FOREIGN).unwrap()).unwrap_err();
		assert!(matches!(err, SiglinkError::AttemptsExhausted { max_attempts: 3, .. }));
		assert_eq!(link.status(), LinkStatus::Failed);
	}

	#[tokio::test]
	async fn offer_without_uri_in_output_fails() {
		let runner = ScriptedRunner::new([ScriptedRunner::success("nothing useful\n")]);
		let mut link = orchestrator(runner);
		let err = link.offer_uri().await.unwrap_err();
		assert!(matches!(err, SiglinkError::StageFailed { stage: "link offer", .. }));
		assert_eq!(link.status(), LinkStatus::Failed);
	}

	#[tokio::test]
	async fn finalize_failure_is_terminal() {
		let runner = ScriptedRunner::new([
			ScriptedRunner::success(&offer_output()),
			ScriptedRunner::failure("invalid format\n"),
		]);
		let mut link = orchestrator(runner);
		link.offer_uri().await.unwrap();
		link.correlate(ProvisioningUri::parse(OFFERED).unwrap()).unwrap();
		let err = link.finalize("Desktop").await.unwrap_err();
		assert!(matches!(err, SiglinkError::StageFailed { stage: "device linking", .. }));
		assert_eq!(link.status(), LinkStatus::Failed);
		assert!(matches!(link.finalize("Desktop").await.unwrap_err(), SiglinkError::InvalidTransition { .. }));
	}

	#[tokio::test]
	async fn finalize_before_correlation_is_rejected() {
		let runner = ScriptedRunner::new([ScriptedRunner::success(&offer_output())]);
		let mut link = orchestrator(runner);
		link.offer_uri().await.unwrap();
		assert!(matches!(link.finalize("Desktop").await.unwrap_err(), SiglinkError::InvalidTransition { .. }));
	}
}
