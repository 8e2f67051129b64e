//! Subprocess seam between the orchestrators and the provisioned binary.

use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use siglink_runtime::{Artifact, ProcessInvocation, ProcessResult, invoke};

/// Runs the provisioned CLI with an argument list and captures its output.
/// Orchestrators are generic over this so tests drive them with a scripted
/// fake instead of a real subprocess.
pub trait CliRunner {
	fn run(&self, args: &[String]) -> impl Future<Output = siglink_runtime::Result<ProcessResult>> + Send;
}

/// The real runner: invokes the provisioned signal-cli entry point.
#[derive(Debug, Clone)]
pub struct SignalCli {
	entry_point: PathBuf,
	timeout: Duration,
}

impl SignalCli {
	pub fn new(artifact: &Artifact, timeout: Duration) -> Self {
		Self {
			entry_point: artifact.entry_point.clone(),
			timeout,
		}
	}
}

impl CliRunner for SignalCli {
	async fn run(&self, args: &[String]) -> siglink_runtime::Result<ProcessResult> {
		invoke::run(ProcessInvocation::new(&self.entry_point, args.iter().cloned()).with_timeout(self.timeout)).await
	}
}
