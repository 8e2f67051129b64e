//! The single-session flow: provision, register, link.

use std::time::Duration;

use anyhow::Context;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use siglink::classify::Classifier;
use siglink::link::{DeviceLinkOrchestrator, LinkConfig};
use siglink::register::{RegistrationConfig, RegistrationOrchestrator, RegistrationStatus};
use siglink::uri::ProvisioningUri;
use siglink::{SiglinkError, SignalCli, qr};
use siglink_runtime::{Artifact, ArtifactProvisioner, ProvisionerConfig};
use tracing::debug;

use crate::cli::Cli;
use crate::prompts;

pub async fn run(cli: Cli) -> anyhow::Result<()> {
	let artifact = provision(&cli).await.context("provisioning signal-cli")?;
	println!("{}", format!("Using signal-cli {} ({})", artifact.version, artifact.entry_point.display()).cyan());

	let runner = SignalCli::new(&artifact, Duration::from_secs(cli.timeout_secs));
	let classifier = Classifier::signal_cli_defaults();

	let number = prompts::phone_number()?;
	let verified = register(&cli, runner.clone(), classifier.clone(), number).await?;

	let mut linking = DeviceLinkOrchestrator::new(runner, classifier, verified, LinkConfig {
		max_correlation_attempts: cli.max_attempts,
	});

	println!("{}", "Open the desktop client so it displays its pairing QR code.".yellow());
	loop {
		let offered = linking.offer_uri().await?;
		println!("Linking URI offered for this session:\n  {}", offered.as_str().bold());
		println!("{}", "Scan it with the desktop client, then screenshot the QR code the client shows.".yellow());

		let decoded = decoded_screenshot_uri(cli.max_attempts)?;
		match linking.correlate(decoded) {
			Ok(_) => break,
			Err(err @ SiglinkError::LinkCorrelation { .. }) => {
				println!("{}", format!("{err}").red());
				continue;
			}
			Err(err) => return Err(err.into()),
		}
	}

	let device_name = prompts::device_name()?;
	linking.finalize(&device_name).await?;

	println!("{}", format!("Device {device_name:?} linked. The desktop client is ready to use.").green());
	Ok(())
}

async fn provision(cli: &Cli) -> anyhow::Result<Artifact> {
	let mut config = match &cli.cache_dir {
		Some(dir) => ProvisionerConfig::new(dir),
		None => ProvisionerConfig::with_default_cache_root()?,
	};
	config.repo_slug = cli.release_repo.clone();
	debug!(target = "siglink.cli", cache_root = %config.cache_root.display(), "provisioning");

	let provisioner = ArtifactProvisioner::new(config)?;
	let bar = download_bar();
	let artifact = provisioner
		.ensure(cli.cli_version.as_deref(), |downloaded, total| {
			if total > 0 && bar.length() != Some(total) {
				bar.set_length(total);
			}
			bar.set_position(downloaded);
		})
		.await?;
	bar.finish_and_clear();
	Ok(artifact)
}

fn download_bar() -> ProgressBar {
	let bar = ProgressBar::hidden();
	bar.set_style(
		ProgressStyle::with_template("{msg} {bar:40} {bytes}/{total_bytes}").unwrap_or_else(|_| ProgressStyle::default_bar()),
	);
	bar.set_message("downloading");
	bar.set_draw_target(indicatif::ProgressDrawTarget::stderr());
	bar
}

async fn register(
	cli: &Cli,
	runner: SignalCli,
	classifier: Classifier,
	number: String,
) -> anyhow::Result<siglink::register::VerifiedNumber> {
	let mut registration = RegistrationOrchestrator::new(runner, classifier, number, RegistrationConfig {
		max_code_attempts: cli.max_attempts,
		voice: cli.voice,
	});

	let mut status = registration.request_code().await?;

	if status == RegistrationStatus::CaptchaRequired {
		println!("{}", "A CAPTCHA is required before the code can be sent.".yellow());
		println!("Solve it at: {}", prompts::CAPTCHA_URL.bold());
		while status == RegistrationStatus::CaptchaRequired {
			let token = prompts::captcha_token()?;
			status = registration.submit_captcha(&token).await?;
			if status == RegistrationStatus::CaptchaRequired {
				println!("{}", "Token rejected; solve a fresh challenge and paste the new token.".red());
			}
		}
	}

	println!("{}", "Verification code dispatched.".green());
	while status == RegistrationStatus::CodeRequired {
		let code = prompts::verification_code()?;
		status = registration.submit_code(&code).await?;
		if status == RegistrationStatus::CodeRequired {
			println!("{}", "Code rejected; check it and try again.".red());
		}
	}

	println!("{}", format!("Number {} verified.", registration.session().number()).green());
	registration
		.verified_number()
		.context("registration ended without reaching the verified state")
}

/// Prompts for screenshots until one decodes to a provisioning URI, bounded
/// by `max_attempts`.
fn decoded_screenshot_uri(max_attempts: u32) -> anyhow::Result<ProvisioningUri> {
	for attempt in 1..=max_attempts {
		let path = prompts::screenshot_path()?;
		match qr::decode(&path).and_then(|payload| ProvisioningUri::parse(&payload)) {
			Ok(uri) => return Ok(uri),
			Err(err) => {
				println!("{}", format!("{err} (attempt {attempt} of {max_attempts})").red());
			}
		}
	}
	anyhow::bail!("no usable screenshot after {max_attempts} attempts")
}
