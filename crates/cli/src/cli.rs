use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "siglink")]
#[command(about = "Register a phone-verified messaging account and link it to a desktop client")]
#[command(version)]
pub struct Cli {
	/// Increase verbosity (-v info, -vv debug)
	#[arg(short, long, global = true, action = clap::ArgAction::Count)]
	pub verbose: u8,

	/// Install cache root (defaults to the platform cache directory)
	#[arg(long, value_name = "DIR")]
	pub cache_dir: Option<PathBuf>,

	/// Release repository slug on the hosting API
	#[arg(long, value_name = "OWNER/REPO", default_value = siglink_runtime::artifact::DEFAULT_RELEASE_REPO)]
	pub release_repo: String,

	/// Pin a CLI release tag instead of resolving the latest
	#[arg(long, value_name = "TAG")]
	pub cli_version: Option<String>,

	/// Request the verification code by voice call instead of SMS
	#[arg(long)]
	pub voice: bool,

	/// Wrong-code and correlation retries tolerated before giving up
	#[arg(long, default_value_t = 3)]
	pub max_attempts: u32,

	/// Deadline for each CLI subprocess call, in seconds
	#[arg(long, default_value_t = 120)]
	pub timeout_secs: u64,
}
