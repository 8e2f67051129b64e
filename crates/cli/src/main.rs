use clap::Parser;
use colored::Colorize;
use siglink_cli::{cli::Cli, flow, logging};
use tracing::error;

#[tokio::main]
async fn main() {
	let cli = Cli::parse();
	logging::init_logging(cli.verbose);

	if let Err(err) = flow::run(cli).await {
		error!(target = "siglink.cli", error = %err, "session failed");
		eprintln!("{}", format!("{err:#}").red());
		std::process::exit(1);
	}
}
