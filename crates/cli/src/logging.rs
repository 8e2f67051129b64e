//! Tracing setup for the interactive session.

use tracing_subscriber::EnvFilter;

/// Initializes the subscriber on stderr so log lines never interleave with
/// prompts. `RUST_LOG` overrides the verbosity flag when set.
pub fn init_logging(verbose: u8) {
	let default_level = match verbose {
		0 => "warn",
		1 => "info",
		_ => "debug",
	};
	let filter = EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| EnvFilter::new(format!("siglink={default_level},siglink_runtime={default_level}")));

	tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_writer(std::io::stderr)
		.compact()
		.init();
}
