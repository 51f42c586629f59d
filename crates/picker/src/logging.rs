//! Tracing setup for hosts embedding the picker.

use tracing_subscriber::EnvFilter;

/// Environment variable holding an `EnvFilter` directive, e.g. `ontopick=trace`.
pub const LOG_ENV: &str = "ONTOPICK_LOG";

/// Installs a formatting subscriber on stderr.
///
/// The filter comes from [`LOG_ENV`] when set; otherwise picker crates log at
/// `debug` (or `trace` when `verbose`) and everything else at `info`.
/// Returns false if a global subscriber was already installed.
pub fn init(verbose: bool) -> bool {
	let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)));
	tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_target(true)
		.with_writer(std::io::stderr)
		.try_init()
		.is_ok()
}

fn default_directive(verbose: bool) -> &'static str {
	if verbose {
		"ontopick=trace,ontopick_worker=trace,ontopick_search=trace,ontopick_tree=trace,info"
	} else {
		"ontopick=debug,ontopick_worker=debug,ontopick_search=debug,ontopick_tree=debug,info"
	}
}
