use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::error;

/// Install a Ctrl+C handler and return the flag it sets.
///
/// Intended to be polled from the `should_stop` closure passed to
/// [`crate::reactor::PollEventLoop::run`]:
///
/// ```no_run
/// let flag = runtime::shutdown::ctrlc_flag();
/// let reactor = runtime::reactor::PollEventLoop::new();
/// reactor.run(|| flag.load(std::sync::atomic::Ordering::Relaxed)).unwrap();
/// ```
pub fn ctrlc_flag() -> Arc<AtomicBool> {
	let flag = Arc::new(AtomicBool::new(false));
	let target = flag.clone();

	if let Err(err) = ctrlc::set_handler(move || target.store(true, Ordering::Relaxed)) {
		error!("Failed to install Ctrl+C handler: {err}");
	}

	flag
}
