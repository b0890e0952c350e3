use std::time::{Instant, SystemTime};

/// The UNIX time, in seconds, corresponding to a monotonic [`Instant`], measured relative to a
/// recorded `(start_instant, start_system)` pair.
///
/// Deriving wall-clock time this way (rather than calling `SystemTime::now()` directly at each
/// use site) keeps it consistent with the `Instant`-based deadlines the scheduler and lookups
/// already compare against, even if the system clock steps mid-run.
pub fn unix_at(start_instant: Instant, start_system: SystemTime, at: Instant) -> u32 {
	let system = start_system + at.saturating_duration_since(start_instant);

	let unix = system.duration_since(SystemTime::UNIX_EPOCH).unwrap_or_default();

	unix.as_secs().try_into().unwrap_or(u32::MAX)
}

/// Convenience: the current UNIX time in seconds.
pub fn unix_now() -> u32 {
	let now = Instant::now();
	unix_at(now, SystemTime::now(), now)
}
