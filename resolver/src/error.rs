use std::path::PathBuf;

/// Errors surfaced at the configuration boundary.
///
/// Wire-level anomalies (malformed responses, rcodes, timeouts) never reach this type — they are
/// absorbed by the lookup state machine and surfaced to handlers as `onFailure`/`onTimeout`.
#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("failed to read {path}: {source}")]
	Io { path: PathBuf, source: std::io::Error },

	#[error("no nameservers configured")]
	NoNameservers,
}

pub type Result<T> = std::result::Result<T, Error>;
