//! Error codes

use crate::source::SourceError;

/// Errors that can occur when using this library
#[derive(thiserror::Error, Debug)]
pub enum Error {
	/// The identity source could not be reached or answered with an error.
	#[error("Identity source failure: {0}")]
	Remote(#[from] SourceError),
	/// The identity source rejected the supplied credentials. Carries the
	/// attempted identifier, never the credential.
	#[error("Authentication failed for {0}")]
	AuthenticationFailure(String),
	/// Identity data could not be turned into a directory entry.
	#[error("Malformed identity data: {0}")]
	Synthesis(String),
	/// The directory is read-only.
	#[error("Operation not supported: {0}")]
	UnsupportedOperation(&'static str),
	/// No snapshot has been published yet.
	#[error("Directory snapshot is not ready")]
	NotReady,
	/// The partition was queried before `init` or after `destroy`.
	#[error("Partition is not initialized")]
	NotInitialized,
	/// A distinguished name failed to parse or has the wrong shape.
	#[error("Invalid DN: {0}")]
	InvalidDn(String),
	/// A bind DN does not name an entry directly below the users container.
	#[error("Invalid bind DN: {0}")]
	InvalidBindDn(String),
	/// A textual search filter failed to parse.
	#[error("Invalid filter: {0}")]
	InvalidFilter(String),
	/// The configuration is inconsistent.
	#[error("Invalid configuration: {0}")]
	Config(String),
	/// Configuration sources could not be read or deserialized.
	#[error(transparent)]
	Settings(#[from] config::ConfigError),
	/// Reading a local file failed.
	#[error(transparent)]
	Io(#[from] std::io::Error),
}
