//! Config for the directory and its Crowd connection.
use std::{
	path::{Path, PathBuf},
	time::Duration,
};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::{dn::Dn, error::Error, layout::Layout};

/// Prefix of environment variables overriding file configuration, e.g.
/// `CROWD_LDAP__DIRECTORY__SUFFIX`.
pub const ENV_PREFIX: &str = "CROWD_LDAP";

/// Top-level configuration.
#[derive(Deserialize, Clone, Debug)]
pub struct Config {
	/// How the directory is laid out and refreshed
	#[serde(default)]
	pub directory: DirectoryConfig,
	/// How to reach Crowd
	pub crowd: CrowdConfig,
}

/// Directory layout and synchronization settings
#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(default)]
pub struct DirectoryConfig {
	/// Root DN of the partition. Its leading component must be a `dc`.
	pub suffix: String,
	/// Publish group nesting the way Active Directory does: parent groups
	/// list child groups in `member`, child groups carry `memberOf`.
	pub member_of_emulate_active_directory: bool,
	/// Expand child groups transitively so users become members of every
	/// ancestor group.
	pub member_of_include_nested: bool,
	/// How many levels of child groups to follow when expanding. Must be
	/// positive while `member_of_include_nested` is set.
	pub max_nesting_depth: usize,
	/// Seconds between synchronization passes. The first pass runs one
	/// interval after startup.
	pub sync_interval: u64,
	/// Run a pass immediately at startup instead of waiting one interval.
	pub sync_on_startup: bool,
}

impl Default for DirectoryConfig {
	fn default() -> Self {
		Self {
			suffix: "dc=crowd".to_owned(),
			member_of_emulate_active_directory: false,
			member_of_include_nested: false,
			max_nesting_depth: 10,
			sync_interval: 60 * 60,
			sync_on_startup: false,
		}
	}
}

impl DirectoryConfig {
	/// The synchronization period.
	#[must_use]
	pub fn sync_period(&self) -> Duration {
		Duration::from_secs(self.sync_interval)
	}

	/// Parse the suffix and derive the container layout from it.
	pub fn layout(&self) -> Result<Layout, Error> {
		Layout::new(self.suffix.parse::<Dn>()?)
	}
}

/// Connection settings for the Crowd REST API
#[derive(Deserialize, Clone, Debug)]
pub struct CrowdConfig {
	/// Base URL of the Crowd server, e.g. `https://crowd.example.com/crowd`
	pub url: Url,
	/// Name this application is registered under in Crowd
	pub application_name: String,
	/// Password of the application
	pub application_password: secrecy::SecretString,
	/// Request timeout in seconds. Must be positive.
	#[serde(default = "default_timeout")]
	pub timeout: u64,
	/// Results requested per page when enumerating users and groups
	#[serde(default = "default_page_size")]
	pub page_size: usize,
	/// PEM bundle of additional trusted root certificates
	#[serde(default)]
	pub root_certificates_path: Option<PathBuf>,
}

/// Default request timeout.
fn default_timeout() -> u64 {
	30
}

/// Default page size.
fn default_page_size() -> usize {
	1000
}

impl Config {
	/// Load configuration from an optional file, overridden by `CROWD_LDAP__*`
	/// environment variables (`__` separates nested keys), and validate it.
	pub fn load(path: Option<&Path>) -> Result<Self, Error> {
		let mut builder = config::Config::builder();
		if let Some(path) = path {
			builder = builder.add_source(config::File::from(path).required(true));
		}
		let settings = builder
			.add_source(
				config::Environment::with_prefix(ENV_PREFIX)
					.prefix_separator("__")
					.separator("__")
					.try_parsing(true),
			)
			.build()?;

		let config: Config = settings.try_deserialize()?;
		config.validate()?;
		Ok(config)
	}

	/// Check the values serde cannot check on its own.
	pub fn validate(&self) -> Result<(), Error> {
		self.directory.layout()?;
		if self.directory.sync_interval == 0 {
			return Err(Error::Config("sync_interval must be at least one second".to_owned()));
		}
		if self.directory.member_of_include_nested && self.directory.max_nesting_depth == 0 {
			return Err(Error::Config(
				"max_nesting_depth must be positive when member_of_include_nested is set".to_owned(),
			));
		}
		if self.crowd.timeout == 0 {
			return Err(Error::Config("timeout must be at least one second".to_owned()));
		}
		if self.crowd.page_size == 0 {
			return Err(Error::Config("page_size must be positive".to_owned()));
		}
		if self.crowd.application_name.is_empty() {
			return Err(Error::Config("application_name must not be empty".to_owned()));
		}
		Ok(())
	}
}
