//! Serve Atlassian Crowd users and groups as a read-only LDAP directory tree.
//!
//! The library periodically pulls every user, group and membership from
//! Crowd, turns them into directory entries below a configured suffix and
//! publishes the result as one immutable [`Snapshot`](cache::Snapshot). A
//! directory server embeds the crate through two narrow traits:
//! [`Partition`] answers lookups and scoped searches against the current
//! snapshot, [`Authenticator`] checks simple binds against Crowd.
//!
//! ```text
//! dc=crowd
//! ├── ou=groups
//! │   └── cn=<group>      member: uid=<user>,ou=users,dc=crowd
//! └── ou=users
//!     └── uid=<user>      memberOf: cn=<group>,ou=groups,dc=crowd
//! ```
//!
//! For a general primer on LDAP, the [introduction] in the `ldap3` crate is
//! an excellent resource.
//!
//! [introduction]: https://github.com/inejge/ldap3/blob/master/LDAP-primer.md
//!
//! # Getting started
//! ```no_run
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! use std::sync::Arc;
//!
//! use crowd_ldap::{
//!     ldap3::Scope, Authenticator, Config, CrowdAuthenticator, CrowdClient, CrowdPartition,
//!     FilterNode, Partition, SnapshotCache, Synchronizer,
//! };
//!
//! let config = Config::load(Some("config.toml".as_ref()))?;
//! let source = Arc::new(CrowdClient::new(&config.crowd).await?);
//! let cache = Arc::new(SnapshotCache::new());
//!
//! let synchronizer =
//!     Arc::new(Synchronizer::new(&config.directory, Arc::clone(&source), Arc::clone(&cache))?);
//! synchronizer.sync_once().await?;
//! let (shutdown, shutdown_rx) = tokio::sync::watch::channel(false);
//! let task = Arc::clone(&synchronizer).spawn(shutdown_rx);
//!
//! let layout = config.directory.layout()?;
//! let mut partition = CrowdPartition::new("crowd", layout.clone(), cache);
//! partition.init()?;
//! let filter: FilterNode = "(&(objectClass=inetOrgPerson)(mail=*))".parse()?;
//! for entry in partition.search(layout.users(), Scope::OneLevel, Some(&filter))? {
//!     println!("{}", entry.dn());
//! }
//!
//! let authenticator = CrowdAuthenticator::new(layout.clone(), source);
//! let principal = authenticator.authenticate(&layout.user_dn("alice"), b"secret").await?;
//! println!("Bound as {}", principal.dn);
//!
//! shutdown.send(true)?;
//! task.await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Limitations
//! * Every pass fetches everything; there is no incremental synchronization.
//! * The tree is read-only and only simple binds are supported.
//! * Substring, approximate and extensible filters are not evaluated.

pub mod auth;
pub mod cache;
pub mod config;
pub mod dn;
pub mod entry;
pub mod error;
pub mod filter;
pub mod layout;
pub mod membership;
pub mod partition;
pub mod source;
pub mod sync;
pub mod synthesize;

pub use ldap3::{self, SearchEntry};

pub use crate::{
	auth::{AuthenticationLevel, Authenticator, CrowdAuthenticator, LdapPrincipal},
	cache::{Snapshot, SnapshotCache},
	config::{Config, CrowdConfig, DirectoryConfig},
	dn::{Dn, Rdn},
	entry::{Attribute, DirectoryEntry},
	error::Error,
	filter::FilterNode,
	layout::Layout,
	membership::MembershipOptions,
	partition::{CrowdPartition, Partition},
	source::{crowd::CrowdClient, GroupRecord, IdentitySource, MembershipEdge, SourceError, UserRecord},
	sync::{SyncOutcome, SyncStats, Synchronizer},
};
