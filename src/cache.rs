//! The published directory snapshot.
//!
//! A [`Snapshot`] is built in one synchronization pass and never changes
//! afterwards. The [`SnapshotCache`] holds the current one behind a
//! [`tokio::sync::watch`] channel: publishing replaces the whole `Arc` at
//! once, and readers clone the `Arc` they find, so a reader always sees one
//! complete snapshot even while the next one is being published.
use std::{collections::HashMap, sync::Arc};

use time::OffsetDateTime;
use tokio::sync::watch;

use crate::{dn::Rdn, entry::DirectoryEntry, error::Error};

/// Group and user entries from one synchronization pass.
#[derive(Debug)]
pub struct Snapshot {
	/// Group entries in name order.
	groups: Vec<Arc<DirectoryEntry>>,
	/// User entries in name order.
	users: Vec<Arc<DirectoryEntry>>,
	/// Normalized leaf RDN to index in `groups`.
	group_index: HashMap<String, usize>,
	/// Normalized leaf RDN to index in `users`.
	user_index: HashMap<String, usize>,
	/// When the pass that built this snapshot finished.
	built_at: OffsetDateTime,
}

impl Snapshot {
	/// Freeze a set of entries.
	#[must_use]
	pub fn new(
		groups: Vec<DirectoryEntry>,
		users: Vec<DirectoryEntry>,
		built_at: OffsetDateTime,
	) -> Self {
		let (groups, group_index) = index(groups);
		let (users, user_index) = index(users);
		Self { groups, users, group_index, user_index, built_at }
	}

	/// All group entries.
	#[must_use]
	pub fn groups(&self) -> &[Arc<DirectoryEntry>] {
		&self.groups
	}

	/// All user entries.
	#[must_use]
	pub fn users(&self) -> &[Arc<DirectoryEntry>] {
		&self.users
	}

	/// The group whose leaf RDN equals `rdn`.
	#[must_use]
	pub fn find_group(&self, rdn: &Rdn) -> Option<Arc<DirectoryEntry>> {
		self.group_index.get(&rdn.normalized()).map(|&i| Arc::clone(&self.groups[i]))
	}

	/// The user whose leaf RDN equals `rdn`.
	#[must_use]
	pub fn find_user(&self, rdn: &Rdn) -> Option<Arc<DirectoryEntry>> {
		self.user_index.get(&rdn.normalized()).map(|&i| Arc::clone(&self.users[i]))
	}

	/// Build time.
	#[must_use]
	pub fn built_at(&self) -> OffsetDateTime {
		self.built_at
	}
}

/// Wrap entries in `Arc`s and index them by leaf RDN.
fn index(entries: Vec<DirectoryEntry>) -> (Vec<Arc<DirectoryEntry>>, HashMap<String, usize>) {
	let index = entries
		.iter()
		.enumerate()
		.filter_map(|(i, entry)| entry.dn().rdn().map(|rdn| (rdn.normalized(), i)))
		.collect();
	(entries.into_iter().map(Arc::new).collect(), index)
}

/// Holder of the currently published snapshot.
///
/// Starts out empty (queries get [`Error::NotReady`]) and becomes ready with
/// the first [`publish`](Self::publish).
#[derive(Debug)]
pub struct SnapshotCache {
	/// Sender half doubling as the storage of the current value.
	current: watch::Sender<Option<Arc<Snapshot>>>,
}

impl Default for SnapshotCache {
	fn default() -> Self {
		Self::new()
	}
}

impl SnapshotCache {
	/// An empty cache.
	#[must_use]
	pub fn new() -> Self {
		let (current, _) = watch::channel(None);
		Self { current }
	}

	/// The current snapshot.
	pub fn current(&self) -> Result<Arc<Snapshot>, Error> {
		self.current.borrow().clone().ok_or(Error::NotReady)
	}

	/// Whether a snapshot has been published.
	#[must_use]
	pub fn is_ready(&self) -> bool {
		self.current.borrow().is_some()
	}

	/// Replace the current snapshot, returning the previous one.
	pub fn publish(&self, snapshot: Snapshot) -> Option<Arc<Snapshot>> {
		self.current.send_replace(Some(Arc::new(snapshot)))
	}

	/// Watch for newly published snapshots.
	#[must_use]
	pub fn subscribe(&self) -> watch::Receiver<Option<Arc<Snapshot>>> {
		self.current.subscribe()
	}
}

#[cfg(test)]
mod tests {
	#![allow(clippy::unwrap_used)]

	use std::sync::Arc;

	use time::OffsetDateTime;

	use super::{Snapshot, SnapshotCache};
	use crate::{dn::Rdn, entry::DirectoryEntry, error::Error};

	fn user(name: &str) -> DirectoryEntry {
		DirectoryEntry::new(format!("uid={name},ou=users,dc=crowd").parse().unwrap())
	}

	#[test]
	fn not_ready_until_published() {
		let cache = SnapshotCache::new();
		assert!(!cache.is_ready());
		assert!(matches!(cache.current(), Err(Error::NotReady)));

		let previous = cache.publish(Snapshot::new(vec![], vec![user("alice")], OffsetDateTime::now_utc()));
		assert!(previous.is_none());
		assert!(cache.is_ready());
		assert_eq!(cache.current().unwrap().users().len(), 1);
	}

	#[test]
	fn publish_replaces_whole_snapshot() {
		let cache = SnapshotCache::new();
		cache.publish(Snapshot::new(vec![], vec![user("alice")], OffsetDateTime::now_utc()));
		let held = cache.current().unwrap();

		let previous = cache.publish(Snapshot::new(vec![], vec![user("bob")], OffsetDateTime::now_utc()));
		assert!(Arc::ptr_eq(&previous.unwrap(), &held));
		assert!(held.find_user(&Rdn::new("uid", "alice")).is_some(), "held snapshot is untouched");
		assert!(cache.current().unwrap().find_user(&Rdn::new("uid", "alice")).is_none());
	}

	#[test]
	fn find_by_rdn_ignores_case() {
		let snapshot = Snapshot::new(vec![], vec![user("Alice")], OffsetDateTime::now_utc());
		assert!(snapshot.find_user(&Rdn::new("UID", "alice")).is_some());
		assert!(snapshot.find_user(&Rdn::new("cn", "alice")).is_none());
		assert!(snapshot.find_group(&Rdn::new("uid", "alice")).is_none());
	}

	#[tokio::test]
	async fn subscribers_see_publication() {
		let cache = SnapshotCache::new();
		let mut receiver = cache.subscribe();
		cache.publish(Snapshot::new(vec![], vec![], OffsetDateTime::now_utc()));
		receiver.changed().await.unwrap();
		assert!(receiver.borrow().is_some());
	}
}
