//! Read-only directory partition over the published snapshot.
//!
//! The tree has three fixed entries (the domain root and the two containers)
//! which exist from [`Partition::init`] on, and the group and user entries of
//! the current [`Snapshot`](crate::cache::Snapshot), which only exist once
//! the first synchronization pass has published one.
use std::{collections::HashSet, sync::Arc};

use ldap3::{Mod, Scope};
use tracing::{debug, trace};

use crate::{
	cache::SnapshotCache,
	dn::{Dn, Rdn},
	entry::DirectoryEntry,
	error::Error,
	filter::{self, FilterNode},
	layout::{Branch, Layout},
};

/// The operations a directory server expects from a partition.
pub trait Partition {
	/// Identifier of the partition.
	fn id(&self) -> &str;

	/// Root DN of the partition.
	fn suffix(&self) -> &Dn;

	/// Prepare the partition for queries.
	fn init(&mut self) -> Result<(), Error>;

	/// Release everything built by [`init`](Self::init).
	fn destroy(&mut self) -> Result<(), Error>;

	/// Whether `dn` resolves to an entry.
	fn has_entry(&self, dn: &Dn) -> Result<bool, Error> {
		Ok(self.lookup(dn)?.is_some())
	}

	/// The entry at `dn`.
	fn lookup(&self, dn: &Dn) -> Result<Option<Arc<DirectoryEntry>>, Error>;

	/// Entries in `scope` below `base` matching `filter`.
	fn search(
		&self,
		base: &Dn,
		scope: Scope,
		filter: Option<&FilterNode>,
	) -> Result<Vec<Arc<DirectoryEntry>>, Error>;

	/// Listing is not supported and yields nothing.
	fn list(&self, dn: &Dn) -> Result<Vec<Arc<DirectoryEntry>>, Error> {
		trace!("list {dn}: not supported");
		Ok(Vec::new())
	}

	/// Nothing to do on bind.
	fn bind(&self, dn: &Dn) -> Result<(), Error> {
		trace!("bind {dn}");
		Ok(())
	}

	/// Nothing to do on unbind.
	fn unbind(&self, dn: &Dn) -> Result<(), Error> {
		trace!("unbind {dn}");
		Ok(())
	}

	/// Nothing to flush.
	fn sync(&self) -> Result<(), Error> {
		Ok(())
	}

	/// Refused; the partition is read-only.
	fn add(&self, entry: &DirectoryEntry) -> Result<(), Error> {
		debug!("Refusing add of {}", entry.dn());
		Err(Error::UnsupportedOperation("add"))
	}

	/// Refused; the partition is read-only.
	fn delete(&self, dn: &Dn) -> Result<(), Error> {
		debug!("Refusing delete of {dn}");
		Err(Error::UnsupportedOperation("delete"))
	}

	/// Refused; the partition is read-only.
	fn modify(&self, dn: &Dn, mods: &[Mod<String>]) -> Result<(), Error> {
		debug!("Refusing {} modifications of {dn}", mods.len());
		Err(Error::UnsupportedOperation("modify"))
	}

	/// Refused; the partition is read-only.
	fn move_entry(&self, dn: &Dn, new_parent: &Dn) -> Result<(), Error> {
		debug!("Refusing move of {dn} to {new_parent}");
		Err(Error::UnsupportedOperation("move"))
	}

	/// Refused; the partition is read-only.
	fn rename(&self, dn: &Dn, new_rdn: &Rdn, delete_old_rdn: bool) -> Result<(), Error> {
		debug!("Refusing rename of {dn} to {new_rdn} (delete old: {delete_old_rdn})");
		Err(Error::UnsupportedOperation("rename"))
	}

	/// Refused; the partition is read-only.
	fn move_and_rename(
		&self,
		dn: &Dn,
		new_parent: &Dn,
		new_rdn: &Rdn,
		delete_old_rdn: bool,
	) -> Result<(), Error> {
		debug!(
			"Refusing move of {dn} to {new_rdn},{new_parent} (delete old: {delete_old_rdn})"
		);
		Err(Error::UnsupportedOperation("move_and_rename"))
	}
}

/// The fixed entries built at init.
#[derive(Debug)]
struct FixedEntries {
	/// Domain root.
	root: Arc<DirectoryEntry>,
	/// Groups container.
	groups: Arc<DirectoryEntry>,
	/// Users container.
	users: Arc<DirectoryEntry>,
}

/// Partition serving Crowd users and groups.
#[derive(Debug)]
pub struct CrowdPartition {
	/// Partition identifier.
	id: String,
	/// Tree shape.
	layout: Layout,
	/// Source of group and user entries.
	cache: Arc<SnapshotCache>,
	/// Present between init and destroy.
	fixed: Option<FixedEntries>,
}

impl CrowdPartition {
	/// Create an uninitialized partition.
	#[must_use]
	pub fn new(id: impl Into<String>, layout: Layout, cache: Arc<SnapshotCache>) -> Self {
		Self { id: id.into(), layout, cache, fixed: None }
	}

	/// Fixed entries, if initialized.
	fn fixed(&self) -> Result<&FixedEntries, Error> {
		self.fixed.as_ref().ok_or(Error::NotInitialized)
	}

	/// All group entries of the current snapshot.
	fn all_groups(&self) -> Result<Vec<Arc<DirectoryEntry>>, Error> {
		Ok(self.cache.current()?.groups().to_vec())
	}

	/// All user entries of the current snapshot.
	fn all_users(&self) -> Result<Vec<Arc<DirectoryEntry>>, Error> {
		Ok(self.cache.current()?.users().to_vec())
	}

	/// Entries addressed by a search on one of the fixed branches.
	fn scoped(
		&self,
		fixed: &FixedEntries,
		branch: Branch,
		scope: Scope,
	) -> Result<Vec<Arc<DirectoryEntry>>, Error> {
		let entries = match (branch, scope) {
			(Branch::Root, Scope::Base) => vec![Arc::clone(&fixed.root)],
			(Branch::Root, Scope::OneLevel) => {
				vec![Arc::clone(&fixed.groups), Arc::clone(&fixed.users)]
			}
			(Branch::Root, Scope::Subtree) => {
				let snapshot = self.cache.current()?;
				let mut entries = Vec::with_capacity(3 + snapshot.groups().len() + snapshot.users().len());
				entries.push(Arc::clone(&fixed.root));
				entries.push(Arc::clone(&fixed.groups));
				entries.push(Arc::clone(&fixed.users));
				entries.extend(snapshot.groups().iter().cloned());
				entries.extend(snapshot.users().iter().cloned());
				dedup_by_dn(entries)
			}
			(Branch::Groups, Scope::Base) => vec![Arc::clone(&fixed.groups)],
			(Branch::Groups, Scope::OneLevel) => self.all_groups()?,
			(Branch::Groups, Scope::Subtree) => {
				let mut entries = vec![Arc::clone(&fixed.groups)];
				entries.extend(self.all_groups()?);
				entries
			}
			(Branch::Users, Scope::Base) => vec![Arc::clone(&fixed.users)],
			(Branch::Users, Scope::OneLevel) => self.all_users()?,
			(Branch::Users, Scope::Subtree) => {
				let mut entries = vec![Arc::clone(&fixed.users)];
				entries.extend(self.all_users()?);
				entries
			}
		};
		Ok(entries)
	}
}

/// Keep the first entry for every DN.
fn dedup_by_dn(entries: Vec<Arc<DirectoryEntry>>) -> Vec<Arc<DirectoryEntry>> {
	let mut seen = HashSet::with_capacity(entries.len());
	entries.into_iter().filter(|entry| seen.insert(entry.dn().to_string().to_lowercase())).collect()
}

impl Partition for CrowdPartition {
	fn id(&self) -> &str {
		&self.id
	}

	fn suffix(&self) -> &Dn {
		self.layout.suffix()
	}

	fn init(&mut self) -> Result<(), Error> {
		// Re-validate in case the layout was built from a hand-made suffix.
		let layout = Layout::new(self.layout.suffix().clone())?;
		self.fixed = Some(FixedEntries {
			root: Arc::new(layout.root_entry()),
			groups: Arc::new(layout.groups_entry()),
			users: Arc::new(layout.users_entry()),
		});
		debug!("Partition {} initialized at {}", self.id, layout.suffix());
		self.layout = layout;
		Ok(())
	}

	fn destroy(&mut self) -> Result<(), Error> {
		self.fixed = None;
		debug!("Partition {} destroyed", self.id);
		Ok(())
	}

	fn lookup(&self, dn: &Dn) -> Result<Option<Arc<DirectoryEntry>>, Error> {
		let fixed = self.fixed()?;
		trace!("lookup {dn}");
		let entry = match self.layout.branch(dn) {
			Some(Branch::Root) => Some(Arc::clone(&fixed.root)),
			Some(Branch::Groups) => Some(Arc::clone(&fixed.groups)),
			Some(Branch::Users) => Some(Arc::clone(&fixed.users)),
			None => match dn.rdn() {
				Some(rdn) if dn.is_child_of(self.layout.groups()) => {
					self.cache.current()?.find_group(rdn)
				}
				Some(rdn) if dn.is_child_of(self.layout.users()) => {
					self.cache.current()?.find_user(rdn)
				}
				_ => None,
			},
		};
		Ok(entry)
	}

	fn search(
		&self,
		base: &Dn,
		scope: Scope,
		filter: Option<&FilterNode>,
	) -> Result<Vec<Arc<DirectoryEntry>>, Error> {
		let fixed = self.fixed()?;
		let Some(branch) = self.layout.branch(base) else {
			trace!("search {base}: not a searchable base");
			return Ok(Vec::new());
		};
		let mut entries = self.scoped(fixed, branch, scope)?;
		filter::apply(filter, &mut entries);
		debug!("search {base} ({scope:?}) returned {} entries", entries.len());
		Ok(entries)
	}
}
