//! The fixed shape of the directory tree.
//!
//! ```text
//! dc=crowd                      domain root (the configured suffix)
//! ├── ou=groups                 groups container
//! │   └── cn=<group name>
//! └── ou=users                  users container
//!     └── uid=<user name>
//! ```
use crate::{
	dn::{Dn, Rdn},
	entry::DirectoryEntry,
	error::Error,
};

/// Naming attribute of group entries.
pub const GROUP_ID_ATTR: &str = "cn";
/// Naming attribute of user entries.
pub const USER_ID_ATTR: &str = "uid";
/// `ou` value of the groups container.
pub const GROUPS_OU: &str = "groups";
/// `ou` value of the users container.
pub const USERS_OU: &str = "users";

/// Which fixed branch of the tree a DN addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Branch {
	/// The domain root.
	Root,
	/// The groups container.
	Groups,
	/// The users container.
	Users,
}

/// The suffix and the two containers derived from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
	/// Domain root.
	suffix: Dn,
	/// `ou=groups,<suffix>`
	groups: Dn,
	/// `ou=users,<suffix>`
	users: Dn,
}

impl Layout {
	/// Derive the layout from a suffix, which must start with a `dc`
	/// component.
	pub fn new(suffix: Dn) -> Result<Self, Error> {
		match suffix.rdn() {
			Some(rdn) if rdn.is_type("dc") => {}
			_ => {
				return Err(Error::InvalidDn(format!(
					"partition suffix should be of type 'dc': {suffix}"
				)))
			}
		}
		let groups = suffix.child(Rdn::new("ou", GROUPS_OU));
		let users = suffix.child(Rdn::new("ou", USERS_OU));
		Ok(Self { suffix, groups, users })
	}

	/// The domain root DN.
	#[must_use]
	pub fn suffix(&self) -> &Dn {
		&self.suffix
	}

	/// The groups container DN.
	#[must_use]
	pub fn groups(&self) -> &Dn {
		&self.groups
	}

	/// The users container DN.
	#[must_use]
	pub fn users(&self) -> &Dn {
		&self.users
	}

	/// DN of the group called `name`.
	#[must_use]
	pub fn group_dn(&self, name: &str) -> Dn {
		self.groups.child(Rdn::new(GROUP_ID_ATTR, name))
	}

	/// DN of the user called `name`.
	#[must_use]
	pub fn user_dn(&self, name: &str) -> Dn {
		self.users.child(Rdn::new(USER_ID_ATTR, name))
	}

	/// The fixed branch `dn` names, if any.
	#[must_use]
	pub fn branch(&self, dn: &Dn) -> Option<Branch> {
		if *dn == self.suffix {
			Some(Branch::Root)
		} else if *dn == self.groups {
			Some(Branch::Groups)
		} else if *dn == self.users {
			Some(Branch::Users)
		} else {
			None
		}
	}

	/// The domain root entry.
	#[must_use]
	pub fn root_entry(&self) -> DirectoryEntry {
		let mut entry = DirectoryEntry::new(self.suffix.clone());
		entry.put("objectClass", ["top", "domain"]);
		if let Some(rdn) = self.suffix.rdn() {
			entry.put(rdn.attr(), [rdn.value()]);
		}
		entry.put("description", ["Crowd Domain"]);
		entry
	}

	/// The groups container entry.
	#[must_use]
	pub fn groups_entry(&self) -> DirectoryEntry {
		container_entry(&self.groups, GROUPS_OU, "Crowd Groups")
	}

	/// The users container entry.
	#[must_use]
	pub fn users_entry(&self) -> DirectoryEntry {
		container_entry(&self.users, USERS_OU, "Crowd Users")
	}
}

/// An `organizationalUnit` entry.
fn container_entry(dn: &Dn, ou: &str, description: &str) -> DirectoryEntry {
	let mut entry = DirectoryEntry::new(dn.clone());
	entry.put("objectClass", ["top", "organizationalUnit"]);
	entry.put("ou", [ou]);
	entry.put("description", [description]);
	entry
}

#[cfg(test)]
mod tests {
	use super::{Branch, Layout};
	use crate::error::Error;

	#[test]
	fn derives_containers() -> Result<(), Box<dyn std::error::Error>> {
		let layout = Layout::new("dc=example,dc=com".parse()?)?;
		assert_eq!(layout.groups().to_string(), "ou=groups,dc=example,dc=com");
		assert_eq!(layout.user_dn("alice").to_string(), "uid=alice,ou=users,dc=example,dc=com");
		assert_eq!(layout.group_dn("eng").to_string(), "cn=eng,ou=groups,dc=example,dc=com");
		Ok(())
	}

	#[test]
	fn suffix_must_be_dc() -> Result<(), Box<dyn std::error::Error>> {
		assert!(matches!(Layout::new("o=crowd".parse()?), Err(Error::InvalidDn(_))));
		assert!(matches!(Layout::new("".parse()?), Err(Error::InvalidDn(_))));
		Ok(())
	}

	#[test]
	fn branches() -> Result<(), Box<dyn std::error::Error>> {
		let layout = Layout::new("dc=crowd".parse()?)?;
		assert_eq!(layout.branch(&"DC=Crowd".parse()?), Some(Branch::Root));
		assert_eq!(layout.branch(&"ou=Groups,dc=crowd".parse()?), Some(Branch::Groups));
		assert_eq!(layout.branch(&"ou=users,dc=crowd".parse()?), Some(Branch::Users));
		assert_eq!(layout.branch(&"uid=alice,ou=users,dc=crowd".parse()?), None);
		Ok(())
	}

	#[test]
	fn fixed_entries() -> Result<(), Box<dyn std::error::Error>> {
		let layout = Layout::new("dc=crowd".parse()?)?;
		let root = layout.root_entry();
		assert_eq!(root.first("dc"), Some("crowd"));
		assert!(root.has_value_ignore_case("objectClass", "domain"));

		let users = layout.users_entry();
		assert_eq!(users.first("ou"), Some("users"));
		assert_eq!(users.first("description"), Some("Crowd Users"));
		Ok(())
	}
}
