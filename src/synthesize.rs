//! Turn identity records into directory entries.
use std::collections::{btree_map, BTreeMap};

use tracing::trace;

use crate::{
	entry::DirectoryEntry,
	error::Error,
	layout::{Layout, GROUP_ID_ATTR, USERS_OU, USER_ID_ATTR},
	source::{GroupRecord, UserRecord},
};

/// Map key for an identity name. Crowd names are case-insensitive.
#[must_use]
pub fn name_key(name: &str) -> String {
	name.to_lowercase()
}

/// Build the entry for a group.
pub fn group_entry(layout: &Layout, group: &GroupRecord) -> Result<DirectoryEntry, Error> {
	check_name("group", &group.name)?;
	let mut entry = DirectoryEntry::new(layout.group_dn(&group.name));
	entry.put("objectClass", ["top", "groupOfNames"]);
	entry.put(GROUP_ID_ATTR, [group.name.as_str()]);
	put_optional(&mut entry, "description", group.description.as_deref())?;
	Ok(entry)
}

/// Build the entry for a user.
pub fn user_entry(layout: &Layout, user: &UserRecord) -> Result<DirectoryEntry, Error> {
	check_name("user", &user.name)?;
	let mut entry = DirectoryEntry::new(layout.user_dn(&user.name));
	entry.put("objectClass", ["top", "person", "organizationalPerson", "inetOrgPerson"]);
	put_optional(&mut entry, "cn", user.display_name.as_deref())?;
	entry.put(USER_ID_ATTR, [user.name.as_str()]);
	if let Some(email) = user.email.as_deref().filter(|email| !email.is_empty()) {
		check_email(&user.name, email)?;
	}
	put_optional(&mut entry, "mail", user.email.as_deref())?;
	put_optional(&mut entry, "givenName", user.first_name.as_deref())?;
	put_optional(&mut entry, "sn", user.last_name.as_deref())?;
	entry.put("ou", [USERS_OU]);
	Ok(entry)
}

/// Build entries for all groups, keyed by [`name_key`].
pub fn group_entries(
	layout: &Layout,
	groups: &[GroupRecord],
) -> Result<BTreeMap<String, DirectoryEntry>, Error> {
	collect_unique("group", groups.iter().map(|group| (&group.name, group_entry(layout, group))))
}

/// Build entries for all users, keyed by [`name_key`].
pub fn user_entries(
	layout: &Layout,
	users: &[UserRecord],
) -> Result<BTreeMap<String, DirectoryEntry>, Error> {
	collect_unique("user", users.iter().map(|user| (&user.name, user_entry(layout, user))))
}

/// Collect entries into a map, failing on the first error or on two names
/// that would share a DN.
fn collect_unique<'a>(
	kind: &str,
	entries: impl Iterator<Item = (&'a String, Result<DirectoryEntry, Error>)>,
) -> Result<BTreeMap<String, DirectoryEntry>, Error> {
	let mut map = BTreeMap::new();
	for (name, entry) in entries {
		let entry = entry?;
		match map.entry(name_key(name)) {
			btree_map::Entry::Occupied(_) => {
				return Err(Error::Synthesis(format!("duplicate {kind} name '{name}'")));
			}
			btree_map::Entry::Vacant(slot) => {
				trace!("Synthesized {}", entry.dn());
				slot.insert(entry);
			}
		}
	}
	Ok(map)
}

/// Names become RDN values and must be non-empty, printable text.
fn check_name(kind: &str, name: &str) -> Result<(), Error> {
	if name.trim().is_empty() {
		return Err(Error::Synthesis(format!("{kind} with empty name")));
	}
	check_value(kind, name)
}

/// Reject control characters, which no directory string syntax allows.
fn check_value(attr: &str, value: &str) -> Result<(), Error> {
	if value.chars().any(char::is_control) {
		return Err(Error::Synthesis(format!("control character in {attr} value {value:?}")));
	}
	Ok(())
}

/// A mail address needs exactly one `@` with something on both sides.
fn check_email(user: &str, email: &str) -> Result<(), Error> {
	match email.split_once('@') {
		Some((local, domain)) if !local.is_empty() && !domain.is_empty() && !domain.contains('@') => {
			Ok(())
		}
		_ => Err(Error::Synthesis(format!("invalid mail address {email:?} for user '{user}'"))),
	}
}

/// Set a single-valued attribute when the value is present and non-empty.
fn put_optional(entry: &mut DirectoryEntry, attr: &str, value: Option<&str>) -> Result<(), Error> {
	if let Some(value) = value.filter(|value| !value.is_empty()) {
		check_value(attr, value)?;
		entry.put(attr, [value]);
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	#![allow(clippy::unwrap_used)]

	use super::{group_entries, group_entry, user_entries, user_entry};
	use crate::{
		error::Error,
		layout::Layout,
		source::{GroupRecord, UserRecord},
	};

	fn layout() -> Layout {
		Layout::new("dc=crowd".parse().unwrap()).unwrap()
	}

	fn alice() -> UserRecord {
		UserRecord {
			name: "alice".to_owned(),
			display_name: Some("Alice Liddell".to_owned()),
			email: Some("alice@example.com".to_owned()),
			first_name: Some("Alice".to_owned()),
			last_name: Some("Liddell".to_owned()),
			active: true,
		}
	}

	#[test]
	fn user_attributes() -> Result<(), Error> {
		let entry = user_entry(&layout(), &alice())?;
		assert_eq!(entry.dn().to_string(), "uid=alice,ou=users,dc=crowd");
		assert_eq!(entry.first("cn"), Some("Alice Liddell"));
		assert_eq!(entry.first("uid"), Some("alice"));
		assert_eq!(entry.first("mail"), Some("alice@example.com"));
		assert_eq!(entry.first("givenname"), Some("Alice"));
		assert_eq!(entry.first("sn"), Some("Liddell"));
		assert_eq!(entry.first("ou"), Some("users"));
		assert!(entry.has_value_ignore_case("objectClass", "inetOrgPerson"));
		Ok(())
	}

	#[test]
	fn missing_optionals_are_omitted() -> Result<(), Error> {
		let user = UserRecord { display_name: None, email: Some(String::new()), ..alice() };
		let entry = user_entry(&layout(), &user)?;
		assert!(!entry.has("cn"));
		assert!(!entry.has("mail"));
		Ok(())
	}

	#[test]
	fn group_attributes() -> Result<(), Error> {
		let group = GroupRecord {
			name: "eng".to_owned(),
			description: Some("Engineering".to_owned()),
			active: false,
		};
		let entry = group_entry(&layout(), &group)?;
		assert_eq!(entry.dn().to_string(), "cn=eng,ou=groups,dc=crowd");
		assert_eq!(entry.first("cn"), Some("eng"));
		assert_eq!(entry.first("description"), Some("Engineering"));
		assert!(entry.has_value_ignore_case("objectClass", "groupOfNames"));
		Ok(())
	}

	#[test]
	fn malformed_values_fail() {
		let bad_mail = UserRecord { email: Some("not-an-address".to_owned()), ..alice() };
		assert!(matches!(user_entry(&layout(), &bad_mail), Err(Error::Synthesis(_))));

		let control = UserRecord { last_name: Some("Lid\u{0}dell".to_owned()), ..alice() };
		assert!(matches!(user_entry(&layout(), &control), Err(Error::Synthesis(_))));

		let empty = UserRecord { name: " ".to_owned(), ..alice() };
		assert!(matches!(user_entry(&layout(), &empty), Err(Error::Synthesis(_))));
	}

	#[test]
	fn one_bad_record_fails_the_batch() {
		let users = vec![alice(), UserRecord { name: String::new(), ..alice() }];
		assert!(matches!(user_entries(&layout(), &users), Err(Error::Synthesis(_))));
	}

	#[test]
	fn duplicate_names_fail() {
		let group = |name: &str| GroupRecord { name: name.to_owned(), description: None, active: true };
		let groups = vec![group("Eng"), group("eng")];
		assert!(matches!(group_entries(&layout(), &groups), Err(Error::Synthesis(_))));
	}
}
