//! Cross-link synthesized entries using the membership graph.
//!
//! Links are computed first as pairs of map keys and applied afterwards, so
//! every `member` value has its `memberOf` counterpart and vice versa.
//! Only active, synthesized identities take part; anything else named by an
//! edge is skipped.
//!
//! Nested groups are expanded breadth-first with a visited set, which makes
//! circular nesting harmless, and stop at a configurable depth.
use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};

use tracing::{debug, warn};

use crate::{
	config::DirectoryConfig,
	entry::DirectoryEntry,
	source::{GroupRecord, MembershipEdge, UserRecord},
	synthesize::name_key,
};

/// Forward link attribute, on groups.
pub const MEMBER_ATTR: &str = "member";
/// Reverse link attribute, on users (and groups under AD emulation).
pub const MEMBER_OF_ATTR: &str = "memberOf";

/// How memberships are published.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MembershipOptions {
	/// Make users members of every ancestor of their groups.
	pub include_nested: bool,
	/// Publish group-in-group links on the group entries themselves.
	pub emulate_active_directory: bool,
	/// Levels of child groups followed when expanding.
	pub max_nesting_depth: usize,
}

impl Default for MembershipOptions {
	fn default() -> Self {
		Self { include_nested: false, emulate_active_directory: false, max_nesting_depth: 10 }
	}
}

impl From<&DirectoryConfig> for MembershipOptions {
	fn from(config: &DirectoryConfig) -> Self {
		Self {
			include_nested: config.member_of_include_nested,
			emulate_active_directory: config.member_of_emulate_active_directory,
			max_nesting_depth: config.max_nesting_depth,
		}
	}
}

/// Counts of links written by [`resolve`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkStats {
	/// Group-to-user links.
	pub user_links: usize,
	/// Group-to-group links.
	pub group_links: usize,
	/// Edge members skipped because they were unknown or inactive.
	pub skipped: usize,
}

/// The records and entries of one pass, keyed by [`name_key`].
#[derive(Debug)]
pub struct Directory<'a> {
	/// Group records.
	pub groups: &'a BTreeMap<String, GroupRecord>,
	/// User records.
	pub users: &'a BTreeMap<String, UserRecord>,
	/// Group entries, receiving `member` (and `memberOf` under AD emulation).
	pub group_entries: &'a mut BTreeMap<String, DirectoryEntry>,
	/// User entries, receiving `memberOf`.
	pub user_entries: &'a mut BTreeMap<String, DirectoryEntry>,
}

impl Directory<'_> {
	/// Whether a group may be linked.
	fn linkable_group(&self, key: &str) -> bool {
		self.groups.get(key).is_some_and(|group| group.active) && self.group_entries.contains_key(key)
	}

	/// Whether a user may be linked.
	fn linkable_user(&self, key: &str) -> bool {
		self.users.get(key).is_some_and(|user| user.active) && self.user_entries.contains_key(key)
	}
}

/// Populate `member`/`memberOf` on the entries in `directory`.
pub fn resolve(
	edges: &[MembershipEdge],
	directory: &mut Directory<'_>,
	options: MembershipOptions,
) -> LinkStats {
	let mut stats = LinkStats::default();
	let mut direct_users: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
	let mut child_groups: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();

	for edge in edges {
		let group = name_key(&edge.group);
		if !directory.linkable_group(&group) {
			debug!("Skipping memberships of unknown or inactive group '{}'", edge.group);
			stats.skipped += edge.users.len() + edge.groups.len();
			continue;
		}
		for name in &edge.users {
			let user = name_key(name);
			if directory.linkable_user(&user) {
				direct_users.entry(group.clone()).or_default().insert(user);
			} else {
				debug!("Skipping unknown or inactive user '{name}' in group '{}'", edge.group);
				stats.skipped += 1;
			}
		}
		for name in &edge.groups {
			let child = name_key(name);
			if child != group && directory.linkable_group(&child) {
				child_groups.entry(group.clone()).or_default().insert(child);
			} else {
				debug!("Skipping child group '{name}' of group '{}'", edge.group);
				stats.skipped += 1;
			}
		}
	}

	let user_links = if options.include_nested {
		expand_nested(&direct_users, &child_groups, options.max_nesting_depth)
	} else {
		direct_users
	};

	for (group, users) in &user_links {
		for user in users {
			if link(directory.group_entries, group, directory.user_entries, user) {
				stats.user_links += 1;
			}
		}
	}

	if options.emulate_active_directory {
		for (parent, children) in &child_groups {
			for child in children {
				if link_groups(directory.group_entries, parent, child) {
					stats.group_links += 1;
				}
			}
		}
	}

	stats
}

/// For every group, the users of the group itself and of all descendant
/// groups reachable within `max_depth` levels.
fn expand_nested(
	direct_users: &BTreeMap<String, BTreeSet<String>>,
	child_groups: &BTreeMap<String, BTreeSet<String>>,
	max_depth: usize,
) -> BTreeMap<String, BTreeSet<String>> {
	let roots: BTreeSet<&String> = direct_users.keys().chain(child_groups.keys()).collect();
	let mut effective = BTreeMap::new();

	for root in roots {
		let mut users = BTreeSet::new();
		let mut visited = HashSet::from([root.as_str()]);
		let mut queue = VecDeque::from([(root.as_str(), 0_usize)]);
		let mut truncated = false;

		while let Some((group, depth)) = queue.pop_front() {
			if let Some(members) = direct_users.get(group) {
				users.extend(members.iter().cloned());
			}
			let Some(children) = child_groups.get(group) else { continue };
			if depth >= max_depth {
				truncated = true;
				continue;
			}
			for child in children {
				if visited.insert(child.as_str()) {
					queue.push_back((child.as_str(), depth + 1));
				} else {
					debug!("Group '{child}' already visited while expanding '{root}'");
				}
			}
		}

		if truncated {
			warn!("Nesting below group '{root}' exceeds {max_depth} levels, deeper groups ignored");
		}
		if !users.is_empty() {
			effective.insert(root.clone(), users);
		}
	}
	effective
}

/// Link a group and a user in both directions.
fn link(
	groups: &mut BTreeMap<String, DirectoryEntry>,
	group: &str,
	users: &mut BTreeMap<String, DirectoryEntry>,
	user: &str,
) -> bool {
	let (Some(group_entry), Some(user_entry)) = (groups.get_mut(group), users.get_mut(user)) else {
		return false;
	};
	let added = group_entry.add(MEMBER_ATTR, user_entry.dn().to_string());
	user_entry.add(MEMBER_OF_ATTR, group_entry.dn().to_string());
	added
}

/// Link a parent group and a child group in both directions.
fn link_groups(groups: &mut BTreeMap<String, DirectoryEntry>, parent: &str, child: &str) -> bool {
	let (Some(parent_dn), Some(child_dn)) =
		(groups.get(parent).map(|e| e.dn().to_string()), groups.get(child).map(|e| e.dn().to_string()))
	else {
		return false;
	};
	let mut added = false;
	if let Some(entry) = groups.get_mut(parent) {
		added = entry.add(MEMBER_ATTR, child_dn);
	}
	if let Some(entry) = groups.get_mut(child) {
		entry.add(MEMBER_OF_ATTR, parent_dn);
	}
	added
}
