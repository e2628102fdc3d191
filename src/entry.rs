//! Directory entries served by the partition.
use std::collections::{BTreeMap, HashMap};

use ldap3::SearchEntry;

use crate::dn::Dn;

/// A named, possibly multi-valued attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
	/// The attribute name as first written.
	name: String,
	/// Values in insertion order, without duplicates.
	values: Vec<String>,
}

impl Attribute {
	/// The attribute name.
	#[must_use]
	pub fn name(&self) -> &str {
		&self.name
	}

	/// The attribute values.
	#[must_use]
	pub fn values(&self) -> &[String] {
		&self.values
	}
}

/// A directory entry: a DN plus attributes keyed case-insensitively.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
	/// Where the entry lives in the tree.
	dn: Dn,
	/// Attributes keyed by lower-cased name.
	attrs: BTreeMap<String, Attribute>,
}

impl DirectoryEntry {
	/// Create an entry without attributes.
	#[must_use]
	pub fn new(dn: Dn) -> Self {
		Self { dn, attrs: BTreeMap::new() }
	}

	/// The distinguished name.
	#[must_use]
	pub fn dn(&self) -> &Dn {
		&self.dn
	}

	/// Replace all values of an attribute. An empty value list removes it.
	pub fn put<I, V>(&mut self, name: &str, values: I)
	where
		I: IntoIterator<Item = V>,
		V: Into<String>,
	{
		let mut deduped: Vec<String> = Vec::new();
		for value in values.into_iter().map(Into::into) {
			if !deduped.contains(&value) {
				deduped.push(value);
			}
		}
		let key = name.to_ascii_lowercase();
		if deduped.is_empty() {
			self.attrs.remove(&key);
		} else {
			self.attrs.insert(key, Attribute { name: name.to_owned(), values: deduped });
		}
	}

	/// Append a value unless the attribute already holds it. Returns whether
	/// the value was added.
	pub fn add(&mut self, name: &str, value: impl Into<String>) -> bool {
		let value = value.into();
		let attr = self
			.attrs
			.entry(name.to_ascii_lowercase())
			.or_insert_with(|| Attribute { name: name.to_owned(), values: Vec::new() });
		if attr.values.contains(&value) {
			return false;
		}
		attr.values.push(value);
		true
	}

	/// All values of an attribute, looked up case-insensitively.
	#[must_use]
	pub fn get(&self, name: &str) -> Option<&[String]> {
		self.attrs.get(&name.to_ascii_lowercase()).map(|attr| attr.values.as_slice())
	}

	/// The first value of an attribute.
	#[must_use]
	pub fn first(&self, name: &str) -> Option<&str> {
		self.get(name)?.first().map(String::as_str)
	}

	/// Whether the attribute is present.
	#[must_use]
	pub fn has(&self, name: &str) -> bool {
		self.attrs.contains_key(&name.to_ascii_lowercase())
	}

	/// Whether the attribute holds `value`, compared case-insensitively. Used
	/// for `objectClass` checks.
	#[must_use]
	pub fn has_value_ignore_case(&self, name: &str, value: &str) -> bool {
		self.get(name).is_some_and(|values| values.iter().any(|v| v.eq_ignore_ascii_case(value)))
	}

	/// Iterate over the attributes in name order.
	pub fn attributes(&self) -> impl Iterator<Item = &Attribute> {
		self.attrs.values()
	}

	/// Convert into the `ldap3` representation of a search result entry.
	#[must_use]
	pub fn to_search_entry(&self) -> SearchEntry {
		SearchEntry {
			dn: self.dn.to_string(),
			attrs: self
				.attributes()
				.map(|attr| (attr.name().to_owned(), attr.values().to_vec()))
				.collect(),
			bin_attrs: HashMap::new(),
		}
	}
}
