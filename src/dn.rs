//! Distinguished names.
//!
//! A [`Dn`] is kept as a sequence of [`Rdn`]s in the order they are written,
//! i.e. leaf first: `uid=alice,ou=users,dc=crowd` holds `uid=alice` at index
//! zero. Comparison ignores case in both attribute types and values, which is
//! how the naming attributes used by this directory (`dc`, `ou`, `cn`, `uid`)
//! match.
use std::{fmt, str::FromStr};

use crate::error::Error;

/// A single `type=value` naming component.
#[derive(Debug, Clone)]
pub struct Rdn {
	/// Attribute type, as written.
	attr: String,
	/// Unescaped attribute value.
	value: String,
}

impl Rdn {
	/// Create a naming component from an attribute type and a raw (unescaped)
	/// value.
	pub fn new(attr: impl Into<String>, value: impl Into<String>) -> Self {
		Self { attr: attr.into(), value: value.into() }
	}

	/// The attribute type.
	#[must_use]
	pub fn attr(&self) -> &str {
		&self.attr
	}

	/// The unescaped value.
	#[must_use]
	pub fn value(&self) -> &str {
		&self.value
	}

	/// Whether the attribute type equals `attr`, ignoring case.
	#[must_use]
	pub fn is_type(&self, attr: &str) -> bool {
		self.attr.eq_ignore_ascii_case(attr)
	}

	/// Case-folded `type=value` form, usable as a lookup key.
	#[must_use]
	pub fn normalized(&self) -> String {
		format!("{}={}", self.attr.to_ascii_lowercase(), self.value.to_lowercase())
	}
}

impl PartialEq for Rdn {
	fn eq(&self, other: &Self) -> bool {
		self.is_type(&other.attr) && self.value.to_lowercase() == other.value.to_lowercase()
	}
}

impl Eq for Rdn {}

impl fmt::Display for Rdn {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}={}", self.attr, ldap3::dn_escape(self.value.as_str()))
	}
}

/// A distinguished name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dn {
	/// Naming components, leaf first.
	rdns: Vec<Rdn>,
}

impl Dn {
	/// Build a DN from components given leaf first.
	#[must_use]
	pub fn from_rdns(rdns: Vec<Rdn>) -> Self {
		Self { rdns }
	}

	/// The leaf component, `None` for the empty DN.
	#[must_use]
	pub fn rdn(&self) -> Option<&Rdn> {
		self.rdns.first()
	}

	/// Number of components.
	#[must_use]
	pub fn len(&self) -> usize {
		self.rdns.len()
	}

	/// A new DN one level below this one.
	#[must_use]
	pub fn child(&self, rdn: Rdn) -> Self {
		let mut rdns = Vec::with_capacity(self.rdns.len() + 1);
		rdns.push(rdn);
		rdns.extend(self.rdns.iter().cloned());
		Self { rdns }
	}

	/// The DN one level up, `None` for the empty DN.
	#[must_use]
	pub fn parent(&self) -> Option<Self> {
		(!self.rdns.is_empty()).then(|| Self { rdns: self.rdns[1..].to_vec() })
	}

	/// Whether `ancestor` is a proper suffix of this DN.
	#[must_use]
	pub fn is_descendant_of(&self, ancestor: &Dn) -> bool {
		self.rdns.len() > ancestor.rdns.len()
			&& self.rdns[self.rdns.len() - ancestor.rdns.len()..] == ancestor.rdns[..]
	}

	/// Whether this DN sits exactly one component below `parent`.
	#[must_use]
	pub fn is_child_of(&self, parent: &Dn) -> bool {
		self.rdns.len() == parent.rdns.len() + 1 && self.is_descendant_of(parent)
	}
}

impl fmt::Display for Dn {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		for (i, rdn) in self.rdns.iter().enumerate() {
			if i > 0 {
				f.write_str(",")?;
			}
			write!(f, "{rdn}")?;
		}
		Ok(())
	}
}

impl FromStr for Dn {
	type Err = Error;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		if s.trim().is_empty() {
			return Ok(Self::default());
		}
		split_unescaped(s, b',')
			.into_iter()
			.map(|component| parse_rdn(component).ok_or_else(|| Error::InvalidDn(s.to_owned())))
			.collect::<Result<Vec<_>, _>>()
			.map(Self::from_rdns)
	}
}

/// Split on every occurrence of `separator` not preceded by a backslash.
fn split_unescaped(s: &str, separator: u8) -> Vec<&str> {
	let bytes = s.as_bytes();
	let mut parts = Vec::new();
	let mut start = 0;
	let mut i = 0;
	while i < bytes.len() {
		match bytes[i] {
			b'\\' => i += 2,
			b if b == separator => {
				parts.push(&s[start..i]);
				i += 1;
				start = i;
			}
			_ => i += 1,
		}
	}
	parts.push(&s[start.min(s.len())..]);
	parts
}

/// Parse one `type=value` component. Multi-valued RDNs are not supported.
fn parse_rdn(component: &str) -> Option<Rdn> {
	let (attr, value) = component.split_once('=')?;
	let attr = attr.trim();
	let valid_attr = !attr.is_empty()
		&& attr.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'.');
	if !valid_attr || split_unescaped(value, b'+').len() > 1 {
		return None;
	}
	Some(Rdn::new(attr, unescape_value(value.trim())?))
}

/// Undo RFC 4514 escaping: `\<special>` and `\XX` hex pairs.
pub(crate) fn unescape_value(value: &str) -> Option<String> {
	let bytes = value.as_bytes();
	let mut out = Vec::with_capacity(bytes.len());
	let mut i = 0;
	while i < bytes.len() {
		if bytes[i] != b'\\' {
			out.push(bytes[i]);
			i += 1;
			continue;
		}
		let next = *bytes.get(i + 1)?;
		if next.is_ascii_hexdigit() {
			let hex = value.get(i + 1..i + 3)?;
			out.push(u8::from_str_radix(hex, 16).ok()?);
			i += 3;
		} else {
			out.push(next);
			i += 2;
		}
	}
	String::from_utf8(out).ok()
}
