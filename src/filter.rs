//! Search filters and their compilation into predicates.
//!
//! Only the boolean combinators, equality (including presence) and the two
//! ordering matches are evaluated. Anything else becomes
//! [`FilterNode::Unsupported`] and is left out of the compiled predicate
//! rather than evaluated as false.
use std::{cmp::Ordering, str::FromStr};

use tracing::warn;

use crate::{dn::unescape_value, entry::DirectoryEntry, error::Error};

/// A search filter expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterNode {
	/// All children match.
	And(Vec<FilterNode>),
	/// Any child matches.
	Or(Vec<FilterNode>),
	/// The child does not match.
	Not(Box<FilterNode>),
	/// `(attr=value)`; a value of `*` tests presence.
	Equality(String, String),
	/// `(attr>=value)`
	GreaterOrEqual(String, String),
	/// `(attr<=value)`
	LessOrEqual(String, String),
	/// A filter kind that is not evaluated, named for logging.
	Unsupported(String),
}

/// Deepest nesting of `&`, `|` and `!` accepted by the text parser.
pub const MAX_FILTER_DEPTH: usize = 256;

/// A compiled filter.
pub type Predicate = Box<dyn Fn(&DirectoryEntry) -> bool + Send + Sync>;

/// Compile a filter. `None` means "no filtering": the filter was unsupported
/// or all of its parts were.
#[must_use]
pub fn compile(node: &FilterNode) -> Option<Predicate> {
	match node {
		FilterNode::And(children) => {
			let predicates: Vec<Predicate> = children.iter().filter_map(compile).collect();
			(!predicates.is_empty()).then(|| -> Predicate {
				Box::new(move |entry: &DirectoryEntry| predicates.iter().all(|p| p(entry)))
			})
		}
		FilterNode::Or(children) => {
			let predicates: Vec<Predicate> = children.iter().filter_map(compile).collect();
			(!predicates.is_empty()).then(|| -> Predicate {
				Box::new(move |entry: &DirectoryEntry| predicates.iter().any(|p| p(entry)))
			})
		}
		FilterNode::Not(child) => {
			let predicate = compile(child)?;
			Some(Box::new(move |entry: &DirectoryEntry| !predicate(entry)))
		}
		FilterNode::Equality(attr, value) if value == "*" => {
			let attr = attr.clone();
			Some(Box::new(move |entry: &DirectoryEntry| entry.has(&attr)))
		}
		FilterNode::Equality(attr, value) => {
			let (attr, value) = (attr.clone(), value.clone());
			Some(Box::new(move |entry: &DirectoryEntry| any_value(entry, &attr, |stored| *stored == value)))
		}
		FilterNode::GreaterOrEqual(attr, value) => {
			let (attr, value) = (attr.clone(), value.clone());
			Some(Box::new(move |entry: &DirectoryEntry| {
				any_value(entry, &attr, |stored| compare_values(stored, &value) != Ordering::Less)
			}))
		}
		FilterNode::LessOrEqual(attr, value) => {
			let (attr, value) = (attr.clone(), value.clone());
			Some(Box::new(move |entry: &DirectoryEntry| {
				any_value(entry, &attr, |stored| compare_values(stored, &value) != Ordering::Greater)
			}))
		}
		FilterNode::Unsupported(kind) => {
			warn!("Filters of type [{kind}] are not supported");
			None
		}
	}
}

/// Keep the entries matching `filter`; everything when there is no filter or
/// it compiles to nothing.
pub fn apply<T: AsRef<DirectoryEntry>>(filter: Option<&FilterNode>, entries: &mut Vec<T>) {
	if let Some(predicate) = filter.and_then(compile) {
		entries.retain(|entry| predicate(entry.as_ref()));
	}
}

/// Whether any value of `attr` satisfies `test`.
fn any_value(entry: &DirectoryEntry, attr: &str, test: impl Fn(&String) -> bool) -> bool {
	entry.get(attr).is_some_and(|values| values.iter().any(test))
}

/// Integers compare numerically, everything else lexicographically.
fn compare_values(stored: &str, wanted: &str) -> Ordering {
	match (stored.parse::<i64>(), wanted.parse::<i64>()) {
		(Ok(a), Ok(b)) => a.cmp(&b),
		_ => stored.cmp(wanted),
	}
}

impl FromStr for FilterNode {
	type Err = Error;

	/// Parse the RFC 4515 string form, e.g. `(&(objectClass=person)(uid=a*))`.
	/// The outer parentheses may be omitted for a single item. Nesting deeper
	/// than [`MAX_FILTER_DEPTH`] is rejected, as is an escaped value that
	/// decodes to a bare `*`, which would read as a presence test.
	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let trimmed = s.trim();
		let wrapped;
		let text = if trimmed.starts_with('(') {
			trimmed
		} else {
			wrapped = format!("({trimmed})");
			&wrapped
		};
		let mut parser = Parser { input: text.as_bytes(), pos: 0 };
		let node = parser.filter(0).map_err(|reason| Error::InvalidFilter(format!("{reason} in {s:?}")))?;
		if parser.pos != parser.input.len() {
			return Err(Error::InvalidFilter(format!("trailing input in {s:?}")));
		}
		Ok(node)
	}
}

/// Recursive descent over the filter text.
#[derive(Debug)]
struct Parser<'a> {
	/// Filter text.
	input: &'a [u8],
	/// Read position.
	pos: usize,
}

impl Parser<'_> {
	/// `filter = "(" filtercomp ")"`
	fn filter(&mut self, depth: usize) -> Result<FilterNode, String> {
		if depth > MAX_FILTER_DEPTH {
			return Err("filter nested too deeply".to_owned());
		}
		self.expect(b'(')?;
		let node = match self.peek() {
			Some(b'&') => {
				self.pos += 1;
				FilterNode::And(self.filter_list(depth + 1)?)
			}
			Some(b'|') => {
				self.pos += 1;
				FilterNode::Or(self.filter_list(depth + 1)?)
			}
			Some(b'!') => {
				self.pos += 1;
				FilterNode::Not(Box::new(self.filter(depth + 1)?))
			}
			Some(_) => self.item()?,
			None => return Err("unexpected end".to_owned()),
		};
		self.expect(b')')?;
		Ok(node)
	}

	/// Zero or more filters up to the closing parenthesis.
	fn filter_list(&mut self, depth: usize) -> Result<Vec<FilterNode>, String> {
		let mut children = Vec::new();
		while self.peek() == Some(b'(') {
			children.push(self.filter(depth)?);
		}
		Ok(children)
	}

	/// `attr op value`
	fn item(&mut self) -> Result<FilterNode, String> {
		let start = self.pos;
		while let Some(b) = self.peek() {
			if matches!(b, b'=' | b'~' | b'>' | b'<' | b':' | b'(' | b')') {
				break;
			}
			self.pos += 1;
		}
		let attr = std::str::from_utf8(&self.input[start..self.pos])
			.map_err(|_| "attribute is not UTF-8".to_owned())?
			.trim()
			.to_owned();

		let op = match (self.peek(), self.input.get(self.pos + 1).copied()) {
			(Some(b'='), _) => "=",
			(Some(b'>'), Some(b'=')) => ">=",
			(Some(b'<'), Some(b'=')) => "<=",
			(Some(b'~'), Some(b'=')) => "~=",
			(Some(b':'), _) => ":",
			_ => return Err(format!("missing operator after attribute '{attr}'")),
		};
		if attr.is_empty() && op != ":" {
			return Err("empty attribute".to_owned());
		}
		self.pos += op.len();
		if op == ":" {
			// extensible match: skip to the end of the item
			self.raw_value()?;
			return Ok(FilterNode::Unsupported("extensible".to_owned()));
		}

		let raw = self.raw_value()?;
		let node = match op {
			"=" if raw == "*" => FilterNode::Equality(attr, raw.to_owned()),
			"=" if has_wildcard(raw) => FilterNode::Unsupported("substring".to_owned()),
			"=" => FilterNode::Equality(attr, literal(raw)?),
			">=" => FilterNode::GreaterOrEqual(attr, unescape(raw)?),
			"<=" => FilterNode::LessOrEqual(attr, unescape(raw)?),
			_ => FilterNode::Unsupported("approximate".to_owned()),
		};
		Ok(node)
	}

	/// Text up to the next `)`. Parentheses inside values must be escaped.
	fn raw_value(&mut self) -> Result<&str, String> {
		let start = self.pos;
		while let Some(b) = self.peek() {
			match b {
				b')' => break,
				b'(' => return Err("unescaped '(' in value".to_owned()),
				_ => self.pos += 1,
			}
		}
		std::str::from_utf8(&self.input[start..self.pos]).map_err(|_| "value is not UTF-8".to_owned())
	}

	/// Next byte without consuming it.
	fn peek(&self) -> Option<u8> {
		self.input.get(self.pos).copied()
	}

	/// Consume `byte` or fail.
	fn expect(&mut self, byte: u8) -> Result<(), String> {
		if self.peek() == Some(byte) {
			self.pos += 1;
			Ok(())
		} else {
			Err(format!("expected '{}' at offset {}", byte as char, self.pos))
		}
	}
}

/// Whether a raw value contains a wildcard.
fn has_wildcard(raw: &str) -> bool {
	raw.contains('*')
}

/// Decode an equality value. Only the unescaped `*` means presence, so a
/// value decoding to `*` cannot be represented.
fn literal(raw: &str) -> Result<String, String> {
	let value = unescape(raw)?;
	if value == "*" {
		return Err(format!("escaped '*' in value {raw:?} is not supported"));
	}
	Ok(value)
}

/// Decode `\XX` escapes in a filter value.
fn unescape(raw: &str) -> Result<String, String> {
	unescape_value(raw).ok_or_else(|| format!("bad escape in value {raw:?}"))
}

#[cfg(test)]
mod tests {
	#![allow(clippy::unwrap_used)]

	use super::{compile, FilterNode, MAX_FILTER_DEPTH};
	use crate::{entry::DirectoryEntry, error::Error};

	fn alice() -> DirectoryEntry {
		let mut entry = DirectoryEntry::new("uid=alice,ou=users,dc=crowd".parse().unwrap());
		entry.put("objectClass", ["top", "inetOrgPerson"]);
		entry.put("uid", ["alice"]);
		entry.put("mail", ["alice@example.com"]);
		entry.put("employeeNumber", ["42"]);
		entry
	}

	fn bob() -> DirectoryEntry {
		let mut entry = DirectoryEntry::new("uid=bob,ou=users,dc=crowd".parse().unwrap());
		entry.put("objectClass", ["top", "inetOrgPerson"]);
		entry.put("uid", ["bob"]);
		entry.put("employeeNumber", ["7"]);
		entry
	}

	fn eq(attr: &str, value: &str) -> FilterNode {
		FilterNode::Equality(attr.to_owned(), value.to_owned())
	}

	fn matches(filter: &FilterNode, entry: &DirectoryEntry) -> bool {
		compile(filter).map_or(true, |predicate| predicate(entry))
	}

	#[test]
	fn equality() {
		assert!(matches(&eq("uid", "alice"), &alice()));
		assert!(matches(&eq("UID", "alice"), &alice()), "attribute names ignore case");
		assert!(!matches(&eq("uid", "Alice"), &alice()), "values match exactly");
		assert!(!matches(&eq("uid", "alice"), &bob()));
		assert!(matches(&eq("objectClass", "inetOrgPerson"), &alice()), "any value may match");
	}

	#[test]
	fn presence() {
		assert!(matches(&eq("mail", "*"), &alice()));
		assert!(!matches(&eq("mail", "*"), &bob()));
	}

	#[test]
	fn ordering_is_numeric_for_numbers() {
		let ge = FilterNode::GreaterOrEqual("employeeNumber".to_owned(), "10".to_owned());
		let le = FilterNode::LessOrEqual("employeeNumber".to_owned(), "10".to_owned());
		assert!(matches(&ge, &alice()));
		assert!(!matches(&ge, &bob()));
		assert!(!matches(&le, &alice()));
		assert!(matches(&le, &bob()));

		let ge_text = FilterNode::GreaterOrEqual("uid".to_owned(), "b".to_owned());
		assert!(!matches(&ge_text, &alice()));
		assert!(matches(&ge_text, &bob()));
		assert!(!matches(&FilterNode::LessOrEqual("mail".to_owned(), "z".to_owned()), &bob()));
	}

	#[test]
	fn boolean_combinators() {
		let and = FilterNode::And(vec![eq("objectClass", "inetOrgPerson"), eq("uid", "bob")]);
		assert!(!matches(&and, &alice()));
		assert!(matches(&and, &bob()));

		let or = FilterNode::Or(vec![eq("uid", "alice"), eq("uid", "carol")]);
		assert!(matches(&or, &alice()));
		assert!(!matches(&or, &bob()));

		let not = FilterNode::Not(Box::new(eq("uid", "alice")));
		assert!(!matches(&not, &alice()));
		assert!(matches(&not, &bob()));
	}

	#[test]
	fn empty_combinators_match_everything() {
		assert!(compile(&FilterNode::And(vec![])).is_none());
		assert!(compile(&FilterNode::Or(vec![])).is_none());
	}

	#[test]
	fn unsupported_children_are_dropped() {
		let unsupported = FilterNode::Unsupported("substring".to_owned());
		assert!(compile(&unsupported).is_none());
		assert!(compile(&FilterNode::Not(Box::new(unsupported.clone()))).is_none());

		let or = FilterNode::Or(vec![unsupported.clone(), eq("uid", "alice")]);
		assert!(matches(&or, &alice()));
		assert!(!matches(&or, &bob()), "unsupported child is not treated as true");

		let and = FilterNode::And(vec![unsupported.clone(), unsupported]);
		assert!(compile(&and).is_none());
	}

	#[test]
	fn parses_filter_text() -> Result<(), Box<dyn std::error::Error>> {
		let parsed: FilterNode = "(&(objectClass=person)(!(uid=bob))(|(mail=*)(employeeNumber>=10)))".parse()?;
		assert_eq!(
			parsed,
			FilterNode::And(vec![
				eq("objectClass", "person"),
				FilterNode::Not(Box::new(eq("uid", "bob"))),
				FilterNode::Or(vec![
					eq("mail", "*"),
					FilterNode::GreaterOrEqual("employeeNumber".to_owned(), "10".to_owned()),
				]),
			])
		);
		assert_eq!("uid=alice".parse::<FilterNode>()?, eq("uid", "alice"));
		assert_eq!("(cn=a\\29b)".parse::<FilterNode>()?, eq("cn", "a)b"));
		assert_eq!("(&)".parse::<FilterNode>()?, FilterNode::And(vec![]));
		Ok(())
	}

	#[test]
	fn parses_unsupported_kinds() -> Result<(), Box<dyn std::error::Error>> {
		assert!(matches!("(cn=al*)".parse::<FilterNode>()?, FilterNode::Unsupported(_)));
		assert!(matches!("(cn~=alice)".parse::<FilterNode>()?, FilterNode::Unsupported(_)));
		assert!(matches!(
			"(cn:caseExactMatch:=Alice)".parse::<FilterNode>()?,
			FilterNode::Unsupported(_)
		));
		Ok(())
	}

	#[test]
	fn rejects_deep_nesting() {
		let deep = format!("{}(uid=alice){}", "(!".repeat(10_000), ")".repeat(10_000));
		assert!(matches!(deep.parse::<FilterNode>(), Err(Error::InvalidFilter(_))));

		let limit = MAX_FILTER_DEPTH;
		let nested = format!("{}(uid=alice){}", "(!".repeat(limit), ")".repeat(limit));
		assert!(nested.parse::<FilterNode>().is_ok());
		let and = format!("{}(uid=alice){}", "(&".repeat(limit + 1), ")".repeat(limit + 1));
		assert!(matches!(and.parse::<FilterNode>(), Err(Error::InvalidFilter(_))));
	}

	#[test]
	fn escaped_asterisk_is_not_presence() {
		assert!(matches!("(cn=\\2a)".parse::<FilterNode>(), Err(Error::InvalidFilter(_))));
		assert!(matches!("(cn=\\2A)".parse::<FilterNode>(), Err(Error::InvalidFilter(_))));
		assert_eq!("(cn=a\\2a)".parse::<FilterNode>().unwrap(), eq("cn", "a*"));
		assert_eq!("(cn=*)".parse::<FilterNode>().unwrap(), eq("cn", "*"));
	}

	#[test]
	fn rejects_malformed_text() {
		assert!("(uid=alice".parse::<FilterNode>().is_err());
		assert!("(uid=alice))".parse::<FilterNode>().is_err());
		assert!("(=alice)".parse::<FilterNode>().is_err());
		assert!("(uid)".parse::<FilterNode>().is_err());
		assert!("(cn=a(b)".parse::<FilterNode>().is_err());
	}
}
