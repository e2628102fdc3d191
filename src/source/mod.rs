//! The identity source the directory is built from.
//!
//! [`IdentitySource`] is the seam between the directory engine and whatever
//! holds the users and groups. [`crowd::CrowdClient`] talks to Atlassian
//! Crowd; tests plug in an in-memory implementation.
use std::fmt::Debug;

use async_trait::async_trait;
use secrecy::SecretString;

pub mod crowd;

/// A group as reported by the identity source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupRecord {
	/// Unique group name.
	pub name: String,
	/// Free-form description.
	pub description: Option<String>,
	/// Inactive groups are listed but never linked to members.
	pub active: bool,
}

/// A user as reported by the identity source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
	/// Unique login name.
	pub name: String,
	/// Full name for display.
	pub display_name: Option<String>,
	/// Email address.
	pub email: Option<String>,
	/// Given name.
	pub first_name: Option<String>,
	/// Surname.
	pub last_name: Option<String>,
	/// Inactive users are listed but never linked to groups.
	pub active: bool,
}

/// Direct members of one group.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MembershipEdge {
	/// Name of the containing group.
	pub group: String,
	/// Names of member users.
	pub users: Vec<String>,
	/// Names of member child groups.
	pub groups: Vec<String>,
}

/// Errors reported by an identity source.
#[derive(thiserror::Error, Debug)]
pub enum SourceError {
	/// The source explicitly refused the credentials. Carries the reason
	/// given by the source.
	#[error("Credentials rejected: {0}")]
	Rejected(String),
	/// The request could not be performed.
	#[error(transparent)]
	Http(#[from] reqwest::Error),
	/// The source answered with something that could not be understood.
	#[error("Unexpected response: {0}")]
	Response(String),
}

/// Read access to users, groups and memberships, plus credential checks.
///
/// Every call is a full fetch; implementations do not cache.
#[async_trait]
pub trait IdentitySource: Debug + Send + Sync {
	/// All groups.
	async fn search_groups(&self) -> Result<Vec<GroupRecord>, SourceError>;

	/// All users.
	async fn search_users(&self) -> Result<Vec<UserRecord>, SourceError>;

	/// The complete flat membership relation.
	async fn memberships(&self) -> Result<Vec<MembershipEdge>, SourceError>;

	/// Check a user's password. Returns [`SourceError::Rejected`] when the
	/// source refuses the credentials.
	async fn authenticate_user(
		&self,
		name: &str,
		password: &SecretString,
	) -> Result<UserRecord, SourceError>;
}
