use std::{
	sync::{
		atomic::{AtomicBool, AtomicUsize, Ordering},
		Mutex,
	},
	time::Duration,
};

use async_trait::async_trait;
use crowd_ldap::{
	DirectoryConfig, GroupRecord, IdentitySource, MembershipEdge, SourceError, UserRecord,
};
use secrecy::{ExposeSecret, SecretString};
use tracing_subscriber::{filter::LevelFilter, EnvFilter};

/// Users, groups and memberships served by [`MemorySource`].
#[derive(Debug, Clone, Default)]
pub struct Data {
	pub groups: Vec<GroupRecord>,
	pub users: Vec<UserRecord>,
	pub edges: Vec<MembershipEdge>,
	pub passwords: Vec<(String, String)>,
}

/// In-memory identity source with failure injection.
#[derive(Debug, Default)]
pub struct MemorySource {
	data: Mutex<Data>,
	fail: AtomicBool,
	delay: Mutex<Option<Duration>>,
	auth_calls: AtomicUsize,
}

impl MemorySource {
	pub fn new(data: Data) -> Self {
		Self { data: Mutex::new(data), ..Default::default() }
	}

	pub fn set_data(&self, data: Data) {
		*self.data.lock().unwrap() = data;
	}

	pub fn set_failing(&self, fail: bool) {
		self.fail.store(fail, Ordering::SeqCst);
	}

	pub fn set_delay(&self, delay: Option<Duration>) {
		*self.delay.lock().unwrap() = delay;
	}

	pub fn auth_calls(&self) -> usize {
		self.auth_calls.load(Ordering::SeqCst)
	}

	async fn fetch<T>(&self, read: impl FnOnce(&Data) -> T) -> Result<T, SourceError> {
		let delay = *self.delay.lock().unwrap();
		if let Some(delay) = delay {
			tokio::time::sleep(delay).await;
		}
		if self.fail.load(Ordering::SeqCst) {
			return Err(SourceError::Response("HTTP 503 Service Unavailable".to_owned()));
		}
		Ok(read(&self.data.lock().unwrap()))
	}
}

#[async_trait]
impl IdentitySource for MemorySource {
	async fn search_groups(&self) -> Result<Vec<GroupRecord>, SourceError> {
		self.fetch(|data| data.groups.clone()).await
	}

	async fn search_users(&self) -> Result<Vec<UserRecord>, SourceError> {
		self.fetch(|data| data.users.clone()).await
	}

	async fn memberships(&self) -> Result<Vec<MembershipEdge>, SourceError> {
		self.fetch(|data| data.edges.clone()).await
	}

	async fn authenticate_user(
		&self,
		name: &str,
		password: &SecretString,
	) -> Result<UserRecord, SourceError> {
		self.auth_calls.fetch_add(1, Ordering::SeqCst);
		if self.fail.load(Ordering::SeqCst) {
			return Err(SourceError::Response("HTTP 503 Service Unavailable".to_owned()));
		}
		let data = self.data.lock().unwrap();
		let known = data
			.passwords
			.iter()
			.any(|(user, secret)| user == name && secret == password.expose_secret());
		if !known {
			return Err(SourceError::Rejected("INVALID_USER_AUTHENTICATION".to_owned()));
		}
		data.users
			.iter()
			.find(|user| user.name == name)
			.cloned()
			.ok_or_else(|| SourceError::Rejected("USER_NOT_FOUND".to_owned()))
	}
}

pub fn group(name: &str, active: bool) -> GroupRecord {
	GroupRecord { name: name.to_owned(), description: Some(format!("The {name} group")), active }
}

pub fn user(name: &str, active: bool) -> UserRecord {
	UserRecord {
		name: name.to_owned(),
		display_name: Some(format!("User {name}")),
		email: Some(format!("{name}@example.com")),
		first_name: Some("User".to_owned()),
		last_name: Some(name.to_owned()),
		active,
	}
}

pub fn edge(group: &str, users: &[&str], groups: &[&str]) -> MembershipEdge {
	MembershipEdge {
		group: group.to_owned(),
		users: users.iter().map(|&name| name.to_owned()).collect(),
		groups: groups.iter().map(|&name| name.to_owned()).collect(),
	}
}

/// `eng` (active) with `alice` (active) and `bob` (inactive) as members.
pub fn scenario() -> Data {
	Data {
		groups: vec![group("eng", true)],
		users: vec![user("alice", true), user("bob", false)],
		edges: vec![edge("eng", &["alice", "bob"], &[])],
		passwords: vec![("alice".to_owned(), "secret".to_owned())],
	}
}

pub fn directory_config() -> DirectoryConfig {
	DirectoryConfig { suffix: "dc=example,dc=com".to_owned(), ..Default::default() }
}

pub fn init_tracing() {
	let filter = EnvFilter::default().add_directive(LevelFilter::DEBUG.into());
	let _ = tracing_subscriber::fmt().with_env_filter(filter).with_test_writer().try_init();
}
