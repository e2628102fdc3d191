//! [`IdentitySource`] backed by the Crowd REST API.
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, RequestBuilder, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, trace};
use url::Url;

use super::{GroupRecord, IdentitySource, MembershipEdge, SourceError, UserRecord};
use crate::{config::CrowdConfig, error::Error};

/// Path of the user management API below the Crowd base URL.
const API_PATH: &str = "rest/usermanagement/1/";

/// Reasons in a 400 answer to an authentication request that mean the
/// credentials were refused, as opposed to a broken request.
const REJECTION_REASONS: &[&str] =
	&["INVALID_USER_AUTHENTICATION", "USER_NOT_FOUND", "INACTIVE_ACCOUNT", "EXPIRED_CREDENTIAL"];

/// Client for one Crowd application.
#[derive(Debug, Clone)]
pub struct CrowdClient {
	/// HTTP client with timeout and trust roots applied.
	client: Client,
	/// `<url>/rest/usermanagement/1/`
	base: Url,
	/// Application name used for basic auth.
	application_name: String,
	/// Application password used for basic auth.
	application_password: SecretString,
	/// Entries requested per search page.
	page_size: usize,
}

impl CrowdClient {
	/// Build a client from configuration, loading extra root certificates if
	/// configured.
	pub async fn new(config: &CrowdConfig) -> Result<Self, Error> {
		let mut builder = Client::builder()
			.use_rustls_tls()
			.timeout(Duration::from_secs(config.timeout))
			.user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")));

		if let Some(path) = &config.root_certificates_path {
			let pem = tokio::fs::read(path).await?;
			for der in rustls_pemfile::certs(&mut pem.as_slice())? {
				let certificate = reqwest::Certificate::from_der(&der).map_err(SourceError::from)?;
				builder = builder.add_root_certificate(certificate);
			}
		}

		let client = builder.build().map_err(SourceError::from)?;
		Ok(Self {
			client,
			base: api_base(&config.url)?,
			application_name: config.application_name.clone(),
			application_password: config.application_password.clone(),
			page_size: config.page_size,
		})
	}

	/// Attach application credentials to a request.
	fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
		request.basic_auth(&self.application_name, Some(self.application_password.expose_secret()))
	}

	/// Resolve an API path.
	fn endpoint(&self, path: &str) -> Result<Url, SourceError> {
		self.base.join(path).map_err(|err| SourceError::Response(format!("invalid endpoint {path}: {err}")))
	}

	/// Fetch every page of a search for one entity type.
	async fn search_all<T, P>(&self, entity: &str) -> Result<Vec<T>, SourceError>
	where
		P: DeserializeOwned + SearchPage<Item = T>,
	{
		let url = self.endpoint("search")?;
		let mut results = Vec::new();
		loop {
			let start = results.len().to_string();
			let max = self.page_size.to_string();
			let request = self
				.client
				.get(url.clone())
				.query(&[
					("entity-type", entity),
					("expand", entity),
					("start-index", start.as_str()),
					("max-results", max.as_str()),
				])
				.header(header::ACCEPT, "application/json");
			let page: P = checked(self.authorized(request).send().await?).await?.json().await?;
			let items = page.into_items();
			let fetched = items.len();
			trace!("Fetched {fetched} {entity} entries from offset {start}");
			results.extend(items);
			if fetched < self.page_size || fetched == 0 {
				break;
			}
		}
		debug!("Fetched {} {entity} entries", results.len());
		Ok(results)
	}
}

/// Append the API path to a base URL, treating the base as a directory.
fn api_base(url: &Url) -> Result<Url, Error> {
	let mut base = url.clone();
	if !base.path().ends_with('/') {
		base.set_path(&format!("{}/", base.path()));
	}
	base.join(API_PATH).map_err(|err| Error::Config(format!("invalid Crowd URL {url}: {err}")))
}

/// Turn non-success statuses into errors.
async fn checked(response: Response) -> Result<Response, SourceError> {
	if response.status().is_success() {
		return Ok(response);
	}
	let status = response.status();
	let body = response.text().await.unwrap_or_default();
	Err(SourceError::Response(format!("HTTP {status}: {body}")))
}

#[async_trait]
impl IdentitySource for CrowdClient {
	async fn search_groups(&self) -> Result<Vec<GroupRecord>, SourceError> {
		self.search_all::<GroupRecord, GroupPage>("group").await
	}

	async fn search_users(&self) -> Result<Vec<UserRecord>, SourceError> {
		self.search_all::<UserRecord, UserPage>("user").await
	}

	async fn memberships(&self) -> Result<Vec<MembershipEdge>, SourceError> {
		let request = self
			.client
			.get(self.endpoint("group/membership")?)
			.header(header::ACCEPT, "application/xml");
		let body = checked(self.authorized(request).send().await?).await?.text().await?;
		parse_memberships(&body)
	}

	async fn authenticate_user(
		&self,
		name: &str,
		password: &SecretString,
	) -> Result<UserRecord, SourceError> {
		let request = self
			.client
			.post(self.endpoint("authentication")?)
			.query(&[("username", name)])
			.header(header::ACCEPT, "application/json")
			.json(&PasswordJson { value: password.expose_secret() });
		let response = self.authorized(request).send().await?;

		if response.status() == StatusCode::BAD_REQUEST {
			let body = response.text().await?;
			return Err(match serde_json::from_str::<ErrorJson>(&body) {
				Ok(error) if REJECTION_REASONS.contains(&error.reason.as_str()) => {
					SourceError::Rejected(error.reason)
				}
				_ => SourceError::Response(format!("HTTP 400: {body}")),
			});
		}
		let user: UserJson = checked(response).await?.json().await?;
		Ok(user.into())
	}
}

/// A page of search results.
trait SearchPage {
	/// Record type.
	type Item;
	/// Records of the page.
	fn into_items(self) -> Vec<Self::Item>;
}

/// Body of a group search.
#[derive(Debug, Deserialize)]
struct GroupPage {
	/// Groups in this page
	#[serde(default)]
	groups: Vec<GroupJson>,
}

impl SearchPage for GroupPage {
	type Item = GroupRecord;

	fn into_items(self) -> Vec<GroupRecord> {
		self.groups.into_iter().map(Into::into).collect()
	}
}

/// Body of a user search.
#[derive(Debug, Deserialize)]
struct UserPage {
	/// Users in this page
	#[serde(default)]
	users: Vec<UserJson>,
}

impl SearchPage for UserPage {
	type Item = UserRecord;

	fn into_items(self) -> Vec<UserRecord> {
		self.users.into_iter().map(Into::into).collect()
	}
}

/// Crowd's group representation.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct GroupJson {
	/// Name
	name: String,
	/// Description
	#[serde(default)]
	description: Option<String>,
	/// Whether the group is active
	#[serde(default = "active_default")]
	active: bool,
}

impl From<GroupJson> for GroupRecord {
	fn from(group: GroupJson) -> Self {
		Self { name: group.name, description: group.description, active: group.active }
	}
}

/// Crowd's user representation.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct UserJson {
	/// Login name
	name: String,
	/// Full name
	#[serde(default)]
	display_name: Option<String>,
	/// Email address
	#[serde(default)]
	email: Option<String>,
	/// Given name
	#[serde(default)]
	first_name: Option<String>,
	/// Surname
	#[serde(default)]
	last_name: Option<String>,
	/// Whether the account is active
	#[serde(default = "active_default")]
	active: bool,
}

impl From<UserJson> for UserRecord {
	fn from(user: UserJson) -> Self {
		Self {
			name: user.name,
			display_name: user.display_name,
			email: user.email,
			first_name: user.first_name,
			last_name: user.last_name,
			active: user.active,
		}
	}
}

/// Entities without an `active` field are treated as active.
fn active_default() -> bool {
	true
}

/// Password submitted for authentication.
#[derive(Serialize)]
struct PasswordJson<'a> {
	/// The password
	value: &'a str,
}

/// Crowd's error body.
#[derive(Debug, Deserialize)]
struct ErrorJson {
	/// Machine-readable reason
	reason: String,
}

/// `<memberships>` document.
#[derive(Debug, Deserialize)]
struct MembershipsXml {
	/// One element per group
	#[serde(rename = "membership", default)]
	memberships: Vec<MembershipXml>,
}

/// `<membership group="...">`
#[derive(Debug, Deserialize)]
struct MembershipXml {
	/// Containing group
	#[serde(rename = "@group")]
	group: String,
	/// Member users
	#[serde(default)]
	users: UsersXml,
	/// Member groups
	#[serde(default)]
	groups: GroupsXml,
}

/// `<users>`
#[derive(Debug, Default, Deserialize)]
struct UsersXml {
	/// Members
	#[serde(rename = "user", default)]
	members: Vec<NameXml>,
}

/// `<groups>`
#[derive(Debug, Default, Deserialize)]
struct GroupsXml {
	/// Members
	#[serde(rename = "group", default)]
	members: Vec<NameXml>,
}

/// An element carrying only a `name` attribute.
#[derive(Debug, Deserialize)]
struct NameXml {
	/// The name
	#[serde(rename = "@name")]
	name: String,
}

/// Parse the body of `group/membership`.
fn parse_memberships(body: &str) -> Result<Vec<MembershipEdge>, SourceError> {
	let document: MembershipsXml = quick_xml::de::from_str(body)
		.map_err(|err| SourceError::Response(format!("invalid membership document: {err}")))?;
	Ok(document
		.memberships
		.into_iter()
		.map(|membership| MembershipEdge {
			group: membership.group,
			users: membership.users.members.into_iter().map(|user| user.name).collect(),
			groups: membership.groups.members.into_iter().map(|group| group.name).collect(),
		})
		.collect())
}

#[cfg(test)]
mod tests {
	#![allow(clippy::unwrap_used)]

	use url::Url;

	use super::{api_base, parse_memberships, GroupPage, SearchPage, UserPage};
	use crate::source::{MembershipEdge, SourceError};

	#[test]
	fn api_base_appends_path() {
		for url in ["https://crowd.example.com/crowd", "https://crowd.example.com/crowd/"] {
			let base = api_base(&Url::parse(url).unwrap()).unwrap();
			assert_eq!(base.as_str(), "https://crowd.example.com/crowd/rest/usermanagement/1/");
		}
		let base = api_base(&Url::parse("http://localhost:8095").unwrap()).unwrap();
		assert_eq!(base.as_str(), "http://localhost:8095/rest/usermanagement/1/");
	}

	#[test]
	fn parses_membership_document() -> Result<(), SourceError> {
		let body = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
			<memberships>
				<membership group="eng">
					<users><user name="alice"/><user name="bob"/></users>
					<groups><group name="backend"/></groups>
				</membership>
				<membership group="empty">
					<users/>
					<groups/>
				</membership>
				<membership group="backend"></membership>
			</memberships>"#;
		let edges = parse_memberships(body)?;
		assert_eq!(
			edges,
			vec![
				MembershipEdge {
					group: "eng".to_owned(),
					users: vec!["alice".to_owned(), "bob".to_owned()],
					groups: vec!["backend".to_owned()],
				},
				MembershipEdge { group: "empty".to_owned(), ..Default::default() },
				MembershipEdge { group: "backend".to_owned(), ..Default::default() },
			]
		);
		Ok(())
	}

	#[test]
	fn empty_membership_document() -> Result<(), SourceError> {
		assert!(parse_memberships("<memberships/>")?.is_empty());
		assert!(matches!(
			parse_memberships("<memberships><membership/></memberships>"),
			Err(SourceError::Response(_))
		));
		Ok(())
	}

	#[test]
	fn parses_search_pages() {
		let users: UserPage = serde_json::from_str(
			r#"{"expand":"user","users":[
				{"name":"alice","active":true,"first-name":"Alice","last-name":"Liddell",
				 "display-name":"Alice Liddell","email":"alice@example.com"},
				{"name":"bob","active":false}
			]}"#,
		)
		.unwrap();
		let users = users.into_items();
		assert_eq!(users.len(), 2);
		assert_eq!(users[0].display_name.as_deref(), Some("Alice Liddell"));
		assert_eq!(users[0].first_name.as_deref(), Some("Alice"));
		assert!(!users[1].active);
		assert_eq!(users[1].email, None);

		let groups: GroupPage =
			serde_json::from_str(r#"{"expand":"group","groups":[{"name":"eng"}]}"#).unwrap();
		let groups = groups.into_items();
		assert_eq!(groups[0].name, "eng");
		assert!(groups[0].active, "missing active flag means active");

		let empty: GroupPage = serde_json::from_str(r#"{"expand":"group"}"#).unwrap();
		assert!(empty.into_items().is_empty());
	}
}
