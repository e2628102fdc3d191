//! Simple-bind authentication against the identity source.
use std::sync::Arc;

use async_trait::async_trait;
use secrecy::SecretString;
use tracing::{debug, warn};

use crate::{
	dn::Dn,
	error::Error,
	layout::{Layout, USER_ID_ATTR},
	source::{IdentitySource, SourceError},
};

/// Strength of an authenticated session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthenticationLevel {
	/// Name and password.
	Simple,
}

/// An authenticated bind identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LdapPrincipal {
	/// The DN that was bound.
	pub dn: Dn,
	/// How it was authenticated.
	pub level: AuthenticationLevel,
}

/// Validates bind credentials.
#[async_trait]
pub trait Authenticator: Send + Sync {
	/// Mechanism name, e.g. `simple`.
	fn mechanism(&self) -> &'static str;

	/// Check `credentials` for `bind_dn`.
	async fn authenticate(&self, bind_dn: &Dn, credentials: &[u8]) -> Result<LdapPrincipal, Error>;
}

/// Simple bind for users directly below the users container, checked against
/// Crowd. No credentials are cached.
#[derive(Debug)]
pub struct CrowdAuthenticator<S> {
	/// Where the bind DNs live.
	layout: Layout,
	/// Checks the password.
	source: Arc<S>,
}

impl<S: IdentitySource> CrowdAuthenticator<S> {
	/// Create an authenticator for users in `layout`.
	#[must_use]
	pub fn new(layout: Layout, source: Arc<S>) -> Self {
		Self { layout, source }
	}

	/// The user name a bind DN refers to.
	fn user_name<'a>(&self, bind_dn: &'a Dn) -> Result<&'a str, Error> {
		match bind_dn.rdn() {
			Some(rdn) if rdn.is_type(USER_ID_ATTR) && bind_dn.is_child_of(self.layout.users()) => {
				Ok(rdn.value())
			}
			_ => Err(Error::InvalidBindDn(bind_dn.to_string())),
		}
	}
}

#[async_trait]
impl<S: IdentitySource> Authenticator for CrowdAuthenticator<S> {
	fn mechanism(&self) -> &'static str {
		"simple"
	}

	async fn authenticate(&self, bind_dn: &Dn, credentials: &[u8]) -> Result<LdapPrincipal, Error> {
		let name = self.user_name(bind_dn)?;
		let password = match std::str::from_utf8(credentials) {
			Ok(password) if !password.is_empty() => SecretString::new(password.to_owned()),
			_ => {
				warn!("Bind as {name} with empty or undecodable password");
				return Err(Error::AuthenticationFailure(name.to_owned()));
			}
		};

		match self.source.authenticate_user(name, &password).await {
			Ok(user) => {
				debug!("Authenticated {}", user.name);
				Ok(LdapPrincipal { dn: bind_dn.clone(), level: AuthenticationLevel::Simple })
			}
			Err(SourceError::Rejected(reason)) => {
				warn!("Bind as {name} rejected: {reason}");
				Err(Error::AuthenticationFailure(name.to_owned()))
			}
			Err(err) => Err(Error::Remote(err)),
		}
	}
}
