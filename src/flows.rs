//! Credential flows: the login handshake and the refresh guard.

pub mod common;
pub mod guard;
pub mod handshake;

pub use common::*;
pub use guard::*;
pub use handshake::*;

// self
use crate::{
	_prelude::*,
	auth::ScopeSet,
	error::ConfigError,
	http::TokenHttpClient,
	oauth::{BasicFacade, TransportErrorMapper},
	provider::{ProviderDescriptor, ProviderStrategy},
	store::CredentialStore,
};
#[cfg(feature = "reqwest")]
use crate::{http::ReqwestHttpClient, oauth::ReqwestTransportErrorMapper};

/// Broker specialized for the crate's default reqwest transport stack.
#[cfg(feature = "reqwest")]
pub type ReqwestBroker = Broker<ReqwestHttpClient, ReqwestTransportErrorMapper>;

/// Links user accounts against one authorization server.
///
/// The broker owns every collaborator the handshake and the refresh path need. Nothing is global;
/// two brokers never share state unless they share a store.
#[derive(Clone)]
pub struct Broker<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// HTTP client used for every token endpoint call.
	pub http_client: Arc<C>,
	/// Mapper applied to transport-layer errors.
	pub transport_mapper: Arc<M>,
	/// Store holding one record per linked user.
	pub store: Arc<dyn CredentialStore>,
	/// Provider endpoints and quirks.
	pub descriptor: ProviderDescriptor,
	/// Provider-specific request decoration and error classification.
	pub strategy: Arc<dyn ProviderStrategy>,
	/// OAuth 2.0 client identifier.
	pub client_id: String,
	/// Client secret for confidential authentication methods.
	pub client_secret: Option<String>,
	/// Callback URL registered with the provider.
	pub redirect_uri: Url,
	/// Scopes requested on every login.
	pub scope: ScopeSet,
	/// How long an issued state stays valid.
	pub state_ttl: Duration,
	identity_locks: IdentityLocks,
}
impl<C, M> Broker<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Default lifetime of a login state.
	pub const DEFAULT_STATE_TTL: Duration = Duration::minutes(10);

	/// Creates a broker that reuses the caller-provided transport + mapper pair.
	pub fn with_http_client(
		store: Arc<dyn CredentialStore>,
		descriptor: ProviderDescriptor,
		strategy: Arc<dyn ProviderStrategy>,
		client_id: impl Into<String>,
		redirect_uri: Url,
		http_client: impl Into<Arc<C>>,
		mapper: impl Into<Arc<M>>,
	) -> Self {
		Self {
			http_client: http_client.into(),
			transport_mapper: mapper.into(),
			store,
			descriptor,
			strategy,
			client_id: client_id.into(),
			client_secret: None,
			redirect_uri,
			scope: ScopeSet::default(),
			state_ttl: Self::DEFAULT_STATE_TTL,
			identity_locks: IdentityLocks::default(),
		}
	}

	/// Sets or replaces the client secret used for confidential client auth modes.
	pub fn with_client_secret(mut self, secret: impl Into<String>) -> Self {
		self.client_secret = Some(secret.into());

		self
	}

	/// Sets the scopes requested on login.
	pub fn with_scope(mut self, scope: ScopeSet) -> Self {
		self.scope = scope;

		self
	}

	/// Overrides how long an issued state stays valid; negative values clamp to zero.
	pub fn with_state_ttl(mut self, ttl: Duration) -> Self {
		self.state_ttl = if ttl.is_negative() { Duration::ZERO } else { ttl };

		self
	}

	/// Builds a [`RefreshGuard`] that writes to this broker's store and serializes with its
	/// handshakes for the same user.
	pub fn refresh_guard(&self) -> RefreshGuard {
		RefreshGuard::with_locks(self.store.clone(), self.identity_locks.clone())
	}

	fn facade(&self) -> Result<BasicFacade<C, M>, ConfigError> {
		BasicFacade::from_descriptor(
			&self.descriptor,
			&self.client_id,
			self.client_secret.as_deref(),
			&self.redirect_uri,
			self.http_client.clone(),
			self.transport_mapper.clone(),
		)
	}
}
#[cfg(feature = "reqwest")]
impl Broker<ReqwestHttpClient, ReqwestTransportErrorMapper> {
	/// Creates a broker with its own reqwest transport.
	///
	/// Use [`Broker::with_client_secret`] to attach a confidential client secret.
	pub fn new(
		store: Arc<dyn CredentialStore>,
		descriptor: ProviderDescriptor,
		strategy: Arc<dyn ProviderStrategy>,
		client_id: impl Into<String>,
		redirect_uri: Url,
	) -> Self {
		Self::with_http_client(
			store,
			descriptor,
			strategy,
			client_id,
			redirect_uri,
			ReqwestHttpClient::default(),
			Arc::new(ReqwestTransportErrorMapper),
		)
	}
}
impl<C, M> Debug for Broker<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Broker")
			.field("descriptor", &self.descriptor)
			.field("client_id", &self.client_id)
			.field("client_secret_set", &self.client_secret.is_some())
			.field("redirect_uri", &self.redirect_uri.as_str())
			.field("scope", &self.scope)
			.field("state_ttl", &self.state_ttl)
			.finish()
	}
}
