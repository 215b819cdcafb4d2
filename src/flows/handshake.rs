//! Authorization Code + PKCE handshake that links a user's third-party account.
//!
//! [`Broker::begin_login`] stores a pending record and returns the authorize URL;
//! [`Broker::complete_login`] validates the callback `state` (the CSRF check), exchanges the code,
//! and attaches the credential. A successful handshake writes to the store exactly once per step;
//! every failure path leaves the store untouched.

// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::{Rng, distr::Alphanumeric};
use sha2::{Digest, Sha256};
// self
use crate::{
	_prelude::*,
	auth::{LoginState, StateToken, UserIdentity, UserRecord},
	flows::{Broker, common},
	http::TokenHttpClient,
	oauth::TransportErrorMapper,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	provider::GrantType,
	store::StoreError,
};

const PKCE_VERIFIER_LEN: usize = 64;
const PKCE_METHOD: &str = "S256";

/// Where to send the browser to start a login.
#[derive(Clone, Debug)]
pub struct LoginRedirect {
	/// Fully-formed HTTPS authorize URL.
	pub authorize_url: Url,
	/// State embedded in the URL; the callback must echo it.
	pub state: StateToken,
}

struct PkcePair {
	verifier: String,
	challenge: String,
}
impl PkcePair {
	fn generate() -> Self {
		let verifier: String =
			rand::rng().sample_iter(Alphanumeric).take(PKCE_VERIFIER_LEN).map(char::from).collect();
		let challenge = URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()));

		Self { verifier, challenge }
	}
}

impl<C, M> Broker<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Issues a fresh state for a login form to embed.
	///
	/// Nothing is stored until the form is submitted to [`Broker::begin_login_with_state`].
	pub fn issue_state(&self) -> StateToken {
		StateToken::generate()
	}

	/// Starts a login for `email` with a freshly generated state.
	pub async fn begin_login(&self, email: &str) -> Result<LoginRedirect> {
		self.begin_login_with_state(email, self.issue_state()).await
	}

	/// Starts a login for `email` using a caller-supplied state.
	///
	/// The record for `email` keeps its existing token; its previous state (if any) is superseded
	/// and stops validating. A state already used by another user, or one that was consumed or
	/// superseded before, is rejected with [`Error::InvalidState`].
	pub async fn begin_login_with_state(
		&self,
		email: &str,
		state: StateToken,
	) -> Result<LoginRedirect> {
		const KIND: FlowKind = FlowKind::AuthorizationCode;

		let span = FlowSpan::new(KIND, "begin_login");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span
			.instrument(async move {
				common::ensure_grant(&self.descriptor, GrantType::AuthorizationCode)?;

				let identity = UserIdentity::new(email)?;
				let lock = self.identity_locks.for_identity(&identity);
				let _serialized = lock.lock().await;

				if let Some(existing) = self.store.get_by_state(&state).await? {
					if existing.identity != identity {
						return Err(Error::invalid_state("state belongs to another login"));
					}
					if existing.state.as_ref().is_some_and(LoginState::is_consumed) {
						return Err(Error::invalid_state("state was already used"));
					}
				}

				let pkce = PkcePair::generate();
				let login = LoginState::new(state.clone(), OffsetDateTime::now_utc())
					.with_pkce_verifier(pkce.verifier);
				let record = self
					.store
					.get_by_identity(&identity)
					.await?
					.unwrap_or_else(|| UserRecord::new(identity.clone()))
					.with_state(login);

				self.store.upsert(record).await.map_err(|e| match e {
					StoreError::StateConflict =>
						Error::invalid_state("state belongs to another login"),
					StoreError::StateRetired => Error::invalid_state("state was already used"),
					e => e.into(),
				})?;

				tracing::info!(identity = %identity, "Login started.");

				Ok(LoginRedirect {
					authorize_url: self.authorize_url(&state, &pkce.challenge),
					state,
				})
			})
			.await;

		obs::record_flow_outcome(KIND, FlowOutcome::of(&result));

		result
	}

	/// Completes a login from the provider callback.
	///
	/// Fails with [`Error::InvalidState`] if `state` is unknown, superseded, consumed, or older
	/// than the broker's state TTL, and with [`Error::ExchangeFailed`] if the token endpoint
	/// rejects the code. On success the state is consumed and the new credential attached.
	pub async fn complete_login(&self, state: &str, code: &str) -> Result<UserRecord> {
		const KIND: FlowKind = FlowKind::AuthorizationCode;

		let span = FlowSpan::new(KIND, "complete_login");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span
			.instrument(async move {
				let state =
					StateToken::new(state).map_err(|_| Error::invalid_state("state is malformed"))?;
				let identity = self
					.store
					.get_by_state(&state)
					.await?
					.map(|record| record.identity)
					.ok_or_else(|| Error::invalid_state("state is unknown"))?;
				let lock = self.identity_locks.for_identity(&identity);
				let _serialized = lock.lock().await;
				// Re-read under the lock; a concurrent login may have superseded this state.
				let record = self
					.store
					.get_by_identity(&identity)
					.await?
					.filter(|record| record.state_value() == Some(&state))
					.ok_or_else(|| Error::invalid_state("state was superseded"))?;
				let mut login = record.state.clone().ok_or_else(|| {
					Error::invalid_state("state was superseded")
				})?;
				let now = OffsetDateTime::now_utc();

				if login.is_consumed() {
					return Err(Error::invalid_state("state was already used"));
				}
				if !login.is_live_at(now, self.state_ttl) {
					return Err(Error::invalid_state("state expired"));
				}

				let verifier = login
					.pkce_verifier
					.clone()
					.ok_or_else(|| Error::invalid_state("state has no PKCE verifier"))?;
				let facade = self.facade()?;
				let credential = facade
					.exchange_authorization_code(
						self.strategy.as_ref(),
						code,
						verifier.expose(),
						&self.scope,
					)
					.await
					.map_err(Error::ExchangeFailed)?;
				let token = credential.serialize().map_err(|e| StoreError::Serialization {
					message: format!("Failed to serialize credential: {e}"),
				})?;

				login.consume(now);

				let linked = record.with_state(login).with_token(token);

				self.store.upsert(linked.clone()).await?;

				tracing::info!(identity = %identity, "Login completed.");

				Ok(linked)
			})
			.await;

		if let Err(err) = &result {
			tracing::warn!(error = %err, "Login callback rejected.");
		}

		obs::record_flow_outcome(KIND, FlowOutcome::of(&result));

		result
	}

	fn authorize_url(&self, state: &StateToken, challenge: &str) -> Url {
		let mut url = self.descriptor.endpoints.authorization.clone();
		let mut pairs = url.query_pairs_mut();

		pairs.append_pair("response_type", "code");
		pairs.append_pair("client_id", &self.client_id);
		pairs.append_pair("redirect_uri", self.redirect_uri.as_str());

		if let Some(scope) = self.scope.delimited(self.descriptor.quirks.scope_delimiter) {
			pairs.append_pair("scope", &scope);
		}

		pairs.append_pair("state", state);
		pairs.append_pair("code_challenge", challenge);
		pairs.append_pair("code_challenge_method", PKCE_METHOD);

		if self.descriptor.quirks.request_offline_access {
			pairs.append_pair("access_type", "offline");
		}

		drop(pairs);

		url
	}
}
