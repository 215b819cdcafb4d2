//! Refresh guard: makes sure a rotated credential is written back before a call returns.
//!
//! Some providers issue single-use refresh tokens. If the token a refresh returns is not stored
//! immediately, the next refresh fails and the user has to link their account again.
//! [`RefreshGuard::with_guarded_credential`] snapshots the access token before running an
//! operation against a [`TokenSource`], compares it afterwards, and persists the new credential
//! under the user's lock when it changed.

mod metrics;

pub use metrics::GuardMetrics;

// self
use crate::{
	_prelude::*,
	auth::{Credential, ProviderId, ScopeSet, UserIdentity, UserRecord},
	error::ConfigError,
	flows::{Broker, IdentityLocks},
	http::TokenHttpClient,
	oauth::{BasicFacade, TransportErrorMapper},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	provider::{GrantType, ProviderStrategy},
	store::{CredentialStore, StoreError},
};

/// Boxed future returned by [`TokenSource::token`].
pub type TokenFuture<'a> = Pin<Box<dyn Future<Output = Result<Credential>> + 'a + Send>>;

/// Supplies a valid access token, refreshing silently when needed.
pub trait TokenSource
where
	Self: Send + Sync,
{
	/// Returns a usable credential, refreshing first if the current one is expired.
	///
	/// Refresh failures surface as [`Error::RefreshFailed`].
	fn token(&self) -> TokenFuture<'_>;

	/// Returns the credential currently held, without refreshing.
	fn current(&self) -> Credential;
}

/// Builds token sources for stored credentials.
pub trait TokenSourceFactory
where
	Self: Send + Sync,
{
	/// Token source produced by this factory.
	type Source: 'static + TokenSource;

	/// Wraps `credential` in a token source.
	fn token_source(&self, credential: Credential) -> Result<Self::Source>;
}

/// OAuth-backed [`TokenSource`] that redeems the refresh token at the provider.
///
/// Concurrent callers share one refresh: the first caller refreshes, the rest wait and reuse
/// its result.
pub struct RefreshingTokenSource<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	facade: BasicFacade<C, M>,
	strategy: Arc<dyn ProviderStrategy>,
	provider: ProviderId,
	refresh_enabled: bool,
	scope: ScopeSet,
	leeway: Duration,
	current: RwLock<Credential>,
	refresh_lock: AsyncMutex<()>,
}
impl<C, M> RefreshingTokenSource<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Refresh this long before the access token actually expires.
	pub const DEFAULT_LEEWAY: Duration = Duration::seconds(60);

	/// Overrides the refresh leeway; negative values clamp to zero.
	pub fn with_leeway(mut self, leeway: Duration) -> Self {
		self.leeway = if leeway.is_negative() { Duration::ZERO } else { leeway };

		self
	}

	fn needs_refresh(&self, credential: &Credential) -> bool {
		credential.expires_within(OffsetDateTime::now_utc(), self.leeway)
	}

	async fn refresh(&self) -> Result<Credential> {
		let _singleflight = self.refresh_lock.lock().await;
		let snapshot = self.current.read().clone();

		// Another caller may have refreshed while this one waited.
		if !self.needs_refresh(&snapshot) {
			return Ok(snapshot);
		}
		if !self.refresh_enabled {
			return Err(Error::RefreshFailed(
				ConfigError::UnsupportedGrant {
					descriptor: self.provider.to_string(),
					grant: GrantType::RefreshToken.as_str(),
				}
				.into(),
			));
		}

		let refresh_token = snapshot
			.refresh_token
			.as_ref()
			.ok_or_else(|| Error::RefreshFailed(ConfigError::MissingRefreshToken.into()))?;
		let (fresh, rotated_refresh) = self
			.facade
			.refresh_token(self.strategy.as_ref(), refresh_token.expose(), &self.scope)
			.await
			.map_err(Error::RefreshFailed)?;

		tracing::debug!(rotated_refresh, "Access token refreshed.");

		*self.current.write() = fresh.clone();

		Ok(fresh)
	}
}
impl<C, M> TokenSource for RefreshingTokenSource<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn token(&self) -> TokenFuture<'_> {
		Box::pin(async move {
			let current = self.current.read().clone();

			if self.needs_refresh(&current) { self.refresh().await } else { Ok(current) }
		})
	}

	fn current(&self) -> Credential {
		self.current.read().clone()
	}
}
impl<C, M> Debug for RefreshingTokenSource<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RefreshingTokenSource")
			.field("current", &*self.current.read())
			.field("leeway", &self.leeway)
			.finish()
	}
}

impl<C, M> TokenSourceFactory for Broker<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	type Source = RefreshingTokenSource<C, M>;

	fn token_source(&self, credential: Credential) -> Result<Self::Source> {
		Ok(RefreshingTokenSource {
			facade: self.facade()?,
			strategy: self.strategy.clone(),
			provider: self.descriptor.id.clone(),
			refresh_enabled: self.descriptor.supports(GrantType::RefreshToken),
			scope: credential.scope.clone(),
			leeway: RefreshingTokenSource::<C, M>::DEFAULT_LEEWAY,
			current: RwLock::new(credential),
			refresh_lock: AsyncMutex::new(()),
		})
	}
}

/// Persists rotated credentials before guarded calls return.
#[derive(Clone)]
pub struct RefreshGuard {
	store: Arc<dyn CredentialStore>,
	locks: IdentityLocks,
	metrics: Arc<GuardMetrics>,
}
impl RefreshGuard {
	/// Creates a guard with its own lock registry.
	///
	/// Prefer [`Broker::refresh_guard`] when a broker shares the store, so guarded calls and
	/// handshakes for the same user serialize.
	pub fn new(store: Arc<dyn CredentialStore>) -> Self {
		Self::with_locks(store, IdentityLocks::default())
	}

	pub(crate) fn with_locks(store: Arc<dyn CredentialStore>, locks: IdentityLocks) -> Self {
		Self { store, locks, metrics: Default::default() }
	}

	/// Counters for this guard (shared by clones).
	pub fn metrics(&self) -> &GuardMetrics {
		&self.metrics
	}

	/// Runs `operation` against `source` and persists the credential if it rotated.
	///
	/// Calls for the same identity serialize. The identity lock is held for the whole of
	/// `operation`, so on a guard from [`Broker::refresh_guard`] a login for the same user waits
	/// until the call returns; bound `operation` (the sweep uses its call timeout) to keep that
	/// wait short. Other identities are unaffected.
	///
	/// A rotation is written back even when `operation` fails afterwards; if that write fails the
	/// call returns [`Error::PersistFailed`], which takes precedence over the operation's own
	/// result.
	pub async fn with_guarded_credential<'s, S, T, F, Fut>(
		&self,
		identity: &UserIdentity,
		source: &'s S,
		operation: F,
	) -> Result<T>
	where
		S: ?Sized + TokenSource,
		F: FnOnce(&'s S) -> Fut,
		Fut: Future<Output = Result<T>>,
	{
		const KIND: FlowKind = FlowKind::Refresh;

		let span = FlowSpan::new(KIND, "with_guarded_credential");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);
		self.metrics.record_call();

		let result = span
			.instrument(async move {
				let lock = self.locks.for_identity(identity);
				let _serialized = lock.lock().await;
				let before = source.current().access_token;
				let outcome = operation(source).await;
				let after = source.current();

				if after.access_token != before {
					self.metrics.record_rotation();

					if let Err(err) = self.persist(identity, &after).await {
						self.metrics.record_persist_failure();

						tracing::error!(
							identity = %identity,
							error = %err,
							"Rotated credential could not be persisted; the next refresh may fail.",
						);

						return Err(Error::PersistFailed { identity: identity.clone(), source: err });
					}

					tracing::info!(identity = %identity, "Rotated credential persisted.");
				}

				outcome
			})
			.await;

		obs::record_flow_outcome(KIND, FlowOutcome::of(&result));

		result
	}

	async fn persist(
		&self,
		identity: &UserIdentity,
		credential: &Credential,
	) -> Result<(), StoreError> {
		let token = credential.serialize().map_err(|e| StoreError::Serialization {
			message: format!("Failed to serialize credential: {e}"),
		})?;
		let record = self
			.store
			.get_by_identity(identity)
			.await?
			.unwrap_or_else(|| UserRecord::new(identity.clone()))
			.with_token(token);

		self.store.upsert(record).await
	}
}
impl Debug for RefreshGuard {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RefreshGuard")
			.field("locks", &self.locks)
			.field("metrics", &self.metrics)
			.finish()
	}
}
