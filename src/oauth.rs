//! `oauth2` client facade for the two token endpoint calls the courier makes.
//!
//! [`BasicFacade`] wraps a configured [`BasicClient`] and turns every failure into a
//! [`GrantError`], using the provider strategy for OAuth error bodies and a
//! [`TransportErrorMapper`] for transport failures.

pub use oauth2;

// crates.io
use oauth2::{
	AuthType, AuthUrl, AuthorizationCode, ClientId, ClientSecret, EndpointNotSet, EndpointSet,
	HttpClientError, PkceCodeVerifier, RedirectUrl, RefreshToken, RequestTokenError, TokenResponse,
	TokenUrl,
	basic::{BasicClient, BasicErrorResponse, BasicRequestTokenError, BasicTokenResponse},
};
// self
use crate::{
	_prelude::*,
	auth::{Credential, ScopeSet},
	error::{ConfigError, GrantError, TransientError, TransportError},
	http::{ResponseMetadata, ResponseMetadataSlot, TokenHttpClient},
	provider::{
		ClientAuthMethod, GrantType, ProviderDescriptor, ProviderErrorContext, ProviderErrorKind,
		ProviderStrategy,
	},
};

type ConfiguredBasicClient =
	BasicClient<EndpointSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;
type FacadeFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, GrantError>> + 'a + Send>>;

/// Maps HTTP transport failures into [`GrantError`] values.
pub trait TransportErrorMapper<E>
where
	Self: 'static + Send + Sync,
	E: 'static + Send + Sync + StdError,
{
	/// Converts an [`HttpClientError`] emitted by the transport.
	fn map_transport_error(
		&self,
		grant: GrantType,
		metadata: Option<&ResponseMetadata>,
		error: HttpClientError<E>,
	) -> GrantError;
}

/// Default mapper for reqwest-backed transports.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug, Default)]
pub struct ReqwestTransportErrorMapper;
#[cfg(feature = "reqwest")]
impl TransportErrorMapper<ReqwestError> for ReqwestTransportErrorMapper {
	fn map_transport_error(
		&self,
		grant: GrantType,
		meta: Option<&ResponseMetadata>,
		err: HttpClientError<ReqwestError>,
	) -> GrantError {
		match err {
			HttpClientError::Reqwest(inner) => map_reqwest_error(grant, meta, *inner),
			HttpClientError::Http(inner) => ConfigError::from(inner).into(),
			HttpClientError::Io(inner) => TransportError::Io(inner).into(),
			HttpClientError::Other(message) => endpoint_failure(
				grant,
				meta,
				format!("HTTP client error occurred while calling the token endpoint: {message}"),
			),
			_ => endpoint_failure(
				grant,
				meta,
				"HTTP client error occurred while calling the token endpoint".into(),
			),
		}
	}
}

/// Token endpoint facade bound to one client registration.
pub(crate) struct BasicFacade<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	oauth_client: ConfiguredBasicClient,
	http_client: Arc<C>,
	error_mapper: Arc<M>,
}
impl<C, M> BasicFacade<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	pub(crate) fn from_descriptor(
		descriptor: &ProviderDescriptor,
		client_id: &str,
		client_secret: Option<&str>,
		redirect_uri: &Url,
		http_client: Arc<C>,
		error_mapper: Arc<M>,
	) -> Result<Self, ConfigError> {
		let auth_url = AuthUrl::new(descriptor.endpoints.authorization.to_string())
			.map_err(|source| ConfigError::InvalidDescriptor { source })?;
		let token_url = TokenUrl::new(descriptor.endpoints.token.to_string())
			.map_err(|source| ConfigError::InvalidDescriptor { source })?;
		let redirect_url = RedirectUrl::new(redirect_uri.to_string())
			.map_err(|source| ConfigError::InvalidRedirect { source })?;
		let mut oauth_client = BasicClient::new(ClientId::new(client_id.to_owned()))
			.set_auth_uri(auth_url)
			.set_token_uri(token_url)
			.set_redirect_uri(redirect_url);

		match (descriptor.preferred_client_auth_method, client_secret) {
			(ClientAuthMethod::NoneWithPkce, _) | (_, None) => {},
			(method, Some(secret)) => {
				oauth_client = oauth_client.set_client_secret(ClientSecret::new(secret.to_owned()));

				if method == ClientAuthMethod::ClientSecretPost {
					oauth_client = oauth_client.set_auth_type(AuthType::RequestBody);
				}
			},
		}

		Ok(Self { oauth_client, http_client, error_mapper })
	}

	/// Exchanges an authorization code (plus its PKCE verifier) for a credential.
	pub(crate) fn exchange_authorization_code<'a>(
		&'a self,
		strategy: &'a dyn ProviderStrategy,
		code: &'a str,
		pkce_verifier: &'a str,
		requested_scope: &'a ScopeSet,
	) -> FacadeFuture<'a, Credential> {
		let meta = ResponseMetadataSlot::default();

		Box::pin(async move {
			const GRANT: GrantType = GrantType::AuthorizationCode;

			let handle = self.http_client.with_metadata(meta.clone());
			let mut request = self
				.oauth_client
				.exchange_code(AuthorizationCode::new(code.to_owned()))
				.set_pkce_verifier(PkceCodeVerifier::new(pkce_verifier.to_owned()));

			for (key, value) in augmented_form(strategy, GRANT) {
				request = request.add_extra_param(key, value);
			}

			let response = request.request_async(&handle).await.map_err(|err| {
				map_request_error(strategy, GRANT, meta.take(), err, self.error_mapper.as_ref())
			})?;

			build_credential(response, requested_scope, None)
		})
	}

	/// Redeems a refresh token; returns the credential and whether a new refresh token was issued.
	///
	/// No `scope` is sent, so the provider keeps the original grant. When the provider omits a
	/// refresh token, `refresh_token` is carried into the credential.
	pub(crate) fn refresh_token<'a>(
		&'a self,
		strategy: &'a dyn ProviderStrategy,
		refresh_token: &'a str,
		requested_scope: &'a ScopeSet,
	) -> FacadeFuture<'a, (Credential, bool)> {
		let meta = ResponseMetadataSlot::default();

		Box::pin(async move {
			const GRANT: GrantType = GrantType::RefreshToken;

			let handle = self.http_client.with_metadata(meta.clone());
			let refresh_secret = RefreshToken::new(refresh_token.to_owned());
			let mut request = self.oauth_client.exchange_refresh_token(&refresh_secret);

			for (key, value) in augmented_form(strategy, GRANT) {
				request = request.add_extra_param(key, value);
			}

			let response = request.request_async(&handle).await.map_err(|err| {
				map_request_error(strategy, GRANT, meta.take(), err, self.error_mapper.as_ref())
			})?;
			let rotated_refresh = response.refresh_token().is_some();
			let credential = build_credential(response, requested_scope, Some(refresh_token))?;

			Ok((credential, rotated_refresh))
		})
	}
}

fn augmented_form(strategy: &dyn ProviderStrategy, grant: GrantType) -> BTreeMap<String, String> {
	let mut form = BTreeMap::new();

	strategy.augment_token_request(grant, &mut form);

	form
}

fn build_credential(
	response: BasicTokenResponse,
	requested_scope: &ScopeSet,
	previous_refresh: Option<&str>,
) -> Result<Credential, GrantError> {
	let issued_at = OffsetDateTime::now_utc();
	let scope = match response.scopes() {
		Some(scopes) =>
			ScopeSet::new(scopes.iter().map(|scope| scope.as_ref())).map_err(ConfigError::from)?,
		None => requested_scope.clone(),
	};
	let mut builder = Credential::builder()
		.access_token(response.access_token().secret().to_owned())
		.issued_at(issued_at)
		.scope(scope);

	if let Some(expires_in) = response.expires_in() {
		let secs =
			i64::try_from(expires_in.as_secs()).map_err(|_| ConfigError::ExpiresInOutOfRange)?;

		if secs <= 0 {
			return Err(ConfigError::NonPositiveExpiresIn.into());
		}

		builder = builder.expires_in(Duration::seconds(secs));
	}

	match (response.refresh_token(), previous_refresh) {
		(Some(fresh), _) => builder = builder.refresh_token(fresh.secret().to_owned()),
		(None, Some(previous)) => builder = builder.refresh_token(previous),
		(None, None) => {},
	}

	builder.build().map_err(|err| ConfigError::from(err).into())
}

fn map_request_error<E, M>(
	strategy: &dyn ProviderStrategy,
	grant: GrantType,
	meta: Option<ResponseMetadata>,
	err: BasicRequestTokenError<HttpClientError<E>>,
	mapper: &M,
) -> GrantError
where
	E: 'static + Send + Sync + StdError,
	M: ?Sized + TransportErrorMapper<E>,
{
	let meta = meta.as_ref();

	match err {
		RequestTokenError::ServerResponse(response) =>
			map_server_response(strategy, grant, response, meta),
		RequestTokenError::Request(error) => mapper.map_transport_error(grant, meta, error),
		RequestTokenError::Parse(source, body) => match meta_status(meta) {
			// Non-JSON error pages still get classified by status and body hints.
			Some(status) if status >= 400 => {
				let ctx = ProviderErrorContext::new(grant)
					.with_http_status(status)
					.with_body_preview(String::from_utf8_lossy(&body));

				classify(strategy, &ctx, meta, format!("Token endpoint answered HTTP {status}"))
			},
			status => TransientError::TokenResponseParse { source, status }.into(),
		},
		RequestTokenError::Other(message) => endpoint_failure(grant, meta, message),
	}
}

fn map_server_response(
	strategy: &dyn ProviderStrategy,
	grant: GrantType,
	response: BasicErrorResponse,
	meta: Option<&ResponseMetadata>,
) -> GrantError {
	let mut ctx =
		ProviderErrorContext::new(grant).with_oauth_error(response.error().as_ref().to_owned());

	if let Some(description) = response.error_description() {
		ctx = ctx.with_error_description(description.clone());
	}
	if let Some(status) = meta_status(meta) {
		ctx = ctx.with_http_status(status);
	}

	let message = match response.error_description() {
		Some(description) => format!("{}: {description}", response.error().as_ref()),
		None => response.error().as_ref().to_owned(),
	};

	classify(strategy, &ctx, meta, message)
}

fn classify(
	strategy: &dyn ProviderStrategy,
	ctx: &ProviderErrorContext,
	meta: Option<&ResponseMetadata>,
	reason: String,
) -> GrantError {
	match strategy.classify_token_error(ctx) {
		ProviderErrorKind::InvalidGrant => GrantError::InvalidGrant { reason },
		ProviderErrorKind::InvalidClient => GrantError::InvalidClient { reason },
		ProviderErrorKind::InsufficientScope => GrantError::InsufficientScope { reason },
		ProviderErrorKind::Transient => endpoint_failure(ctx.grant_type, meta, reason),
	}
}

#[cfg(feature = "reqwest")]
fn map_reqwest_error(
	grant: GrantType,
	meta: Option<&ResponseMetadata>,
	err: ReqwestError,
) -> GrantError {
	if err.is_builder() {
		return ConfigError::from(err).into();
	}
	if err.is_timeout() {
		return endpoint_failure(
			grant,
			meta,
			"Request timed out while calling the token endpoint".into(),
		);
	}

	TransportError::from(err).into()
}

fn endpoint_failure(grant: GrantType, meta: Option<&ResponseMetadata>, message: String) -> GrantError {
	TransientError::TokenEndpoint {
		message: format!("{grant}: {message}"),
		status: meta_status(meta),
		retry_after: meta.and_then(|value| value.retry_after),
	}
	.into()
}

fn meta_status(meta: Option<&ResponseMetadata>) -> Option<u16> {
	meta.and_then(|value| value.status)
}
