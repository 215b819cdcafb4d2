//! Courier-level error types shared across the handshake, refresh guard, sweep, and stores.

// self
use crate::{_prelude::*, auth::UserIdentity};

/// Courier-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Boxed error used for collaborator failures the courier does not classify further.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical courier error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Storage-layer failure outside of a guarded credential write.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Email address could not be used as a user identity.
	#[error(transparent)]
	InvalidIdentity(#[from] crate::auth::IdentifierError),

	/// The callback `state` is unknown, already consumed, or expired.
	#[error("Login state is invalid: {reason}.")]
	InvalidState {
		/// Why the state was rejected.
		reason: String,
	},
	/// The authorization server rejected (or never answered) the code exchange.
	#[error("Authorization code exchange failed.")]
	ExchangeFailed(#[source] GrantError),
	/// A silent refresh through the token source failed.
	#[error("Refreshing the access token failed.")]
	RefreshFailed(#[source] GrantError),
	/// A stored token could not be decoded into a credential.
	#[error("Stored token for {identity} is malformed.")]
	DeserializeFailed {
		/// Owner of the malformed token.
		identity: UserIdentity,
		/// Decoder failure.
		#[source]
		source: serde_json::Error,
	},
	/// A rotated credential could not be written back after a successful remote call.
	#[error("Rotated credential for {identity} could not be persisted.")]
	PersistFailed {
		/// Owner of the rotated credential.
		identity: UserIdentity,
		/// Store failure.
		#[source]
		source: crate::store::StoreError,
	},
	/// The data-fetch collaborator failed.
	#[error("Fetching user data failed: {message}.")]
	FetchFailed {
		/// Short description of the failure.
		message: String,
		/// Underlying failure, when one exists.
		#[source]
		source: Option<BoxError>,
	},
	/// The notify collaborator failed.
	#[error("Delivering the notification failed: {message}.")]
	NotifyFailed {
		/// Short description of the failure.
		message: String,
		/// Underlying failure, when one exists.
		#[source]
		source: Option<BoxError>,
	},
}
impl Error {
	/// Builds an [`Error::InvalidState`] with the provided reason.
	pub fn invalid_state(reason: impl Into<String>) -> Self {
		Self::InvalidState { reason: reason.into() }
	}

	/// Wraps a collaborator failure as [`Error::FetchFailed`].
	pub fn fetch_failed(
		message: impl Into<String>,
		source: impl 'static + Send + Sync + std::error::Error,
	) -> Self {
		Self::FetchFailed { message: message.into(), source: Some(Box::new(source)) }
	}

	/// Wraps a collaborator failure as [`Error::NotifyFailed`].
	pub fn notify_failed(
		message: impl Into<String>,
		source: impl 'static + Send + Sync + std::error::Error,
	) -> Self {
		Self::NotifyFailed { message: message.into(), source: Some(Box::new(source)) }
	}

	/// HTTP status the callback surface should answer with for this error.
	///
	/// Only [`Error::InvalidState`] is a client error (401); everything else is a 500.
	pub fn http_status(&self) -> u16 {
		match self {
			Self::InvalidState { .. } => 401,
			_ => 500,
		}
	}
}

/// Classified failure returned by token endpoint calls (code exchange and refresh).
#[derive(Debug, ThisError)]
pub enum GrantError {
	/// Local configuration problem while building or reading the request.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Temporary upstream failure; retry with backoff.
	#[error(transparent)]
	Transient(#[from] TransientError),
	/// Transport failure (DNS, TCP, TLS).
	#[error(transparent)]
	Transport(#[from] TransportError),

	/// Requested scopes exceed what was granted.
	#[error("Token lacks the required scopes: {reason}.")]
	InsufficientScope {
		/// Provider- or courier-supplied reason string.
		reason: String,
	},
	/// Provider rejected the grant (e.g., bad code or burned refresh token).
	#[error("Provider rejected the grant: {reason}.")]
	InvalidGrant {
		/// Provider- or courier-supplied reason string.
		reason: String,
	},
	/// Client authentication failed or credentials are malformed.
	#[error("Client authentication failed: {reason}.")]
	InvalidClient {
		/// Provider- or courier-supplied reason string.
		reason: String,
	},
}

/// Configuration and validation failures raised by the courier.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// HTTP request construction failed.
	#[error(transparent)]
	HttpRequest(#[from] oauth2::http::Error),
	/// Provider descriptor contains an invalid URL.
	#[error("Descriptor contains an invalid URL.")]
	InvalidDescriptor {
		/// Underlying parsing failure.
		#[source]
		source: oauth2::url::ParseError,
	},
	/// Redirect URI cannot be parsed.
	#[error("Redirect URI is invalid.")]
	InvalidRedirect {
		/// Underlying parsing failure.
		#[source]
		source: oauth2::url::ParseError,
	},
	/// Provider descriptor failed validation.
	#[error(transparent)]
	Descriptor(#[from] crate::provider::ProviderDescriptorError),
	/// Configuration document could not be read.
	#[error("Configuration file {path} could not be read.")]
	ReadConfig {
		/// Path that failed to load.
		path: String,
		/// IO failure.
		#[source]
		source: std::io::Error,
	},
	/// Configuration document is not valid JSON for the expected shape.
	#[error("Configuration is invalid at `{path}`.")]
	ParseConfig {
		/// JSON path of the offending field.
		path: String,
		/// Decoder failure.
		#[source]
		source: serde_json::Error,
	},
	/// Provider identifier in the configuration is invalid.
	#[error("Provider identifier is invalid.")]
	InvalidProviderId {
		/// Validation failure.
		#[source]
		source: crate::auth::IdentifierError,
	},
	/// Resource URL template does not produce a valid URL.
	#[error("Resource URL template is invalid.")]
	InvalidResourceUrl {
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Schedule expression is not supported.
	#[error("Schedule `{expression}` is not supported: {reason}.")]
	InvalidSchedule {
		/// Raw schedule expression.
		expression: String,
		/// Why it was rejected.
		reason: &'static str,
	},

	/// Descriptor does not enable the requested grant.
	#[error("Descriptor `{descriptor}` does not enable the {grant} grant.")]
	UnsupportedGrant {
		/// Provider identifier string.
		descriptor: String,
		/// Disabled grant label.
		grant: &'static str,
	},
	/// Credential is missing a refresh secret.
	#[error("Credential is missing a refresh token.")]
	MissingRefreshToken,
	/// Request scopes cannot be normalized.
	#[error("Requested scopes are invalid.")]
	InvalidScope(#[from] crate::auth::ScopeValidationError),
	/// Credential builder validation failed.
	#[error("Unable to build credential.")]
	CredentialBuild(#[from] crate::auth::CredentialBuilderError),
	/// Token endpoint returned an excessively large `expires_in`.
	#[error("The expires_in value exceeds the supported range.")]
	ExpiresInOutOfRange,
	/// Token endpoint returned a non-positive duration.
	#[error("The expires_in value must be positive.")]
	NonPositiveExpiresIn,
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Temporary failure variants (safe to retry).
#[derive(Debug, ThisError)]
pub enum TransientError {
	/// Provider returned an unexpected but non-fatal response.
	#[error("Token endpoint returned an unexpected response: {message}.")]
	TokenEndpoint {
		/// Provider- or courier-supplied message summarizing the failure.
		message: String,
		/// HTTP status code, when available.
		status: Option<u16>,
		/// Retry-After hint from upstream, if supplied.
		retry_after: Option<Duration>,
	},
	/// Token endpoint responded with malformed JSON that could not be parsed.
	#[error("Token endpoint returned malformed JSON.")]
	TokenResponseParse {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::error::Error>,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
}

/// Transport-level failures (network, IO).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the token endpoint.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling the token endpoint.")]
	Io(#[from] std::io::Error),
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		Self::network(e)
	}
}
