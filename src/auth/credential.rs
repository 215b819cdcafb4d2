//! OAuth credentials (access + refresh + expiry), their redacting secret wrapper, and the opaque
//! serialized form the store persists.

// self
use crate::{_prelude::*, auth::ScopeSet};

const DEFAULT_TOKEN_TYPE: &str = "Bearer";

/// Redacted token secret wrapper keeping sensitive material out of logs.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenSecret(String);
impl TokenSecret {
	/// Wraps a new secret string.
	pub fn new(value: impl Into<String>) -> Self {
		Self(value.into())
	}

	/// Returns the inner token value. Callers must avoid logging this string.
	pub fn expose(&self) -> &str {
		&self.0
	}
}
impl Debug for TokenSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("TokenSecret(<redacted>)")
	}
}
impl Display for TokenSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("<redacted>")
	}
}

/// Errors produced by [`CredentialBuilder`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum CredentialBuilderError {
	/// Issued when no access token value was provided.
	#[error("Access token is required.")]
	MissingAccessToken,
}

/// Access token, optional refresh token, and expiry issued by the authorization server.
///
/// A missing `expires_at` means the provider never said when the access token expires; such
/// credentials are treated as valid until the provider rejects them.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
	/// Bearer secret presented to the resource server.
	pub access_token: TokenSecret,
	/// Refresh secret; single-use on some providers.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub refresh_token: Option<TokenSecret>,
	/// Token type reported by the provider (usually `Bearer`).
	#[serde(default = "default_token_type")]
	pub token_type: String,
	/// Expiry instant of the access token.
	#[serde(default, with = "time::serde::rfc3339::option")]
	pub expires_at: Option<OffsetDateTime>,
	/// Scopes the credential was granted.
	#[serde(default)]
	pub scope: ScopeSet,
}
impl Credential {
	/// Returns a builder for assembling credentials from token endpoint responses.
	pub fn builder() -> CredentialBuilder {
		CredentialBuilder::default()
	}

	/// Returns `true` once `instant` is at or past the expiry.
	pub fn is_expired_at(&self, instant: OffsetDateTime) -> bool {
		self.expires_at.is_some_and(|expires_at| instant >= expires_at)
	}

	/// Returns `true` if the access token expires within `leeway` of `instant`.
	pub fn expires_within(&self, instant: OffsetDateTime, leeway: Duration) -> bool {
		self.expires_at.is_some_and(|expires_at| expires_at - instant <= leeway)
	}

	/// Encodes the credential into the opaque form stored on a [`crate::auth::UserRecord`].
	pub fn serialize(&self) -> Result<SerializedCredential, serde_json::Error> {
		serde_json::to_string(self).map(SerializedCredential)
	}
}
impl Debug for Credential {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Credential")
			.field("access_token", &"<redacted>")
			.field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
			.field("token_type", &self.token_type)
			.field("expires_at", &self.expires_at)
			.field("scope", &self.scope)
			.finish()
	}
}

/// Opaque serialized credential. Stores persist it verbatim and never look inside.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SerializedCredential(String);
impl SerializedCredential {
	/// Wraps an already-encoded payload (e.g. one loaded from disk).
	pub fn from_raw(raw: impl Into<String>) -> Self {
		Self(raw.into())
	}

	/// Decodes the payload back into a [`Credential`].
	pub fn decode(&self) -> Result<Credential, serde_json::Error> {
		serde_json::from_str(&self.0)
	}

	/// Raw payload. Contains secrets.
	pub fn expose(&self) -> &str {
		&self.0
	}
}
impl Debug for SerializedCredential {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "SerializedCredential(<{} bytes>)", self.0.len())
	}
}

/// Builder for [`Credential`].
#[derive(Clone, Debug, Default)]
pub struct CredentialBuilder {
	access_token: Option<TokenSecret>,
	refresh_token: Option<TokenSecret>,
	token_type: Option<String>,
	issued_at: Option<OffsetDateTime>,
	expires_at: Option<OffsetDateTime>,
	expires_in: Option<Duration>,
	scope: ScopeSet,
}
impl CredentialBuilder {
	/// Provides the access token value.
	pub fn access_token(mut self, token: impl Into<String>) -> Self {
		self.access_token = Some(TokenSecret::new(token));

		self
	}

	/// Provides the refresh token value.
	pub fn refresh_token(mut self, token: impl Into<String>) -> Self {
		self.refresh_token = Some(TokenSecret::new(token));

		self
	}

	/// Overrides the token type (defaults to `Bearer`).
	pub fn token_type(mut self, token_type: impl Into<String>) -> Self {
		self.token_type = Some(token_type.into());

		self
	}

	/// Sets the instant relative expiries are measured from (defaults to now).
	pub fn issued_at(mut self, instant: OffsetDateTime) -> Self {
		self.issued_at = Some(instant);

		self
	}

	/// Sets an absolute expiry instant.
	pub fn expires_at(mut self, instant: OffsetDateTime) -> Self {
		self.expires_at = Some(instant);

		self
	}

	/// Sets a relative expiry duration from the issued instant.
	pub fn expires_in(mut self, duration: Duration) -> Self {
		self.expires_in = Some(duration);

		self
	}

	/// Sets the granted scopes.
	pub fn scope(mut self, scope: ScopeSet) -> Self {
		self.scope = scope;

		self
	}

	/// Consumes the builder and produces a [`Credential`].
	pub fn build(self) -> Result<Credential, CredentialBuilderError> {
		let access_token = self.access_token.ok_or(CredentialBuilderError::MissingAccessToken)?;
		let expires_at = match (self.expires_at, self.expires_in) {
			(Some(instant), _) => Some(instant),
			(None, Some(delta)) =>
				Some(self.issued_at.unwrap_or_else(OffsetDateTime::now_utc) + delta),
			(None, None) => None,
		};

		Ok(Credential {
			access_token,
			refresh_token: self.refresh_token,
			token_type: self.token_type.unwrap_or_else(default_token_type),
			expires_at,
			scope: self.scope,
		})
	}
}

fn default_token_type() -> String {
	DEFAULT_TOKEN_TYPE.into()
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;

	fn fixture() -> Credential {
		Credential::builder()
			.access_token("access-1")
			.refresh_token("refresh-1")
			.issued_at(macros::datetime!(2025-01-01 00:00:00.123456789 UTC))
			.expires_in(Duration::hours(8))
			.scope(ScopeSet::new(["sleep", "profile"]).expect("Scope fixture should be valid."))
			.build()
			.expect("Credential fixture should build.")
	}

	#[test]
	fn builder_handles_relative_expiry() {
		let credential = fixture();

		assert_eq!(credential.expires_at, Some(macros::datetime!(2025-01-01 08:00:00.123456789 UTC)));
		assert_eq!(credential.token_type, "Bearer");
	}

	#[test]
	fn builder_requires_access_token() {
		assert_eq!(
			Credential::builder().refresh_token("r").build(),
			Err(CredentialBuilderError::MissingAccessToken)
		);
	}

	#[test]
	fn expiry_helpers_treat_missing_expiry_as_unbounded() {
		let credential = fixture();
		let at = macros::datetime!(2025-01-01 07:59 UTC);

		assert!(!credential.is_expired_at(at));
		assert!(credential.expires_within(at, Duration::minutes(5)));
		assert!(credential.is_expired_at(macros::datetime!(2025-01-01 08:00:01 UTC)));

		let unbounded = Credential::builder().access_token("a").build().expect("Should build.");

		assert!(!unbounded.is_expired_at(macros::datetime!(2999-01-01 00:00 UTC)));
		assert!(!unbounded.expires_within(OffsetDateTime::now_utc(), Duration::days(365)));
	}

	#[test]
	fn serialized_form_round_trips_exactly() {
		let credential = fixture();
		let encoded = credential.serialize().expect("Credential should serialize.");
		let decoded = encoded.decode().expect("Serialized credential should decode.");

		assert_eq!(decoded, credential);
		assert_eq!(decoded.expires_at, credential.expires_at);
	}

	#[test]
	fn decoding_garbage_fails() {
		assert!(SerializedCredential::from_raw("{not json").decode().is_err());
		assert!(SerializedCredential::from_raw("{\"refresh_token\":\"r\"}").decode().is_err());
	}

	#[test]
	fn formatters_redact_secrets() {
		let credential = fixture();
		let encoded = credential.serialize().expect("Credential should serialize.");

		assert!(!format!("{credential:?}").contains("access-1"));
		assert!(!format!("{encoded:?}").contains("refresh-1"));
		assert_eq!(format!("{}", credential.access_token), "<redacted>");
	}
}
