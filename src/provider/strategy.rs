//! Provider hooks that decorate token requests and classify token endpoint failures.

// self
use crate::{_prelude::*, provider::descriptor::GrantType};

/// Strategy hook that lets a provider decorate requests and classify errors.
///
/// Hooks only see crate-owned data, so implementations never depend on the HTTP stack.
pub trait ProviderStrategy: Send + Sync {
	/// Maps a failed token request into the courier's grant taxonomy.
	fn classify_token_error(&self, ctx: &ProviderErrorContext) -> ProviderErrorKind;

	/// Adds provider-specific form fields before a token request is sent.
	fn augment_token_request(&self, _grant: GrantType, _form: &mut BTreeMap<String, String>) {}
}

/// Canonical provider error categories.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProviderErrorKind {
	/// Provider rejected the grant (bad code, burned refresh token).
	InvalidGrant,
	/// Client authentication failed.
	InvalidClient,
	/// Requested scopes exceed what the token covers.
	InsufficientScope,
	/// Failure is temporary and should be retried.
	Transient,
}

/// What is known about a failed token request when it is classified.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProviderErrorContext {
	/// Grant associated with the failing request.
	pub grant_type: GrantType,
	/// HTTP status code, when available.
	pub http_status: Option<u16>,
	/// OAuth `error` field.
	pub oauth_error: Option<String>,
	/// OAuth `error_description` field.
	pub error_description: Option<String>,
	/// Truncated body for responses that were not OAuth JSON.
	pub body_preview: Option<String>,
}
impl ProviderErrorContext {
	const BODY_PREVIEW_LIMIT: usize = 256;

	/// Creates a new context scoped to the provided grant.
	pub fn new(grant_type: GrantType) -> Self {
		Self {
			grant_type,
			http_status: None,
			oauth_error: None,
			error_description: None,
			body_preview: None,
		}
	}

	/// Adds an HTTP status code.
	pub fn with_http_status(mut self, status: u16) -> Self {
		self.http_status = Some(status);

		self
	}

	/// Adds the OAuth `error` code.
	pub fn with_oauth_error(mut self, error: impl Into<String>) -> Self {
		self.oauth_error = Some(error.into());

		self
	}

	/// Adds the OAuth `error_description` field.
	pub fn with_error_description(mut self, description: impl Into<String>) -> Self {
		self.error_description = Some(description.into());

		self
	}

	/// Adds a body preview, truncated to a bounded length.
	pub fn with_body_preview(mut self, body: impl AsRef<str>) -> Self {
		let body = body.as_ref();
		let mut preview: String = body.chars().take(Self::BODY_PREVIEW_LIMIT).collect();

		if preview.len() < body.len() {
			preview.push('…');
		}

		self.body_preview = Some(preview);

		self
	}
}

/// RFC 6749 heuristics: structured OAuth fields first, then body hints, then the status code.
#[derive(Debug, Default)]
pub struct DefaultProviderStrategy;
impl Display for DefaultProviderStrategy {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("default-provider-strategy")
	}
}
impl ProviderStrategy for DefaultProviderStrategy {
	fn classify_token_error(&self, ctx: &ProviderErrorContext) -> ProviderErrorKind {
		ctx.oauth_error
			.as_deref()
			.and_then(match_error_code)
			.or_else(|| ctx.error_description.as_deref().and_then(match_error_code))
			.or_else(|| match_body(ctx.error_description.as_deref()))
			.or_else(|| match_body(ctx.body_preview.as_deref()))
			.unwrap_or_else(|| classify_status(ctx.http_status))
	}
}

fn match_error_code(value: &str) -> Option<ProviderErrorKind> {
	const TABLE: [(&str, ProviderErrorKind); 8] = [
		("invalid_grant", ProviderErrorKind::InvalidGrant),
		("access_denied", ProviderErrorKind::InvalidGrant),
		("invalid_client", ProviderErrorKind::InvalidClient),
		("unauthorized_client", ProviderErrorKind::InvalidClient),
		("invalid_scope", ProviderErrorKind::InsufficientScope),
		("insufficient_scope", ProviderErrorKind::InsufficientScope),
		("temporarily_unavailable", ProviderErrorKind::Transient),
		("server_error", ProviderErrorKind::Transient),
	];

	TABLE.iter().find(|(code, _)| value.eq_ignore_ascii_case(code)).map(|(_, kind)| *kind)
}

fn match_body(body: Option<&str>) -> Option<ProviderErrorKind> {
	let lowered = body?.to_ascii_lowercase();

	if lowered.contains("invalid_grant") {
		Some(ProviderErrorKind::InvalidGrant)
	} else if lowered.contains("invalid_client") {
		Some(ProviderErrorKind::InvalidClient)
	} else if lowered.contains("insufficient_scope") || lowered.contains("invalid_scope") {
		Some(ProviderErrorKind::InsufficientScope)
	} else if lowered.contains("temporarily_unavailable") || lowered.contains("retry") {
		Some(ProviderErrorKind::Transient)
	} else {
		None
	}
}

fn classify_status(status: Option<u16>) -> ProviderErrorKind {
	match status {
		Some(400 | 404 | 410) => ProviderErrorKind::InvalidGrant,
		Some(401) => ProviderErrorKind::InvalidClient,
		Some(403) => ProviderErrorKind::InsufficientScope,
		_ => ProviderErrorKind::Transient,
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn classify(ctx: ProviderErrorContext) -> ProviderErrorKind {
		DefaultProviderStrategy.classify_token_error(&ctx)
	}

	#[test]
	fn oauth_error_codes_win_over_status() {
		let ctx = ProviderErrorContext::new(GrantType::RefreshToken)
			.with_http_status(500)
			.with_oauth_error("invalid_grant");

		assert_eq!(classify(ctx), ProviderErrorKind::InvalidGrant);
	}

	#[test]
	fn descriptions_and_bodies_are_searched() {
		let ctx = ProviderErrorContext::new(GrantType::AuthorizationCode)
			.with_oauth_error("custom")
			.with_error_description("Refresh token invalid_client for app");

		assert_eq!(classify(ctx), ProviderErrorKind::InvalidClient);

		let ctx = ProviderErrorContext::new(GrantType::RefreshToken)
			.with_body_preview("<html>Please retry later</html>");

		assert_eq!(classify(ctx), ProviderErrorKind::Transient);
	}

	#[test]
	fn status_codes_are_the_fallback() {
		let with_status =
			|status| ProviderErrorContext::new(GrantType::RefreshToken).with_http_status(status);

		assert_eq!(classify(with_status(400)), ProviderErrorKind::InvalidGrant);
		assert_eq!(classify(with_status(401)), ProviderErrorKind::InvalidClient);
		assert_eq!(classify(with_status(403)), ProviderErrorKind::InsufficientScope);
		assert_eq!(classify(with_status(429)), ProviderErrorKind::Transient);
		assert_eq!(classify(with_status(503)), ProviderErrorKind::Transient);
	}

	#[test]
	fn body_previews_are_truncated() {
		let ctx = ProviderErrorContext::new(GrantType::RefreshToken).with_body_preview("x".repeat(1_000));
		let preview = ctx.body_preview.expect("Preview should be recorded.");

		assert_eq!(preview.chars().count(), ProviderErrorContext::BODY_PREVIEW_LIMIT + 1);
		assert!(preview.ends_with('…'));
	}
}
