//! Stored user records: one per identity, carrying the current login state and credential.

// self
use crate::{
	_prelude::*,
	auth::{SerializedCredential, StateToken, TokenSecret, UserIdentity},
};

/// Login attempt bound to a [`StateToken`].
///
/// A state is live until it is consumed by a successful code exchange or outlives the
/// handshake's TTL. Consumed states stay on the record for audit lookups.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginState {
	/// State value echoed back by the authorization server.
	pub value: StateToken,
	/// When the attempt began.
	#[serde(with = "time::serde::rfc3339")]
	pub issued_at: OffsetDateTime,
	/// When the attempt completed, if it has.
	#[serde(default, with = "time::serde::rfc3339::option")]
	pub consumed_at: Option<OffsetDateTime>,
	/// PKCE verifier paired with the challenge sent on the authorize URL.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub pkce_verifier: Option<TokenSecret>,
}
impl LoginState {
	/// Starts a new, unconsumed login attempt.
	pub fn new(value: StateToken, issued_at: OffsetDateTime) -> Self {
		Self { value, issued_at, consumed_at: None, pkce_verifier: None }
	}

	/// Attaches the PKCE verifier for this attempt.
	pub fn with_pkce_verifier(mut self, verifier: impl Into<String>) -> Self {
		self.pkce_verifier = Some(TokenSecret::new(verifier));

		self
	}

	/// Returns `true` once the state has been exchanged.
	pub fn is_consumed(&self) -> bool {
		self.consumed_at.is_some()
	}

	/// Returns `true` if the state is unconsumed and younger than `ttl` at `now`.
	pub fn is_live_at(&self, now: OffsetDateTime, ttl: Duration) -> bool {
		!self.is_consumed() && now - self.issued_at < ttl
	}

	/// Marks the state as used; a consumed state never validates again.
	pub fn consume(&mut self, instant: OffsetDateTime) {
		self.consumed_at = Some(instant);
		self.pkce_verifier = None;
	}
}

/// Credential record for one user.
///
/// `identity` never changes. `state` is replaced on every login attempt and `token` whenever a
/// new or rotated credential is obtained. Replaced state values move to `retired_states` and are
/// never accepted again.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
	/// Stable identity (email).
	pub identity: UserIdentity,
	/// Most recent login attempt.
	#[serde(default)]
	pub state: Option<LoginState>,
	/// Opaque serialized credential; `None` until the first handshake completes.
	#[serde(default)]
	pub token: Option<SerializedCredential>,
	/// Earlier state values, consumed or superseded.
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub retired_states: Vec<StateToken>,
}
impl UserRecord {
	/// Creates a record with neither state nor token.
	pub fn new(identity: UserIdentity) -> Self {
		Self { identity, state: None, token: None, retired_states: Vec::new() }
	}

	/// Replaces the login state, retiring the previous value if it differs.
	pub fn with_state(mut self, state: LoginState) -> Self {
		if let Some(previous) = self.state.take()
			&& previous.value != state.value
		{
			self.retired_states.push(previous.value);
		}

		self.state = Some(state);

		self
	}

	/// Replaces the stored credential.
	pub fn with_token(mut self, token: SerializedCredential) -> Self {
		self.token = Some(token);

		self
	}

	/// State value used for the side index, if any.
	pub fn state_value(&self) -> Option<&StateToken> {
		self.state.as_ref().map(|state| &state.value)
	}

	/// Returns `true` if a credential is attached.
	pub fn has_token(&self) -> bool {
		self.token.as_ref().is_some_and(|token| !token.expose().is_empty())
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;

	fn state() -> StateToken {
		StateToken::new("state-fixture-0000000000").expect("State fixture should be valid.")
	}

	#[test]
	fn login_state_expires_and_consumes() {
		let issued = macros::datetime!(2025-01-01 10:00 UTC);
		let mut login = LoginState::new(state(), issued).with_pkce_verifier("verifier");
		let ttl = Duration::minutes(10);

		assert!(login.is_live_at(macros::datetime!(2025-01-01 10:09 UTC), ttl));
		assert!(!login.is_live_at(macros::datetime!(2025-01-01 10:10 UTC), ttl));

		login.consume(macros::datetime!(2025-01-01 10:05 UTC));

		assert!(login.is_consumed());
		assert!(login.pkce_verifier.is_none());
		assert!(!login.is_live_at(macros::datetime!(2025-01-01 10:06 UTC), ttl));
	}

	#[test]
	fn replacing_the_state_retires_the_old_value() {
		let identity = UserIdentity::new("sleeper@example.com").expect("Identity fixture should be valid.");
		let issued = macros::datetime!(2025-01-01 10:00 UTC);
		let first = state();
		let second = StateToken::new("state-fixture-1111111111").expect("State fixture should be valid.");
		let mut consumed = LoginState::new(first.clone(), issued);

		consumed.consume(issued);

		let record = UserRecord::new(identity)
			.with_state(LoginState::new(first.clone(), issued))
			.with_state(consumed)
			.with_state(LoginState::new(second.clone(), issued));

		assert_eq!(record.retired_states, vec![first]);
		assert_eq!(record.state_value(), Some(&second));
	}

	#[test]
	fn empty_tokens_do_not_count() {
		let identity = UserIdentity::new("sleeper@example.com").expect("Identity fixture should be valid.");
		let record = UserRecord::new(identity.clone());

		assert!(!record.has_token());
		assert!(!record.clone().with_token(SerializedCredential::from_raw("")).has_token());
		assert!(record.with_token(SerializedCredential::from_raw("{}")).has_token());
	}

	#[test]
	fn records_round_trip_through_json() {
		let identity = UserIdentity::new("sleeper@example.com").expect("Identity fixture should be valid.");
		let record = UserRecord::new(identity)
			.with_state(LoginState::new(state(), macros::datetime!(2025-01-01 10:00 UTC)))
			.with_token(SerializedCredential::from_raw("{\"access_token\":\"a\"}"));
		let payload = serde_json::to_string(&record).expect("Record should serialize.");
		let decoded: UserRecord = serde_json::from_str(&payload).expect("Record should deserialize.");

		assert_eq!(decoded, record);
	}
}
