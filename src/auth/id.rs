//! Strongly typed identifiers for users and login attempts.

// std
use std::{borrow::Borrow, ops::Deref};
// crates.io
use rand::{Rng, distr::Alphanumeric};
// self
use crate::_prelude::*;

macro_rules! def_id {
	($name:ident, $doc:literal, $kind:literal, $validate:path) => {
		#[doc = $doc]
		#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
		#[serde(try_from = "String", into = "String")]
		pub struct $name(String);
		impl $name {
			/// Creates a new identifier after validation.
			pub fn new(value: impl AsRef<str>) -> Result<Self, IdentifierError> {
				let view = value.as_ref();

				$validate($kind, view)?;

				Ok(Self(view.to_owned()))
			}
		}
		impl Deref for $name {
			type Target = str;

			fn deref(&self) -> &Self::Target {
				&self.0
			}
		}
		impl AsRef<str> for $name {
			fn as_ref(&self) -> &str {
				&self.0
			}
		}
		impl From<$name> for String {
			fn from(value: $name) -> Self {
				value.0
			}
		}
		impl TryFrom<String> for $name {
			type Error = IdentifierError;

			fn try_from(value: String) -> Result<Self, Self::Error> {
				$validate($kind, &value)?;

				Ok(Self(value))
			}
		}
		impl Borrow<str> for $name {
			fn borrow(&self) -> &str {
				&self.0
			}
		}
		impl Display for $name {
			fn fmt(&self, f: &mut Formatter) -> FmtResult {
				f.write_str(&self.0)
			}
		}
		impl FromStr for $name {
			type Err = IdentifierError;

			fn from_str(s: &str) -> Result<Self, Self::Err> {
				Self::new(s)
			}
		}
	};
}

const PROVIDER_MAX_LEN: usize = 64;
const IDENTITY_MAX_LEN: usize = 254;
const STATE_MIN_LEN: usize = 22;
const STATE_MAX_LEN: usize = 128;
const GENERATED_STATE_LEN: usize = 32;

/// Error returned when identifier validation fails.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, ThisError)]
pub enum IdentifierError {
	/// The identifier was empty.
	#[error("{kind} cannot be empty.")]
	Empty {
		/// Kind of identifier (provider, email, state).
		kind: &'static str,
	},
	/// The identifier contains whitespace characters.
	#[error("{kind} contains whitespace.")]
	ContainsWhitespace {
		/// Kind of identifier (provider, email, state).
		kind: &'static str,
	},
	/// The identifier length is outside the accepted range.
	#[error("{kind} must be between {min} and {max} characters.")]
	Length {
		/// Kind of identifier (provider, email, state).
		kind: &'static str,
		/// Minimum permitted character count.
		min: usize,
		/// Maximum permitted character count.
		max: usize,
	},
	/// The identifier does not have the expected shape.
	#[error("{kind} is malformed: {reason}.")]
	Malformed {
		/// Kind of identifier (provider, email, state).
		kind: &'static str,
		/// What was wrong with it.
		reason: &'static str,
	},
}

def_id! {
	ProviderId,
	"Identifier of the configured authorization server.",
	"Provider",
	validate_provider
}
def_id! {
	UserIdentity,
	"Stable user identity (the email address notifications are delivered to).",
	"Email",
	validate_email
}
def_id! {
	StateToken,
	"Single-use login state binding an authorization redirect to its callback.",
	"State",
	validate_state
}

impl Debug for ProviderId {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "ProviderId({})", self.0)
	}
}

impl Debug for UserIdentity {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "UserIdentity({})", self.0)
	}
}

impl StateToken {
	/// Draws a fresh state from the thread-local CSPRNG.
	///
	/// 32 alphanumeric characters carry roughly 190 bits of entropy.
	pub fn generate() -> Self {
		Self(rand::rng().sample_iter(Alphanumeric).take(GENERATED_STATE_LEN).map(char::from).collect())
	}
}
impl Debug for StateToken {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		// Only a prefix; the full value is a bearer secret until consumed.
		let prefix: String = self.0.chars().take(6).collect();

		write!(f, "StateToken({prefix}…)")
	}
}

fn validate_provider(kind: &'static str, view: &str) -> Result<(), IdentifierError> {
	if view.is_empty() {
		return Err(IdentifierError::Empty { kind });
	}
	if view.chars().any(char::is_whitespace) {
		return Err(IdentifierError::ContainsWhitespace { kind });
	}
	if view.len() > PROVIDER_MAX_LEN {
		return Err(IdentifierError::Length { kind, min: 1, max: PROVIDER_MAX_LEN });
	}

	Ok(())
}

fn validate_email(kind: &'static str, view: &str) -> Result<(), IdentifierError> {
	if view.is_empty() {
		return Err(IdentifierError::Empty { kind });
	}
	if view.chars().any(char::is_whitespace) {
		return Err(IdentifierError::ContainsWhitespace { kind });
	}
	if view.len() > IDENTITY_MAX_LEN {
		return Err(IdentifierError::Length { kind, min: 3, max: IDENTITY_MAX_LEN });
	}

	match view.split_once('@') {
		Some((local, domain)) if !local.is_empty() && !domain.is_empty() && !domain.contains('@') =>
			Ok(()),
		_ => Err(IdentifierError::Malformed { kind, reason: "expected exactly one `@` between non-empty parts" }),
	}
}

fn validate_state(kind: &'static str, view: &str) -> Result<(), IdentifierError> {
	if view.is_empty() {
		return Err(IdentifierError::Empty { kind });
	}
	if view.chars().any(char::is_whitespace) {
		return Err(IdentifierError::ContainsWhitespace { kind });
	}
	if !(STATE_MIN_LEN..=STATE_MAX_LEN).contains(&view.len()) {
		return Err(IdentifierError::Length { kind, min: STATE_MIN_LEN, max: STATE_MAX_LEN });
	}
	if !view.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '~')) {
		return Err(IdentifierError::Malformed { kind, reason: "only URL-safe characters are allowed" });
	}

	Ok(())
}

#[cfg(test)]
mod tests {
	// std
	use std::collections::HashSet;
	// self
	use super::*;

	#[test]
	fn identities_require_a_single_at_sign() {
		assert!(UserIdentity::new("sleeper@example.com").is_ok());
		assert!(UserIdentity::new("").is_err());
		assert!(UserIdentity::new(" sleeper@example.com").is_err(), "Leading whitespace must be rejected.");
		assert!(UserIdentity::new("no-at-sign").is_err());
		assert!(UserIdentity::new("@example.com").is_err());
		assert!(UserIdentity::new("a@b@c").is_err());

		let too_long = format!("{}@example.com", "a".repeat(IDENTITY_MAX_LEN));

		assert!(matches!(UserIdentity::new(&too_long), Err(IdentifierError::Length { .. })));
	}

	#[test]
	fn states_accept_uuid_shaped_values() {
		assert!(StateToken::new("3f2b8c1e-7a4d-4e0b-9c61-2d5f8a9b0c7e").is_ok());
		assert!(StateToken::new("short").is_err());
		assert!(StateToken::new("contains/slash-and-is-long-enough").is_err());
		assert!(StateToken::new("x".repeat(STATE_MAX_LEN + 1)).is_err());
	}

	#[test]
	fn generated_states_are_valid_and_distinct() {
		let states: HashSet<StateToken> = (0..256).map(|_| StateToken::generate()).collect();

		assert_eq!(states.len(), 256);

		for state in &states {
			assert_eq!(state.len(), GENERATED_STATE_LEN);
			assert!(StateToken::new(state.as_ref()).is_ok());
		}
	}

	#[test]
	fn serde_round_trip_enforces_validation() {
		let identity: UserIdentity = serde_json::from_str("\"sleeper@example.com\"")
			.expect("Identity should deserialize successfully.");

		assert_eq!(identity.as_ref(), "sleeper@example.com");
		assert!(serde_json::from_str::<UserIdentity>("\"not an email\"").is_err());
	}

	#[test]
	fn state_debug_hides_the_full_value() {
		let state = StateToken::new("abcdefghijklmnopqrstuvwxyz").expect("State fixture should be valid.");

		assert_eq!(format!("{state:?}"), "StateToken(abcdef…)");
	}

	#[test]
	fn borrow_supports_fast_lookup() {
		let map: HashMap<UserIdentity, u8> = HashMap::from_iter([(
			UserIdentity::new("sleeper@example.com").expect("Identity used for lookup should be valid."),
			7_u8,
		)]);

		assert_eq!(map.get("sleeper@example.com"), Some(&7));
	}
}
