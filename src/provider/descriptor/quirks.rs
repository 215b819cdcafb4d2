// self
use crate::_prelude::*;

/// Provider-specific quirks that influence the handshake.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderQuirks {
	/// Adds `access_type=offline` to the authorize URL so the provider issues a refresh token.
	pub request_offline_access: bool,
	/// Character used to join scopes in the `scope` parameter.
	pub scope_delimiter: char,
}
impl Default for ProviderQuirks {
	fn default() -> Self {
		Self { request_offline_access: false, scope_delimiter: ' ' }
	}
}
