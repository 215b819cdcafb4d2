//! Helpers shared by the handshake and the refresh guard.

// self
use crate::{
	_prelude::*,
	auth::UserIdentity,
	error::ConfigError,
	provider::{GrantType, ProviderDescriptor},
};

/// Registry of per-identity async locks.
///
/// Every read-modify-write of a user's record (starting a login, completing it, persisting a
/// rotated credential) runs under that user's lock, so no writer replaces a token another
/// writer just stored.
#[derive(Clone, Debug, Default)]
pub struct IdentityLocks(Arc<Mutex<HashMap<UserIdentity, Arc<AsyncMutex<()>>>>>);
impl IdentityLocks {
	/// Returns (and creates on demand) the lock for `identity`.
	pub fn for_identity(&self, identity: &UserIdentity) -> Arc<AsyncMutex<()>> {
		let mut locks = self.0.lock();

		locks.entry(identity.clone()).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
	}

	/// Number of identities that have been locked at least once.
	pub fn len(&self) -> usize {
		self.0.lock().len()
	}

	/// Returns `true` if no identity has been locked yet.
	pub fn is_empty(&self) -> bool {
		self.0.lock().is_empty()
	}
}

pub(crate) fn ensure_grant(
	descriptor: &ProviderDescriptor,
	grant: GrantType,
) -> Result<(), ConfigError> {
	if descriptor.supports(grant) {
		Ok(())
	} else {
		Err(ConfigError::UnsupportedGrant {
			descriptor: descriptor.id.to_string(),
			grant: grant.as_str(),
		})
	}
}
