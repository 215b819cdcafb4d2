//! Auth-domain identifiers, scope sets, credentials, and stored user records.

pub mod credential;
pub mod id;
pub mod record;
pub mod scope;

pub use credential::*;
pub use id::*;
pub use record::*;
pub use scope::*;
