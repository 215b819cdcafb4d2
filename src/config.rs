//! Deployment configuration: client credentials, provider endpoints, and the sweep schedule.
//!
//! The document is camelCase JSON. Only `clientId`, `clientSecret`, `redirectUrl`, and
//! `cronSchedule` are required; everything else defaults to the Fitbit sleep integration.

// std
use std::{fs, path::Path};
// self
#[cfg(feature = "reqwest")]
use crate::{
	fetch::JsonResourceFetcher,
	flows::{Broker, ReqwestBroker},
	http::ReqwestHttpClient,
	oauth::ReqwestTransportErrorMapper,
	provider::DefaultProviderStrategy,
	store::CredentialStore,
};
use crate::{
	_prelude::*,
	auth::{ProviderId, ScopeSet},
	error::ConfigError,
	provider::{ClientAuthMethod, ProviderDescriptor, ProviderQuirks},
	sweep::{IntervalSchedule, SweepConfig},
};

const DEFAULT_PROVIDER_ID: &str = "fitbit";
const DEFAULT_AUTHORIZE_URL: &str = "https://www.fitbit.com/oauth2/authorize";
const DEFAULT_TOKEN_URL: &str = "https://api.fitbit.com/oauth2/token";
const DEFAULT_SCOPE: &str = "sleep";
const DEFAULT_RESOURCE_URL: &str =
	"https://api.fitbit.com/1/user/-/sleep/date/{date}.json?isMainSleep=true";
const DEFAULT_STATE_TTL_SECS: u64 = 600;
const DEFAULT_CALL_TIMEOUT_SECS: u64 = 30;

/// Parsed configuration document.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourierConfig {
	/// OAuth client identifier.
	pub client_id: String,
	/// OAuth client secret; empty for public clients.
	pub client_secret: String,
	/// Callback URL registered with the provider.
	pub redirect_url: String,
	/// Sweep schedule (`@every 1h`, `@daily`, ...).
	pub cron_schedule: String,
	/// Identifier used in logs and errors.
	#[serde(default = "default_provider_id")]
	pub provider_id: String,
	/// Provider authorize endpoint.
	#[serde(default = "default_authorize_url")]
	pub authorize_url: String,
	/// Provider token endpoint.
	#[serde(default = "default_token_url")]
	pub token_url: String,
	/// Scopes requested on login.
	#[serde(default = "default_scopes")]
	pub scopes: Vec<String>,
	/// Per-user resource fetched on each sweep; `{date}` expands to today's UTC date.
	#[serde(default = "default_resource_url")]
	pub resource_url: String,
	/// How long a login state stays valid.
	#[serde(default = "default_state_ttl_secs")]
	pub state_ttl_secs: u64,
	/// Bound for each outbound call.
	#[serde(default = "default_call_timeout_secs")]
	pub call_timeout_secs: u64,
	/// Adds `access_type=offline` to the authorize URL (Google-style providers).
	#[serde(default)]
	pub request_offline_access: bool,
}
impl CourierConfig {
	/// Reads and parses the document at `path`.
	pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
		let path = path.as_ref();
		let raw = fs::read_to_string(path).map_err(|source| ConfigError::ReadConfig {
			path: path.display().to_string(),
			source,
		})?;

		Self::from_json_str(&raw)
	}

	/// Parses a document; errors name the offending field.
	pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
		let mut deserializer = serde_json::Deserializer::from_str(raw);

		serde_path_to_error::deserialize(&mut deserializer).map_err(|e| ConfigError::ParseConfig {
			path: e.path().to_string(),
			source: e.into_inner(),
		})
	}

	/// Checks every derived value so startup fails before any traffic is served.
	pub fn validate(&self) -> Result<(), ConfigError> {
		self.descriptor()?;
		self.scope()?;
		self.redirect_uri()?;
		self.schedule()?;

		Url::parse(&self.resource_url.replace("{date}", "1970-01-01"))
			.map_err(|source| ConfigError::InvalidResourceUrl { source })?;

		Ok(())
	}

	/// Provider descriptor built from the configured endpoints.
	pub fn descriptor(&self) -> Result<ProviderDescriptor, ConfigError> {
		let id = ProviderId::new(&self.provider_id)
			.map_err(|source| ConfigError::InvalidProviderId { source })?;
		let authorization = Url::parse(&self.authorize_url)
			.map_err(|source| ConfigError::InvalidDescriptor { source })?;
		let token =
			Url::parse(&self.token_url).map_err(|source| ConfigError::InvalidDescriptor { source })?;
		let auth_method = if self.client_secret.is_empty() {
			ClientAuthMethod::NoneWithPkce
		} else {
			ClientAuthMethod::ClientSecretBasic
		};

		Ok(ProviderDescriptor::builder(id)
			.authorization_endpoint(authorization)
			.token_endpoint(token)
			.preferred_client_auth_method(auth_method)
			.quirks(ProviderQuirks {
				request_offline_access: self.request_offline_access,
				..Default::default()
			})
			.build()?)
	}

	/// Scopes requested on login.
	pub fn scope(&self) -> Result<ScopeSet, ConfigError> {
		Ok(ScopeSet::new(self.scopes.iter().cloned())?)
	}

	/// Parsed redirect URL.
	pub fn redirect_uri(&self) -> Result<Url, ConfigError> {
		Url::parse(&self.redirect_url).map_err(|source| ConfigError::InvalidRedirect { source })
	}

	/// Parsed sweep schedule.
	pub fn schedule(&self) -> Result<IntervalSchedule, ConfigError> {
		self.cron_schedule.parse()
	}

	/// Login state lifetime.
	pub fn state_ttl(&self) -> Duration {
		Duration::seconds(i64::try_from(self.state_ttl_secs).unwrap_or(i64::MAX))
	}

	/// Outbound call bound.
	pub fn call_timeout(&self) -> std::time::Duration {
		std::time::Duration::from_secs(self.call_timeout_secs)
	}

	/// Sweep tunables derived from this document.
	pub fn sweep_config(&self) -> SweepConfig {
		SweepConfig { call_timeout: self.call_timeout() }
	}

	/// Builds a broker over `store` with a timeout-bounded reqwest transport.
	#[cfg(feature = "reqwest")]
	pub fn build_broker(&self, store: Arc<dyn CredentialStore>) -> Result<ReqwestBroker, ConfigError> {
		let http_client = ReqwestHttpClient::with_timeout(self.call_timeout())?;
		let broker = Broker::with_http_client(
			store,
			self.descriptor()?,
			Arc::new(DefaultProviderStrategy),
			&self.client_id,
			self.redirect_uri()?,
			http_client,
			Arc::new(ReqwestTransportErrorMapper),
		)
		.with_scope(self.scope()?)
		.with_state_ttl(self.state_ttl());

		Ok(if self.client_secret.is_empty() {
			broker
		} else {
			broker.with_client_secret(&self.client_secret)
		})
	}

	/// Builds the fetcher for [`CourierConfig::resource_url`].
	#[cfg(feature = "reqwest")]
	pub fn resource_fetcher(&self) -> Result<JsonResourceFetcher, ConfigError> {
		let http = ReqwestClient::builder().timeout(self.call_timeout()).build()?;

		JsonResourceFetcher::new(http, &self.resource_url)
	}
}
impl Debug for CourierConfig {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("CourierConfig")
			.field("client_id", &self.client_id)
			.field("client_secret", &"<redacted>")
			.field("redirect_url", &self.redirect_url)
			.field("cron_schedule", &self.cron_schedule)
			.field("provider_id", &self.provider_id)
			.field("authorize_url", &self.authorize_url)
			.field("token_url", &self.token_url)
			.field("scopes", &self.scopes)
			.field("resource_url", &self.resource_url)
			.field("state_ttl_secs", &self.state_ttl_secs)
			.field("call_timeout_secs", &self.call_timeout_secs)
			.field("request_offline_access", &self.request_offline_access)
			.finish()
	}
}

fn default_provider_id() -> String {
	DEFAULT_PROVIDER_ID.into()
}

fn default_authorize_url() -> String {
	DEFAULT_AUTHORIZE_URL.into()
}

fn default_token_url() -> String {
	DEFAULT_TOKEN_URL.into()
}

fn default_scopes() -> Vec<String> {
	vec![DEFAULT_SCOPE.into()]
}

fn default_resource_url() -> String {
	DEFAULT_RESOURCE_URL.into()
}

fn default_state_ttl_secs() -> u64 {
	DEFAULT_STATE_TTL_SECS
}

fn default_call_timeout_secs() -> u64 {
	DEFAULT_CALL_TIMEOUT_SECS
}
