//! Starts an account link from a deployment config and runs one sweep over the stored users.
//!
//! Usage: `cargo run --example link_account -- courier.json sleeper@example.com`.

// std
use std::{env, sync::Arc};
// crates.io
use color_eyre::{Result, eyre::eyre};
// self
use oauth2_courier::{
	auth::UserIdentity,
	config::CourierConfig,
	flows::ReqwestBroker,
	store::{CredentialStore, FileStore},
	sweep::{BatchNotifier, Notifier, SweepFuture},
};

/// Prints each dataset instead of mailing it.
struct StdoutNotifier;
impl Notifier<serde_json::Value> for StdoutNotifier {
	fn notify<'a>(
		&'a self,
		identity: &'a UserIdentity,
		dataset: serde_json::Value,
	) -> SweepFuture<'a, ()> {
		Box::pin(async move {
			println!("{identity}: {dataset}");

			Ok(())
		})
	}
}

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let mut args = env::args().skip(1);
	let config_path = args.next().ok_or_else(|| eyre!("missing config path"))?;
	let email = args.next().ok_or_else(|| eyre!("missing email"))?;
	let config = CourierConfig::load(&config_path)?;

	config.validate()?;

	let store: Arc<dyn CredentialStore> =
		Arc::new(FileStore::open(env::temp_dir().join("oauth2-courier-demo.json"))?);
	let broker = Arc::new(config.build_broker(store.clone())?);
	let redirect = broker.begin_login(&email).await?;

	println!("Send {email} to {}.", redirect.authorize_url);
	println!("The callback must echo state `{}`.", &*redirect.state);

	let sweep = BatchNotifier::<ReqwestBroker, _, _>::new(
		store,
		broker.clone(),
		broker.refresh_guard(),
		config.resource_fetcher()?,
		StdoutNotifier,
	)
	.with_config(config.sweep_config());

	println!("Sweep finished: {:?}.", sweep.run_once().await);

	Ok(())
}
