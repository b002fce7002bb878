pub mod protocol;
pub mod routes;
pub mod state;
pub mod tools;

use std::{net::SocketAddr, path::PathBuf, sync::Arc, time::Duration};

use clap::Parser;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use crate::state::AppState;
use ymd_config::Credentials;
use ymd_search::refresh::{self, RetryPolicy};

#[derive(Debug, Parser)]
#[command(
	version = ymd_cli::VERSION,
	rename_all = "kebab",
	styles = ymd_cli::styles(),
)]
pub struct Args {
	#[arg(long, short = 'c', value_name = "FILE")]
	pub config: PathBuf,
}

pub async fn run(args: Args) -> color_eyre::Result<()> {
	let config = ymd_config::load(&args.config)?;

	init_tracing(&config)?;

	let credentials = Credentials::from_env()?;
	let http_addr: SocketAddr = config.service.http_bind.parse()?;
	let admin_addr: SocketAddr = config.service.admin_bind.parse()?;
	let state = AppState::new(&config, &credentials).await?;
	let shutdown = CancellationToken::new();

	if config.corpus.refresh_interval_secs > 0 {
		refresh::spawn_refresh_loop(
			state.search.cache().clone(),
			state.source.clone(),
			Duration::from_secs(config.corpus.refresh_interval_secs),
			RetryPolicy::from_config(&config.corpus),
			shutdown.clone(),
		);
	} else {
		tracing::info!("Periodic corpus refresh disabled.");
	}

	let sessions = Arc::clone(&state.sessions);
	let app = routes::router(state.clone());
	let admin_app = routes::admin_router(state);
	let http_listener = TcpListener::bind(http_addr).await?;

	tracing::info!(%http_addr, "HTTP server listening.");

	let http_server = axum::serve(http_listener, app);
	let admin_listener = TcpListener::bind(admin_addr).await?;

	tracing::info!(%admin_addr, "Admin server listening.");

	let admin_server = axum::serve(admin_listener, admin_app);
	let served = tokio::try_join!(http_server, admin_server);

	shutdown.cancel();
	sessions.disconnect_all();
	served?;

	Ok(())
}

fn init_tracing(config: &ymd_config::Config) -> color_eyre::Result<()> {
	let filter =
		EnvFilter::try_new(&config.service.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

	tracing_subscriber::fmt().with_env_filter(filter).init();

	Ok(())
}
