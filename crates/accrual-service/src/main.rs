//! Main entry point for the accrual reconciler service.
//!
//! Loads the configuration, builds the reconciliation engine with the
//! configured storage backend and runs the poller and processor until the
//! process is interrupted.

use accrual_config::Config;
use clap::Parser;
use std::path::PathBuf;
use tokio::sync::watch;

mod factory_registry;

/// Command-line arguments for the reconciler service.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
	/// Path to configuration file
	#[arg(short, long, default_value = "config.toml")]
	config: PathBuf,

	/// Log level (trace, debug, info, warn, error)
	#[arg(short, long, default_value = "info")]
	log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	use tracing_subscriber::{fmt, EnvFilter};

	let env_filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

	fmt()
		.with_env_filter(env_filter)
		.with_thread_ids(true)
		.with_target(true)
		.init();

	tracing::info!("Started accrual reconciler");

	let config_path = args
		.config
		.to_str()
		.ok_or_else(|| format!("Config path is not valid UTF-8: {:?}", args.config))?;
	let config = Config::from_file(config_path).await?;
	tracing::info!("Loaded configuration [{}]", config.service.id);

	let engine = factory_registry::build_engine_from_config(config)?;

	let (shutdown_tx, shutdown_rx) = watch::channel(false);
	let handle = engine.start(shutdown_rx);

	tokio::signal::ctrl_c().await?;
	tracing::info!("Shutdown requested");
	// Both loops may already be gone; nothing left to notify then
	let _ = shutdown_tx.send(true);

	handle.join().await?;
	tracing::info!("Stopped accrual reconciler");
	Ok(())
}
