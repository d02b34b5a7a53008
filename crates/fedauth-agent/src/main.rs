// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use anyhow::Result;
use clap::Parser;
use fedauth_agent::{run, AgentConfig, Registrar};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
	let config = AgentConfig::parse();

	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
	let registry = tracing_subscriber::registry().with(filter);
	if config.log_json {
		registry.with(tracing_subscriber::fmt::layer().json()).init();
	} else {
		registry.with(tracing_subscriber::fmt::layer()).init();
	}

	info!(
		cluster = %config.cluster,
		endpoint = %config.endpoint,
		refresh_interval = %humantime::format_duration(config.refresh_interval),
		"Starting fedauth-agent"
	);

	let registrar = Registrar::new(&config)?;
	let cancel = CancellationToken::new();
	tokio::spawn(shutdown_signal(cancel.clone()));

	run(&registrar, config.refresh_interval, &config.retry_config(), cancel).await;

	info!("Agent shutdown complete");
	Ok(())
}

async fn shutdown_signal(cancel: CancellationToken) {
	let ctrl_c = async {
		if let Err(e) = tokio::signal::ctrl_c().await {
			warn!(error = %e, "failed to install Ctrl+C handler");
			std::future::pending::<()>().await;
		}
	};

	#[cfg(unix)]
	let terminate = async {
		match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
			Ok(mut signal) => {
				signal.recv().await;
			}
			Err(e) => {
				warn!(error = %e, "failed to install SIGTERM handler");
				std::future::pending::<()>().await;
			}
		}
	};

	#[cfg(not(unix))]
	let terminate = std::future::pending::<()>();

	tokio::select! {
		_ = ctrl_c => {},
		_ = terminate => {},
	}

	info!("shutdown signal received");
	cancel.cancel();
}
